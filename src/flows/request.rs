//! Per-call acquisition parameters.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, IdentityKey},
};

/// Parameters for a single [`TokenAcquirer::acquire`](crate::flows::TokenAcquirer::acquire) call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenRequest {
	/// Bypasses the in-memory token when true.
	pub force: bool,
	/// Jittered preemptive window used when refreshing early.
	pub preemptive_window: Duration,
}
impl TokenRequest {
	const DEFAULT_PREEMPTIVE_WINDOW: Duration = Duration::seconds(60);

	/// Creates a request that reuses a valid in-memory token.
	pub fn new() -> Self {
		Self { force: false, preemptive_window: Self::DEFAULT_PREEMPTIVE_WINDOW }
	}

	/// Forces a fresh acquisition, as after an authorization failure.
	pub fn force_refresh(mut self) -> Self {
		self.force = true;

		self
	}

	/// Overrides the jittered preemptive window (defaults to 60 seconds).
	pub fn with_preemptive_window(mut self, window: Duration) -> Self {
		self.preemptive_window = if window.is_negative() { Duration::ZERO } else { window };

		self
	}

	/// Determines whether `token`, held for `key`, must be replaced at `now`.
	pub fn should_refresh(&self, key: &IdentityKey, token: &AccessToken, now: OffsetDateTime) -> bool {
		if self.force || token.is_expired_at(now) {
			return true;
		}

		let effective_window = self.effective_preemptive_window(key);

		if effective_window.is_zero() {
			return false;
		}

		token.remaining_at(now) <= effective_window
	}

	fn effective_preemptive_window(&self, key: &IdentityKey) -> Duration {
		self.preemptive_window.checked_sub(self.preemptive_jitter(key)).unwrap_or(Duration::ZERO)
	}

	// Spreads refreshes of different identities across the window, stable per identity.
	fn preemptive_jitter(&self, key: &IdentityKey) -> Duration {
		let window_secs = self.preemptive_window.whole_seconds();

		if window_secs <= 1 {
			return Duration::ZERO;
		}

		let modulus = u64::try_from(window_secs).unwrap_or(u64::MAX);
		let jitter_secs = jitter_seed(key) % modulus;
		let clamped = i64::try_from(jitter_secs).unwrap_or(i64::MAX);

		Duration::seconds(clamped)
	}
}
impl Default for TokenRequest {
	fn default() -> Self {
		Self::new()
	}
}

fn jitter_seed(key: &IdentityKey) -> u64 {
	let mut hasher = DefaultHasher::new();

	key.hash(&mut hasher);

	hasher.finish()
}
