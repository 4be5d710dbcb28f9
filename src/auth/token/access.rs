//! Short-lived bearer tokens held in memory only.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Bearer string plus lifetime.
///
/// Deliberately not serializable: access tokens live in memory for the current process and
/// are never written to the token cache file.
#[derive(Clone)]
pub struct AccessToken {
	secret: TokenSecret,
	/// Instant the provider minted the token (local clock).
	pub issued_at: OffsetDateTime,
	/// Instant after which the token must not be presented.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Builds a token issued at `issued_at` and valid for `expires_in`.
	pub fn new(
		secret: impl Into<String>,
		issued_at: OffsetDateTime,
		expires_in: Duration,
	) -> Self {
		Self { secret: TokenSecret::new(secret), issued_at, expires_at: issued_at + expires_in }
	}

	/// Returns the bearer string. Callers must avoid logging it.
	pub fn secret(&self) -> &str {
		self.secret.expose()
	}

	/// Returns `true` if the token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Time left before expiry, zero once expired.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
