//! Token acquisition for the service-identity and delegated flows.
//!
//! [`TokenAcquirer::acquire`] serializes on the handle's state lock, so concurrent senders for
//! one identity share a single provider round-trip instead of racing refresh-token rotation.
//! A valid in-memory token is reused unless the request is forced or the token falls inside
//! the jittered preemptive window.

mod client_credentials;
mod exchange;
mod refresh;
mod request;

pub use request::*;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, FlowKind},
	cache::CachePersistence,
	error::TokenError,
	http::HttpClient,
	obs::{self, FlowOutcome, FlowSpan},
	registry::{ClientHandle, HandleState},
};

/// Acquires access tokens for registered client handles.
#[derive(Clone, Debug)]
pub struct TokenAcquirer {
	http_client: HttpClient,
	persistence: Arc<CachePersistence>,
}
impl TokenAcquirer {
	/// Creates an acquirer that calls token endpoints through `http_client` and writes
	/// delegated caches through `persistence`.
	pub fn new(http_client: HttpClient, persistence: Arc<CachePersistence>) -> Self {
		Self { http_client, persistence }
	}

	/// Shared persistence coordinator.
	pub fn persistence(&self) -> &Arc<CachePersistence> {
		&self.persistence
	}

	/// Returns a usable access token for `handle`.
	///
	/// Delegated handles fail with [`TokenError::NoCachedIdentity`] or
	/// [`TokenError::MultipleAccounts`] before any network call when the cache does not hold
	/// exactly one account. A dirty cache (rotated refresh token, or a write that failed
	/// earlier) is persisted before returning; persistence failures are logged and do not fail
	/// the acquisition.
	///
	/// The cache write is a synchronous filesystem call made while the handle's state lock is
	/// held: no other acquisition for the handle proceeds until the rotated refresh token is
	/// on disk or the write has failed.
	pub async fn acquire(&self, handle: &ClientHandle, request: TokenRequest) -> Result<AccessToken> {
		let kind = handle.key().flow;
		let span = FlowSpan::new(kind, "acquire");

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let mut state = handle.lock_state().await;

				match kind {
					FlowKind::ServiceIdentity => self.acquire_service(handle, &mut state, request).await,
					FlowKind::Delegated => self.acquire_delegated(handle, &mut state, request).await,
				}
			})
			.await;

		match &result {
			Ok((_, true)) => obs::record_flow_outcome(kind, FlowOutcome::Reused),
			Ok((_, false)) => obs::record_flow_outcome(kind, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
		}

		result.map(|(token, _)| token).map_err(Error::from)
	}

	async fn acquire_service(
		&self,
		handle: &ClientHandle,
		state: &mut HandleState,
		request: TokenRequest,
	) -> Result<(AccessToken, bool), TokenError> {
		if let Some(token) = reusable(handle, state, request) {
			return Ok((token, true));
		}

		let token = self.exchange_client_credentials(handle).await.inspect_err(|_| {
			state.access_token = None;
		})?;

		state.access_token = Some(token.clone());

		Ok((token, false))
	}

	async fn acquire_delegated(
		&self,
		handle: &ClientHandle,
		state: &mut HandleState,
		request: TokenRequest,
	) -> Result<(AccessToken, bool), TokenError> {
		let account = state.cache.single_account()?.clone();
		let acquired = match reusable(handle, state, request) {
			Some(token) => (token, true),
			None => {
				let refreshed = match self.exchange_refresh_token(handle, &account).await {
					Ok(refreshed) => refreshed,
					Err(e) => {
						state.access_token = None;

						if matches!(e, TokenError::InvalidGrant { .. }) {
							tracing::warn!(
								identity = %handle.key(),
								account = %account.username,
								"Refresh material rejected; re-run the interactive token setup."
							);
						}

						return Err(e);
					},
				};

				if let Some(rotated) = &refreshed.rotated {
					state.cache.rotate_refresh_token(&account.home_account_id, rotated);
				}

				state.access_token = Some(refreshed.token.clone());

				(refreshed.token, false)
			},
		};

		self.flush_cache(handle, state);

		Ok(acquired)
	}

	// Runs after every successful delegated acquisition, reused tokens included, so a write
	// that failed earlier is retried while the cache is still dirty.
	fn flush_cache(&self, handle: &ClientHandle, state: &mut HandleState) {
		let Some(path) = handle.cache_path() else {
			return;
		};

		if let Err(e) = self.persistence.persist_cache(path, &mut state.cache) {
			tracing::warn!(
				identity = %handle.key(),
				error = %e,
				"Continuing with the acquired token; the cache stays dirty until the next write."
			);
		}
	}
}

fn reusable(handle: &ClientHandle, state: &HandleState, request: TokenRequest) -> Option<AccessToken> {
	let now = OffsetDateTime::now_utc();

	state
		.access_token
		.as_ref()
		.filter(|token| !request.should_refresh(handle.key(), token, now))
		.cloned()
}
