//! Delegated flow: silent refresh for the single cached account.

// crates.io
use oauth2::{RefreshToken, Scope, TokenResponse};
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	cache::CachedAccount,
	error::TokenError,
	flows::{TokenAcquirer, exchange},
	http::ResponseMetadataSlot,
	registry::ClientHandle,
};

/// Result of a silent refresh: the new access token plus rotated refresh material, if any.
pub(crate) struct Refreshed {
	pub(crate) token: AccessToken,
	pub(crate) rotated: Option<String>,
}

impl TokenAcquirer {
	/// Redeems `account`'s refresh material for the handle's delegated scopes.
	pub(crate) async fn exchange_refresh_token(
		&self,
		handle: &ClientHandle,
		account: &CachedAccount,
	) -> Result<Refreshed, TokenError> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.instrumented(meta.clone());
		let refresh_secret = RefreshToken::new(account.refresh_token.expose().to_owned());
		let mut request = handle.oauth_client().exchange_refresh_token(&refresh_secret);

		for scope in handle.scopes().iter() {
			request = request.add_scope(Scope::new(scope.to_owned()));
		}

		let response = request
			.request_async(&instrumented)
			.await
			.map_err(|err| exchange::map_request_error(meta.take(), err))?;
		let token = exchange::map_token_response(&response)?;
		let rotated = response
			.refresh_token()
			.map(|secret| secret.secret().to_owned())
			.filter(|secret| !secret.is_empty());

		tracing::debug!(
			identity = %handle.key(),
			account = %account.username,
			expires_at = %token.expires_at,
			rotated = rotated.is_some(),
			"Refreshed delegated token."
		);

		Ok(Refreshed { token, rotated })
	}
}
