//! Service-identity flow: app-only tokens minted with the client secret.

// crates.io
use oauth2::Scope;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	error::TokenError,
	flows::{TokenAcquirer, exchange},
	http::ResponseMetadataSlot,
	registry::ClientHandle,
};

impl TokenAcquirer {
	/// Performs the `client_credentials` grant for `handle`'s application scopes.
	pub(crate) async fn exchange_client_credentials(
		&self,
		handle: &ClientHandle,
	) -> Result<AccessToken, TokenError> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.instrumented(meta.clone());
		let mut request = handle.oauth_client().exchange_client_credentials();

		for scope in handle.scopes().iter() {
			request = request.add_scope(Scope::new(scope.to_owned()));
		}

		let response = request
			.request_async(&instrumented)
			.await
			.map_err(|err| exchange::map_request_error(meta.take(), err))?;
		let token = exchange::map_token_response(&response)?;

		tracing::debug!(identity = %handle.key(), expires_at = %token.expires_at, "Acquired app-only token.");

		Ok(token)
	}
}
