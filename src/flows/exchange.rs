//! Mapping of `oauth2` token-endpoint results into crate types.

// crates.io
use oauth2::{
	HttpClientError, RequestTokenError, TokenResponse,
	basic::{BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{_prelude::*, auth::AccessToken, error::TokenError, http::ResponseMetadata};

const INVALID_GRANT: &str = "invalid_grant";

/// Builds an [`AccessToken`] from a successful token response.
pub(crate) fn map_token_response(response: &BasicTokenResponse) -> Result<AccessToken, TokenError> {
	let expires_in = response.expires_in().ok_or(TokenError::MissingExpiry)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| TokenError::MissingExpiry)?;

	if expires_in <= 0 {
		return Err(TokenError::MissingExpiry);
	}

	Ok(AccessToken::new(
		response.access_token().secret().to_owned(),
		OffsetDateTime::now_utc(),
		Duration::seconds(expires_in),
	))
}

/// Classifies a failed token request.
pub(crate) fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> TokenError {
	let status = meta.and_then(|meta| meta.status);

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response(response, status),
		RequestTokenError::Request(error) => TokenError::transport(error),
		RequestTokenError::Parse(source, _body) => TokenError::MalformedResponse { source, status },
		RequestTokenError::Other(message) => TokenError::Provider {
			code: "unexpected_response".into(),
			description: Some(message),
			status,
		},
	}
}

fn map_server_response(response: BasicErrorResponse, status: Option<u16>) -> TokenError {
	let code = response.error().as_ref().to_owned();
	let description = response.error_description().cloned();

	if code == INVALID_GRANT {
		return TokenError::InvalidGrant { reason: description.unwrap_or(code) };
	}

	TokenError::Provider { code, description, status }
}
