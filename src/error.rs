//! Crate-level error types shared across configuration, token flows, and delivery.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Persistence failures are deliberately absent: they are logged and swallowed by the token
/// flows (see [`crate::cache::PersistError`]).
#[derive(Debug, ThisError)]
pub enum Error {
	/// Startup configuration problem; the Graph transport must not activate.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token acquisition or refresh failed.
	#[error(transparent)]
	Token(#[from] TokenError),
	/// The message could not be delivered.
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
}

/// Configuration failures raised by [`crate::config::validate`].
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// The Graph mail feature is switched off.
	#[error("Graph mail delivery is not enabled.")]
	Disabled,
	/// A required setting is empty while the feature is enabled.
	#[error("Graph mail delivery is enabled but `{setting}` is empty.")]
	MissingSetting {
		/// Setting name.
		setting: &'static str,
	},
	/// The configured flow is not one of the recognized values.
	#[error("Flow must be one of `client_credentials` or `delegated`, got `{value}`.")]
	UnknownFlow {
		/// Raw configured value.
		value: String,
	},
	/// The delegated flow needs a token cache file.
	#[error("The delegated flow requires `token_cache_file` to be set.")]
	MissingCacheFile,
	/// Tenant or client identifier failed validation.
	#[error("Setting `{setting}` is invalid.")]
	InvalidIdentifier {
		/// Setting name.
		setting: &'static str,
		/// Validation failure.
		#[source]
		source: crate::auth::IdentifierError,
	},
	/// An endpoint URL cannot be used.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Offending URL.
		url: String,
	},
	/// An endpoint URL could not be derived.
	#[error("The {endpoint} endpoint is invalid.")]
	InvalidEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A flow scope derived from the API base is invalid.
	#[error("Scopes derived from the API base are invalid.")]
	InvalidScope {
		/// Validation failure.
		#[source]
		source: crate::auth::ScopeValidationError,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Token acquisition failures.
///
/// Variants carry provider error codes and descriptions only; access tokens, refresh tokens,
/// and the client secret never reach these messages.
#[derive(Debug, ThisError)]
pub enum TokenError {
	/// The delegated cache holds no account.
	#[error("No cached identity; one-time interactive setup required.")]
	NoCachedIdentity,
	/// The delegated cache holds more than one account.
	#[error("Token cache holds {count} accounts; only a single cached account is supported.")]
	MultipleAccounts {
		/// Number of cached accounts.
		count: usize,
	},
	/// The refresh material was rejected; interactive setup must be re-run.
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason.
		reason: String,
	},
	/// Provider returned an OAuth error response.
	#[error("Token endpoint returned `{code}`{}", fmt_description(.description))]
	Provider {
		/// OAuth `error` code.
		code: String,
		/// OAuth `error_description`, when supplied.
		description: Option<String>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Provider response could not be parsed.
	#[error("Token endpoint returned a malformed response.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Provider response lacks a usable lifetime.
	#[error("Token endpoint response has no usable expires_in.")]
	MissingExpiry,
	/// Network failure while calling the token endpoint.
	#[error("Network error occurred while calling the token endpoint.")]
	Transport {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// The persisted token cache could not be read.
	#[error("Token cache {} could not be loaded: {message}.", .path.display())]
	CacheLoad {
		/// Cache file path.
		path: PathBuf,
		/// Failure summary; never includes file contents.
		message: String,
	},
}
impl TokenError {
	/// Wraps a transport-specific network error.
	pub fn transport(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Transport { source: Box::new(src) }
	}
}

/// Delivery failures surfaced to the caller of a send.
#[derive(Debug, ThisError)]
pub enum DeliveryError {
	/// The message has no recipients.
	#[error("No recipients have been added.")]
	NoRecipients,
	/// The message has no sender.
	#[error("The message does not specify a sender.")]
	MissingSender,
	/// A header field contains a line break.
	#[error("The message {field} contains a line break.")]
	BadHeader {
		/// Offending field.
		field: &'static str,
	},
	/// Attachments cannot be delivered through this transport.
	#[error("Attachments not supported (subject: {subject:?}).")]
	AttachmentsUnsupported {
		/// Subject of the rejected message.
		subject: String,
	},
	/// The API rejected the request with a non-retryable status.
	#[error("sendMail rejected ({status}): request-id={} {body}", fmt_request_id(.request_id))]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Provider correlation identifier.
		request_id: Option<String>,
		/// Truncated response body.
		body: String,
	},
	/// Every attempt failed with a retryable status.
	#[error(
		"sendMail failed after {attempts} attempts ({status}): request-id={} {body}",
		fmt_request_id(.request_id)
	)]
	Exhausted {
		/// Last observed HTTP status code.
		status: u16,
		/// Last observed provider correlation identifier.
		request_id: Option<String>,
		/// Truncated body of the last response.
		body: String,
		/// Attempts performed.
		attempts: u32,
	},
	/// Network failure on the final attempt.
	#[error("sendMail request failed after {attempts} attempts.")]
	Transport {
		/// Attempts performed.
		attempts: u32,
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Request body could not be encoded.
	#[error("sendMail payload could not be encoded.")]
	Payload(#[from] serde_json::Error),
}
impl DeliveryError {
	/// Returns the HTTP status carried by the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. } | Self::Exhausted { status, .. } => Some(*status),
			_ => None,
		}
	}

	/// Returns the provider correlation identifier carried by the failure, if any.
	pub fn request_id(&self) -> Option<&str> {
		match self {
			Self::Rejected { request_id, .. } | Self::Exhausted { request_id, .. } =>
				request_id.as_deref(),
			_ => None,
		}
	}
}

fn fmt_description(description: &Option<String>) -> String {
	description.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

fn fmt_request_id(request_id: &Option<String>) -> &str {
	request_id.as_deref().unwrap_or("?")
}
