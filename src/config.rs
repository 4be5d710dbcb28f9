//! Host-facing mail settings and their validated form.
//!
//! [`MailSettings`] is what the host application deserializes from its own configuration
//! source. [`validate`] turns it into a [`GraphConfig`] once at startup; everything else in the
//! crate consumes only the validated form.

// std
use std::{fs, io::ErrorKind, time::Duration as StdDuration};
// crates.io
use url::Host;
// self
use crate::{
	_prelude::*,
	auth::{ClientId, FlowKind, IdentityKey, ScopeSet, TenantId, TokenSecret},
	error::ConfigError,
};

/// Default Graph API base.
pub const DEFAULT_API_BASE: &str = "https://graph.microsoft.com/v1.0";
/// Default identity-platform authority host.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
/// Default per-request HTTP timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Raw mail settings as supplied by the host.
///
/// Every field has a default, so partial documents deserialize; [`validate`] decides whether
/// the result is usable.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MailSettings {
	/// Routes outbound mail through the Graph API when `true`.
	pub enabled: bool,
	/// Credential flow: `client_credentials` or `delegated`.
	pub flow: String,
	/// Directory tenant (GUID, domain, or `consumers`).
	pub tenant_id: String,
	/// App registration identifier.
	pub client_id: String,
	/// App registration secret.
	pub client_secret: TokenSecret,
	/// Mailbox messages are sent from.
	pub sender_email: String,
	/// Token cache file (delegated flow only).
	pub token_cache_file: Option<PathBuf>,
	/// Accept sends without delivering them.
	pub suppress_send: bool,
	/// Graph API base URL.
	pub api_base: Url,
	/// Identity-platform authority host.
	pub authority: Url,
	/// Per-request HTTP timeout in seconds.
	pub request_timeout_secs: u64,
}
impl Default for MailSettings {
	fn default() -> Self {
		Self {
			enabled: false,
			flow: FlowKind::ServiceIdentity.as_str().into(),
			tenant_id: String::new(),
			client_id: String::new(),
			client_secret: TokenSecret::default(),
			sender_email: String::new(),
			token_cache_file: None,
			suppress_send: false,
			api_base: default_url(DEFAULT_API_BASE),
			authority: default_url(DEFAULT_AUTHORITY),
			request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
		}
	}
}

fn default_url(raw: &str) -> Url {
	Url::parse(raw).expect("Default endpoint literals are valid URLs.")
}

/// Validated configuration consumed by the registry, token flows, and delivery client.
#[derive(Clone, Debug)]
pub struct GraphConfig {
	/// Identity selecting the client handle.
	pub identity: IdentityKey,
	/// App registration secret.
	pub client_secret: TokenSecret,
	/// Sending mailbox.
	pub sender: String,
	/// Tenant-specific token endpoint.
	pub token_endpoint: Url,
	/// Graph API base URL.
	pub api_base: Url,
	/// Scopes requested by the configured flow.
	pub scopes: ScopeSet,
	/// Token cache file (delegated flow only).
	pub token_cache_file: Option<PathBuf>,
	/// Per-request HTTP timeout.
	pub request_timeout: StdDuration,
	/// Accept sends without delivering them.
	pub suppress_send: bool,
}
impl GraphConfig {
	/// Credential flow in use.
	pub fn flow(&self) -> FlowKind {
		self.identity.flow
	}
}

/// Validates `settings` and derives the typed configuration.
///
/// Checks run in a fixed order so operators see the first actionable problem: feature
/// switch, required settings, flow name, cache file, identifier syntax, endpoints.
pub fn validate(settings: &MailSettings) -> Result<GraphConfig, ConfigError> {
	if !settings.enabled {
		return Err(ConfigError::Disabled);
	}

	require("tenant_id", &settings.tenant_id)?;
	require("client_id", &settings.client_id)?;
	require("client_secret", settings.client_secret.expose())?;
	require("sender_email", &settings.sender_email)?;

	let flow = settings
		.flow
		.parse::<FlowKind>()
		.map_err(|e| ConfigError::UnknownFlow { value: e.0 })?;
	let token_cache_file = match flow {
		FlowKind::Delegated => Some(
			settings
				.token_cache_file
				.clone()
				.filter(|path| !path.as_os_str().is_empty())
				.ok_or(ConfigError::MissingCacheFile)?,
		),
		FlowKind::ServiceIdentity => None,
	};
	let tenant = TenantId::new(settings.tenant_id.trim())
		.map_err(|source| ConfigError::InvalidIdentifier { setting: "tenant_id", source })?;
	let client = ClientId::new(settings.client_id.trim())
		.map_err(|source| ConfigError::InvalidIdentifier { setting: "client_id", source })?;

	ensure_secure("API", &settings.api_base)?;
	ensure_secure("authority", &settings.authority)?;

	let token_endpoint = Url::parse(&format!(
		"{}/{tenant}/oauth2/v2.0/token",
		settings.authority.as_str().trim_end_matches('/')
	))
	.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "token", source })?;
	let resource = settings
		.api_base
		.join("/")
		.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "API", source })?;
	let scopes = match flow {
		FlowKind::ServiceIdentity => ScopeSet::application_default(&resource),
		FlowKind::Delegated => ScopeSet::delegated_mail_send(&resource),
	}
	.map_err(|source| ConfigError::InvalidScope { source })?;
	let sender = settings.sender_email.trim().to_owned();

	tracing::info!(flow = %flow, sender = %sender, "Graph mail delivery enabled.");

	Ok(GraphConfig {
		identity: IdentityKey::new(tenant, client, flow),
		client_secret: settings.client_secret.clone(),
		sender,
		token_endpoint,
		api_base: settings.api_base.clone(),
		scopes,
		token_cache_file,
		request_timeout: StdDuration::from_secs(settings.request_timeout_secs.max(1)),
		suppress_send: settings.suppress_send,
	})
}

fn require(setting: &'static str, value: &str) -> Result<(), ConfigError> {
	if value.trim().is_empty() {
		return Err(ConfigError::MissingSetting { setting });
	}

	Ok(())
}

fn ensure_secure(endpoint: &'static str, url: &Url) -> Result<(), ConfigError> {
	if url.scheme() == "https" || is_loopback(url) {
		return Ok(());
	}

	Err(ConfigError::InsecureEndpoint { endpoint, url: url.to_string() })
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

/// Outcome of the token cache permission audit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheAudit {
	/// No cache file exists yet.
	Missing,
	/// Only the owner can access the file.
	Secure {
		/// Permission bits.
		mode: u32,
	},
	/// Group or others can access the file.
	Insecure {
		/// Permission bits.
		mode: u32,
	},
	/// The file metadata could not be read.
	Unreadable,
}
impl CacheAudit {
	/// Returns `true` when group or other bits are set.
	pub fn is_insecure(self) -> bool {
		matches!(self, Self::Insecure { .. })
	}
}

/// Checks the token cache file for group/other access bits.
///
/// Advisory only: an insecure mode is logged as a warning with the `chmod` remedy and never
/// fails startup.
pub fn audit_cache_permissions(path: &Path) -> CacheAudit {
	let metadata = match fs::metadata(path) {
		Ok(metadata) => metadata,
		Err(e) if e.kind() == ErrorKind::NotFound => return CacheAudit::Missing,
		Err(e) => {
			tracing::debug!(path = %path.display(), error = %e, "Token cache metadata unavailable.");

			return CacheAudit::Unreadable;
		},
	};
	let mode = permission_bits(&metadata);

	if mode & 0o066 != 0 {
		let octal = format!("{mode:o}");

		tracing::warn!(
			path = %path.display(),
			mode = %octal,
			"Token cache file is accessible by group/others. Fix with: chmod 600 {}",
			path.display()
		);

		return CacheAudit::Insecure { mode };
	}

	CacheAudit::Secure { mode }
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
	use std::os::unix::fs::PermissionsExt;

	metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
	if metadata.permissions().readonly() { 0o400 } else { 0o600 }
}
