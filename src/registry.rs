//! Process-wide registry of per-identity client handles.
//!
//! [`IdentityRegistry`] owns one [`ClientHandle`] per [`IdentityKey`] for the lifetime of the
//! registry. The registry is an ordinary value held by the transport, so tests get isolated
//! registries instead of sharing ambient state.

// crates.io
use async_lock::MutexGuard as AsyncMutexGuard;
use oauth2::{
	AuthType, ClientId as OAuthClientId, ClientSecret, EndpointNotSet, EndpointSet, TokenUrl,
	basic::BasicClient,
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, FlowKind, IdentityKey, ScopeSet, TokenSecret},
	cache::TokenCache,
	config::GraphConfig,
	error::ConfigError,
};

pub(crate) type ConfiguredClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Mutable credential state guarded by the handle's async mutex.
#[derive(Debug, Default)]
pub struct HandleState {
	/// Delegated-flow token cache (always empty for the service identity).
	pub cache: TokenCache,
	pub(crate) access_token: Option<AccessToken>,
}
impl HandleState {
	/// Returns the in-memory access token, if one was acquired.
	pub fn access_token(&self) -> Option<&AccessToken> {
		self.access_token.as_ref()
	}
}

/// Long-lived client for one tenant/client/flow identity.
///
/// Owns the client secret and the token state. All concurrent senders for the same identity
/// share one handle; acquisitions serialize on [`ClientHandle::lock_state`].
pub struct ClientHandle {
	key: IdentityKey,
	client_secret: TokenSecret,
	scopes: ScopeSet,
	cache_path: Option<PathBuf>,
	oauth_client: ConfiguredClient,
	state: AsyncMutex<HandleState>,
}
impl ClientHandle {
	/// Builds a handle for `config`, loading the persisted cache for the delegated flow.
	///
	/// A missing cache file yields an empty cache; an unreadable or corrupt one fails.
	pub fn from_config(config: &GraphConfig) -> Result<Self> {
		let token_url = TokenUrl::new(config.token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "token", source })?;
		let oauth_client = BasicClient::new(OAuthClientId::new(config.identity.client.to_string()))
			.set_client_secret(ClientSecret::new(config.client_secret.expose().to_owned()))
			.set_auth_type(AuthType::RequestBody)
			.set_token_uri(token_url);
		let cache_path = match config.identity.flow {
			FlowKind::Delegated => config.token_cache_file.clone(),
			FlowKind::ServiceIdentity => None,
		};
		let cache = match cache_path.as_deref() {
			Some(path) => TokenCache::load(path)?,
			None => TokenCache::default(),
		};

		Ok(Self {
			key: config.identity.clone(),
			client_secret: config.client_secret.clone(),
			scopes: config.scopes.clone(),
			cache_path,
			oauth_client,
			state: AsyncMutex::new(HandleState { cache, access_token: None }),
		})
	}

	/// Identity this handle serves.
	pub fn key(&self) -> &IdentityKey {
		&self.key
	}

	/// Scopes requested by this handle's flow.
	pub fn scopes(&self) -> &ScopeSet {
		&self.scopes
	}

	/// Path of the persisted token cache (delegated flow only).
	pub fn cache_path(&self) -> Option<&Path> {
		self.cache_path.as_deref()
	}

	/// Locks the credential state. Do not hold the guard across retry waits.
	pub async fn lock_state(&self) -> AsyncMutexGuard<'_, HandleState> {
		self.state.lock().await
	}

	pub(crate) fn oauth_client(&self) -> &ConfiguredClient {
		&self.oauth_client
	}
}
impl Debug for ClientHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientHandle")
			.field("key", &self.key)
			.field("client_secret_set", &!self.client_secret.is_empty())
			.field("scopes", &self.scopes)
			.field("cache_path", &self.cache_path)
			.finish()
	}
}

/// Registry mapping each [`IdentityKey`] to its shared [`ClientHandle`].
///
/// Entries are created once (first writer wins under the lock) and never evicted.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
	handles: Mutex<HashMap<IdentityKey, Arc<ClientHandle>>>,
}
impl IdentityRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the handle for `config.identity`, constructing it on first use.
	///
	/// The lock is held across the check, the construction, and the insert, so concurrent
	/// first callers for the same identity observe a single handle. Construction includes the
	/// blocking read of the delegated cache file; it happens once per identity, and later calls
	/// only clone the registered handle. A failed construction registers nothing.
	pub fn get_or_create(&self, config: &GraphConfig) -> Result<Arc<ClientHandle>> {
		let mut handles = self.handles.lock();

		if let Some(handle) = handles.get(&config.identity) {
			return Ok(handle.clone());
		}

		let handle = Arc::new(ClientHandle::from_config(config)?);

		tracing::debug!(identity = %config.identity, "Registered client handle.");
		handles.insert(config.identity.clone(), handle.clone());

		Ok(handle)
	}

	/// Returns the handle registered for `key`, if any.
	pub fn get(&self, key: &IdentityKey) -> Option<Arc<ClientHandle>> {
		self.handles.lock().get(key).cloned()
	}

	/// Number of registered identities.
	pub fn len(&self) -> usize {
		self.handles.lock().len()
	}

	/// Returns `true` when no identity has been registered.
	pub fn is_empty(&self) -> bool {
		self.handles.lock().is_empty()
	}
}
