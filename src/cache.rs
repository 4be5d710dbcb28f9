//! Delegated-flow token cache: cached account identity plus refresh material.
//!
//! The cache is the only credential state that outlives the process. It is loaded once when
//! a delegated [`ClientHandle`](crate::registry::ClientHandle) is created, mutated only by the
//! token flows, and written back through [`CachePersistence`] whenever its dirty flag is set.
//! Access tokens are never part of the snapshot.

pub mod persist;

pub use persist::*;

// std
use std::{fs, io::ErrorKind};
// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenSecret},
	error::TokenError,
};

const SNAPSHOT_VERSION: u32 = 1;

/// Account previously consented through the one-time interactive setup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAccount {
	/// Stable account identifier issued by the directory.
	pub home_account_id: String,
	/// Sign-in name of the account (usually the mailbox address).
	pub username: String,
	/// Tenant the account authenticated against.
	pub tenant: TenantId,
	/// Long-lived refresh material used for silent refresh.
	pub refresh_token: TokenSecret,
	/// Last time the refresh material changed.
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl CachedAccount {
	/// Creates an account entry stamped with the current clock.
	pub fn new(
		home_account_id: impl Into<String>,
		username: impl Into<String>,
		tenant: TenantId,
		refresh_token: impl Into<String>,
	) -> Self {
		Self {
			home_account_id: home_account_id.into(),
			username: username.into(),
			tenant,
			refresh_token: TokenSecret::new(refresh_token),
			updated_at: OffsetDateTime::now_utc(),
		}
	}
}

#[derive(Serialize, Deserialize)]
struct CacheSnapshot {
	version: u32,
	#[serde(default)]
	accounts: Vec<CachedAccount>,
}

/// Errors raised while decoding a serialized cache.
///
/// Messages name the JSON location only, never the offending value, so refresh material
/// cannot leak through a parse failure.
#[derive(Debug, ThisError)]
pub enum CacheFormatError {
	/// The payload is not a valid snapshot.
	#[error("malformed snapshot at `{path}` (line {line}, column {column})")]
	Malformed {
		/// JSON path of the failure.
		path: String,
		/// Line of the failure.
		line: usize,
		/// Column of the failure.
		column: usize,
	},
	/// The snapshot was written by an incompatible version.
	#[error("unsupported snapshot version {0}")]
	UnsupportedVersion(u32),
}

/// Serializable token cache with change tracking.
#[derive(Clone, Debug, Default)]
pub struct TokenCache {
	accounts: Vec<CachedAccount>,
	dirty: bool,
}
impl TokenCache {
	/// Decodes a serialized snapshot. Empty input yields an empty cache.
	///
	/// The decoded cache starts clean: it matches what is on disk.
	pub fn deserialize(bytes: &[u8]) -> Result<Self, CacheFormatError> {
		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(Self::default());
		}

		let de = &mut serde_json::Deserializer::from_slice(bytes);
		let snapshot: CacheSnapshot = serde_path_to_error::deserialize(de).map_err(|e| {
			let inner = e.inner();

			CacheFormatError::Malformed {
				path: e.path().to_string(),
				line: inner.line(),
				column: inner.column(),
			}
		})?;

		if snapshot.version != SNAPSHOT_VERSION {
			return Err(CacheFormatError::UnsupportedVersion(snapshot.version));
		}

		Ok(Self { accounts: snapshot.accounts, dirty: false })
	}

	/// Encodes the cache as a versioned JSON snapshot.
	pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
		#[derive(Serialize)]
		struct SnapshotRef<'a> {
			version: u32,
			accounts: &'a [CachedAccount],
		}

		serde_json::to_vec_pretty(&SnapshotRef {
			version: SNAPSHOT_VERSION,
			accounts: &self.accounts,
		})
	}

	/// Loads the cache persisted at `path`; a missing file is an empty cache.
	pub fn load(path: &Path) -> Result<Self, TokenError> {
		let bytes = match fs::read(path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
			Err(e) => {
				return Err(TokenError::CacheLoad {
					path: path.to_path_buf(),
					message: e.to_string(),
				});
			},
		};

		Self::deserialize(&bytes).map_err(|e| TokenError::CacheLoad {
			path: path.to_path_buf(),
			message: e.to_string(),
		})
	}

	/// Cached accounts in insertion order.
	pub fn accounts(&self) -> &[CachedAccount] {
		&self.accounts
	}

	/// Returns `true` when no account is cached.
	pub fn is_empty(&self) -> bool {
		self.accounts.is_empty()
	}

	/// Returns the single cached account.
	///
	/// Fails with [`TokenError::NoCachedIdentity`] for an empty cache and
	/// [`TokenError::MultipleAccounts`] when more than one account is present; there is no
	/// selection policy between accounts.
	pub fn single_account(&self) -> Result<&CachedAccount, TokenError> {
		match self.accounts.as_slice() {
			[] => Err(TokenError::NoCachedIdentity),
			[account] => Ok(account),
			accounts => Err(TokenError::MultipleAccounts { count: accounts.len() }),
		}
	}

	/// Stores `account` as the cached identity, replacing any previous one.
	pub fn insert_account(&mut self, account: CachedAccount) {
		self.accounts.clear();
		self.accounts.push(account);

		self.dirty = true;
	}

	/// Replaces the refresh material of `home_account_id`.
	///
	/// Returns `true` (and marks the cache dirty) only when the stored value changed.
	pub fn rotate_refresh_token(&mut self, home_account_id: &str, refresh_token: &str) -> bool {
		let Some(account) =
			self.accounts.iter_mut().find(|account| account.home_account_id == home_account_id)
		else {
			return false;
		};

		if account.refresh_token.expose() == refresh_token {
			return false;
		}

		account.refresh_token = TokenSecret::new(refresh_token);
		account.updated_at = OffsetDateTime::now_utc();
		self.dirty = true;

		true
	}

	/// Returns `true` if the cache changed since it was loaded or last persisted.
	pub fn has_state_changed(&self) -> bool {
		self.dirty
	}

	pub(crate) fn mark_clean(&mut self) {
		self.dirty = false;
	}
}
