//! Atomic, owner-only persistence of the delegated token cache.

// std
use std::{
	fs::{self, OpenOptions},
	io::{self, ErrorKind, Write},
};
// self
use crate::{_prelude::*, cache::TokenCache, registry::ClientHandle};

/// Result of a persistence attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistOutcome {
	/// Nothing changed since the last write (or the handle has no cache file).
	Skipped,
	/// The snapshot replaced the cache file.
	Written,
}

/// Persistence failure. Non-fatal: callers log it and keep using the acquired token.
#[derive(Debug, ThisError)]
pub enum PersistError {
	/// The cache could not be encoded.
	#[error("Token cache could not be serialized.")]
	Serialize(#[source] serde_json::Error),
	/// A filesystem step failed.
	#[error("Failed to {action} {}.", .path.display())]
	Io {
		/// Step that failed.
		action: &'static str,
		/// Path involved in the step.
		path: PathBuf,
		/// Underlying I/O failure.
		#[source]
		source: io::Error,
	},
}

/// Writes token caches with a temp-file-and-rename protocol.
///
/// Every write through one instance is serialized by an internal lock, so concurrent
/// persists (same or different identities) never interleave on the filesystem.
#[derive(Debug, Default)]
pub struct CachePersistence {
	lock: Mutex<()>,
}
impl CachePersistence {
	/// Creates a persistence coordinator.
	pub fn new() -> Self {
		Self::default()
	}

	/// Persists the handle's cache if it changed.
	pub async fn persist(&self, handle: &ClientHandle) -> Result<PersistOutcome, PersistError> {
		let Some(path) = handle.cache_path() else {
			return Ok(PersistOutcome::Skipped);
		};
		let mut state = handle.lock_state().await;

		self.persist_cache(path, &mut state.cache)
	}

	/// Persists `cache` to `path` when its dirty flag is set.
	///
	/// Callers that already hold the handle's state lock use this directly. The dirty flag
	/// is cleared only after the atomic replace succeeded.
	pub fn persist_cache(
		&self,
		path: &Path,
		cache: &mut TokenCache,
	) -> Result<PersistOutcome, PersistError> {
		if !cache.has_state_changed() {
			return Ok(PersistOutcome::Skipped);
		}

		let bytes = cache.serialize().map_err(PersistError::Serialize)?;
		let _guard = self.lock.lock();
		let tmp = temp_path(path);
		let result = ensure_parent_exists(path)
			.and_then(|()| write_temp(&tmp, &bytes))
			.and_then(|()| replace(&tmp, path));

		match result {
			Ok(()) => {
				cache.mark_clean();
				tracing::debug!(path = %path.display(), "Token cache persisted.");

				Ok(PersistOutcome::Written)
			},
			Err(e) => {
				tracing::error!(path = %path.display(), error = %e, cause = ?StdError::source(&e), "Failed to persist token cache.");

				match fs::remove_file(&tmp) {
					Err(rm) if rm.kind() != ErrorKind::NotFound => tracing::warn!(
						path = %tmp.display(),
						error = %rm,
						"Failed to remove temporary token cache file."
					),
					_ => (),
				}

				Err(e)
			},
		}
	}
}

/// Sibling path used for the pre-rename write (`<name>.tmp`).
pub(crate) fn temp_path(path: &Path) -> PathBuf {
	let mut name = path.as_os_str().to_owned();

	name.push(".tmp");

	PathBuf::from(name)
}

fn ensure_parent_exists(path: &Path) -> Result<(), PersistError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|source| PersistError::Io {
			action: "create directory",
			path: parent.to_path_buf(),
			source,
		})?;
	}

	Ok(())
}

/// Writes and syncs `bytes` to `tmp`, created owner read/write only.
pub(crate) fn write_temp(tmp: &Path, bytes: &[u8]) -> Result<(), PersistError> {
	let io_err = |action, source| PersistError::Io { action, path: tmp.to_path_buf(), source };
	let mut options = OpenOptions::new();

	options.write(true).create(true).truncate(true);

	#[cfg(unix)]
	{
		use std::os::unix::fs::OpenOptionsExt;

		options.mode(0o600);
	}

	let mut file = options.open(tmp).map_err(|e| io_err("create", e))?;

	// A stale temp file keeps its old mode on open; force it back to 0600.
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;

		file.set_permissions(fs::Permissions::from_mode(0o600))
			.map_err(|e| io_err("restrict permissions of", e))?;
	}

	file.write_all(bytes).map_err(|e| io_err("write", e))?;
	file.sync_all().map_err(|e| io_err("sync", e))
}

fn replace(tmp: &Path, path: &Path) -> Result<(), PersistError> {
	fs::rename(tmp, path).map_err(|source| PersistError::Io {
		action: "replace",
		path: path.to_path_buf(),
		source,
	})
}
