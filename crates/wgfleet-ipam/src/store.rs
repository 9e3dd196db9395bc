//! JSON snapshot persistence for pools and allocations.
//!
//! The whole state is read in at startup and written out after each
//! mutation. Records keep the flat field names other tools read, and
//! allocations reload verbatim: no renumbering, no re-normalization.
//!
//! Every save bumps the snapshot's revision and refuses to overwrite a
//! revision other than the one the caller loaded. Processes sharing a
//! state directory serialize their load, mutate and save steps with
//! [`IpamStore::lock`].

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ledger::Allocation;
use crate::pool::AddressPool;

/// Errors from reading or writing the snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The snapshot is not valid JSON for [`IpamState`].
    #[error("invalid snapshot {path}: {source}")]
    Json {
        /// The file involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// Someone else saved the snapshot after it was loaded.
    #[error("snapshot {path} changed since it was loaded (revision {expected}, now {found})")]
    Conflict {
        /// The snapshot file.
        path: PathBuf,
        /// Revision the caller loaded.
        expected: u64,
        /// Revision on disk.
        found: u64,
    },
}

/// Everything the allocator persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpamState {
    /// Save counter, zero before the first save.
    #[serde(default)]
    pub revision: u64,
    /// Configured pools.
    #[serde(default)]
    pub pools: Vec<AddressPool>,
    /// Every allocation, grouped by pool in declaration order.
    #[serde(default)]
    pub allocations: Vec<Allocation>,
}

/// File-backed snapshot store.
#[derive(Debug, Clone)]
pub struct IpamStore {
    path: PathBuf,
}

impl IpamStore {
    /// Snapshot file name inside the state directory.
    pub const FILE_NAME: &'static str = "ipam.json";

    /// Creates a store rooted at `state_dir`.
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(Self::FILE_NAME),
        }
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<IpamState>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No IPAM snapshot on disk");
                return Ok(None);
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let state: IpamState =
            serde_json::from_str(&content).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })?;
        debug!(
            pools = state.pools.len(),
            allocations = state.allocations.len(),
            "Loaded IPAM snapshot"
        );
        Ok(Some(state))
    }

    /// Writes `state` if the snapshot on disk is still at
    /// `state.revision`, and returns the new revision.
    pub fn save(&self, state: &IpamState) -> Result<u64, StoreError> {
        let found = self.revision()?;
        if found != state.revision {
            return Err(StoreError::Conflict {
                path: self.path.clone(),
                expected: state.revision,
                found,
            });
        }
        self.write(state, found + 1)
    }

    /// Writes `state` over whatever the snapshot holds, and returns the new
    /// revision. An unreadable snapshot is replaced too.
    pub fn replace(&self, state: &IpamState) -> Result<u64, StoreError> {
        let found = match self.revision() {
            Ok(found) => found,
            Err(StoreError::Json { path, source }) => {
                warn!(path = %path.display(), error = %source, "Replacing unreadable IPAM snapshot");
                0
            }
            Err(e) => return Err(e),
        };
        self.write(state, found + 1)
    }

    /// Takes the state directory's exclusive lock, waiting for any other
    /// holder to let go.
    pub fn lock(&self) -> Result<StoreLock, StoreError> {
        let path = self.path.with_extension("lock");
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_error(dir))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_error(&path))?;
        FileExt::lock_exclusive(&file).map_err(io_error(&path))?;
        debug!(path = %path.display(), "Locked IPAM state");
        Ok(StoreLock { file, path })
    }

    fn revision(&self) -> Result<u64, StoreError> {
        Ok(self.load()?.map_or(0, |state| state.revision))
    }

    fn write(&self, state: &IpamState, revision: u64) -> Result<u64, StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(io_error(dir))?;
        }

        let state = IpamState {
            revision,
            ..state.clone()
        };
        let json = serde_json::to_vec_pretty(&state).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(io_error(&self.path))?;

        debug!(
            path = %self.path.display(),
            revision,
            allocations = state.allocations.len(),
            "Saved IPAM snapshot"
        );
        Ok(revision)
    }
}

/// Exclusive hold on a state directory, released on drop.
#[derive(Debug)]
#[must_use = "the lock is released as soon as it is dropped"]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to unlock IPAM state");
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}
