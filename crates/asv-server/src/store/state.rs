use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, error, info, warn};

use crate::error::AdminResult;

use super::model::{merge, AdminState, AdminStateUpdate};

/// Thread-safe handle to the admin state and its backing JSON file.
///
/// Readers take a snapshot pointer and never wait on the update lock, which
/// is held for the whole merge-validate-replace-persist sequence.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    current: RwLock<Arc<AdminState>>,
    update_lock: Mutex<()>,
}

impl StateStore {
    /// A store holding default state, backed by `path`. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                current: RwLock::new(Arc::new(AdminState::default())),
                update_lock: Mutex::new(()),
            }),
        }
    }

    /// Create a store for `path` and load whatever is on disk.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self::new(path);
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Replace in-memory state with the file contents.
    ///
    /// A missing file keeps defaults silently. An unreadable or invalid file
    /// keeps defaults with a warning.
    pub fn load(&self) {
        let path = &self.inner.path;
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no state file, using defaults");
                return;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read state file, using defaults");
                return;
            }
        };

        let parsed = serde_json::from_str::<AdminState>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|s| s.validate().map_err(|e| e.to_string()));

        match parsed {
            Ok(state) => {
                self.replace(state);
                info!(path = %path.display(), "admin state loaded");
            }
            Err(reason) => {
                warn!(path = %path.display(), error = %reason, "invalid state file, using defaults");
            }
        }
    }

    /// Current state. Cheap: clones an `Arc`.
    pub fn get(&self) -> Arc<AdminState> {
        let guard = self
            .inner
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// Merge `patch` into the current state and persist the result.
    ///
    /// Validation runs against the merged candidate; on failure nothing
    /// changes. A failed file write is logged and the new state is kept.
    pub fn update(&self, patch: &AdminStateUpdate) -> AdminResult<Arc<AdminState>> {
        let _guard = self
            .inner
            .update_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let candidate = merge(&self.get(), patch)?;
        let next = self.replace(candidate);

        if let Err(e) = self.persist(&next) {
            error!(path = %self.inner.path.display(), error = %e, "failed to persist admin state");
        }
        Ok(next)
    }

    fn replace(&self, state: AdminState) -> Arc<AdminState> {
        let next = Arc::new(state);
        let mut slot = self
            .inner
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Arc::clone(&next);
        next
    }

    fn persist(&self, state: &AdminState) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.inner.path, json)?;
        debug!(path = %self.inner.path.display(), "persisted admin state");
        Ok(())
    }
}
