//! Component state persistence
//!
//! [`JsonFileStore`] keeps state in a JSON file, written atomically
//! (temp file + rename) so a crash never leaves a torn state file.
//! [`MemoryStore`] keeps state in memory for embedding and tests.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::types::PolicyState;

/// Errors from loading or saving state
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State serialization error at {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("State task failed: {0}")]
    Task(String),
}

/// Load/save contract for component state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load state; a store with nothing saved yields an empty state
    async fn load(&self) -> Result<PolicyState, StateError>;

    /// Persist state; must be durable when this returns
    async fn save(&self, state: &PolicyState) -> Result<(), StateError>;
}

/// State stored as a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(path: &Path, source: std::io::Error) -> StateError {
        StateError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn load_sync(path: &Path) -> Result<PolicyState, StateError> {
        if !path.exists() {
            debug!("No state file at {}, starting empty", path.display());
            return Ok(PolicyState::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| Self::io_error(path, e))?;
        if content.trim().is_empty() {
            return Ok(PolicyState::default());
        }

        serde_json::from_str(&content).map_err(|source| StateError::Serialization {
            path: path.to_path_buf(),
            source,
        })
    }

    fn save_sync(path: &Path, state: &PolicyState) -> Result<(), StateError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Self::io_error(parent, e))?;
            }
        }

        let content =
            serde_json::to_string_pretty(state).map_err(|source| StateError::Serialization {
                path: path.to_path_buf(),
                source,
            })?;

        let temp_path = path.with_extension("json.tmp");
        {
            let mut file = File::create(&temp_path).map_err(|e| Self::io_error(&temp_path, e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(std::fs::Permissions::from_mode(0o600))
                    .map_err(|e| Self::io_error(&temp_path, e))?;
            }

            file.write_all(content.as_bytes())
                .map_err(|e| Self::io_error(&temp_path, e))?;
            file.sync_all().map_err(|e| Self::io_error(&temp_path, e))?;
        }

        std::fs::rename(&temp_path, path).map_err(|e| Self::io_error(path, e))?;

        // Persist the rename itself
        #[cfg(unix)]
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)
                .and_then(|dir| dir.sync_all())
                .map_err(|e| Self::io_error(parent, e))?;
        }

        debug!("State saved to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<PolicyState, StateError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .map_err(|e| StateError::Task(e.to_string()))?
    }

    async fn save(&self, state: &PolicyState) -> Result<(), StateError> {
        let path = self.path.clone();
        let state = state.clone();
        tokio::task::spawn_blocking(move || Self::save_sync(&path, &state))
            .await
            .map_err(|e| StateError::Task(e.to_string()))?
    }
}

/// In-memory state; clones share the same slot
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    state: PolicyState,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PolicyState) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.state = state;
        }
        store
    }

    /// Current saved state
    pub fn snapshot(&self) -> PolicyState {
        self.inner
            .lock()
            .map(|inner| inner.state.clone())
            .unwrap_or_default()
    }

    /// Number of completed saves
    pub fn save_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.saves).unwrap_or_default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<PolicyState, StateError> {
        self.inner
            .lock()
            .map(|inner| inner.state.clone())
            .map_err(|e| StateError::Task(e.to_string()))
    }

    async fn save(&self, state: &PolicyState) -> Result<(), StateError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| StateError::Task(e.to_string()))?;
        inner.state = state.clone();
        inner.saves += 1;
        Ok(())
    }
}
