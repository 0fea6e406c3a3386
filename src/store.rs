//! Persisted key-value store for device identity and broker endpoint
//!
//! The session only needs three values to survive restarts: the generated
//! device id and the broker host/port chosen by the operator.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Persisted store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("State file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("State store lock poisoned")]
    Poisoned,
}

/// Persisted configuration capability
///
/// Getters return `None` when a value was never written.
pub trait ConfigStore: Send + Sync {
    fn device_id(&self) -> Option<String>;
    fn set_device_id(&self, device_id: &str) -> Result<(), StoreError>;
    fn broker_host(&self) -> Option<String>;
    fn set_broker_host(&self, host: &str) -> Result<(), StoreError>;
    fn broker_port(&self) -> Option<u16>;
    fn set_broker_port(&self, port: u16) -> Result<(), StoreError>;
}

/// On-disk document layout
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_port: Option<u16>,
}

/// In-memory store, used by tests and ephemeral deployments
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    state: Mutex<StoredState>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: StoredState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> StoredState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    fn update(&self, apply: impl FnOnce(&mut StoredState)) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        apply(&mut state);
        Ok(())
    }

    fn read<T>(&self, get: impl FnOnce(&StoredState) -> Option<T>) -> Option<T> {
        self.state.lock().ok().and_then(|state| get(&state))
    }
}

impl ConfigStore for MemoryConfigStore {
    fn device_id(&self) -> Option<String> {
        self.read(|s| s.device_id.clone())
    }

    fn set_device_id(&self, device_id: &str) -> Result<(), StoreError> {
        self.update(|s| s.device_id = Some(device_id.to_string()))
    }

    fn broker_host(&self) -> Option<String> {
        self.read(|s| s.broker_host.clone())
    }

    fn set_broker_host(&self, host: &str) -> Result<(), StoreError> {
        self.update(|s| s.broker_host = Some(host.to_string()))
    }

    fn broker_port(&self) -> Option<u16> {
        self.read(|s| s.broker_port)
    }

    fn set_broker_port(&self, port: u16) -> Result<(), StoreError> {
        self.update(|s| s.broker_port = Some(port))
    }
}

/// JSON file store; every write rewrites the whole document via a temp file
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    state: Mutex<StoredState>,
}

impl FileConfigStore {
    /// Open the store, starting empty when the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoredState::default(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut StoredState)) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        let mut next = state.clone();
        apply(&mut next);
        self.persist(&next)?;
        *state = next;
        Ok(())
    }

    fn read<T>(&self, get: impl FnOnce(&StoredState) -> Option<T>) -> Option<T> {
        self.state.lock().ok().and_then(|state| get(&state))
    }

    fn persist(&self, state: &StoredState) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_vec_pretty(state).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = std::fs::File::create(&tmp_path).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        std::fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
    fn device_id(&self) -> Option<String> {
        self.read(|s| s.device_id.clone())
    }

    fn set_device_id(&self, device_id: &str) -> Result<(), StoreError> {
        self.update(|s| s.device_id = Some(device_id.to_string()))
    }

    fn broker_host(&self) -> Option<String> {
        self.read(|s| s.broker_host.clone())
    }

    fn set_broker_host(&self, host: &str) -> Result<(), StoreError> {
        self.update(|s| s.broker_host = Some(host.to_string()))
    }

    fn broker_port(&self) -> Option<u16> {
        self.read(|s| s.broker_port)
    }

    fn set_broker_port(&self, port: u16) -> Result<(), StoreError> {
        self.update(|s| s.broker_port = Some(port))
    }
}
