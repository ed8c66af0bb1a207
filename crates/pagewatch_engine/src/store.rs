use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use pagewatch_core::Options;
use tempfile::NamedTempFile;
use thiserror::Error;
use watch_logging::watch_warn;

/// Durable key holding the serialized options record.
pub const OPTIONS_KEY: &str = "options";
/// Durable key holding the stopped timestamp.
pub const STOPPED_KEY: &str = "stopped";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store directory missing or not writable: {0}")]
    StoreDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Durable key-value storage for the watcher's persistent state. Both keys
/// are optional; absence means defaults.
pub trait StateStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// File-per-key store; values are written to a temp file and renamed into
/// place so a crash never leaves a torn value behind.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        if self.dir.exists() {
            let meta = fs::metadata(&self.dir).map_err(|e| StoreError::StoreDir(e.to_string()))?;
            if !meta.is_dir() {
                return Err(StoreError::StoreDir("path is not a directory".into()));
            }
        } else {
            fs::create_dir_all(&self.dir).map_err(|e| StoreError::StoreDir(e.to_string()))?;
        }
        Ok(())
    }
}

impl StateStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.dir.join(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_dir()?;
        let target = self.dir.join(key);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.dir.join(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Store used when persistence is disabled: loads nothing, saves nowhere.
pub struct NullStore;

impl StateStore for NullStore {
    fn load(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    fn save(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Tolerant read of both durable keys: a missing or unreadable value falls
/// back to defaults with a warning, never an error.
pub fn read_persisted(store: &dyn StateStore) -> (Option<Options>, Option<u64>) {
    let options = match store.load(OPTIONS_KEY) {
        Ok(Some(text)) => match serde_json::from_str(&text) {
            Ok(options) => Some(options),
            Err(err) => {
                watch_warn!("Failed to parse persisted options: {}", err);
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            watch_warn!("Failed to read persisted options: {}", err);
            None
        }
    };

    let stopped_at = match store.load(STOPPED_KEY) {
        Ok(Some(text)) => match text.trim().parse::<u64>() {
            Ok(at_ms) => Some(at_ms),
            Err(err) => {
                watch_warn!("Failed to parse stopped marker: {}", err);
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            watch_warn!("Failed to read stopped marker: {}", err);
            None
        }
    };

    (options, stopped_at)
}
