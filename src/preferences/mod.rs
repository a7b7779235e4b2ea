//! Preferences - persisted device settings
//!
//! ## Responsibilities
//!
//! - Persist the camera-enabled flag written by the control plane
//! - Provide the boot value of that flag
//!
//! Values written here only take effect after a device restart.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Key of the camera-enabled flag
pub const CAMERA_ENABLED_KEY: &str = "camera_en";

/// Preference store failure
#[derive(Debug, thiserror::Error)]
pub enum PreferencesError {
    #[error("preferences I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("preferences file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// Key/value store backed by non-volatile storage
pub trait PreferenceStore: Send + Sync {
    fn get_bool(&self, key: &str) -> Option<bool>;

    fn put_bool(&self, key: &str, value: bool) -> Result<(), PreferencesError>;
}

/// Store kept only in memory (tests, diskless hosts)
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get_bool(&self, key: &str) -> Option<bool> {
        lock(&self.values).get(key).and_then(Value::as_bool)
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<(), PreferencesError> {
        lock(&self.values).insert(key.to_string(), Value::Bool(value));
        Ok(())
    }
}

/// JSON file store; the whole file is rewritten on every put
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, Value>>,
}

impl FilePreferences {
    /// Open the store, starting empty when the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let path = path.as_ref().to_path_buf();
        let cache = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), entries = cache.len(), "Preferences loaded");
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }
}

impl PreferenceStore for FilePreferences {
    fn get_bool(&self, key: &str) -> Option<bool> {
        lock(&self.cache).get(key).and_then(Value::as_bool)
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<(), PreferencesError> {
        let mut cache = lock(&self.cache);
        let previous = cache.insert(key.to_string(), Value::Bool(value));

        let written = serde_json::to_vec_pretty(&*cache)
            .map_err(PreferencesError::from)
            .and_then(|bytes| std::fs::write(&self.path, bytes).map_err(PreferencesError::from));

        if let Err(e) = written {
            // Keep the cache in step with the file
            match previous {
                Some(v) => cache.insert(key.to_string(), v),
                None => cache.remove(key),
            };
            return Err(e);
        }

        tracing::debug!(key, value, "Preference saved");
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let prefs = MemoryPreferences::new();
        assert_eq!(prefs.get_bool(CAMERA_ENABLED_KEY), None);
        prefs.put_bool(CAMERA_ENABLED_KEY, false).unwrap();
        assert_eq!(prefs.get_bool(CAMERA_ENABLED_KEY), Some(false));
    }

    #[test]
    fn test_file_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let prefs = FilePreferences::open(&path).unwrap();
        assert_eq!(prefs.get_bool(CAMERA_ENABLED_KEY), None);
        prefs.put_bool(CAMERA_ENABLED_KEY, false).unwrap();

        let reopened = FilePreferences::open(&path).unwrap();
        assert_eq!(reopened.get_bool(CAMERA_ENABLED_KEY), Some(false));
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, b"not json").unwrap();

        assert!(matches!(FilePreferences::open(&path), Err(PreferencesError::Format(_))));
    }

    #[test]
    fn test_failed_write_leaves_cache_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        // Path is a directory, so the write fails
        let prefs = FilePreferences {
            path: dir.path().to_path_buf(),
            cache: Mutex::new(BTreeMap::new()),
        };

        assert!(prefs.put_bool(CAMERA_ENABLED_KEY, true).is_err());
        assert_eq!(prefs.get_bool(CAMERA_ENABLED_KEY), None);
    }
}
