use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::entry::Entry;
use crate::error::PersistError;

pub const PASSWORD_KEY: &str = "password";

/// Durable key → blob storage. Writes replace the whole value.
pub trait BlobBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn write(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// One file per key inside a directory; writes go through a temp file and
/// a rename so readers never observe a partial blob.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl BlobBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow!("read {key}: {e}")),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| anyhow!("create store dir: {e}"))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| anyhow!("create temp file: {e}"))?;
        tmp.write_all(value)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(key))
            .map_err(|e| anyhow!("replace {key}: {e}"))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a raw value, e.g. to simulate a corrupt or legacy blob.
    pub fn insert_raw(&self, key: &str, value: &[u8]) {
        self.blobs.lock().insert(key.to_string(), value.to_vec());
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().get(key).cloned()
    }
}

impl BlobBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        self.blobs.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Loads and saves the whole collection as a single JSON blob.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn BlobBackend>,
    key: String,
}

impl Store {
    pub fn new(backend: Arc<dyn BlobBackend>) -> Self {
        Self::with_key(backend, PASSWORD_KEY)
    }

    pub fn with_key(backend: Arc<dyn BlobBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn open_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self::new(Arc::new(FileBackend::new(dir)))
    }

    /// Never fails: a missing, unreadable or undecodable blob yields an
    /// empty collection.
    pub fn load(&self) -> Vec<Entry> {
        let bytes = match self.backend.read(&self.key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %self.key, "no stored collection; starting empty");
                return Vec::new();
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "stored collection unreadable; starting empty");
                return Vec::new();
            }
        };
        match serde_json::from_slice::<Vec<Entry>>(&bytes) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(key = %self.key, error = %e, "stored collection corrupt; starting empty");
                Vec::new()
            }
        }
    }

    pub fn save(&self, entries: &[Entry]) -> Result<(), PersistError> {
        let data = serde_json::to_vec(entries).map_err(|e| PersistError::Encode(e.to_string()))?;
        self.backend
            .write(&self.key, &data)
            .map_err(|e| PersistError::Write(e.to_string()))?;
        debug!(key = %self.key, count = entries.len(), "collection saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn sample() -> Vec<Entry> {
        vec![
            Entry::at("mail", "hunter2", Utc.timestamp_opt(200, 0).unwrap()),
            Entry::at("bank", "", Utc.timestamp_opt(100, 0).unwrap()),
        ]
    }

    #[test]
    fn file_roundtrip_keeps_empty_passwords() {
        let dir = tempdir().unwrap();
        let store = Store::open_dir(dir.path());
        store.save(&sample()).unwrap();
        assert_eq!(store.load(), sample());
    }

    #[test]
    fn missing_blob_loads_empty() {
        let dir = tempdir().unwrap();
        let store = Store::open_dir(dir.path().join("not-created-yet"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_blob_loads_empty() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_raw(PASSWORD_KEY, b"{not json");
        let store = Store::new(backend.clone());
        assert!(store.load().is_empty());

        backend.insert_raw(PASSWORD_KEY, br#"[{"source":"x"}]"#);
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_replaces_whole_blob() {
        let dir = tempdir().unwrap();
        let store = Store::open_dir(dir.path());
        store.save(&sample()).unwrap();
        store.save(&sample()[..1]).unwrap();
        assert_eq!(store.load(), sample()[..1].to_vec());

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "temp files must not linger: {leftovers:?}");
    }

    #[test]
    fn blob_is_a_json_list_of_records() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Store::new(backend.clone());
        store.save(&sample()).unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&backend.raw(PASSWORD_KEY).unwrap()).unwrap();
        let first = &raw.as_array().unwrap()[0];
        assert_eq!(first["source"], "mail");
        assert_eq!(first["password"], "hunter2");
        assert!(first["date"].is_string());
    }
}
