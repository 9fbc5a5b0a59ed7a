use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::AuthGate;
use crate::biometric::{Biometric, DEFAULT_REASON};
use crate::secure_storage::{KeyringBackend, APP_SECRET_KEY, SERVICE_NAME};
use crate::store::{Store, PASSWORD_KEY};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageSettings {
    /// Key under which the whole collection blob is stored.
    pub collection_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecuritySettings {
    pub keyring_service: String,
    pub secret_key: String,
    pub biometric_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingSettings {
    /// `tracing-subscriber` filter used when `RUST_LOG` is unset.
    pub filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeeperSettings {
    #[serde(default = "default_storage")]
    pub storage: StorageSettings,
    #[serde(default = "default_security")]
    pub security: SecuritySettings,
    #[serde(default = "default_logging")]
    pub logging: LoggingSettings,
}

impl Default for KeeperSettings {
    fn default() -> Self {
        Self {
            storage: default_storage(),
            security: default_security(),
            logging: default_logging(),
        }
    }
}

impl KeeperSettings {
    pub fn store_in(&self, data_dir: &Path) -> Store {
        Store::with_key(
            Arc::new(crate::store::FileBackend::new(data_dir)),
            self.storage.collection_key.clone(),
        )
    }

    pub fn auth_gate(&self, biometric: Arc<dyn Biometric>) -> AuthGate {
        AuthGate::new(
            Arc::new(KeyringBackend::new(self.security.keyring_service.clone())),
            biometric,
        )
        .with_secret_key(self.security.secret_key.clone())
        .with_reason(self.security.biometric_reason.clone())
    }
}

fn default_storage() -> StorageSettings {
    StorageSettings {
        collection_key: PASSWORD_KEY.to_string(),
    }
}

fn default_security() -> SecuritySettings {
    SecuritySettings {
        keyring_service: SERVICE_NAME.to_string(),
        secret_key: APP_SECRET_KEY.to_string(),
        biometric_reason: DEFAULT_REASON.to_string(),
    }
}

fn default_logging() -> LoggingSettings {
    LoggingSettings {
        filter: "info".to_string(),
    }
}

/// Missing file means defaults; a malformed one is an error so a typo never
/// silently points the store somewhere else.
pub fn load_settings(path: &Path) -> Result<KeeperSettings> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| anyhow!("parse settings {}: {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file; using defaults");
            Ok(KeeperSettings::default())
        }
        Err(e) => Err(anyhow!("read settings {}: {e}", path.display())),
    }
}

pub fn save_settings(path: &Path, settings: &KeeperSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(settings)?;
    fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = load_settings(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, KeeperSettings::default());
        assert_eq!(settings.storage.collection_key, PASSWORD_KEY);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, br#"{"logging":{"filter":"debug"}}"#).unwrap();
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.logging.filter, "debug");
        assert_eq!(settings.security.keyring_service, SERVICE_NAME);
    }

    #[test]
    fn roundtrip_and_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = KeeperSettings::default();
        settings.storage.collection_key = "vault".into();
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);

        fs::write(&path, b"not json").unwrap();
        assert!(load_settings(&path).is_err());
    }
}
