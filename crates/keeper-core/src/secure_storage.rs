use std::collections::HashMap;

use anyhow::{anyhow, Result};
use keyring::Entry as KeyringEntry;
use parking_lot::Mutex;
use zeroize::Zeroizing;

pub const SERVICE_NAME: &str = "Keeper";
pub const APP_SECRET_KEY: &str = "password";

/// Opaque secure key → string storage holding the fallback unlock secret.
pub trait SecretBackend: Send + Sync {
    fn has(&self, key: &str) -> Result<bool>;
    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// Platform credential store (Keychain, Secret Service, Credential Manager).
#[derive(Debug, Clone)]
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<KeyringEntry> {
        KeyringEntry::new(&self.service, key).map_err(|e| anyhow!("keyring init: {e}"))
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl SecretBackend for KeyringBackend {
    fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(Some(Zeroizing::new(secret))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow!("load secret: {e}")),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| anyhow!("store secret: {e}"))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow!("delete secret: {e}")),
        }
    }
}

/// Process-local backend for tests and headless runs.
#[derive(Default)]
pub struct MemorySecretBackend {
    secrets: Mutex<HashMap<String, Zeroizing<String>>>,
}

impl MemorySecretBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretBackend for MemorySecretBackend {
    fn has(&self, key: &str) -> Result<bool> {
        Ok(self.secrets.lock().contains_key(key))
    }

    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>> {
        Ok(self.secrets.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.secrets
            .lock()
            .insert(key.to_string(), Zeroizing::new(value.to_string()));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.secrets.lock().remove(key);
        Ok(())
    }
}
