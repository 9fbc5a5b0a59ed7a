//! Access gate in front of the collection.
//!
//! The gate starts `Locked` and only opens through a successful biometric
//! check or a matching fallback secret. Closing it is always explicit; there
//! is no inactivity timer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::biometric::{Biometric, DEFAULT_REASON};
use crate::error::{AuthError, SetSecretError};
use crate::prompt::Prompter;
use crate::secure_storage::{SecretBackend, APP_SECRET_KEY};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthState {
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMethod {
    Biometric,
    Secret,
}

/// Proof of a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unlocked {
    pub method: AuthMethod,
    pub at: DateTime<Utc>,
}

pub enum AuthInput {
    Biometric,
    Secret(Zeroizing<String>),
}

impl AuthInput {
    pub fn secret(value: &str) -> Self {
        AuthInput::Secret(Zeroizing::new(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked(Unlocked),
    /// No secret existed and the user just created one; authenticate next.
    SecretCreated,
    SetupRejected(SetSecretError),
    Cancelled,
}

pub struct AuthGate {
    state: AuthState,
    secrets: Arc<dyn SecretBackend>,
    biometric: Arc<dyn Biometric>,
    secret_key: String,
    reason: String,
}

impl AuthGate {
    pub fn new(secrets: Arc<dyn SecretBackend>, biometric: Arc<dyn Biometric>) -> Self {
        Self {
            state: AuthState::Locked,
            secrets,
            biometric,
            secret_key: APP_SECRET_KEY.to_string(),
            reason: DEFAULT_REASON.to_string(),
        }
    }

    pub fn with_secret_key(mut self, key: impl Into<String>) -> Self {
        self.secret_key = key.into();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn is_unlocked(&self) -> bool {
        self.state == AuthState::Unlocked
    }

    pub fn has_secret(&self) -> bool {
        match self.secrets.has(&self.secret_key) {
            Ok(present) => present,
            Err(e) => {
                warn!(error = %e, "secure storage lookup failed");
                false
            }
        }
    }

    pub fn biometric_available(&self) -> bool {
        self.biometric.can_evaluate()
    }

    /// Replacing an existing secret requires an open gate; the first secret
    /// can be set while locked.
    pub fn set_secret(&mut self, candidate: &str, confirm: &str) -> Result<(), SetSecretError> {
        if self.state == AuthState::Locked && self.has_secret() {
            return Err(SetSecretError::Locked);
        }
        if candidate.is_empty() || confirm.is_empty() {
            return Err(SetSecretError::Empty);
        }
        if candidate != confirm {
            return Err(SetSecretError::Mismatch);
        }
        self.secrets
            .set(&self.secret_key, candidate)
            .map_err(|e| SetSecretError::Storage(e.to_string()))?;
        info!("unlock secret updated");
        Ok(())
    }

    pub async fn authenticate(&mut self, input: AuthInput) -> Result<Unlocked, AuthError> {
        let method = match input {
            AuthInput::Biometric => {
                if !self.biometric.can_evaluate() {
                    return Err(AuthError::BiometricUnavailable);
                }
                if let Err(e) = self.biometric.evaluate(&self.reason).await {
                    warn!(error = %e, "biometric check failed");
                    return Err(e.into());
                }
                AuthMethod::Biometric
            }
            AuthInput::Secret(candidate) => {
                let stored = self
                    .secrets
                    .get(&self.secret_key)
                    .map_err(|e| AuthError::Storage(e.to_string()))?
                    .ok_or(AuthError::NoSecretSet)?;
                if candidate.as_str() != stored.as_str() {
                    warn!("secret authentication rejected");
                    return Err(AuthError::Mismatch);
                }
                AuthMethod::Secret
            }
        };
        self.state = AuthState::Unlocked;
        info!(?method, "unlocked");
        Ok(Unlocked {
            method,
            at: Utc::now(),
        })
    }

    pub fn lock(&mut self) {
        if self.state == AuthState::Unlocked {
            info!("locked");
        }
        self.state = AuthState::Locked;
    }

    /// Full unlock flow: biometric when the device supports it, else the
    /// stored secret, else first-time secret setup.
    pub async fn unlock_with(&mut self, prompter: &dyn Prompter) -> Result<UnlockOutcome, AuthError> {
        if self.biometric.can_evaluate() {
            return self
                .authenticate(AuthInput::Biometric)
                .await
                .map(UnlockOutcome::Unlocked);
        }

        if self.has_secret() {
            let Some(entered) = prompter.ask_secret("Please provide your password").await else {
                return Ok(UnlockOutcome::Cancelled);
            };
            return self
                .authenticate(AuthInput::Secret(entered))
                .await
                .map(UnlockOutcome::Unlocked);
        }

        let Some(candidate) = prompter.ask_secret("Please set a password").await else {
            return Ok(UnlockOutcome::Cancelled);
        };
        let Some(confirm) = prompter.ask_secret("Confirm password").await else {
            return Ok(UnlockOutcome::Cancelled);
        };
        match self.set_secret(&candidate, &confirm) {
            Ok(()) => Ok(UnlockOutcome::SecretCreated),
            Err(e) => Ok(UnlockOutcome::SetupRejected(e)),
        }
    }
}
