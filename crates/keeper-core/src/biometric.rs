//! Biometric collaborator contract.
//!
//! The platform check (Touch ID, Windows Hello, fprintd) lives outside the
//! core; the gate only needs to know whether it can run and whether it
//! succeeded.

use async_trait::async_trait;

use crate::error::BiometricError;

pub const DEFAULT_REASON: &str = "Unlock your saved passwords";

#[async_trait]
pub trait Biometric: Send + Sync {
    fn can_evaluate(&self) -> bool;

    async fn evaluate(&self, reason: &str) -> Result<(), BiometricError>;
}

/// Used where no biometric hardware is wired in; unlocking falls back to the
/// stored secret.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBiometric;

#[async_trait]
impl Biometric for NoBiometric {
    fn can_evaluate(&self) -> bool {
        false
    }

    async fn evaluate(&self, _reason: &str) -> Result<(), BiometricError> {
        Err(BiometricError::Unavailable)
    }
}
