use thiserror::Error;

/// A snapshot could not be written. The in-memory collection is untouched and
/// the next mutation re-issues a full write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistError {
    #[error("Failed to encode collection: {0}")]
    Encode(String),

    #[error("Failed to write collection: {0}")]
    Write(String),

    #[error("Persistence worker stopped")]
    WorkerGone,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetSecretError {
    #[error("Missing password or confirmation")]
    Empty,

    #[error("The passwords don't match")]
    Mismatch,

    #[error("Unlock first to change the existing password")]
    Locked,

    #[error("Secure storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Biometric authentication is not available on this device")]
    BiometricUnavailable,

    #[error("Biometric authentication failed: {0}")]
    BiometricFailed(String),

    #[error("No password has been set")]
    NoSecretSet,

    #[error("You could not be verified; please try again")]
    Mismatch,

    #[error("Secure storage error: {0}")]
    Storage(String),
}

/// Returned by the platform biometric check.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BiometricError {
    #[error("biometry not available")]
    Unavailable,

    #[error("{0}")]
    Failed(String),
}

impl From<BiometricError> for AuthError {
    fn from(e: BiometricError) -> Self {
        match e {
            BiometricError::Unavailable => AuthError::BiometricUnavailable,
            BiometricError::Failed(reason) => AuthError::BiometricFailed(reason),
        }
    }
}

/// Rejections at the collection controller boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("Please authenticate to access passwords")]
    Locked,

    #[error("Entry {index} no longer exists (collection holds {len})")]
    StaleTarget { index: usize, len: usize },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditorError {
    #[error("Please authenticate to access passwords")]
    Locked,

    #[error("The entry being edited no longer exists")]
    StaleTarget,

    #[error("Unknown field tag {0}")]
    UnknownField(i64),

    #[error("Fields are locked; begin editing first")]
    NotEditing,

    #[error("Editor session is closed")]
    Closed,
}

impl From<AccessError> for EditorError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Locked => EditorError::Locked,
            AccessError::StaleTarget { .. } => EditorError::StaleTarget,
        }
    }
}
