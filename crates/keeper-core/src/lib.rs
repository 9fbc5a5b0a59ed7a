//! keeper-core: local password store with gated access.
//!
//! The [`controller::CollectionController`] owns the single in-memory list of
//! [`entry::Entry`] records, persists a full snapshot after every mutation via
//! [`store::Store`], and refuses to reveal or change anything while its
//! [`auth::AuthGate`] is locked. Detail editing goes through an
//! [`editor::EditorSession`] bound to one position in that list.

pub mod auth;
pub mod biometric;
pub mod controller;
pub mod editor;
pub mod entry;
pub mod error;
pub mod paths;
pub mod prompt;
pub mod secure_storage;
pub mod settings;
pub mod store;

pub use auth::{AuthGate, AuthInput, AuthState};
pub use controller::{CollectionController, CollectionEvent};
pub use editor::{EditorSession, Field};
pub use entry::Entry;
pub use store::Store;
