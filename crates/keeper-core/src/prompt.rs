use async_trait::async_trait;
use zeroize::Zeroizing;

/// Confirmation and text-input dialogs supplied by the presentation layer.
/// `None` from an input prompt means the user cancelled.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;

    async fn ask_secret(&self, prompt: &str) -> Option<Zeroizing<String>>;
}
