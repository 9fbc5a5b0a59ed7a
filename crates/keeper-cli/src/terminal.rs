use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use keeper_core::prompt::Prompter;
use zeroize::Zeroizing;

/// Prompts on the controlling terminal. Reads run on the blocking pool so the
/// interactive task never stalls on stdin.
pub struct TerminalPrompter {
    assume_yes: bool,
}

impl TerminalPrompter {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            eprint!("{message} [y/N] ");
            let _ = io::stderr().flush();
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
                Err(_) => false,
            }
        })
        .await
        .unwrap_or(false)
    }

    async fn ask_secret(&self, prompt: &str) -> Option<Zeroizing<String>> {
        let prompt = format!("{prompt}: ");
        tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt).ok())
            .await
            .ok()
            .flatten()
            .map(Zeroizing::new)
    }
}
