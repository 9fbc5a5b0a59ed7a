use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use keeper_core::auth::UnlockOutcome;
use keeper_core::biometric::NoBiometric;
use keeper_core::controller::CollectionController;
use keeper_core::editor::{DeleteOutcome, EditorSession, Field};
use keeper_core::entry::Entry;
use keeper_core::paths::data_dir;
use keeper_core::prompt::Prompter;
use keeper_core::settings::{load_settings, KeeperSettings};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod terminal;

use crate::terminal::TerminalPrompter;

#[derive(Parser)]
#[command(name = "keeper")]
#[command(author, version, about = "Local password manager", long_about = None)]
struct Cli {
    /// Directory holding the collection and settings
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Answer yes to confirmation prompts
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the unlock password for the first time
    Init,

    /// Replace the unlock password
    ChangeSecret,

    /// List entries, newest first (masked unless --unlock)
    List {
        #[arg(long)]
        unlock: bool,
    },

    /// Print one entry including its password
    Show { index: usize },

    /// Add an entry
    Add {
        #[arg(long)]
        source: String,
        /// Prompt for the password instead of leaving it empty
        #[arg(long)]
        with_password: bool,
    },

    /// Create a "New Account" placeholder and optionally fill it
    New {
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        with_password: bool,
    },

    /// Edit an entry's label and/or password
    Edit {
        index: usize,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        with_password: bool,
    },

    /// Delete one or more entries by their current index
    Delete {
        #[arg(required = true)]
        indices: Vec<usize>,
    },

    /// Delete every entry
    DeleteAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data = match cli.data_dir {
        Some(dir) => dir,
        None => data_dir()?,
    };
    let settings = load_settings(&data.join("settings.json"))?;
    init_tracing(&settings);

    let prompter = TerminalPrompter::new(cli.yes);
    let store = settings.store_in(&data);
    let auth = settings.auth_gate(Arc::new(NoBiometric));
    let mut controller = CollectionController::new(store, auth);
    let count = controller.load_initial().await;
    info!(count, data_dir = %data.display(), "keeper ready");

    match cli.command {
        Commands::Init => {
            if controller.auth().has_secret() {
                bail!("a password is already set; use change-secret");
            }
            set_secret(&mut controller, &prompter).await?;
            println!("Password set");
        }

        Commands::ChangeSecret => {
            unlock(&mut controller, &prompter).await?;
            set_secret(&mut controller, &prompter).await?;
            println!("Password changed");
        }

        Commands::List { unlock: reveal } => {
            if reveal {
                unlock(&mut controller, &prompter).await?;
            }
            let rows: Vec<_> = controller
                .rows()
                .into_iter()
                .enumerate()
                .map(|(index, row)| {
                    serde_json::json!({
                        "index": index,
                        "source": row.label,
                        "modified": row.modified_at.map(|t| t.to_rfc3339()),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }

        Commands::Show { index } => {
            unlock(&mut controller, &prompter).await?;
            let entry = controller.entry(index)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "source": entry.source,
                    "password": entry.password,
                    "modified": entry.modified_at.to_rfc3339(),
                }))?
            );
        }

        Commands::Add {
            source,
            with_password,
        } => {
            unlock(&mut controller, &prompter).await?;
            let password = if with_password {
                read_password(&prompter).await?
            } else {
                String::new()
            };
            let index = controller.add(Entry::new(source, password))?;
            println!("Added entry at index {index}");
        }

        Commands::New {
            source,
            with_password,
        } => {
            unlock(&mut controller, &prompter).await?;
            let index = controller.add(Entry::new_account())?;
            let mut session = controller.open_session(index)?;
            session.begin_edit()?;
            fill_fields(&mut session, source, with_password, &prompter).await?;
            session.on_host_disappear(&mut controller)?;
            println!("Created entry");
        }

        Commands::Edit {
            index,
            source,
            with_password,
        } => {
            unlock(&mut controller, &prompter).await?;
            let mut session = controller.open_session(index)?;
            session.begin_edit()?;
            fill_fields(&mut session, source, with_password, &prompter).await?;
            session.on_host_disappear(&mut controller)?;
            println!("Updated entry");
        }

        Commands::Delete { indices } => {
            unlock(&mut controller, &prompter).await?;
            let indices: BTreeSet<usize> = indices.into_iter().collect();
            if let Some(&index) = indices.first().filter(|_| indices.len() == 1) {
                let mut session = controller.open_session(index)?;
                match session.delete(&mut controller, &prompter).await? {
                    DeleteOutcome::Deleted => println!("Deleted 1 entry"),
                    DeleteOutcome::Cancelled => println!("Cancelled"),
                }
            } else if prompter
                .confirm(&format!("Delete {} entries?", indices.len()))
                .await
            {
                let removed = controller.delete_at(&indices)?;
                println!("Deleted {removed} entries");
            } else {
                println!("Cancelled");
            }
        }

        Commands::DeleteAll => {
            unlock(&mut controller, &prompter).await?;
            if prompter
                .confirm("Are you sure to delete all your entries?")
                .await
            {
                controller.delete_all()?;
                println!("Deleted all entries");
            } else {
                println!("Cancelled");
            }
        }
    }

    if controller.is_unlocked() {
        controller.lock();
    }
    controller.flush().await?;
    Ok(())
}

fn init_tracing(settings: &KeeperSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn unlock(controller: &mut CollectionController, prompter: &dyn Prompter) -> Result<()> {
    // A first run creates the secret, then authenticates with it.
    for _ in 0..2 {
        match controller.unlock_with(prompter).await? {
            UnlockOutcome::Unlocked(_) => return Ok(()),
            UnlockOutcome::SecretCreated => continue,
            UnlockOutcome::SetupRejected(e) => return Err(e.into()),
            UnlockOutcome::Cancelled => bail!("authentication cancelled"),
        }
    }
    Err(anyhow!("authentication failed"))
}

async fn set_secret(controller: &mut CollectionController, prompter: &dyn Prompter) -> Result<()> {
    let candidate = prompter
        .ask_secret("New password")
        .await
        .ok_or_else(|| anyhow!("cancelled"))?;
    let confirm = prompter
        .ask_secret("Confirm password")
        .await
        .ok_or_else(|| anyhow!("cancelled"))?;
    controller.set_secret(&candidate, &confirm)?;
    Ok(())
}

async fn read_password(prompter: &dyn Prompter) -> Result<String> {
    let secret = prompter
        .ask_secret("Entry password")
        .await
        .ok_or_else(|| anyhow!("cancelled"))?;
    Ok(secret.to_string())
}

async fn fill_fields(
    session: &mut EditorSession,
    source: Option<String>,
    with_password: bool,
    prompter: &dyn Prompter,
) -> Result<()> {
    if let Some(source) = source {
        session.set_field(Field::Source, source)?;
    }
    if with_password {
        let password = read_password(prompter).await?;
        session.set_field(Field::Password, password)?;
    }
    Ok(())
}
