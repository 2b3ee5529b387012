use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::Path;

use crate::backup::{collect_meaningful_files, ensure_ignore_entries, BackupManager, BackupReason};
use crate::config::AppConfig;
use crate::events::EventSink;
use crate::scm::GitScm;

pub const PLACEHOLDER_FILE: &str = "README.md";
pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit - auto-sync";

const PLACEHOLDER_CONTENT: &str =
    "# Vault\n\nThis vault is synchronized with git by ogresync.\n";

/// Make sure HEAD exists.
///
/// An empty vault gets a placeholder README so the first commit has
/// something in it. Returns true if a commit was created.
pub fn ensure_local_head(git: &GitScm, events: &EventSink) -> Result<bool> {
    ensure_ignore_entries(git.workdir())?;
    if git.head_hash().is_some() {
        return Ok(false);
    }

    if collect_meaningful_files(git.workdir()).is_empty() {
        let placeholder = git.workdir().join(PLACEHOLDER_FILE);
        fs::write(&placeholder, PLACEHOLDER_CONTENT)
            .with_context(|| format!("Failed to write {}", placeholder.display()))?;
        events.log(format!("Vault is empty; created placeholder {}", PLACEHOLDER_FILE));
    }

    git.ensure_identity()?;
    git.stage_all()?;
    git.commit(INITIAL_COMMIT_MESSAGE)?;
    events.log("Created initial commit");
    Ok(true)
}

/// Prepare a vault for syncing and write the configuration.
///
/// Initializes the repository when needed, points the remote at
/// `remote_url` and takes a setup-safety backup of any existing notes.
pub fn init_vault(vault: &Path, remote_url: Option<&str>, branch: &str) -> Result<AppConfig> {
    println!("{}", "Initializing ogresync vault...".cyan().bold());

    let git = if crate::scm::is_repo(vault) {
        println!("  {} existing repository at {}", "Using".green(), vault.display());
        GitScm::open(vault)?
    } else {
        println!("  {} new repository at {}", "Creating".green(), vault.display());
        GitScm::init(vault, branch)?
    };
    git.ensure_identity()?;

    let mut config = AppConfig::new(git.workdir());
    config.branch = branch.to_string();
    config.remote_url = remote_url.map(str::to_string);

    if let Some(url) = remote_url {
        git.ensure_remote(&config.remote_name, url)?;
        println!("  {} remote '{}' -> {}", "Set".green(), config.remote_name, url);
    }

    if ensure_ignore_entries(git.workdir())? {
        println!("  {} .gitignore entries for ogresync files", "Added".green());
    }

    if !collect_meaningful_files(git.workdir()).is_empty() {
        let backups = BackupManager::new(git.workdir(), config.backup);
        match backups.create_backup(
            BackupReason::SetupSafety,
            "Vault contents before first sync setup",
            None,
        ) {
            Some(id) => println!("  {} safety backup {}", "Created".green(), id),
            None => println!("  {} could not create a safety backup", "Warning:".yellow()),
        }
    }

    let path = config.save()?;
    println!("  {} configuration to {}", "Saved".green(), path.display());
    println!("{}", "Vault initialized successfully!".green().bold());
    println!("\n{} ogresync sync", "Next steps:".cyan().bold());
    Ok(config)
}
