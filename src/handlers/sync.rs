//! Sync command handler
//!
//! Runs the orchestrator on a worker thread and renders its events here.

use anyhow::{anyhow, Result};
use colored::Colorize;

use crate::config::AppConfig;
use crate::editor::{EditorLauncher, NoopEditor, ProcessEditor};
use crate::events::render_events;
use crate::prompt::{is_interactive, NonInteractivePrompter, Prompter, TerminalPrompter};
use crate::sync::{spawn_sync, SyncOutcome, SyncWorker};

/// Command-line overrides for one sync run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncFlags {
    pub no_editor: bool,
    pub non_interactive: bool,
}

/// Handle `ogresync sync`
pub fn handle_sync(flags: SyncFlags) -> Result<()> {
    let mut config = AppConfig::load()?;
    if flags.no_editor {
        config.capabilities.launch_editor = false;
    }
    if flags.non_interactive || !is_interactive() {
        config.capabilities.interactive = false;
    }

    println!("{}", "=== Ogresync ===".bold().cyan());
    println!("  {} {}", "Vault:".dimmed(), config.vault_path.display());

    let editor: Box<dyn EditorLauncher> = if config.capabilities.launch_editor {
        Box::new(ProcessEditor::new(&config.editor))
    } else {
        Box::new(NoopEditor::default())
    };
    let mut prompter: Box<dyn Prompter> = if config.capabilities.interactive {
        Box::new(TerminalPrompter)
    } else {
        Box::new(NonInteractivePrompter)
    };

    let mut worker = SyncWorker::new();
    let rx = spawn_sync(&mut worker, config, editor)?;
    let rendered = render_events(rx, prompter.as_mut());
    let outcome = worker.join().unwrap_or(rendered);

    match outcome {
        SyncOutcome::Completed => Ok(()),
        SyncOutcome::Cancelled => {
            println!(
                "  {} Nothing was pushed; run 'ogresync sync' again when ready",
                "Note:".yellow()
            );
            Ok(())
        }
        SyncOutcome::Failed(msg) => Err(anyhow!(msg)),
    }
}
