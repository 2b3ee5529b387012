//! Conflict resolution outside a full sync.

use anyhow::{anyhow, Result};
use colored::Colorize;

use crate::config::AppConfig;
use crate::editor::NoopEditor;
use crate::events::render_events;
use crate::prompt::{is_interactive, TerminalPrompter};
use crate::sync::{spawn_reconcile, SyncOutcome, SyncWorker};

/// Handle `ogresync resolve`
///
/// Continues an unfinished file-level resolution, or reconciles with the
/// remote from scratch, and pushes the result.
pub fn handle_resolve() -> Result<()> {
    let config = AppConfig::load()?;
    if !config.capabilities.conflict_resolution {
        return Err(anyhow!("Conflict resolution is disabled in the configuration"));
    }
    if !is_interactive() {
        return Err(anyhow!("'ogresync resolve' needs an interactive terminal"));
    }

    println!("{}", "Resolving conflicts with the remote...".cyan().bold());
    let mut worker = SyncWorker::new();
    let rx = spawn_reconcile(&mut worker, config, Box::new(NoopEditor::default()))?;
    let rendered = render_events(rx, &mut TerminalPrompter);
    let outcome = worker.join().unwrap_or(rendered);

    match outcome {
        SyncOutcome::Completed => {
            println!("{} {}", "✓".green(), "Vault reconciled with the remote".green());
            Ok(())
        }
        SyncOutcome::Cancelled => Ok(()),
        SyncOutcome::Failed(msg) => Err(anyhow!(msg)),
    }
}
