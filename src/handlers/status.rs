//! Status command handler

use anyhow::Result;
use colored::Colorize;

use super::open_tracker;
use crate::conflict::last_commit_is_resolution;
use crate::config::AppConfig;

/// Handle `ogresync status`
pub fn handle_status() -> Result<()> {
    let config = AppConfig::load()?;
    let tracker = open_tracker(&config)?;
    let probe = super::open_probe(&config)?;

    println!("{}", "Ogresync Status".cyan().bold());
    println!("{}", "=".repeat(60).cyan());
    println!("  {} {}", "Vault:".bold(), config.vault_path.display());
    println!(
        "  {} {}",
        "Branch:".bold(),
        probe
            .current_branch()
            .unwrap_or_else(|| format!("{} (no commits)", config.branch))
    );
    match probe.git().get_remote_url(&config.remote_name) {
        Some(url) => println!("  {} {} -> {}", "Remote:".bold(), config.remote_name, url),
        None => println!("  {} {}", "Remote:".bold(), "not configured".yellow()),
    }

    let online = probe.network_reachable();
    println!(
        "  {} {}",
        "Network:".bold(),
        if online { "online".green() } else { "offline".yellow() }
    );

    let (ahead, behind) = probe.ahead_behind_counts();
    println!(
        "  {} {} ahead, {} behind {} (as of last fetch)",
        "Commits:".bold(),
        ahead,
        behind,
        probe.remote_ref()
    );
    if probe.has_uncommitted_changes() {
        println!("  {} {}", "Working tree:".bold(), "uncommitted changes".yellow());
    } else {
        println!("  {} {}", "Working tree:".bold(), "clean".green());
    }

    if probe.merge_in_progress() {
        let unmerged = probe.unmerged_files();
        println!(
            "  {} merge in progress, {} file(s) unresolved; run 'ogresync resolve'",
            "!".yellow(),
            unmerged.len()
        );
        for file in unmerged {
            println!("      {}", file.red());
        }
    }
    if probe.rebase_in_progress() {
        println!(
            "  {} rebase in progress; the next sync or 'ogresync resolve' aborts it",
            "!".yellow()
        );
    }
    if last_commit_is_resolution(probe.git()) {
        println!("  {} last commit is a conflict resolution", "i".cyan());
    }

    println!();
    println!("  {} {}", "Sessions:".bold(), tracker.status_message());
    Ok(())
}
