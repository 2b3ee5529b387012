//! Offline session command handlers

use anyhow::Result;
use colored::Colorize;

use super::open_tracker;
use crate::config::AppConfig;
use crate::offline::describe;

/// Handle `ogresync sessions list`
pub fn handle_sessions_list(json: bool) -> Result<()> {
    let config = AppConfig::load()?;
    let tracker = open_tracker(&config)?;

    if json {
        let report = serde_json::json!({
            "summary": tracker.session_summary(),
            "sessions": tracker.state().offline_sessions,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let summary = tracker.session_summary();
    println!("{}", "Sync Sessions".cyan().bold());
    println!("{}", "=".repeat(80).cyan());
    println!("  {}", describe(&summary));

    let sessions = &tracker.state().offline_sessions;
    if sessions.is_empty() {
        println!("{}", "No sessions recorded.".yellow());
        return Ok(());
    }

    for session in sessions.iter().rev() {
        let flag = if session.is_open() {
            "open".yellow()
        } else if session.requires_conflict_resolution {
            "needs resolution".red()
        } else {
            "resolved".green()
        };
        println!(
            "\n{} {} [{}]",
            session.session_id.bold(),
            session.sync_mode,
            flag
        );
        println!(
            "   {} {}",
            "Started:".dimmed(),
            session
                .start_time
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
        );
        if !session.local_commits.is_empty() {
            println!(
                "   {} {}",
                "Commits:".dimmed(),
                session.local_commits.len()
            );
        }
        if let Some(id) = &session.backup_id {
            println!("   {} {}", "Backup:".dimmed(), id);
        }
    }
    println!(
        "\n{} {} total, {} started offline, {} unpushed commit(s)",
        "Summary:".bold(),
        summary.total_sessions,
        summary.offline_sessions,
        summary.unpushed_commits
    );
    Ok(())
}

/// Handle `ogresync sessions cleanup`
pub fn handle_sessions_cleanup(aggressive: bool) -> Result<()> {
    let config = AppConfig::load()?;
    let mut tracker = open_tracker(&config)?;
    let removed = tracker.cleanup_sessions(aggressive);
    if removed > 0 {
        println!("{} Removed {} resolved session(s)", "✓".green(), removed);
    } else {
        println!("{}", "No sessions to remove".dimmed());
    }
    Ok(())
}
