//! Backup command handlers
//!
//! Listing, manual snapshots and retention cleanup for the vault's
//! `.ogresync-backups` directory.

use anyhow::{anyhow, Result};
use colored::Colorize;

use crate::backup::{BackupManager, BackupReason};
use crate::config::AppConfig;

fn manager() -> Result<BackupManager> {
    let config = AppConfig::load()?;
    Ok(BackupManager::new(&config.vault_path, config.backup))
}

/// Handle `ogresync backup list`
pub fn handle_backup_list(limit: usize) -> Result<()> {
    let backups = manager()?.list_backups();
    if backups.is_empty() {
        println!("{}", "No backups yet.".yellow());
        return Ok(());
    }

    println!("{}", "Backups (newest first)".cyan().bold());
    println!("{}", "=".repeat(80).cyan());
    for (idx, record) in backups.iter().take(limit).enumerate() {
        println!("\n{} {}", format!("{}.", idx + 1).bold(), record.backup_id.bold());
        println!(
            "   {} {}",
            "Created:".dimmed(),
            record
                .created_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
        );
        println!("   {} {}", "Reason:".dimmed(), record.reason);
        println!("   {} {}", "Description:".dimmed(), record.description);
        println!(
            "   {} {} ({:.1} KB)",
            "Files:".dimmed(),
            record.files_backed_up.len(),
            record.size_bytes as f64 / 1024.0
        );
        println!("   {} {}", "Location:".dimmed(), record.snapshot_path.display());
        if let Some(path) = &record.recovery_instructions_path {
            println!("   {} {}", "Recovery:".dimmed(), path.display());
        }
    }
    if backups.len() > limit {
        println!(
            "\n{}",
            format!("... and {} more", backups.len() - limit).dimmed()
        );
    }
    Ok(())
}

/// Handle `ogresync backup create`
pub fn handle_backup_create(description: &str) -> Result<()> {
    let manager = manager()?;
    let id = manager
        .create_backup(BackupReason::UserRequested, description, None)
        .ok_or_else(|| anyhow!("Backup creation failed; see the log for details"))?;
    println!("{} Created backup {}", "✓".green(), id.bold());
    Ok(())
}

/// Handle `ogresync backup cleanup`
pub fn handle_backup_cleanup(force: bool) -> Result<()> {
    let manager = manager()?;
    let policy = manager.policy();
    if force {
        println!("{}", "Removing all backups...".cyan().bold());
    } else {
        println!("{}", "Cleaning up old backups...".cyan().bold());
        println!(
            "  Keeping: last {} backups per reason within {} days",
            policy.max_per_reason, policy.max_age_days
        );
    }

    let (removed, mb_freed) = manager.cleanup_old_backups(force);
    if removed > 0 {
        println!(
            "{} Deleted {} backup(s), freed {} MB",
            "✓".green(),
            removed,
            mb_freed
        );
    } else {
        println!("{}", "No backups to delete".dimmed());
    }
    Ok(())
}
