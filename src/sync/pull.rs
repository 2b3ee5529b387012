use anyhow::{anyhow, Result};

use crate::backup::{BackupManager, BackupReason};
use crate::events::EventSink;
use crate::probe::RepositoryProbe;
use crate::scm::GitScm;

const STASH_MESSAGE: &str = "ogresync: local changes before pull";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullStatus {
    /// The remote branch does not exist yet
    NoRemoteBranch,
    Pulled,
    /// The rebase hit conflicts and was aborted; the repository is back in
    /// its pre-pull state and needs a repository-level decision
    Conflicted,
    Failed(String),
}

/// Pull remote changes with rebase, keeping uncommitted work aside.
///
/// Uncommitted changes are stashed first and restored afterwards, whatever
/// the pull's result.
pub fn pull_changes(
    probe: &RepositoryProbe,
    backups: Option<&BackupManager>,
    events: &EventSink,
) -> PullStatus {
    let git = probe.git();
    if !probe.remote_branch_exists(probe.branch()) {
        events.log(format!(
            "Remote branch '{}' does not exist yet; nothing to pull",
            probe.branch()
        ));
        return PullStatus::NoRemoteBranch;
    }

    let stashed = match stash_changes(git) {
        Ok(stashed) => stashed,
        Err(e) => return PullStatus::Failed(format!("{:#}", e)),
    };
    if stashed {
        events.log("Stashed local changes");
    }

    let output = git.run(&["pull", "--rebase", probe.remote_name(), probe.branch()]);
    let status = if output.success() {
        events.log("Pulled remote changes");
        PullStatus::Pulled
    } else if probe.rebase_in_progress() || !probe.unmerged_files().is_empty() {
        events.log("Pull produced conflicts; rolling back the rebase");
        let abort = git.run(&["rebase", "--abort"]);
        if !abort.success() {
            log::warn!("git rebase --abort failed: {}", abort.error_text());
        }
        PullStatus::Conflicted
    } else {
        PullStatus::Failed(output.error_text())
    };

    if stashed {
        if let Err(e) = restore_stash(probe, backups, events) {
            return PullStatus::Failed(format!("{:#}", e));
        }
    }
    status
}

/// Stash uncommitted and untracked changes. Returns true if anything was stashed.
fn stash_changes(git: &GitScm) -> Result<bool> {
    if !git.has_changes() || git.head_hash().is_none() {
        return Ok(false);
    }
    let before = git.rev_parse("refs/stash");
    git.run_git_ok(&["stash", "push", "--include-untracked", "-m", STASH_MESSAGE])?;
    Ok(git.rev_parse("refs/stash") != before)
}

/// Pop the stash. On conflicts the stashed (local) version of each file
/// wins, after the upstream version is backed up.
fn restore_stash(
    probe: &RepositoryProbe,
    backups: Option<&BackupManager>,
    events: &EventSink,
) -> Result<()> {
    let git = probe.git();
    let output = git.run(&["stash", "pop"]);
    if output.success() {
        events.log("Restored stashed changes");
        return Ok(());
    }

    let conflicted = probe.unmerged_files();
    if conflicted.is_empty() {
        return Err(anyhow!(
            "Could not restore stashed changes (they remain in 'git stash list'): {}",
            output.error_text()
        ));
    }

    let upstream: Vec<(String, Vec<u8>)> = conflicted
        .iter()
        .filter_map(|path| git.show_file("HEAD", path).map(|bytes| (path.clone(), bytes)))
        .collect();
    let backup_id = backups
        .and_then(|b| {
            b.create_backup_of_contents(
                BackupReason::SyncOperation,
                "Upstream versions replaced by stashed local changes",
                &upstream,
            )
        })
        .ok_or_else(|| {
            anyhow!("Stash conflicts could not be backed up; stashed changes kept in 'git stash list'")
        })?;
    events.log(format!("Upstream versions backed up as {}", backup_id));

    for path in &conflicted {
        git.run_git_ok(&["checkout", "--theirs", "--", path])?;
        git.stage_paths(&[path.clone()])?;
    }
    // Leave the restored changes unstaged like a clean pop would
    git.run_git_ok(&["reset", "-q"])?;
    git.run_git_ok(&["stash", "drop"])?;
    events.log(format!(
        "Kept local version of {} file(s) changed on both sides",
        conflicted.len()
    ));
    Ok(())
}
