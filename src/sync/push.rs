use anyhow::Result;
use chrono::Local;

use crate::events::EventSink;
use crate::probe::RepositoryProbe;
use crate::scm::GitScm;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    Pushed,
    /// The remote already has every local commit
    UpToDate,
    Failed(String),
}

/// Stage and commit everything in the working tree.
///
/// Returns the commit message, or `None` when there was nothing to commit.
pub fn commit_local_changes(git: &GitScm, events: &EventSink) -> Result<Option<String>> {
    if !git.has_changes() {
        events.log("No changes to commit");
        return Ok(None);
    }
    git.ensure_identity()?;
    git.stage_all()?;
    if !git.has_staged_changes() {
        events.log("No changes to commit");
        return Ok(None);
    }

    let message = format!("Auto-sync: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    git.commit(&message)?;
    events.log(format!("Committed local changes ({})", message));
    Ok(Some(message))
}

/// Push HEAD to the configured branch.
///
/// A branch the remote does not have yet is created with upstream tracking.
/// Failures are returned, never raised: an unpushed commit simply waits for
/// the next run.
pub fn push_changes(probe: &RepositoryProbe, events: &EventSink) -> PushStatus {
    let git = probe.git();
    if !probe.has_remote() {
        return PushStatus::Failed(format!("No remote '{}' configured", probe.remote_name()));
    }
    if !probe.has_any_commit() {
        return PushStatus::Failed("Nothing committed yet".to_string());
    }

    let refspec = format!("HEAD:refs/heads/{}", probe.branch());

    if !probe.remote_branch_exists(probe.branch()) {
        events.log(format!(
            "Remote branch '{}' does not exist yet; creating it",
            probe.branch()
        ));
        let output = git.push_set_upstream(probe.remote_name(), &refspec);
        if !output.success() {
            return PushStatus::Failed(output.error_text());
        }
        events.log(format!("Pushed and set upstream {}", probe.remote_ref()));
        return PushStatus::Pushed;
    }

    if probe.remote_ref_exists() && probe.unpushed_commits() == 0 {
        git.ensure_upstream(probe.remote_name(), probe.branch());
        events.log("Remote already up to date");
        return PushStatus::UpToDate;
    }

    let output = git.push(probe.remote_name(), &refspec);
    if !output.success() {
        return PushStatus::Failed(output.error_text());
    }
    git.ensure_upstream(probe.remote_name(), probe.branch());
    events.log(format!("Pushed to {}", probe.remote_ref()));
    PushStatus::Pushed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::scm::git_available;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_commit_reports_nothing_to_commit() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let git = GitScm::init(temp.path(), "main").unwrap();
        let events = EventSink::detached();

        assert_eq!(commit_local_changes(&git, &events).unwrap(), None);

        fs::write(temp.path().join("note.md"), "text").unwrap();
        let message = commit_local_changes(&git, &events).unwrap().unwrap();
        assert!(message.starts_with("Auto-sync: "));
        assert!(!git.has_changes());
    }

    #[test]
    fn test_push_without_remote_fails_softly() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let git = GitScm::init(temp.path(), "main").unwrap();
        let probe = RepositoryProbe::new(git, &AppConfig::new(temp.path()));

        assert!(matches!(
            push_changes(&probe, &EventSink::detached()),
            PushStatus::Failed(_)
        ));
    }
}
