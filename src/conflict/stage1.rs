//! Repository-level strategy choice.
//!
//! Once the remote has been fetched and the trees compared, the user picks
//! one of three strategies. All of them merge (never reset) so both
//! histories stay reachable, and all of them take a backup before the first
//! write that could lose content.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;

use super::analysis::{analyze, ConflictAnalysis, ConflictType};
use super::markers::{KEEP_LOCAL_MARKER, KEEP_REMOTE_MARKER, SMART_MERGE_MARKER};
use crate::backup::{ensure_ignore_entries, BackupManager, BackupReason};
use crate::events::EventSink;
use crate::probe::RepositoryProbe;
use crate::prompt::Prompter;
use crate::scm::GitScm;

/// Repository-level resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Merge both sides, keeping files that exist on only one side
    SmartMerge,
    /// Record the remote history but keep the local tree
    KeepLocalOnly,
    /// Record the local history but adopt the remote tree
    KeepRemoteOnly,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::SmartMerge,
        Strategy::KeepLocalOnly,
        Strategy::KeepRemoteOnly,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::SmartMerge => "Smart Merge",
            Strategy::KeepLocalOnly => "Keep Local Only",
            Strategy::KeepRemoteOnly => "Keep Remote Only",
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Strategy::SmartMerge => SMART_MERGE_MARKER,
            Strategy::KeepLocalOnly => KEEP_LOCAL_MARKER,
            Strategy::KeepRemoteOnly => KEEP_REMOTE_MARKER,
        }
    }

    fn backup_description(&self) -> &'static str {
        match self {
            Strategy::SmartMerge => "Smart Merge: vault before merging remote changes",
            Strategy::KeepLocalOnly => "Keep Local Only: remote files that were not adopted",
            Strategy::KeepRemoteOnly => "Keep Remote Only: local files before adopting remote",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::SmartMerge => {
                write!(f, "Smart Merge (combine both sides - recommended)")
            }
            Strategy::KeepLocalOnly => {
                write!(f, "Keep Local Only (record remote history, keep local files)")
            }
            Strategy::KeepRemoteOnly => {
                write!(f, "Keep Remote Only (replace local files, backup kept)")
            }
        }
    }
}

/// Result of a Stage 1 attempt. Never an error: failures carry a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionResult {
    pub success: bool,
    pub cancelled: bool,
    pub strategy: Option<Strategy>,
    pub conflict_type: Option<ConflictType>,
    pub message: String,
    /// Files left with conflict markers for Stage 2
    pub remaining_conflicts: Vec<String>,
    pub backup_id: Option<String>,
}

impl ResolutionResult {
    fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            cancelled: false,
            strategy: None,
            conflict_type: None,
            message: message.into(),
            remaining_conflicts: Vec::new(),
            backup_id: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::succeeded(message)
        }
    }

    fn cancelled(message: impl Into<String>) -> Self {
        Self {
            cancelled: true,
            ..Self::failed(message)
        }
    }

    fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    fn with_type(mut self, conflict_type: ConflictType) -> Self {
        self.conflict_type = Some(conflict_type);
        self
    }

    fn with_backup(mut self, backup_id: Option<String>) -> Self {
        self.backup_id = backup_id;
        self
    }

    /// Stage 1 finished but files still need per-file resolution.
    pub fn needs_stage2(&self) -> bool {
        self.success && !self.remaining_conflicts.is_empty()
    }
}

/// Stage 1 driver.
pub struct RepositoryResolver {
    probe: RepositoryProbe,
    backups: Option<BackupManager>,
    events: EventSink,
}

impl RepositoryResolver {
    /// `backups` is `None` when backups are disabled; every strategy then
    /// refuses to run.
    pub fn new(probe: RepositoryProbe, backups: Option<BackupManager>, events: EventSink) -> Self {
        Self {
            probe,
            backups,
            events,
        }
    }

    fn git(&self) -> &GitScm {
        self.probe.git()
    }

    /// Fetch, compare, ask for a strategy and apply it.
    ///
    /// With `remote_url` set the remote is (re)pointed at it first. Nothing
    /// in the working tree changes before the fetch succeeds and the user
    /// has chosen; cancelling leaves the repository untouched.
    pub fn resolve(&self, remote_url: Option<&str>, prompter: &mut dyn Prompter) -> ResolutionResult {
        if let Err(e) = self.prepare(remote_url) {
            return ResolutionResult::failed(format!("{:#}", e));
        }

        // Conflicts from an earlier attempt go straight to Stage 2
        if self.probe.merge_in_progress() {
            let remaining = self.probe.unmerged_files();
            self.events.log(format!(
                "Resuming an unfinished merge ({} file(s) still conflicted)",
                remaining.len()
            ));
            let mut result = ResolutionResult::succeeded("Unfinished merge found")
                .with_strategy(Strategy::SmartMerge)
                .with_type(ConflictType::MergeConflict);
            result.remaining_conflicts = remaining;
            return result;
        }
        if self.probe.rebase_in_progress() {
            self.events.log("Aborting an interrupted rebase");
            let output = self.git().run(&["rebase", "--abort"]);
            if !output.success() {
                return ResolutionResult::failed(format!(
                    "Could not abort the interrupted rebase: {}",
                    output.error_text()
                ));
            }
        }

        self.events.log("Fetching remote changes...");
        let fetch = self.git().fetch(self.probe.remote_name());
        if !fetch.success() {
            return ResolutionResult::failed(format!(
                "Could not fetch from remote, local state kept as is: {}",
                fetch.error_text()
            ));
        }

        let Some(remote_ref) = self.pick_remote_ref() else {
            return ResolutionResult::succeeded("Remote has no branch yet; nothing to reconcile")
                .with_type(ConflictType::NoConflict);
        };

        let analysis = analyze(&self.probe, &remote_ref);
        self.events
            .log(format!("Conflict analysis: {}", analysis.summary()));

        if !analysis.has_conflict() {
            return self.integrate_without_conflict(&analysis);
        }

        let options: Vec<String> = Strategy::ALL.iter().map(|s| s.to_string()).collect();
        let Some(choice) = prompter.choose(
            "Repository conflict detected",
            &analysis.summary(),
            &options,
        ) else {
            return ResolutionResult::cancelled("Conflict resolution cancelled; nothing was changed")
                .with_type(analysis.conflict_type);
        };
        let Some(strategy) = Strategy::ALL.get(choice).copied() else {
            return ResolutionResult::cancelled("No strategy selected")
                .with_type(analysis.conflict_type);
        };
        self.events.log(format!("Applying strategy: {}", strategy.name()));

        self.apply(strategy, &analysis)
            .with_strategy(strategy)
            .with_type(analysis.conflict_type)
    }

    /// Run a strategy without asking. The analysis must be fresh.
    pub fn apply(&self, strategy: Strategy, analysis: &ConflictAnalysis) -> ResolutionResult {
        let backup_id = match self.backup_for(strategy, analysis) {
            Ok(id) => id,
            Err(e) => return ResolutionResult::failed(format!("{:#}", e)),
        };
        self.events.log(format!("Safety backup created: {}", backup_id));

        if let Err(e) = self.commit_pending_changes() {
            return ResolutionResult::failed(format!("{:#}", e)).with_backup(Some(backup_id));
        }
        if !self.probe.has_any_commit() {
            return ResolutionResult::failed("Local repository has no commits to merge into")
                .with_backup(Some(backup_id));
        }

        let outcome = match strategy {
            Strategy::SmartMerge => self.smart_merge(analysis, &backup_id),
            Strategy::KeepLocalOnly => self.keep_local_only(analysis),
            Strategy::KeepRemoteOnly => self.keep_remote_only(analysis),
        };

        let result = match outcome {
            Ok(remaining) if remaining.is_empty() => ResolutionResult::succeeded(format!(
                "{} completed; backup {} holds the previous state",
                strategy.name(),
                backup_id
            )),
            Ok(remaining) => {
                let mut result = ResolutionResult::succeeded(format!(
                    "{} left {} file(s) with conflicts",
                    strategy.name(),
                    remaining.len()
                ));
                result.remaining_conflicts = remaining;
                result
            }
            Err(e) => ResolutionResult::failed(format!(
                "{} failed: {:#}. Backup {} holds your files",
                strategy.name(),
                e,
                backup_id
            )),
        };
        result.with_backup(Some(backup_id))
    }

    fn prepare(&self, remote_url: Option<&str>) -> Result<()> {
        self.git().ensure_identity()?;
        if let Some(url) = remote_url {
            self.git().ensure_remote(self.probe.remote_name(), url)?;
        }
        if !self.probe.has_remote() {
            return Err(anyhow!(
                "No remote '{}' is configured",
                self.probe.remote_name()
            ));
        }
        Ok(())
    }

    /// Configured branch first, then `main`, then `master`.
    fn pick_remote_ref(&self) -> Option<String> {
        let mut candidates = vec![self.probe.branch().to_string()];
        for fallback in ["main", "master"] {
            if !candidates.iter().any(|c| c == fallback) {
                candidates.push(fallback.to_string());
            }
        }
        candidates
            .into_iter()
            .map(|b| format!("{}/{}", self.probe.remote_name(), b))
            .find(|r| self.git().rev_parse(&format!("refs/remotes/{}", r)).is_some())
    }

    fn integrate_without_conflict(&self, analysis: &ConflictAnalysis) -> ResolutionResult {
        if analysis.behind > 0 && analysis.ahead == 0 {
            let output = self
                .git()
                .run(&["merge", "--ff-only", &analysis.remote_ref]);
            if !output.success() {
                return ResolutionResult::failed(format!(
                    "Fast-forward to {} failed: {}",
                    analysis.remote_ref,
                    output.error_text()
                ))
                .with_type(ConflictType::NoConflict);
            }
            self.events.log(format!(
                "Fast-forwarded {} commit(s) from {}",
                analysis.behind, analysis.remote_ref
            ));
        }
        ResolutionResult::succeeded("No conflicts; repositories are compatible")
            .with_type(ConflictType::NoConflict)
    }

    fn backup_for(&self, strategy: Strategy, analysis: &ConflictAnalysis) -> Result<String> {
        let backups = self.backups.as_ref().ok_or_else(|| {
            anyhow!(
                "Backups are disabled; refusing to run {} without a safety net",
                strategy.name()
            )
        })?;

        let id = match strategy {
            Strategy::KeepLocalOnly => {
                // The remote side is what gets discarded
                let contents: Vec<(String, Vec<u8>)> = analysis
                    .remote_only_files
                    .iter()
                    .chain(analysis.modified_both_files.iter())
                    .filter_map(|path| {
                        self.git()
                            .show_file(&analysis.remote_ref, path)
                            .map(|bytes| (path.clone(), bytes))
                    })
                    .collect();
                backups.create_backup_of_contents(
                    BackupReason::ConflictResolution,
                    strategy.backup_description(),
                    &contents,
                )
            }
            Strategy::SmartMerge | Strategy::KeepRemoteOnly => backups.create_backup(
                BackupReason::ConflictResolution,
                strategy.backup_description(),
                None,
            ),
        };

        id.ok_or_else(|| {
            anyhow!(
                "Backup creation failed; {} aborted to protect your files",
                strategy.name()
            )
        })
    }

    fn commit_pending_changes(&self) -> Result<()> {
        if !self.git().has_changes() {
            return Ok(());
        }
        self.git().stage_all()?;
        if self.git().has_staged_changes() {
            self.git()
                .commit("Save local changes before conflict resolution")?;
            self.events.log("Committed local changes before resolving");
        }
        Ok(())
    }

    fn merge_args<'a>(&self, base: &[&'a str], remote_ref: &'a str) -> Vec<&'a str> {
        let mut args = base.to_vec();
        if self.git().merge_base("HEAD", remote_ref).is_none() {
            args.push("--allow-unrelated-histories");
        }
        args.push(remote_ref);
        args
    }

    fn abort_merge(&self) {
        if self.probe.merge_in_progress() {
            let output = self.git().run(&["merge", "--abort"]);
            if !output.success() {
                log::warn!("git merge --abort failed: {}", output.error_text());
            }
        }
    }

    /// Returns the files left in conflict.
    fn smart_merge(&self, analysis: &ConflictAnalysis, backup_id: &str) -> Result<Vec<String>> {
        let remote_ref = analysis.remote_ref.as_str();
        let message = format!("Smart merge of {} {}", remote_ref, SMART_MERGE_MARKER);
        let args = self.merge_args(&["merge", "--no-ff", "-m", &message], remote_ref);

        let output = self.git().run(&args);
        let conflicted = self.probe.unmerged_files();
        if !output.success() && conflicted.is_empty() {
            self.abort_merge();
            return Err(anyhow!("git merge failed: {}", output.error_text()));
        }
        if conflicted.is_empty() {
            self.events.log("Merge completed without conflicts");
        } else {
            self.events.log(format!(
                "Merge left {} file(s) with conflicts",
                conflicted.len()
            ));
        }

        let unmerged: BTreeSet<&str> = conflicted.iter().map(String::as_str).collect();
        let mut touched = Vec::new();

        // Files only the local side had must survive the merge
        for path in &analysis.local_only_files {
            if unmerged.contains(path.as_str()) || self.probe.vault().join(path).exists() {
                continue;
            }
            let backups = self
                .backups
                .as_ref()
                .ok_or_else(|| anyhow!("Backups unavailable while restoring {}", path))?;
            let bytes = backups
                .read_backed_up_file(backup_id, path)
                .ok_or_else(|| anyhow!("{} is missing from backup {}", path, backup_id))?;
            let dest = self.probe.vault().join(path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dest, bytes)?;
            self.events.log(format!("Restored local-only file {}", path));
            touched.push(path.clone());
        }

        // And so must files from the remote tree
        for path in &analysis.remote_files {
            if unmerged.contains(path.as_str()) || self.probe.vault().join(path).exists() {
                continue;
            }
            match self.git().checkout_path(remote_ref, path) {
                Ok(()) => {
                    self.events.log(format!("Checked out missing remote file {}", path));
                    touched.push(path.clone());
                }
                Err(e) => log::warn!("Could not check out {}: {:#}", path, e),
            }
        }

        if ensure_ignore_entries(self.probe.vault())? {
            touched.push(".gitignore".to_string());
        }
        self.git().stage_paths(&touched)?;

        if conflicted.is_empty() && self.git().has_staged_changes() {
            self.git().commit(&format!(
                "Restore local-only files after smart merge {}",
                SMART_MERGE_MARKER
            ))?;
        }
        Ok(conflicted)
    }

    fn keep_local_only(&self, analysis: &ConflictAnalysis) -> Result<Vec<String>> {
        let remote_ref = analysis.remote_ref.as_str();
        let message = format!(
            "Keep local files, record history of {} {}",
            remote_ref, KEEP_LOCAL_MARKER
        );
        let args = self.merge_args(&["merge", "-s", "ours", "--no-ff", "-m", &message], remote_ref);
        let output = self.git().run(&args);
        if !output.success() {
            self.abort_merge();
            return Err(anyhow!("git merge -s ours failed: {}", output.error_text()));
        }
        self.events
            .log(format!("Local files kept; history of {} recorded", remote_ref));
        Ok(Vec::new())
    }

    fn keep_remote_only(&self, analysis: &ConflictAnalysis) -> Result<Vec<String>> {
        let remote_ref = analysis.remote_ref.as_str();
        let args = self.merge_args(
            &["merge", "-s", "ours", "--no-ff", "--no-commit"],
            remote_ref,
        );
        let output = self.git().run(&args);
        if !output.success() {
            self.abort_merge();
            return Err(anyhow!("git merge failed: {}", output.error_text()));
        }

        let adopted = self
            .git()
            .run(&["read-tree", "-u", "--reset", remote_ref]);
        if !adopted.success() {
            self.abort_merge();
            return Err(anyhow!(
                "Could not adopt the remote tree: {}",
                adopted.error_text()
            ));
        }

        if ensure_ignore_entries(self.probe.vault())? {
            self.git().stage_paths(&[".gitignore".to_string()])?;
        }

        let message = format!(
            "Adopt remote files from {}, keep local history {}",
            remote_ref, KEEP_REMOTE_MARKER
        );
        if let Err(e) = self.git().commit(&message) {
            self.abort_merge();
            return Err(e);
        }
        self.events
            .log(format!("Working tree now matches {}", remote_ref));
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_labels_name_each_strategy() {
        for strategy in Strategy::ALL {
            assert!(strategy.to_string().starts_with(strategy.name()));
            assert!(strategy.backup_description().starts_with(strategy.name()));
        }
    }

    #[test]
    fn test_result_builders() {
        let cancelled = ResolutionResult::cancelled("stop");
        assert!(!cancelled.success);
        assert!(cancelled.cancelled);

        let mut ok = ResolutionResult::succeeded("done").with_strategy(Strategy::SmartMerge);
        assert!(!ok.needs_stage2());
        ok.remaining_conflicts.push("Test1.md".into());
        assert!(ok.needs_stage2());
    }
}
