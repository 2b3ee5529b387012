use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;

use crate::backup::{collect_vault_files, is_internal_path, is_meaningful_file};
use crate::probe::RepositoryProbe;

/// Kind of divergence between the local repository and the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    NoConflict,
    DivergedHistory,
    UncommittedChanges,
    MergeConflict,
    UnrelatedHistories,
    EmptyRepositoryMismatch,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConflictType::NoConflict => "no conflict",
            ConflictType::DivergedHistory => "diverged history",
            ConflictType::UncommittedChanges => "uncommitted changes behind the remote",
            ConflictType::MergeConflict => "merge conflict in progress",
            ConflictType::UnrelatedHistories => "unrelated histories",
            ConflictType::EmptyRepositoryMismatch => "one side is empty",
        };
        f.write_str(text)
    }
}

/// Comparison of the local working tree with a remote tree.
///
/// Computed fresh for every resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictAnalysis {
    pub conflict_type: ConflictType,
    pub remote_ref: String,
    pub local_files: BTreeSet<String>,
    pub remote_files: BTreeSet<String>,
    pub local_only_files: BTreeSet<String>,
    pub remote_only_files: BTreeSet<String>,
    /// Present on both sides with different content
    pub modified_both_files: BTreeSet<String>,
    pub ahead: usize,
    pub behind: usize,
    pub has_uncommitted_changes: bool,
    /// Uncommitted paths the remote also changed
    pub uncommitted_conflicts: BTreeSet<String>,
}

impl ConflictAnalysis {
    pub fn has_conflict(&self) -> bool {
        self.conflict_type != ConflictType::NoConflict
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.modified_both_files.is_empty() {
            parts.push(format!(
                "{} file(s) differ between local and remote",
                self.modified_both_files.len()
            ));
        }
        if !self.local_only_files.is_empty() {
            parts.push(format!(
                "{} file(s) exist only locally",
                self.local_only_files.len()
            ));
        }
        if !self.remote_only_files.is_empty() {
            parts.push(format!(
                "{} file(s) exist only remotely",
                self.remote_only_files.len()
            ));
        }
        if parts.is_empty() {
            return format!("{}: no file differences", self.conflict_type);
        }
        format!("{}: {}", self.conflict_type, parts.join("; "))
    }
}

fn has_notes(files: &BTreeSet<String>) -> bool {
    files.iter().any(|f| is_meaningful_file(f))
}

/// Compare the working tree with the tree at `remote_ref`.
///
/// The file sets cover every tracked or unignored file, not only notes, so
/// nothing a strategy could delete is left out of the comparison.
pub fn analyze(probe: &RepositoryProbe, remote_ref: &str) -> ConflictAnalysis {
    let git = probe.git();
    let vault = probe.vault();

    let local_files: BTreeSet<String> = collect_vault_files(vault).into_iter().collect();
    let remote_files: BTreeSet<String> = git
        .list_tree(remote_ref)
        .into_iter()
        .filter(|f| !is_internal_path(f))
        .collect();

    let local_only_files: BTreeSet<String> =
        local_files.difference(&remote_files).cloned().collect();
    let remote_only_files: BTreeSet<String> =
        remote_files.difference(&local_files).cloned().collect();
    let modified_both_files: BTreeSet<String> = local_files
        .intersection(&remote_files)
        .filter(|path| {
            let local = fs::read(vault.join(path.as_str())).ok();
            let remote = git.show_file(remote_ref, path);
            local != remote
        })
        .cloned()
        .collect();

    let remote_exists = git.rev_parse(remote_ref).is_some();
    let has_head = probe.has_any_commit();
    let (ahead, behind) = probe.ahead_behind_against(remote_ref);
    let has_uncommitted_changes = probe.has_uncommitted_changes();
    let uncommitted_conflicts: BTreeSet<String> = if has_uncommitted_changes && behind > 0 {
        let upstream: BTreeSet<String> = git.changed_paths("HEAD", remote_ref).into_iter().collect();
        git.dirty_paths()
            .into_iter()
            .filter(|p| upstream.contains(p))
            .collect()
    } else {
        BTreeSet::new()
    };

    let conflict_type = if probe.merge_in_progress() || !probe.unmerged_files().is_empty() {
        ConflictType::MergeConflict
    } else if !remote_exists {
        ConflictType::NoConflict
    } else if has_notes(&local_files) != has_notes(&remote_files) {
        ConflictType::EmptyRepositoryMismatch
    } else if !has_head {
        ConflictType::UnrelatedHistories
    } else if git.merge_base("HEAD", remote_ref).is_none() {
        ConflictType::UnrelatedHistories
    } else if ahead > 0 && behind > 0 {
        ConflictType::DivergedHistory
    } else if behind > 0 && !uncommitted_conflicts.is_empty() {
        ConflictType::UncommittedChanges
    } else {
        ConflictType::NoConflict
    };

    ConflictAnalysis {
        conflict_type,
        remote_ref: remote_ref.to_string(),
        local_files,
        remote_files,
        local_only_files,
        remote_only_files,
        modified_both_files,
        ahead,
        behind,
        has_uncommitted_changes,
        uncommitted_conflicts,
    }
}
