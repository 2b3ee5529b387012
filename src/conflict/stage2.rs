//! File-by-file resolution of the conflicts a merge left behind.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

use super::markers::{contains_conflict_markers, is_binary, FILE_RESOLUTION_MARKER};
use crate::backup::{BackupManager, BackupReason};
use crate::events::EventSink;
use crate::prompt::{MergeRequest, Prompter};
use crate::scm::GitScm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Unresolved,
    ResolvedLocal,
    ResolvedRemote,
    ResolvedMerged,
    ResolvedManual,
}

impl FileStatus {
    pub fn is_resolved(&self) -> bool {
        *self != FileStatus::Unresolved
    }
}

/// Resolution progress of one conflicted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileResolutionState {
    pub file_path: String,
    pub status: FileStatus,
    /// Final text, for manual merges
    pub resolution_content: Option<String>,
}

impl FileResolutionState {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            status: FileStatus::Unresolved,
            resolution_content: None,
        }
    }
}

/// Per-file strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStrategy {
    KeepLocal,
    KeepRemote,
    AutoMerge,
    ManualMerge,
}

impl FileStrategy {
    /// Strategies that apply to a file. Binary content cannot be merged.
    pub fn available(binary: bool) -> &'static [FileStrategy] {
        if binary {
            &[FileStrategy::KeepLocal, FileStrategy::KeepRemote]
        } else {
            &[
                FileStrategy::KeepLocal,
                FileStrategy::KeepRemote,
                FileStrategy::AutoMerge,
                FileStrategy::ManualMerge,
            ]
        }
    }
}

impl fmt::Display for FileStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStrategy::KeepLocal => write!(f, "Keep Local (use your version)"),
            FileStrategy::KeepRemote => write!(f, "Keep Remote (use the remote version)"),
            FileStrategy::AutoMerge => write!(f, "Auto Merge (line-based three-way merge)"),
            FileStrategy::ManualMerge => write!(f, "Manual Merge (edit the combined text)"),
        }
    }
}

/// Result of a Stage 2 run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage2Outcome {
    pub success: bool,
    pub cancelled: bool,
    pub message: String,
    pub files: Vec<FileResolutionState>,
    pub backup_id: Option<String>,
}

/// Resolves the files left in conflict, one at a time.
///
/// Before touching anything it backs up the local version of every
/// conflicted file. Cancelling keeps the merge in progress so the work done
/// so far is not lost.
pub struct FileResolutionEngine {
    git: GitScm,
    theirs_ref: String,
    backups: Option<BackupManager>,
    events: EventSink,
    files: Vec<FileResolutionState>,
    backup_id: Option<String>,
}

impl FileResolutionEngine {
    /// `fallback_ref` names the remote side when no merge is in progress.
    pub fn new(
        git: GitScm,
        fallback_ref: &str,
        conflicted: &[String],
        backups: Option<BackupManager>,
        events: EventSink,
    ) -> Self {
        let theirs_ref = if git.rev_parse("MERGE_HEAD").is_some() {
            "MERGE_HEAD".to_string()
        } else {
            fallback_ref.to_string()
        };
        Self {
            git,
            theirs_ref,
            backups,
            events,
            files: conflicted.iter().map(FileResolutionState::new).collect(),
            backup_id: None,
        }
    }

    pub fn files(&self) -> &[FileResolutionState] {
        &self.files
    }

    pub fn all_resolved(&self) -> bool {
        self.files.iter().all(|f| f.status.is_resolved())
    }

    /// Resolve every file with the prompter, then commit.
    pub fn run(&mut self, prompter: &mut dyn Prompter) -> Stage2Outcome {
        if let Err(e) = self.ensure_backup() {
            return self.outcome(false, false, format!("{:#}", e));
        }

        let total = self.files.len();
        for index in 0..total {
            while !self.files[index].status.is_resolved() {
                let path = self.files[index].file_path.clone();
                let binary = self.is_binary_conflict(&path);
                let strategies = FileStrategy::available(binary);
                let options: Vec<String> = strategies.iter().map(|s| s.to_string()).collect();
                let title = format!("Resolve {} ({}/{})", path, index + 1, total);
                let message = if binary {
                    "Binary file: only whole-file choices are possible".to_string()
                } else {
                    "Choose how to resolve this file".to_string()
                };

                let Some(choice) = prompter.choose(&title, &message, &options) else {
                    return self.cancelled();
                };
                let Some(strategy) = strategies.get(choice).copied() else {
                    return self.cancelled();
                };

                match self.resolve_file(index, strategy, prompter) {
                    Ok(FileStatus::Unresolved) => {
                        self.events
                            .log(format!("{} is still unresolved; choose another option", path));
                    }
                    Ok(status) => {
                        self.events.log(format!("Resolved {} ({:?})", path, status));
                    }
                    Err(e) => {
                        self.events.log(format!("Could not resolve {}: {:#}", path, e));
                    }
                }
            }
        }

        match self.complete() {
            Ok(()) => {
                let message = format!("Resolved {} conflicted file(s)", total);
                self.outcome(true, false, message)
            }
            Err(e) => self.outcome(false, false, format!("{:#}", e)),
        }
    }

    /// Apply one strategy to the file at `index` and return its new status.
    pub fn resolve_file(
        &mut self,
        index: usize,
        strategy: FileStrategy,
        prompter: &mut dyn Prompter,
    ) -> Result<FileStatus> {
        self.ensure_backup()?;
        let path = self
            .files
            .get(index)
            .map(|f| f.file_path.clone())
            .ok_or_else(|| anyhow!("No conflicted file at index {}", index))?;

        let (status, content) = match strategy {
            FileStrategy::KeepLocal => (self.keep_local(&path)?, None),
            FileStrategy::KeepRemote => (self.keep_remote(&path)?, None),
            FileStrategy::AutoMerge => (self.auto_merge(&path)?, None),
            FileStrategy::ManualMerge => self.manual_merge(&path, prompter)?,
        };

        let state = &mut self.files[index];
        state.status = status;
        state.resolution_content = content;
        Ok(status)
    }

    /// Stage everything and commit the resolution. Fails while any file is
    /// unresolved.
    pub fn complete(&self) -> Result<()> {
        if !self.all_resolved() {
            return Err(anyhow!("Not every conflicted file is resolved"));
        }
        self.git.stage_all()?;
        let merging = self.git.rev_parse("MERGE_HEAD").is_some();
        if !merging && !self.git.has_staged_changes() {
            self.events.log("Nothing left to commit after resolution");
            return Ok(());
        }
        self.git.commit(&format!(
            "Resolve {} conflicted files {}",
            self.files.len(),
            FILE_RESOLUTION_MARKER
        ))?;
        self.events.log("Resolution committed");
        Ok(())
    }

    fn outcome(&self, success: bool, cancelled: bool, message: String) -> Stage2Outcome {
        Stage2Outcome {
            success,
            cancelled,
            message,
            files: self.files.clone(),
            backup_id: self.backup_id.clone(),
        }
    }

    fn cancelled(&self) -> Stage2Outcome {
        let pending = self.files.iter().filter(|f| !f.status.is_resolved()).count();
        self.outcome(
            false,
            true,
            format!(
                "Resolution cancelled with {} file(s) pending; the merge is still in progress",
                pending
            ),
        )
    }

    fn ensure_backup(&mut self) -> Result<()> {
        if self.backup_id.is_some() || self.files.is_empty() {
            return Ok(());
        }
        let backups = self
            .backups
            .as_ref()
            .ok_or_else(|| anyhow!("Backups are disabled; refusing to resolve files"))?;

        let contents: Vec<(String, Vec<u8>)> = self
            .files
            .iter()
            .filter_map(|f| {
                self.stage_blob(2, &f.file_path)
                    .or_else(|| fs::read(self.git.workdir().join(&f.file_path)).ok())
                    .map(|bytes| (f.file_path.clone(), bytes))
            })
            .collect();

        let id = backups
            .create_backup_of_contents(
                BackupReason::ConflictResolution,
                "File resolution: local versions of conflicted files",
                &contents,
            )
            .ok_or_else(|| anyhow!("Backup creation failed; file resolution aborted"))?;
        self.events.log(format!("Safety backup created: {}", id));
        self.backup_id = Some(id);
        Ok(())
    }

    /// Content of an index stage: 1 base, 2 ours, 3 theirs.
    fn stage_blob(&self, stage: u8, path: &str) -> Option<Vec<u8>> {
        self.git.show_file(&format!(":{}", stage), path)
    }

    fn ours(&self, path: &str) -> Option<Vec<u8>> {
        self.stage_blob(2, path)
    }

    fn theirs(&self, path: &str) -> Option<Vec<u8>> {
        self.stage_blob(3, path)
            .or_else(|| self.git.show_file(&self.theirs_ref, path))
    }

    fn is_binary_conflict(&self, path: &str) -> bool {
        [self.ours(path), self.theirs(path)]
            .iter()
            .flatten()
            .any(|bytes| is_binary(bytes))
    }

    fn remove_path(&self, path: &str) -> Result<()> {
        self.git
            .run_git_ok(&["rm", "-f", "--quiet", "--ignore-unmatch", "--", path])
    }

    fn write_and_stage(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let dest = self.git.workdir().join(path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, bytes).with_context(|| format!("Failed to write {}", path))?;
        self.git.stage_paths(&[path.to_string()])
    }

    fn keep_local(&self, path: &str) -> Result<FileStatus> {
        match self.ours(path) {
            Some(bytes) => self.write_and_stage(path, &bytes)?,
            None => self.remove_path(path)?,
        }
        Ok(FileStatus::ResolvedLocal)
    }

    fn keep_remote(&self, path: &str) -> Result<FileStatus> {
        if self.git.show_file(&self.theirs_ref, path).is_some() {
            self.git.checkout_path(&self.theirs_ref, path)?;
        } else {
            self.remove_path(path)?;
        }
        Ok(FileStatus::ResolvedRemote)
    }

    fn auto_merge(&self, path: &str) -> Result<FileStatus> {
        let (Some(ours), Some(theirs)) = (self.ours(path), self.theirs(path)) else {
            self.events
                .log(format!("{} was deleted on one side; auto merge not possible", path));
            return Ok(FileStatus::Unresolved);
        };
        if is_binary(&ours) || is_binary(&theirs) {
            return Ok(FileStatus::Unresolved);
        }
        let base = self.stage_blob(1, path).unwrap_or_default();

        let ours_file = temp_with(&ours)?;
        let base_file = temp_with(&base)?;
        let theirs_file = temp_with(&theirs)?;
        let paths = [ours_file.path(), base_file.path(), theirs_file.path()];
        let [ours_path, base_path, theirs_path] = paths.map(|p| p.to_string_lossy().into_owned());

        // merged in place into the ours file, so the result keeps its raw bytes
        let output = self.git.run(&[
            "merge-file",
            "-L",
            "LOCAL",
            "-L",
            "BASE",
            "-L",
            "REMOTE",
            &ours_path,
            &base_path,
            &theirs_path,
        ]);
        // exit code is the number of conflicts; negative means git failed
        if output.exit_code < 0 {
            return Err(anyhow!("git merge-file failed: {}", output.error_text()));
        }
        let merged = fs::read(ours_file.path()).context("Failed to read merge result")?;
        if output.exit_code > 0 || contains_conflict_markers(&String::from_utf8_lossy(&merged)) {
            self.events.log(format!(
                "Auto merge of {} left conflicts; file kept unresolved",
                path
            ));
            return Ok(FileStatus::Unresolved);
        }

        self.write_and_stage(path, &merged)?;
        Ok(FileStatus::ResolvedMerged)
    }

    fn manual_merge(
        &self,
        path: &str,
        prompter: &mut dyn Prompter,
    ) -> Result<(FileStatus, Option<String>)> {
        let text = |bytes: Option<Vec<u8>>| {
            bytes
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default()
        };
        let request = MergeRequest {
            file_path: path.to_string(),
            ours: text(self.ours(path)),
            theirs: text(self.theirs(path)),
            base: self
                .stage_blob(1, path)
                .map(|b| String::from_utf8_lossy(&b).into_owned()),
        };

        let Some(content) = prompter.edit_merge(&request) else {
            return Ok((FileStatus::Unresolved, None));
        };
        if contains_conflict_markers(&content) {
            self.events.log(format!(
                "Edited {} still contains conflict markers; not accepted",
                path
            ));
            return Ok((FileStatus::Unresolved, None));
        }

        self.write_and_stage(path, content.as_bytes())?;
        Ok((FileStatus::ResolvedManual, Some(content)))
    }
}

fn temp_with(bytes: &[u8]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new().context("Failed to create temporary merge file")?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_files_only_offer_whole_file_choices() {
        assert_eq!(
            FileStrategy::available(true),
            &[FileStrategy::KeepLocal, FileStrategy::KeepRemote]
        );
        assert_eq!(FileStrategy::available(false).len(), 4);
    }

    #[test]
    fn test_new_state_is_unresolved() {
        let state = FileResolutionState::new("Notes/a b.md");
        assert_eq!(state.status, FileStatus::Unresolved);
        assert!(!state.status.is_resolved());
        assert!(FileStatus::ResolvedManual.is_resolved());
    }
}
