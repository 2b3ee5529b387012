use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Why a backup was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupReason {
    ConflictResolution,
    SetupSafety,
    SyncOperation,
    UserRequested,
    AutoCleanup,
}

impl BackupReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupReason::ConflictResolution => "conflict_resolution",
            BackupReason::SetupSafety => "setup_safety",
            BackupReason::SyncOperation => "sync_operation",
            BackupReason::UserRequested => "user_requested",
            BackupReason::AutoCleanup => "auto_cleanup",
        }
    }
}

impl fmt::Display for BackupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single file inside a backup snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackedUpFile {
    pub path: String,
    pub size_bytes: u64,
}

/// Registry entry describing one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub backup_id: String,
    pub reason: BackupReason,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub snapshot_path: PathBuf,
    pub files_backed_up: Vec<BackedUpFile>,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_instructions_path: Option<PathBuf>,
}

/// Descriptions that name a strategy get a folder prefix saying which side
/// of the conflict the snapshot holds.
pub fn folder_prefix(reason: BackupReason, description: &str) -> String {
    if description.contains("Keep Remote Only") {
        "LOCAL_FILES_before_adopting_remote".to_string()
    } else if description.contains("Keep Local Only") {
        "REMOTE_FILES_before_keeping_local".to_string()
    } else if description.contains("Smart Merge") || reason == BackupReason::ConflictResolution {
        "CONFLICT_BACKUP_before_merge".to_string()
    } else if reason == BackupReason::SetupSafety {
        "SETUP_SAFETY_backup".to_string()
    } else {
        format!("{}_backup", reason.as_str().to_uppercase())
    }
}

/// Explanation written into the snapshot's README.
pub fn purpose_text(description: &str) -> &'static str {
    if description.contains("Keep Remote Only") {
        "WHAT HAPPENED:\n\
         You chose \"Keep Remote Only\" during conflict resolution.\n\
         This backup contains YOUR LOCAL FILES exactly as they were before\n\
         they were replaced with the remote files. Use it to recover any\n\
         local work you want to keep.\n"
    } else if description.contains("Keep Local Only") {
        "WHAT HAPPENED:\n\
         You chose \"Keep Local Only\" during conflict resolution.\n\
         This backup contains the REMOTE FILES that were not adopted.\n\
         Use it to see what the remote repository held.\n"
    } else if description.contains("Smart Merge") || description.to_lowercase().contains("conflict") {
        "WHAT HAPPENED:\n\
         A conflict resolution was performed.\n\
         This backup contains your files exactly as they were before any\n\
         change was made. Use it to compare or recover specific versions.\n"
    } else {
        "WHAT HAPPENED:\n\
         A backup was created for safety during an Ogresync operation.\n\
         It contains your files exactly as they were before the operation.\n"
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Manifest<'a> {
    pub backup_id: &'a str,
    pub created_at: DateTime<Utc>,
    pub description: &'a str,
    pub reason: BackupReason,
    pub backup_folder: &'a str,
    pub files_backed_up: &'a [BackedUpFile],
    pub total_files: usize,
    pub total_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(BackupReason::ConflictResolution, "Keep Remote Only: local files", "LOCAL_FILES_before_adopting_remote")]
    #[case(BackupReason::ConflictResolution, "Keep Local Only: remote files", "REMOTE_FILES_before_keeping_local")]
    #[case(BackupReason::ConflictResolution, "Smart Merge safety backup", "CONFLICT_BACKUP_before_merge")]
    #[case(BackupReason::SetupSafety, "initial setup", "SETUP_SAFETY_backup")]
    #[case(BackupReason::SyncOperation, "Pre-offline session", "SYNC_OPERATION_backup")]
    #[case(BackupReason::UserRequested, "manual", "USER_REQUESTED_backup")]
    fn test_folder_prefix(
        #[case] reason: BackupReason,
        #[case] description: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(folder_prefix(reason, description), expected);
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_string(&BackupReason::ConflictResolution).unwrap();
        assert_eq!(json, "\"conflict_resolution\"");
        let back: BackupReason = serde_json::from_str("\"user_requested\"").unwrap();
        assert_eq!(back, BackupReason::UserRequested);
    }
}
