//! File-snapshot backups taken before any step that can discard content.
//!
//! Snapshots live in `.ogresync-backups/` inside the vault, each in a folder
//! whose name says what it protects, with a `backup_manifest.json`, a
//! `README.txt` and a recovery-instructions file next to it. A JSON registry
//! (`backup_registry.json`) indexes them by id. A snapshot folder is never
//! modified after creation; cleanup only deletes whole folders.

mod files;
mod manager;
mod record;

pub use files::{
    collect_meaningful_files, collect_vault_files, ensure_ignore_entries, is_internal_path,
    is_meaningful_file, BACKUP_DIR_NAME, IGNORE_ENTRIES, OFFLINE_STATE_FILE,
    RECOVERY_FILE_PREFIX,
};
pub use manager::BackupManager;
pub use record::{BackedUpFile, BackupReason, BackupRecord};
