use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};

use super::files::{
    collect_vault_files, directory_size, ensure_ignore_entries, BACKUP_DIR_NAME,
    RECOVERY_FILE_PREFIX,
};
use super::record::{folder_prefix, purpose_text, BackedUpFile, BackupReason, BackupRecord, Manifest};
use crate::config::BackupPolicy;
use crate::sanitize::sanitize_description;

const REGISTRY_FILE: &str = "backup_registry.json";
const MANIFEST_FILE: &str = "backup_manifest.json";
const README_FILE: &str = "README.txt";

type Registry = BTreeMap<String, BackupRecord>;

/// Where the content of a snapshot comes from.
enum Source<'a> {
    /// Every meaningful file currently in the vault
    Vault,
    /// The named vault files that exist on disk
    Paths(&'a [String]),
    /// Content that is not on disk, e.g. file versions read from the remote
    Contents(&'a [(String, Vec<u8>)]),
}

/// Creates, lists and expires file snapshots under `.ogresync-backups/`.
///
/// Snapshots are local only: the directory and the recovery instruction
/// files are added to the vault's `.gitignore` on construction.
#[derive(Debug, Clone)]
pub struct BackupManager {
    vault: PathBuf,
    backup_dir: PathBuf,
    policy: BackupPolicy,
}

impl BackupManager {
    pub fn new(vault: &Path, policy: BackupPolicy) -> Self {
        let manager = Self {
            vault: vault.to_path_buf(),
            backup_dir: vault.join(BACKUP_DIR_NAME),
            policy,
        };
        if let Err(e) = manager.ensure_infrastructure() {
            log::warn!("Backup directory setup incomplete: {:#}", e);
        }
        manager
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn policy(&self) -> BackupPolicy {
        self.policy
    }

    fn registry_path(&self) -> PathBuf {
        self.backup_dir.join(REGISTRY_FILE)
    }

    fn ensure_infrastructure(&self) -> Result<()> {
        fs::create_dir_all(&self.backup_dir).with_context(|| {
            format!("Failed to create backup directory {}", self.backup_dir.display())
        })?;
        ensure_ignore_entries(&self.vault)?;
        Ok(())
    }

    /// Snapshot vault files before a destructive step.
    ///
    /// With `files` unset every meaningful file is copied. Returns the new
    /// backup id, or `None` if anything went wrong; callers about to discard
    /// content must abort on `None`.
    pub fn create_backup(
        &self,
        reason: BackupReason,
        description: &str,
        files: Option<&[String]>,
    ) -> Option<String> {
        let source = match files {
            Some(paths) => Source::Paths(paths),
            None => Source::Vault,
        };
        self.create(reason, description, source)
    }

    /// Snapshot content supplied by the caller (relative path, bytes).
    pub fn create_backup_of_contents(
        &self,
        reason: BackupReason,
        description: &str,
        contents: &[(String, Vec<u8>)],
    ) -> Option<String> {
        self.create(reason, description, Source::Contents(contents))
    }

    fn create(&self, reason: BackupReason, description: &str, source: Source<'_>) -> Option<String> {
        let description = sanitize_description(description);
        match self.write_snapshot(reason, &description, source) {
            Ok(record) => {
                log::info!(
                    "Backup {} created: {} files ({:.1} KB) in {}",
                    record.backup_id,
                    record.files_backed_up.len(),
                    record.size_bytes as f64 / 1024.0,
                    record.snapshot_path.display()
                );
                Some(record.backup_id)
            }
            Err(e) => {
                log::error!("Failed to create backup ({}): {:#}", reason, e);
                None
            }
        }
    }

    fn write_snapshot(
        &self,
        reason: BackupReason,
        description: &str,
        source: Source<'_>,
    ) -> Result<BackupRecord> {
        self.ensure_infrastructure()?;
        let mut registry = self.load_registry();

        let created_at = Utc::now();
        let stamp = created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d_%H-%M-%S")
            .to_string();
        let prefix = folder_prefix(reason, description);

        // Same-second backups get a numeric suffix
        let (suffix, backup_id, folder_name) = (1..)
            .map(|n: u32| {
                let suffix = if n == 1 { String::new() } else { format!("_{}", n) };
                let id = format!("backup_{}_{}{}", stamp, reason.as_str(), suffix);
                let folder = format!("{}_{}{}", prefix, stamp, suffix);
                (suffix, id, folder)
            })
            .find(|(_, id, folder)| {
                !registry.contains_key(id) && !self.backup_dir.join(folder).exists()
            })
            .ok_or_else(|| anyhow!("No free backup name"))?;

        let snapshot_path = self.backup_dir.join(&folder_name);
        fs::create_dir_all(&snapshot_path)
            .with_context(|| format!("Failed to create {}", snapshot_path.display()))?;

        let copied = match self.copy_into(&snapshot_path, source) {
            Ok(copied) => copied,
            Err(e) => {
                let _ = fs::remove_dir_all(&snapshot_path);
                return Err(e);
            }
        };
        let total_size: u64 = copied.iter().map(|f| f.size_bytes).sum();

        let manifest = Manifest {
            backup_id: &backup_id,
            created_at,
            description,
            reason,
            backup_folder: &folder_name,
            files_backed_up: &copied,
            total_files: copied.len(),
            total_size_bytes: total_size,
        };
        let written = serde_json::to_string_pretty(&manifest)
            .context("Failed to serialize backup manifest")
            .and_then(|json| {
                fs::write(snapshot_path.join(MANIFEST_FILE), json)
                    .context("Failed to write backup manifest")
            })
            .and_then(|_| {
                fs::write(
                    snapshot_path.join(README_FILE),
                    self.readme(&backup_id, &folder_name, description, created_at, &copied),
                )
                .context("Failed to write backup README")
            });
        if let Err(e) = written {
            let _ = fs::remove_dir_all(&snapshot_path);
            return Err(e);
        }

        let mut record = BackupRecord {
            backup_id: backup_id.clone(),
            reason,
            description: description.to_string(),
            created_at,
            snapshot_path: snapshot_path.clone(),
            files_backed_up: copied,
            size_bytes: directory_size(&snapshot_path),
            recovery_instructions_path: None,
        };

        let instructions = self
            .backup_dir
            .join(format!("{}_{}{}.txt", RECOVERY_FILE_PREFIX, stamp, suffix));
        match fs::write(&instructions, self.recovery_instructions(&record)) {
            Ok(()) => record.recovery_instructions_path = Some(instructions),
            Err(e) => log::warn!("Could not write recovery instructions: {}", e),
        }

        registry.insert(backup_id, record.clone());
        if let Err(e) = self.save_registry(&registry) {
            let _ = fs::remove_dir_all(&snapshot_path);
            if let Some(path) = &record.recovery_instructions_path {
                let _ = fs::remove_file(path);
            }
            return Err(e);
        }

        Ok(record)
    }

    fn copy_into(&self, snapshot: &Path, source: Source<'_>) -> Result<Vec<BackedUpFile>> {
        let mut copied = Vec::new();
        match source {
            Source::Vault => {
                for rel in collect_vault_files(&self.vault) {
                    copied.push(self.copy_file(snapshot, &rel)?);
                }
            }
            Source::Paths(paths) => {
                for rel in paths {
                    if self.vault.join(rel).is_file() {
                        copied.push(self.copy_file(snapshot, rel)?);
                    } else {
                        log::debug!("Skipping missing file {} in backup", rel);
                    }
                }
            }
            Source::Contents(contents) => {
                for (rel, bytes) in contents {
                    let dest = snapshot.join(checked_relative(rel)?);
                    if let Some(parent) = dest.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&dest, bytes)
                        .with_context(|| format!("Failed to write {}", dest.display()))?;
                    copied.push(BackedUpFile {
                        path: rel.clone(),
                        size_bytes: bytes.len() as u64,
                    });
                }
            }
        }
        Ok(copied)
    }

    fn copy_file(&self, snapshot: &Path, rel: &str) -> Result<BackedUpFile> {
        let relative = checked_relative(rel)?;
        let src = self.vault.join(&relative);
        let dest = snapshot.join(&relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let size_bytes = fs::copy(&src, &dest)
            .with_context(|| format!("Failed to copy {} into backup", src.display()))?;
        Ok(BackedUpFile {
            path: rel.to_string(),
            size_bytes,
        })
    }

    fn readme(
        &self,
        backup_id: &str,
        folder_name: &str,
        description: &str,
        created_at: DateTime<Utc>,
        files: &[BackedUpFile],
    ) -> String {
        let total: u64 = files.iter().map(|f| f.size_bytes).sum();
        format!(
            "OGRESYNC BACKUP\n\
             {rule}\n\n\
             Backup Created: {created}\n\
             Description: {description}\n\
             Backup ID: {backup_id}\n\
             Files Backed Up: {count}\n\
             Total Size: {size:.1} KB\n\n\
             {purpose}\n\
             HOW TO RESTORE FILES:\n\
             1. Browse the files in this folder; they are laid out exactly like your vault\n\
             2. Copy any files you want to restore back into your vault\n\
             3. Overwrite existing files if you want the old version back\n\n\
             SAFETY NOTES:\n\
             - This backup is LOCAL ONLY and is never synced to the remote\n\
             - Safe to delete this folder when you no longer need it\n\
             - Automatic cleanup removes it after {days} days\n\n\
             TECHNICAL INFO:\n\
             - Manifest: {manifest}\n\
             - Vault: {vault}\n\
             - Backup folder: {folder_name}\n",
            rule = "=".repeat(70),
            created = created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            count = files.len(),
            size = total as f64 / 1024.0,
            purpose = purpose_text(description),
            days = self.policy.max_age_days,
            manifest = MANIFEST_FILE,
            vault = self.vault.display(),
        )
    }

    fn recovery_instructions(&self, record: &BackupRecord) -> String {
        format!(
            "OGRESYNC RECOVERY INSTRUCTIONS\n\
             ==============================\n\n\
             Backup Created: {created}\n\
             Backup ID: {id}\n\
             Reason: {reason}\n\
             Description: {description}\n\n\
             RECOVERY OPTIONS:\n\
             1. Browse backup files:\n   {snapshot}\n\
             2. Restore specific files by copying them back into your vault\n\
             3. View the manifest:\n   {manifest}\n\n\
             DELETE THE BACKUP WHEN NO LONGER NEEDED:\n   {snapshot}\n\n\
             NOTES:\n\
             - This backup is LOCAL ONLY and will not be synced to the remote\n\
             - Backups are cleaned up automatically after {days} days\n\
             - Use 'ogresync backup list' to see all backups\n",
            created = record.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            id = record.backup_id,
            reason = record.reason,
            description = record.description,
            snapshot = record.snapshot_path.display(),
            manifest = record.snapshot_path.join(MANIFEST_FILE).display(),
            days = self.policy.max_age_days,
        )
    }

    /// A corrupt or unreadable registry reads as empty.
    fn load_registry(&self) -> Registry {
        let path = self.registry_path();
        if !path.exists() {
            return Registry::new();
        }
        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|content| serde_json::from_str(&content).map_err(anyhow::Error::from))
        {
            Ok(registry) => registry,
            Err(e) => {
                log::warn!(
                    "Backup registry {} is unreadable, starting fresh: {}",
                    path.display(),
                    e
                );
                Registry::new()
            }
        }
    }

    fn save_registry(&self, registry: &Registry) -> Result<()> {
        let path = self.registry_path();
        let content =
            serde_json::to_string_pretty(registry).context("Failed to serialize backup registry")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write backup registry {}", path.display()))
    }

    /// Every registered backup, newest first.
    pub fn list_backups(&self) -> Vec<BackupRecord> {
        let mut backups: Vec<BackupRecord> = self.load_registry().into_values().collect();
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        backups
    }

    pub fn get(&self, backup_id: &str) -> Option<BackupRecord> {
        self.load_registry().remove(backup_id)
    }

    /// Read one file from a snapshot.
    pub fn read_backed_up_file(&self, backup_id: &str, relative_path: &str) -> Option<Vec<u8>> {
        let record = self.get(backup_id)?;
        let relative = checked_relative(relative_path).ok()?;
        fs::read(record.snapshot_path.join(relative)).ok()
    }

    /// Remove backups past the retention window or beyond the per-reason
    /// count (newest kept). `force` removes every backup.
    ///
    /// Returns `(backups_removed, megabytes_freed)`.
    pub fn cleanup_old_backups(&self, force: bool) -> (usize, u64) {
        let mut registry = self.load_registry();
        let cutoff = Utc::now() - chrono::Duration::days(self.policy.max_age_days);

        let mut by_reason: HashMap<BackupReason, Vec<&BackupRecord>> = HashMap::new();
        for record in registry.values() {
            by_reason.entry(record.reason).or_default().push(record);
        }

        let mut doomed = Vec::new();
        for records in by_reason.values_mut() {
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            for (idx, record) in records.iter().enumerate() {
                let too_old = record.created_at < cutoff;
                let over_count = idx >= self.policy.max_per_reason;
                if force || too_old || over_count {
                    doomed.push(record.backup_id.clone());
                }
            }
        }

        let mut removed = 0;
        let mut freed: u64 = 0;
        for id in doomed {
            let Some(record) = registry.get(&id) else {
                continue;
            };
            if record.snapshot_path.exists() {
                if let Err(e) = fs::remove_dir_all(&record.snapshot_path) {
                    log::warn!(
                        "Failed to delete backup {}: {}",
                        record.snapshot_path.display(),
                        e
                    );
                    continue;
                }
            }
            if let Some(path) = &record.recovery_instructions_path {
                if path.exists() {
                    let _ = fs::remove_file(path);
                }
            }
            freed += record.size_bytes;
            removed += 1;
            log::info!("Removed backup {}", id);
            registry.remove(&id);
        }

        if removed > 0 {
            if let Err(e) = self.save_registry(&registry) {
                log::error!("Failed to update backup registry after cleanup: {:#}", e);
            }
        }

        (removed, freed / (1024 * 1024))
    }
}

/// Reject absolute paths and `..` so snapshot writes stay inside the snapshot.
fn checked_relative(rel: &str) -> Result<PathBuf> {
    let path = PathBuf::from(rel);
    if path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        Ok(path)
    } else {
        Err(anyhow!("Refusing to back up path outside the vault: {}", rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vault_with(files: &[(&str, &str)]) -> TempDir {
        let temp = TempDir::new().unwrap();
        for (rel, content) in files {
            let path = temp.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        temp
    }

    #[test]
    fn test_full_backup_copies_every_vault_file() {
        let vault = vault_with(&[
            ("Note.md", "note"),
            ("Folder/Deep.md", "deep"),
            ("Folder/server.log", "log line"),
            (".obsidian/app.json", "{}"),
        ]);
        let manager = BackupManager::new(vault.path(), BackupPolicy::default());

        let id = manager
            .create_backup(BackupReason::UserRequested, "manual snapshot", None)
            .unwrap();
        assert!(id.starts_with("backup_"));
        assert!(id.contains("user_requested"));

        let record = manager.get(&id).unwrap();
        assert!(record.snapshot_path.join("Note.md").exists());
        assert_eq!(
            fs::read_to_string(record.snapshot_path.join("Folder/Deep.md")).unwrap(),
            "deep"
        );
        assert_eq!(
            fs::read_to_string(record.snapshot_path.join("Folder/server.log")).unwrap(),
            "log line"
        );
        assert!(record.snapshot_path.join(".obsidian/app.json").exists());
        assert!(!record.snapshot_path.join(BACKUP_DIR_NAME).exists());
        assert!(record.snapshot_path.join(MANIFEST_FILE).exists());
        assert!(record.snapshot_path.join(README_FILE).exists());
        assert!(record.recovery_instructions_path.unwrap().exists());
        // the four notes plus the .gitignore written on construction
        assert_eq!(record.files_backed_up.len(), 5);
    }

    #[test]
    fn test_ignore_file_excludes_backups() {
        let vault = vault_with(&[("Note.md", "note")]);
        let _manager = BackupManager::new(vault.path(), BackupPolicy::default());
        let gitignore = fs::read_to_string(vault.path().join(".gitignore")).unwrap();
        assert!(gitignore.contains(".ogresync-backups/"));
        assert!(gitignore.contains("OGRESYNC_RECOVERY_INSTRUCTIONS_*.txt"));
    }

    #[test]
    fn test_backup_of_contents_and_unique_ids() {
        let vault = vault_with(&[]);
        let manager = BackupManager::new(vault.path(), BackupPolicy::default());
        let contents = vec![("remote/Only.md".to_string(), b"remote".to_vec())];

        let first = manager
            .create_backup_of_contents(
                BackupReason::ConflictResolution,
                "Keep Local Only: remote files",
                &contents,
            )
            .unwrap();
        let second = manager
            .create_backup_of_contents(
                BackupReason::ConflictResolution,
                "Keep Local Only: remote files",
                &contents,
            )
            .unwrap();
        assert_ne!(first, second);

        let record = manager.get(&first).unwrap();
        let folder = record.snapshot_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(folder.starts_with("REMOTE_FILES_before_keeping_local_"));
        assert_eq!(
            manager.read_backed_up_file(&first, "remote/Only.md").unwrap(),
            b"remote"
        );
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let vault = vault_with(&[]);
        let manager = BackupManager::new(vault.path(), BackupPolicy::default());
        let contents = vec![("../escape.md".to_string(), b"x".to_vec())];
        assert!(manager
            .create_backup_of_contents(BackupReason::UserRequested, "bad", &contents)
            .is_none());
        assert!(manager.list_backups().is_empty());
    }

    #[test]
    fn test_corrupt_registry_is_treated_as_empty() {
        let vault = vault_with(&[("Note.md", "note")]);
        let manager = BackupManager::new(vault.path(), BackupPolicy::default());
        fs::write(manager.registry_path(), "{ not json").unwrap();

        assert!(manager.list_backups().is_empty());
        assert!(manager
            .create_backup(BackupReason::UserRequested, "after corruption", None)
            .is_some());
        assert_eq!(manager.list_backups().len(), 1);
    }

    #[test]
    fn test_cleanup_enforces_count_per_reason() {
        let vault = vault_with(&[("Note.md", "note")]);
        let policy = BackupPolicy {
            max_per_reason: 2,
            max_age_days: 30,
        };
        let manager = BackupManager::new(vault.path(), policy);
        for _ in 0..4 {
            manager
                .create_backup(BackupReason::SyncOperation, "periodic", None)
                .unwrap();
        }
        let other = manager
            .create_backup(BackupReason::UserRequested, "manual", None)
            .unwrap();

        let (removed, _) = manager.cleanup_old_backups(false);
        assert_eq!(removed, 2);

        let remaining = manager.list_backups();
        assert_eq!(remaining.len(), 3);
        assert!(remaining.iter().any(|b| b.backup_id == other));
        for record in manager.list_backups() {
            assert!(record.snapshot_path.exists());
        }
    }

    #[test]
    fn test_cleanup_removes_expired_and_force_removes_all() {
        let vault = vault_with(&[("Note.md", "note")]);
        let manager = BackupManager::new(vault.path(), BackupPolicy::default());
        let old = manager
            .create_backup(BackupReason::SyncOperation, "old", None)
            .unwrap();
        manager
            .create_backup(BackupReason::SyncOperation, "fresh", None)
            .unwrap();

        // Age the first record past the retention window
        let mut registry = manager.load_registry();
        let record = registry.get_mut(&old).unwrap();
        record.created_at = Utc::now() - chrono::Duration::days(45);
        let old_snapshot = record.snapshot_path.clone();
        let old_instructions = record.recovery_instructions_path.clone().unwrap();
        manager.save_registry(&registry).unwrap();

        let (removed, _) = manager.cleanup_old_backups(false);
        assert_eq!(removed, 1);
        assert!(!old_snapshot.exists());
        assert!(!old_instructions.exists());
        assert!(manager.get(&old).is_none());

        let (removed, _) = manager.cleanup_old_backups(true);
        assert_eq!(removed, 1);
        assert!(manager.list_backups().is_empty());
    }
}
