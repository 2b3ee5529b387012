use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;
use walkdir::WalkDir;

use crate::scm::run_subprocess;

/// Directory inside the vault holding every backup.
pub const BACKUP_DIR_NAME: &str = ".ogresync-backups";

/// Vault-root file persisting the offline session state.
pub const OFFLINE_STATE_FILE: &str = ".ogresync-offline-state.json";

/// Prefix of per-backup recovery instruction files.
pub const RECOVERY_FILE_PREFIX: &str = "OGRESYNC_RECOVERY_INSTRUCTIONS";

/// Directories never descended into when collecting vault content.
const SKIPPED_DIRS: &[&str] = &[
    ".git",
    BACKUP_DIR_NAME,
    ".obsidian",
    "__pycache__",
    ".vscode",
    ".idea",
    ".vs",
    "node_modules",
    ".venv",
    "venv",
];

const IGNORED_FILE_NAMES: &[&str] = &[".gitignore", ".DS_Store", "Thumbs.db", "desktop.ini"];

const IGNORED_EXTENSIONS: &[&str] = &[
    "pyc", "pyo", "pyd", "so", "dll", "dylib", "tmp", "temp", "log", "cache", "exe",
];

/// Ignore-file entries that keep local-only state out of version control.
pub const IGNORE_ENTRIES: &[(&str, &str)] = &[
    ("# Ogresync backups (local only)", ".ogresync-backups/"),
    ("# Ogresync recovery instructions", "OGRESYNC_RECOVERY_INSTRUCTIONS_*.txt"),
    ("# Ogresync offline session state", OFFLINE_STATE_FILE),
    ("# Obsidian app settings (personal/local only)", ".obsidian/"),
];

/// Whether a vault-relative path is user content worth preserving.
///
/// Excludes VCS internals, the backup folder, editor settings, IDE folders,
/// hidden files, OS cruft and build/temp artifacts.
pub fn is_meaningful_file(relative_path: &str) -> bool {
    let normalized = relative_path.replace('\\', "/");
    let mut components = normalized.split('/').filter(|c| !c.is_empty()).peekable();

    let mut file_name = "";
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            file_name = component;
        } else if SKIPPED_DIRS.contains(&component) {
            return false;
        }
    }

    if file_name.is_empty() || file_name.starts_with('.') {
        return false;
    }
    if IGNORED_FILE_NAMES.contains(&file_name) || file_name.starts_with(RECOVERY_FILE_PREFIX) {
        return false;
    }
    if let Some((_, ext)) = file_name.rsplit_once('.') {
        if IGNORED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return false;
        }
    }
    true
}

/// Every meaningful file in the vault as a sorted list of `/`-separated
/// relative paths.
pub fn collect_meaningful_files(vault: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(vault)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .map(|name| SKIPPED_DIRS.contains(&name))
                    .unwrap_or(false))
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(vault)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .filter(|rel| is_meaningful_file(rel))
        .collect();
    files.sort();
    files
}

/// Whether a vault-relative path is git internals or ogresync bookkeeping.
pub fn is_internal_path(relative_path: &str) -> bool {
    let normalized = relative_path.replace('\\', "/");
    let mut components = normalized.split('/').filter(|c| !c.is_empty());
    let Some(first) = components.next() else {
        return true;
    };
    if first == ".git" || first == BACKUP_DIR_NAME {
        return true;
    }
    let file_name = normalized.rsplit('/').next().unwrap_or_default();
    normalized == OFFLINE_STATE_FILE || file_name.starts_with(RECOVERY_FILE_PREFIX)
}

/// Every file a destructive step could take away from the user.
///
/// Inside a repository this is every tracked file present on disk plus every
/// untracked file git does not ignore, whatever its name or extension.
/// Outside one, every file under the vault. Internal paths are excluded.
pub fn collect_vault_files(vault: &Path) -> Vec<String> {
    let output = run_subprocess(
        "git",
        &["ls-files", "-z", "--cached", "--others", "--exclude-standard"],
        vault,
        Some(Duration::from_secs(60)),
    );
    let mut files: Vec<String> = if output.success() {
        output
            .stdout
            .split('\0')
            .filter(|rel| !rel.is_empty())
            .filter(|rel| vault.join(rel).is_file())
            .map(str::to_string)
            .collect()
    } else {
        log::debug!(
            "git ls-files failed in {}; scanning the directory: {}",
            vault.display(),
            output.error_text()
        );
        WalkDir::new(vault)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .map(|name| name == ".git" || name == BACKUP_DIR_NAME)
                        .unwrap_or(false))
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(vault)
                    .ok()
                    .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            })
            .collect()
    };
    files.retain(|rel| !is_internal_path(rel));
    files.sort();
    // unmerged entries are listed once per stage
    files.dedup();
    files
}

/// Append any missing [`IGNORE_ENTRIES`] to the vault's `.gitignore`.
///
/// Returns true when the file was changed.
pub fn ensure_ignore_entries(vault: &Path) -> Result<bool> {
    let path = vault.join(".gitignore");
    let existing = if path.exists() {
        fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        String::new()
    };

    let present: Vec<&str> = existing.lines().map(str::trim).collect();
    let mut updated = existing.clone();
    for (comment, entry) in IGNORE_ENTRIES {
        if present.contains(entry) {
            continue;
        }
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        if !updated.is_empty() {
            updated.push('\n');
        }
        updated.push_str(comment);
        updated.push('\n');
        updated.push_str(entry);
        updated.push('\n');
    }

    if updated == existing {
        return Ok(false);
    }
    fs::write(&path, updated).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

/// Total size in bytes of every file below `dir`.
pub fn directory_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
