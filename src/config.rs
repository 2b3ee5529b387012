use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the configuration directory
pub const CONFIG_DIR_ENV: &str = "OGRESYNC_CONFIG_DIR";

/// Cross-platform configuration directory manager
pub struct ConfigManager;

impl ConfigManager {
    /// Get the main configuration directory path following platform conventions:
    /// - Linux: $XDG_CONFIG_HOME/ogresync or ~/.config/ogresync
    /// - macOS: ~/Library/Application Support/ogresync
    /// - Windows: %APPDATA%\ogresync
    ///
    /// `OGRESYNC_CONFIG_DIR` takes precedence on every platform.
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            if !dir.is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }

        #[cfg(target_os = "linux")]
        {
            // Follow XDG Base Directory Specification
            if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
                Ok(PathBuf::from(xdg_config).join("ogresync"))
            } else {
                let home = dirs::home_dir().context("Failed to get home directory")?;
                Ok(home.join(".config").join("ogresync"))
            }
        }

        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().context("Failed to get home directory")?;
            Ok(home.join("Library").join("Application Support").join("ogresync"))
        }

        #[cfg(target_os = "windows")]
        {
            Ok(dirs::config_dir()
                .context("Failed to get Windows config directory")?
                .join("ogresync"))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            let home = dirs::home_dir().context("Failed to get home directory")?;
            Ok(home.join(".ogresync"))
        }
    }

    /// Get the application config file path (config.toml)
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the log file path
    pub fn log_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("ogresync.log"))
    }

    /// Ensure the configuration directory exists
    pub fn ensure_config_dir() -> Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        fs::create_dir_all(&config_dir).with_context(|| {
            format!("Failed to create config directory: {}", config_dir.display())
        })?;
        Ok(config_dir)
    }
}

/// External editor launch settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditorConfig {
    /// Program and arguments used to open the vault (the vault path is appended)
    #[serde(default)]
    pub command: Vec<String>,

    /// Process name to look for when the launcher detaches immediately
    /// (Flatpak, AppImage wrappers and the like)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,

    /// How often to check whether the editor is still running
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            command: vec!["obsidian".to_string()],
            process_name: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Network reachability probe settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Host to probe; derived from the remote URL when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "default_https_port")]
    pub port: u16,

    #[serde(default = "default_network_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_https_port() -> u16 {
    443
}

fn default_network_timeout_secs() -> u64 {
    5
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_https_port(),
            timeout_secs: default_network_timeout_secs(),
        }
    }
}

/// Retention policy for the backup registry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupPolicy {
    /// Keep at most this many backups per reason (newest kept)
    #[serde(default = "default_max_per_reason")]
    pub max_per_reason: usize,

    /// Delete backups older than this many days
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
}

fn default_max_per_reason() -> usize {
    10
}

fn default_max_age_days() -> i64 {
    30
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            max_per_reason: default_max_per_reason(),
            max_age_days: default_max_age_days(),
        }
    }
}

/// Retention policy for recorded sync sessions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Resolved sessions kept by the regular cleanup
    #[serde(default = "default_keep_resolved")]
    pub keep_resolved: usize,

    /// Resolved sessions older than this are purged by the aggressive cleanup
    #[serde(default = "default_purge_after_hours")]
    pub purge_after_hours: i64,
}

fn default_keep_resolved() -> usize {
    10
}

fn default_purge_after_hours() -> i64 {
    1
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            keep_resolved: default_keep_resolved(),
            purge_after_hours: default_purge_after_hours(),
        }
    }
}

/// Features available to this process, assembled once at startup.
///
/// Components consult these flags instead of probing for optional pieces
/// at runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Capabilities {
    /// Prompts can be answered by a user
    #[serde(default = "enabled")]
    pub interactive: bool,

    /// The external editor is launched between pull and commit
    #[serde(default = "enabled")]
    pub launch_editor: bool,

    /// Stage 1 / Stage 2 resolution may run
    #[serde(default = "enabled")]
    pub conflict_resolution: bool,

    /// Snapshots are taken before destructive steps; destructive strategies
    /// refuse to run without them
    #[serde(default = "enabled")]
    pub backups: bool,
}

fn enabled() -> bool {
    true
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            interactive: true,
            launch_editor: true,
            conflict_resolution: true,
            backups: true,
        }
    }
}

/// Application configuration stored in config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Vault directory under synchronization
    pub vault_path: PathBuf,

    /// Remote repository URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,

    #[serde(default = "default_remote_name")]
    pub remote_name: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default)]
    pub editor: EditorConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    /// Timeout for read-only git probes
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    #[serde(default)]
    pub backup: BackupPolicy,

    #[serde(default)]
    pub sessions: SessionPolicy,

    #[serde(default)]
    pub capabilities: Capabilities,
}

fn default_remote_name() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

impl AppConfig {
    /// Create a configuration for a vault with every other setting at its default
    pub fn new(vault_path: impl Into<PathBuf>) -> Self {
        Self {
            vault_path: vault_path.into(),
            remote_url: None,
            remote_name: default_remote_name(),
            branch: default_branch(),
            editor: EditorConfig::default(),
            network: NetworkConfig::default(),
            probe_timeout_secs: default_probe_timeout_secs(),
            backup: BackupPolicy::default(),
            sessions: SessionPolicy::default(),
            capabilities: Capabilities::default(),
        }
    }

    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let path = ConfigManager::config_file_path()?;
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Ogresync is not configured. Run 'ogresync init --vault <PATH>' first."
            ));
        }
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<PathBuf> {
        let path = ConfigManager::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Reference to the tracked remote branch, e.g. `origin/main`
    pub fn remote_ref(&self) -> String {
        format!("{}/{}", self.remote_name, self.branch)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.editor.poll_interval_ms.max(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_config_dir_override() {
        let temp = TempDir::new().unwrap();
        std::env::set_var(CONFIG_DIR_ENV, temp.path());

        let dir = ConfigManager::config_dir().unwrap();
        assert_eq!(dir, temp.path());
        assert!(ConfigManager::config_file_path()
            .unwrap()
            .ends_with("config.toml"));
        assert!(ConfigManager::log_file_path()
            .unwrap()
            .to_string_lossy()
            .contains("ogresync.log"));

        std::env::remove_var(CONFIG_DIR_ENV);
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: AppConfig = toml::from_str("vault_path = \"/tmp/vault\"").unwrap();
        assert_eq!(config.remote_name, "origin");
        assert_eq!(config.branch, "main");
        assert_eq!(config.network.port, 443);
        assert_eq!(config.backup.max_per_reason, 10);
        assert_eq!(config.backup.max_age_days, 30);
        assert!(config.capabilities.backups);
        assert_eq!(config.remote_ref(), "origin/main");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = AppConfig::new("/tmp/vault");
        config.remote_url = Some("git@github.com:user/notes.git".to_string());
        config.capabilities.launch_editor = false;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_durations_never_zero() {
        let mut config = AppConfig::new("/tmp/vault");
        config.network.timeout_secs = 0;
        config.probe_timeout_secs = 0;
        config.editor.poll_interval_ms = 0;
        assert!(config.network_timeout() > Duration::ZERO);
        assert!(config.probe_timeout() > Duration::ZERO);
        assert!(config.poll_interval() > Duration::ZERO);
    }
}
