//! Command handler modules
//!
//! One module per CLI command group. Handlers print with `colored` and
//! return `anyhow::Result`; the sync core underneath never raises.

pub mod backup;
pub mod config;
pub mod init;
pub mod resolve;
pub mod sessions;
pub mod status;
pub mod sync;

pub use backup::{handle_backup_cleanup, handle_backup_create, handle_backup_list};
pub use config::handle_config_show;
pub use init::handle_init;
pub use resolve::handle_resolve;
pub use sessions::{handle_sessions_cleanup, handle_sessions_list};
pub use status::handle_status;
pub use sync::{handle_sync, SyncFlags};

use anyhow::{Context, Result};

use crate::backup::BackupManager;
use crate::config::AppConfig;
use crate::offline::OfflineSessionTracker;
use crate::probe::RepositoryProbe;
use crate::scm::GitScm;

/// Open the configured vault for read-mostly commands.
pub(crate) fn open_probe(config: &AppConfig) -> Result<RepositoryProbe> {
    let git = GitScm::open(&config.vault_path).with_context(|| {
        format!(
            "Vault at {} is not initialized; run 'ogresync init --vault <PATH>'",
            config.vault_path.display()
        )
    })?;
    Ok(RepositoryProbe::new(git, config))
}

pub(crate) fn open_tracker(config: &AppConfig) -> Result<OfflineSessionTracker> {
    let probe = open_probe(config)?;
    let backups = config
        .capabilities
        .backups
        .then(|| BackupManager::new(probe.vault(), config.backup));
    Ok(OfflineSessionTracker::new(probe, backups, config.sessions))
}
