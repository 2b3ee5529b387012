use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::session::{NetworkState, SyncSession};
use super::state::OfflineState;
use crate::backup::{BackupManager, BackupReason, OFFLINE_STATE_FILE};
use crate::config::SessionPolicy;
use crate::probe::RepositoryProbe;

/// Counts shown by `ogresync status` and `ogresync sessions list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub total_sessions: usize,
    pub offline_sessions: usize,
    pub unpushed_commits: usize,
    pub last_successful_sync: Option<chrono::DateTime<Utc>>,
    pub requires_resolution: bool,
}

/// Records sync sessions across runs and decides when a resolution is owed.
///
/// Owns the vault's `.ogresync-offline-state.json`; every mutation is saved
/// immediately. Save failures are logged and never interrupt a sync.
pub struct OfflineSessionTracker {
    state_path: PathBuf,
    state: OfflineState,
    probe: RepositoryProbe,
    backups: Option<BackupManager>,
    policy: SessionPolicy,
}

impl OfflineSessionTracker {
    pub fn new(
        probe: RepositoryProbe,
        backups: Option<BackupManager>,
        policy: SessionPolicy,
    ) -> Self {
        let state_path = probe.vault().join(OFFLINE_STATE_FILE);
        let state = OfflineState::load(&state_path);
        Self {
            state_path,
            state,
            probe,
            backups,
            policy,
        }
    }

    pub fn state(&self) -> &OfflineState {
        &self.state
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    fn persist(&self) {
        if let Err(e) = self.state.save(&self.state_path) {
            log::error!("{:#}", e);
        }
    }

    /// Probe the network once and record the result in the history.
    pub fn check_network(&mut self) -> NetworkState {
        let state = NetworkState::from_reachable(self.probe.network_reachable());
        self.record_network_state(state);
        state
    }

    pub fn record_network_state(&mut self, state: NetworkState) {
        self.state.record_network_sample(state, Utc::now());
        self.persist();
    }

    /// Local commits not on the tracked remote branch. Zero without a remote.
    pub fn unpushed_commits(&self) -> usize {
        if !self.probe.has_remote() {
            return 0;
        }
        self.probe.unpushed_commits()
    }

    /// Close sessions left open by a run that never finished.
    ///
    /// They are closed with `end_state`, which is the best knowledge of
    /// where the interrupted run left off. Returns how many were closed.
    pub fn recover_abandoned_sessions(&mut self, end_state: NetworkState) -> usize {
        let now = Utc::now();
        let mut closed = 0;
        for session in self.state.offline_sessions.iter_mut().filter(|s| s.is_open()) {
            log::warn!(
                "Closing session {} left open by an interrupted run",
                session.session_id
            );
            session.close(end_state, Vec::new(), now);
            closed += 1;
        }
        if closed > 0 {
            self.persist();
        }
        closed
    }

    /// Open a new session. Fails if another session is still open.
    ///
    /// A session that starts offline first takes a sync-operation backup of
    /// the vault, recorded on the session.
    pub fn start_sync_session(&mut self, initial: NetworkState) -> Result<String> {
        if let Some(open) = self.state.open_session() {
            return Err(anyhow!(
                "Session {} is still open; only one sync may run at a time",
                open.session_id
            ));
        }

        let now = Utc::now();
        let mut n = self.state.offline_sessions.len();
        let session_id = loop {
            let candidate = format!("session_{}_{}", now.timestamp(), n);
            if self.state.session(&candidate).is_none() {
                break candidate;
            }
            n += 1;
        };

        let mut session = SyncSession::new(session_id.clone(), initial, now);
        if initial == NetworkState::Offline {
            if let Some(backups) = &self.backups {
                session.backup_id = backups.create_backup(
                    BackupReason::SyncOperation,
                    &format!("Pre-offline session backup - {}", session_id),
                    None,
                );
            }
        }

        log::info!("Started sync session {} ({})", session_id, initial);
        self.state.offline_sessions.push(session);
        self.persist();
        Ok(session_id)
    }

    /// Close a session and return whether it now requires resolution.
    /// Unknown ids return false.
    pub fn end_sync_session(
        &mut self,
        session_id: &str,
        final_state: NetworkState,
        local_commits: Vec<String>,
    ) -> bool {
        let Some(session) = self.state.session_mut(session_id) else {
            log::warn!("Sync session {} not found", session_id);
            return false;
        };

        let had_commits = !local_commits.is_empty();
        let required = session.close(final_state, local_commits, Utc::now());
        log::info!(
            "Ended sync session {} ({}){}",
            session_id,
            session.sync_mode,
            if required {
                ", conflict resolution required"
            } else {
                ""
            }
        );

        if had_commits {
            self.state.has_unpushed_commits = true;
        }
        self.persist();
        required
    }

    /// True when the network is reachable now and either a closed session
    /// still owes a resolution or local commits are missing from the remote.
    ///
    /// The live commit check catches a network that came back mid-session,
    /// which no recorded flag reflects.
    pub fn should_trigger_conflict_resolution(&self) -> bool {
        self.probe.network_reachable() && self.resolution_pending()
    }

    /// The non-network half of [`Self::should_trigger_conflict_resolution`].
    pub fn resolution_pending(&self) -> bool {
        let unresolved = self.state.unresolved_sessions().count();
        if unresolved > 0 {
            log::info!("{} offline session(s) await conflict resolution", unresolved);
            return true;
        }
        if self.probe.has_remote() && self.probe.remote_ref_exists() {
            let unpushed = self.probe.unpushed_commits();
            if unpushed > 0 {
                log::info!("{} unpushed commit(s) need reconciling with the remote", unpushed);
                return true;
            }
        }
        false
    }

    /// Clear the resolution flag on a session. Calling it again is a no-op.
    pub fn mark_session_resolved(&mut self, session_id: &str) -> bool {
        let Some(session) = self.state.session_mut(session_id) else {
            return false;
        };
        session.requires_conflict_resolution = false;

        if self.state.unresolved_sessions().next().is_none() {
            self.state.has_unpushed_commits = self.unpushed_commits() > 0;
        }
        self.persist();
        true
    }

    /// Clear every outstanding resolution flag. Returns the affected ids.
    pub fn mark_all_resolved(&mut self) -> Vec<String> {
        let ids: Vec<String> = self
            .state
            .unresolved_sessions()
            .map(|s| s.session_id.clone())
            .collect();
        for id in &ids {
            self.mark_session_resolved(id);
        }
        ids
    }

    /// Record a sync whose changes all reached the remote.
    ///
    /// Closes any session still open and refreshes the unpushed flag.
    pub fn complete_successful_sync(&mut self) {
        let now = Utc::now();
        for session in self.state.offline_sessions.iter_mut().filter(|s| s.is_open()) {
            session.close(NetworkState::Online, Vec::new(), now);
            log::info!("Completed session {}", session.session_id);
        }
        self.state.last_successful_sync = Some(now);
        self.state.has_unpushed_commits = self.unpushed_commits() > 0;
        self.persist();
    }

    /// Drop resolved sessions to bound the state file.
    ///
    /// Regular cleanup keeps the newest `keep_resolved` resolved sessions.
    /// Aggressive cleanup drops every resolved session when nothing is
    /// unpushed, otherwise those that ended before the purge horizon. Open
    /// sessions and sessions owing a resolution are always kept.
    pub fn cleanup_sessions(&mut self, aggressive: bool) -> usize {
        let before = self.state.offline_sessions.len();

        if aggressive {
            if self.unpushed_commits() == 0 {
                self.state.offline_sessions.retain(|s| !s.is_resolved());
            } else {
                let cutoff = Utc::now() - chrono::Duration::hours(self.policy.purge_after_hours);
                self.state.offline_sessions.retain(|s| {
                    !(s.is_resolved() && s.end_time.map(|t| t < cutoff).unwrap_or(false))
                });
            }
        }

        let resolved = self
            .state
            .offline_sessions
            .iter()
            .filter(|s| s.is_resolved())
            .count();
        if resolved > self.policy.keep_resolved {
            let mut to_drop = resolved - self.policy.keep_resolved;
            self.state.offline_sessions.retain(|s| {
                if to_drop > 0 && s.is_resolved() {
                    to_drop -= 1;
                    false
                } else {
                    true
                }
            });
        }

        let removed = before - self.state.offline_sessions.len();
        if removed > 0 {
            log::info!("Cleaned up {} resolved session(s)", removed);
            self.persist();
        }
        removed
    }

    pub fn session_summary(&self) -> SessionSummary {
        SessionSummary {
            total_sessions: self.state.offline_sessions.len(),
            offline_sessions: self
                .state
                .offline_sessions
                .iter()
                .filter(|s| s.sync_mode.started_offline())
                .count(),
            unpushed_commits: self.unpushed_commits(),
            last_successful_sync: self.state.last_successful_sync,
            requires_resolution: self.should_trigger_conflict_resolution(),
        }
    }

    /// One line describing the offline state.
    pub fn status_message(&self) -> String {
        describe(&self.session_summary())
    }
}

/// Render a summary as the one-line status message.
pub fn describe(summary: &SessionSummary) -> String {
    if summary.requires_resolution {
        format!(
            "{} unpushed commit(s) require conflict resolution",
            summary.unpushed_commits
        )
    } else if summary.unpushed_commits > 0 {
        format!("{} local commit(s) ready to sync", summary.unpushed_commits)
    } else if summary.offline_sessions > 0 {
        format!("{} offline session(s) completed", summary.offline_sessions)
    } else {
        "All changes synchronized".to_string()
    }
}
