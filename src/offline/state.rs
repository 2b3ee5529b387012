use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::session::{NetworkState, SyncSession};

/// Network samples kept in the history.
pub const MAX_NETWORK_SAMPLES: usize = 50;

/// One reachability observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSample {
    pub timestamp: DateTime<Utc>,
    pub state: NetworkState,
}

/// Persisted per-vault offline state.
///
/// Sessions are kept in insertion order, which is chronological.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineState {
    #[serde(default)]
    pub offline_sessions: Vec<SyncSession>,
    #[serde(default)]
    pub network_state_history: Vec<NetworkSample>,
    #[serde(default)]
    pub last_successful_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_unpushed_commits: bool,
}

impl OfflineState {
    /// Load state from `path`. A missing or corrupt file yields the empty state.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let parsed = fs::read_to_string(path)
            .context("Failed to read offline state")
            .and_then(|content| {
                serde_json::from_str::<OfflineState>(&content)
                    .context("Failed to parse offline state")
            });
        match parsed {
            Ok(state) => state,
            Err(e) => {
                log::warn!("{:#}; starting with empty offline state", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize offline state")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write offline state {}", path.display()))
    }

    pub fn open_session(&self) -> Option<&SyncSession> {
        self.offline_sessions.iter().find(|s| s.is_open())
    }

    pub fn session(&self, session_id: &str) -> Option<&SyncSession> {
        self.offline_sessions
            .iter()
            .find(|s| s.session_id == session_id)
    }

    pub fn session_mut(&mut self, session_id: &str) -> Option<&mut SyncSession> {
        self.offline_sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
    }

    /// Closed sessions still owing a resolution.
    pub fn unresolved_sessions(&self) -> impl Iterator<Item = &SyncSession> {
        self.offline_sessions
            .iter()
            .filter(|s| !s.is_open() && s.requires_conflict_resolution)
    }

    /// Append a sample, dropping the oldest beyond [`MAX_NETWORK_SAMPLES`].
    pub fn record_network_sample(&mut self, state: NetworkState, timestamp: DateTime<Utc>) {
        self.network_state_history
            .push(NetworkSample { timestamp, state });
        let len = self.network_state_history.len();
        if len > MAX_NETWORK_SAMPLES {
            self.network_state_history.drain(..len - MAX_NETWORK_SAMPLES);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_and_corrupt_files_load_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        assert_eq!(OfflineState::load(&path), OfflineState::default());

        fs::write(&path, "[[[ definitely not json").unwrap();
        assert_eq!(OfflineState::load(&path), OfflineState::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");

        let mut state = OfflineState::default();
        state
            .offline_sessions
            .push(SyncSession::new("session_1_0".into(), NetworkState::Offline, Utc::now()));
        state.record_network_sample(NetworkState::Offline, Utc::now());
        state.save(&path).unwrap();

        let loaded = OfflineState::load(&path);
        assert_eq!(loaded, state);
        assert_eq!(loaded.open_session().unwrap().session_id, "session_1_0");
    }

    #[test]
    fn test_network_history_is_capped() {
        let mut state = OfflineState::default();
        for i in 0..(MAX_NETWORK_SAMPLES + 7) {
            let sample = if i % 2 == 0 {
                NetworkState::Online
            } else {
                NetworkState::Offline
            };
            state.record_network_sample(sample, Utc::now());
        }
        assert_eq!(state.network_state_history.len(), MAX_NETWORK_SAMPLES);
        // The newest sample survives
        assert_eq!(
            state.network_state_history.last().unwrap().state,
            NetworkState::Online
        );
    }
}
