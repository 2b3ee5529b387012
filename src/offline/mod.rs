//! Offline-aware session tracking.
//!
//! Each run of the sync workflow is a [`SyncSession`] whose start and end
//! network state classify it as one of four [`SyncMode`]s. A session that
//! starts offline and ends online having committed locally owes a conflict
//! resolution; the flag is persisted so the resolution can happen on a
//! later run.

mod session;
mod state;
mod tracker;

pub use session::{determine_sync_mode, requires_resolution, NetworkState, SyncMode, SyncSession};
pub use state::{NetworkSample, OfflineState, MAX_NETWORK_SAMPLES};
pub use tracker::{describe, OfflineSessionTracker, SessionSummary};
