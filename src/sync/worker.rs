use anyhow::{anyhow, Result};
use std::thread::{self, JoinHandle};

use super::SyncOutcome;

/// Runs at most one sync job at a time on a background thread.
#[derive(Debug, Default)]
pub struct SyncWorker {
    handle: Option<JoinHandle<SyncOutcome>>,
}

impl SyncWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the previous job's thread is still alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Start `job`. Refused while a previous job is still running.
    pub fn start<F>(&mut self, job: F) -> Result<()>
    where
        F: FnOnce() -> SyncOutcome + Send + 'static,
    {
        if self.is_running() {
            return Err(anyhow!("A sync is already running for this vault"));
        }
        // reap the finished job, if any
        if let Some(previous) = self.handle.take() {
            let _ = previous.join();
        }
        let handle = thread::Builder::new()
            .name("ogresync-worker".to_string())
            .spawn(job)?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Wait for the current job. `None` if nothing was started.
    pub fn join(&mut self) -> Option<SyncOutcome> {
        let handle = self.handle.take()?;
        Some(handle.join().unwrap_or_else(|_| {
            SyncOutcome::Failed("Sync worker panicked".to_string())
        }))
    }
}
