//! The sync workflow: reconcile, pull, edit, commit, push.
//!
//! [`SyncOrchestrator::run`] drives one session from start to finish on the
//! calling thread. [`spawn_sync`] and [`spawn_reconcile`] run it on a
//! [`SyncWorker`] thread and hand back the event receiver for the foreground
//! to render.

mod init;
mod pull;
mod push;
mod worker;

pub use init::{ensure_local_head, init_vault, INITIAL_COMMIT_MESSAGE, PLACEHOLDER_FILE};
pub use pull::{pull_changes, PullStatus};
pub use push::{commit_local_changes, push_changes, PushStatus};
pub use worker::SyncWorker;

use anyhow::Result;
use std::sync::mpsc::Receiver;

use crate::backup::BackupManager;
use crate::config::AppConfig;
use crate::conflict::{FileResolutionEngine, RepositoryResolver};
use crate::editor::{wait_for_exit, EditorLauncher};
use crate::events::{EventSink, SyncEvent};
use crate::offline::{NetworkState, OfflineSessionTracker};
use crate::probe::RepositoryProbe;
use crate::prompt::{ChannelPrompter, Prompter};
use crate::scm::GitScm;

/// How a sync run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed,
    /// The user declined a conflict decision; later steps were skipped
    Cancelled,
    Failed(String),
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        *self == SyncOutcome::Completed
    }
}

/// Facts gathered while a session runs, needed to close it.
#[derive(Debug)]
struct RunState {
    network_end: NetworkState,
    in_sync: bool,
}

/// One vault's sync workflow with its collaborators.
pub struct SyncOrchestrator {
    config: AppConfig,
    probe: RepositoryProbe,
    backups: Option<BackupManager>,
    tracker: OfflineSessionTracker,
    events: EventSink,
    prompter: Box<dyn Prompter>,
    editor: Box<dyn EditorLauncher>,
}

impl SyncOrchestrator {
    /// Open (or initialize) the vault repository and wire up the components.
    pub fn new(
        config: AppConfig,
        events: EventSink,
        prompter: Box<dyn Prompter>,
        editor: Box<dyn EditorLauncher>,
    ) -> Result<Self> {
        let git = GitScm::open_or_init(&config.vault_path, &config.branch)?;
        git.ensure_identity()?;
        if let Some(url) = &config.remote_url {
            git.ensure_remote(&config.remote_name, url)?;
        }

        let probe = RepositoryProbe::new(git, &config);
        let backups = config
            .capabilities
            .backups
            .then(|| BackupManager::new(probe.vault(), config.backup));
        let tracker = OfflineSessionTracker::new(probe.clone(), backups.clone(), config.sessions);

        Ok(Self {
            config,
            probe,
            backups,
            tracker,
            events,
            prompter,
            editor,
        })
    }

    pub fn probe(&self) -> &RepositoryProbe {
        &self.probe
    }

    pub fn tracker(&self) -> &OfflineSessionTracker {
        &self.tracker
    }

    /// Run one full session. Never panics or raises; every failure becomes
    /// [`SyncOutcome::Failed`].
    pub fn run(&mut self) -> SyncOutcome {
        self.events.progress("Preparing vault", 5);
        if let Err(e) = ensure_local_head(self.probe.git(), &self.events) {
            return SyncOutcome::Failed(format!("Could not prepare the vault: {:#}", e));
        }

        self.events.progress("Checking network", 10);
        let network_start = self.tracker.check_network();
        self.events.log(format!("Network is {}", network_start));
        self.tracker.recover_abandoned_sessions(network_start);
        let session_id = match self.tracker.start_sync_session(network_start) {
            Ok(id) => id,
            Err(e) => return SyncOutcome::Failed(format!("{:#}", e)),
        };
        let start_head = self.probe.head_hash();

        let mut run = RunState {
            network_end: network_start,
            in_sync: false,
        };
        let outcome = self.run_session(network_start, &mut run);

        // The session is always closed before the result is reported
        let commits = self.commits_since(start_head.as_deref());
        self.tracker
            .end_sync_session(&session_id, run.network_end, commits);
        if outcome.is_completed() && run.in_sync {
            self.tracker.mark_session_resolved(&session_id);
            self.tracker.complete_successful_sync();
        }
        self.tracker.cleanup_sessions(false);

        self.events.progress(
            match &outcome {
                SyncOutcome::Completed => "Sync finished",
                SyncOutcome::Cancelled => "Sync cancelled",
                SyncOutcome::Failed(_) => "Sync stopped",
            },
            100,
        );
        outcome
    }

    fn run_session(&mut self, network_start: NetworkState, run: &mut RunState) -> SyncOutcome {
        let caps = self.config.capabilities;
        let can_reconcile = caps.conflict_resolution && self.probe.has_remote();

        if network_start.is_online() && can_reconcile && self.tracker.resolution_pending() {
            self.events
                .progress("Reconciling earlier offline work with the remote", 20);
            let outcome = self.reconcile();
            if !outcome.is_completed() {
                return outcome;
            }
        } else if network_start.is_online() {
            self.events.progress("Pulling remote changes", 30);
            match pull_changes(&self.probe, self.backups.as_ref(), &self.events) {
                PullStatus::Conflicted if caps.conflict_resolution => {
                    let outcome = self.reconcile();
                    if !outcome.is_completed() {
                        return outcome;
                    }
                }
                PullStatus::Conflicted => {
                    return SyncOutcome::Failed(
                        "Pulling hit conflicts and conflict resolution is disabled".to_string(),
                    );
                }
                PullStatus::Failed(msg) => {
                    self.events
                        .log(format!("Pull failed, continuing with local state: {}", msg));
                }
                PullStatus::Pulled | PullStatus::NoRemoteBranch => {}
            }
        } else {
            self.events.log("Offline: remote changes will be merged on a later sync");
        }

        if caps.launch_editor {
            self.events.progress("Waiting for the editor to close", 50);
            match self.editor.launch(self.probe.vault()) {
                Ok(()) => {
                    let polls = wait_for_exit(self.editor.as_mut(), self.config.poll_interval());
                    log::debug!("Editor closed after {} polls", polls);
                }
                Err(e) => self
                    .events
                    .log(format!("Could not launch the editor: {:#}", e)),
            }
        }

        // Connectivity may have changed while the editor was open
        self.events.progress("Re-checking network", 70);
        let network_end = self.tracker.check_network();
        run.network_end = network_end;
        if network_end.is_online()
            && can_reconcile
            && (!network_start.is_online() || self.tracker.resolution_pending())
        {
            self.events
                .log("Network is available; reconciling with the remote before pushing");
            let outcome = self.reconcile();
            if !outcome.is_completed() {
                return outcome;
            }
        }

        self.events.progress("Committing changes", 80);
        if let Err(e) = commit_local_changes(self.probe.git(), &self.events) {
            return SyncOutcome::Failed(format!("Commit failed: {:#}", e));
        }

        if network_end.is_online() {
            self.events.progress("Pushing to remote", 90);
            match push_changes(&self.probe, &self.events) {
                PushStatus::Pushed | PushStatus::UpToDate => run.in_sync = true,
                PushStatus::Failed(msg) => self.events.log(format!(
                    "Push failed; commits stay local until the next sync: {}",
                    msg
                )),
            }
        } else {
            self.events
                .log("Offline: changes committed locally and will be pushed later");
        }

        SyncOutcome::Completed
    }

    /// Stage 1, Stage 2 when needed, then an immediate push.
    pub fn reconcile(&mut self) -> SyncOutcome {
        let resolver = RepositoryResolver::new(
            self.probe.clone(),
            self.backups.clone(),
            self.events.clone(),
        );
        let result = resolver.resolve(self.config.remote_url.as_deref(), self.prompter.as_mut());
        if result.cancelled {
            self.events.log(&result.message);
            return SyncOutcome::Cancelled;
        }
        if !result.success {
            return SyncOutcome::Failed(result.message);
        }
        self.events.log(&result.message);

        if result.needs_stage2() || self.probe.merge_in_progress() {
            let mut engine = FileResolutionEngine::new(
                self.probe.git().clone(),
                &self.probe.remote_ref(),
                &result.remaining_conflicts,
                self.backups.clone(),
                self.events.clone(),
            );
            let outcome = engine.run(self.prompter.as_mut());
            if outcome.cancelled {
                self.events.log(&outcome.message);
                return SyncOutcome::Cancelled;
            }
            if !outcome.success {
                return SyncOutcome::Failed(outcome.message);
            }
            self.events.log(&outcome.message);
        }

        match push_changes(&self.probe, &self.events) {
            PushStatus::Pushed | PushStatus::UpToDate => {
                let resolved = self.tracker.mark_all_resolved();
                if !resolved.is_empty() {
                    log::info!("Marked {} session(s) resolved", resolved.len());
                }
            }
            PushStatus::Failed(msg) => self.events.log(format!(
                "Resolution committed locally but the push failed: {}",
                msg
            )),
        }
        SyncOutcome::Completed
    }

    /// Subjects of commits made since `start`, oldest first.
    fn commits_since(&self, start: Option<&str>) -> Vec<String> {
        let range = match start {
            Some(hash) => format!("{}..HEAD", hash),
            None => "HEAD".to_string(),
        };
        let output = self
            .probe
            .git()
            .query(&["log", "--reverse", "--pretty=%s", &range]);
        if !output.success() {
            return Vec::new();
        }
        output
            .text()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Run a sync on a background worker.
///
/// Prompts travel to the foreground through the returned receiver; pass it
/// to [`crate::events::render_events`].
pub fn spawn_sync(
    worker: &mut SyncWorker,
    config: AppConfig,
    editor: Box<dyn EditorLauncher>,
) -> Result<Receiver<SyncEvent>> {
    spawn_job(worker, config, editor, SyncOrchestrator::run)
}

/// Run [`SyncOrchestrator::reconcile`] on a background worker, reporting
/// through the returned receiver like [`spawn_sync`].
pub fn spawn_reconcile(
    worker: &mut SyncWorker,
    config: AppConfig,
    editor: Box<dyn EditorLauncher>,
) -> Result<Receiver<SyncEvent>> {
    spawn_job(worker, config, editor, SyncOrchestrator::reconcile)
}

fn spawn_job(
    worker: &mut SyncWorker,
    config: AppConfig,
    editor: Box<dyn EditorLauncher>,
    job: fn(&mut SyncOrchestrator) -> SyncOutcome,
) -> Result<Receiver<SyncEvent>> {
    let (events, rx) = EventSink::channel();
    worker.start(move || {
        let prompter = Box::new(ChannelPrompter::new(events.clone()));
        let outcome = match SyncOrchestrator::new(config, events.clone(), prompter, editor) {
            Ok(mut orchestrator) => job(&mut orchestrator),
            Err(e) => SyncOutcome::Failed(format!("{:#}", e)),
        };
        events.finish(outcome.clone());
        outcome
    })?;
    Ok(rx)
}
