//! # ogresync
//!
//! Offline-aware git synchronization for a folder of notes (a "vault").
//!
//! ## Overview
//!
//! A sync run pulls remote changes, opens the note editor, waits for it to
//! close, then commits and pushes whatever changed. The network may be gone
//! at the start, come back during editing, or disappear again; each run is
//! recorded as a session so work committed offline is reconciled with the
//! remote as soon as it is reachable.
//!
//! ## Key Features
//!
//! - **Offline sessions**: every run is classified by its start and end
//!   network state, and runs that committed offline are reconciled later
//! - **Two-stage conflict resolution**: a repository-level strategy (smart
//!   merge, keep local, keep remote), then file-by-file resolution
//! - **Backups before every destructive step**, never committed to the vault
//! - **Argument-list git invocation** with sanitized commit messages
//!
//! ## Architecture
//!
//! - Configuration and logging ([`config`], [`logger`])
//! - Git plumbing and read-only queries ([`scm`], [`sanitize`], [`probe`])
//! - Safety snapshots ([`backup`])
//! - Session tracking ([`offline`])
//! - Conflict resolution ([`conflict`])
//! - Collaborators: prompts, events and the editor ([`prompt`], [`events`], [`editor`])
//! - The sync workflow ([`sync`]) and CLI command handlers ([`handlers`])

/// Safety snapshots of vault files, taken before any step that can discard
/// content. Snapshots, their registry and recovery instructions live in the
/// vault's ignored `.ogresync-backups` directory.
pub mod backup;

/// Platform-agnostic configuration directory management and the TOML
/// application configuration, including the capability flags.
pub mod config;

/// Repository-level and file-level conflict resolution.
pub mod conflict;

/// Launching the external note editor and polling until it closes.
pub mod editor;

/// Ordered log, progress and prompt events from the sync worker to the
/// foreground thread.
pub mod events;

/// Command handlers behind the `ogresync` binary.
pub mod handlers;

/// Logging configuration and utilities.
///
/// Console logging through `env_logger` (controlled by `RUST_LOG`) plus an
/// append-only log file in the config directory, rotated by size.
pub mod logger;

/// Sync sessions, their network-state classification, and the persisted
/// offline state that decides when a conflict resolution is owed.
pub mod offline;

/// Read-only repository and network queries that never fail.
pub mod probe;

/// Sources of user decisions: terminal, channel, scripted and none.
pub mod prompt;

/// Free-text sanitization for values passed to git.
pub mod sanitize;

/// Subprocess execution and the git command-line backend.
pub mod scm;

/// The sync workflow and its single background worker.
pub mod sync;
