//! Version-control plumbing.
//!
//! All git access goes through the `git` binary. [`run_subprocess`] is the
//! single place a child process is spawned.

pub mod command;
mod git;

use std::path::Path;

pub use command::{run_subprocess, CommandOutput};
pub use git::{GitScm, FALLBACK_USER_EMAIL, FALLBACK_USER_NAME};

/// Check if a directory is a Git repository.
pub fn is_repo(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Whether a usable `git` binary is on PATH.
pub fn git_available() -> bool {
    run_subprocess(
        "git",
        &["--version"],
        &std::env::temp_dir(),
        Some(std::time::Duration::from_secs(5)),
    )
    .success()
}
