//! Launching the note editor and waiting for it to close.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use crate::config::EditorConfig;
use crate::scm::run_subprocess;

/// External editor process control.
pub trait EditorLauncher: Send {
    /// Start the editor on the vault.
    fn launch(&mut self, vault: &Path) -> Result<()>;

    /// Whether the editor is still open.
    fn is_running(&mut self) -> bool;
}

/// Poll `editor` until it exits. Returns the number of polls made.
pub fn wait_for_exit(editor: &mut dyn EditorLauncher, poll_interval: Duration) -> usize {
    let mut polls = 0;
    while editor.is_running() {
        polls += 1;
        thread::sleep(poll_interval);
    }
    polls
}

/// Runs the configured editor command as a child process.
///
/// Launchers such as Flatpak or AppImage wrappers exit right away while the
/// editor keeps running; when `process_name` is configured, liveness also
/// checks the process table for it.
pub struct ProcessEditor {
    command: Vec<String>,
    process_name: Option<String>,
    child: Option<Child>,
}

impl ProcessEditor {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            command: config.command.clone(),
            process_name: config.process_name.clone(),
            child: None,
        }
    }

    fn child_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                log::debug!("Editor process exited with {}", status);
                self.child = None;
                false
            }
            Err(e) => {
                log::warn!("Could not query editor process: {}", e);
                self.child = None;
                false
            }
        }
    }

    fn named_process_running(&self) -> bool {
        let Some(name) = &self.process_name else {
            return false;
        };
        if cfg!(windows) {
            let filter = format!("IMAGENAME eq {}", name);
            let output = run_subprocess(
                "tasklist",
                &["/FI", &filter, "/NH"],
                &std::env::temp_dir(),
                Some(Duration::from_secs(5)),
            );
            output.success() && output.stdout.to_lowercase().contains(&name.to_lowercase())
        } else {
            run_subprocess(
                "pgrep",
                &["-f", name],
                &std::env::temp_dir(),
                Some(Duration::from_secs(5)),
            )
            .success()
        }
    }
}

impl EditorLauncher for ProcessEditor {
    fn launch(&mut self, vault: &Path) -> Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("No editor command configured"))?;

        let child = Command::new(program)
            .args(args)
            .arg(vault)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to launch editor '{}'", program))?;
        log::info!("Launched editor '{}' (pid {})", program, child.id());
        self.child = Some(child);
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        self.child_running() || self.named_process_running()
    }
}

/// Editor stand-in that is never open. Used when editor launching is
/// disabled and in tests.
#[derive(Debug, Default)]
pub struct NoopEditor {
    launches: usize,
}

impl NoopEditor {
    pub fn launches(&self) -> usize {
        self.launches
    }
}

impl EditorLauncher for NoopEditor {
    fn launch(&mut self, _vault: &Path) -> Result<()> {
        self.launches += 1;
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        false
    }
}
