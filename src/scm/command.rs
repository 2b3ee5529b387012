//! Subprocess execution with an optional timeout.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Exit code reported when the process could not be started or was killed.
pub const EXIT_NOT_RUN: i32 = -1;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    fn not_run(reason: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: reason,
            exit_code: EXIT_NOT_RUN,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed stdout.
    pub fn text(&self) -> &str {
        self.stdout.trim()
    }

    /// Stdout and stderr joined, for matching messages git prints on either stream.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// Best single-line description of a failure.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            stderr.to_string()
        } else {
            self.stdout.trim().to_string()
        }
    }
}

/// Run `program` with `args` in `cwd`.
///
/// Never fails: spawn errors and timeouts are reported through
/// [`CommandOutput::exit_code`] (`-1`) and `stderr`. With `timeout` set the
/// child is killed once the deadline passes; `None` waits for completion.
pub fn run_subprocess(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Option<Duration>,
) -> CommandOutput {
    run_with_env(program, args, cwd, &[], timeout)
}

/// Same as [`run_subprocess`] with extra environment variables.
pub fn run_with_env(
    program: &str,
    args: &[&str],
    cwd: &Path,
    env: &[(&str, &str)],
    timeout: Option<Duration>,
) -> CommandOutput {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in env {
        command.env(key, value);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return CommandOutput::not_run(format!(
                "Failed to run '{} {}': {}",
                program,
                args.join(" "),
                e
            ))
        }
    };

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match timeout {
        Some(limit) => wait_with_deadline(&mut child, limit),
        None => child.wait().map(Some).map_err(|e| e.to_string()),
    };

    let stdout = collect(stdout);
    let stderr = collect(stderr);

    match status {
        Ok(Some(status)) => CommandOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(EXIT_NOT_RUN),
        },
        Ok(None) => CommandOutput {
            stdout,
            stderr: format!(
                "'{} {}' timed out after {}s",
                program,
                args.join(" "),
                timeout.map(|t| t.as_secs()).unwrap_or_default()
            ),
            exit_code: EXIT_NOT_RUN,
        },
        Err(e) => CommandOutput::not_run(format!("Failed to wait for '{}': {}", program, e)),
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<Vec<u8>>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Poll the child until it exits or `limit` passes. `Ok(None)` means it was killed.
fn wait_with_deadline(
    child: &mut Child,
    limit: Duration,
) -> Result<Option<std::process::ExitStatus>, String> {
    let deadline = Instant::now() + limit;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_program_reports_not_run() {
        let temp = TempDir::new().unwrap();
        let output = run_subprocess(
            "definitely-not-a-real-binary-ogresync",
            &["--version"],
            temp.path(),
            None,
        );
        assert!(!output.success());
        assert_eq!(output.exit_code, EXIT_NOT_RUN);
        assert!(output.stderr.contains("Failed to run"));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stdout_and_exit_code() {
        let temp = TempDir::new().unwrap();
        let output = run_subprocess("sh", &["-c", "echo hello; exit 3"], temp.path(), None);
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.text(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let temp = TempDir::new().unwrap();
        let started = Instant::now();
        let output = run_subprocess(
            "sleep",
            &["5"],
            temp.path(),
            Some(Duration::from_millis(200)),
        );
        assert_eq!(output.exit_code, EXIT_NOT_RUN);
        assert!(output.stderr.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_error_text_prefers_stderr() {
        let output = CommandOutput {
            stdout: "out".to_string(),
            stderr: " err \n".to_string(),
            exit_code: 1,
        };
        assert_eq!(output.error_text(), "err");
        assert!(output.combined().contains("out"));
    }
}
