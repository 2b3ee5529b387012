//! Shared fixture: a bare "remote", a collaborator clone that pushes to it,
//! and the vault under test.

#![allow(dead_code)]

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use ogresync::config::AppConfig;
use ogresync::editor::EditorLauncher;
use ogresync::prompt::{MergeRequest, Prompter, ScriptedPrompter};

pub struct Fixture {
    _root: TempDir,
    pub remote: PathBuf,
    pub other: PathBuf,
    pub vault: PathBuf,
}

/// Run git in `dir`, panicking on failure. Returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git should run");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn configure_identity(dir: &Path) {
    git(dir, &["config", "user.name", "Test User"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

pub fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn read(dir: &Path, rel: &str) -> String {
    fs::read_to_string(dir.join(rel)).unwrap()
}

pub fn commit_all(dir: &Path, message: &str) {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-m", message]);
}

pub fn head(dir: &Path) -> String {
    git(dir, &["rev-parse", "HEAD"])
}

impl Fixture {
    /// Remote seeded with `files` by the collaborator; the vault is a clone.
    ///
    /// `None` when git is not installed.
    pub fn with_files(files: &[(&str, &str)]) -> Option<Self> {
        if !ogresync::scm::git_available() {
            return None;
        }
        let root = TempDir::new().unwrap();
        let remote = root.path().join("remote.git");
        let other = root.path().join("other");
        let vault = root.path().join("vault");

        git(root.path(), &["init", "--bare", "remote.git"]);
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        fs::create_dir_all(&other).unwrap();
        git(&other, &["init"]);
        git(&other, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        configure_identity(&other);
        git(&other, &["remote", "add", "origin", remote.to_str().unwrap()]);
        for (path, content) in files {
            write(&other, path, content);
        }
        commit_all(&other, "Seed notes");
        git(&other, &["push", "-u", "origin", "main"]);

        git(
            root.path(),
            &["clone", remote.to_str().unwrap(), vault.to_str().unwrap()],
        );
        configure_identity(&vault);

        Some(Self {
            _root: root,
            remote,
            other,
            vault,
        })
    }

    /// Remote seeded by the collaborator; the vault has its own unrelated
    /// history with `local_files`.
    pub fn unrelated(remote_files: &[(&str, &str)], local_files: &[(&str, &str)]) -> Option<Self> {
        let fixture = Self::with_files(remote_files)?;
        fs::remove_dir_all(&fixture.vault).unwrap();
        fs::create_dir_all(&fixture.vault).unwrap();
        git(&fixture.vault, &["init"]);
        git(&fixture.vault, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        configure_identity(&fixture.vault);
        git(
            &fixture.vault,
            &["remote", "add", "origin", fixture.remote.to_str().unwrap()],
        );
        for (path, content) in local_files {
            write(&fixture.vault, path, content);
        }
        commit_all(&fixture.vault, "Local notes");
        Some(fixture)
    }

    /// Collaborator commits `files` and pushes.
    pub fn push_from_other(&self, files: &[(&str, &str)], message: &str) {
        git(&self.other, &["pull", "--ff-only", "origin", "main"]);
        for (path, content) in files {
            write(&self.other, path, content);
        }
        commit_all(&self.other, message);
        git(&self.other, &["push", "origin", "main"]);
    }

    /// Collaborator deletes `paths` and pushes.
    pub fn remove_from_other(&self, paths: &[&str], message: &str) {
        git(&self.other, &["pull", "--ff-only", "origin", "main"]);
        let mut args = vec!["rm", "--quiet", "--"];
        args.extend_from_slice(paths);
        git(&self.other, &args);
        git(&self.other, &["commit", "-m", message]);
        git(&self.other, &["push", "origin", "main"]);
    }

    /// Collaborator commits raw bytes at `rel` and pushes.
    pub fn push_bytes_from_other(&self, rel: &str, bytes: &[u8], message: &str) {
        git(&self.other, &["pull", "--ff-only", "origin", "main"]);
        fs::write(self.other.join(rel), bytes).unwrap();
        commit_all(&self.other, message);
        git(&self.other, &["push", "origin", "main"]);
    }

    pub fn remote_tip(&self) -> String {
        git(&self.remote, &["rev-parse", "refs/heads/main"])
    }

    pub fn remote_file(&self, rel: &str) -> Option<String> {
        let output = Command::new("git")
            .args(["show", &format!("main:{}", rel)])
            .current_dir(&self.remote)
            .output()
            .ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Config for the vault; the local remote path counts as reachable.
    pub fn online_config(&self) -> AppConfig {
        let mut config = AppConfig::new(&self.vault);
        config.remote_url = Some(self.remote.to_string_lossy().to_string());
        config.probe_timeout_secs = 30;
        config
    }

    /// Config whose network probe targets a closed local port.
    pub fn offline_config(&self) -> AppConfig {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut config = self.online_config();
        config.network.host = Some("127.0.0.1".to_string());
        config.network.port = port;
        config.network.timeout_secs = 1;
        config
    }
}

/// Scripted prompter whose transcript stays readable after it has been
/// boxed into an orchestrator.
#[derive(Clone)]
pub struct SharedPrompter(pub Arc<Mutex<ScriptedPrompter>>);

impl SharedPrompter {
    pub fn new(script: ScriptedPrompter) -> Self {
        Self(Arc::new(Mutex::new(script)))
    }

    pub fn asked(&self) -> Vec<String> {
        self.0.lock().unwrap().asked().to_vec()
    }
}

impl Prompter for SharedPrompter {
    fn choose(&mut self, title: &str, message: &str, options: &[String]) -> Option<usize> {
        self.0.lock().unwrap().choose(title, message, options)
    }

    fn edit_merge(&mut self, request: &MergeRequest) -> Option<String> {
        self.0.lock().unwrap().edit_merge(request)
    }
}

/// What the editor saw when it was launched.
#[derive(Debug, Clone, Default)]
pub struct LaunchRecord {
    pub launches: usize,
    pub vault_head: Option<String>,
    pub remote_tip: Option<String>,
}

/// Editor stand-in that "edits" by writing files and records the
/// repository state at launch.
pub struct ScriptedEditor {
    pub remote: PathBuf,
    pub edits: Vec<(String, String)>,
    pub record: Arc<Mutex<LaunchRecord>>,
}

impl ScriptedEditor {
    pub fn new(fixture: &Fixture, edits: &[(&str, &str)]) -> (Self, Arc<Mutex<LaunchRecord>>) {
        let record = Arc::new(Mutex::new(LaunchRecord::default()));
        (
            Self {
                remote: fixture.remote.clone(),
                edits: edits
                    .iter()
                    .map(|(p, c)| (p.to_string(), c.to_string()))
                    .collect(),
                record: Arc::clone(&record),
            },
            record,
        )
    }
}

impl EditorLauncher for ScriptedEditor {
    fn launch(&mut self, vault: &Path) -> anyhow::Result<()> {
        let mut record = self.record.lock().unwrap();
        record.launches += 1;
        record.vault_head = Some(head(vault));
        record.remote_tip = Some(git(&self.remote, &["rev-parse", "refs/heads/main"]));
        for (path, content) in &self.edits {
            write(vault, path, content);
        }
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        false
    }
}
