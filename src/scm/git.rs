//! Git backend using CLI commands.
//!
//! Every invocation is an argument list; nothing is ever passed through a shell.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::command::{run_with_env, CommandOutput};
use crate::sanitize::sanitize_commit_message;

/// Identity configured locally when the user has none.
pub const FALLBACK_USER_NAME: &str = "Ogresync User";
pub const FALLBACK_USER_EMAIL: &str = "ogresync@local";

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Git repository handle using the git CLI.
#[derive(Debug, Clone)]
pub struct GitScm {
    workdir: PathBuf,
    query_timeout: Duration,
}

impl GitScm {
    /// Open an existing Git repository.
    pub fn open(path: &Path) -> Result<Self> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if !path.join(".git").exists() {
            return Err(anyhow!(
                "Not a git repository: '{}' (no .git directory)",
                path.display()
            ));
        }

        Ok(Self {
            workdir: path,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        })
    }

    /// Initialize a new Git repository whose unborn branch is `branch`.
    pub fn init(path: &Path, branch: &str) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory '{}'", path.display()))?;

        let output = run_with_env("git", &["init"], path, &[], None);
        if !output.success() {
            return Err(anyhow!("git init failed: {}", output.error_text()));
        }

        let scm = Self::open(path)?;
        // Older git has no `init -b`
        let head = format!("refs/heads/{}", branch);
        scm.run_git_ok(&["symbolic-ref", "HEAD", &head])?;
        Ok(scm)
    }

    /// Open the repository at `path`, initializing one if there is none.
    pub fn open_or_init(path: &Path, branch: &str) -> Result<Self> {
        if super::is_repo(path) {
            Self::open(path)
        } else {
            log::info!("Initializing git repository in {}", path.display());
            Self::init(path, branch)
        }
    }

    /// Timeout applied to read-only queries.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run a git command to completion. Used for merges, pushes and other
    /// operations that may legitimately take a long time.
    pub fn run(&self, args: &[&str]) -> CommandOutput {
        log::debug!("git {}", args.join(" "));
        run_with_env("git", args, &self.workdir, &[("GIT_TERMINAL_PROMPT", "0")], None)
    }

    /// Run a read-only git command with the short query timeout.
    pub fn query(&self, args: &[&str]) -> CommandOutput {
        run_with_env(
            "git",
            args,
            &self.workdir,
            &[("GIT_TERMINAL_PROMPT", "0")],
            Some(self.query_timeout),
        )
    }

    /// Run a git command and return trimmed stdout, failing on a non-zero exit.
    pub fn run_git(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args);
        if !output.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                output.error_text()
            ));
        }
        Ok(output.text().to_string())
    }

    /// Run a git command, returning Ok if it succeeds (ignoring stdout).
    pub fn run_git_ok(&self, args: &[&str]) -> Result<()> {
        self.run_git(args).map(|_| ())
    }

    /// Check if a read-only git command succeeds (exit code 0).
    pub fn git_succeeds(&self, args: &[&str]) -> bool {
        self.query(args).success()
    }

    pub fn current_branch(&self) -> Option<String> {
        let output = self.query(&["branch", "--show-current"]);
        let name = output.text();
        (output.success() && !name.is_empty()).then(|| name.to_string())
    }

    /// Hash of HEAD, or `None` when there are no commits yet.
    pub fn head_hash(&self) -> Option<String> {
        self.rev_parse("HEAD")
    }

    /// Resolve a revision to its hash without failing.
    pub fn rev_parse(&self, rev: &str) -> Option<String> {
        let output = self.query(&["rev-parse", "--verify", "--quiet", rev]);
        (output.success() && !output.text().is_empty()).then(|| output.text().to_string())
    }

    /// Stage all changes (add and remove).
    pub fn stage_all(&self) -> Result<()> {
        self.run_git_ok(&["add", "-A"])
    }

    /// Stage specific paths. Each path is its own argument.
    pub fn stage_paths(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_git_ok(&args)
    }

    /// Commit staged changes. The message is sanitized first.
    pub fn commit(&self, message: &str) -> Result<()> {
        let message = sanitize_commit_message(message);
        self.run_git_ok(&["commit", "-m", &message])
    }

    /// Whether the index holds anything to commit.
    pub fn has_staged_changes(&self) -> bool {
        // exit 1 means differences
        self.query(&["diff", "--cached", "--quiet"]).exit_code == 1
    }

    /// Check if there are uncommitted changes, untracked files included.
    pub fn has_changes(&self) -> bool {
        let output = self.query(&["status", "--porcelain"]);
        output.success() && !output.text().is_empty()
    }

    pub fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        self.run_git_ok(&["remote", "add", name, url])
    }

    pub fn has_remote(&self, name: &str) -> bool {
        self.git_succeeds(&["remote", "get-url", name])
    }

    pub fn get_remote_url(&self, name: &str) -> Option<String> {
        let output = self.query(&["remote", "get-url", name]);
        output.success().then(|| output.text().to_string())
    }

    pub fn set_remote_url(&self, name: &str, url: &str) -> Result<()> {
        self.run_git_ok(&["remote", "set-url", name, url])
    }

    /// Add the remote, or repoint it when the URL differs.
    pub fn ensure_remote(&self, name: &str, url: &str) -> Result<()> {
        match self.get_remote_url(name) {
            Some(existing) if existing == url => Ok(()),
            Some(_) => self.set_remote_url(name, url),
            None => self.add_remote(name, url),
        }
    }

    pub fn fetch(&self, remote: &str) -> CommandOutput {
        self.run(&["fetch", remote])
    }

    pub fn push(&self, remote: &str, branch: &str) -> CommandOutput {
        self.run(&["push", remote, branch])
    }

    /// Push `branch` and record it as the upstream.
    pub fn push_set_upstream(&self, remote: &str, branch: &str) -> CommandOutput {
        self.run(&["push", "-u", remote, branch])
    }

    /// Configure upstream tracking for the current branch if the remote ref exists.
    pub fn ensure_upstream(&self, remote: &str, branch: &str) {
        let upstream = format!("{}/{}", remote, branch);
        if self.rev_parse(&format!("refs/remotes/{}", upstream)).is_none() {
            return;
        }
        let current = self.query(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"]);
        if current.success() && current.text() == upstream {
            return;
        }
        let output = self.run(&["branch", "--set-upstream-to", &upstream]);
        if !output.success() {
            log::warn!("Could not set upstream to {}: {}", upstream, output.error_text());
        }
    }

    pub fn config_get(&self, key: &str) -> Option<String> {
        let output = self.query(&["config", "--get", key]);
        (output.success() && !output.text().is_empty()).then(|| output.text().to_string())
    }

    /// Configure a repository-local identity when none is visible to git.
    pub fn ensure_identity(&self) -> Result<()> {
        if self.config_get("user.name").is_none() {
            self.run_git_ok(&["config", "user.name", FALLBACK_USER_NAME])?;
        }
        if self.config_get("user.email").is_none() {
            self.run_git_ok(&["config", "user.email", FALLBACK_USER_EMAIL])?;
        }
        Ok(())
    }

    /// Subject line of the most recent commit.
    pub fn last_commit_message(&self) -> Option<String> {
        let output = self.query(&["log", "-1", "--pretty=%B"]);
        output.success().then(|| output.text().to_string())
    }

    /// Files tracked at `rev`, relative to the repository root.
    pub fn list_tree(&self, rev: &str) -> Vec<String> {
        let output = self.query(&["ls-tree", "-r", "--name-only", "-z", rev]);
        if !output.success() {
            return Vec::new();
        }
        split_nul(&output.stdout)
    }

    /// Files tracked in the index.
    pub fn list_index(&self) -> Vec<String> {
        let output = self.query(&["ls-files", "-z"]);
        if !output.success() {
            return Vec::new();
        }
        split_nul(&output.stdout)
    }

    /// Untracked files that are not ignored.
    pub fn list_untracked(&self) -> Vec<String> {
        let output = self.query(&["ls-files", "--others", "--exclude-standard", "-z"]);
        if !output.success() {
            return Vec::new();
        }
        split_nul(&output.stdout)
    }

    /// Paths with uncommitted changes, untracked files included.
    pub fn dirty_paths(&self) -> Vec<String> {
        let output = self.query(&["status", "--porcelain", "-z", "--untracked-files=all"]);
        if !output.success() {
            return Vec::new();
        }
        let mut paths = Vec::new();
        let mut records = output.stdout.split('\0').filter(|s| !s.is_empty());
        while let Some(record) = records.next() {
            if record.len() < 4 {
                continue;
            }
            let (status, path) = record.split_at(3);
            paths.push(path.to_string());
            // renames and copies carry the original path as a second record
            if status.starts_with('R') || status.starts_with('C') {
                records.next();
            }
        }
        paths
    }

    /// Paths that differ between two revisions.
    pub fn changed_paths(&self, from: &str, to: &str) -> Vec<String> {
        let output = self.query(&["diff", "--name-only", "-z", from, to]);
        if !output.success() {
            return Vec::new();
        }
        split_nul(&output.stdout)
    }

    /// Raw content of `path` at `rev`, or `None` if it does not exist there.
    pub fn show_file(&self, rev: &str, path: &str) -> Option<Vec<u8>> {
        let spec = format!("{}:{}", rev, path);
        let output = std::process::Command::new("git")
            .args(["show", &spec])
            .current_dir(&self.workdir)
            .stdin(std::process::Stdio::null())
            .output()
            .ok()?;
        output.status.success().then_some(output.stdout)
    }

    /// Check out `path` from `rev` into the index and working tree.
    ///
    /// The path is passed exactly as given, as one argument after `--`.
    pub fn checkout_path(&self, rev: &str, path: &str) -> Result<()> {
        self.run_git_ok(&["checkout", rev, "--", path])
    }

    pub fn merge_base(&self, a: &str, b: &str) -> Option<String> {
        let output = self.query(&["merge-base", a, b]);
        (output.success() && !output.text().is_empty()).then(|| output.text().to_string())
    }
}

fn split_nul(stdout: &str) -> Vec<String> {
    stdout
        .split('\0')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scm::git_available;
    use tempfile::TempDir;

    #[test]
    fn test_git_init_and_open() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let scm = GitScm::init(temp.path(), "main").unwrap();

        assert!(temp.path().join(".git").exists());
        assert_eq!(scm.workdir(), temp.path().canonicalize().unwrap());
        assert!(scm.head_hash().is_none());
    }

    #[test]
    fn test_git_stage_commit() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let scm = GitScm::init(temp.path(), "main").unwrap();
        scm.ensure_identity().unwrap();

        assert!(!scm.has_changes());

        std::fs::write(temp.path().join("note.md"), "hello").unwrap();
        assert!(scm.has_changes());

        scm.stage_all().unwrap();
        assert!(scm.has_staged_changes());
        scm.commit("Initial commit; $(echo injected)").unwrap();
        assert!(!scm.has_changes());

        let hash = scm.head_hash().unwrap();
        assert_eq!(hash.len(), 40);
        assert_eq!(scm.current_branch().as_deref(), Some("main"));
        assert_eq!(
            scm.last_commit_message().as_deref(),
            Some("Initial commit echo injected")
        );
        assert_eq!(scm.list_tree("HEAD"), vec!["note.md".to_string()]);
    }

    #[test]
    fn test_git_remote() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let scm = GitScm::init(temp.path(), "main").unwrap();

        assert!(!scm.has_remote("origin"));

        scm.ensure_remote("origin", "https://github.com/test/repo.git")
            .unwrap();
        assert!(scm.has_remote("origin"));
        assert!(!scm.has_remote("upstream"));

        scm.ensure_remote("origin", "git@github.com:test/repo.git")
            .unwrap();
        assert_eq!(
            scm.get_remote_url("origin").as_deref(),
            Some("git@github.com:test/repo.git")
        );
    }

    #[test]
    fn test_dirty_and_changed_paths() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let scm = GitScm::init(temp.path(), "main").unwrap();
        scm.ensure_identity().unwrap();
        std::fs::write(temp.path().join("a.md"), "one").unwrap();
        scm.stage_all().unwrap();
        scm.commit("first").unwrap();
        let first = scm.head_hash().unwrap();

        std::fs::write(temp.path().join("a.md"), "two").unwrap();
        std::fs::create_dir_all(temp.path().join("dir")).unwrap();
        std::fs::write(temp.path().join("dir/new note.md"), "new").unwrap();
        let mut dirty = scm.dirty_paths();
        dirty.sort();
        assert_eq!(dirty, vec!["a.md".to_string(), "dir/new note.md".to_string()]);

        scm.stage_all().unwrap();
        scm.commit("second").unwrap();
        let mut changed = scm.changed_paths(&first, "HEAD");
        changed.sort();
        assert_eq!(changed, vec!["a.md".to_string(), "dir/new note.md".to_string()]);
        assert!(scm.dirty_paths().is_empty());
    }

    #[test]
    fn test_show_file_missing_path() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let scm = GitScm::init(temp.path(), "main").unwrap();
        scm.ensure_identity().unwrap();
        std::fs::write(temp.path().join("a b.md"), "spaced").unwrap();
        scm.stage_all().unwrap();
        scm.commit("add").unwrap();

        assert_eq!(scm.show_file("HEAD", "a b.md").unwrap(), b"spaced");
        assert!(scm.show_file("HEAD", "missing.md").is_none());
    }
}
