//! Read-only repository and network queries.
//!
//! Nothing here mutates the repository and nothing returns an error: an
//! unconfigured or freshly initialized repository routinely lacks the refs
//! being asked about, so every failure reads as "no" or zero.

use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use crate::config::AppConfig;
use crate::scm::GitScm;

/// Host probed when neither the config nor the remote URL names one.
pub const DEFAULT_PROBE_HOST: &str = "github.com";

/// Attempt a single TCP connection to `host:port` within `timeout`.
pub fn network_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            log::debug!("Could not resolve {}: {}", host, e);
            return false;
        }
    };
    for addr in addrs {
        if TcpStream::connect_timeout(&addr, timeout).is_ok() {
            return true;
        }
    }
    false
}

/// Where a remote URL points for reachability purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLocation {
    /// Hosted remote reached over the network
    Host(String),
    /// Remote on the local filesystem
    Path(String),
}

/// Extract the host (or local path) a remote URL refers to.
///
/// Handles scp-like (`git@host:user/repo.git`), `https://`, `http://`,
/// `ssh://`, `git://` and `file://` URLs as well as plain paths.
pub fn remote_location(url: &str) -> Option<RemoteLocation> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    if let Some(path) = url.strip_prefix("file://") {
        return Some(RemoteLocation::Path(path.to_string()));
    }

    if let Some((_, rest)) = url.split_once("://") {
        let authority = rest.split('/').next().unwrap_or_default();
        let host_port = authority.rsplit('@').next().unwrap_or(authority);
        let host = if host_port.starts_with('[') {
            host_port
                .split(']')
                .next()
                .map(|h| h.trim_start_matches('['))
                .unwrap_or(host_port)
        } else {
            host_port.split(':').next().unwrap_or(host_port)
        };
        return (!host.is_empty()).then(|| RemoteLocation::Host(host.to_string()));
    }

    // scp-like syntax: [user@]host:path, but not a Windows drive letter or a
    // path that merely contains a colon after a slash
    if let Some((before, _)) = url.split_once(':') {
        if !before.contains('/') && before.len() > 1 {
            let host = before.rsplit('@').next().unwrap_or(before);
            if !host.is_empty() {
                return Some(RemoteLocation::Host(host.to_string()));
            }
        }
    }

    Some(RemoteLocation::Path(url.to_string()))
}

/// Read-only view of a vault repository and its remote.
#[derive(Debug, Clone)]
pub struct RepositoryProbe {
    git: GitScm,
    remote_name: String,
    branch: String,
    host_override: Option<String>,
    remote_url: Option<String>,
    port: u16,
    network_timeout: Duration,
}

impl RepositoryProbe {
    pub fn new(git: GitScm, config: &AppConfig) -> Self {
        Self {
            git: git.with_query_timeout(config.probe_timeout()),
            remote_name: config.remote_name.clone(),
            branch: config.branch.clone(),
            host_override: config.network.host.clone(),
            remote_url: config.remote_url.clone(),
            port: config.network.port,
            network_timeout: config.network_timeout(),
        }
    }

    pub fn git(&self) -> &GitScm {
        &self.git
    }

    pub fn vault(&self) -> &Path {
        self.git.workdir()
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Remote-tracking ref name, e.g. `origin/main`.
    pub fn remote_ref(&self) -> String {
        format!("{}/{}", self.remote_name, self.branch)
    }

    /// False if HEAD cannot be resolved.
    pub fn has_any_commit(&self) -> bool {
        self.git.head_hash().is_some()
    }

    pub fn has_remote(&self) -> bool {
        self.git.has_remote(&self.remote_name)
    }

    /// Whether `branch` exists on the remote. False when the listing is
    /// empty or the remote cannot be queried.
    pub fn remote_branch_exists(&self, branch: &str) -> bool {
        let head = format!("refs/heads/{}", branch);
        let output = self
            .git
            .query(&["ls-remote", "--heads", &self.remote_name, &head]);
        output.success() && !output.text().is_empty()
    }

    /// Whether the remote-tracking ref for the configured branch exists locally.
    pub fn remote_ref_exists(&self) -> bool {
        self.remote_tip_hash().is_some()
    }

    pub fn head_hash(&self) -> Option<String> {
        self.git.head_hash()
    }

    pub fn remote_tip_hash(&self) -> Option<String> {
        self.git
            .rev_parse(&format!("refs/remotes/{}", self.remote_ref()))
    }

    /// `(ahead, behind)` relative to the tracked remote branch.
    ///
    /// A missing remote ref or HEAD yields `(0, 0)`. Equal tip hashes always
    /// yield `(0, 0)` whatever the revision count says.
    pub fn ahead_behind_counts(&self) -> (usize, usize) {
        self.ahead_behind_against(&format!("refs/remotes/{}", self.remote_ref()))
    }

    /// `(ahead, behind)` of HEAD relative to an arbitrary revision, with the
    /// same missing-ref and equal-tip rules as [`Self::ahead_behind_counts`].
    pub fn ahead_behind_against(&self, rev: &str) -> (usize, usize) {
        let Some(remote_tip) = self.git.rev_parse(rev) else {
            return (0, 0);
        };
        let Some(local_tip) = self.head_hash() else {
            return (0, 0);
        };

        counts_between(&local_tip, &remote_tip, || {
            let range = format!("HEAD...{}", remote_tip);
            let output = self
                .git
                .query(&["rev-list", "--left-right", "--count", &range]);
            if !output.success() {
                return None;
            }
            parse_left_right(output.text())
        })
    }

    /// Number of local commits the remote does not have.
    pub fn unpushed_commits(&self) -> usize {
        self.ahead_behind_counts().0
    }

    /// Subjects of local commits the remote does not have, oldest first.
    pub fn unpushed_commit_messages(&self) -> Vec<String> {
        if self.unpushed_commits() == 0 {
            return Vec::new();
        }
        let range = format!("{}..HEAD", self.remote_ref());
        let output = self
            .git
            .query(&["log", "--reverse", "--pretty=%s", &range]);
        if !output.success() {
            return Vec::new();
        }
        output
            .text()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string())
            .collect()
    }

    /// Short TCP reachability check of the remote host. No retries.
    ///
    /// A remote on the local filesystem is reachable when its path exists.
    pub fn network_reachable(&self) -> bool {
        if let Some(host) = &self.host_override {
            return network_reachable(host, self.port, self.network_timeout);
        }

        let url = self
            .remote_url
            .clone()
            .or_else(|| self.git.get_remote_url(&self.remote_name));

        match url.as_deref().and_then(remote_location) {
            Some(RemoteLocation::Path(path)) => {
                let path = Path::new(&path);
                if path.is_absolute() {
                    path.exists()
                } else {
                    self.vault().join(path).exists()
                }
            }
            Some(RemoteLocation::Host(host)) => {
                network_reachable(&host, self.port, self.network_timeout)
            }
            None => network_reachable(DEFAULT_PROBE_HOST, self.port, self.network_timeout),
        }
    }

    pub fn merge_in_progress(&self) -> bool {
        self.git.rev_parse("MERGE_HEAD").is_some()
    }

    pub fn rebase_in_progress(&self) -> bool {
        ["rebase-merge", "rebase-apply"]
            .iter()
            .any(|dir| self.git_path(dir).exists())
    }

    /// Files git reports as unmerged.
    pub fn unmerged_files(&self) -> Vec<String> {
        let output = self
            .git
            .query(&["diff", "--name-only", "--diff-filter=U", "-z"]);
        if !output.success() {
            return Vec::new();
        }
        let mut files: Vec<String> = output
            .stdout
            .split('\0')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        files.dedup();
        files
    }

    /// True if a merge or rebase is mid-flight or any file is unmerged.
    pub fn conflict_markers_present(&self) -> bool {
        self.merge_in_progress() || self.rebase_in_progress() || !self.unmerged_files().is_empty()
    }

    pub fn has_uncommitted_changes(&self) -> bool {
        self.git.has_changes()
    }

    pub fn current_branch(&self) -> Option<String> {
        self.git.current_branch()
    }

    fn git_path(&self, name: &str) -> std::path::PathBuf {
        let output = self.git.query(&["rev-parse", "--git-path", name]);
        let relative = if output.success() && !output.text().is_empty() {
            output.text().to_string()
        } else {
            format!(".git/{}", name)
        };
        let path = Path::new(&relative);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.vault().join(path)
        }
    }
}

/// Equal tips short-circuit to `(0, 0)` without consulting `count`.
fn counts_between<F>(local_tip: &str, remote_tip: &str, count: F) -> (usize, usize)
where
    F: FnOnce() -> Option<(usize, usize)>,
{
    if local_tip == remote_tip {
        return (0, 0);
    }
    count().unwrap_or((0, 0))
}

fn parse_left_right(text: &str) -> Option<(usize, usize)> {
    let mut parts = text.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    Some((ahead, behind))
}
