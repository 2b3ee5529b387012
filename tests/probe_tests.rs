mod common;

use std::process::Command;

use common::{commit_all, git, head, write, Fixture};

use ogresync::config::AppConfig;
use ogresync::probe::RepositoryProbe;
use ogresync::scm::GitScm;

fn probe_for(config: &AppConfig) -> RepositoryProbe {
    RepositoryProbe::new(GitScm::open(&config.vault_path).unwrap(), config)
}

#[test]
fn test_fresh_clone_is_level_with_remote() {
    let Some(fixture) = Fixture::with_files(&[("Welcome.md", "hello\n")]) else {
        return;
    };
    let probe = probe_for(&fixture.online_config());

    assert!(probe.has_any_commit());
    assert!(probe.has_remote());
    assert!(probe.remote_ref_exists());
    assert_eq!(probe.remote_tip_hash(), Some(fixture.remote_tip()));
    assert_eq!(probe.ahead_behind_counts(), (0, 0));
    assert_eq!(probe.unpushed_commits(), 0);
    assert!(probe.unpushed_commit_messages().is_empty());
    assert!(!probe.conflict_markers_present());
}

#[test]
fn test_local_commit_counts_as_unpushed() {
    let Some(fixture) = Fixture::with_files(&[("Welcome.md", "hello\n")]) else {
        return;
    };
    write(&fixture.vault, "Journal/2024-01-01.md", "new year\n");
    commit_all(&fixture.vault, "Journal entry");
    let probe = probe_for(&fixture.online_config());

    assert_eq!(probe.ahead_behind_counts(), (1, 0));
    assert_eq!(probe.unpushed_commits(), 1);
    assert_eq!(probe.unpushed_commit_messages(), vec!["Journal entry".to_string()]);
}

#[test]
fn test_behind_only_after_fetch() {
    let Some(fixture) = Fixture::with_files(&[("Welcome.md", "hello\n")]) else {
        return;
    };
    fixture.push_from_other(&[("Remote.md", "from elsewhere\n")], "Remote note");
    let probe = probe_for(&fixture.online_config());

    // the tracking ref is stale until fetched
    assert_eq!(probe.ahead_behind_counts(), (0, 0));

    assert!(probe.git().fetch("origin").success());
    assert_eq!(probe.ahead_behind_counts(), (0, 1));
    assert_eq!(probe.unpushed_commits(), 0);
}

#[test]
fn test_unfetched_remote_yields_zero_counts() {
    let Some(fixture) = Fixture::with_files(&[("Welcome.md", "hello\n")]) else {
        return;
    };
    let fresh = fixture.vault.with_file_name("fresh");
    std::fs::create_dir_all(&fresh).unwrap();
    git(&fresh, &["init"]);
    common::configure_identity(&fresh);
    git(&fresh, &["remote", "add", "origin", fixture.remote.to_str().unwrap()]);
    write(&fresh, "Mine.md", "mine\n");
    commit_all(&fresh, "Mine");

    let mut config = fixture.online_config();
    config.vault_path = fresh.clone();
    let probe = probe_for(&config);

    assert!(probe.has_remote());
    assert!(!probe.remote_ref_exists());
    assert_eq!(probe.ahead_behind_counts(), (0, 0));
    assert_eq!(probe.unpushed_commits(), 0);
    assert!(probe.unpushed_commit_messages().is_empty());
}

#[test]
fn test_remote_branch_listing() {
    let Some(fixture) = Fixture::with_files(&[("Welcome.md", "hello\n")]) else {
        return;
    };
    let probe = probe_for(&fixture.online_config());

    assert!(probe.remote_branch_exists("main"));
    assert!(!probe.remote_branch_exists("does-not-exist"));
}

#[test]
fn test_local_path_remote_reachability() {
    let Some(fixture) = Fixture::with_files(&[("Welcome.md", "hello\n")]) else {
        return;
    };
    assert!(probe_for(&fixture.online_config()).network_reachable());
    assert!(!probe_for(&fixture.offline_config()).network_reachable());

    let mut missing = fixture.online_config();
    missing.remote_url = Some(
        fixture
            .remote
            .with_file_name("gone.git")
            .to_string_lossy()
            .to_string(),
    );
    assert!(!probe_for(&missing).network_reachable());
}

#[test]
fn test_detects_merge_in_progress() {
    let Some(fixture) = Fixture::with_files(&[("Shared.md", "base\n")]) else {
        return;
    };
    write(&fixture.vault, "Shared.md", "local\n");
    commit_all(&fixture.vault, "Local edit");
    fixture.push_from_other(&[("Shared.md", "remote\n")], "Remote edit");
    git(&fixture.vault, &["fetch", "origin"]);

    let merge = Command::new("git")
        .args(["merge", "--no-edit", "origin/main"])
        .current_dir(&fixture.vault)
        .output()
        .unwrap();
    assert!(!merge.status.success());

    let probe = probe_for(&fixture.online_config());
    assert!(probe.merge_in_progress());
    assert!(!probe.rebase_in_progress());
    assert_eq!(probe.unmerged_files(), vec!["Shared.md".to_string()]);
    assert!(probe.conflict_markers_present());
    assert_eq!(probe.ahead_behind_counts(), (1, 1));

    git(&fixture.vault, &["merge", "--abort"]);
    assert!(!probe.merge_in_progress());
    assert!(!probe.conflict_markers_present());
    assert_eq!(probe.head_hash(), Some(head(&fixture.vault)));
}

#[test]
fn test_pushed_commit_leaves_tips_equal() {
    let Some(fixture) = Fixture::with_files(&[("Welcome.md", "hello\n")]) else {
        return;
    };
    write(&fixture.vault, "Pushed.md", "pushed\n");
    commit_all(&fixture.vault, "Pushed note");
    git(&fixture.vault, &["push", "origin", "main"]);
    let probe = probe_for(&fixture.online_config());

    assert_eq!(probe.remote_tip_hash(), probe.head_hash());
    assert_eq!(probe.ahead_behind_counts(), (0, 0));
    assert_eq!(probe.ahead_behind_against("HEAD"), (0, 0));
    assert!(probe.unpushed_commit_messages().is_empty());
}
