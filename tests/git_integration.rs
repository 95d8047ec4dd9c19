//! Integration tests for the Git interface.
//!
//! These tests clone from a real bare repository over the local transport
//! and exercise the network-facing half of `Git`: clone, fetch, push, and
//! remote ref listing.

mod common;

use common::{oid, Remote};
use gitconverge::auth::Authenticator;
use gitconverge::core::cancel::CancelSignal;
use gitconverge::core::state::Identity;
use gitconverge::core::types::{BranchName, RefName};
use gitconverge::git::{CloneOptions, Git, GitError};

fn identity() -> Identity {
    Identity {
        name: "Test User".into(),
        email: "test@example.com".into(),
    }
}

fn clone(remote: &Remote, name: &str) -> Git {
    Git::clone_into(
        &remote.url(),
        &remote.scratch(name),
        &CloneOptions {
            depth: None,
            checkout: true,
        },
        &Authenticator::Anonymous,
        &CancelSignal::new(),
    )
    .expect("clone failed")
}

/// Commit `path` = `content` on top of HEAD without moving any branch.
fn local_commit(git: &Git, path: &str, content: &str) -> gitconverge::core::types::Oid {
    let head = git.head_oid().unwrap();
    std::fs::write(git.work_dir().unwrap().join(path), content).unwrap();
    git.stage_path(path).unwrap();
    let tree = git.write_index_tree().unwrap();
    git.create_commit(&tree, Some(&head), "local change", &identity())
        .unwrap()
}

// =============================================================================
// Clone
// =============================================================================

#[test]
fn clone_sets_up_origin_and_tracking_refs() {
    let remote = Remote::new();
    let git = clone(&remote, "work");

    assert_eq!(git.origin_url().unwrap(), Some(remote.url()));
    let tracking = git.resolve_ref("refs/remotes/origin/main").unwrap();
    assert_eq!(tracking, oid(remote.tip("main").unwrap()));
    assert!(git.work_dir().unwrap().join("README.md").exists());
}

#[test]
fn clone_without_checkout_leaves_tree_empty() {
    let remote = Remote::new();
    let git = Git::clone_into(
        &remote.url(),
        &remote.scratch("bare-tree"),
        &CloneOptions::default(),
        &Authenticator::Anonymous,
        &CancelSignal::new(),
    )
    .unwrap();
    assert!(!git.work_dir().unwrap().join("README.md").exists());
    assert!(git.try_resolve_ref("refs/remotes/origin/main").unwrap().is_some());
}

#[test]
fn clone_of_missing_remote_is_transport_error() {
    let remote = Remote::new();
    let missing = remote.scratch("nope.git");
    let err = Git::clone_into(
        &missing.to_string_lossy(),
        &remote.scratch("work"),
        &CloneOptions::default(),
        &Authenticator::Anonymous,
        &CancelSignal::new(),
    )
    .unwrap_err();
    assert!(matches!(err, GitError::Transport { .. }), "got {err:?}");
}

#[test]
fn cancelled_clone_does_not_start() {
    let remote = Remote::new();
    let cancel = CancelSignal::new();
    cancel.cancel();
    let err = Git::clone_into(
        &remote.url(),
        &remote.scratch("work"),
        &CloneOptions::default(),
        &Authenticator::Anonymous,
        &cancel,
    )
    .unwrap_err();
    assert!(matches!(err, GitError::Cancelled));
    assert!(!remote.scratch("work").join(".git").exists());
}

// =============================================================================
// Fetch
// =============================================================================

#[test]
fn fetch_picks_up_new_commits_and_tags() {
    let remote = Remote::new();
    let git = clone(&remote, "work");

    let second = remote.commit("main", &[("b.txt", "b")], "second");
    remote.tag("v1", second);
    git.fetch_all(&Authenticator::Anonymous, &CancelSignal::new())
        .unwrap();

    assert_eq!(
        git.resolve_ref("refs/remotes/origin/main").unwrap(),
        oid(second)
    );
    assert_eq!(git.resolve_ref("refs/tags/v1").unwrap(), oid(second));
}

#[test]
fn fetch_prunes_deleted_branches() {
    let remote = Remote::new();
    let tip = remote.tip("main").unwrap();
    remote.set_branch("feature", tip);
    let git = clone(&remote, "work");
    assert!(git
        .try_resolve_ref("refs/remotes/origin/feature")
        .unwrap()
        .is_some());

    remote.delete_branch("feature");
    git.fetch_all(&Authenticator::Anonymous, &CancelSignal::new())
        .unwrap();
    assert!(git
        .try_resolve_ref("refs/remotes/origin/feature")
        .unwrap()
        .is_none());
}

#[test]
fn fetch_with_nothing_new_succeeds() {
    let remote = Remote::new();
    let git = clone(&remote, "work");
    let auth = Authenticator::Anonymous;
    let cancel = CancelSignal::new();
    git.fetch_all(&auth, &cancel).unwrap();
    git.fetch_all(&auth, &cancel).unwrap();
}

// =============================================================================
// Push
// =============================================================================

#[test]
fn push_fast_forward_updates_remote() {
    let remote = Remote::new();
    let git = clone(&remote, "work");

    let new = local_commit(&git, "a.txt", "hello");
    let main = BranchName::new("main").unwrap();
    let current = git.try_resolve_ref("refs/heads/main").unwrap();
    git.update_ref_cas(&RefName::for_branch(&main), &new, current.as_ref(), "test")
        .unwrap();
    git.push_branch(&main, &Authenticator::Anonymous, &CancelSignal::new())
        .unwrap();

    assert_eq!(remote.tip("main").map(oid), Some(new));
    assert_eq!(remote.read("main", "a.txt").as_deref(), Some("hello"));
}

#[test]
fn push_of_diverged_branch_is_non_fast_forward() {
    let remote = Remote::new();
    let git = clone(&remote, "work");

    // someone else moves main; our clone learns about it but builds on the
    // old tip anyway
    remote.commit("main", &[("theirs.txt", "theirs")], "theirs");
    git.fetch_all(&Authenticator::Anonymous, &CancelSignal::new())
        .unwrap();

    let ours = local_commit(&git, "ours.txt", "ours");
    let main = BranchName::new("main").unwrap();
    let current = git.try_resolve_ref("refs/heads/main").unwrap();
    git.update_ref_cas(&RefName::for_branch(&main), &ours, current.as_ref(), "test")
        .unwrap();

    let err = git
        .push_branch(&main, &Authenticator::Anonymous, &CancelSignal::new())
        .unwrap_err();
    assert!(matches!(err, GitError::NonFastForward { .. }), "got {err:?}");
    assert_ne!(remote.tip("main").map(oid), Some(ours));
}

#[test]
fn push_of_unchanged_branch_is_a_no_op() {
    let remote = Remote::new();
    let git = clone(&remote, "work");
    let before = remote.tip("main");
    git.push_branch(
        &BranchName::new("main").unwrap(),
        &Authenticator::Anonymous,
        &CancelSignal::new(),
    )
    .unwrap();
    assert_eq!(remote.tip("main"), before);
}

// =============================================================================
// Remote listing
// =============================================================================

#[test]
fn list_remote_refs_peels_annotated_tags() {
    let remote = Remote::new();
    let tip = remote.tip("main").unwrap();
    let tag_object = remote.annotated_tag("v1.0.0", tip);
    remote.tag("light", tip);
    remote.set_branch("dev", tip);

    let git = clone(&remote, "work");
    let heads = git
        .list_remote_refs(&Authenticator::Anonymous, &CancelSignal::new())
        .unwrap();
    let names: Vec<&str> = heads.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "refs/heads/dev",
            "refs/heads/main",
            "refs/tags/light",
            "refs/tags/v1.0.0"
        ]
    );

    let annotated = heads
        .iter()
        .find(|h| h.name.as_str() == "refs/tags/v1.0.0")
        .unwrap();
    assert_eq!(annotated.oid, oid(tip));
    assert_ne!(annotated.oid, oid(tag_object));
}

#[test]
fn list_remote_refs_reflects_remote_not_local_state() {
    let remote = Remote::new();
    let git = clone(&remote, "work");
    let newer = remote.commit("main", &[("c.txt", "c")], "newer");

    let heads = git
        .list_remote_refs(&Authenticator::Anonymous, &CancelSignal::new())
        .unwrap();
    let main = heads
        .iter()
        .find(|h| h.name.as_str() == "refs/heads/main")
        .unwrap();
    assert_eq!(main.oid, oid(newer));
}
