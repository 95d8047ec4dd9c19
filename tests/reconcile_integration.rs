//! Integration tests for the reconciliation engine.
//!
//! Each test builds a bare remote, then drives the engine against it over
//! the local transport.

mod common;

use std::sync::Arc;
use std::thread;

use common::{oid, Remote};
use gitconverge::auth::Authenticator;
use gitconverge::core::cancel::CancelSignal;
use gitconverge::core::config::Config;
use gitconverge::core::lock::RepoLock;
use gitconverge::core::state::{DesiredState, FileEntry, Identity};
use gitconverge::core::types::{BranchName, RefName};
use gitconverge::engine::commit::{self, CommitRequest};
use gitconverge::engine::{
    drift, resolver, worktree, Engine, EngineError, ErrorKind, ReconcilePlan, RefInterpretation,
    RepositoryHandle,
};
use gitconverge::git::{CloneOptions, Git};
use gitconverge::storage::Storage;

fn fallback() -> Identity {
    Identity {
        name: "Fallback".into(),
        email: "fallback@example.com".into(),
    }
}

fn checkout_of(remote: &Remote, name: &str) -> Git {
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
    .unwrap()
}

fn declaration(remote: &Remote) -> DesiredState {
    let mut desired = DesiredState::new(remote.url(), "main");
    desired.files.push(FileEntry::file("docs/readme.md", "v1"));
    desired.message = Some("update".into());
    desired
}

fn create_ref(git: &Git, name: &str, target: &gitconverge::core::types::Oid) {
    git.update_ref_cas(&RefName::new(name).unwrap(), target, None, "test")
        .unwrap();
}

/// A commit on top of HEAD that no branch points to.
fn dangling_commit(git: &Git) -> gitconverge::core::types::Oid {
    let head = git.head_oid().unwrap();
    std::fs::write(git.work_dir().unwrap().join("tagged.txt"), "t").unwrap();
    git.stage_path("tagged.txt").unwrap();
    let tree = git.write_index_tree().unwrap();
    git.create_commit(&tree, Some(&head), "tagged", &fallback())
        .unwrap()
}

// =============================================================================
// Reference resolution
// =============================================================================

#[test]
fn local_branch_wins_over_tag_of_same_name() {
    let remote = Remote::new();
    let git = checkout_of(&remote, "work");
    let initial = git.head_oid().unwrap();
    let other = dangling_commit(&git);

    create_ref(&git, "refs/heads/x", &initial);
    create_ref(&git, "refs/tags/x", &other);

    let resolved = resolver::resolve(&git, "x").unwrap();
    assert_eq!(resolved.interpretation, RefInterpretation::LocalBranch);
    assert_eq!(resolved.oid, initial);
}

#[test]
fn remote_branch_wins_over_local_tag() {
    let remote = Remote::new();
    let initial = remote.tip("main").unwrap();
    remote.set_branch("x", initial);
    let git = checkout_of(&remote, "work");
    let other = dangling_commit(&git);
    create_ref(&git, "refs/tags/x", &other);

    let resolved = resolver::resolve(&git, "x").unwrap();
    assert_eq!(resolved.interpretation, RefInterpretation::RemoteBranch);
    assert_eq!(resolved.oid, oid(initial));
    assert_eq!(
        resolved.refname.as_ref().map(RefName::as_str),
        Some("refs/remotes/origin/x")
    );
}

#[test]
fn tags_and_revisions_resolve_last() {
    let remote = Remote::new();
    let first = remote.tip("main").unwrap();
    remote.tag("v1", first);
    let second = remote.commit("main", &[("b.txt", "b")], "second");
    let git = checkout_of(&remote, "work");

    let tag = resolver::resolve(&git, "v1").unwrap();
    assert_eq!(tag.interpretation, RefInterpretation::Tag);
    assert_eq!(tag.oid, oid(first));

    let short = &second.to_string()[..10];
    let revision = resolver::resolve(&git, short).unwrap();
    assert_eq!(revision.interpretation, RefInterpretation::Revision);
    assert_eq!(revision.oid, oid(second));
    assert!(revision.refname.is_none());

    let parent = resolver::resolve(&git, "main~1").unwrap();
    assert_eq!(parent.oid, oid(first));
}

#[test]
fn unresolvable_ref_fails_loudly() {
    let remote = Remote::new();
    let git = checkout_of(&remote, "work");
    let err = resolver::resolve(&git, "does-not-exist").unwrap_err();
    assert!(matches!(err, EngineError::RefNotFound { ref refname } if refname == "does-not-exist"));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn resolution_is_deterministic() {
    let remote = Remote::new();
    let git = checkout_of(&remote, "work");
    let a = resolver::resolve(&git, "main").unwrap();
    let b = resolver::resolve(&git, "main").unwrap();
    assert_eq!(a, b);
}

// =============================================================================
// Working tree, drift, and commit
// =============================================================================

#[test]
fn drift_round_trip() {
    let remote = Remote::new();
    let git = checkout_of(&remote, "work");
    let files = vec![FileEntry::file("a.txt", "hello")];

    worktree::write_files(&git, &files).unwrap();
    let report = drift::detect(&git).unwrap();
    assert!(!report.is_clean);
    assert_eq!(
        report.changed_paths.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["a.txt"]
    );

    let request = CommitRequest {
        files: &files,
        removed: &[],
        message: "add a",
        author: None,
    };
    let outcome = commit::build(&git, &request, &fallback()).unwrap();
    assert!(outcome.is_new);
    assert_eq!(git.head_oid().unwrap(), outcome.oid);

    assert!(drift::detect(&git).unwrap().is_clean);
}

#[test]
fn commit_of_unchanged_tree_is_a_no_op() {
    let remote = Remote::new();
    let git = checkout_of(&remote, "work");
    let head = git.head_oid().unwrap();
    let files = vec![FileEntry::file("README.md", "# Test Repo\n")];

    worktree::write_files(&git, &files).unwrap();
    let report = drift::detect(&git).unwrap();
    assert!(report.is_clean);
    let request = CommitRequest {
        files: &files,
        removed: &[],
        message: "noop",
        author: None,
    };
    let outcome = commit::build(&git, &request, &fallback()).unwrap();
    assert!(!outcome.is_new);
    assert_eq!(outcome.oid, head);
}

#[test]
fn removing_a_missing_path_succeeds() {
    let remote = Remote::new();
    let git = checkout_of(&remote, "work");
    worktree::remove_files(&git, &["missing.txt"]).unwrap();
    assert!(drift::detect(&git).unwrap().is_clean);
}

#[test]
fn removing_a_tracked_path_shows_as_drift() {
    let remote = Remote::new();
    let git = checkout_of(&remote, "work");
    worktree::remove_files(&git, &["README.md"]).unwrap();
    let report = drift::detect(&git).unwrap();
    assert!(report.touches(&["README.md"]));
}

#[test]
fn checkout_discards_local_changes() {
    let remote = Remote::new();
    let git = checkout_of(&remote, "work");
    let root = git.work_dir().unwrap().to_path_buf();
    std::fs::write(root.join("README.md"), "scribbled").unwrap();
    std::fs::write(root.join("stray.txt"), "stray").unwrap();

    let resolved = resolver::resolve(&git, "main").unwrap();
    worktree::checkout(&git, &resolved).unwrap();

    assert_eq!(
        std::fs::read_to_string(root.join("README.md")).unwrap(),
        "# Test Repo\n"
    );
    assert!(!root.join("stray.txt").exists());
    assert!(drift::detect(&git).unwrap().is_clean);
}

#[test]
fn writes_are_rejected_outside_the_tree() {
    let remote = Remote::new();
    let git = checkout_of(&remote, "work");
    let err = worktree::write_files(&git, &[FileEntry::file("../escape.txt", "x")]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

// =============================================================================
// Full passes
// =============================================================================

#[test]
fn end_to_end_commit_and_push() {
    let remote = Remote::new();
    let h0 = remote.tip("main").unwrap();
    let engine = Engine::new(Config::default());
    let desired = declaration(&remote);
    let checkout = remote.scratch("checkout");

    let first = engine
        .reconcile_once(&desired, Storage::persistent(&checkout), &CancelSignal::new())
        .unwrap();
    assert!(first.is_new_commit);
    assert_ne!(first.head, oid(h0));
    assert_eq!(remote.tip("main").map(oid), Some(first.head.clone()));
    assert_eq!(remote.read("main", "docs/readme.md").as_deref(), Some("v1"));

    let local = Git::open(&checkout).unwrap();
    assert_eq!(local.resolve_ref("refs/heads/main").unwrap(), first.head);

    let branches: Vec<&str> = first.branches.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(branches, vec!["main"]);
    assert_eq!(first.branches[0].hash, first.head);

    let repo = remote.repo();
    let pushed = repo.find_commit(remote.tip("main").unwrap()).unwrap();
    assert_eq!(pushed.message(), Some("update"));
    assert_eq!(pushed.parent_id(0).unwrap(), h0);

    // same declaration, same checkout
    let second = engine
        .reconcile_once(&desired, Storage::persistent(&checkout), &CancelSignal::new())
        .unwrap();
    assert!(!second.is_new_commit);
    assert_eq!(second.head, first.head);
    assert_eq!(remote.commit_count("main"), 2);
}

#[test]
fn rerun_in_fresh_storage_is_idempotent() {
    let remote = Remote::new();
    let engine = Engine::new(Config::default());
    let desired = declaration(&remote);

    let first = engine
        .reconcile_once(&desired, Storage::ephemeral().unwrap(), &CancelSignal::new())
        .unwrap();
    let second = engine
        .reconcile_once(&desired, Storage::ephemeral().unwrap(), &CancelSignal::new())
        .unwrap();
    assert!(first.is_new_commit);
    assert!(!second.is_new_commit);
    assert_eq!(first.head, second.head);
}

#[test]
fn changed_content_creates_a_second_commit() {
    let remote = Remote::new();
    let engine = Engine::new(Config::default());
    let mut desired = declaration(&remote);

    let first = engine
        .reconcile_once(&desired, Storage::ephemeral().unwrap(), &CancelSignal::new())
        .unwrap();
    desired.files = vec![FileEntry::file("docs/readme.md", "v2")];
    let second = engine
        .reconcile_once(&desired, Storage::ephemeral().unwrap(), &CancelSignal::new())
        .unwrap();

    assert!(second.is_new_commit);
    assert_ne!(second.head, first.head);
    assert_eq!(remote.read("main", "docs/readme.md").as_deref(), Some("v2"));
}

#[test]
fn declared_author_and_target_branch_are_used() {
    let remote = Remote::new();
    let tip = remote.tip("main").unwrap();
    remote.set_branch("release", tip);
    let engine = Engine::new(Config::default());

    let mut desired = declaration(&remote);
    desired.branch = Some(BranchName::new("release").unwrap());
    desired.author = Some(Identity {
        name: "Declared".into(),
        email: "declared@example.com".into(),
    });

    let observed = engine
        .reconcile_once(&desired, Storage::ephemeral().unwrap(), &CancelSignal::new())
        .unwrap();
    assert!(observed.is_new_commit);
    assert_eq!(remote.tip("release").map(oid), Some(observed.head.clone()));
    assert_eq!(remote.tip("main"), Some(tip));

    let repo = remote.repo();
    let commit = repo.find_commit(remote.tip("release").unwrap()).unwrap();
    assert_eq!(commit.author().name(), Some("Declared"));
    assert_eq!(commit.author().email(), Some("declared@example.com"));
}

#[test]
fn pattern_entries_stage_matching_files() {
    let remote = Remote::new();
    let engine = Engine::new(Config::default());
    let mut desired = DesiredState::new(remote.url(), "main");
    desired.files = vec![
        FileEntry::file("docs/a.md", "a"),
        FileEntry::file("docs/b.md", "b"),
        FileEntry::pattern("docs/*.md"),
    ];

    let observed = engine
        .reconcile_once(&desired, Storage::ephemeral().unwrap(), &CancelSignal::new())
        .unwrap();
    assert!(observed.is_new_commit);
    assert_eq!(remote.read("main", "docs/a.md").as_deref(), Some("a"));
    assert_eq!(remote.read("main", "docs/b.md").as_deref(), Some("b"));
}

#[test]
fn default_message_comes_from_config() {
    let remote = Remote::new();
    let engine = Engine::new(Config::default());
    let mut desired = declaration(&remote);
    desired.message = None;

    engine
        .reconcile_once(&desired, Storage::ephemeral().unwrap(), &CancelSignal::new())
        .unwrap();
    let repo = remote.repo();
    let commit = repo.find_commit(remote.tip("main").unwrap()).unwrap();
    assert_eq!(commit.message(), Some("Committed with gitconverge"));
}

#[test]
fn missing_branch_is_not_found() {
    let remote = Remote::new();
    let engine = Engine::new(Config::default());
    let mut desired = declaration(&remote);
    desired.ref_name = "gone".into();

    let err = engine
        .reconcile_once(&desired, Storage::ephemeral().unwrap(), &CancelSignal::new())
        .unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
}

#[test]
fn empty_file_list_is_a_config_error() {
    let remote = Remote::new();
    let engine = Engine::new(Config::default());
    let desired = DesiredState::new(remote.url(), "main");

    let err = engine
        .reconcile_once(&desired, Storage::ephemeral().unwrap(), &CancelSignal::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn cancelled_pass_reports_cancellation() {
    let remote = Remote::new();
    let engine = Engine::new(Config::default());
    let cancel = CancelSignal::new();
    cancel.cancel();

    let err = engine
        .reconcile_once(&declaration(&remote), Storage::ephemeral().unwrap(), &cancel)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(remote.commit_count("main"), 1);
}

#[test]
fn locked_checkout_is_retryable() {
    let remote = Remote::new();
    let engine = Engine::new(Config::default());
    let desired = declaration(&remote);
    let checkout = remote.scratch("checkout");

    engine
        .reconcile_once(&desired, Storage::persistent(&checkout), &CancelSignal::new())
        .unwrap();

    let git = Git::open(&checkout).unwrap();
    let _held = RepoLock::acquire(git.git_dir()).unwrap();
    let err = engine
        .reconcile_once(&desired, Storage::persistent(&checkout), &CancelSignal::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::Lock(_)), "got {err:?}");
    assert!(err.is_retryable());
}

#[test]
fn checkout_of_another_remote_is_refused() {
    let first = Remote::new();
    let second = Remote::new();
    let engine = Engine::new(Config::default());
    let checkout = first.scratch("checkout");

    engine
        .reconcile_once(&declaration(&first), Storage::persistent(&checkout), &CancelSignal::new())
        .unwrap();
    let err = engine
        .reconcile_once(&declaration(&second), Storage::persistent(&checkout), &CancelSignal::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::Open { .. }), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::LocalIo);
}

#[test]
fn inventory_lists_branches_and_tags_sorted() {
    let remote = Remote::new();
    let tip = remote.tip("main").unwrap();
    remote.set_branch("zeta", tip);
    remote.set_branch("alpha", tip);
    remote.tag("v2", tip);
    remote.tag("v1", tip);
    let engine = Engine::new(Config::default());

    let observed = engine
        .reconcile_once(&declaration(&remote), Storage::ephemeral().unwrap(), &CancelSignal::new())
        .unwrap();
    let branches: Vec<&str> = observed.branches.iter().map(|b| b.name.as_str()).collect();
    let tags: Vec<&str> = observed.tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(branches, vec!["alpha", "main", "zeta"]);
    assert_eq!(tags, vec!["v1", "v2"]);
}

#[test]
fn declared_file_under_ignored_directory_is_committed() {
    let remote = Remote::new();
    remote.commit("main", &[(".gitignore", "build/\n")], "ignore build output");
    let engine = Engine::new(Config::default());
    let mut desired = DesiredState::new(remote.url(), "main");
    desired.files = vec![FileEntry::file("build/out.txt", "v1")];

    let first = engine
        .reconcile_once(&desired, Storage::ephemeral().unwrap(), &CancelSignal::new())
        .unwrap();
    assert!(first.is_new_commit);
    assert_eq!(remote.tip("main").map(oid), Some(first.head.clone()));
    assert_eq!(remote.read("main", "build/out.txt").as_deref(), Some("v1"));

    let second = engine
        .reconcile_once(&desired, Storage::ephemeral().unwrap(), &CancelSignal::new())
        .unwrap();
    assert!(!second.is_new_commit);
    assert_eq!(second.head, first.head);
}

#[test]
fn rejected_push_is_a_conflict_and_keeps_the_local_branch() {
    let remote = Remote::new();
    let engine = Engine::new(Config::default());
    let checkout = remote.scratch("checkout");
    let mut desired = declaration(&remote);
    engine
        .reconcile_once(&desired, Storage::persistent(&checkout), &CancelSignal::new())
        .unwrap();

    // the remote moves on and the checkout does not fetch
    let theirs = remote.commit("main", &[("theirs.txt", "theirs")], "theirs");
    desired.files = vec![FileEntry::file("docs/readme.md", "v2")];
    let handle =
        RepositoryHandle::open_existing(&remote.url(), Storage::persistent(&checkout)).unwrap();
    let plan = ReconcilePlan::converge(BranchName::new("main").unwrap(), "stale update");

    let err = engine
        .reconcile(
            &handle,
            &desired,
            &plan,
            &Authenticator::Anonymous,
            &CancelSignal::new(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict, "got {err:?}");
    assert!(!err.is_retryable());

    assert_eq!(remote.tip("main"), Some(theirs));
    assert_eq!(remote.read("main", "docs/readme.md").as_deref(), Some("v1"));

    let git = handle.git();
    let built = git.head_oid().unwrap();
    assert_ne!(built, oid(theirs));
    assert_eq!(git.resolve_ref("refs/heads/main").unwrap(), built);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn independent_repositories_reconcile_in_parallel() {
    let remotes: Vec<Remote> = (0..4).map(|_| Remote::new()).collect();
    let engine = Arc::new(Engine::new(Config::default()));

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = remotes
            .iter()
            .map(|remote| {
                let engine = Arc::clone(&engine);
                let desired = declaration(remote);
                scope.spawn(move || {
                    engine.reconcile_once(&desired, Storage::ephemeral().unwrap(), &CancelSignal::new())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (remote, result) in remotes.iter().zip(results) {
        let observed = result.unwrap();
        assert!(observed.is_new_commit);
        assert_eq!(remote.tip("main").map(oid), Some(observed.head));
    }
}
