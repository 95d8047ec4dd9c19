//! Shared fixtures for integration tests.
//!
//! A [`Remote`] is a bare repository in a temporary directory, reached by
//! path through libgit2's local transport. Commits are built directly in
//! the object database, so no git CLI is needed.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use git2::{IndexEntry, IndexTime, Repository, Signature};
use tempfile::TempDir;

use gitconverge::core::types::Oid;

/// A bare repository acting as `origin`.
pub struct Remote {
    dir: TempDir,
    path: PathBuf,
}

impl Remote {
    /// A remote whose `main` holds one commit with `README.md`.
    pub fn new() -> Self {
        let remote = Self::empty();
        remote.commit("main", &[("README.md", "# Test Repo\n")], "Initial commit");
        remote
    }

    /// A remote with no commits; HEAD points at `main`.
    pub fn empty() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("remote.git");
        let repo = Repository::init_bare(&path).expect("failed to init bare repo");
        repo.set_head("refs/heads/main").unwrap();
        Self { dir, path }
    }

    /// URL to clone from.
    pub fn url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Scratch directory next to the remote, for checkouts.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn repo(&self) -> Repository {
        Repository::open_bare(&self.path).expect("failed to open remote")
    }

    /// Commit `files` on top of `branch` (creating it if needed) and move
    /// the branch there.
    pub fn commit(&self, branch: &str, files: &[(&str, &str)], message: &str) -> git2::Oid {
        let repo = self.repo();
        let refname = format!("refs/heads/{branch}");
        let parent = repo
            .find_reference(&refname)
            .ok()
            .and_then(|r| r.peel_to_commit().ok());

        // the bare repository's index is only used in memory, never written
        let mut index = repo.index().unwrap();
        index.clear().unwrap();
        if let Some(parent) = &parent {
            index.read_tree(&parent.tree().unwrap()).unwrap();
        }
        for (path, content) in files {
            index.add_frombuffer(&entry(path), content.as_bytes()).unwrap();
        }
        let tree_id = index.write_tree_to(&repo).unwrap();
        let tree = repo.find_tree(tree_id).unwrap();

        let sig = Signature::now("Remote User", "remote@example.com").unwrap();
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        repo.commit(Some(&refname), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    /// Remove `path` from `branch` in a new commit.
    pub fn remove(&self, branch: &str, path: &str, message: &str) -> git2::Oid {
        let repo = self.repo();
        let refname = format!("refs/heads/{branch}");
        let parent = repo
            .find_reference(&refname)
            .unwrap()
            .peel_to_commit()
            .unwrap();
        let mut index = repo.index().unwrap();
        index.read_tree(&parent.tree().unwrap()).unwrap();
        index.remove_path(Path::new(path)).unwrap();
        let tree_id = index.write_tree_to(&repo).unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("Remote User", "remote@example.com").unwrap();
        repo.commit(Some(&refname), &sig, &sig, message, &tree, &[&parent])
            .unwrap()
    }

    /// Point `refs/heads/<branch>` at `oid`.
    pub fn set_branch(&self, branch: &str, oid: git2::Oid) {
        self.repo()
            .reference(&format!("refs/heads/{branch}"), oid, true, "test")
            .unwrap();
    }

    pub fn delete_branch(&self, branch: &str) {
        self.repo()
            .find_reference(&format!("refs/heads/{branch}"))
            .unwrap()
            .delete()
            .unwrap();
    }

    /// Lightweight tag.
    pub fn tag(&self, name: &str, oid: git2::Oid) {
        self.repo()
            .reference(&format!("refs/tags/{name}"), oid, true, "test")
            .unwrap();
    }

    /// Annotated tag; returns the tag object id.
    pub fn annotated_tag(&self, name: &str, oid: git2::Oid) -> git2::Oid {
        let repo = self.repo();
        let target = repo.find_object(oid, None).unwrap();
        let sig = Signature::now("Remote User", "remote@example.com").unwrap();
        repo.tag(name, &target, &sig, "release", true).unwrap()
    }

    pub fn tip(&self, branch: &str) -> Option<git2::Oid> {
        self.repo()
            .find_reference(&format!("refs/heads/{branch}"))
            .ok()
            .and_then(|r| r.target())
    }

    /// Content of `path` at the tip of `branch`.
    pub fn read(&self, branch: &str, path: &str) -> Option<String> {
        let repo = self.repo();
        let commit = repo
            .find_reference(&format!("refs/heads/{branch}"))
            .ok()?
            .peel_to_commit()
            .ok()?;
        let entry = commit.tree().ok()?.get_path(Path::new(path)).ok()?;
        let blob = repo.find_blob(entry.id()).ok()?;
        Some(String::from_utf8_lossy(blob.content()).into_owned())
    }

    pub fn commit_count(&self, branch: &str) -> usize {
        let repo = self.repo();
        let mut walk = repo.revwalk().unwrap();
        walk.push_ref(&format!("refs/heads/{branch}")).unwrap();
        walk.count()
    }
}

fn entry(path: &str) -> IndexEntry {
    IndexEntry {
        ctime: IndexTime::new(0, 0),
        mtime: IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode: 0o100644,
        uid: 0,
        gid: 0,
        file_size: 0,
        id: git2::Oid::zero(),
        flags: 0,
        flags_extended: 0,
        path: path.as_bytes().to_vec(),
    }
}

/// Convert a git2 id into the crate's strong type.
pub fn oid(id: git2::Oid) -> Oid {
    Oid::new(id.to_string()).unwrap()
}

/// Clone `remote` into `dest` with git2 directly and return the repository.
pub fn plain_clone(remote: &Remote, dest: &Path) -> Repository {
    Repository::clone(&remote.url(), dest).expect("clone failed")
}

/// Set a committer identity in a checkout's local config.
pub fn configure_identity(repo: &Repository) {
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test User").unwrap();
    config.set_str("user.email", "test@example.com").unwrap();
}
