//! core::state
//!
//! Desired and observed state descriptors.
//!
//! A [`DesiredState`] is what a caller declares for one reconciliation: the
//! remote, the ref, credentials, and the files that must be present. It is
//! validated once, right after deserialization, and immutable afterwards.
//! An [`ObservedState`] is produced fresh by every pass.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthSpec;
use crate::core::types::{BranchName, Oid};

/// A declared state that cannot be reconciled as written.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The remote URL is empty, unparsable, or uses an unsupported scheme.
    #[error("invalid remote url '{url}': {reason}")]
    InvalidUrl {
        /// Offending URL
        url: String,
        /// What is wrong
        reason: String,
    },

    /// A file path escapes the working tree or targets git internals.
    #[error("invalid file path '{path}': {reason}")]
    InvalidPath {
        /// Offending path
        path: String,
        /// What is wrong
        reason: String,
    },

    /// A glob pattern is empty.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// What is wrong
        reason: String,
    },

    /// The ref is empty.
    #[error("ref must not be empty")]
    EmptyRef,

    /// A commit-producing declaration lists no files.
    #[error("at least one file must be declared")]
    NoFiles,

    /// A commit-producing declaration names no branch.
    #[error("a branch is required")]
    NoBranch,
}

/// One declared file.
///
/// Either a concrete path with optional content, or a glob pattern whose
/// matches are staged as found in the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileEntry {
    /// Stage everything matching a glob.
    Pattern {
        /// Glob relative to the working tree root
        pattern: String,
    },
    /// A single file.
    Path {
        /// Path relative to the working tree root
        path: String,
        /// Content to write; `None` stages the file as it is on disk
        #[serde(default)]
        content: Option<String>,
    },
}

impl FileEntry {
    /// A path entry with content.
    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Self {
        FileEntry::Path {
            path: path.into(),
            content: Some(content.into()),
        }
    }

    /// A pattern entry.
    pub fn pattern(pattern: impl Into<String>) -> Self {
        FileEntry::Pattern {
            pattern: pattern.into(),
        }
    }

    /// The path or pattern, for diagnostics.
    pub fn target(&self) -> &str {
        match self {
            FileEntry::Pattern { pattern } => pattern,
            FileEntry::Path { path, .. } => path,
        }
    }

    fn validate(&self) -> Result<(), StateError> {
        match self {
            FileEntry::Path { path, .. } => validate_tree_path(path),
            FileEntry::Pattern { pattern } => {
                if pattern.trim().is_empty() {
                    return Err(StateError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: "pattern is empty".into(),
                    });
                }
                if pattern.split('/').any(|part| part == ".." || part == ".git") {
                    return Err(StateError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: "pattern may not traverse '..' or '.git'".into(),
                    });
                }
                Ok(())
            }
        }
    }
}

/// Commit author identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Identity {
    /// Author name
    pub name: String,
    /// Author email
    pub email: String,
}

fn default_ref() -> String {
    "main".to_string()
}

/// Declared state for one reconciliation.
///
/// # Example
///
/// ```
/// use gitconverge::core::state::DesiredState;
///
/// let desired: DesiredState = toml::from_str(r#"
///     url = "https://example.com/org/repo.git"
///     branch = "main"
///     message = "update docs"
///
///     [[files]]
///     path = "docs/readme.md"
///     content = "v1"
/// "#).unwrap();
/// desired.validate_for_commit().unwrap();
/// assert_eq!(desired.ref_name, "main");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredState {
    /// Remote URL
    pub url: String,
    /// Symbolic ref to converge on (branch, tag, or revision)
    #[serde(rename = "ref", default = "default_ref")]
    pub ref_name: String,
    /// Branch that receives new commits; defaults to `ref_name`
    #[serde(default)]
    pub branch: Option<BranchName>,
    /// Credentials
    #[serde(default)]
    pub auth: AuthSpec,
    /// Files that must be present, in order
    #[serde(default)]
    pub files: Vec<FileEntry>,
    /// Commit message for new commits
    #[serde(default)]
    pub message: Option<String>,
    /// Commit message used when a declaration changes
    #[serde(default)]
    pub update_message: Option<String>,
    /// Commit message used when pruning on removal
    #[serde(default)]
    pub delete_message: Option<String>,
    /// Remove previously declared paths that are no longer declared
    #[serde(default)]
    pub prune: bool,
    /// Author override
    #[serde(default)]
    pub author: Option<Identity>,
}

impl DesiredState {
    /// A minimal declaration for `url` at `ref_name`.
    pub fn new(url: impl Into<String>, ref_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ref_name: ref_name.into(),
            branch: None,
            auth: AuthSpec::None,
            files: Vec::new(),
            message: None,
            update_message: None,
            delete_message: None,
            prune: false,
            author: None,
        }
    }

    /// Validate the parts every operation relies on.
    pub fn validate(&self) -> Result<(), StateError> {
        validate_remote_url(&self.url)?;
        if self.ref_name.trim().is_empty() {
            return Err(StateError::EmptyRef);
        }
        self.files.iter().try_for_each(FileEntry::validate)
    }

    /// Validate for operations that may produce a commit: additionally
    /// requires a non-empty file list and a usable branch name.
    pub fn validate_for_commit(&self) -> Result<(), StateError> {
        self.validate()?;
        if self.files.is_empty() {
            return Err(StateError::NoFiles);
        }
        self.target_branch().map(|_| ())
    }

    /// The branch new commits land on.
    pub fn target_branch(&self) -> Result<BranchName, StateError> {
        match &self.branch {
            Some(branch) => Ok(branch.clone()),
            None => BranchName::new(self.ref_name.as_str()).map_err(|_| StateError::NoBranch),
        }
    }

    /// Concrete paths declared (patterns excluded).
    pub fn declared_paths(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter_map(|entry| match entry {
                FileEntry::Path { path, .. } => Some(path.as_str()),
                FileEntry::Pattern { .. } => None,
            })
            .collect()
    }

    /// Message for the create step.
    pub fn message_for_create<'a>(&'a self, default: &'a str) -> &'a str {
        self.message.as_deref().unwrap_or(default)
    }

    /// Message for the update step; falls back to the create message.
    pub fn message_for_update<'a>(&'a self, default: &'a str) -> &'a str {
        self.update_message
            .as_deref()
            .unwrap_or_else(|| self.message_for_create(default))
    }

    /// Message for the delete step; falls back to the update message.
    pub fn message_for_delete<'a>(&'a self, default: &'a str) -> &'a str {
        self.delete_message
            .as_deref()
            .unwrap_or_else(|| self.message_for_update(default))
    }
}

/// A branch or tag and the commit it points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefSummary {
    /// Short name (`main`, `v1.0.0`)
    pub name: String,
    /// Commit hash
    pub hash: Oid,
}

/// State observed after a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    /// Commit the working tree is at
    pub head: Oid,
    /// Remote branches, sorted by name
    pub branches: Vec<RefSummary>,
    /// Remote tags, sorted by name
    pub tags: Vec<RefSummary>,
    /// Whether this pass created `head`
    pub is_new_commit: bool,
}

/// Check that `path` stays inside the working tree and avoids `.git`.
pub fn validate_tree_path(path: &str) -> Result<(), StateError> {
    let invalid = |reason: &str| StateError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if path.is_empty() {
        return Err(invalid("path is empty"));
    }
    if path.contains('\0') {
        return Err(invalid("path contains a NUL byte"));
    }
    if path.contains('\\') {
        return Err(invalid("use '/' as the path separator"));
    }
    if path.ends_with('/') {
        return Err(invalid("path must name a file"));
    }
    if path.split('/').any(|part| part.is_empty() || part == ".") {
        return Err(invalid("path must be normalized"));
    }
    let mut depth = 0usize;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => {
                if part.eq_ignore_ascii_case(".git") {
                    return Err(invalid("path targets the .git directory"));
                }
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => return Err(invalid("path may not contain '..'")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("path must be relative"))
            }
        }
    }
    if depth == 0 {
        return Err(invalid("path must name a file"));
    }
    Ok(())
}

/// Whether `url` is scp-like (`user@host:path`).
fn is_scp_like(url: &str) -> bool {
    match url.split_once(':') {
        // a single letter before ':' is a Windows drive, not a host
        Some((host, rest)) => {
            !host.contains('/') && host.len() > 1 && !rest.starts_with("//") && !rest.is_empty()
        }
        None => false,
    }
}

/// Whether `url` addresses a repository on the local filesystem.
pub fn is_local_url(url: &str) -> bool {
    if url.starts_with("file://") {
        return true;
    }
    !url.contains("://") && !is_scp_like(url)
}

/// Check the remote URL form: `http(s)://`, `ssh://`, `file://`,
/// scp-like, or a local path.
pub fn validate_remote_url(url: &str) -> Result<(), StateError> {
    let invalid = |reason: String| StateError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    if url.trim().is_empty() {
        return Err(invalid("url is empty".into()));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(invalid("url contains whitespace".into()));
    }
    if !url.contains("://") {
        // scp-like or plain path
        return Ok(());
    }
    let parsed = url::Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" | "ssh" => {
            if parsed.host_str().map_or(true, str::is_empty) {
                return Err(invalid("url has no host".into()));
            }
            Ok(())
        }
        "file" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod files {
        use super::*;

        #[test]
        fn entries_deserialize_by_shape() {
            #[derive(Deserialize)]
            struct Doc {
                files: Vec<FileEntry>,
            }
            let doc: Doc = toml::from_str(
                r#"
                [[files]]
                pattern = "docs/*.md"

                [[files]]
                path = "a.txt"
                content = "hello"

                [[files]]
                path = "b.txt"
                "#,
            )
            .unwrap();
            assert_eq!(doc.files[0], FileEntry::pattern("docs/*.md"));
            assert_eq!(doc.files[1], FileEntry::file("a.txt", "hello"));
            assert_eq!(
                doc.files[2],
                FileEntry::Path {
                    path: "b.txt".into(),
                    content: None
                }
            );
        }

        #[test]
        fn tree_paths() {
            assert!(validate_tree_path("docs/readme.md").is_ok());
            assert!(validate_tree_path("a.b/c-d_e.txt").is_ok());
            assert!(validate_tree_path("docs/.github/x.yml").is_ok());
            for bad in [
                "",
                "/etc/passwd",
                "../x",
                "a/../../x",
                ".git/config",
                "dir/",
                "a\\b",
                "./a.txt",
                "a//b",
            ] {
                assert!(validate_tree_path(bad).is_err(), "{bad:?} should be rejected");
            }
        }

        #[test]
        fn patterns() {
            assert!(FileEntry::pattern("**/*.md").validate().is_ok());
            assert!(FileEntry::pattern("  ").validate().is_err());
            assert!(FileEntry::pattern("../*").validate().is_err());
        }
    }

    mod urls {
        use super::*;

        #[test]
        fn accepted_forms() {
            for url in [
                "https://example.com/org/repo.git",
                "http://localhost:8080/repo.git",
                "ssh://git@example.com/org/repo.git",
                "file:///srv/git/repo.git",
                "git@example.com:org/repo.git",
                "/srv/git/repo.git",
                "relative/repo",
            ] {
                assert!(validate_remote_url(url).is_ok(), "{url} should be accepted");
            }
        }

        #[test]
        fn rejected_forms() {
            for url in ["", "ftp://example.com/repo", "https://", "has space/repo"] {
                assert!(validate_remote_url(url).is_err(), "{url:?} should be rejected");
            }
        }

        #[test]
        fn locality() {
            assert!(is_local_url("/tmp/repo"));
            assert!(is_local_url("file:///tmp/repo"));
            assert!(is_local_url("C:/repos/x"));
            assert!(!is_local_url("git@host:repo"));
            assert!(!is_local_url("https://host/repo"));
        }
    }

    mod desired {
        use super::*;

        fn sample() -> DesiredState {
            let mut d = DesiredState::new("https://example.com/r.git", "main");
            d.files.push(FileEntry::file("a.txt", "x"));
            d
        }

        #[test]
        fn commit_requires_files() {
            let mut d = sample();
            d.files.clear();
            assert_eq!(d.validate_for_commit(), Err(StateError::NoFiles));
            assert!(d.validate().is_ok());
        }

        #[test]
        fn branch_defaults_to_ref() {
            let d = sample();
            assert_eq!(d.target_branch().unwrap().as_str(), "main");
        }

        #[test]
        fn message_fallbacks() {
            let mut d = sample();
            assert_eq!(d.message_for_delete("dflt"), "dflt");
            d.message = Some("create".into());
            assert_eq!(d.message_for_update("dflt"), "create");
            assert_eq!(d.message_for_delete("dflt"), "create");
            d.update_message = Some("update".into());
            assert_eq!(d.message_for_delete("dflt"), "update");
            d.delete_message = Some("delete".into());
            assert_eq!(d.message_for_delete("dflt"), "delete");
        }

        #[test]
        fn unknown_keys_rejected() {
            let text = "url = \"/tmp/r\"\nbogus = 1\n";
            assert!(toml::from_str::<DesiredState>(text).is_err());
        }

        #[test]
        fn declared_paths_skip_patterns() {
            let mut d = sample();
            d.files.push(FileEntry::pattern("*.md"));
            assert_eq!(d.declared_paths(), vec!["a.txt"]);
        }
    }
}
