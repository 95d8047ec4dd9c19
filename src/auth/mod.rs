//! auth
//!
//! Declared credentials and their resolution into transport authenticators.
//!
//! # Overview
//!
//! A repository declaration carries an [`AuthSpec`]: no credentials, a
//! bearer token, basic username/password, or an SSH key. [`resolve`]
//! validates the populated variant once and produces an [`Authenticator`],
//! which the [`crate::git`] transport turns into libgit2 callbacks.
//!
//! # Host keys
//!
//! SSH host keys are checked strictly against `known_hosts` when entries are
//! declared. Without entries, libgit2's own verification applies (the user's
//! `~/.ssh/known_hosts`). Accepting any host key requires the explicit
//! `insecure_ignore_host_key = true` opt-in and logs a warning.
//!
//! # Security
//!
//! Secret values live in [`Secret`], whose `Debug` output is redacted.
//! Nothing in this module logs or formats a secret.

mod errors;
pub mod known_hosts;

pub use errors::AuthConfigError;
pub use known_hosts::{HostKeyVerdict, KnownHosts};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A secret string with redacted `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the secret value. Callers must not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

fn default_username() -> String {
    "git".to_string()
}

/// Declared SSH key credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshKeySpec {
    /// SSH user (default `git`)
    #[serde(default = "default_username")]
    pub username: String,
    /// Inline private key in PEM or OpenSSH format
    #[serde(default)]
    pub private_key_pem: Option<Secret>,
    /// Path to a private key file
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    /// Passphrase protecting the key
    #[serde(default, alias = "password")]
    pub passphrase: Option<Secret>,
    /// Trusted host keys, `known_hosts` syntax
    #[serde(default)]
    pub known_hosts: Vec<String>,
    /// Accept any host key when `known_hosts` is empty
    #[serde(default)]
    pub insecure_ignore_host_key: bool,
}

impl SshKeySpec {
    /// An SSH spec with an inline key and default settings.
    pub fn from_pem(pem: impl Into<String>) -> Self {
        Self {
            username: default_username(),
            private_key_pem: Some(Secret::new(pem)),
            private_key_path: None,
            passphrase: None,
            known_hosts: Vec::new(),
            insecure_ignore_host_key: false,
        }
    }
}

/// Declared credentials for a remote. At most one variant is populated.
///
/// In TOML this is a table with exactly one sub-table:
///
/// ```toml
/// [auth.basic]
/// username = "ci"
/// password = "hunter2"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthSpec {
    /// Anonymous access.
    #[default]
    None,
    /// HTTP bearer token.
    Bearer {
        /// The token
        token: Secret,
    },
    /// HTTP basic credentials.
    Basic {
        /// User name (default `git`)
        #[serde(default = "default_username")]
        username: String,
        /// Password or access token
        password: Secret,
    },
    /// SSH private key.
    SshKey(SshKeySpec),
}

/// Where the SSH private key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshKeySource {
    /// Inline key material
    Memory(Secret),
    /// Key file on disk
    File(PathBuf),
}

/// How SSH host keys are verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Only keys listed in the declared `known_hosts` are trusted.
    Strict(KnownHosts),
    /// Defer to libgit2's verification.
    SystemDefault,
    /// Trust any key. Only reachable through an explicit opt-in.
    AcceptAny,
}

/// A validated credential ready for the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authenticator {
    /// No credentials; a remote asking for them rejects the operation.
    Anonymous,
    /// Sent as an `Authorization: Bearer` header.
    Bearer {
        /// The token
        token: Secret,
    },
    /// Answered to HTTP user/password challenges.
    Basic {
        /// User name
        username: String,
        /// Password
        password: Secret,
    },
    /// Answered to SSH key challenges.
    SshKey {
        /// SSH user
        username: String,
        /// Private key
        key: SshKeySource,
        /// Optional passphrase
        passphrase: Option<Secret>,
        /// Host key verification mode
        host_keys: HostKeyPolicy,
    },
}

impl Authenticator {
    /// Extra HTTP headers to send with every request.
    pub fn http_headers(&self) -> Vec<String> {
        match self {
            Authenticator::Bearer { token } => {
                vec![format!("Authorization: Bearer {}", token.expose())]
            }
            _ => Vec::new(),
        }
    }

    /// Whether the credential travels only as a header. The libgit2
    /// connect API cannot attach headers, so such credentials need a fetch
    /// to observe remote refs.
    pub fn requires_headers(&self) -> bool {
        matches!(self, Authenticator::Bearer { .. })
    }

    /// The username to offer when the transport asks for one.
    pub fn username(&self) -> Option<&str> {
        match self {
            Authenticator::Basic { username, .. } | Authenticator::SshKey { username, .. } => {
                Some(username)
            }
            _ => None,
        }
    }

    /// Host key policy; non-SSH credentials use libgit2's default.
    pub fn host_key_policy(&self) -> &HostKeyPolicy {
        match self {
            Authenticator::SshKey { host_keys, .. } => host_keys,
            _ => &HostKeyPolicy::SystemDefault,
        }
    }
}

/// Resolve a declared credential into an [`Authenticator`].
///
/// An empty declaration resolves to [`Authenticator::Anonymous`].
///
/// # Errors
///
/// Returns [`AuthConfigError`] naming the first unusable field.
///
/// # Example
///
/// ```
/// use gitconverge::auth::{resolve, AuthSpec, Authenticator, Secret};
///
/// assert_eq!(resolve(&AuthSpec::None).unwrap(), Authenticator::Anonymous);
///
/// let spec = AuthSpec::Bearer { token: Secret::new("") };
/// assert!(resolve(&spec).is_err());
/// ```
pub fn resolve(spec: &AuthSpec) -> Result<Authenticator, AuthConfigError> {
    match spec {
        AuthSpec::None => Ok(Authenticator::Anonymous),
        AuthSpec::Bearer { token } => {
            check_header_safe(token, "bearer.token")?;
            Ok(Authenticator::Bearer {
                token: token.clone(),
            })
        }
        AuthSpec::Basic { username, password } => {
            if username.is_empty() {
                return Err(AuthConfigError::Missing {
                    field: "basic.username",
                });
            }
            if password.is_empty() {
                return Err(AuthConfigError::Missing {
                    field: "basic.password",
                });
            }
            Ok(Authenticator::Basic {
                username: username.clone(),
                password: password.clone(),
            })
        }
        AuthSpec::SshKey(ssh) => resolve_ssh(ssh),
    }
}

fn check_header_safe(token: &Secret, field: &'static str) -> Result<(), AuthConfigError> {
    if token.is_empty() {
        return Err(AuthConfigError::Missing { field });
    }
    if token.expose().chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(AuthConfigError::Malformed {
            field,
            reason: "contains whitespace or control characters".into(),
        });
    }
    Ok(())
}

fn resolve_ssh(ssh: &SshKeySpec) -> Result<Authenticator, AuthConfigError> {
    if ssh.username.is_empty() {
        return Err(AuthConfigError::Missing {
            field: "ssh_key.username",
        });
    }

    let key = match (&ssh.private_key_pem, &ssh.private_key_path) {
        (Some(_), Some(_)) => {
            return Err(AuthConfigError::Conflicting {
                first: "ssh_key.private_key_pem",
                second: "ssh_key.private_key_path",
            })
        }
        (None, None) => {
            return Err(AuthConfigError::Missing {
                field: "ssh_key.private_key_pem",
            })
        }
        (Some(pem), None) => {
            check_private_key(pem.expose()).map_err(|reason| AuthConfigError::Malformed {
                field: "ssh_key.private_key_pem",
                reason,
            })?;
            SshKeySource::Memory(pem.clone())
        }
        (None, Some(path)) => {
            check_key_file(path)?;
            SshKeySource::File(path.clone())
        }
    };

    let host_keys = if !ssh.known_hosts.is_empty() {
        if ssh.insecure_ignore_host_key {
            return Err(AuthConfigError::Conflicting {
                first: "ssh_key.known_hosts",
                second: "ssh_key.insecure_ignore_host_key",
            });
        }
        let parsed = KnownHosts::parse(&ssh.known_hosts).map_err(|reason| {
            AuthConfigError::Malformed {
                field: "ssh_key.known_hosts",
                reason,
            }
        })?;
        HostKeyPolicy::Strict(parsed)
    } else if ssh.insecure_ignore_host_key {
        warn!("SSH host key verification disabled by insecure_ignore_host_key");
        HostKeyPolicy::AcceptAny
    } else {
        HostKeyPolicy::SystemDefault
    };

    Ok(Authenticator::SshKey {
        username: ssh.username.clone(),
        key,
        passphrase: ssh.passphrase.clone().filter(|p| !p.is_empty()),
        host_keys,
    })
}

/// Structural check of private key material: one PEM/OpenSSH armored
/// private key block. libgit2 only parses the key when a remote asks for
/// it, so obvious garbage is caught here instead.
fn check_private_key(material: &str) -> Result<(), String> {
    let trimmed = material.trim();
    let Some(first) = trimmed.lines().next() else {
        return Err("key material is empty".into());
    };
    let first = first.trim();
    if !(first.starts_with("-----BEGIN ") && first.ends_with("PRIVATE KEY-----")) {
        return Err("missing '-----BEGIN ... PRIVATE KEY-----' header".into());
    }
    let expected_footer = first.replacen("BEGIN", "END", 1);
    match trimmed.lines().last().map(str::trim) {
        Some(last) if last == expected_footer => {}
        _ => return Err(format!("missing '{expected_footer}' footer")),
    }
    if trimmed.lines().count() < 3 {
        return Err("key block has no body".into());
    }
    Ok(())
}

fn check_key_file(path: &Path) -> Result<(), AuthConfigError> {
    let malformed = |reason: String| AuthConfigError::Malformed {
        field: "ssh_key.private_key_path",
        reason,
    };
    let material = std::fs::read_to_string(path)
        .map_err(|e| malformed(format!("cannot read {}: {}", path.display(), e)))?;
    check_private_key(&material).map_err(malformed)
}
