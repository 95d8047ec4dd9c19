//! auth::known_hosts
//!
//! Parsing and matching of OpenSSH `known_hosts` lines for strict host-key
//! verification.
//!
//! # Supported syntax
//!
//! `host[,host...] key-type base64-key [comment]`, where a host pattern may
//! use `*`/`?` wildcards, a `!` negation prefix, or the bracketed `[host]:port`
//! form. Hashed (`|1|...`) entries and `@cert-authority`/`@revoked` markers
//! are rejected as malformed: they cannot be honored and silently skipping
//! them would weaken verification.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Key algorithms accepted in an entry.
const KEY_TYPES: [&str; 6] = [
    "ssh-ed25519",
    "ssh-rsa",
    "ssh-dss",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
];

/// Result of checking a presented host key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyVerdict {
    /// An entry for the host carries exactly this key.
    Trusted,
    /// Entries exist for the host but none carries this key.
    Mismatch,
    /// No entry names the host.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HostPattern {
    negated: bool,
    pattern: String,
}

impl HostPattern {
    fn parse(raw: &str) -> Result<Self, String> {
        let (negated, rest) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        // `[host]:port` - the port is not known in the certificate callback,
        // so only the host part participates in matching.
        let host = match rest.strip_prefix('[') {
            Some(bracketed) => match bracketed.split_once(']') {
                Some((host, _port)) => host,
                None => return Err(format!("unterminated '[' in host pattern '{raw}'")),
            },
            None => rest,
        };
        if host.is_empty() {
            return Err("empty host pattern".into());
        }
        Ok(Self {
            negated,
            pattern: host.to_ascii_lowercase(),
        })
    }

    fn matches(&self, host: &str) -> bool {
        wildcard_match(self.pattern.as_bytes(), host.as_bytes())
    }
}

/// Glob match supporting `*` and `?`.
fn wildcard_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            wildcard_match(&pattern[1..], text)
                || (!text.is_empty() && wildcard_match(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => wildcard_match(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p == t => wildcard_match(&pattern[1..], &text[1..]),
        _ => false,
    }
}

/// One parsed `known_hosts` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyEntry {
    patterns: Vec<HostPattern>,
    key_type: String,
    key: Vec<u8>,
}

impl HostKeyEntry {
    /// The key algorithm, e.g. `ssh-ed25519`.
    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    /// Whether this entry applies to `host`.
    ///
    /// A matching negated pattern excludes the host even if another
    /// pattern on the same line matches.
    pub fn applies_to(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let mut matched = false;
        for pattern in &self.patterns {
            if pattern.matches(&host) {
                if pattern.negated {
                    return false;
                }
                matched = true;
            }
        }
        matched
    }
}

/// A parsed set of trusted host keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownHosts {
    entries: Vec<HostKeyEntry>,
}

impl KnownHosts {
    /// Parse a list of `known_hosts` entries. Each item may contain several
    /// lines; blank lines and `#` comments are ignored.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed line (never the key).
    ///
    /// # Example
    ///
    /// ```
    /// use gitconverge::auth::known_hosts::KnownHosts;
    ///
    /// let hosts = KnownHosts::parse(&[
    ///     "github.com ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl".to_string(),
    /// ]).unwrap();
    /// assert_eq!(hosts.len(), 1);
    /// ```
    pub fn parse(items: &[String]) -> Result<Self, String> {
        let mut entries = Vec::new();
        for (index, line) in items.iter().flat_map(|item| item.lines()).enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry =
                parse_line(line).map_err(|reason| format!("entry {}: {}", index + 1, reason))?;
            entries.push(entry);
        }
        if entries.is_empty() {
            return Err("no host key entries found".into());
        }
        Ok(Self { entries })
    }

    /// Number of parsed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check the raw key blob presented by `host`.
    pub fn verify(&self, host: &str, presented: &[u8]) -> HostKeyVerdict {
        let mut seen_host = false;
        for entry in self.entries.iter().filter(|e| e.applies_to(host)) {
            seen_host = true;
            if entry.key == presented {
                return HostKeyVerdict::Trusted;
            }
        }
        if seen_host {
            HostKeyVerdict::Mismatch
        } else {
            HostKeyVerdict::Unknown
        }
    }
}

fn parse_line(line: &str) -> Result<HostKeyEntry, String> {
    if line.starts_with('@') {
        return Err("marker lines (@cert-authority, @revoked) are not supported".into());
    }
    let mut fields = line.split_whitespace();
    let hosts = fields.next().ok_or("missing host field")?;
    let key_type = fields.next().ok_or("missing key type")?;
    let encoded = fields.next().ok_or("missing key")?;

    if hosts.starts_with('|') {
        return Err("hashed host entries are not supported".into());
    }
    if !KEY_TYPES.contains(&key_type) {
        return Err(format!("unsupported key type '{key_type}'"));
    }

    let patterns = hosts
        .split(',')
        .map(HostPattern::parse)
        .collect::<Result<Vec<_>, _>>()?;

    let key = STANDARD
        .decode(encoded)
        .map_err(|_| "key is not valid base64".to_string())?;
    if blob_key_type(&key) != Some(key_type) {
        return Err(format!("key blob does not encode a {key_type} key"));
    }

    Ok(HostKeyEntry {
        patterns,
        key_type: key_type.to_string(),
        key,
    })
}

/// The algorithm name stored as the first length-prefixed string of an
/// SSH public key blob.
fn blob_key_type(blob: &[u8]) -> Option<&str> {
    let len_bytes: [u8; 4] = blob.get(..4)?.try_into().ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let name = blob.get(4..4 + len)?;
    std::str::from_utf8(name).ok()
}
