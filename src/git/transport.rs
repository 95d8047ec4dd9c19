//! git::transport
//!
//! Remote operations: clone, fetch, push, and remote ref listing.
//!
//! Every operation builds its libgit2 callbacks from an
//! [`Authenticator`] and a [`CancelSignal`]. A small probe records what
//! the callbacks saw (credential attempts, host key failures, per-ref push
//! statuses) so that a failed operation can be classified precisely instead
//! of surfacing libgit2's generic message.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use super::interface::{to_oid, Git, GitError};
use super::ORIGIN;
use crate::auth::{Authenticator, HostKeyPolicy, HostKeyVerdict, SshKeySource};
use crate::core::cancel::CancelSignal;
use crate::core::types::{BranchName, Oid, RefName};

/// Refspecs used by [`Git::fetch_all`].
const FETCH_REFSPECS: [&str; 2] = [
    "+refs/heads/*:refs/remotes/origin/*",
    "+refs/tags/*:refs/tags/*",
];

/// How to clone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
    /// History depth; `None` fetches everything.
    pub depth: Option<u32>,
    /// Whether to populate the working tree after cloning.
    pub checkout: bool,
}

/// A ref advertised by the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHead {
    /// Full ref name (`refs/heads/...` or `refs/tags/...`)
    pub name: RefName,
    /// Commit the ref points to; annotated tags are peeled
    pub oid: Oid,
}

/// What the callbacks observed during one remote operation.
#[derive(Default)]
struct Probe {
    secret_offers: Cell<u32>,
    rejected: Cell<bool>,
    host_key_failure: RefCell<Option<String>>,
    push_failures: RefCell<Vec<(String, String)>>,
}

fn remote_callbacks<'a>(
    auth: &'a Authenticator,
    cancel: &'a CancelSignal,
    probe: &'a Probe,
) -> git2::RemoteCallbacks<'a> {
    let mut callbacks = git2::RemoteCallbacks::new();

    callbacks.credentials(move |_url, username_from_url, allowed| {
        if cancel.is_cancelled() {
            return Err(git2::Error::from_str("cancelled"));
        }
        provide_credentials(auth, probe, username_from_url, allowed)
    });

    callbacks.certificate_check(move |cert, host| match auth.host_key_policy() {
        HostKeyPolicy::SystemDefault => Ok(git2::CertificateCheckStatus::CertificatePassthrough),
        HostKeyPolicy::AcceptAny => Ok(git2::CertificateCheckStatus::CertificateOk),
        HostKeyPolicy::Strict(known) => {
            // x509 certificates (https) keep libgit2's verification
            let Some(hostkey) = cert.as_hostkey() else {
                return Ok(git2::CertificateCheckStatus::CertificatePassthrough);
            };
            let verdict = hostkey
                .hostkey()
                .map(|raw| known.verify(host, raw))
                .unwrap_or(HostKeyVerdict::Unknown);
            if verdict == HostKeyVerdict::Trusted {
                Ok(git2::CertificateCheckStatus::CertificateOk)
            } else {
                *probe.host_key_failure.borrow_mut() = Some(host.to_string());
                Err(git2::Error::from_str("host key verification failed"))
            }
        }
    });

    callbacks.transfer_progress(move |_stats| !cancel.is_cancelled());
    callbacks.sideband_progress(move |_data| !cancel.is_cancelled());

    callbacks.push_negotiation(move |_updates| {
        if cancel.is_cancelled() {
            Err(git2::Error::from_str("cancelled"))
        } else {
            Ok(())
        }
    });

    callbacks.push_update_reference(move |refname, status| {
        if let Some(msg) = status {
            probe
                .push_failures
                .borrow_mut()
                .push((refname.to_string(), msg.to_string()));
        }
        Ok(())
    });

    callbacks
}

/// Answer a credential request.
///
/// A second request for a secret means the first one was refused. For
/// anonymous and header-only credentials the first request already is a
/// refusal: there is nothing else to offer.
fn provide_credentials(
    auth: &Authenticator,
    probe: &Probe,
    username_from_url: Option<&str>,
    allowed: git2::CredentialType,
) -> Result<git2::Cred, git2::Error> {
    let refuse = |why: &str| -> Result<git2::Cred, git2::Error> {
        probe.rejected.set(true);
        Err(git2::Error::from_str(why))
    };

    match auth {
        Authenticator::Anonymous => refuse("remote requires credentials"),
        Authenticator::Bearer { .. } => refuse("remote rejected the bearer token"),
        Authenticator::Basic { username, password } => {
            if !allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
                return refuse("remote does not accept username/password");
            }
            if probe.secret_offers.replace(probe.secret_offers.get() + 1) > 0 {
                return refuse("remote rejected the username/password");
            }
            git2::Cred::userpass_plaintext(username, password.expose())
        }
        Authenticator::SshKey {
            username,
            key,
            passphrase,
            ..
        } => {
            let user = username_from_url.unwrap_or(username.as_str());
            if allowed.contains(git2::CredentialType::USERNAME) {
                return git2::Cred::username(user);
            }
            if !allowed.contains(git2::CredentialType::SSH_KEY)
                && !allowed.contains(git2::CredentialType::SSH_MEMORY)
            {
                return refuse("remote does not accept SSH keys");
            }
            if probe.secret_offers.replace(probe.secret_offers.get() + 1) > 0 {
                return refuse("remote rejected the SSH key");
            }
            let passphrase = passphrase.as_ref().map(|p| p.expose());
            match key {
                SshKeySource::Memory(pem) => {
                    git2::Cred::ssh_key_from_memory(user, None, pem.expose(), passphrase)
                }
                SshKeySource::File(path) => git2::Cred::ssh_key(user, None, path, passphrase),
            }
        }
    }
}

/// Turn a failed remote operation into a typed error.
fn classify(err: git2::Error, url: &str, probe: &Probe, cancel: &CancelSignal) -> GitError {
    if cancel.is_cancelled() {
        return GitError::Cancelled;
    }
    if let Some(host) = probe.host_key_failure.borrow_mut().take() {
        return GitError::HostKeyRejected { host };
    }
    if probe.rejected.get() || err.code() == git2::ErrorCode::Auth {
        return GitError::AuthRejected {
            url: url.to_string(),
            message: err.message().to_string(),
        };
    }
    GitError::Transport {
        url: url.to_string(),
        message: err.message().to_string(),
    }
}

/// Push/fetch responses that only mean "nothing to do".
fn is_benign(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("already up to date")
        || msg.contains("already up-to-date")
        || msg.contains("empty packfile")
        || (msg.contains("unexpected eof") && msg.contains("pack"))
}

/// Responses meaning the remote moved ahead of us.
fn is_non_fast_forward(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("non-fast-forward")
        || msg.contains("non-fastforward")
        || msg.contains("fetch first")
        || msg.contains("not present locally")
}

/// Whether the transport for `url` can fetch shallow history.
///
/// libgit2's local transport cannot.
pub fn supports_shallow(url: &str) -> bool {
    !crate::core::state::is_local_url(url)
}

impl Git {
    /// Clone `url` into `dest` and set it up as `origin`.
    ///
    /// # Errors
    ///
    /// [`GitError::AuthRejected`], [`GitError::HostKeyRejected`],
    /// [`GitError::Cancelled`], or [`GitError::Transport`].
    pub fn clone_into(
        url: &str,
        dest: &Path,
        options: &CloneOptions,
        auth: &Authenticator,
        cancel: &CancelSignal,
    ) -> Result<Git, GitError> {
        if cancel.is_cancelled() {
            return Err(GitError::Cancelled);
        }

        let probe = Probe::default();
        let headers = auth.http_headers();
        let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();

        let mut fetch = git2::FetchOptions::new();
        fetch
            .remote_callbacks(remote_callbacks(auth, cancel, &probe))
            .custom_headers(&header_refs)
            .download_tags(git2::AutotagOption::All);
        if let Some(depth) = options.depth.filter(|_| supports_shallow(url)) {
            fetch.depth(i32::try_from(depth).unwrap_or(i32::MAX));
        }

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch);
        if !options.checkout {
            let mut checkout = git2::build::CheckoutBuilder::new();
            checkout.dry_run();
            builder.with_checkout(checkout);
        }

        debug!(url, dest = %dest.display(), depth = ?options.depth, "cloning");
        let repo = builder
            .clone(url, dest)
            .map_err(|e| classify(e, url, &probe, cancel))?;
        Ok(Git { repo })
    }

    /// Fetch all branches (into `refs/remotes/origin/*`) and tags from
    /// `origin`, force-updating and pruning refs the remote dropped.
    pub fn fetch_all(&self, auth: &Authenticator, cancel: &CancelSignal) -> Result<(), GitError> {
        if cancel.is_cancelled() {
            return Err(GitError::Cancelled);
        }

        let mut remote = self.find_origin()?;
        let url = remote.url().unwrap_or_default().to_string();

        let probe = Probe::default();
        let headers = auth.http_headers();
        let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();

        let mut fetch = git2::FetchOptions::new();
        fetch
            .remote_callbacks(remote_callbacks(auth, cancel, &probe))
            .custom_headers(&header_refs)
            .download_tags(git2::AutotagOption::All)
            .prune(git2::FetchPrune::On);

        debug!(url = %url, "fetching");
        match remote.fetch(&FETCH_REFSPECS, Some(&mut fetch), Some("gitconverge: fetch")) {
            Ok(()) => Ok(()),
            Err(e) if is_benign(e.message()) && !cancel.is_cancelled() => {
                debug!(url = %url, message = e.message(), "fetch had nothing to do");
                Ok(())
            }
            Err(e) => Err(classify(e, &url, &probe, cancel)),
        }
    }

    /// Push the local branch to the same name on `origin`.
    ///
    /// # Errors
    ///
    /// [`GitError::NonFastForward`] when the remote has diverged,
    /// [`GitError::PushRejected`] for other per-ref refusals, and the
    /// classified transport errors otherwise.
    pub fn push_branch(
        &self,
        branch: &BranchName,
        auth: &Authenticator,
        cancel: &CancelSignal,
    ) -> Result<(), GitError> {
        if cancel.is_cancelled() {
            return Err(GitError::Cancelled);
        }

        let mut remote = self.find_origin()?;
        let url = remote.url().unwrap_or_default().to_string();
        let refname = RefName::for_branch(branch);
        let refspec = format!("{refname}:{refname}");

        let probe = Probe::default();
        let headers = auth.http_headers();
        let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();

        let mut push = git2::PushOptions::new();
        push.remote_callbacks(remote_callbacks(auth, cancel, &probe))
            .custom_headers(&header_refs);

        debug!(url = %url, refspec = %refspec, "pushing");
        if let Err(e) = remote.push(&[refspec.as_str()], Some(&mut push)) {
            if is_benign(e.message()) && !cancel.is_cancelled() {
                return Ok(());
            }
            let diverged = e.code() == git2::ErrorCode::NotFastForward;
            if diverged || is_non_fast_forward(e.message()) {
                return Err(GitError::NonFastForward {
                    refname: refname.to_string(),
                    message: e.message().to_string(),
                });
            }
            return Err(classify(e, &url, &probe, cancel));
        }

        let failures = probe.push_failures.take();
        match failures.into_iter().find(|(_, msg)| !is_benign(msg)) {
            None => Ok(()),
            Some((refname, message)) if is_non_fast_forward(&message) => {
                Err(GitError::NonFastForward { refname, message })
            }
            Some((refname, message)) => Err(GitError::PushRejected { refname, message }),
        }
    }

    /// Branches and tags currently advertised by `origin`, sorted by name.
    ///
    /// Header-only credentials cannot be used by libgit2's connect API, so
    /// for them the listing is a pruning fetch followed by reading the
    /// refreshed remote-tracking refs and tags.
    pub fn list_remote_refs(
        &self,
        auth: &Authenticator,
        cancel: &CancelSignal,
    ) -> Result<Vec<RemoteHead>, GitError> {
        if cancel.is_cancelled() {
            return Err(GitError::Cancelled);
        }
        if auth.requires_headers() {
            return self.list_refs_after_fetch(auth, cancel);
        }

        let mut remote = self.find_origin()?;
        let url = remote.url().unwrap_or_default().to_string();
        let probe = Probe::default();

        debug!(url = %url, "listing remote refs");
        let connection = remote
            .connect_auth(
                git2::Direction::Fetch,
                Some(remote_callbacks(auth, cancel, &probe)),
                None,
            )
            .map_err(|e| classify(e, &url, &probe, cancel))?;

        let advertised = connection
            .list()
            .map_err(|e| classify(e, &url, &probe, cancel))?;

        let mut direct = BTreeMap::new();
        let mut peeled = BTreeMap::new();
        for head in advertised {
            let name = head.name();
            if !(name.starts_with(RefName::HEADS) || name.starts_with(RefName::TAGS)) {
                continue;
            }
            match name.strip_suffix("^{}") {
                Some(tag) => peeled.insert(tag.to_string(), head.oid()),
                None => direct.insert(name.to_string(), head.oid()),
            };
        }
        direct.extend(peeled);

        let mut heads = Vec::with_capacity(direct.len());
        for (name, oid) in direct {
            let Ok(name) = RefName::new(name) else {
                continue;
            };
            heads.push(RemoteHead {
                name,
                oid: to_oid(oid)?,
            });
        }
        Ok(heads)
    }

    fn list_refs_after_fetch(
        &self,
        auth: &Authenticator,
        cancel: &CancelSignal,
    ) -> Result<Vec<RemoteHead>, GitError> {
        self.fetch_all(auth, cancel)?;

        let remote_prefix = format!("{}{}/", RefName::REMOTES, ORIGIN);
        let mut heads = Vec::new();
        for entry in self.list_refs_by_prefix(&remote_prefix)? {
            let Some(short) = entry.name.strip_prefix(&remote_prefix) else {
                continue;
            };
            if short == "HEAD" {
                continue;
            }
            heads.push(RemoteHead {
                name: RefName::new(format!("{}{}", RefName::HEADS, short))?,
                oid: entry.oid,
            });
        }
        for entry in self.list_refs_by_prefix(RefName::TAGS)? {
            heads.push(RemoteHead {
                name: entry.name,
                oid: entry.oid,
            });
        }
        heads.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(heads)
    }

    fn find_origin(&self) -> Result<git2::Remote<'_>, GitError> {
        self.repo
            .find_remote(ORIGIN)
            .map_err(|e| GitError::from_git2(e, ORIGIN))
    }
}
