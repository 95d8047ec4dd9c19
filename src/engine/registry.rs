//! engine::registry
//!
//! Repositories shared by identity across declared resources.
//!
//! The registry is an explicit object owned by the caller. Each entry is an
//! [`Arc<SharedRepo>`] guarded by an `RwLock`: mutating passes take the write
//! lock, inventory reads and file reads take the read lock. Entries hold
//! the storage, not an open repository, because libgit2 handles are not
//! `Sync`; every access reopens the checkout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::storage::Storage;

/// Contents of one registry entry.
#[derive(Debug)]
pub struct RepoSlot {
    /// Remote URL the checkout tracks
    pub url: String,
    /// Backing storage; `None` after teardown
    pub storage: Option<Storage>,
}

impl RepoSlot {
    /// Working-tree root, if the storage is still there.
    pub fn path(&self) -> Option<&Path> {
        self.storage.as_ref().map(Storage::path)
    }
}

/// A repository entry shared between passes.
#[derive(Debug)]
pub struct SharedRepo {
    slot: RwLock<RepoSlot>,
}

impl SharedRepo {
    fn new(url: String, storage: Storage) -> Self {
        Self {
            slot: RwLock::new(RepoSlot {
                url,
                storage: Some(storage),
            }),
        }
    }

    /// Run `f` with shared access.
    pub fn read<T>(&self, f: impl FnOnce(&RepoSlot) -> T) -> T {
        let guard = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Run `f` with exclusive access.
    pub fn write<T>(&self, f: impl FnOnce(&mut RepoSlot) -> T) -> T {
        let mut guard = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// Identifier-keyed set of shared repositories.
#[derive(Debug, Default)]
pub struct RepoRegistry {
    entries: Mutex<HashMap<String, Arc<SharedRepo>>>,
}

impl RepoRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `storage` under `id`, replacing any previous entry.
    pub fn register(&self, id: &str, url: &str, storage: Storage) -> Arc<SharedRepo> {
        let shared = Arc::new(SharedRepo::new(url.to_string(), storage));
        let previous = self
            .lock()
            .insert(id.to_string(), Arc::clone(&shared));
        debug!(id, replaced = previous.is_some(), "registered repository");
        shared
    }

    /// Look up `id`.
    pub fn get(&self, id: &str) -> Option<Arc<SharedRepo>> {
        self.lock().get(id).cloned()
    }

    /// Drop `id` from the registry, returning its entry.
    pub fn remove(&self, id: &str) -> Option<Arc<SharedRepo>> {
        self.lock().remove(id)
    }

    /// Working-tree root registered under `id`.
    pub fn path_of(&self, id: &str) -> Option<PathBuf> {
        self.get(id)?.read(|slot| slot.path().map(Path::to_path_buf))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no repository is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<SharedRepo>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
