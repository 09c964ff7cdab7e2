//! Thread-safe handle: one exclusive lock around the whole store

use std::sync::Arc;

use docstoredb::Result;
use parking_lot::{Mutex, MutexGuard};

use crate::config::StoreConfig;
use crate::store::DocumentStore;

/// Cloneable handle serializing every operation on a [`DocumentStore`]
#[derive(Clone)]
pub struct SharedDocumentStore {
    inner: Arc<Mutex<DocumentStore>>,
}

impl SharedDocumentStore {
    /// Wrap an existing store
    pub fn new(store: DocumentStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Open a store and wrap it
    pub fn open(config: StoreConfig) -> Result<Self> {
        Ok(Self::new(DocumentStore::open(config)?))
    }

    /// Take the lock for several operations in a row
    pub fn lock(&self) -> MutexGuard<'_, DocumentStore> {
        self.inner.lock()
    }

    /// Run `f` with the lock held
    pub fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut DocumentStore) -> R,
    {
        f(&mut *self.inner.lock())
    }
}
