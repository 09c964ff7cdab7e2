//! Ordered document store with disk spill-over
//!
//! Keys live in a B-tree ordered by [`DocumentKey`]. Each key maps to a slot
//! that is either resident (the document is in memory) or spilled (the
//! document lives only in the persistence backend). At rest a document is in
//! memory or on disk, never both.

use std::collections::BTreeMap;
use std::ops::RangeBounds;
use std::path::Path;

use tracing::debug;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::key::DocumentKey;
use crate::persistence::{DiskPersistence, PersistenceManager};

enum Slot {
    Resident(Document),
    Spilled,
}

/// Key-ordered document container that can move entries to secondary storage
pub struct OrderedStore {
    /// All logical entries, resident or spilled
    entries: BTreeMap<DocumentKey, Slot>,

    /// Number of resident entries
    resident: usize,

    /// Backend receiving spilled documents
    persistence: Box<dyn PersistenceManager>,
}

impl OrderedStore {
    /// Create a store spilling into `persistence`
    pub fn new(persistence: Box<dyn PersistenceManager>) -> Self {
        OrderedStore {
            entries: BTreeMap::new(),
            resident: 0,
            persistence,
        }
    }

    /// Create a store spilling JSON artifacts under `base_dir`
    pub fn open<P: AsRef<Path>>(base_dir: P) -> Self {
        Self::new(Box::new(DiskPersistence::new(base_dir)))
    }

    /// Replace the persistence backend
    ///
    /// Documents already spilled stay in the old backend and can no longer
    /// be reloaded; swap backends before anything is evicted.
    pub fn set_persistence_manager(&mut self, persistence: Box<dyn PersistenceManager>) {
        self.persistence = persistence;
    }

    /// Get a document, reloading it into memory if it was spilled
    ///
    /// A reload removes the on-disk copy. If the backend fails, the entry
    /// stays spilled and the error is returned.
    pub fn get(&mut self, key: &DocumentKey) -> Result<Option<&mut Document>> {
        if matches!(self.entries.get(key), Some(Slot::Spilled)) {
            let document = self.load_spilled(key)?;
            self.entries.insert(key.clone(), Slot::Resident(document));
            self.resident += 1;
            debug!(key = %key, "reloaded spilled document");
        }

        match self.entries.get_mut(key) {
            Some(Slot::Resident(document)) => Ok(Some(document)),
            _ => Ok(None),
        }
    }

    /// Resident document under `key`, without reloading
    pub fn peek(&self, key: &DocumentKey) -> Option<&Document> {
        match self.entries.get(key) {
            Some(Slot::Resident(document)) => Some(document),
            _ => None,
        }
    }

    /// Mutable resident document under `key`, without reloading
    pub fn peek_mut(&mut self, key: &DocumentKey) -> Option<&mut Document> {
        match self.entries.get_mut(key) {
            Some(Slot::Resident(document)) => Some(document),
            _ => None,
        }
    }

    /// Store `value` under `key`, or delete the entry when `value` is `None`
    ///
    /// Returns the previous document. A spilled previous document is read
    /// back first so its artifact does not outlive the entry.
    pub fn put(&mut self, key: DocumentKey, value: Option<Document>) -> Result<Option<Document>> {
        if let Some(document) = &value {
            if document.key() != &key {
                return Err(Error::InvalidArgument(format!(
                    "document {} stored under key {}",
                    document.key(),
                    key
                )));
            }
        }

        let previous = match self.entries.get(&key) {
            Some(Slot::Spilled) => Some(self.load_spilled(&key)?),
            Some(Slot::Resident(_)) => match self.entries.remove(&key) {
                Some(Slot::Resident(document)) => {
                    self.resident -= 1;
                    Some(document)
                }
                _ => None,
            },
            None => None,
        };

        match value {
            Some(document) => {
                self.entries.insert(key, Slot::Resident(document));
                self.resident += 1;
            }
            None => {
                self.entries.remove(&key);
            }
        }

        Ok(previous)
    }

    /// Move a resident document to secondary storage
    ///
    /// The key stays logically present. Returns `false` if the entry was
    /// already spilled. On a backend failure the document stays resident.
    pub fn evict(&mut self, key: &DocumentKey) -> Result<bool> {
        let document = match self.entries.get(key) {
            Some(Slot::Resident(document)) => document,
            Some(Slot::Spilled) => return Ok(false),
            None => return Err(Error::NotFound(key.to_string())),
        };

        self.persistence.serialize(key, document)?;
        self.entries.insert(key.clone(), Slot::Spilled);
        self.resident -= 1;
        debug!(key = %key, "evicted document");
        Ok(true)
    }

    fn load_spilled(&mut self, key: &DocumentKey) -> Result<Document> {
        self.persistence
            .deserialize(key)?
            .ok_or_else(|| Error::NotFound(format!("spilled document {} has no artifact", key)))
    }

    /// Whether `key` is present, resident or spilled
    pub fn contains_key(&self, key: &DocumentKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether `key` is present and held in memory
    pub fn is_resident(&self, key: &DocumentKey) -> bool {
        matches!(self.entries.get(key), Some(Slot::Resident(_)))
    }

    /// All keys in order
    pub fn keys(&self) -> impl Iterator<Item = &DocumentKey> + '_ {
        self.entries.keys()
    }

    /// Keys within `range`, in order
    pub fn range<R>(&self, range: R) -> impl Iterator<Item = &DocumentKey> + '_
    where
        R: RangeBounds<DocumentKey>,
    {
        self.entries.range(range).map(|(key, _)| key)
    }

    /// Number of logical entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries held in memory
    pub fn resident_len(&self) -> usize {
        self.resident
    }
}
