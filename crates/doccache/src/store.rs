//! DocumentStore: bounded document store over the ordered store, keyword trie,
//! LRU heap and undo log
//!
//! Every operation keeps the structures in step:
//! - the ordered store holds every logical document, resident or spilled
//! - the trie maps each word to the keys of all logical text documents
//! - the heap tracks resident documents only, ordered by last use
//! - the metadata index mirrors each document's metadata so metadata queries
//!   never need to reload spilled documents
//!
//! After every operation that can grow residency the eviction controller
//! spills least recently used documents until both ceilings hold.
//!
//! # Eviction errors
//! Eviction runs after an operation has taken effect. If spilling a document
//! fails, the operation still stands (a `put` is stored and undoable, a `get`
//! has reloaded its document) but the call returns the storage error. The
//! document that could not be spilled stays resident, the store may sit over
//! its ceilings, and the next operation tries to evict again.

use std::collections::{BTreeMap, BTreeSet};

use docstoredb::{
    Clock, DiskPersistence, Document, DocumentFormat, DocumentKey, Error, OrderedStore,
    PersistenceManager, Result, Trie,
};
use tracing::{debug, info, warn};

use crate::config::{validate_limit, StoreConfig};
use crate::heap::MinHeap;
use crate::stats::{StoreEvent, StoreStats};
use crate::undo::{Command, CommandSet, CommandStack, Undoable};

/// Metadata query: every pair must be present for a document to match
pub type MetadataQuery = BTreeMap<String, String>;

/// Reverse effect recorded for one document
#[derive(Debug, Clone, PartialEq)]
pub enum UndoAction {
    /// Undo a `put`: drop the current document, restore the one it replaced
    Put {
        /// Document that was replaced, if any
        previous: Option<Document>,
    },
    /// Undo a delete by restoring the document
    Delete {
        /// Document as it was when deleted
        document: Document,
    },
    /// Undo a metadata write
    SetMetadata {
        /// Metadata name
        name: String,
        /// Value before the write; `None` removes the entry
        previous: Option<String>,
    },
}

impl UndoAction {
    fn name(&self) -> &'static str {
        match self {
            UndoAction::Put { .. } => "put",
            UndoAction::Delete { .. } => "delete",
            UndoAction::SetMetadata { .. } => "set_metadata",
        }
    }
}

/// Heap priority: last-used time of the resident document under a key
fn last_used(store: &OrderedStore) -> impl Fn(&DocumentKey) -> u64 + '_ {
    move |key: &DocumentKey| store.peek(key).map_or(0, Document::last_used)
}

/// Every pair of `query` is present; an empty query matches anything
fn matches_query(metadata: &BTreeMap<String, String>, query: &MetadataQuery) -> bool {
    query.iter().all(|(name, value)| metadata.get(name) == Some(value))
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "metadata name cannot be blank".to_string(),
        ));
    }
    Ok(())
}

/// In-memory document store bounded by count and bytes, spilling to disk
pub struct DocumentStore {
    /// Every logical document, resident or spilled
    store: OrderedStore,

    /// Word -> keys of text documents containing it
    trie: Trie<DocumentKey>,

    /// Resident keys by last use
    heap: MinHeap<DocumentKey>,

    /// Reverse actions, most recent on top
    undo: CommandStack<DocumentKey, UndoAction>,

    /// Metadata of every logical document
    metadata: BTreeMap<DocumentKey, BTreeMap<String, String>>,

    max_document_count: Option<usize>,
    max_document_bytes: Option<usize>,

    /// Summed size of resident documents
    resident_bytes: usize,

    clock: Clock,
    stats: StoreStats,
}

impl DocumentStore {
    /// Open a store spilling JSON artifacts under `config.base_dir`
    ///
    /// # Arguments
    /// * `config` - Spill directory and capacity ceilings
    ///
    /// # Returns
    /// * `Result<DocumentStore>` - Empty store, or `InvalidArgument` for a zero limit
    pub fn open(config: StoreConfig) -> Result<Self> {
        let persistence = DiskPersistence::new(&config.base_dir);
        Self::with_persistence(config, Box::new(persistence))
    }

    /// Open a store spilling into a custom backend
    ///
    /// `config.base_dir` is ignored.
    pub fn with_persistence(
        config: StoreConfig,
        persistence: Box<dyn PersistenceManager>,
    ) -> Result<Self> {
        config.validate()?;
        debug!(
            base_dir = %config.base_dir.display(),
            max_document_count = ?config.max_document_count,
            max_document_bytes = ?config.max_document_bytes,
            "opened document store"
        );

        Ok(Self {
            store: OrderedStore::new(persistence),
            trie: Trie::new(),
            heap: MinHeap::new(),
            undo: CommandStack::new(),
            metadata: BTreeMap::new(),
            max_document_count: config.max_document_count,
            max_document_bytes: config.max_document_bytes,
            resident_bytes: 0,
            clock: Clock::new(),
            stats: StoreStats::new(),
        })
    }

    /// Ingest a document, or delete `key` when `input` is `None`
    ///
    /// # Arguments
    /// * `key` - Document identifier
    /// * `input` - Raw bytes; `None` deletes the key
    /// * `format` - Whether to decode and index `input` as text
    ///
    /// # Returns
    /// * `Result<Option<u64>>` - Content hash of the replaced document, if any
    ///
    /// An eviction error is returned after the put has taken effect; see the
    /// module docs.
    pub fn put(
        &mut self,
        key: DocumentKey,
        input: Option<&[u8]>,
        format: DocumentFormat,
    ) -> Result<Option<u64>> {
        let Some(bytes) = input else {
            let previous = self.remove(&key)?;
            return Ok(previous.as_ref().map(Document::content_hash));
        };

        let mut document = Document::from_bytes(key.clone(), bytes, format)?;
        self.check_size(&document)?;

        let previous = self.expel(&key)?;
        document.set_last_used(self.clock.now());
        self.admit(document)?;
        self.stats.record(StoreEvent::Insert);

        let hash = previous.as_ref().map(Document::content_hash);
        self.undo
            .push(Undoable::Single(Command::new(key, UndoAction::Put { previous })));
        self.enforce_limits()?;
        Ok(hash)
    }

    /// Get a document, reloading it if it was spilled
    ///
    /// # Returns
    /// * `Result<Option<Document>>` - Snapshot of the document, `None` if absent
    ///
    /// An eviction error is returned after the document was reloaded and
    /// stamped; see the module docs.
    pub fn get(&mut self, key: &DocumentKey) -> Result<Option<Document>> {
        if !self.refresh(key)? {
            return Ok(None);
        }
        let document = self.store.peek(key).cloned();
        self.enforce_limits()?;
        Ok(document)
    }

    /// Delete a document; returns whether it existed
    pub fn delete(&mut self, key: &DocumentKey) -> Result<bool> {
        Ok(self.remove(key)?.is_some())
    }

    /// Metadata value of a document
    ///
    /// Fails with `NotFound` if `key` is absent. Counts as a use of the document.
    pub fn get_metadata(&mut self, key: &DocumentKey, name: &str) -> Result<Option<String>> {
        check_name(name)?;
        if !self.refresh(key)? {
            return Err(Error::NotFound(key.to_string()));
        }
        let value = self
            .store
            .peek(key)
            .and_then(|document| document.metadata_value(name))
            .map(str::to_owned);
        self.enforce_limits()?;
        Ok(value)
    }

    /// Set a metadata value, returning the previous one
    ///
    /// Fails with `NotFound` if `key` is absent. Undoable.
    pub fn set_metadata(
        &mut self,
        key: &DocumentKey,
        name: &str,
        value: &str,
    ) -> Result<Option<String>> {
        check_name(name)?;
        if !self.refresh(key)? {
            return Err(Error::NotFound(key.to_string()));
        }
        let previous = self.write_metadata(key, name, Some(value))?;
        self.undo.push(Undoable::Single(Command::new(
            key.clone(),
            UndoAction::SetMetadata {
                name: name.to_string(),
                previous: previous.clone(),
            },
        )));
        self.enforce_limits()?;
        Ok(previous)
    }

    /// Documents containing `keyword`, most occurrences first
    pub fn search(&mut self, keyword: &str) -> Result<Vec<Document>> {
        let keys = self.trie.get_sorted(keyword, |a, b| a.cmp(b));
        let mut found = self.touch_all(keys)?;
        found.sort_by(|a, b| b.word_count(keyword).cmp(&a.word_count(keyword)));
        Ok(found)
    }

    /// Documents with a word starting with `prefix`, most matching occurrences first
    pub fn search_by_prefix(&mut self, prefix: &str) -> Result<Vec<Document>> {
        let keys = self.trie.get_all_with_prefix_sorted(prefix, |a, b| a.cmp(b));
        let mut found = self.touch_all(keys)?;
        found.sort_by(|a, b| b.prefix_count(prefix).cmp(&a.prefix_count(prefix)));
        Ok(found)
    }

    /// Documents whose metadata contains every pair of `query`, in key order
    ///
    /// An empty query matches nothing.
    pub fn search_by_metadata(&mut self, query: &MetadataQuery) -> Result<Vec<Document>> {
        let keys = self.keys_matching(query);
        self.touch_all(keys)
    }

    /// Documents containing `keyword` whose metadata matches `query`
    ///
    /// An empty query leaves the keyword results unfiltered.
    pub fn search_by_keyword_and_metadata(
        &mut self,
        keyword: &str,
        query: &MetadataQuery,
    ) -> Result<Vec<Document>> {
        let keys = self.filter_by_metadata(self.trie.get_sorted(keyword, |a, b| a.cmp(b)), query);
        let mut found = self.touch_all(keys)?;
        found.sort_by(|a, b| b.word_count(keyword).cmp(&a.word_count(keyword)));
        Ok(found)
    }

    /// Documents with a word starting with `prefix` whose metadata matches `query`
    pub fn search_by_prefix_and_metadata(
        &mut self,
        prefix: &str,
        query: &MetadataQuery,
    ) -> Result<Vec<Document>> {
        let candidates = self.trie.get_all_with_prefix_sorted(prefix, |a, b| a.cmp(b));
        let keys = self.filter_by_metadata(candidates, query);
        let mut found = self.touch_all(keys)?;
        found.sort_by(|a, b| b.prefix_count(prefix).cmp(&a.prefix_count(prefix)));
        Ok(found)
    }

    /// Delete every document containing `keyword`
    ///
    /// All deletions undo as one entry. Returns the deleted keys.
    pub fn delete_all(&mut self, keyword: &str) -> Result<BTreeSet<DocumentKey>> {
        let keys = self.trie.get(keyword);
        self.delete_keys(keys)
    }

    /// Delete every document with a word starting with `prefix`
    pub fn delete_all_with_prefix(&mut self, prefix: &str) -> Result<BTreeSet<DocumentKey>> {
        let keys = self.trie.get_all_with_prefix_sorted(prefix, |a, b| a.cmp(b));
        self.delete_keys(keys)
    }

    /// Delete every document whose metadata matches `query`
    ///
    /// An empty query deletes nothing.
    pub fn delete_all_with_metadata(
        &mut self,
        query: &MetadataQuery,
    ) -> Result<BTreeSet<DocumentKey>> {
        let keys = self.keys_matching(query);
        self.delete_keys(keys)
    }

    /// Delete every document containing `keyword` whose metadata matches `query`
    pub fn delete_all_with_keyword_and_metadata(
        &mut self,
        keyword: &str,
        query: &MetadataQuery,
    ) -> Result<BTreeSet<DocumentKey>> {
        let keys = self.filter_by_metadata(self.trie.get(keyword), query);
        self.delete_keys(keys)
    }

    /// Delete every document with a word starting with `prefix` whose
    /// metadata matches `query`
    pub fn delete_all_with_prefix_and_metadata(
        &mut self,
        prefix: &str,
        query: &MetadataQuery,
    ) -> Result<BTreeSet<DocumentKey>> {
        let candidates = self.trie.get_all_with_prefix_sorted(prefix, |a, b| a.cmp(b));
        let keys = self.filter_by_metadata(candidates, query);
        self.delete_keys(keys)
    }

    /// Undo the most recent undoable operation
    ///
    /// Fails with `NothingToUndo` on an empty log. If the undo fails, its
    /// entry stays on the log.
    pub fn undo(&mut self) -> Result<()> {
        let mut log = std::mem::take(&mut self.undo);
        let result = log.undo(|key, action| self.apply_undo(key, action));
        self.undo = log;

        match result? {
            Some(()) => self.finish_undo(),
            None => Err(Error::NothingToUndo),
        }
    }

    /// Undo the most recent operation affecting `key`, leaving every other
    /// entry of the log in place
    ///
    /// Fails with `NoMatchingUndo` if nothing on the log touches `key`.
    pub fn undo_key(&mut self, key: &DocumentKey) -> Result<()> {
        let mut log = std::mem::take(&mut self.undo);
        let result = log.undo_target(key, |target, action| self.apply_undo(target, action));
        self.undo = log;

        match result? {
            Some(()) => self.finish_undo(),
            None => Err(Error::NoMatchingUndo(key.to_string())),
        }
    }

    /// Bound the number of resident documents, evicting right away if needed
    pub fn set_max_document_count(&mut self, limit: usize) -> Result<()> {
        validate_limit("max_document_count", Some(limit))?;
        self.max_document_count = Some(limit);
        info!(limit, "max document count set");
        self.enforce_limits()
    }

    /// Bound the summed size of resident documents, evicting right away if needed
    pub fn set_max_document_bytes(&mut self, limit: usize) -> Result<()> {
        validate_limit("max_document_bytes", Some(limit))?;
        self.max_document_bytes = Some(limit);
        info!(limit, "max document bytes set");
        self.enforce_limits()
    }

    /// Resident document ceiling
    pub fn max_document_count(&self) -> Option<usize> {
        self.max_document_count
    }

    /// Resident byte ceiling
    pub fn max_document_bytes(&self) -> Option<usize> {
        self.max_document_bytes
    }

    /// Number of logical documents, resident or spilled
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the store holds no documents
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Whether a document exists under `key`, resident or spilled
    pub fn contains_key(&self, key: &DocumentKey) -> bool {
        self.store.contains_key(key)
    }

    /// All keys in order
    pub fn keys(&self) -> impl Iterator<Item = &DocumentKey> + '_ {
        self.store.keys()
    }

    /// Number of documents held in memory
    pub fn resident_count(&self) -> usize {
        self.store.resident_len()
    }

    /// Summed size of documents held in memory
    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes
    }

    /// Whether the document under `key` is held in memory
    pub fn is_resident(&self, key: &DocumentKey) -> bool {
        self.store.is_resident(key)
    }

    /// Number of entries on the undo log
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Usage statistics
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    fn check_size(&self, document: &Document) -> Result<()> {
        match self.max_document_bytes {
            Some(limit) if document.size_bytes() > limit => Err(Error::DocumentTooLarge {
                size: document.size_bytes(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    /// Delete with an undo entry
    fn remove(&mut self, key: &DocumentKey) -> Result<Option<Document>> {
        let Some(document) = self.expel(key)? else {
            return Ok(None);
        };
        self.undo.push(Undoable::Single(Command::new(
            key.clone(),
            UndoAction::Delete {
                document: document.clone(),
            },
        )));
        Ok(Some(document))
    }

    /// Insert a document into every structure. `key` must be absent.
    fn admit(&mut self, document: Document) -> Result<()> {
        let key = document.key().clone();
        let size = document.size_bytes();
        let words: Vec<String> = document.words().into_iter().map(str::to_owned).collect();
        let metadata = document.metadata().clone();

        self.store.put(key.clone(), Some(document))?;
        for word in &words {
            self.trie.put(word, key.clone());
        }
        self.metadata.insert(key.clone(), metadata);
        self.heap.insert(key, &last_used(&self.store));
        self.resident_bytes += size;
        Ok(())
    }

    /// Remove a document from every structure, returning it
    ///
    /// A spilled document is read back first, which removes its artifact.
    fn expel(&mut self, key: &DocumentKey) -> Result<Option<Document>> {
        let was_resident = self.store.is_resident(key);
        let Some(document) = self.store.put(key.clone(), None)? else {
            return Ok(None);
        };

        for word in document.words() {
            self.trie.delete(word, key);
        }
        self.metadata.remove(key);
        if was_resident {
            self.heap.remove_item(key, &last_used(&self.store));
            self.resident_bytes -= document.size_bytes();
        }
        Ok(Some(document))
    }

    /// Bring `key` into memory and stamp it as just used
    ///
    /// Returns `false` if no document exists under `key`. Does not enforce
    /// limits; callers do that once they are done with the document.
    fn refresh(&mut self, key: &DocumentKey) -> Result<bool> {
        let was_resident = self.store.is_resident(key);
        let now = self.clock.now();
        let Some(document) = self.store.get(key)? else {
            return Ok(false);
        };
        document.set_last_used(now);

        if was_resident {
            self.stats.record(StoreEvent::Hit);
        } else {
            self.resident_bytes += document.size_bytes();
            self.stats.record(StoreEvent::Reload);
            debug!(key = %key, "reloaded spilled document");
        }
        self.heap.insert(key.clone(), &last_used(&self.store));
        Ok(true)
    }

    /// Refresh each key and snapshot its document, enforcing limits as it goes
    fn touch_all<I>(&mut self, keys: I) -> Result<Vec<Document>>
    where
        I: IntoIterator<Item = DocumentKey>,
    {
        let mut found = Vec::new();
        for key in keys {
            if !self.refresh(&key)? {
                continue;
            }
            if let Some(document) = self.store.peek(&key) {
                found.push(document.clone());
            }
            self.enforce_limits()?;
        }
        Ok(found)
    }

    fn keys_matching(&self, query: &MetadataQuery) -> Vec<DocumentKey> {
        if query.is_empty() {
            return Vec::new();
        }
        self.metadata
            .iter()
            .filter(|(_, metadata)| matches_query(metadata, query))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn filter_by_metadata<I>(&self, keys: I, query: &MetadataQuery) -> Vec<DocumentKey>
    where
        I: IntoIterator<Item = DocumentKey>,
    {
        keys.into_iter()
            .filter(|key| {
                self.metadata
                    .get(key)
                    .is_some_and(|metadata| matches_query(metadata, query))
            })
            .collect()
    }

    /// Delete `keys` as one undoable bulk operation
    ///
    /// On a storage failure partway, the documents already deleted still get
    /// their undo entry before the error is returned.
    fn delete_keys<I>(&mut self, keys: I) -> Result<BTreeSet<DocumentKey>>
    where
        I: IntoIterator<Item = DocumentKey>,
    {
        let keys: BTreeSet<DocumentKey> = keys.into_iter().collect();
        let mut commands = CommandSet::new();
        let mut deleted = BTreeSet::new();
        let mut outcome = Ok(());

        for key in keys {
            match self.expel(&key) {
                Ok(Some(document)) => {
                    commands.add(Command::new(key.clone(), UndoAction::Delete { document }));
                    deleted.insert(key);
                }
                Ok(None) => {}
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        if !commands.is_empty() {
            debug!(count = commands.len(), "bulk delete");
            self.undo.push(Undoable::Set(commands));
        }
        outcome.map(|()| deleted)
    }

    fn apply_undo(&mut self, key: &DocumentKey, action: &UndoAction) -> Result<()> {
        debug!(key = %key, action = action.name(), "applying undo");
        match action {
            UndoAction::Put { previous } => self.restore(key, previous.as_ref()),
            UndoAction::Delete { document } => self.restore(key, Some(document)),
            UndoAction::SetMetadata { name, previous } => {
                // Document deleted since: nothing left to revert
                if !self.refresh(key)? {
                    return Ok(());
                }
                self.write_metadata(key, name, previous.as_deref())?;
                Ok(())
            }
        }
    }

    fn finish_undo(&mut self) -> Result<()> {
        self.stats.record(StoreEvent::Undo);
        self.enforce_limits()
    }

    /// Replace whatever is under `key` with `document`, or with nothing
    fn restore(&mut self, key: &DocumentKey, document: Option<&Document>) -> Result<()> {
        if let Some(document) = document {
            self.check_size(document)?;
        }

        self.expel(key)?;
        if let Some(document) = document {
            let mut document = document.clone();
            document.set_last_used(self.clock.now());
            self.admit(document)?;
        }
        Ok(())
    }

    /// Set or clear one metadata value of a resident document
    fn write_metadata(
        &mut self,
        key: &DocumentKey,
        name: &str,
        value: Option<&str>,
    ) -> Result<Option<String>> {
        let document = self
            .store
            .peek_mut(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;

        let previous = match value {
            Some(value) => document.set_metadata_value(name, value)?,
            None => document.remove_metadata_value(name),
        };
        self.metadata.insert(key.clone(), document.metadata().clone());
        Ok(previous)
    }

    fn over_limits(&self) -> bool {
        self.max_document_count
            .is_some_and(|limit| self.store.resident_len() > limit)
            || self
                .max_document_bytes
                .is_some_and(|limit| self.resident_bytes > limit)
    }

    /// Spill least recently used documents until both ceilings hold
    ///
    /// The heap minimum is popped only after its artifact is written, so a
    /// failed write leaves the document resident and tracked.
    fn enforce_limits(&mut self) -> Result<()> {
        while self.over_limits() {
            let Some(victim) = self.heap.peek().cloned() else {
                break;
            };
            let size = self.store.peek(&victim).map_or(0, Document::size_bytes);

            if let Err(e) = self.store.evict(&victim) {
                warn!(key = %victim, error = %e, "eviction failed, document stays resident");
                return Err(e);
            }
            self.heap.remove(&last_used(&self.store))?;
            self.resident_bytes -= size;
            self.stats.record(StoreEvent::Eviction);
            debug!(key = %victim, bytes = size, "evicted least recently used document");
        }
        Ok(())
    }
}
