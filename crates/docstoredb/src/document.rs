//! Documents and the word index derived from their text

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::time::Instant;

use ahash::RandomState;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::DocumentKey;

/// Fixed seeds so equal key and content hash alike across stores and runs of
/// one build; ahash output may differ between ahash versions or CPU targets
const CONTENT_HASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Format of an ingested byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// UTF-8 text, tokenized into the keyword index
    Text,
    /// Opaque bytes
    Binary,
}

/// Immutable payload of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Content {
    /// Text document
    Text(String),
    /// Binary document
    Binary(Vec<u8>),
}

/// A stored document: one payload, mutable metadata and a last-used time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    key: DocumentKey,
    content: Content,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    word_counts: HashMap<String, u32>,
    #[serde(default)]
    last_used: u64,
}

impl Document {
    /// Create a text document, counting its words once
    pub fn new_text(key: DocumentKey, text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "text of {} cannot be blank",
                key
            )));
        }

        let mut word_counts = HashMap::new();
        for word in tokenize(&text) {
            *word_counts.entry(word).or_insert(0) += 1;
        }

        Ok(Document {
            key,
            content: Content::Text(text),
            metadata: BTreeMap::new(),
            word_counts,
            last_used: 0,
        })
    }

    /// Create a binary document
    pub fn new_binary(key: DocumentKey, bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "binary payload of {} cannot be empty",
                key
            )));
        }

        Ok(Document {
            key,
            content: Content::Binary(bytes),
            metadata: BTreeMap::new(),
            word_counts: HashMap::new(),
            last_used: 0,
        })
    }

    /// Decode an ingested byte stream according to its format
    pub fn from_bytes(key: DocumentKey, bytes: &[u8], format: DocumentFormat) -> Result<Self> {
        match format {
            DocumentFormat::Text => {
                let text = String::from_utf8_lossy(bytes).into_owned();
                Document::new_text(key, text)
            }
            DocumentFormat::Binary => Document::new_binary(key, bytes),
        }
    }

    /// Identifier of this document
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// Text or binary payload
    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Text payload, if this is a text document
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(text) => Some(text),
            Content::Binary(_) => None,
        }
    }

    /// Binary payload, if this is a binary document
    pub fn binary(&self) -> Option<&[u8]> {
        match &self.content {
            Content::Text(_) => None,
            Content::Binary(bytes) => Some(bytes),
        }
    }

    /// Whether this is a text document
    pub fn is_text(&self) -> bool {
        matches!(self.content, Content::Text(_))
    }

    /// Bytes this document counts against the resident byte ceiling
    pub fn size_bytes(&self) -> usize {
        match &self.content {
            Content::Text(text) => text.len(),
            Content::Binary(bytes) => bytes.len(),
        }
    }

    /// Distinct words of a text document; empty for binary documents
    pub fn words(&self) -> HashSet<&str> {
        self.word_counts.keys().map(String::as_str).collect()
    }

    /// Occurrences of `word` (case-sensitive); 0 for binary documents
    pub fn word_count(&self, word: &str) -> u32 {
        self.word_counts.get(word).copied().unwrap_or(0)
    }

    /// Occurrences of all words starting with `prefix`
    pub fn prefix_count(&self, prefix: &str) -> u32 {
        self.word_counts
            .iter()
            .filter(|(word, _)| word.starts_with(prefix))
            .map(|(_, count)| count)
            .sum()
    }

    /// Word -> occurrence map computed at creation
    pub fn word_counts(&self) -> &HashMap<String, u32> {
        &self.word_counts
    }

    /// All metadata pairs, ordered by name
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Value stored under a metadata name
    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).map(String::as_str)
    }

    /// Set a metadata value, returning the previous one
    pub fn set_metadata_value(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Option<String>> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "metadata name cannot be blank".to_string(),
            ));
        }
        Ok(self.metadata.insert(name, value.into()))
    }

    /// Remove a metadata value, returning it
    pub fn remove_metadata_value(&mut self, name: &str) -> Option<String> {
        self.metadata.remove(name)
    }

    /// Last time this document was touched, in clock nanoseconds
    pub fn last_used(&self) -> u64 {
        self.last_used
    }

    /// Record a touch
    pub fn set_last_used(&mut self, nanos: u64) {
        self.last_used = nanos;
    }

    /// Hash of the key and content; metadata and timestamps are ignored
    ///
    /// Not a persistent fingerprint: only compare hashes from the same build.
    pub fn content_hash(&self) -> u64 {
        let [k0, k1, k2, k3] = CONTENT_HASH_SEEDS;
        RandomState::with_seeds(k0, k1, k2, k3).hash_one((&self.key, &self.content))
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.content == other.content
    }
}

impl Eq for Document {}

impl Hash for Document {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.content.hash(state);
    }
}

/// Split text into case-sensitive words
///
/// Everything that is neither ASCII alphanumeric nor whitespace is dropped
/// before splitting, so `"don't"` yields `"dont"`.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().filter_map(|raw| {
        let word: String = raw.chars().filter(char::is_ascii_alphanumeric).collect();
        if word.is_empty() {
            None
        } else {
            Some(word)
        }
    })
}

/// Monotonic nanosecond clock for last-used times
///
/// Every call to [`Clock::now`] returns a value strictly greater than the
/// previous one, so two touches never tie.
#[derive(Debug)]
pub struct Clock {
    origin: Instant,
    last: u64,
}

impl Clock {
    /// Start a clock at zero
    pub fn new() -> Self {
        Clock {
            origin: Instant::now(),
            last: 0,
        }
    }

    /// Next timestamp
    pub fn now(&mut self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.last = elapsed.max(self.last.saturating_add(1));
        self.last
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::new()
    }
}
