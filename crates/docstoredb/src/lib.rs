//! # docstoredb
//!
//! Storage primitives for an in-memory document store that spills to disk.
//!
//! ## Components
//! - **OrderedStore**: B-tree keyed document container; entries can be moved
//!   to secondary storage and are reloaded transparently on lookup
//! - **DiskPersistence**: one JSON artifact per spilled key
//! - **Trie**: prefix index from words to document keys
//! - **Document**: text or binary payload, metadata, word counts

#![warn(missing_docs)]

mod btree;
mod document;
mod error;
mod key;
mod persistence;
mod trie;

pub use btree::OrderedStore;
pub use document::{tokenize, Clock, Content, Document, DocumentFormat};
pub use error::{Error, Result};
pub use key::{split_scheme, DocumentKey, ARTIFACT_EXTENSION};
pub use persistence::{DiskPersistence, PersistenceManager, ARTIFACT_VERSION};
pub use trie::{Trie, ValueSet};
