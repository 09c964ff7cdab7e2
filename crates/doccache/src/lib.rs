//! # doccache
//!
//! Bounded document store on top of docstoredb.
//!
//! ## Architecture
//! - **OrderedStore**: every document, resident or spilled to disk
//! - **Trie**: word -> document keys, for keyword and prefix search
//! - **MinHeap**: resident keys by last use, picks eviction victims
//! - **CommandStack**: undo log of plain-data reverse actions
//! - **Eviction**: after each operation, least recently used documents are
//!   spilled until the count and byte ceilings hold
//!
//! The store is single-threaded; wrap it in [`SharedDocumentStore`] to share
//! it between threads.

#![warn(missing_docs)]

mod config;
mod heap;
mod shared;
mod stats;
mod store;
mod undo;

pub use config::StoreConfig;
pub use heap::{MinHeap, Prioritizer};
pub use shared::SharedDocumentStore;
pub use stats::{StatsSnapshot, StoreEvent, StoreStats};
pub use store::{DocumentStore, MetadataQuery, UndoAction};
pub use undo::{Command, CommandSet, CommandStack, Undoable};

pub use docstoredb::{
    Document, DocumentFormat, DocumentKey, Error, PersistenceManager, Result,
};
