//! Store configuration

use std::path::{Path, PathBuf};

use docstoredb::{Error, Result};

/// Settings for opening a [`DocumentStore`](crate::DocumentStore)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory receiving spilled documents
    pub base_dir: PathBuf,

    /// Ceiling on resident documents; `None` is unbounded
    pub max_document_count: Option<usize>,

    /// Ceiling on summed resident document bytes; `None` is unbounded
    pub max_document_bytes: Option<usize>,
}

impl StoreConfig {
    /// Unbounded store spilling under `base_dir`
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        StoreConfig {
            base_dir: base_dir.as_ref().to_path_buf(),
            max_document_count: None,
            max_document_bytes: None,
        }
    }

    /// Set the spill directory
    pub fn with_base_dir<P: AsRef<Path>>(mut self, base_dir: P) -> Self {
        self.base_dir = base_dir.as_ref().to_path_buf();
        self
    }

    /// Bound the number of resident documents
    pub fn with_max_document_count(mut self, limit: usize) -> Self {
        self.max_document_count = Some(limit);
        self
    }

    /// Bound the summed size of resident documents
    pub fn with_max_document_bytes(mut self, limit: usize) -> Self {
        self.max_document_bytes = Some(limit);
        self
    }

    /// Reject zero limits
    pub fn validate(&self) -> Result<()> {
        validate_limit("max_document_count", self.max_document_count)?;
        validate_limit("max_document_bytes", self.max_document_bytes)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(base_dir)
    }
}

pub(crate) fn validate_limit(name: &str, limit: Option<usize>) -> Result<()> {
    match limit {
        Some(0) => Err(Error::InvalidArgument(format!("{} must be at least 1", name))),
        _ => Ok(()),
    }
}
