//! Secondary storage for spilled documents
//!
//! File layout under the base directory, one artifact per spilled key:
//! - `<key path>.json`: `{"version": 1, "document": {...}}`
//! - `.<name>.json.tmp`: write in progress, renamed over the artifact
//!
//! See [`DocumentKey::artifact_path`] for how a key becomes a path.
//!
//! An artifact exists only while its document is spilled. Reading it back
//! removes it.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::key::DocumentKey;

/// Artifact envelope version
pub const ARTIFACT_VERSION: u32 = 1;

/// Backend that holds documents moved out of memory
pub trait PersistenceManager: Send {
    /// Write the full state of `document` under `key`
    fn serialize(&mut self, key: &DocumentKey, document: &Document) -> Result<()>;

    /// Read the document stored under `key` and remove it from the backend
    ///
    /// Returns `None` if nothing is stored under `key`.
    fn deserialize(&mut self, key: &DocumentKey) -> Result<Option<Document>>;
}

#[derive(Serialize)]
struct ArtifactRef<'a> {
    version: u32,
    document: &'a Document,
}

#[derive(Deserialize)]
struct Artifact {
    version: u32,
    document: Document,
}

/// File-per-key JSON persistence
#[derive(Debug, Clone)]
pub struct DiskPersistence {
    base_dir: PathBuf,
}

impl DiskPersistence {
    /// Store artifacts under `base_dir`, created lazily on first write
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        DiskPersistence {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Directory holding the artifacts
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute location of the artifact for `key`
    pub fn artifact_path(&self, key: &DocumentKey) -> Result<PathBuf> {
        Ok(self.base_dir.join(key.artifact_path()?))
    }

    fn read_artifact(path: &Path) -> Result<Option<Document>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let artifact: Artifact = serde_json::from_reader(BufReader::new(file))?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(Error::Parse(format!(
                "unsupported artifact version {} in {}",
                artifact.version,
                path.display()
            )));
        }
        Ok(Some(artifact.document))
    }

    fn write_artifact(tmp_path: &Path, document: &Document) -> Result<()> {
        let file = File::create(tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(
            &mut writer,
            &ArtifactRef {
                version: ARTIFACT_VERSION,
                document,
            },
        )?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}

impl PersistenceManager for DiskPersistence {
    fn serialize(&mut self, key: &DocumentKey, document: &Document) -> Result<()> {
        if document.key() != key {
            return Err(Error::InvalidArgument(format!(
                "document {} stored under key {}",
                document.key(),
                key
            )));
        }

        let path = self.artifact_path(key)?;
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(Error::Parse(format!("no artifact file name for {}", key)));
        };
        fs::create_dir_all(parent)?;

        // Leading dot: never a directory name produced by a key
        let mut tmp_name = OsString::from(".");
        tmp_name.push(name);
        tmp_name.push(".tmp");
        let tmp_path = parent.join(tmp_name);

        if let Err(e) = Self::write_artifact(&tmp_path, document) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!(key = %key, path = %path.display(), bytes = document.size_bytes(), "wrote artifact");
        Ok(())
    }

    fn deserialize(&mut self, key: &DocumentKey) -> Result<Option<Document>> {
        let path = self.artifact_path(key)?;
        let document = match Self::read_artifact(&path)? {
            Some(document) => document,
            None => return Ok(None),
        };

        if document.key() != key {
            return Err(Error::Parse(format!(
                "artifact {} holds {}, expected {}",
                path.display(),
                document.key(),
                key
            )));
        }

        fs::remove_file(&path)?;
        debug!(key = %key, path = %path.display(), "read artifact");
        Ok(Some(document))
    }

}
