//! Encoding store: known identities and their face embeddings.
//!
//! On disk the store is a JSON object with two index-aligned arrays,
//! `names` and `encodings`. Entry order is preserved exactly; matching
//! depends on it.

use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("encoding store not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to access encoding store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed encoding store {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize encoding store {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("encoding {index} contains a non-finite value")]
    NonFinite { index: usize },
    #[error("encoding store has {names} names but {encodings} encodings")]
    LengthMismatch { names: usize, encodings: usize },
    #[error("encoding {index} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

/// Serialized layout of the store file.
#[derive(Serialize, Deserialize)]
struct StoreFile {
    names: Vec<String>,
    encodings: Vec<Vec<f32>>,
}

/// In-memory encoding store. Every embedding shares one dimensionality.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodingStore {
    names: Vec<String>,
    encodings: Vec<Embedding>,
}

impl EncodingStore {
    /// Read and validate a store file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
        let file: StoreFile = serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_parts(file.names, file.encodings.into_iter().map(Embedding::new).collect())?;

        tracing::debug!(
            path = %path.display(),
            entries = store.len(),
            dimension = ?store.dimension(),
            "loaded encoding store"
        );
        Ok(store)
    }

    /// Build a store from index-aligned names and embeddings.
    pub fn from_parts(names: Vec<String>, encodings: Vec<Embedding>) -> Result<Self, StoreError> {
        if names.len() != encodings.len() {
            return Err(StoreError::LengthMismatch {
                names: names.len(),
                encodings: encodings.len(),
            });
        }
        if let Some(first) = encodings.first() {
            let expected = first.dimension();
            if let Some((index, bad)) = encodings
                .iter()
                .enumerate()
                .find(|(_, e)| e.dimension() != expected)
            {
                return Err(StoreError::DimensionMismatch {
                    index,
                    expected,
                    actual: bad.dimension(),
                });
            }
        }
        Ok(Self { names, encodings })
    }

    /// Write the store atomically: a sibling temp file is renamed over `path`.
    ///
    /// JSON has no NaN or infinity, so an encoding holding one is refused
    /// rather than written as something `load` would reject.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(index) = self
            .encodings
            .iter()
            .position(|e| e.values.iter().any(|v| !v.is_finite()))
        {
            return Err(StoreError::NonFinite { index });
        }

        let file = StoreFile {
            names: self.names.clone(),
            encodings: self.encodings.iter().map(|e| e.values.clone()).collect(),
        };
        let json = serde_json::to_vec(&file).map_err(|source| StoreError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;

        tracing::info!(path = %path.display(), entries = self.len(), "saved encoding store");
        Ok(())
    }

    /// Append an entry. Dimension consistency is the caller's responsibility
    /// and is re-checked on the next `load`.
    pub fn push(&mut self, name: impl Into<String>, embedding: Embedding) {
        self.names.push(name.into());
        self.encodings.push(embedding);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Embedding dimensionality, or `None` for an empty store.
    pub fn dimension(&self) -> Option<usize> {
        self.encodings.first().map(Embedding::dimension)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn encodings(&self) -> &[Embedding] {
        &self.encodings
    }

    /// Distinct identities in first-appearance order.
    pub fn identities(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for name in &self.names {
            if !seen.contains(&name.as_str()) {
                seen.push(name.as_str());
            }
        }
        seen
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    if source.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound(path.to_path_buf())
    } else {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
