//! Frame annotation: detect, embed, match against the store, draw.
//!
//! [`annotate`] re-reads the store on every call. [`Recognizer`] owns the
//! engine and the deserialized store, re-reading it according to its
//! [`Refresh`] policy.

use crate::draw::{self, GREEN, RED};
use crate::engine::{EngineError, FaceEngine};
use crate::matcher;
use crate::red_list::RedList;
use crate::store::{EncodingStore, StoreError};
use crate::types::{DetectedFace, MatchResult};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("tolerance must be within [0.0, 1.0], got {0}")]
    InvalidTolerance(f32),
    #[error("image has zero size ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("face embedding has {actual} dimensions but the store holds {expected}-dimensional encodings")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Whether a failure came from the store/model side or from the input frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Resource,
    Input,
}

impl AnnotateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(_) | Self::DimensionMismatch { .. } => ErrorKind::Resource,
            Self::Engine(EngineError::Detector(crate::detector::DetectorError::ModelNotFound(_)))
            | Self::Engine(EngineError::Recognizer(crate::recognizer::RecognizerError::ModelNotFound(_))) => {
                ErrorKind::Resource
            }
            Self::Engine(_) | Self::InvalidTolerance(_) | Self::EmptyImage { .. } => ErrorKind::Input,
        }
    }
}

/// Annotate `image` in place, reading the encoding store from `store_path`.
pub fn annotate<E: FaceEngine>(
    engine: &mut E,
    image: &mut RgbImage,
    tolerance: f32,
    store_path: &Path,
    red_list: &RedList,
) -> Result<Vec<MatchResult>, AnnotateError> {
    validate(image, tolerance)?;
    let store = EncodingStore::load(store_path)?;
    annotate_with_store(engine, image, tolerance, &store, red_list)
}

/// Annotate `image` in place against an already loaded store.
///
/// Detection and embedding run for the whole frame before anything is drawn,
/// so a failure leaves the image untouched.
pub fn annotate_with_store<E: FaceEngine>(
    engine: &mut E,
    image: &mut RgbImage,
    tolerance: f32,
    store: &EncodingStore,
    red_list: &RedList,
) -> Result<Vec<MatchResult>, AnnotateError> {
    validate(image, tolerance)?;

    let faces = detect_faces(engine, image)?;
    if let Some(expected) = store.dimension() {
        if let Some(face) = faces.iter().find(|f| f.embedding.dimension() != expected) {
            return Err(AnnotateError::DimensionMismatch {
                expected,
                actual: face.embedding.dimension(),
            });
        }
    }

    let mut results = Vec::with_capacity(faces.len());
    for face in faces {
        let flags = engine.compare(store.encodings(), &face.embedding, tolerance);
        let resolved = matcher::first_match(store, &flags);
        let distance = resolved
            .index
            .map(|i| engine.distance(&store.encodings()[i], &face.embedding));
        let red_listed = red_list.contains(&resolved.name);

        let color = if red_listed { RED } else { GREEN };
        draw::draw_labelled_box(image, face.location, &resolved.name, color);

        tracing::debug!(
            name = %resolved.name,
            store_index = ?resolved.index,
            ?distance,
            red_listed,
            "face matched"
        );

        results.push(MatchResult {
            name: resolved.name,
            location: face.location,
            store_index: resolved.index,
            distance,
            red_listed,
        });
    }

    Ok(results)
}

fn validate(image: &RgbImage, tolerance: f32) -> Result<(), AnnotateError> {
    if !(0.0..=1.0).contains(&tolerance) {
        return Err(AnnotateError::InvalidTolerance(tolerance));
    }
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(AnnotateError::EmptyImage { width, height });
    }
    Ok(())
}

/// Run detection then embedding, pairing boxes with embeddings in order.
fn detect_faces<E: FaceEngine>(engine: &mut E, image: &RgbImage) -> Result<Vec<DetectedFace>, AnnotateError> {
    let boxes = engine.detect(image)?;
    if boxes.is_empty() {
        return Ok(Vec::new());
    }
    let embeddings = engine.embed(image, &boxes)?;
    if embeddings.len() != boxes.len() {
        return Err(EngineError::EmbeddingCount {
            faces: boxes.len(),
            embeddings: embeddings.len(),
        }
        .into());
    }

    Ok(boxes
        .iter()
        .zip(embeddings)
        .map(|(bbox, embedding)| DetectedFace {
            location: bbox.location(),
            embedding,
        })
        .collect())
}

/// When a [`Recognizer`] re-reads its encoding store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Refresh {
    /// Re-read before every frame.
    Always,
    /// Stat the file before every frame; re-read when it changed.
    #[default]
    OnChange,
    /// Only on [`Recognizer::reload`].
    Manual,
}

/// Identity of a store file revision, as seen by `stat`.
///
/// The inode catches same-size rewrites inside the mtime granularity, since
/// [`EncodingStore::save`] renames a fresh file into place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
    inode: u64,
}

impl FileStamp {
    fn read(path: &Path) -> Result<Self, StoreError> {
        let meta = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(path.to_path_buf())
            } else {
                StoreError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        Ok(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
            inode: inode(&meta),
        })
    }
}

#[cfg(unix)]
fn inode(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode(_meta: &std::fs::Metadata) -> u64 {
    0
}

/// Face engine plus an owned, reloadable encoding store.
pub struct Recognizer<E> {
    engine: E,
    store_path: PathBuf,
    store: EncodingStore,
    stamp: Option<FileStamp>,
    refresh: Refresh,
}

impl<E: FaceEngine> Recognizer<E> {
    /// Load the store at `store_path`. A missing or malformed store fails here.
    pub fn open(engine: E, store_path: impl Into<PathBuf>, refresh: Refresh) -> Result<Self, AnnotateError> {
        let mut recognizer = Self {
            engine,
            store_path: store_path.into(),
            store: EncodingStore::default(),
            stamp: None,
            refresh,
        };
        recognizer.reload()?;
        Ok(recognizer)
    }

    /// Re-read the store from disk unconditionally.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let stamp = FileStamp::read(&self.store_path)?;
        self.store = EncodingStore::load(&self.store_path)?;
        self.stamp = Some(stamp);
        tracing::info!(
            path = %self.store_path.display(),
            entries = self.store.len(),
            identities = self.store.identities().len(),
            "encoding store loaded"
        );
        Ok(())
    }

    fn refresh_store(&mut self) -> Result<(), StoreError> {
        match self.refresh {
            Refresh::Always => self.reload(),
            Refresh::OnChange => {
                let current = FileStamp::read(&self.store_path)?;
                if self.stamp != Some(current) {
                    tracing::debug!(path = %self.store_path.display(), "encoding store changed on disk");
                    self.reload()?;
                }
                Ok(())
            }
            Refresh::Manual => Ok(()),
        }
    }

    /// Annotate `image` in place and report every face found.
    pub fn annotate(
        &mut self,
        image: &mut RgbImage,
        tolerance: f32,
        red_list: &RedList,
    ) -> Result<Vec<MatchResult>, AnnotateError> {
        validate(image, tolerance)?;
        self.refresh_store()?;
        annotate_with_store(&mut self.engine, image, tolerance, &self.store, red_list)
    }

    pub fn store(&self) -> &EncodingStore {
        &self.store
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }
}
