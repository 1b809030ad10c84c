//! Build an encoding store from a directory of labelled photos.
//!
//! Layout: `<dataset>/<name>/<photo>.{jpg,jpeg,png}`. Each photo contributes
//! the embedding of its most confident face under that name.

use crate::engine::{EngineError, FaceEngine};
use crate::store::EncodingStore;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const PHOTO_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("dataset directory not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read dataset directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("face engine failed on {path}: {source}")]
    Engine {
        path: PathBuf,
        #[source]
        source: EngineError,
    },
}

/// Counts from one dataset build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub identities: usize,
    pub encoded: usize,
    pub no_face: usize,
    pub unreadable: usize,
}

/// Walk `dataset_dir` and encode every photo. Visit order is sorted, so the
/// resulting store order is deterministic.
pub fn build_dataset<E: FaceEngine>(
    engine: &mut E,
    dataset_dir: &Path,
) -> Result<(EncodingStore, BuildReport), DatasetError> {
    if !dataset_dir.is_dir() {
        return Err(DatasetError::NotFound(dataset_dir.to_path_buf()));
    }

    let mut store = EncodingStore::default();
    let mut report = BuildReport::default();

    for person_dir in sorted_entries(dataset_dir)?.into_iter().filter(|p| p.is_dir()) {
        let Some(name) = person_dir.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            tracing::warn!(path = %person_dir.display(), "skipping directory with non UTF-8 name");
            continue;
        };
        report.identities += 1;

        for photo in sorted_entries(&person_dir)?.into_iter().filter(|p| is_photo(p)) {
            let image = match image::open(&photo) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    tracing::warn!(path = %photo.display(), error = %e, "skipping unreadable photo");
                    report.unreadable += 1;
                    continue;
                }
            };

            let engine_err = |source| DatasetError::Engine {
                path: photo.clone(),
                source,
            };
            let faces = engine.detect(&image).map_err(engine_err)?;
            let Some(best) = faces
                .into_iter()
                .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            else {
                tracing::warn!(path = %photo.display(), "no face found; skipping photo");
                report.no_face += 1;
                continue;
            };

            let embedding = engine
                .embed(&image, std::slice::from_ref(&best))
                .map_err(engine_err)?
                .into_iter()
                .next()
                .ok_or_else(|| engine_err(EngineError::EmbeddingCount { faces: 1, embeddings: 0 }))?;

            tracing::debug!(name = %name, path = %photo.display(), confidence = best.confidence, "encoded photo");
            store.push(name.clone(), embedding);
            report.encoded += 1;
        }
    }

    tracing::info!(
        dataset = %dataset_dir.display(),
        identities = report.identities,
        encoded = report.encoded,
        no_face = report.no_face,
        unreadable = report.unreadable,
        "dataset built"
    );
    Ok((store, report))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let io_err = |source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}

fn is_photo(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| PHOTO_EXTENSIONS.iter().any(|p| ext.eq_ignore_ascii_case(p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Embedding};
    use image::{Rgb, RgbImage};

    /// Finds a face only in bright photos; the embedding encodes the red channel.
    struct BrightnessEngine;

    impl FaceEngine for BrightnessEngine {
        fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError> {
            let p = image.get_pixel(0, 0);
            if p[0] < 50 {
                return Ok(Vec::new());
            }
            let bbox = |confidence| BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 4.0,
                height: 4.0,
                confidence,
                landmarks: None,
            };
            Ok(vec![bbox(0.6), bbox(0.9)])
        }

        fn embed(&mut self, image: &RgbImage, faces: &[BoundingBox]) -> Result<Vec<Embedding>, EngineError> {
            let red = image.get_pixel(0, 0)[0] as f32 / 255.0;
            Ok(faces.iter().map(|f| Embedding::new(vec![red, f.confidence])).collect())
        }
    }

    fn save_photo(dir: &Path, name: &str, red: u8) {
        RgbImage::from_pixel(8, 8, Rgb([red, 0, 0])).save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_build_sorted_and_best_face() {
        let root = tempfile::tempdir().unwrap();
        let bob = root.path().join("Bob");
        let alice = root.path().join("Alice");
        fs::create_dir_all(&bob).unwrap();
        fs::create_dir_all(&alice).unwrap();
        save_photo(&bob, "1.png", 255);
        save_photo(&alice, "b.png", 255);
        save_photo(&alice, "a.PNG", 255);
        save_photo(&alice, "dark.png", 0);
        fs::write(alice.join("notes.txt"), "ignored").unwrap();
        fs::write(alice.join("broken.jpg"), "not an image").unwrap();

        let (store, report) = build_dataset(&mut BrightnessEngine, root.path()).unwrap();

        assert_eq!(store.names(), &["Alice", "Alice", "Bob"]);
        assert!(store.encodings().iter().all(|e| e.values[1] == 0.9));
        assert_eq!(
            report,
            BuildReport { identities: 2, encoded: 3, no_face: 1, unreadable: 1 }
        );
    }

    #[test]
    fn test_build_missing_dir() {
        let root = tempfile::tempdir().unwrap();
        let result = build_dataset(&mut BrightnessEngine, &root.path().join("train"));
        assert!(matches!(result, Err(DatasetError::NotFound(_))));
    }

    #[test]
    fn test_build_empty_dir() {
        let root = tempfile::tempdir().unwrap();
        let (store, report) = build_dataset(&mut BrightnessEngine, root.path()).unwrap();
        assert!(store.is_empty());
        assert_eq!(report, BuildReport::default());
    }
}
