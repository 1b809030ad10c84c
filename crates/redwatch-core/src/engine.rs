//! Face engine seam: detection, embedding and comparison behind one trait.

use crate::detector::{DetectorError, FaceDetector};
use crate::matcher;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// SCRFD detection model file name inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("engine returned {embeddings} embeddings for {faces} faces")]
    EmbeddingCount { faces: usize, embeddings: usize },
}

/// Face detection, embedding extraction and embedding comparison.
pub trait FaceEngine {
    /// Detect faces, in the order they should be reported.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError>;

    /// Extract one embedding per face, in the same order as `faces`.
    fn embed(&mut self, image: &RgbImage, faces: &[BoundingBox]) -> Result<Vec<Embedding>, EngineError>;

    /// Distance between a stored embedding and a probe. Euclidean by default.
    fn distance(&self, known: &Embedding, probe: &Embedding) -> f32 {
        known.euclidean_distance(probe)
    }

    /// One flag per `known` entry: does `probe` fall within `tolerance` of it?
    fn compare(&self, known: &[Embedding], probe: &Embedding, tolerance: f32) -> Vec<bool> {
        matcher::compare_faces(known, probe, tolerance, |k, p| self.distance(k, p))
    }
}

/// SCRFD + ArcFace running on ONNX Runtime.
///
/// ArcFace embeddings are unit length, where Euclidean distance spans [0, 2]
/// and same-person pairs sit around 1.0. Distances are therefore cosine
/// distances (`1 - cos`), which put the usual 0.6 tolerance at cosine 0.4.
pub struct OnnxFaceEngine {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEngine {
    /// Load both models from `model_dir`. Fails fast if either file is missing.
    pub fn load(model_dir: &Path) -> Result<Self, EngineError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        tracing::info!(model_dir = %model_dir.display(), "face engine ready");
        Ok(Self { detector, recognizer })
    }
}

impl FaceEngine for OnnxFaceEngine {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError> {
        Ok(self.detector.detect(image)?)
    }

    fn embed(&mut self, image: &RgbImage, faces: &[BoundingBox]) -> Result<Vec<Embedding>, EngineError> {
        faces
            .iter()
            .map(|face| self.recognizer.extract(image, face).map_err(EngineError::from))
            .collect()
    }

    fn distance(&self, known: &Embedding, probe: &Embedding) -> f32 {
        arcface_distance(known, probe)
    }
}

/// Distance used for ArcFace embeddings.
fn arcface_distance(known: &Embedding, probe: &Embedding) -> f32 {
    known.cosine_distance(probe)
}
