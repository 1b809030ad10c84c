//! redwatch-core: face recognition and red-list frame annotation.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime, behind the [`FaceEngine`] trait. Recognized
//! faces are boxed in red when their name is on the red list, green
//! otherwise.

pub mod alignment;
pub mod annotate;
pub mod dataset;
pub mod detector;
pub mod draw;
pub mod engine;
pub mod matcher;
pub mod recognizer;
pub mod red_list;
pub mod store;
pub mod types;

pub use annotate::{annotate, annotate_with_store, AnnotateError, ErrorKind, Recognizer, Refresh};
pub use dataset::{build_dataset, BuildReport, DatasetError};
pub use detector::FaceDetector;
pub use engine::{EngineError, FaceEngine, OnnxFaceEngine};
pub use recognizer::FaceRecognizer;
pub use red_list::{RedList, RedListError};
pub use store::{EncodingStore, StoreError};
pub use types::{BoundingBox, DetectedFace, Embedding, FaceLocation, MatchResult, UNKNOWN_NAME};
