//! redwatch-hw: camera capture and frame conversion.
//!
//! Provides V4L2-based camera access delivering RGB frames, plus the
//! pixel-format conversions and display-width fitting the capture loop needs.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
