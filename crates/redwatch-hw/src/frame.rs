//! RGB frame type and pixel conversions: YUYV, MJPG, width fitting.

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage};

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// When the buffer was dequeued.
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPG decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("decoded frame is {actual:?}, negotiated {expected:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// Convert packed YUYV (4:2:2) to RGB with BT.601 studio-swing coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v).0);
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v).0);
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> Rgb<u8> {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clip = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    Rgb([
        clip(298 * c + 409 * e),
        clip(298 * c - 100 * d - 208 * e),
        clip(298 * c + 516 * d),
    ])
}

/// Decode an MJPG buffer and check it against the negotiated size.
pub fn mjpg_to_rgb(jpeg: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let image = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?.to_rgb8();
    if image.dimensions() != (width, height) {
        return Err(FrameError::SizeMismatch {
            expected: (width, height),
            actual: image.dimensions(),
        });
    }
    Ok(image)
}

/// Display size for a frame: frames wider than `max_width` shrink to it,
/// keeping the aspect ratio (height truncated); narrower frames are unchanged.
pub fn fit_width(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width > max_width {
        let fitted = (max_width as u64 * height as u64 / width as u64) as u32;
        (max_width, fitted.max(1))
    } else {
        (width, height)
    }
}

/// Shrink `image` to at most `max_width` pixels wide.
pub fn resize_to_width(image: RgbImage, max_width: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let (new_w, new_h) = fit_width(width, height, max_width);
    if (new_w, new_h) == (width, height) {
        image
    } else {
        imageops::resize(&image, new_w, new_h, FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_gray_pixels() {
        // 2x1 image: Y=16 is black, Y=235 is white; neutral chroma.
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_yuyv_red_dominant() {
        // High V (Cr) pushes red up and green down.
        let rgb = yuyv_to_rgb(&[81, 90, 81, 240], 2, 1).unwrap();
        let p = rgb.get_pixel(0, 0);
        assert!(p[0] > 200 && p[1] < 60 && p[2] < 60, "got {p:?}");
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let result = yuyv_to_rgb(&[100, 128], 2, 1);
        assert!(matches!(result, Err(FrameError::InvalidLength { expected: 4, actual: 2 })));
    }

    #[test]
    fn test_mjpg_garbage_fails() {
        assert!(matches!(mjpg_to_rgb(b"nope", 2, 2), Err(FrameError::Decode(_))));
    }

    #[test]
    fn test_fit_width_shrinks_wide_frames() {
        assert_eq!(fit_width(1200, 800, 600), (600, 400));
        assert_eq!(fit_width(1920, 1080, 600), (600, 337));
    }

    #[test]
    fn test_fit_width_keeps_narrow_frames() {
        assert_eq!(fit_width(500, 300, 600), (500, 300));
        assert_eq!(fit_width(600, 480, 600), (600, 480));
    }

    #[test]
    fn test_resize_to_width() {
        let image = RgbImage::new(640, 480);
        assert_eq!(resize_to_width(image, 600).dimensions(), (600, 450));
        let small = RgbImage::new(320, 240);
        assert_eq!(resize_to_width(small, 600).dimensions(), (320, 240));
    }
}
