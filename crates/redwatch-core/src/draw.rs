//! Box and label rendering on RGB frames. All drawing clips to the image.

use crate::types::FaceLocation;
use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::sync::OnceLock;

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

/// Rectangle stroke width in pixels.
pub const BOX_THICKNESS: i32 = 3;
/// Label baseline sits this many pixels right of `left` and above `bottom`.
pub const LABEL_INSET: i32 = 6;
/// Label font height in pixels.
pub const LABEL_SCALE: f32 = 20.0;

static LABEL_FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

fn label_font() -> Option<&'static FontRef<'static>> {
    static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();
    FONT.get_or_init(|| match FontRef::try_from_slice(LABEL_FONT_DATA) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::error!(error = %e, "bundled label font failed to parse, labels disabled");
            None
        }
    })
    .as_ref()
}

/// Outline `location` with a stroke of `thickness` pixels centred on its edges.
///
/// Edges far outside the image are pulled in to just past its border first,
/// so arbitrarily large boxes cost no more than image-sized ones.
pub fn draw_box(image: &mut RgbImage, location: FaceLocation, color: Rgb<u8>, thickness: i32) {
    let (width, height) = image.dimensions();
    let pad = i64::from(thickness.max(1));
    let clamp_x = |v: i32| i64::from(v).clamp(-pad, i64::from(width) + pad);
    let clamp_y = |v: i32| i64::from(v).clamp(-pad, i64::from(height) + pad);

    let (left, right) = (clamp_x(location.left), clamp_x(location.right));
    let (top, bottom) = (clamp_y(location.top), clamp_y(location.bottom));
    let before = pad / 2;

    for ring in 0..pad {
        let inset = ring - before;
        let (x0, y0) = (left + inset, top + inset);
        let (x1, y1) = (right - inset, bottom - inset);
        if x1 < x0 || y1 < y0 {
            continue;
        }
        let rect = Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Render `text` with its baseline-left corner at (`x`, `baseline`).
pub fn draw_text(image: &mut RgbImage, text: &str, x: i32, baseline: i32, color: Rgb<u8>) {
    let Some(font) = label_font() else {
        return;
    };
    let scale = PxScale::from(LABEL_SCALE);
    let top = baseline as f32 - font.as_scaled(scale).ascent();
    let (text_width, _) = text_size(scale, font, text);

    // Entirely off the image: nothing to draw, and the glyph offsets below
    // would otherwise be added to unbounded coordinates.
    let (width, height) = image.dimensions();
    if text.is_empty()
        || baseline <= 0
        || x >= width as i32
        || top >= height as f32
        || x.saturating_add(text_width as i32) <= 0
    {
        return;
    }

    draw_text_mut(image, color, x, top.round() as i32, scale, font, text);
}

/// Box plus name label, both in `color`.
pub fn draw_labelled_box(image: &mut RgbImage, location: FaceLocation, label: &str, color: Rgb<u8>) {
    draw_box(image, location, color, BOX_THICKNESS);
    draw_text(
        image,
        label,
        location.left.saturating_add(LABEL_INSET),
        location.bottom.saturating_sub(LABEL_INSET),
        color,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn loc(top: i32, right: i32, bottom: i32, left: i32) -> FaceLocation {
        FaceLocation { top, right, bottom, left }
    }

    fn blank(img: &RgbImage, xs: std::ops::RangeInclusive<u32>, ys: std::ops::RangeInclusive<u32>) -> bool {
        ys.clone()
            .all(|y| xs.clone().all(|x| *img.get_pixel(x, y) == BLACK))
    }

    #[test]
    fn test_bundled_font_parses() {
        assert!(label_font().is_some());
    }

    #[test]
    fn test_box_edges_and_interior() {
        let mut img = RgbImage::new(50, 50);
        draw_box(&mut img, loc(10, 40, 40, 10), RED, 3);

        for edge in [9, 10, 11] {
            assert_eq!(img.get_pixel(25, edge as u32), &RED, "top row {edge}");
            assert_eq!(img.get_pixel(edge as u32, 25), &RED, "left col {edge}");
        }
        assert_eq!(img.get_pixel(25, 8), &BLACK);
        assert_eq!(img.get_pixel(25, 12), &BLACK);
        assert_eq!(img.get_pixel(25, 41), &RED);
        assert_eq!(img.get_pixel(41, 25), &RED);
        assert_eq!(img.get_pixel(25, 25), &BLACK);
    }

    #[test]
    fn test_box_clips_to_image() {
        let mut img = RgbImage::new(20, 20);
        draw_box(&mut img, loc(-5, 30, 30, -5), GREEN, 3);
        assert!(img.pixels().all(|p| *p == BLACK));

        draw_box(&mut img, loc(0, 19, 19, 0), GREEN, 3);
        assert_eq!(img.get_pixel(0, 0), &GREEN);
        assert_eq!(img.get_pixel(19, 19), &GREEN);
    }

    #[test]
    fn test_huge_box_draws_visible_edges_only() {
        let mut img = RgbImage::new(20, 20);
        draw_box(&mut img, loc(5, i32::MAX, i32::MAX, i32::MIN), RED, 3);
        assert_eq!(img.get_pixel(10, 5), &RED);
        assert_eq!(img.get_pixel(10, 15), &BLACK);
    }

    #[test]
    fn test_labelled_box_extreme_edges_do_not_overflow() {
        let mut img = RgbImage::new(20, 20);
        draw_labelled_box(&mut img, loc(i32::MIN, i32::MAX, i32::MAX, i32::MIN), "Unknown", RED);
        draw_labelled_box(&mut img, loc(i32::MAX, i32::MAX, i32::MAX, i32::MAX), "Unknown", RED);
        draw_labelled_box(&mut img, loc(i32::MIN, i32::MIN, i32::MIN, i32::MIN), "Unknown", RED);
        assert!(img.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn test_text_clips_off_image() {
        let mut img = RgbImage::new(10, 10);
        draw_text(&mut img, "Unknown", -100, -100, RED);
        draw_text(&mut img, "Unknown", 50, 5, RED);
        assert!(img.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn test_label_anchored_at_bottom_left_inset() {
        let mut img = RgbImage::new(100, 100);
        let location = loc(10, 90, 90, 10);
        draw_labelled_box(&mut img, location, "L", RED);

        let x = (location.left + LABEL_INSET) as u32;
        let baseline = (location.bottom - LABEL_INSET) as u32;

        // Ink just above the baseline, starting at the inset column.
        assert!(!blank(&img, x..=x + 12, baseline - 4..=baseline - 1));
        // Nothing left of the inset or between the baseline and the box edge.
        assert!(blank(&img, 12..=x - 1, 12..=baseline));
        assert!(blank(&img, 12..=88, baseline + 2..=88));
        // Nothing in the upper part of the box: the label hugs the bottom.
        assert!(blank(&img, 12..=88, 12..=60));
    }

    #[test]
    fn test_label_ink_uses_box_color() {
        let mut img = RgbImage::new(100, 100);
        draw_labelled_box(&mut img, loc(10, 90, 90, 10), "Alice", GREEN);
        // Anti-aliased text blends toward the label color; no other hue appears.
        assert!(img.pixels().all(|p| p[0] == 0 && p[2] == 0));
        assert!(img.pixels().any(|p| *p == GREEN));
    }
}
