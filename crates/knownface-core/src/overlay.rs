//! Draw recognition results onto a frame.

use crate::types::{FaceBox, RecognizedFace};
use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const KNOWN_LABEL_COLOR: Rgb<u8> = Rgb([0, 160, 0]);
const UNKNOWN_LABEL_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: i32 = 2;
const LABEL_BAR_HEIGHT: i32 = 35;
const LABEL_TEXT_PX: f32 = 24.0;
const LABEL_TEXT_INSET: i32 = 6;

/// DejaVu Sans, see `assets/DejaVuSans-LICENSE.txt`.
static LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Outline every face, fill a label bar along the bottom of its box and
/// write the face's name (or `Unknown`) into the bar.
pub fn annotate(image: &mut RgbImage, faces: &[RecognizedFace]) {
    let font = match FontRef::try_from_slice(LABEL_FONT) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(error = %e, "label font unusable; drawing boxes only");
            None
        }
    };

    for face in faces {
        let b = face.detection.location;
        let label_color = if face.identity().is_known() {
            KNOWN_LABEL_COLOR
        } else {
            UNKNOWN_LABEL_COLOR
        };

        draw_rect_outline(image, &b, BOX_COLOR);
        let bar_top = b.bottom.saturating_sub(LABEL_BAR_HEIGHT);
        fill_rect(image, &FaceBox::new(bar_top, b.right, b.bottom, b.left), label_color);

        if let Some(font) = &font {
            draw_label(image, font, bar_top, b.left, &face.identity().to_string());
        }
    }
}

/// Write `text` inset from the left of the bar starting at `bar_top`, centered vertically.
///
/// Labels that would land entirely off the image are skipped.
fn draw_label(image: &mut RgbImage, font: &FontRef<'_>, bar_top: i32, left: i32, text: &str) {
    let scale = PxScale::from(LABEL_TEXT_PX);
    let (w, h) = text_size(scale, font, text);
    let h = i32::try_from(h).unwrap_or(LABEL_BAR_HEIGHT).min(LABEL_BAR_HEIGHT);
    let x = left.saturating_add(LABEL_TEXT_INSET);
    let y = bar_top.saturating_add((LABEL_BAR_HEIGHT - h) / 2);

    let visible = (x as i64) < image.width() as i64
        && (y as i64) < image.height() as i64
        && x as i64 + w as i64 > 0
        && y as i64 + h as i64 > 0;
    if visible {
        draw_text_mut(image, TEXT_COLOR, x, y, scale, font, text);
    }
}

fn draw_rect_outline(image: &mut RgbImage, b: &FaceBox, color: Rgb<u8>) {
    let t = BOX_THICKNESS;
    // top, bottom, left, right edges
    fill_rect(image, &FaceBox::new(b.top, b.right, b.top.saturating_add(t), b.left), color);
    fill_rect(image, &FaceBox::new(b.bottom.saturating_sub(t), b.right, b.bottom, b.left), color);
    fill_rect(image, &FaceBox::new(b.top, b.left.saturating_add(t), b.bottom, b.left), color);
    fill_rect(image, &FaceBox::new(b.top, b.right, b.bottom, b.right.saturating_sub(t)), color);
}

/// Fill the half-open region `[left, right) x [top, bottom)`, clamped to the image.
fn fill_rect(image: &mut RgbImage, b: &FaceBox, color: Rgb<u8>) {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x0 = (b.left as i64).clamp(0, w);
    let x1 = (b.right as i64).clamp(0, w);
    let y0 = (b.top as i64).clamp(0, h);
    let y1 = (b.bottom as i64).clamp(0, h);

    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Detection, Embedding, Identity, MatchResult};

    fn recognized(b: FaceBox, identity: Identity) -> RecognizedFace {
        RecognizedFace {
            detection: Detection {
                location: b,
                embedding: Embedding::new(vec![0.0]),
            },
            result: MatchResult {
                identity,
                distance: None,
                index: None,
            },
        }
    }

    /// Pixels inside `[x0, x1) x [y0, y1)` that are neither `bg` nor the box color.
    fn count_text_pixels(image: &RgbImage, (x0, x1): (u32, u32), (y0, y1): (u32, u32), bg: Rgb<u8>) -> usize {
        (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .filter(|&(x, y)| {
                let p = *image.get_pixel(x, y);
                p != bg && p != BOX_COLOR
            })
            .count()
    }

    #[test]
    fn test_box_and_label_bar() {
        let mut image = RgbImage::new(100, 100);
        let face = recognized(FaceBox::new(10, 60, 70, 20), Identity::Unknown);
        annotate(&mut image, &[face]);

        // outline
        assert_eq!(*image.get_pixel(30, 10), BOX_COLOR);
        assert_eq!(*image.get_pixel(20, 20), BOX_COLOR);
        assert_eq!(*image.get_pixel(59, 20), BOX_COLOR);
        // interior above the bar untouched
        assert_eq!(*image.get_pixel(40, 20), Rgb([0, 0, 0]));
        // label bar spans bottom - 35 .. bottom; text starts 6 px in, so the
        // bar's leftmost inner columns keep the plain bar color
        assert_eq!(*image.get_pixel(22, 40), UNKNOWN_LABEL_COLOR);
        assert_eq!(*image.get_pixel(22, 66), UNKNOWN_LABEL_COLOR);
        assert_eq!(*image.get_pixel(40, 34), Rgb([0, 0, 0]));
        // outside, above the bar (label text may run past the box's right edge)
        assert_eq!(*image.get_pixel(70, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_label_text_drawn_inside_bar() {
        let mut image = RgbImage::new(200, 120);
        let face = recognized(FaceBox::new(10, 180, 100, 10), Identity::Known("Alice".into()));
        annotate(&mut image, &[face]);

        let in_bar = count_text_pixels(&image, (12, 178), (65, 98), KNOWN_LABEL_COLOR);
        assert!(in_bar > 20, "expected glyph pixels in the label bar, found {in_bar}");
        // Nothing spills above the bar.
        assert_eq!(count_text_pixels(&image, (12, 178), (12, 65), Rgb([0, 0, 0])), 0);
    }

    #[test]
    fn test_unknown_face_is_labelled_too() {
        let mut image = RgbImage::new(200, 120);
        let face = recognized(FaceBox::new(10, 180, 100, 10), Identity::Unknown);
        annotate(&mut image, &[face]);
        assert!(count_text_pixels(&image, (12, 178), (65, 98), UNKNOWN_LABEL_COLOR) > 20);
    }

    #[test]
    fn test_known_face_label_color() {
        let mut image = RgbImage::new(100, 100);
        let face = recognized(FaceBox::new(10, 60, 70, 20), Identity::Known("Alice".into()));
        annotate(&mut image, &[face]);
        assert_eq!(*image.get_pixel(23, 50), KNOWN_LABEL_COLOR);
    }

    #[test]
    fn test_out_of_bounds_box_is_clamped() {
        let mut image = RgbImage::new(20, 20);
        let faces = [
            recognized(FaceBox::new(-10, 40, 30, -5), Identity::Unknown),
            recognized(FaceBox::new(100, 200, 150, 120), Identity::Unknown),
        ];
        annotate(&mut image, &faces);
        assert_eq!(*image.get_pixel(0, 19), UNKNOWN_LABEL_COLOR);
    }

    #[test]
    fn test_extreme_coordinates_do_not_overflow() {
        let mut image = RgbImage::new(20, 20);
        let faces = [
            recognized(FaceBox::new(i32::MIN, i32::MAX, i32::MIN, i32::MIN), Identity::Unknown),
            recognized(FaceBox::new(i32::MAX, i32::MAX, i32::MAX, i32::MAX), Identity::Unknown),
            recognized(FaceBox::new(i32::MIN, 15, 15, i32::MIN), Identity::Known("Alice".into())),
        ];
        annotate(&mut image, &faces);
        // Only the last box reaches the image: its bar covers rows 0..15.
        assert_eq!(*image.get_pixel(5, 5), KNOWN_LABEL_COLOR);
        assert_eq!(*image.get_pixel(5, 17), Rgb([0, 0, 0]));
    }
}
