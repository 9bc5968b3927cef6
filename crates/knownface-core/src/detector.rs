//! Per-frame face detection: downscale, encode, map boxes back.

use crate::encoder::{EncoderError, FaceEncoder};
use crate::types::Detection;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::borrow::Cow;
use thiserror::Error;

/// Default downscale applied before detection (a quarter of each dimension).
pub const DEFAULT_SCALE_FACTOR: f64 = 0.25;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("scale factor must be in (0, 1], got {0}")]
    InvalidScale(f64),
    #[error("empty frame")]
    EmptyFrame,
    #[error("encoder: {0}")]
    Encoder(#[from] EncoderError),
}

/// Detect faces in `frame`, running the encoder on a copy shrunk by `scale_factor`.
///
/// Returned boxes are in `frame` coordinates. Order is whatever the encoder reports.
pub fn detect<E: FaceEncoder + ?Sized>(
    encoder: &mut E,
    frame: &RgbImage,
    scale_factor: f64,
) -> Result<Vec<Detection>, DetectError> {
    if !(scale_factor > 0.0 && scale_factor <= 1.0) {
        return Err(DetectError::InvalidScale(scale_factor));
    }
    if frame.width() == 0 || frame.height() == 0 {
        return Err(DetectError::EmptyFrame);
    }

    let small = downscale(frame, scale_factor);
    let faces = encoder.encode(&small)?;

    tracing::trace!(
        width = small.width(),
        height = small.height(),
        faces = faces.len(),
        "encoded downscaled frame"
    );

    Ok(faces
        .into_iter()
        .map(|face| Detection {
            location: face.location.rescale(scale_factor),
            embedding: face.embedding,
        })
        .collect())
}

/// Shrink `frame` to `round(dim * scale_factor)` in both axes, never below 1x1.
fn downscale(frame: &RgbImage, scale_factor: f64) -> Cow<'_, RgbImage> {
    if scale_factor == 1.0 {
        return Cow::Borrowed(frame);
    }
    let target = |dim: u32| ((dim as f64 * scale_factor).round() as u32).max(1);
    let (w, h) = (target(frame.width()), target(frame.height()));
    Cow::Owned(imageops::resize(frame, w, h, FilterType::Triangle))
}
