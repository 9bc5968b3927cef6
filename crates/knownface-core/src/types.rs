use serde::{Deserialize, Serialize};
use std::fmt;

/// Face location in `(top, right, bottom, left)` pixel order, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl FaceBox {
    pub fn new(top: i32, right: i32, bottom: i32, left: i32) -> Self {
        Self { top, right, bottom, left }
    }

    /// Map a box found on a downscaled image back to source-frame coordinates.
    ///
    /// Each coordinate is divided by `scale_factor` and truncated toward zero.
    pub fn rescale(&self, scale_factor: f64) -> Self {
        let up = |v: i32| (v as f64 / scale_factor) as i32;
        Self {
            top: up(self.top),
            right: up(self.right),
            bottom: up(self.bottom),
            left: up(self.left),
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Face embedding vector, as produced by the external encoder (typically 128-dimensional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// True when no component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Returns `None` when the dimensionalities differ.
    pub fn euclidean_distance(&self, other: &Embedding) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        Some(
            self.values
                .iter()
                .zip(other.values.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f32>()
                .sqrt(),
        )
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// One face located in a frame, in source-frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub location: FaceBox,
    pub embedding: Embedding,
}

/// Outcome of looking a face up in the gallery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Known(name) => Some(name),
            Identity::Unknown => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Known(name) => f.write_str(name),
            Identity::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity: Identity,
    /// Distance to the nearest gallery entry, if any entry was comparable.
    pub distance: Option<f32>,
    /// Index of the nearest gallery entry.
    pub index: Option<usize>,
}

impl MatchResult {
    pub fn unknown() -> Self {
        Self {
            identity: Identity::Unknown,
            distance: None,
            index: None,
        }
    }
}

/// A detection paired with its gallery lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedFace {
    pub detection: Detection,
    pub result: MatchResult,
}

impl RecognizedFace {
    pub fn identity(&self) -> &Identity {
        &self.result.identity
    }
}
