//! knownface-core — face gallery and recognition pipeline.
//!
//! Faces are located and embedded by an external [`FaceEncoder`]; this crate
//! downsizes frames for it, matches the embeddings against a persisted
//! [`Gallery`] by Euclidean distance, and draws the results.

pub mod detector;
pub mod encoder;
pub mod gallery;
pub mod matcher;
pub mod overlay;
pub mod session;
pub mod types;

pub use detector::{detect, DetectError};
pub use encoder::{EncodedFace, EncoderError, FaceEncoder, ProcessEncoder};
pub use gallery::{Gallery, GalleryEntry, GalleryError};
pub use matcher::{recognize, EuclideanMatcher, Matcher};
pub use session::{CommitError, Committed, RecognitionSession, SessionOptions};
pub use types::{Detection, Embedding, FaceBox, Identity, MatchResult, RecognizedFace};
