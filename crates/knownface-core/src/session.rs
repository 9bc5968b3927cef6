//! Recognition session: owns the gallery and the encoder, remembers the last frame.

use crate::detector::{self, DetectError};
use crate::encoder::FaceEncoder;
use crate::gallery::{Gallery, GalleryError};
use crate::matcher::{self, EuclideanMatcher, Matcher};
use crate::types::{Embedding, Identity, RecognizedFace};
use image::RgbImage;
use thiserror::Error;

/// Why a commit request changed nothing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("name is empty")]
    EmptyName,
    #[error("no unrecognized face in the current frame")]
    NoUnknownFace,
    #[error("face embedding contains NaN or infinite values")]
    InvalidEmbedding,
}

/// A face that was added to the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    pub name: String,
    /// Index of the face within the current frame.
    pub face_index: usize,
    /// False if the gallery file could not be written; the entry is still held in memory.
    pub persisted: bool,
}

/// Tunables for [`RecognitionSession`].
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub scale_factor: f64,
    pub tolerance: f32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            scale_factor: detector::DEFAULT_SCALE_FACTOR,
            tolerance: matcher::DEFAULT_TOLERANCE,
        }
    }
}

pub struct RecognitionSession<E, M = EuclideanMatcher> {
    gallery: Gallery,
    encoder: E,
    matcher: M,
    options: SessionOptions,
    current: Vec<RecognizedFace>,
}

impl<E: FaceEncoder> RecognitionSession<E, EuclideanMatcher> {
    pub fn new(gallery: Gallery, encoder: E, options: SessionOptions) -> Self {
        Self::with_matcher(gallery, encoder, EuclideanMatcher, options)
    }
}

impl<E: FaceEncoder, M: Matcher> RecognitionSession<E, M> {
    pub fn with_matcher(gallery: Gallery, encoder: E, matcher: M, options: SessionOptions) -> Self {
        Self {
            gallery,
            encoder,
            matcher,
            options,
            current: Vec::new(),
        }
    }

    /// Detect and label every face in `frame`, replacing the current frame state.
    ///
    /// On error the previous frame's faces are cleared, so a stale face can
    /// never be committed.
    pub fn process_frame(&mut self, frame: &RgbImage) -> Result<&[RecognizedFace], DetectError> {
        self.current.clear();

        let detections = detector::detect(&mut self.encoder, frame, self.options.scale_factor)?;
        let probes: Vec<Embedding> = detections.iter().map(|d| d.embedding.clone()).collect();
        let results = matcher::recognize(
            &self.matcher,
            &probes,
            self.gallery.entries(),
            self.options.tolerance,
        );

        self.current = detections
            .into_iter()
            .zip(results)
            .map(|(detection, result)| RecognizedFace { detection, result })
            .collect();

        Ok(&self.current)
    }

    /// Store the first unrecognized face of the current frame under `name`.
    pub fn commit_unknown(&mut self, name: &str) -> Result<Committed, CommitError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CommitError::EmptyName);
        }

        let face_index = self
            .current
            .iter()
            .position(|f| !f.identity().is_known())
            .ok_or(CommitError::NoUnknownFace)?;

        let face = &mut self.current[face_index];
        let persisted = match self.gallery.add(name, face.detection.embedding.clone()) {
            Ok(()) => true,
            Err(GalleryError::NonFinite { .. }) => return Err(CommitError::InvalidEmbedding),
            Err(e) => {
                tracing::warn!(error = %e, name, "gallery not persisted; keeping face in memory");
                false
            }
        };

        // The face now belongs to the gallery, so a second commit in the same
        // frame moves on to the next unknown face.
        face.result.identity = Identity::Known(name.to_string());
        face.result.distance = Some(0.0);
        face.result.index = Some(self.gallery.len() - 1);

        Ok(Committed {
            name: name.to_string(),
            face_index,
            persisted,
        })
    }

    /// Faces from the most recent successful [`process_frame`](Self::process_frame).
    pub fn current_faces(&self) -> &[RecognizedFace] {
        &self.current
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::testing::{face, ScriptedEncoder};
    use crate::types::FaceBox;
    use tempfile::{tempdir, TempDir};

    const ALICE: &[f32] = &[0.0, 0.0, 0.0];

    fn session_with(
        gallery: Vec<(&str, &[f32])>,
        faces: Vec<crate::encoder::EncodedFace>,
    ) -> (RecognitionSession<ScriptedEncoder>, TempDir) {
        let dir = tempdir().unwrap();
        let mut g = Gallery::empty(dir.path().join("faces.json"));
        for (name, values) in gallery {
            g.add(name, Embedding::new(values.to_vec())).unwrap();
        }
        let options = SessionOptions {
            scale_factor: 0.5,
            tolerance: 0.6,
        };
        (
            RecognitionSession::new(g, ScriptedEncoder::with_faces(faces), options),
            dir,
        )
    }

    fn labels(faces: &[RecognizedFace]) -> Vec<String> {
        faces.iter().map(|f| f.identity().to_string()).collect()
    }

    #[test]
    fn test_end_to_end_tolerance() {
        let (mut session, _dir) = session_with(
            vec![("Alice", ALICE)],
            vec![
                face(10, 20, 30, 5, &[0.4, 0.0, 0.0]),
                face(40, 60, 80, 30, &[0.9, 0.0, 0.0]),
            ],
        );

        let faces = session.process_frame(&RgbImage::new(64, 64)).unwrap();
        assert_eq!(labels(faces), vec!["Alice", "Unknown"]);
        assert_eq!(faces[0].detection.location, FaceBox::new(20, 40, 60, 10));
    }

    #[test]
    fn test_empty_gallery_all_unknown() {
        let (mut session, _dir) = session_with(
            vec![],
            vec![face(0, 2, 2, 0, ALICE), face(0, 4, 4, 2, &[1.0, 1.0, 1.0])],
        );
        let faces = session.process_frame(&RgbImage::new(8, 8)).unwrap();
        assert_eq!(labels(faces), vec!["Unknown", "Unknown"]);
    }

    #[test]
    fn test_commit_first_unknown_face() {
        let (mut session, dir) = session_with(
            vec![("Alice", ALICE)],
            vec![
                face(0, 2, 2, 0, ALICE),
                face(0, 4, 4, 2, &[5.0, 0.0, 0.0]),
                face(0, 6, 6, 4, &[9.0, 0.0, 0.0]),
            ],
        );
        session.process_frame(&RgbImage::new(8, 8)).unwrap();

        let committed = session.commit_unknown("  Bob ").unwrap();
        assert_eq!(committed.name, "Bob");
        assert_eq!(committed.face_index, 1);
        assert!(committed.persisted);
        assert_eq!(labels(session.current_faces()), vec!["Alice", "Bob", "Unknown"]);

        let reloaded = Gallery::load(dir.path().join("faces.json"));
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.entries()[1].name, "Bob");
        assert_eq!(reloaded.entries()[1].embedding.values, vec![5.0, 0.0, 0.0]);

        // Next frame recognizes the new face.
        let faces = session.process_frame(&RgbImage::new(8, 8)).unwrap();
        assert_eq!(labels(faces), vec!["Alice", "Bob", "Unknown"]);
    }

    #[test]
    fn test_commit_without_unknown_face_is_noop() {
        let (mut session, _dir) = session_with(vec![("Alice", ALICE)], vec![face(0, 2, 2, 0, ALICE)]);
        session.process_frame(&RgbImage::new(8, 8)).unwrap();

        assert_eq!(session.commit_unknown("Bob"), Err(CommitError::NoUnknownFace));
        assert_eq!(session.gallery().len(), 1);
    }

    #[test]
    fn test_commit_before_any_frame_is_noop() {
        let (mut session, _dir) = session_with(vec![], vec![]);
        assert_eq!(session.commit_unknown("Bob"), Err(CommitError::NoUnknownFace));
        assert!(session.gallery().is_empty());
    }

    #[test]
    fn test_commit_empty_name_is_noop() {
        let (mut session, _dir) = session_with(vec![], vec![face(0, 2, 2, 0, ALICE)]);
        session.process_frame(&RgbImage::new(8, 8)).unwrap();

        assert_eq!(session.commit_unknown("   "), Err(CommitError::EmptyName));
        assert!(session.gallery().is_empty());
        assert_eq!(labels(session.current_faces()), vec!["Unknown"]);
    }

    #[test]
    fn test_commit_non_finite_embedding_is_refused() {
        let (mut session, dir) = session_with(
            vec![("Alice", ALICE)],
            vec![face(0, 2, 2, 0, &[f32::NAN, 0.0, 0.0])],
        );
        let faces = session.process_frame(&RgbImage::new(8, 8)).unwrap();
        assert_eq!(labels(faces), vec!["Unknown"]);

        assert_eq!(session.commit_unknown("Bob"), Err(CommitError::InvalidEmbedding));
        assert_eq!(labels(session.current_faces()), vec!["Unknown"]);
        assert_eq!(session.gallery().len(), 1);
        assert_eq!(Gallery::load(dir.path().join("faces.json")).len(), 1);
    }

    #[test]
    fn test_failed_frame_clears_current_faces() {
        let (mut session, _dir) = session_with(vec![], vec![face(0, 2, 2, 0, ALICE)]);
        session.process_frame(&RgbImage::new(8, 8)).unwrap();
        assert_eq!(session.current_faces().len(), 1);

        session.encoder.fail = true;
        assert!(session.process_frame(&RgbImage::new(8, 8)).is_err());
        assert!(session.current_faces().is_empty());
        assert_eq!(session.commit_unknown("Bob"), Err(CommitError::NoUnknownFace));
    }
}
