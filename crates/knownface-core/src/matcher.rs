//! Nearest-neighbour matching of probe embeddings against the gallery.

use crate::gallery::GalleryEntry;
use crate::types::{Embedding, Identity, MatchResult};

/// Default match tolerance, the distance threshold face_recognition models are tuned for.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Strategy for comparing a probe embedding against a gallery of named faces.
pub trait Matcher {
    /// Distance between two embeddings, `None` if they are not comparable.
    fn distance(&self, a: &Embedding, b: &Embedding) -> Option<f32>;

    /// Whether two embeddings at `distance` are the same identity under `tolerance`.
    fn is_match(&self, distance: f32, tolerance: f32) -> bool;

    /// Find the nearest gallery entry and decide whether it is a match.
    ///
    /// Ties on the minimum distance resolve to the lowest index.
    fn compare(&self, probe: &Embedding, gallery: &[GalleryEntry], tolerance: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let Some(d) = self.distance(probe, &entry.embedding) else {
                tracing::debug!(
                    index = i,
                    probe_dim = probe.dim(),
                    entry_dim = entry.embedding.dim(),
                    "skipping gallery entry with mismatched dimension"
                );
                continue;
            };
            if d.is_nan() {
                continue;
            }
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((i, d)),
            }
        }

        match best {
            Some((idx, d)) if self.is_match(d, tolerance) => MatchResult {
                identity: Identity::Known(gallery[idx].name.clone()),
                distance: Some(d),
                index: Some(idx),
            },
            Some((idx, d)) => MatchResult {
                identity: Identity::Unknown,
                distance: Some(d),
                index: Some(idx),
            },
            None => MatchResult::unknown(),
        }
    }
}

/// Euclidean distance matcher; a match is any distance at or below the tolerance.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn distance(&self, a: &Embedding, b: &Embedding) -> Option<f32> {
        a.euclidean_distance(b)
    }

    fn is_match(&self, distance: f32, tolerance: f32) -> bool {
        distance <= tolerance
    }
}

/// Label every probe embedding against the gallery.
///
/// Output order follows `probes`. An empty gallery labels everything [`Identity::Unknown`].
pub fn recognize<M: Matcher + ?Sized>(
    matcher: &M,
    probes: &[Embedding],
    gallery: &[GalleryEntry],
    tolerance: f32,
) -> Vec<MatchResult> {
    probes
        .iter()
        .map(|probe| matcher.compare(probe, gallery, tolerance))
        .collect()
}
