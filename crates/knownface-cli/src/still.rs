//! Commands that work on a single image file instead of the camera.

use anyhow::{bail, Context, Result};
use image::RgbImage;
use knownface_core::{overlay, FaceEncoder, RecognitionSession, RecognizedFace};
use std::path::Path;

fn open_rgb(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)
        .with_context(|| format!("opening image {}", path.display()))?
        .to_rgb8())
}

/// Label every face in `image_path`, optionally writing an annotated copy.
pub fn identify<E: FaceEncoder>(
    session: &mut RecognitionSession<E>,
    image_path: &Path,
    annotate: Option<&Path>,
) -> Result<Vec<RecognizedFace>> {
    let mut image = open_rgb(image_path)?;
    let faces = session
        .process_frame(&image)
        .with_context(|| format!("detecting faces in {}", image_path.display()))?
        .to_vec();

    if let Some(out) = annotate {
        overlay::annotate(&mut image, &faces);
        image
            .save(out)
            .with_context(|| format!("writing {}", out.display()))?;
    }
    Ok(faces)
}

/// Save the first unknown face in `image_path` under `name`.
pub fn enroll<E: FaceEncoder>(
    session: &mut RecognitionSession<E>,
    image_path: &Path,
    name: &str,
) -> Result<()> {
    identify(session, image_path, None)?;
    let committed = session
        .commit_unknown(name)
        .with_context(|| format!("nothing saved from {}", image_path.display()))?;
    if !committed.persisted {
        bail!(
            "could not write gallery {}",
            session.gallery().path().display()
        );
    }
    tracing::info!(name = %committed.name, face = committed.face_index, "enrolled face");
    Ok(())
}
