//! Live capture loop: one frame per tick, labels committed from stdin.
//!
//! Everything runs on the calling task. A tick captures, detects, recognizes
//! and renders one frame to completion before the next select, so a commit
//! from stdin never races a frame in flight. Stdin itself is read on a
//! detached thread: a blocking read cannot be cancelled, and the runtime
//! must be free to shut down while one is pending.

use crate::config::Config;
use anyhow::{Context, Result};
use knownface_core::{overlay, CommitError, FaceEncoder, RecognitionSession, RecognizedFace};
use knownface_hw::{Camera, FrameStream};
use std::io::BufRead;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Default)]
struct LoopStats {
    processed: u64,
    failed: u64,
    last_labels: Option<String>,
}

/// Run until Ctrl-C.
pub async fn run_loop<E: FaceEncoder>(
    camera: &Camera,
    session: &mut RecognitionSession<E>,
    config: &Config,
) -> Result<()> {
    let mut stream = camera.stream().context("starting capture stream")?;

    if config.warmup_frames > 0 {
        tracing::info!(count = config.warmup_frames, "discarding warmup frames");
        stream.discard(config.warmup_frames);
    }

    // Delay keeps a fixed gap between frames instead of bursting to catch up.
    let mut ticker = interval(Duration::from_millis(config.tick_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut lines = spawn_stdin_reader()?;
    let mut stdin_open = true;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut stats = LoopStats::default();
    println!("Type a name and press Enter to save the first unknown face. Ctrl-C quits.");

    loop {
        tokio::select! {
            res = &mut shutdown => {
                res.context("waiting for ctrl-c")?;
                break;
            }
            line = lines.recv(), if stdin_open => match line {
                Some(name) => handle_commit(session, &name),
                None => {
                    stdin_open = false;
                    tracing::info!("stdin closed; labelling disabled");
                }
            },
            _ = ticker.tick() => process_tick(&mut stream, session, config, &mut stats),
        }
    }

    tracing::info!(
        processed = stats.processed,
        failed = stats.failed,
        gallery = session.gallery().len(),
        "capture loop stopped"
    );
    Ok(())
}

/// Forward stdin lines to the capture loop from a dedicated thread.
///
/// The thread is never joined. It exits on EOF, on a read error, or when the
/// receiver is gone; at process exit it is simply abandoned mid-read.
fn spawn_stdin_reader() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::Builder::new()
        .name("knownface-stdin".into())
        .spawn(move || forward_lines(std::io::stdin().lock(), &tx))
        .context("spawning stdin reader")?;
    Ok(rx)
}

fn forward_lines<R: BufRead>(reader: R, tx: &mpsc::Sender<String>) {
    for line in reader.lines() {
        match line {
            Ok(line) => {
                if tx.blocking_send(line).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "reading stdin failed");
                return;
            }
        }
    }
}

fn process_tick<E: FaceEncoder>(
    stream: &mut FrameStream<'_>,
    session: &mut RecognitionSession<E>,
    config: &Config,
    stats: &mut LoopStats,
) {
    let frame = match stream.next_frame() {
        Ok(frame) => frame,
        Err(e) => {
            stats.failed += 1;
            tracing::warn!(error = %e, "frame capture failed");
            return;
        }
    };

    if frame.is_dark {
        tracing::trace!(seq = frame.sequence, brightness = frame.avg_brightness(), "dark frame");
    }

    let faces = match session.process_frame(&frame.image) {
        Ok(faces) => faces,
        Err(e) => {
            stats.failed += 1;
            tracing::warn!(error = %e, seq = frame.sequence, "detection failed; skipping frame");
            return;
        }
    };
    stats.processed += 1;

    let labels = describe(faces);
    tracing::debug!(seq = frame.sequence, faces = faces.len(), %labels, "frame processed");
    if stats.last_labels.as_deref() != Some(labels.as_str()) {
        if !faces.is_empty() {
            tracing::info!(%labels, "faces in view");
        }
        stats.last_labels = Some(labels);
    }

    if let Some(path) = &config.preview_path {
        let mut image = frame.image;
        overlay::annotate(&mut image, faces);
        if let Err(e) = image.save(path) {
            tracing::warn!(error = %e, path = %path.display(), "failed to write preview");
        }
    }
}

fn handle_commit<E: FaceEncoder>(session: &mut RecognitionSession<E>, name: &str) {
    match session.commit_unknown(name) {
        Ok(committed) => {
            tracing::info!(
                name = %committed.name,
                face = committed.face_index,
                persisted = committed.persisted,
                gallery = session.gallery().len(),
                "face saved"
            );
            if committed.persisted {
                println!("Saved face as {}", committed.name);
            } else {
                println!(
                    "Saved face as {} for this session only; the gallery file could not be written",
                    committed.name
                );
            }
        }
        Err(CommitError::EmptyName) => tracing::warn!("enter a name before saving a face"),
        Err(CommitError::NoUnknownFace) => tracing::warn!("no unknown face in view to save"),
        Err(CommitError::InvalidEmbedding) => {
            tracing::warn!("encoder returned an unusable embedding; face not saved")
        }
    }
}

/// Comma-separated labels in detection order, e.g. `Alice, Unknown`.
pub fn describe(faces: &[RecognizedFace]) -> String {
    faces
        .iter()
        .map(|f| f.identity().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
