use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use knownface_core::{Gallery, ProcessEncoder, RecognitionSession};
use knownface_hw::Camera;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod capture;
mod config;
mod still;

use config::Config;

#[derive(Parser)]
#[command(
    name = "knownface",
    about = "Recognize faces from a webcam and label new ones",
    after_help = "The encoder helper defaults to `python3 face_recognition_helper.py`, looked up in \
                  <prefix>/share/knownface/ next to an installed binary, then in the source tree's \
                  contrib/encoder/. Set KNOWNFACE_ENCODER_CMD or encoder_command in config.toml to \
                  use another helper."
)]
struct Cli {
    /// Gallery file (overrides configuration)
    #[arg(long, global = true)]
    gallery: Option<PathBuf>,
    /// Maximum embedding distance for a match; lower is stricter
    #[arg(long, global = true)]
    tolerance: Option<f32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the camera; type a name on stdin to save the first unknown face
    Run,
    /// Label the faces in an image file
    Identify {
        image: PathBuf,
        /// Write a copy of the image with face boxes drawn on it
        #[arg(long)]
        annotate: Option<PathBuf>,
    },
    /// Save the first unknown face in an image file
    Enroll {
        image: PathBuf,
        /// Name to save the face under
        #[arg(short, long)]
        name: String,
    },
    /// List the names in the gallery
    List,
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(path) = cli.gallery {
        config.gallery_path = path;
    }
    if let Some(tolerance) = cli.tolerance {
        config.tolerance = tolerance;
    }

    match cli.command {
        Commands::Run => {
            // Camera first: without it there is nothing to do.
            let camera = Camera::open(&config.camera_device)
                .with_context(|| format!("cannot open camera {}", config.camera_device))?;
            tracing::info!(
                device = %config.camera_device,
                width = camera.width,
                height = camera.height,
                format = ?camera.pixel_format(),
                "camera opened"
            );

            let mut session = open_session(&config)?;
            capture::run_loop(&camera, &mut session, &config).await?;
        }
        Commands::Identify { image, annotate } => {
            let mut session = open_session(&config)?;
            let faces = still::identify(&mut session, &image, annotate.as_deref())?;
            if faces.is_empty() {
                println!("No faces found");
            }
            for face in &faces {
                let b = face.detection.location;
                match face.result.distance {
                    Some(d) => println!(
                        "{} at top={} right={} bottom={} left={} (distance {d:.3})",
                        face.identity(), b.top, b.right, b.bottom, b.left
                    ),
                    None => println!(
                        "{} at top={} right={} bottom={} left={}",
                        face.identity(), b.top, b.right, b.bottom, b.left
                    ),
                }
            }
        }
        Commands::Enroll { image, name } => {
            let mut session = open_session(&config)?;
            still::enroll(&mut session, &image, &name)?;
            println!("Saved face as {}", name.trim());
        }
        Commands::List => {
            let gallery = Gallery::load(&config.gallery_path);
            if gallery.is_empty() {
                println!("No faces saved in {}", gallery.path().display());
            }
            for (name, count) in gallery.names_with_counts() {
                println!("{name}\t{count}");
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for dev in devices {
                println!("{}\t{} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

/// Load the gallery and start the encoder helper.
fn open_session(config: &Config) -> Result<RecognitionSession<ProcessEncoder>> {
    if !(config.scale_factor > 0.0 && config.scale_factor <= 1.0) {
        bail!("scale_factor must be in (0, 1], got {}", config.scale_factor);
    }
    let gallery = Gallery::load(&config.gallery_path);
    let encoder = ProcessEncoder::spawn(&config.encoder_command)
        .with_context(|| format!("cannot start encoder {:?}", config.encoder_command))?;
    Ok(RecognitionSession::new(gallery, encoder, config.session_options()))
}
