//! The external face detection + embedding capability.
//!
//! knownface does not locate faces or compute embeddings itself. A
//! [`FaceEncoder`] does both; [`ProcessEncoder`] is the stock implementation,
//! which drives a helper process (for example a Python script around the
//! `face_recognition` package) over a line-delimited pipe protocol:
//!
//! ```text
//! -> {"width":W,"height":H}\n<W*H*3 raw RGB bytes>
//! <- {"faces":[{"top":..,"right":..,"bottom":..,"left":..,"embedding":[..]}]}\n
//! <- {"error":"message"}\n
//! ```

use crate::types::{Embedding, FaceBox};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("encoder command is empty")]
    EmptyCommand,
    #[error("failed to spawn encoder {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("encoder pipe: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoder exited before responding")]
    Closed,
    #[error("malformed encoder response: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("encoder failed: {0}")]
    Remote(String),
}

/// One face as reported by the encoder, in the coordinates of the image it was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedFace {
    #[serde(flatten)]
    pub location: FaceBox,
    pub embedding: Embedding,
}

/// Locates faces in an RGB image and computes one embedding per face.
pub trait FaceEncoder {
    /// Faces in `image`, in whatever order the implementation produces them.
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<EncodedFace>, EncoderError>;
}

impl<E: FaceEncoder + ?Sized> FaceEncoder for Box<E> {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<EncodedFace>, EncoderError> {
        (**self).encode(image)
    }
}

#[derive(Serialize)]
struct RequestHeader {
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Response {
    Faces { faces: Vec<EncodedFace> },
    Error { error: String },
}

/// A long-lived encoder helper process.
pub struct ProcessEncoder {
    program: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessEncoder {
    /// Spawn `command[0]` with the remaining elements as arguments.
    pub fn spawn(command: &[String]) -> Result<Self, EncoderError> {
        let (program, args) = command.split_first().ok_or(EncoderError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| EncoderError::Spawn {
                program: program.clone(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(EncoderError::Closed);
        };

        tracing::info!(program = %program, args = ?args, pid = child.id(), "spawned encoder helper");

        Ok(Self {
            program: program.clone(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }
}

impl FaceEncoder for ProcessEncoder {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<EncodedFace>, EncoderError> {
        let header = serde_json::to_string(&RequestHeader {
            width: image.width(),
            height: image.height(),
        })?;
        writeln!(self.stdin, "{header}")?;
        self.stdin.write_all(image.as_raw())?;
        self.stdin.flush()?;

        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(EncoderError::Closed);
        }

        let response: Response = serde_json::from_str(&line)?;
        match response {
            Response::Faces { faces } => {
                tracing::trace!(program = %self.program, faces = faces.len(), "encoder response");
                Ok(faces)
            }
            Response::Error { error } => Err(EncoderError::Remote(error)),
        }
    }
}

impl Drop for ProcessEncoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[test]
    fn test_empty_command() {
        assert!(matches!(ProcessEncoder::spawn(&[]), Err(EncoderError::EmptyCommand)));
    }

    #[test]
    fn test_spawn_missing_program() {
        let cmd = vec!["/nonexistent/knownface-encoder".to_string()];
        assert!(matches!(ProcessEncoder::spawn(&cmd), Err(EncoderError::Spawn { .. })));
    }

    #[test]
    fn test_faces_response() {
        // 2x2 RGB image = 12 payload bytes.
        let script = r#"read header; head -c 12 > /dev/null; echo '{"faces":[{"top":1,"right":2,"bottom":3,"left":0,"embedding":[0.5,-0.5]}]}'"#;
        let mut encoder = ProcessEncoder::spawn(&sh(script)).unwrap();
        let faces = encoder.encode(&RgbImage::new(2, 2)).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].location, FaceBox::new(1, 2, 3, 0));
        assert_eq!(faces[0].embedding.values, vec![0.5, -0.5]);
    }

    #[test]
    fn test_error_response() {
        let script = r#"read header; head -c 12 > /dev/null; echo '{"error":"bad frame"}'"#;
        let mut encoder = ProcessEncoder::spawn(&sh(script)).unwrap();
        match encoder.encode(&RgbImage::new(2, 2)) {
            Err(EncoderError::Remote(msg)) => assert_eq!(msg, "bad frame"),
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_response() {
        let script = r#"read header; head -c 12 > /dev/null; echo 'not json'"#;
        let mut encoder = ProcessEncoder::spawn(&sh(script)).unwrap();
        assert!(matches!(
            encoder.encode(&RgbImage::new(2, 2)),
            Err(EncoderError::Protocol(_))
        ));
    }

    #[test]
    fn test_helper_exits_early() {
        let mut encoder = ProcessEncoder::spawn(&sh("exit 0")).unwrap();
        // Either the write hits a closed pipe or the read sees EOF.
        assert!(encoder.encode(&RgbImage::new(2, 2)).is_err());
    }
}
