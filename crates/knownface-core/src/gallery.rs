//! Face gallery store: named embeddings mirrored to a JSON file.
//!
//! The file holds two parallel arrays, `encodings` and `names`, where index
//! `i` of one belongs to index `i` of the other. Loading never fails: a
//! missing, unreadable or malformed file yields an empty gallery.

use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to write gallery {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize gallery: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("embedding for {name:?} has a non-finite component")]
    NonFinite { name: String },
}

/// A named face embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub name: String,
    pub embedding: Embedding,
}

/// On-disk layout.
#[derive(Serialize, Deserialize)]
struct GalleryFile {
    encodings: Vec<Embedding>,
    names: Vec<String>,
}

/// Ordered collection of named embeddings, persisted after every addition.
#[derive(Debug)]
pub struct Gallery {
    path: PathBuf,
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    /// An empty gallery that will persist to `path`. Nothing is written until the first save.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Load the gallery at `path`, falling back to empty on any failure.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no gallery file yet; starting empty");
                return Self::empty(path);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read gallery; starting empty");
                return Self::empty(path);
            }
        };

        match parse_gallery(&data) {
            Ok(entries) => {
                tracing::info!(path = %path.display(), entries = entries.len(), "loaded gallery");
                Self { path, entries }
            }
            Err(reason) => {
                tracing::warn!(path = %path.display(), %reason, "gallery file unusable; starting empty");
                Self::empty(path)
            }
        }
    }

    /// Write every entry to the gallery file.
    ///
    /// The file is replaced by renaming a sibling temp file over it, so readers
    /// see either the old or the new gallery.
    pub fn save(&self) -> Result<(), GalleryError> {
        let file = GalleryFile {
            encodings: self.entries.iter().map(|e| e.embedding.clone()).collect(),
            names: self.entries.iter().map(|e| e.name.clone()).collect(),
        };
        let json = serde_json::to_vec(&file)?;

        let write_err = |source: std::io::Error| GalleryError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let tmp = tmp_path(&self.path);
        std::fs::write(&tmp, &json).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;

        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "gallery saved");
        Ok(())
    }

    /// Append an entry and persist the whole gallery.
    ///
    /// Embeddings with NaN or infinite components are refused and nothing is
    /// stored; JSON has no encoding for them. Otherwise the entry stays in
    /// memory even if persisting fails.
    pub fn add(&mut self, name: impl Into<String>, embedding: Embedding) -> Result<(), GalleryError> {
        let name = name.into();
        if !embedding.is_finite() {
            return Err(GalleryError::NonFinite { name });
        }
        tracing::info!(name = %name, dim = embedding.dim(), "adding face to gallery");
        self.entries.push(GalleryEntry { name, embedding });
        self.save()
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Distinct names with how many embeddings each has, in first-seen order.
    pub fn names_with_counts(&self) -> Vec<(&str, usize)> {
        let mut out: Vec<(&str, usize)> = Vec::new();
        for entry in &self.entries {
            match out.iter_mut().find(|(n, _)| *n == entry.name) {
                Some((_, count)) => *count += 1,
                None => out.push((&entry.name, 1)),
            }
        }
        out
    }
}

fn parse_gallery(data: &[u8]) -> Result<Vec<GalleryEntry>, String> {
    let file: GalleryFile = serde_json::from_slice(data).map_err(|e| e.to_string())?;
    if file.encodings.len() != file.names.len() {
        return Err(format!(
            "{} encodings but {} names",
            file.encodings.len(),
            file.names.len()
        ));
    }
    Ok(file
        .names
        .into_iter()
        .zip(file.encodings)
        .map(|(name, embedding)| GalleryEntry { name, embedding })
        .collect())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
