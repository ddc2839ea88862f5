//! Type definitions for artifacts in the index layout
//!
//! Artifacts are addressed by a kind and a key (usually a content hash). The
//! kind decides the directory and file extension under the base path.

use anyhow::{Result, bail};
use std::fmt;

use crate::cache::constants::*;

/// Validate that an artifact key is safe to splice into a URL or path
fn validate_artifact_key(key: &str) -> Result<()> {
    if key.is_empty() {
        bail!("Artifact key cannot be empty");
    }

    if key.contains("..") || key.contains('/') || key.contains('\\') {
        bail!(
            "Invalid artifact key '{}': contains path separators or traversal sequences",
            key
        );
    }

    if !key
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        bail!(
            "Invalid artifact key '{}': only alphanumeric, underscore, and dash are allowed",
            key
        );
    }

    Ok(())
}

/// The kinds of file an index is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Metadata,
    ScoringModule,
    IndexChunk,
    FilterChunk,
    Fragment,
}

impl ArtifactKind {
    /// Human readable name used in logs
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::Metadata => "metadata",
            ArtifactKind::ScoringModule => "scoring module",
            ArtifactKind::IndexChunk => "index chunk",
            ArtifactKind::FilterChunk => "filter chunk",
            ArtifactKind::Fragment => "fragment",
        }
    }
}

/// A validated reference to a single artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    kind: ArtifactKind,
    key: String,
}

impl ArtifactRef {
    pub fn new(kind: ArtifactKind, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        validate_artifact_key(&key)?;
        Ok(Self { kind, key })
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Path of the artifact relative to the index base path
    pub fn relative_path(&self) -> String {
        let key = &self.key;
        match self.kind {
            ArtifactKind::Metadata => format!("{META_PREFIX}{key}{META_EXTENSION}"),
            ArtifactKind::ScoringModule => format!("{MODULE_PREFIX}{key}{MODULE_EXTENSION}"),
            ArtifactKind::IndexChunk => format!("{INDEX_DIR}/{key}{INDEX_EXTENSION}"),
            ArtifactKind::FilterChunk => format!("{FILTER_DIR}/{key}{FILTER_EXTENSION}"),
            ArtifactKind::Fragment => format!("{FRAGMENT_DIR}/{key}{FRAGMENT_EXTENSION}"),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.label(), self.key)
    }
}
