//! Error taxonomy for the search runtime
//!
//! Artifact-level failures (`CorruptArtifact`, `FetchFailure`) are normally logged
//! and swallowed by the caller, so search degrades instead of failing. Engine and
//! language-resolution failures propagate because no partial result is possible.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    /// Decompressed artifact is missing the `pagefind_dcd` signature
    #[error("artifact {artifact} is corrupt: {reason}")]
    CorruptArtifact { artifact: String, reason: String },

    /// Network or filesystem error while loading an artifact
    #[error("failed to fetch {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    /// The scoring engine handle is null after initialization
    #[error("scoring engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The index was built by a different version than this runtime
    #[error("index version {index} does not match runtime version {runtime}")]
    VersionMismatch { runtime: String, index: String },

    /// Neither the requested language nor any fallback exists in the manifest
    #[error("no language indexes found (requested {requested})")]
    NoLanguageIndex { requested: String },

    /// The entry manifest could not be loaded or parsed
    #[error("failed to load index metadata from {base_path}: {reason}")]
    Manifest { base_path: String, reason: String },

    /// The per-language scoring module could not be loaded
    #[error("failed to load scoring module {module}: {reason}")]
    ModuleLoad { module: String, reason: String },

    /// A content fragment could not be decoded
    #[error("failed to decode fragment {hash}: {reason}")]
    Fragment { hash: String, reason: String },

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

impl RuntimeError {
    /// Whether the error leaves the runtime usable with degraded results
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            RuntimeError::CorruptArtifact { .. }
                | RuntimeError::FetchFailure { .. }
                | RuntimeError::VersionMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
