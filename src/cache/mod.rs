//! # Cache Module
//!
//! Fetching and memoising index artifacts.
//!
//! ## Key Components
//!
//! - [`constants`] - Artifact file names and option defaults
//! - [`fetcher`] - Byte sources (HTTP, filesystem, in-memory)
//! - [`loader`] - Location building, decompression and in-flight de-duplication
//! - [`types`] - Validated artifact references

pub mod constants;
pub mod fetcher;
pub mod loader;
pub mod types;

pub use fetcher::{Fetcher, FsFetcher, HttpFetcher, MemoryFetcher};
pub use loader::{ArtifactCache, ArtifactLoader};
pub use types::{ArtifactKind, ArtifactRef};
