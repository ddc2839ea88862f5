//! Client runtime for sharded, compressed Pagefind search indexes.
//!
//! A [`SearchSession`] loads an index's entry manifest, picks a language,
//! drives an external [`ScoringModule`] through a sequenced handle, fetches
//! the index chunks each query needs, and renders highlighted excerpts from
//! page fragments on demand. Further indexes can be merged into a session and
//! are searched alongside the primary one.

pub mod cache;
pub mod codec;
pub mod config;
pub mod doctor;
pub mod engine;
pub mod error;
pub mod excerpt;
pub mod federation;
pub mod fragment;
pub mod instance;
pub mod manifest;
pub mod outputs;
pub mod query;
pub mod session;

pub use cache::{Fetcher, FsFetcher, HttpFetcher, MemoryFetcher};
pub use config::{OptionsUpdate, RankingWeights, RuntimeOptions, SearchOptions, SortSpec};
pub use engine::{EngineHandle, ModuleLoader, ScoringModule};
pub use error::{Result, RuntimeError};
pub use federation::Federation;
pub use outputs::{ResultData, SearchResponse, SearchResult, SubResult};
pub use session::SearchSession;
