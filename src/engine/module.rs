//! Call surface of the external scoring module
//!
//! The scoring module owns the inverted index and the ranking math. It is
//! driven through an integer handle that most calls replace, so the caller has
//! to thread each returned handle into the next call.

use std::fmt;

/// Opaque engine state pointer. Zero means "no engine".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(u32);

impl EngineHandle {
    pub const NULL: EngineHandle = EngineHandle(0);

    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A loaded scoring module.
///
/// Calls that change engine state return the handle to use from then on.
/// Query calls return it together with their string payload. Payload formats
/// are described in [`crate::engine::raw`].
pub trait ScoringModule: Send {
    /// Create engine state from decompressed metadata
    fn init(&mut self, language: &str, metadata: &[u8]) -> EngineHandle;

    fn load_index_chunk(&mut self, handle: EngineHandle, chunk: &[u8]) -> EngineHandle;

    fn load_filter_chunk(&mut self, handle: EngineHandle, chunk: &[u8]) -> EngineHandle;

    /// Register filter values that every page reports without an index lookup.
    /// `filter` is a JSON object of filter name to value or list of values.
    fn add_synthetic_filter(&mut self, handle: EngineHandle, filter: &str) -> EngineHandle;

    /// `weights` is a JSON object of ranking factor overrides
    fn set_ranking_weights(&mut self, handle: EngineHandle, weights: &str) -> EngineHandle;

    /// Index chunk hashes needed to score `term`
    fn request_indexes(&mut self, handle: EngineHandle, term: &str) -> (EngineHandle, String);

    /// Filter chunk hashes needed to apply `filters` (a JSON filter tree)
    fn request_filter_indexes(
        &mut self,
        handle: EngineHandle,
        filters: &str,
    ) -> (EngineHandle, String);

    fn request_all_filter_indexes(&mut self, handle: EngineHandle) -> (EngineHandle, String);

    /// Value counts for every loaded filter
    fn filters(&mut self, handle: EngineHandle) -> (EngineHandle, String);

    fn search(
        &mut self,
        handle: EngineHandle,
        term: &str,
        filters: &str,
        sort: &str,
        exact: bool,
    ) -> (EngineHandle, String);
}

/// Creates a [`ScoringModule`] from the bytes of a `wasm.<lang>.pagefind` artifact
pub trait ModuleLoader: Send + Sync {
    fn instantiate(&self, language: &str, module: &[u8]) -> anyhow::Result<Box<dyn ScoringModule>>;
}
