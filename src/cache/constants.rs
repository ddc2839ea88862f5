//! Constants for artifact names and the index directory layout

/// Entry manifest at the root of every index
pub const ENTRY_MANIFEST_FILE: &str = "pagefind-entry.json";

/// Directory names
pub const INDEX_DIR: &str = "index";
pub const FILTER_DIR: &str = "filter";
pub const FRAGMENT_DIR: &str = "fragment";

/// File name parts
pub const META_PREFIX: &str = "pagefind.";
pub const META_EXTENSION: &str = ".pf_meta";
pub const MODULE_PREFIX: &str = "wasm.";
pub const MODULE_EXTENSION: &str = ".pagefind";
pub const INDEX_EXTENSION: &str = ".pf_index";
pub const FILTER_EXTENSION: &str = ".pf_filter";
pub const FRAGMENT_EXTENSION: &str = ".pf_fragment";

/// Module name used when a language has no dedicated scoring module
pub const UNKNOWN_MODULE_LANGUAGE: &str = "unknown";

/// Defaults for runtime options
pub const DEFAULT_BASE_PATH: &str = "/pagefind/";
pub const DEFAULT_BASE_URL: &str = "/";
pub const DEFAULT_EXCERPT_LENGTH: usize = 30;
pub const DEFAULT_INDEX_WEIGHT: f64 = 1.0;

/// Version of the index format this runtime understands
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");

/// HTTP client settings
pub const MAX_REDIRECTS: usize = 10;
