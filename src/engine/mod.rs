//! # Engine Module
//!
//! Bridge to the external scoring module.
//!
//! - [`module`] - The scoring module call surface and its handle type
//! - [`bridge`] - Per-instance sequencing of engine calls
//! - [`raw`] - Parsers for the engine's string payloads

pub mod bridge;
pub mod module;
pub mod raw;

pub use bridge::{EngineBridge, SharedModule};
pub use module::{EngineHandle, ModuleLoader, ScoringModule};
pub use raw::{FilterCounts, RawResult, RawSearch};
