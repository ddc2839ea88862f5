//! Sequenced access to a scoring module
//!
//! Each index instance owns one [`EngineBridge`]. The bridge holds that
//! instance's engine handle behind a mutex so exactly one call into the engine
//! is outstanding at a time, and threads the handle each call returns into the
//! next one. Instances that share a scoring module also share its mutex.

use std::sync::Arc;
use tokio::sync::{Mutex, watch};

use crate::engine::module::{EngineHandle, ScoringModule};
use crate::engine::raw::{self, FilterCounts, RawSearch};
use crate::error::{Result, RuntimeError};

/// A scoring module shared between instances
pub type SharedModule = Arc<Mutex<Box<dyn ScoringModule>>>;

pub struct EngineBridge {
    module: SharedModule,
    handle: Mutex<Option<EngineHandle>>,
    ready: watch::Sender<bool>,
    label: String,
}

impl std::fmt::Debug for EngineBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBridge")
            .field("label", &self.label)
            .field("ready", &*self.ready.borrow())
            .finish_non_exhaustive()
    }
}

impl EngineBridge {
    /// Create an uninitialised bridge. `label` names the instance in logs.
    pub fn new(module: SharedModule, label: impl Into<String>) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            module,
            handle: Mutex::new(None),
            ready,
            label: label.into(),
        }
    }

    pub fn module(&self) -> SharedModule {
        self.module.clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Create the engine state from metadata and mark the bridge ready
    pub async fn init(&self, language: &str, metadata: &[u8]) -> Result<()> {
        let mut slot = self.handle.lock().await;
        let handle = self.module.lock().await.init(language, metadata);
        if handle.is_null() {
            return Err(RuntimeError::EngineUnavailable(format!(
                "{} returned a null handle from init",
                self.label
            )));
        }

        tracing::debug!("Engine for {} initialised at {}", self.label, handle);
        *slot = Some(handle);
        self.ready.send_replace(true);
        Ok(())
    }

    /// Resolves once [`EngineBridge::init`] has succeeded
    pub async fn wait_until_ready(&self) -> Result<()> {
        let mut receiver = self.ready.subscribe();
        receiver
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| RuntimeError::EngineUnavailable(format!("{} was dropped", self.label)))
    }

    /// Run one call against the current handle and store the handle it returns
    async fn call<R>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut dyn ScoringModule, EngineHandle) -> (EngineHandle, R),
    ) -> Result<R> {
        self.wait_until_ready().await?;

        let mut slot = self.handle.lock().await;
        let handle = slot.filter(|h| !h.is_null()).ok_or_else(|| {
            RuntimeError::EngineUnavailable(format!("{} has no engine handle", self.label))
        })?;

        let mut module = self.module.lock().await;
        let (next, output) = f(&mut **module, handle);
        *slot = Some(next);

        if next.is_null() {
            return Err(RuntimeError::EngineUnavailable(format!(
                "{} returned a null handle from {}",
                self.label, operation
            )));
        }
        Ok(output)
    }

    pub async fn load_index_chunk(&self, chunk: &[u8]) -> Result<()> {
        self.call("load_index_chunk", |m, h| (m.load_index_chunk(h, chunk), ()))
            .await
    }

    pub async fn load_filter_chunk(&self, chunk: &[u8]) -> Result<()> {
        self.call("load_filter_chunk", |m, h| (m.load_filter_chunk(h, chunk), ()))
            .await
    }

    pub async fn add_synthetic_filter(&self, filter: &str) -> Result<()> {
        self.call("add_synthetic_filter", |m, h| {
            (m.add_synthetic_filter(h, filter), ())
        })
        .await
    }

    pub async fn set_ranking_weights(&self, weights: &str) -> Result<()> {
        self.call("set_ranking_weights", |m, h| {
            (m.set_ranking_weights(h, weights), ())
        })
        .await
    }

    /// Index chunk hashes needed for `term`
    pub async fn request_indexes(&self, term: &str) -> Result<Vec<String>> {
        let raw = self
            .call("request_indexes", |m, h| m.request_indexes(h, term))
            .await?;
        Ok(raw::parse_chunk_list(&raw))
    }

    /// Filter chunk hashes needed for a JSON filter tree
    pub async fn request_filter_indexes(&self, filters: &str) -> Result<Vec<String>> {
        let raw = self
            .call("request_filter_indexes", |m, h| {
                m.request_filter_indexes(h, filters)
            })
            .await?;
        Ok(raw::parse_chunk_list(&raw))
    }

    pub async fn request_all_filter_indexes(&self) -> Result<Vec<String>> {
        let raw = self
            .call("request_all_filter_indexes", |m, h| {
                m.request_all_filter_indexes(h)
            })
            .await?;
        Ok(raw::parse_chunk_list(&raw))
    }

    pub async fn filters(&self) -> Result<FilterCounts> {
        let raw = self.call("filters", |m, h| m.filters(h)).await?;
        Ok(raw::parse_filters(&raw))
    }

    pub async fn search(
        &self,
        term: &str,
        filters: &str,
        sort: &str,
        exact: bool,
    ) -> Result<RawSearch> {
        let raw = self
            .call("search", |m, h| m.search(h, term, filters, sort, exact))
            .await?;
        Ok(raw::parse_search(&raw))
    }
}
