//! Search session with debounced, cancellable queries
//!
//! Every debounced call takes a new search id. A call whose id is no longer
//! the latest when its delay ends, or when its scoring finishes, resolves to
//! `None` instead of a stale response.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::cache::Fetcher;
use crate::config::{OptionsUpdate, RuntimeOptions, SearchOptions};
use crate::engine::{FilterCounts, ModuleLoader};
use crate::error::Result;
use crate::federation::Federation;
use crate::outputs::SearchResponse;

#[derive(Debug)]
pub struct SearchSession {
    federation: Federation,
    current_search_id: AtomicU64,
}

impl SearchSession {
    pub fn new(federation: Federation) -> Self {
        Self {
            federation,
            current_search_id: AtomicU64::new(0),
        }
    }

    /// Load the primary index and start a session over it
    pub async fn connect(
        options: RuntimeOptions,
        fetcher: Arc<dyn Fetcher>,
        module_loader: &dyn ModuleLoader,
    ) -> Result<Self> {
        let federation = Federation::connect(options, fetcher, module_loader).await?;
        Ok(Self::new(federation))
    }

    pub fn federation(&self) -> &Federation {
        &self.federation
    }

    /// Id of the most recent debounced search
    pub fn current_search_id(&self) -> u64 {
        self.current_search_id.load(Ordering::SeqCst)
    }

    fn is_current(&self, search_id: u64) -> bool {
        self.current_search_id() == search_id
    }

    /// Search immediately. This does not supersede pending debounced searches.
    pub async fn search(&self, term: Option<&str>, options: &SearchOptions) -> Result<SearchResponse> {
        self.federation.search(term, options).await
    }

    pub async fn preload(&self, term: Option<&str>, options: &SearchOptions) -> Result<()> {
        self.federation.preload(term, options).await
    }

    /// Search after `delay`, unless a newer debounced search starts first.
    ///
    /// Chunks for `term` are preloaded while the delay runs. Returns
    /// `Ok(None)` when superseded.
    pub async fn debounced_search(
        &self,
        term: Option<&str>,
        options: &SearchOptions,
        delay: Duration,
    ) -> Result<Option<SearchResponse>> {
        let search_id = self.current_search_id.fetch_add(1, Ordering::SeqCst) + 1;

        let preload = async {
            if let Err(e) = self.federation.preload(term, options).await {
                tracing::debug!("Preload for search {} failed: {}", search_id, e);
            }
        };
        tokio::join!(preload, tokio::time::sleep(delay));

        if !self.is_current(search_id) {
            tracing::debug!("Search {} superseded before scoring", search_id);
            return Ok(None);
        }

        let response = self.federation.search(term, options).await?;

        if !self.is_current(search_id) {
            tracing::debug!("Search {} superseded during scoring", search_id);
            return Ok(None);
        }
        Ok(Some(response))
    }

    pub async fn filters(&self) -> Result<FilterCounts> {
        self.federation.filters().await
    }

    pub async fn options(&self, update: OptionsUpdate) -> Result<()> {
        self.federation.options(update).await
    }

    pub async fn merge_index(&self, base_path: &str, options: RuntimeOptions) -> Result<bool> {
        self.federation.merge_index(base_path, options).await
    }
}
