//! Federation of independently built indexes
//!
//! A [`Federation`] owns the primary instance and any indexes merged into it.
//! Calls fan out to every instance concurrently and their answers are merged
//! into one response.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::cache::Fetcher;
use crate::config::{OptionsUpdate, RuntimeOptions, SearchOptions};
use crate::engine::{FilterCounts, ModuleLoader};
use crate::error::Result;
use crate::instance::{Instance, ModuleSource};
use crate::outputs::SearchResponse;

/// Add every count in `from` to the same filter value in `into`
pub fn merge_filter_counts(into: &mut FilterCounts, from: &FilterCounts) {
    for (filter, values) in from {
        let merged = into.entry(filter.clone()).or_default();
        for (value, count) in values {
            *merged.entry(value.clone()).or_default() += count;
        }
    }
}

/// Sum a list of filter counts
pub fn merge_all_filters<'a>(all: impl IntoIterator<Item = &'a FilterCounts>) -> FilterCounts {
    let mut merged = FilterCounts::new();
    for counts in all {
        merge_filter_counts(&mut merged, counts);
    }
    merged
}

pub struct Federation {
    primary: Arc<Instance>,
    instances: RwLock<Vec<Arc<Instance>>>,
    fetcher: Arc<dyn Fetcher>,
}

impl std::fmt::Debug for Federation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Federation")
            .field("primary", &self.primary)
            .finish_non_exhaustive()
    }
}

impl Federation {
    /// Load the primary index and its scoring module
    pub async fn connect(
        options: RuntimeOptions,
        fetcher: Arc<dyn Fetcher>,
        module_loader: &dyn ModuleLoader,
    ) -> Result<Self> {
        let primary =
            Instance::connect(options, fetcher.clone(), ModuleSource::Load(module_loader)).await?;
        Ok(Self {
            instances: RwLock::new(vec![primary.clone()]),
            primary,
            fetcher,
        })
    }

    pub fn primary(&self) -> &Arc<Instance> {
        &self.primary
    }

    /// Every instance, primary first, in merge order
    pub async fn instances(&self) -> Vec<Arc<Instance>> {
        self.instances.read().await.clone()
    }

    /// Add the index at `base_path` to every future call.
    ///
    /// Returns `false` without loading anything when `base_path` is a prefix
    /// of an instance already present, which usually means the same index was
    /// registered twice. The merged index uses the primary's language unless
    /// `options` names one.
    pub async fn merge_index(&self, base_path: &str, options: RuntimeOptions) -> Result<bool> {
        {
            let instances = self.instances.read().await;
            if let Some(existing) = instances
                .iter()
                .find(|i| i.base_path().starts_with(base_path))
            {
                tracing::warn!(
                    "Skipping merge of {} that appears to be the same as the index at {}",
                    base_path,
                    existing.base_path()
                );
                return Ok(false);
            }
        }

        let options = RuntimeOptions {
            base_path: base_path.to_string(),
            language: options
                .language
                .or_else(|| Some(self.primary.language().to_string())),
            ..options
        };
        let instance = Instance::connect(
            options,
            self.fetcher.clone(),
            ModuleSource::Shared(self.primary.module()),
        )
        .await?;

        tracing::info!("Merged index at {}", instance.base_path());
        self.instances.write().await.push(instance);
        Ok(true)
    }

    /// Update the primary instance's options
    pub async fn options(&self, update: OptionsUpdate) -> Result<()> {
        self.primary.set_options(update).await
    }

    /// Load the chunks `term` needs on every instance
    pub async fn preload(&self, term: Option<&str>, options: &SearchOptions) -> Result<()> {
        let instances = self.instances().await;
        let preloads = instances.iter().map(|instance| {
            let query = instance.normalizer().normalize(term);
            async move { instance.preload(&query, options).await }
        });
        join_all(preloads).await.into_iter().collect()
    }

    /// Search every instance and merge the responses. Results are ordered by
    /// descending score; filter and unfiltered counts are summed.
    pub async fn search(&self, term: Option<&str>, options: &SearchOptions) -> Result<SearchResponse> {
        let instances = self.instances().await;
        let searches = instances.iter().map(|instance| {
            let query = instance.normalizer().normalize(term);
            async move { instance.search(&query, options).await }
        });
        let responses = join_all(searches)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let filters = merge_all_filters(responses.iter().map(|r| &r.filters));
        let total_filters = merge_all_filters(responses.iter().map(|r| &r.total_filters));
        let unfiltered_result_count = responses.iter().map(|r| r.unfiltered_result_count).sum();

        let mut results = Vec::new();
        let mut timings = Vec::new();
        for response in responses {
            results.extend(response.results);
            timings.extend(response.timings);
        }
        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(SearchResponse {
            results,
            unfiltered_result_count,
            filters,
            total_filters,
            timings,
        })
    }

    /// Filter value counts summed across every instance
    pub async fn filters(&self) -> Result<FilterCounts> {
        let instances = self.instances().await;
        let all = join_all(instances.iter().map(|instance| instance.filters()))
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        Ok(merge_all_filters(&all))
    }
}
