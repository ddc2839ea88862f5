//! Output types for search calls
//!
//! These are the values handed back to callers. They serialise to JSON with
//! the same field names the index's fragments use, and [`ResultData`] can be
//! deserialised in tests for type-safe validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::FilterCounts;
use crate::error::Result;
use crate::excerpt::WeightedLocation;
use crate::fragment::Anchor;
use crate::instance::Instance;

/// One heading-anchored section of a result page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResult {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Anchor>,
    pub weighted_locations: Vec<WeightedLocation>,
    pub locations: Vec<u32>,
    pub excerpt: String,
}

/// Everything known about a result page once its fragment is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultData {
    /// URL with the base URL and highlight parameters applied
    pub url: String,
    /// URL as stored in the fragment
    pub raw_url: String,
    pub content: String,
    pub raw_content: String,
    pub excerpt: String,
    pub sub_results: Vec<SubResult>,
    pub meta: BTreeMap<String, String>,
    pub anchors: Vec<Anchor>,
    pub filters: BTreeMap<String, Vec<String>>,
    pub word_count: u32,
    pub locations: Vec<u32>,
    pub weighted_locations: Vec<WeightedLocation>,
}

/// A scored page. Its content is loaded on demand by [`SearchResult::data`].
#[derive(Clone, Serialize)]
pub struct SearchResult {
    /// Fragment hash of the page
    pub id: String,
    pub score: f64,
    pub words: Vec<u32>,
    pub weighted_locations: Vec<WeightedLocation>,
    /// Engine inputs that produced this result, present for verbose searches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params_for_debug: Option<serde_json::Value>,
    #[serde(skip)]
    pub(crate) search_terms: Vec<String>,
    #[serde(skip)]
    pub(crate) instance: Arc<Instance>,
}

impl std::fmt::Debug for SearchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchResult")
            .field("id", &self.id)
            .field("score", &self.score)
            .field("words", &self.words)
            .field("base_path", &self.instance.base_path())
            .finish_non_exhaustive()
    }
}

impl SearchResult {
    /// Load the page fragment and build its excerpt and sub results.
    ///
    /// Fragments are cached per instance, so repeated calls fetch once.
    pub async fn data(&self) -> Result<ResultData> {
        let terms: Vec<&str> = self.search_terms.iter().map(String::as_str).collect();
        self.instance
            .load_fragment(&self.id, &self.weighted_locations, &terms)
            .await
    }

    /// Base path of the index this result came from
    pub fn base_path(&self) -> &str {
        self.instance.base_path()
    }
}

/// Time spent in each phase of one instance's search, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchTimings {
    pub preload: u64,
    pub search: u64,
    pub total: u64,
}

/// Combined response of a search across every instance
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub unfiltered_result_count: usize,
    pub filters: FilterCounts,
    pub total_filters: FilterCounts,
    pub timings: Vec<SearchTimings>,
}

impl SearchResponse {
    /// Convert to a JSON string; result content is not included
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"Failed to serialize response"}"#.to_string())
    }

    /// Check if there are any results
    pub fn has_results(&self) -> bool {
        !self.results.is_empty()
    }
}
