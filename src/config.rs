//! Runtime and per-search options
//!
//! Options use the camelCase names of the public JavaScript API so option
//! files and JSON payloads written for it deserialise unchanged. Unknown keys
//! are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::cache::constants::{
    DEFAULT_BASE_PATH, DEFAULT_BASE_URL, DEFAULT_EXCERPT_LENGTH, DEFAULT_INDEX_WEIGHT,
};
use crate::error::{Result, RuntimeError};

/// Per-factor overrides for the engine's ranking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RankingWeights {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_similarity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_saturation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_frequency: Option<f64>,
}

/// Wire shape expected by the scoring module; unset factors are `null`
#[derive(Serialize)]
struct EngineRankingWeights {
    term_similarity: Option<f64>,
    page_length: Option<f64>,
    term_saturation: Option<f64>,
    term_frequency: Option<f64>,
}

impl RankingWeights {
    pub fn to_engine_json(&self) -> String {
        let weights = EngineRankingWeights {
            term_similarity: self.term_similarity,
            page_length: self.page_length,
            term_saturation: self.term_saturation,
            term_frequency: self.term_frequency,
        };
        serde_json::to_string(&weights).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Options for one index instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RuntimeOptions {
    /// Location of the index directory; always ends with `/`
    pub base_path: String,
    /// Prefix for result URLs
    pub base_url: String,
    /// Multiplier applied to every score from this instance
    pub index_weight: f64,
    /// Excerpt length in words
    pub excerpt_length: usize,
    /// Filter values every page of this instance reports
    pub merge_filter: BTreeMap<String, Value>,
    /// Query parameter that carries search terms on result URLs
    pub highlight_param: Option<String>,
    pub ranking: Option<RankingWeights>,
    /// Requested language code; the index's default language when unset
    pub language: Option<String>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            index_weight: DEFAULT_INDEX_WEIGHT,
            excerpt_length: DEFAULT_EXCERPT_LENGTH,
            merge_filter: BTreeMap::new(),
            highlight_param: None,
            ranking: None,
            language: None,
        }
    }
}

impl RuntimeOptions {
    /// Parse options from JSON and validate them
    pub fn from_json(json: &str) -> Result<Self> {
        let options: RuntimeOptions = serde_json::from_str(json)
            .map_err(|e| RuntimeError::InvalidOptions(e.to_string()))?;
        options.validated()
    }

    /// Check values and normalise the base path to end with `/`
    pub fn validated(mut self) -> Result<Self> {
        if self.base_path.trim().is_empty() {
            return Err(RuntimeError::InvalidOptions(
                "basePath cannot be empty".to_string(),
            ));
        }
        if !self.base_path.ends_with('/') {
            self.base_path.push('/');
        }
        if !self.index_weight.is_finite() || self.index_weight < 0.0 {
            return Err(RuntimeError::InvalidOptions(format!(
                "indexWeight must be a non-negative number, got {}",
                self.index_weight
            )));
        }
        if let Some(param) = &self.highlight_param {
            if param.trim().is_empty() {
                return Err(RuntimeError::InvalidOptions(
                    "highlightParam cannot be empty".to_string(),
                ));
            }
        }
        Ok(self)
    }

    /// JSON for the engine's synthetic filter call, if any values are set
    pub fn merge_filter_json(&self) -> Option<String> {
        if self.merge_filter.is_empty() {
            return None;
        }
        serde_json::to_string(&self.merge_filter).ok()
    }

    /// Apply a partial update, returning the validated result
    pub fn updated(&self, update: OptionsUpdate) -> Result<Self> {
        let mut next = self.clone();
        if let Some(base_path) = update.base_path {
            next.base_path = base_path;
        }
        if let Some(base_url) = update.base_url {
            next.base_url = base_url;
        }
        if let Some(index_weight) = update.index_weight {
            next.index_weight = index_weight;
        }
        if let Some(excerpt_length) = update.excerpt_length {
            next.excerpt_length = excerpt_length;
        }
        if let Some(merge_filter) = update.merge_filter {
            next.merge_filter = merge_filter;
        }
        if let Some(highlight_param) = update.highlight_param {
            next.highlight_param = Some(highlight_param);
        }
        if let Some(ranking) = update.ranking {
            next.ranking = Some(ranking);
        }
        if let Some(language) = update.language {
            next.language = Some(language);
        }
        next.validated()
    }
}

/// Partial options for `options()` calls; unset fields keep their value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct OptionsUpdate {
    pub base_path: Option<String>,
    pub base_url: Option<String>,
    pub index_weight: Option<f64>,
    pub excerpt_length: Option<usize>,
    pub merge_filter: Option<BTreeMap<String, Value>>,
    pub highlight_param: Option<String>,
    pub ranking: Option<RankingWeights>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort results by a sort key recorded at index time instead of by score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    /// `field:direction` as passed to the engine
    pub fn to_engine_string(&self) -> String {
        let direction = match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        format!("{}:{}", self.field, direction)
    }
}

/// Options for a single search call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SearchOptions {
    /// Filter tree handed to the engine as JSON
    pub filters: Value,
    pub sort: Option<SortSpec>,
    /// Log per-search diagnostics and attach engine parameters to results
    pub verbose: bool,
}

impl SearchOptions {
    pub fn filters_json(&self) -> String {
        match &self.filters {
            Value::Null => "{}".to_string(),
            filters => filters.to_string(),
        }
    }

    pub fn sort_string(&self) -> String {
        self.sort
            .as_ref()
            .map(SortSpec::to_engine_string)
            .unwrap_or_default()
    }

    pub fn has_filters(&self) -> bool {
        match &self.filters {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            _ => true,
        }
    }
}
