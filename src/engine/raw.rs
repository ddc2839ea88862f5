//! Parsers for the scoring module's string payloads
//!
//! Search payload:
//! `<unfiltered count>:<results>:<filters>__PF_UNFILTERED_DELIM__<total filters>`
//!
//! Results are space separated `<page hash>@<score>@<locations>`, where
//! locations are comma separated `<weight>><balanced score>><word offset>`.
//! Weights are integers in units of 1/24.
//!
//! Filter payloads are `<name>:<values>` blocks joined by
//! `__PF_FILTER_DELIM__`, with values `<value>:<count>` joined by
//! `__PF_VALUE_DELIM__`.

use std::collections::BTreeMap;

use crate::excerpt::WeightedLocation;

pub const UNFILTERED_DELIM: &str = "__PF_UNFILTERED_DELIM__";
pub const FILTER_DELIM: &str = "__PF_FILTER_DELIM__";
pub const VALUE_DELIM: &str = "__PF_VALUE_DELIM__";

/// Divisor applied to the engine's integer term weights
pub const WEIGHT_SCALE: f64 = 24.0;

/// Filter name to value to page count
pub type FilterCounts = BTreeMap<String, BTreeMap<String, usize>>;

/// One scored page as reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    pub page: String,
    pub score: f64,
    pub weighted_locations: Vec<WeightedLocation>,
}

impl RawResult {
    pub fn locations(&self) -> Vec<u32> {
        self.weighted_locations.iter().map(|l| l.location).collect()
    }
}

/// Parsed search payload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSearch {
    pub unfiltered_result_count: usize,
    pub results: Vec<RawResult>,
    pub filters: FilterCounts,
    pub total_filters: FilterCounts,
}

/// Chunk hash lists are whitespace separated
pub fn parse_chunk_list(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn parse_location(raw: &str) -> Option<WeightedLocation> {
    let mut parts = raw.split('>');
    let weight: i64 = parts.next()?.trim().parse().ok()?;
    let balanced_score: f64 = parts.next()?.trim().parse().ok()?;
    let location: u32 = parts.next()?.trim().parse().ok()?;
    Some(WeightedLocation {
        weight: weight as f64 / WEIGHT_SCALE,
        balanced_score,
        location,
    })
}

fn parse_result(raw: &str) -> Option<RawResult> {
    let mut parts = raw.splitn(3, '@');
    let page = parts.next()?.to_string();
    let score: f64 = parts.next()?.parse().ok()?;
    let locations = parts.next().unwrap_or_default();

    let weighted_locations = locations
        .split(',')
        .filter(|l| !l.is_empty())
        .filter_map(|l| {
            let parsed = parse_location(l);
            if parsed.is_none() {
                tracing::warn!("Skipping malformed location {:?} for page {}", l, page);
            }
            parsed
        })
        .collect();

    Some(RawResult {
        page,
        score,
        weighted_locations,
    })
}

/// Parse a filter payload into counts. Malformed blocks are skipped.
pub fn parse_filters(raw: &str) -> FilterCounts {
    let mut filters = FilterCounts::new();
    if raw.is_empty() {
        return filters;
    }

    for block in raw.split(FILTER_DELIM) {
        let Some((name, values)) = block.split_once(':') else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let mut counts = BTreeMap::new();
        for value in values.split(VALUE_DELIM) {
            let Some((value, count)) = value.rsplit_once(':') else {
                continue;
            };
            if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            if let Ok(count) = count.parse::<usize>() {
                counts.insert(value.to_string(), count);
            }
        }
        if !counts.is_empty() {
            filters.entry(name.to_string()).or_default().extend(counts);
        }
    }
    filters
}

/// Parse a search payload. An unrecognised payload yields an empty search.
pub fn parse_search(raw: &str) -> RawSearch {
    let Some((head, total_filters)) = raw.split_once(UNFILTERED_DELIM) else {
        tracing::warn!("Scoring module returned an unrecognised search payload");
        return RawSearch::default();
    };
    let mut parts = head.splitn(3, ':');
    let (Some(unfiltered), Some(results), Some(filters)) = (parts.next(), parts.next(), parts.next())
    else {
        tracing::warn!("Scoring module returned an unrecognised search payload");
        return RawSearch::default();
    };

    let results = results
        .split_whitespace()
        .filter_map(|r| {
            let parsed = parse_result(r);
            if parsed.is_none() {
                tracing::warn!("Skipping malformed search result {:?}", r);
            }
            parsed
        })
        .collect();

    RawSearch {
        unfiltered_result_count: unfiltered.trim().parse().unwrap_or(0),
        results,
        filters: parse_filters(filters),
        total_filters: parse_filters(total_filters),
    }
}
