//! Excerpt selection and rendering
//!
//! Term hits arrive as word offsets into a fragment's raw content. The densest
//! run of hits picks where the excerpt starts, and heading anchors split a page
//! into one excerpt per matched section.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::VecDeque;

use crate::fragment::{Anchor, anchored_url};
use crate::outputs::SubResult;

pub const HIGHLIGHT_OPEN: &str = "<mark>";
pub const HIGHLIGHT_CLOSE: &str = "</mark>";

/// Separator used by the indexer for scripts without whitespace word breaks
const WORD_SEPARATOR: char = '\u{200B}';

/// One term hit inside a page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedLocation {
    pub weight: f64,
    pub balanced_score: f64,
    pub location: u32,
}

/// Start offset of the `excerpt_length` word window with the highest summed
/// `balanced_score`.
///
/// When several adjacent windows tie, the middle one of the run wins.
pub fn calculate_excerpt_region(
    word_positions: &[WeightedLocation],
    excerpt_length: usize,
) -> usize {
    let Some(last) = word_positions.iter().map(|w| w.location as usize).max() else {
        return 0;
    };

    let mut words = vec![0.0f64; last + 1];
    for word in word_positions {
        words[word.location as usize] += word.balanced_score;
    }

    if words.len() <= excerpt_length {
        return 0;
    }

    let mut densest: f64 = words[..excerpt_length].iter().sum();
    let mut working_sum = densest;
    let mut densest_at = vec![0usize];

    for start in 1..=words.len() - excerpt_length {
        working_sum += words[start + excerpt_length - 1] - words[start - 1];
        if working_sum > densest {
            densest = working_sum;
            densest_at.clear();
            densest_at.push(start);
        } else if working_sum == densest && densest_at.last() == Some(&(start - 1)) {
            densest_at.push(start);
        }
    }

    densest_at[densest_at.len() / 2]
}

/// Split on runs of whitespace, keeping the empty leading/trailing tokens so
/// word offsets line up with the indexer's tokenisation.
fn split_on_whitespace_runs(content: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start = 0;
    let mut in_whitespace = false;

    for (idx, ch) in content.char_indices() {
        if ch.is_whitespace() {
            if !in_whitespace {
                words.push(&content[start..idx]);
                in_whitespace = true;
            }
        } else if in_whitespace {
            start = idx;
            in_whitespace = false;
        }
    }
    words.push(if in_whitespace { "" } else { &content[start..] });
    words
}

/// Render `length` words of `content` from `start`, wrapping every word at a
/// hit location in `<mark>`.
///
/// The window is clamped to `[not_before, not_after]` (defaulting to the whole
/// content) and shrunk when that range is shorter than `length`.
pub fn build_excerpt(
    content: &str,
    start: usize,
    length: usize,
    locations: &[u32],
    not_before: Option<usize>,
    not_after: Option<usize>,
) -> String {
    let separated = content.contains(WORD_SEPARATOR);
    let mut words: Vec<Cow<'_, str>> = if separated {
        content.split(WORD_SEPARATOR).map(Cow::Borrowed).collect()
    } else {
        split_on_whitespace_runs(content)
            .into_iter()
            .map(Cow::Borrowed)
            .collect()
    };

    for &location in locations {
        if let Some(word) = words.get_mut(location as usize) {
            if word.starts_with(HIGHLIGHT_OPEN) {
                continue;
            }
            *word = Cow::Owned(format!("{HIGHLIGHT_OPEN}{word}{HIGHLIGHT_CLOSE}"));
        }
    }

    let word_count = words.len() as i64;
    let endcap = not_after.map_or(word_count, |n| n as i64);
    let startcap = not_before.map_or(0, |n| n as i64);

    let mut start = start as i64;
    let mut length = length as i64;
    if endcap - startcap < length {
        length = endcap - startcap;
    }
    if start + length > endcap {
        start = endcap - length;
    }
    if start < startcap {
        start = startcap;
    }

    let from = start.clamp(0, word_count) as usize;
    let to = (start + length).clamp(from as i64, word_count) as usize;
    let joiner = if separated { "" } else { " " };

    words[from..to].join(joiner).trim().to_string()
}

/// The parts of a loaded page needed to split its hits into sections
#[derive(Debug, Clone, Copy)]
pub struct PageSections<'a> {
    pub title: &'a str,
    pub url: &'a str,
    pub raw_content: &'a str,
    pub anchors: &'a [Anchor],
    pub weighted_locations: &'a [WeightedLocation],
}

struct Section<'a> {
    title: String,
    url: String,
    anchor: Option<&'a Anchor>,
    position: u32,
    weighted_locations: Vec<WeightedLocation>,
    locations: Vec<u32>,
}

impl<'a> Section<'a> {
    fn at_anchor(page_url: &str, anchor: &'a Anchor) -> Self {
        Self {
            title: anchor.text.clone(),
            url: anchored_url(page_url, &anchor.id),
            anchor: Some(anchor),
            position: anchor.location,
            weighted_locations: Vec::new(),
            locations: Vec::new(),
        }
    }

    fn push(&mut self, word: WeightedLocation) {
        self.weighted_locations.push(word);
        self.locations.push(word.location);
    }

    fn close(
        self,
        raw_content: &str,
        excerpt_length: usize,
        end_range: Option<u32>,
    ) -> Option<SubResult> {
        if self.locations.is_empty() {
            return None;
        }

        let relative: Vec<WeightedLocation> = self
            .weighted_locations
            .iter()
            .map(|w| WeightedLocation {
                location: w.location.saturating_sub(self.position),
                ..*w
            })
            .collect();
        let position = self.position as usize;
        let excerpt_start = calculate_excerpt_region(&relative, excerpt_length) + position;
        let excerpt_length = match end_range {
            Some(end) => (end as usize)
                .saturating_sub(excerpt_start)
                .min(excerpt_length),
            None => excerpt_length,
        };

        let excerpt = build_excerpt(
            raw_content,
            excerpt_start,
            excerpt_length,
            &self.locations,
            Some(position),
            end_range.map(|end| end as usize),
        );

        Some(SubResult {
            title: self.title,
            url: self.url,
            anchor: self.anchor.cloned(),
            weighted_locations: self.weighted_locations,
            locations: self.locations,
            excerpt,
        })
    }
}

/// Group a page's hits under the heading that precedes them.
///
/// Hits before the first heading form a section titled with the page title.
/// Sections without hits are skipped, so the output has one entry per matched
/// section in document order.
pub fn calculate_sub_results(page: &PageSections<'_>, excerpt_length: usize) -> Vec<SubResult> {
    let mut headings: Vec<&Anchor> = page
        .anchors
        .iter()
        .filter(|a| a.is_section_heading())
        .collect();
    headings.sort_by_key(|a| a.location);
    let mut anchors: VecDeque<&Anchor> = headings.into();

    let mut results = Vec::new();
    let mut current = Section {
        title: page.title.to_string(),
        url: page.url.to_string(),
        anchor: None,
        position: 0,
        weighted_locations: Vec::new(),
        locations: Vec::new(),
    };

    for &word in page.weighted_locations {
        let reached_anchor = matches!(anchors.front(), Some(a) if word.location >= a.location);
        if !reached_anchor {
            current.push(word);
            continue;
        }
        let Some(mut next_anchor) = anchors.pop_front() else {
            continue;
        };

        let end_range = next_anchor.location;
        while let Some(&following) = anchors.front() {
            if word.location < following.location {
                break;
            }
            anchors.pop_front();
            next_anchor = following;
        }

        let finished = std::mem::replace(&mut current, Section::at_anchor(page.url, next_anchor));
        results.extend(finished.close(page.raw_content, excerpt_length, Some(end_range)));
        current.push(word);
    }

    let end_range = anchors.front().map(|a| a.location);
    results.extend(current.close(page.raw_content, excerpt_length, end_range));
    results
}
