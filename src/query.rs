//! Query normalisation
//!
//! Raw search input is case-folded, stripped of punctuation and collapsed to
//! single spaces before it reaches the scoring module. Characters the index
//! was built to keep (`include_characters` in the entry manifest) survive the
//! punctuation pass.

use unicode_segmentation::UnicodeSegmentation;

/// Characters removed from queries unless the index includes them
pub const STRIPPED_CHARACTERS: &str = ".`~!@#$%^&*(){}[]\\|:;'\",<>/?-";

/// A query ready to hand to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub term: String,
    /// The raw input was wrapped in double quotes
    pub exact: bool,
    /// No term was given, only filters apply
    pub filter_only: bool,
}

impl NormalizedQuery {
    /// Individual words of the normalised term
    pub fn terms(&self) -> Vec<&str> {
        self.term.split_whitespace().collect()
    }

    /// Nothing left to search for
    pub fn is_empty(&self) -> bool {
        !self.filter_only && self.term.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryNormalizer {
    include_characters: Vec<String>,
}

impl QueryNormalizer {
    pub fn new(include_characters: &[String]) -> Self {
        Self {
            include_characters: include_characters.to_vec(),
        }
    }

    fn is_stripped(&self, grapheme: &str) -> bool {
        let mut chars = grapheme.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return false;
        };
        STRIPPED_CHARACTERS.contains(ch) && !self.include_characters.iter().any(|c| c == grapheme)
    }

    /// Normalise raw input. `None` means a filter-only search.
    pub fn normalize(&self, raw: Option<&str>) -> NormalizedQuery {
        let Some(raw) = raw else {
            return NormalizedQuery {
                term: String::new(),
                exact: false,
                filter_only: true,
            };
        };

        let exact = is_exact_phrase(raw);
        let lowered = raw.to_lowercase();
        let stripped: String = lowered
            .trim()
            .graphemes(true)
            .filter(|g| !self.is_stripped(g))
            .collect();
        let term = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

        NormalizedQuery {
            term,
            exact,
            filter_only: false,
        }
    }
}

/// Input of the form `"..."`, ignoring surrounding whitespace
pub fn is_exact_phrase(raw: &str) -> bool {
    let trimmed = raw.trim();
    let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return false;
    };
    !inner.is_empty() && !inner.contains(['\n', '\r'])
}
