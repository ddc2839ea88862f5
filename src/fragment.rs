//! Content fragments and result URL handling
//!
//! A fragment is the stored form of one indexed page: its raw text (word offsets
//! in the index refer to tokens of this text), metadata, filter values and the
//! heading anchors used to split results into sections.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use crate::error::{Result, RuntimeError};

/// Origin used to resolve root-relative URLs with the `url` crate
const PLACEHOLDER_ORIGIN: &str = "https://example.com";

/// A heading (or other element) position inside a fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub element: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub location: u32,
}

impl Anchor {
    /// Headings with visible text are the only anchors that start a sub result
    pub fn is_section_heading(&self) -> bool {
        let element = self.element.to_ascii_lowercase();
        let is_heading = element
            .as_bytes()
            .windows(2)
            .any(|pair| pair[0] == b'h' && pair[1].is_ascii_digit());
        is_heading && !self.text.trim().is_empty()
    }
}

/// Decoded `fragment/<hash>.pf_fragment` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub filters: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(default)]
    pub anchors: Vec<Anchor>,
}

impl Fragment {
    /// Parse a decompressed fragment artifact
    pub fn from_bytes(hash: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| RuntimeError::Fragment {
            hash: hash.to_string(),
            reason: e.to_string(),
        })
    }

    /// Page title from the fragment metadata
    pub fn title(&self) -> &str {
        self.meta.get("title").map(String::as_str).unwrap_or_default()
    }

    /// Content with angle brackets escaped; word offsets refer to this text
    pub fn raw_content(&self) -> String {
        self.content.replace('<', "&lt;").replace('>', "&gt;")
    }

    /// Content for display, with zero-width word separators removed
    pub fn display_content(&self) -> String {
        self.content.replace('\u{200B}', "")
    }
}

/// Whether a URL carries its own scheme or host
pub fn is_fully_qualified(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with("//")
}

/// Resolve a fragment URL against the configured base URL.
///
/// Fully-qualified URLs are returned untouched; everything else is joined to
/// `base_url` with duplicate slashes collapsed.
pub fn full_url(base_url: &str, raw: &str) -> String {
    if is_fully_qualified(raw) {
        return raw.to_string();
    }

    let joined = format!("{base_url}/{raw}");
    let mut collapsed = String::with_capacity(joined.len());
    let mut previous_slash = false;
    for ch in joined.chars() {
        if ch == '/' {
            if !previous_slash {
                collapsed.push(ch);
            }
            previous_slash = true;
        } else {
            collapsed.push(ch);
            previous_slash = false;
        }
    }

    for scheme in ["http:/", "https:/"] {
        if let Some(rest) = collapsed.strip_prefix(scheme) {
            return format!("{scheme}/{rest}");
        }
    }
    collapsed
}

/// Apply `f` to `url` parsed as an absolute URL, or via a placeholder origin
/// when it is root-relative. Returns `None` if neither parse succeeds.
fn with_parsed_url(url: &str, f: impl FnOnce(&mut Url)) -> Option<String> {
    if url.starts_with("//") {
        let mut parsed = Url::parse(&format!("https:{url}")).ok()?;
        f(&mut parsed);
        return parsed.as_str().strip_prefix("https:").map(str::to_string);
    }
    if let Ok(mut parsed) = Url::parse(url) {
        f(&mut parsed);
        return Some(parsed.to_string());
    }

    let rooted = if url.starts_with('/') {
        url.to_string()
    } else {
        format!("/{url}")
    };
    let mut parsed = Url::parse(&format!("{PLACEHOLDER_ORIGIN}{rooted}")).ok()?;
    f(&mut parsed);
    parsed
        .as_str()
        .strip_prefix(PLACEHOLDER_ORIGIN)
        .map(str::to_string)
}

/// Result URL with one `highlight_param=<term>` pair appended per search term
pub fn processed_url(
    base_url: &str,
    raw: &str,
    highlight_param: Option<&str>,
    terms: &[&str],
) -> String {
    let normalized = full_url(base_url, raw);
    let Some(param) = highlight_param else {
        return normalized;
    };
    if terms.is_empty() {
        return normalized;
    }

    with_parsed_url(&normalized, |url| {
        let mut pairs = url.query_pairs_mut();
        for term in terms {
            pairs.append_pair(param, term);
        }
    })
    .unwrap_or(normalized)
}

/// Page URL pointing at a heading id
pub fn anchored_url(url: &str, id: &str) -> String {
    with_parsed_url(url, |parsed| parsed.set_fragment(Some(id))).unwrap_or_else(|| {
        tracing::error!("Couldn't process {} for a search result", url);
        url.to_string()
    })
}
