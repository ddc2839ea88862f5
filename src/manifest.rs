//! Entry manifest (`pagefind-entry.json`) loading and language selection

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cache::ArtifactLoader;
use crate::cache::constants::{RUNTIME_VERSION, UNKNOWN_MODULE_LANGUAGE};
use crate::error::{Result, RuntimeError};

/// One language's index inside the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageIndex {
    /// Hash of the language's metadata artifact
    pub hash: String,
    /// Language of the scoring module to load, if it has a dedicated one
    #[serde(default)]
    pub wasm: Option<String>,
    #[serde(default)]
    pub page_count: usize,
}

impl LanguageIndex {
    /// Key of the `wasm.<lang>.pagefind` artifact for this index
    pub fn module_language(&self) -> &str {
        self.wasm.as_deref().unwrap_or(UNKNOWN_MODULE_LANGUAGE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryManifest {
    pub version: String,
    pub languages: BTreeMap<String, LanguageIndex>,
    #[serde(default)]
    pub include_characters: Vec<String>,
}

impl EntryManifest {
    pub fn from_bytes(base_path: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| RuntimeError::Manifest {
            base_path: base_path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Fetch and parse the manifest under the loader's base path
    pub async fn load(loader: &ArtifactLoader) -> Result<Self> {
        let bytes = loader
            .fetch_entry_manifest()
            .await
            .map_err(|e| RuntimeError::Manifest {
                base_path: loader.base_path().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_bytes(loader.base_path(), &bytes)
    }

    /// Pick the index for `requested`: exact code, then its primary subtag,
    /// then the language with the most pages.
    pub fn resolve_language(&self, requested: Option<&str>) -> Result<(&str, &LanguageIndex)> {
        let requested = requested
            .map(str::to_lowercase)
            .unwrap_or_else(|| UNKNOWN_MODULE_LANGUAGE.to_string());

        if let Some((code, index)) = self.languages.get_key_value(requested.as_str()) {
            return Ok((code.as_str(), index));
        }

        if let Some(primary) = requested.split('-').next() {
            if let Some((code, index)) = self.languages.get_key_value(primary) {
                tracing::debug!("Using {} index for requested language {}", code, requested);
                return Ok((code.as_str(), index));
            }
        }

        let mut by_pages: Vec<(&String, &LanguageIndex)> = self.languages.iter().collect();
        by_pages.sort_by(|a, b| b.1.page_count.cmp(&a.1.page_count));
        match by_pages.first() {
            Some((code, index)) => {
                tracing::debug!(
                    "No index for language {}, falling back to {}",
                    requested,
                    code
                );
                Ok((code.as_str(), index))
            }
            None => Err(RuntimeError::NoLanguageIndex { requested }),
        }
    }

    /// Compare the index version with the runtime's. A mismatch is logged and
    /// returned but never stops the index from being used.
    pub fn check_version(&self, base_path: &str, primary: bool) -> Option<RuntimeError> {
        if self.version == RUNTIME_VERSION {
            return None;
        }

        if primary {
            tracing::warn!(
                "Runtime version {} does not match the search index version {}. \
                 A cached copy of the runtime is the usual cause; clear it if searches fail.",
                RUNTIME_VERSION,
                self.version
            );
        } else {
            tracing::warn!(
                "Merging index at {} built with version {} into a runtime at version {}. \
                 Rebuild both sites with the same version if searches fail.",
                base_path,
                self.version,
                RUNTIME_VERSION
            );
        }

        Some(RuntimeError::VersionMismatch {
            runtime: RUNTIME_VERSION.to_string(),
            index: self.version.clone(),
        })
    }
}
