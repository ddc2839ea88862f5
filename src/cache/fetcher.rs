//! Byte retrieval for index artifacts
//!
//! The loader builds artifact locations and hands them to a [`Fetcher`]. The
//! fetcher decides what a location means: a URL, a file path, or a key in an
//! in-memory map.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, RwLock};
use url::Url;

use crate::cache::constants::MAX_REDIRECTS;

/// Source of raw artifact bytes
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieve the bytes stored at `location`
    async fn fetch(&self, location: &str) -> Result<Vec<u8>>;

    /// Whether the entry manifest should be requested with a `?ts=` cache buster
    fn cache_busting(&self) -> bool {
        false
    }
}

/// Fetches artifacts over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: Option<Url>,
}

impl HttpFetcher {
    /// Create a fetcher. Root-relative locations are resolved against `origin`.
    pub fn new(origin: Option<Url>) -> Result<Self> {
        let client = Self::build_http_client()?;
        Ok(Self { client, origin })
    }

    /// Build the HTTP client with proper configuration
    fn build_http_client() -> Result<reqwest::Client> {
        let user_agent = Self::format_user_agent();

        tracing::info!("Creating HTTP client with User-Agent: {}", user_agent);

        reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .context("Failed to create HTTP client")
    }

    fn format_user_agent() -> String {
        format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }

    fn resolve(&self, location: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(location) {
            return Ok(url);
        }
        match &self.origin {
            Some(origin) => origin
                .join(location)
                .with_context(|| format!("Failed to resolve {location} against {origin}")),
            None => bail!("Cannot fetch relative location {} without an origin", location),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let url = self.resolve(location)?;
        tracing::debug!("Fetching {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to fetch {url}"))?;

        if !response.status().is_success() {
            bail!("Failed to fetch {}: HTTP {}", url, response.status());
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {url}"))?;
        Ok(bytes.to_vec())
    }

    fn cache_busting(&self) -> bool {
        true
    }
}

/// Reads artifacts from the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FsFetcher {
    root: Option<PathBuf>,
}

impl FsFetcher {
    /// Create a fetcher. Locations are joined to `root` when one is given,
    /// otherwise they are used as paths directly (with `~` expanded).
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(location.trim_start_matches('/')),
            None => PathBuf::from(shellexpand::tilde(location).as_ref()),
        }
    }
}

#[async_trait]
impl Fetcher for FsFetcher {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.resolve(location);
        tracing::debug!("Reading {}", path.display());
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

/// Serves artifacts from memory and records every request it receives
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    files: RwLock<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` under `location`, replacing any previous entry
    pub fn insert(&self, location: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let mut files = self.files.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Memory fetcher file map lock poisoned; recovering");
            poisoned.into_inner()
        });
        files.insert(location.into(), bytes.into());
    }

    /// Every location requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.request_log().clone()
    }

    /// Number of requests whose location contains `needle`
    pub fn request_count(&self, needle: &str) -> usize {
        self.requests()
            .iter()
            .filter(|location| location.contains(needle))
            .count()
    }

    fn request_log(&self) -> MutexGuard<'_, Vec<String>> {
        self.requests.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Memory fetcher request log lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        self.request_log().push(location.to_string());

        let files = self.files.read().unwrap_or_else(|poisoned| {
            tracing::warn!("Memory fetcher file map lock poisoned; recovering");
            poisoned.into_inner()
        });
        match files.get(location) {
            Some(bytes) => Ok(bytes.clone()),
            None => bail!("No artifact stored at {}", location),
        }
    }
}
