//! Artifact loading and in-flight de-duplication
//!
//! [`ArtifactLoader`] turns an [`ArtifactRef`] into decompressed bytes.
//! [`ArtifactCache`] memoises whatever a load produces so each key is fetched
//! at most once for the lifetime of the cache, including while the first load
//! is still running.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cache::constants::ENTRY_MANIFEST_FILE;
use crate::cache::fetcher::Fetcher;
use crate::cache::types::ArtifactRef;
use crate::codec;
use crate::error::{Result, RuntimeError};

type SharedLoad<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Add-only map from artifact key to a shared in-flight or resolved load
pub struct ArtifactCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    entries: Mutex<HashMap<String, SharedLoad<T>>>,
}

impl<T> Default for ArtifactCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> ArtifactCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the value for `key`, starting `load` only if no load for that key
    /// has been started before. Failures are memoised like successes.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let pending = {
            let mut entries = self.entries.lock().await;
            entries
                .entry(key.to_string())
                .or_insert_with(|| load().boxed().shared())
                .clone()
        };
        pending.await
    }

    /// Whether a load for `key` has been started
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Builds artifact locations under a base path and fetches them
#[derive(Clone)]
pub struct ArtifactLoader {
    base_path: String,
    fetcher: Arc<dyn Fetcher>,
}

impl std::fmt::Debug for ArtifactLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactLoader")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

impl ArtifactLoader {
    /// Create a loader. `base_path` is expected to end with `/`.
    pub fn new(base_path: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            base_path: base_path.into(),
            fetcher,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Full location of an artifact as handed to the fetcher
    pub fn location(&self, artifact: &ArtifactRef) -> String {
        format!("{}{}", self.base_path, artifact.relative_path())
    }

    async fn fetch_location(&self, location: &str) -> Result<Vec<u8>> {
        self.fetcher
            .fetch(location)
            .await
            .map_err(|e| RuntimeError::FetchFailure {
                url: location.to_string(),
                reason: format!("{e:#}"),
            })
    }

    /// Fetch an artifact without decompressing it
    pub async fn fetch_raw(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        self.fetch_location(&self.location(artifact)).await
    }

    /// Fetch and decompress an artifact. A damaged payload is logged and the
    /// best-effort bytes are returned.
    pub async fn load(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        let raw = self.fetch_raw(artifact).await?;
        Ok(codec::decompress(&raw, &artifact.to_string()))
    }

    /// Fetch and decompress an artifact, failing with
    /// [`RuntimeError::CorruptArtifact`] when the payload is damaged
    pub async fn load_checked(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        let raw = self.fetch_raw(artifact).await?;
        codec::check_artifact(&raw, &artifact.to_string())
    }

    /// Fetch the uncompressed entry manifest, adding a `?ts=` cache buster
    /// when the fetcher talks to a server
    pub async fn fetch_entry_manifest(&self) -> Result<Vec<u8>> {
        let mut location = format!("{}{}", self.base_path, ENTRY_MANIFEST_FILE);
        if self.fetcher.cache_busting() {
            location.push_str(&format!("?ts={}", chrono::Utc::now().timestamp_millis()));
        }
        self.fetch_location(&location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fetcher::MemoryFetcher;
    use crate::cache::types::ArtifactKind;
    use crate::codec::SIGNATURE;

    fn signed(payload: &[u8]) -> Vec<u8> {
        let mut data = SIGNATURE.to_vec();
        data.extend_from_slice(payload);
        data
    }

    fn loader_with(files: &[(&str, Vec<u8>)]) -> (Arc<MemoryFetcher>, ArtifactLoader) {
        let fetcher = Arc::new(MemoryFetcher::new());
        for (location, bytes) in files {
            fetcher.insert(*location, bytes.clone());
        }
        let loader = ArtifactLoader::new("/pagefind/", fetcher.clone());
        (fetcher, loader)
    }

    #[tokio::test]
    async fn test_load_strips_signature() -> anyhow::Result<()> {
        let (_, loader) = loader_with(&[("/pagefind/index/en_1.pf_index", signed(b"chunk"))]);
        let artifact = ArtifactRef::new(ArtifactKind::IndexChunk, "en_1")?;
        assert_eq!(loader.location(&artifact), "/pagefind/index/en_1.pf_index");
        assert_eq!(loader.load(&artifact).await?, b"chunk");
        assert_eq!(loader.load_checked(&artifact).await?, b"chunk");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_artifact_is_fetch_failure() -> anyhow::Result<()> {
        let (_, loader) = loader_with(&[]);
        let artifact = ArtifactRef::new(ArtifactKind::Fragment, "en_404")?;
        let err = loader.load(&artifact).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::FetchFailure { ref url, .. } if url == "/pagefind/fragment/en_404.pf_fragment"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_unsigned_artifact_degrades_or_fails_by_call() -> anyhow::Result<()> {
        let (_, loader) = loader_with(&[("/pagefind/filter/en_1.pf_filter", b"plain".to_vec())]);
        let artifact = ArtifactRef::new(ArtifactKind::FilterChunk, "en_1")?;
        // "plain" is not a valid deflate stream; best-effort output is returned
        assert!(loader.load(&artifact).await.is_ok());
        assert!(matches!(
            loader.load_checked(&artifact).await,
            Err(RuntimeError::CorruptArtifact { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() -> anyhow::Result<()> {
        let (fetcher, loader) =
            loader_with(&[("/pagefind/index/en_1.pf_index", signed(b"chunk"))]);
        let cache: ArtifactCache<Vec<u8>> = ArtifactCache::new();
        let artifact = ArtifactRef::new(ArtifactKind::IndexChunk, "en_1")?;

        let load = || {
            let loader = loader.clone();
            let artifact = artifact.clone();
            async move { loader.load(&artifact).await }
        };

        let (first, second) = tokio::join!(
            cache.get_or_load("en_1", load),
            cache.get_or_load("en_1", load)
        );
        assert_eq!(first?, b"chunk");
        assert_eq!(second?, b"chunk");
        assert_eq!(fetcher.request_count("en_1"), 1);

        // resolved entries are served without further I/O
        assert_eq!(cache.get_or_load("en_1", load).await?, b"chunk");
        assert_eq!(fetcher.request_count("en_1"), 1);
        assert_eq!(cache.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_load_is_memoised() -> anyhow::Result<()> {
        let (fetcher, loader) = loader_with(&[]);
        let cache: ArtifactCache<Vec<u8>> = ArtifactCache::new();
        let artifact = ArtifactRef::new(ArtifactKind::IndexChunk, "en_2")?;

        for _ in 0..3 {
            let loader = loader.clone();
            let artifact = artifact.clone();
            let result = cache
                .get_or_load("en_2", move || async move { loader.load(&artifact).await })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(fetcher.request_count("en_2"), 1);
        assert!(cache.contains("en_2").await);
        Ok(())
    }

    #[tokio::test]
    async fn test_entry_manifest_location() -> anyhow::Result<()> {
        let (fetcher, loader) =
            loader_with(&[("/pagefind/pagefind-entry.json", b"{}".to_vec())]);
        assert_eq!(loader.fetch_entry_manifest().await?, b"{}");
        assert_eq!(fetcher.requests(), vec!["/pagefind/pagefind-entry.json"]);
        Ok(())
    }
}
