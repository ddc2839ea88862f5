//! A single index instance
//!
//! An instance is one index directory: its entry manifest, the engine state
//! for its chosen language, and caches for the chunks and fragments it has
//! loaded. The primary instance loads the scoring module; merged instances
//! reuse it with their own engine handle.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::cache::{ArtifactCache, ArtifactKind, ArtifactLoader, ArtifactRef, Fetcher};
use crate::config::{OptionsUpdate, RuntimeOptions, SearchOptions};
use crate::engine::{EngineBridge, FilterCounts, ModuleLoader, ScoringModule, SharedModule};
use crate::error::{Result, RuntimeError};
use crate::excerpt::{
    PageSections, WeightedLocation, build_excerpt, calculate_excerpt_region,
    calculate_sub_results,
};
use crate::fragment::{Fragment, processed_url};
use crate::manifest::EntryManifest;
use crate::outputs::{ResultData, SearchResponse, SearchResult, SearchTimings};
use crate::query::{NormalizedQuery, QueryNormalizer};

/// Where an instance gets its scoring module from
pub enum ModuleSource<'a> {
    /// Fetch `wasm.<lang>.pagefind` and instantiate it
    Load(&'a dyn ModuleLoader),
    /// Reuse the primary instance's module
    Shared(SharedModule),
}

pub struct Instance {
    base_path: String,
    primary: bool,
    language: String,
    manifest: EntryManifest,
    normalizer: QueryNormalizer,
    options: RwLock<RuntimeOptions>,
    loader: ArtifactLoader,
    bridge: Arc<EngineBridge>,
    chunks: ArtifactCache<()>,
    filter_chunks: ArtifactCache<()>,
    fragments: ArtifactCache<Arc<Fragment>>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("base_path", &self.base_path)
            .field("primary", &self.primary)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

fn artifact(kind: ArtifactKind, key: &str) -> Result<ArtifactRef> {
    ArtifactRef::new(kind, key).map_err(|e| RuntimeError::FetchFailure {
        url: key.to_string(),
        reason: e.to_string(),
    })
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

impl Instance {
    /// Load the manifest, pick a language, and initialise the engine.
    ///
    /// Fails when the manifest is unreadable, no language index exists, the
    /// scoring module cannot be loaded, or the engine returns a null handle. A
    /// version mismatch or missing metadata only logs.
    pub async fn connect(
        options: RuntimeOptions,
        fetcher: Arc<dyn Fetcher>,
        module_source: ModuleSource<'_>,
    ) -> Result<Arc<Self>> {
        let options = options.validated()?;
        let primary = matches!(module_source, ModuleSource::Load(_));
        let base_path = options.base_path.clone();
        let loader = ArtifactLoader::new(base_path.clone(), fetcher);

        let manifest = EntryManifest::load(&loader).await?;
        manifest.check_version(&base_path, primary);

        let (language, index) = manifest.resolve_language(options.language.as_deref())?;
        let language = language.to_string();
        let index = index.clone();
        tracing::info!(
            "Loading {} index from {} ({} pages)",
            language,
            base_path,
            index.page_count
        );

        let metadata_ref = artifact(ArtifactKind::Metadata, &index.hash)?;
        let load_metadata = async {
            loader.load(&metadata_ref).await.unwrap_or_else(|e| {
                tracing::error!("Failed to load search metadata: {}", e);
                Vec::new()
            })
        };

        let (metadata, module) = match module_source {
            ModuleSource::Shared(module) => (load_metadata.await, module),
            ModuleSource::Load(module_loader) => {
                let module_language = index.module_language().to_string();
                let load_module = async {
                    let module_ref = artifact(ArtifactKind::ScoringModule, &module_language)?;
                    let bytes = loader.load(&module_ref).await.map_err(|e| {
                        tracing::error!("Failed to load the scoring module: {}", e);
                        RuntimeError::ModuleLoad {
                            module: module_language.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    module_loader
                        .instantiate(&module_language, &bytes)
                        .map_err(|e| RuntimeError::ModuleLoad {
                            module: module_language.clone(),
                            reason: format!("{e:#}"),
                        })
                };
                let (metadata, module) = tokio::join!(load_metadata, load_module);
                let module: Box<dyn ScoringModule> = module?;
                (metadata, Arc::new(tokio::sync::Mutex::new(module)))
            }
        };

        let bridge = Arc::new(EngineBridge::new(module, base_path.clone()));
        bridge.init(&language, &metadata).await?;

        if let Some(filter) = options.merge_filter_json() {
            bridge.add_synthetic_filter(&filter).await?;
        }
        if let Some(ranking) = &options.ranking {
            bridge.set_ranking_weights(&ranking.to_engine_json()).await?;
        }

        Ok(Arc::new(Self {
            base_path,
            primary,
            normalizer: QueryNormalizer::new(&manifest.include_characters),
            language,
            manifest,
            options: RwLock::new(options),
            loader,
            bridge,
            chunks: ArtifactCache::new(),
            filter_chunks: ArtifactCache::new(),
            fragments: ArtifactCache::new(),
        }))
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Language code of the loaded index
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn manifest(&self) -> &EntryManifest {
        &self.manifest
    }

    pub fn normalizer(&self) -> &QueryNormalizer {
        &self.normalizer
    }

    pub fn module(&self) -> SharedModule {
        self.bridge.module()
    }

    pub async fn options(&self) -> RuntimeOptions {
        self.options.read().await.clone()
    }

    /// Apply new options. Ranking and merge filters are pushed to the engine
    /// immediately; the base path and language are fixed once loaded.
    pub async fn set_options(&self, update: OptionsUpdate) -> Result<()> {
        let mut options = self.options.write().await;
        let ranking_changed = update.ranking.is_some();
        let merge_filter_changed = update.merge_filter.is_some();
        let next = options.updated(update)?;

        if next.base_path != options.base_path {
            return Err(RuntimeError::InvalidOptions(
                "basePath cannot change after the index is loaded".to_string(),
            ));
        }
        if next.language != options.language {
            return Err(RuntimeError::InvalidOptions(
                "language cannot change after the index is loaded".to_string(),
            ));
        }

        if ranking_changed {
            if let Some(ranking) = &next.ranking {
                self.bridge
                    .set_ranking_weights(&ranking.to_engine_json())
                    .await?;
            }
        }
        if merge_filter_changed {
            if let Some(filter) = next.merge_filter_json() {
                self.bridge.add_synthetic_filter(&filter).await?;
            }
        }

        *options = next;
        Ok(())
    }

    /// Load one index chunk into the engine. Failures are logged, not raised.
    async fn load_index_chunk(&self, hash: &str) {
        let loader = self.loader.clone();
        let bridge = self.bridge.clone();
        let key = hash.to_string();
        let loaded = self
            .chunks
            .get_or_load(hash, move || async move {
                let chunk = artifact(ArtifactKind::IndexChunk, &key)?;
                let bytes = loader.load(&chunk).await?;
                bridge.load_index_chunk(&bytes).await
            })
            .await;
        if let Err(e) = loaded {
            tracing::error!("Failed to load index chunk {}: {}", hash, e);
        }
    }

    /// Load one filter chunk into the engine. Failures are logged, not raised.
    async fn load_filter_chunk(&self, hash: &str) {
        let loader = self.loader.clone();
        let bridge = self.bridge.clone();
        let key = hash.to_string();
        let loaded = self
            .filter_chunks
            .get_or_load(hash, move || async move {
                let chunk = artifact(ArtifactKind::FilterChunk, &key)?;
                let bytes = loader.load(&chunk).await?;
                bridge.load_filter_chunk(&bytes).await
            })
            .await;
        if let Err(e) = loaded {
            tracing::error!("Failed to load filter chunk {}: {}", hash, e);
        }
    }

    /// Fetch every chunk a search for `query` needs without scoring it
    pub async fn preload(&self, query: &NormalizedQuery, options: &SearchOptions) -> Result<()> {
        let filter_chunks = if options.has_filters() {
            self.bridge
                .request_filter_indexes(&options.filters_json())
                .await?
        } else {
            Vec::new()
        };
        let index_chunks = if query.term.is_empty() {
            Vec::new()
        } else {
            self.bridge.request_indexes(&query.term).await?
        };

        if options.verbose {
            tracing::debug!(
                "Preloading {} index chunks and {} filter chunks from {}",
                index_chunks.len(),
                filter_chunks.len(),
                self.base_path
            );
        }

        let index_loads = join_all(index_chunks.iter().map(|hash| self.load_index_chunk(hash)));
        let filter_loads =
            join_all(filter_chunks.iter().map(|hash| self.load_filter_chunk(hash)));
        tokio::join!(index_loads, filter_loads);
        Ok(())
    }

    /// Score `query` against this index
    pub async fn search(
        self: &Arc<Self>,
        query: &NormalizedQuery,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        let start = Instant::now();

        if query.is_empty() {
            let elapsed = elapsed_ms(start);
            return Ok(SearchResponse {
                timings: vec![SearchTimings {
                    preload: elapsed,
                    search: elapsed,
                    total: elapsed,
                }],
                ..SearchResponse::default()
            });
        }

        if options.verbose {
            tracing::debug!(
                "Searching {} for {:?} (exact: {}, filter only: {})",
                self.base_path,
                query.term,
                query.exact,
                query.filter_only
            );
        }

        self.preload(query, options).await?;
        let preload = elapsed_ms(start);

        let search_start = Instant::now();
        let filters = options.filters_json();
        let sort = options.sort_string();
        let raw = self
            .bridge
            .search(&query.term, &filters, &sort, query.exact)
            .await?;
        let search = elapsed_ms(search_start);

        let index_weight = self.options.read().await.index_weight;
        let params_for_debug = options.verbose.then(|| {
            serde_json::json!({
                "term": query.term,
                "filters": filters,
                "sort": sort,
                "exact": query.exact,
            })
        });
        let search_terms: Vec<String> = query.terms().into_iter().map(str::to_string).collect();

        let results: Vec<SearchResult> = raw
            .results
            .into_iter()
            .map(|result| SearchResult {
                words: result.locations(),
                id: result.page,
                score: result.score * index_weight,
                weighted_locations: result.weighted_locations,
                params_for_debug: params_for_debug.clone(),
                search_terms: search_terms.clone(),
                instance: Arc::clone(self),
            })
            .collect();

        if options.verbose {
            tracing::debug!(
                "Found {} results ({} before filtering) in {}",
                results.len(),
                raw.unfiltered_result_count,
                self.base_path
            );
        }

        Ok(SearchResponse {
            results,
            unfiltered_result_count: raw.unfiltered_result_count,
            filters: raw.filters,
            total_filters: raw.total_filters,
            timings: vec![SearchTimings {
                preload,
                search,
                total: elapsed_ms(start),
            }],
        })
    }

    /// Counts for every filter value in this index
    pub async fn filters(&self) -> Result<FilterCounts> {
        let chunks = self.bridge.request_all_filter_indexes().await?;
        join_all(chunks.iter().map(|hash| self.load_filter_chunk(hash))).await;
        self.bridge.filters().await
    }

    async fn fragment(&self, hash: &str) -> Result<Arc<Fragment>> {
        let loader = self.loader.clone();
        let key = hash.to_string();
        self.fragments
            .get_or_load(hash, move || async move {
                let fragment = artifact(ArtifactKind::Fragment, &key)?;
                let bytes = loader.load(&fragment).await?;
                Fragment::from_bytes(&key, &bytes).map(Arc::new)
            })
            .await
    }

    /// Load a page fragment and render it for the given hits and terms
    pub async fn load_fragment(
        &self,
        hash: &str,
        weighted_locations: &[WeightedLocation],
        terms: &[&str],
    ) -> Result<ResultData> {
        let fragment = self.fragment(hash).await?;
        let options = self.options.read().await.clone();

        let raw_content = fragment.raw_content();
        let url = processed_url(
            &options.base_url,
            &fragment.url,
            options.highlight_param.as_deref(),
            terms,
        );
        let locations: Vec<u32> = weighted_locations.iter().map(|l| l.location).collect();

        let excerpt_start = calculate_excerpt_region(weighted_locations, options.excerpt_length);
        let excerpt = build_excerpt(
            &raw_content,
            excerpt_start,
            options.excerpt_length,
            &locations,
            None,
            None,
        );
        let sub_results = calculate_sub_results(
            &PageSections {
                title: fragment.title(),
                url: &url,
                raw_content: &raw_content,
                anchors: &fragment.anchors,
                weighted_locations,
            },
            options.excerpt_length,
        );

        Ok(ResultData {
            raw_url: fragment.url.clone(),
            url,
            content: fragment.display_content(),
            excerpt,
            sub_results,
            meta: fragment.meta.clone(),
            anchors: fragment.anchors.clone(),
            filters: fragment.filters.clone(),
            word_count: fragment.word_count,
            locations,
            weighted_locations: weighted_locations.to_vec(),
            raw_content,
        })
    }
}
