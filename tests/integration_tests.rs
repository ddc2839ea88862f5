//! Integration tests for pagefind-runtime
//!
//! These tests drive a full session against in-memory indexes:
//! - artifact fetching, caching and de-duplication
//! - result scoring, excerpts and sub results
//! - debounced search cancellation
//! - merging a second index

use anyhow::Result;
use flate2::Compression;
use flate2::write::GzEncoder;
use pagefind_runtime::cache::constants::RUNTIME_VERSION;
use pagefind_runtime::codec::SIGNATURE;
use pagefind_runtime::engine::raw::{FILTER_DELIM, UNFILTERED_DELIM, VALUE_DELIM};
use pagefind_runtime::{
    EngineHandle, MemoryFetcher, ModuleLoader, OptionsUpdate, RankingWeights, RuntimeError,
    RuntimeOptions, ScoringModule, SearchOptions, SearchSession,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Engine stand-in
//
// Metadata maps words and filter names to chunk hashes. Index chunks hold
// postings per word and filter chunks hold page lists per filter value.

#[derive(Deserialize)]
struct FakeMetadata {
    words: BTreeMap<String, String>,
    #[serde(default)]
    filters: BTreeMap<String, String>,
}

#[derive(Deserialize, Clone)]
struct Posting {
    page: String,
    score: f64,
    locations: Vec<(i64, f64, u32)>,
}

#[derive(Default)]
struct EngineState {
    words: BTreeMap<String, String>,
    filter_chunks: BTreeMap<String, String>,
    postings: BTreeMap<String, Vec<Posting>>,
    page_filters: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
    synthetic: BTreeMap<String, Vec<String>>,
}

impl EngineState {
    fn known_pages(&self) -> BTreeSet<String> {
        let mut pages: BTreeSet<String> = self
            .postings
            .values()
            .flatten()
            .map(|p| p.page.clone())
            .collect();
        for values in self.page_filters.values() {
            for value_pages in values.values() {
                pages.extend(value_pages.iter().cloned());
            }
        }
        pages
    }

    fn counts_for(&self, pages: &BTreeSet<String>) -> String {
        let mut blocks = Vec::new();
        for (name, values) in &self.page_filters {
            let values: Vec<String> = values
                .iter()
                .map(|(value, value_pages)| {
                    format!("{}:{}", value, value_pages.intersection(pages).count())
                })
                .collect();
            blocks.push(format!("{}:{}", name, values.join(VALUE_DELIM)));
        }
        for (name, values) in &self.synthetic {
            let values: Vec<String> = values
                .iter()
                .map(|value| format!("{}:{}", value, pages.len()))
                .collect();
            blocks.push(format!("{}:{}", name, values.join(VALUE_DELIM)));
        }
        blocks.join(FILTER_DELIM)
    }

    fn matches_filters(&self, page: &str, filters: &serde_json::Map<String, Value>) -> bool {
        filters.iter().all(|(name, wanted)| {
            let Some(wanted) = wanted.as_str() else {
                return false;
            };
            if self
                .synthetic
                .get(name)
                .is_some_and(|values| values.iter().any(|v| v == wanted))
            {
                return true;
            }
            self.page_filters
                .get(name)
                .and_then(|values| values.get(wanted))
                .is_some_and(|pages| pages.contains(page))
        })
    }
}

struct FakeModule {
    states: HashMap<u32, EngineState>,
    next: u32,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeModule {
    fn record(&self, entry: String) {
        if let Ok(mut log) = self.log.lock() {
            log.push(entry);
        }
    }

    fn advance(&mut self, handle: EngineHandle, f: impl FnOnce(&mut EngineState)) -> EngineHandle {
        let Some(mut state) = self.states.remove(&handle.raw()) else {
            return EngineHandle::NULL;
        };
        f(&mut state);
        self.next += 1;
        self.states.insert(self.next, state);
        EngineHandle::new(self.next)
    }
}

impl ScoringModule for FakeModule {
    fn init(&mut self, language: &str, metadata: &[u8]) -> EngineHandle {
        let Ok(meta) = serde_json::from_slice::<FakeMetadata>(metadata) else {
            return EngineHandle::NULL;
        };
        self.record(format!("init {language}"));
        self.next += 1;
        self.states.insert(
            self.next,
            EngineState {
                words: meta.words,
                filter_chunks: meta.filters,
                ..EngineState::default()
            },
        );
        EngineHandle::new(self.next)
    }

    fn load_index_chunk(&mut self, handle: EngineHandle, chunk: &[u8]) -> EngineHandle {
        let postings: BTreeMap<String, Vec<Posting>> =
            serde_json::from_slice(chunk).unwrap_or_default();
        self.advance(handle, |state| state.postings.extend(postings))
    }

    fn load_filter_chunk(&mut self, handle: EngineHandle, chunk: &[u8]) -> EngineHandle {
        let filters: BTreeMap<String, BTreeMap<String, BTreeSet<String>>> =
            serde_json::from_slice(chunk).unwrap_or_default();
        self.advance(handle, |state| {
            for (name, values) in filters {
                state.page_filters.entry(name).or_default().extend(values);
            }
        })
    }

    fn add_synthetic_filter(&mut self, handle: EngineHandle, filter: &str) -> EngineHandle {
        self.record(format!("synthetic {filter}"));
        let filter: BTreeMap<String, Value> = serde_json::from_str(filter).unwrap_or_default();
        self.advance(handle, |state| {
            for (name, value) in filter {
                let values = match value {
                    Value::String(s) => vec![s],
                    Value::Array(items) => items
                        .into_iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                    _ => Vec::new(),
                };
                state.synthetic.insert(name, values);
            }
        })
    }

    fn set_ranking_weights(&mut self, handle: EngineHandle, weights: &str) -> EngineHandle {
        self.record(format!("ranking {weights}"));
        self.advance(handle, |_| {})
    }

    fn request_indexes(&mut self, handle: EngineHandle, term: &str) -> (EngineHandle, String) {
        let Some(state) = self.states.get(&handle.raw()) else {
            return (EngineHandle::NULL, String::new());
        };
        let chunks: BTreeSet<&String> = term
            .split_whitespace()
            .filter_map(|word| state.words.get(word))
            .collect();
        let chunks: Vec<&str> = chunks.into_iter().map(String::as_str).collect();
        (handle, chunks.join(" "))
    }

    fn request_filter_indexes(
        &mut self,
        handle: EngineHandle,
        filters: &str,
    ) -> (EngineHandle, String) {
        let Some(state) = self.states.get(&handle.raw()) else {
            return (EngineHandle::NULL, String::new());
        };
        let filters: BTreeMap<String, Value> = serde_json::from_str(filters).unwrap_or_default();
        let chunks: Vec<&str> = filters
            .keys()
            .filter_map(|name| state.filter_chunks.get(name))
            .map(String::as_str)
            .collect();
        (handle, chunks.join(" "))
    }

    fn request_all_filter_indexes(&mut self, handle: EngineHandle) -> (EngineHandle, String) {
        let Some(state) = self.states.get(&handle.raw()) else {
            return (EngineHandle::NULL, String::new());
        };
        let chunks: Vec<&str> = state.filter_chunks.values().map(String::as_str).collect();
        (handle, chunks.join(" "))
    }

    fn filters(&mut self, handle: EngineHandle) -> (EngineHandle, String) {
        let Some(state) = self.states.get(&handle.raw()) else {
            return (EngineHandle::NULL, String::new());
        };
        (handle, state.counts_for(&state.known_pages()))
    }

    fn search(
        &mut self,
        handle: EngineHandle,
        term: &str,
        filters: &str,
        _sort: &str,
        exact: bool,
    ) -> (EngineHandle, String) {
        self.record(format!("search {term:?} exact={exact}"));
        let Some(state) = self.states.get(&handle.raw()) else {
            return (EngineHandle::NULL, String::new());
        };

        let mut pages: BTreeMap<String, (f64, Vec<(i64, f64, u32)>)> = BTreeMap::new();
        if term.is_empty() {
            for page in state.known_pages() {
                pages.insert(page, (1.0, Vec::new()));
            }
        }
        for word in term.split_whitespace() {
            for posting in state.postings.get(word).into_iter().flatten() {
                let entry = pages.entry(posting.page.clone()).or_default();
                entry.0 += posting.score;
                entry.1.extend(posting.locations.iter().copied());
            }
        }

        let unfiltered: BTreeSet<String> = pages.keys().cloned().collect();
        let filters: serde_json::Map<String, Value> =
            serde_json::from_str(filters).unwrap_or_default();
        pages.retain(|page, _| state.matches_filters(page, &filters));
        let matched: BTreeSet<String> = pages.keys().cloned().collect();

        let mut ranked: Vec<(String, (f64, Vec<(i64, f64, u32)>))> = pages.into_iter().collect();
        ranked.sort_by(|a, b| b.1.0.total_cmp(&a.1.0));
        let results: Vec<String> = ranked
            .into_iter()
            .map(|(page, (score, mut locations))| {
                locations.sort_by_key(|l| l.2);
                let locations: Vec<String> = locations
                    .iter()
                    .map(|(w, b, l)| format!("{w}>{b}>{l}"))
                    .collect();
                format!("{}@{}@{}", page, score, locations.join(","))
            })
            .collect();

        let payload = format!(
            "{}:{}:{}{}{}",
            unfiltered.len(),
            results.join(" "),
            state.counts_for(&matched),
            UNFILTERED_DELIM,
            state.counts_for(&unfiltered),
        );
        (handle, payload)
    }
}

struct FakeLoader {
    instantiations: AtomicUsize,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeLoader {
    fn new() -> Self {
        Self {
            instantiations: AtomicUsize::new(0),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn instantiations(&self) -> usize {
        self.instantiations.load(Ordering::SeqCst)
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

impl ModuleLoader for FakeLoader {
    fn instantiate(&self, language: &str, module: &[u8]) -> Result<Box<dyn ScoringModule>> {
        if module != b"fake module" {
            anyhow::bail!("unexpected module bytes for {language}");
        }
        self.instantiations.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeModule {
            states: HashMap::new(),
            next: 0,
            log: self.log.clone(),
        }))
    }
}

// Fixture helpers

fn signed(payload: &[u8]) -> Vec<u8> {
    let mut data = SIGNATURE.to_vec();
    data.extend_from_slice(payload);
    data
}

fn gzipped(payload: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&signed(payload)).unwrap();
    encoder.finish().unwrap()
}

fn manifest(version: &str, hash: &str) -> Vec<u8> {
    json!({
        "version": version,
        "languages": {"en": {"hash": hash, "wasm": "en", "page_count": 3}},
        "include_characters": []
    })
    .to_string()
    .into_bytes()
}

fn add_primary_index(fetcher: &MemoryFetcher, version: &str) {
    fetcher.insert("/pagefind/pagefind-entry.json", manifest(version, "abc123"));
    fetcher.insert(
        "/pagefind/pagefind.abc123.pf_meta",
        gzipped(
            json!({
                "words": {"hello": "en_hello", "world": "en_world", "rust": "en_rust", "ghost": "en_ghost"},
                "filters": {"color": "en_color"}
            })
            .to_string()
            .as_bytes(),
        ),
    );
    fetcher.insert("/pagefind/wasm.en.pagefind", gzipped(b"fake module"));
    fetcher.insert(
        "/pagefind/index/en_hello.pf_index",
        gzipped(
            json!({"hello": [
                {"page": "en_p1", "score": 2.0, "locations": [[24, 1.0, 1]]},
                {"page": "en_p2", "score": 1.0, "locations": [[12, 0.5, 4]]}
            ]})
            .to_string()
            .as_bytes(),
        ),
    );
    fetcher.insert(
        "/pagefind/index/en_world.pf_index",
        gzipped(
            json!({"world": [{"page": "en_p1", "score": 1.5, "locations": [[24, 1.0, 2]]}]})
                .to_string()
                .as_bytes(),
        ),
    );
    fetcher.insert(
        "/pagefind/index/en_ghost.pf_index",
        signed(
            json!({"ghost": [{"page": "en_gone", "score": 1.0, "locations": [[24, 1.0, 0]]}]})
                .to_string()
                .as_bytes(),
        ),
    );
    fetcher.insert(
        "/pagefind/filter/en_color.pf_filter",
        gzipped(
            json!({"color": {"red": ["en_p1", "en_p2"]}})
                .to_string()
                .as_bytes(),
        ),
    );
    fetcher.insert(
        "/pagefind/fragment/en_p1.pf_fragment",
        gzipped(
            json!({
                "url": "/docs/hello/",
                "content": "Say hello world to the runtime. Usage details follow here.",
                "word_count": 10,
                "meta": {"title": "Hello"},
                "filters": {"color": ["red"]},
                "anchors": [{"element": "h2", "id": "usage", "text": "Usage", "location": 6}]
            })
            .to_string()
            .as_bytes(),
        ),
    );
    fetcher.insert(
        "/pagefind/fragment/en_p2.pf_fragment",
        signed(
            json!({
                "url": "/docs/other/",
                "content": "An other page mentions hello here.",
                "word_count": 6,
                "meta": {"title": "Other"}
            })
            .to_string()
            .as_bytes(),
        ),
    );
}

fn add_blog_index(fetcher: &MemoryFetcher) {
    fetcher.insert(
        "/blog/pagefind/pagefind-entry.json",
        manifest(RUNTIME_VERSION, "def456"),
    );
    fetcher.insert(
        "/blog/pagefind/pagefind.def456.pf_meta",
        gzipped(
            json!({"words": {"hello": "en_bhello"}, "filters": {"color": "en_bcolor"}})
                .to_string()
                .as_bytes(),
        ),
    );
    fetcher.insert(
        "/blog/pagefind/index/en_bhello.pf_index",
        gzipped(
            json!({"hello": [{"page": "en_q1", "score": 5.0, "locations": [[24, 1.0, 0]]}]})
                .to_string()
                .as_bytes(),
        ),
    );
    fetcher.insert(
        "/blog/pagefind/filter/en_bcolor.pf_filter",
        gzipped(
            json!({"color": {"red": ["en_q1"], "blue": ["en_q2", "en_q3", "en_q4"]}})
                .to_string()
                .as_bytes(),
        ),
    );
}

async fn primary_session(
    options: RuntimeOptions,
) -> Result<(Arc<MemoryFetcher>, FakeLoader, SearchSession)> {
    let fetcher = Arc::new(MemoryFetcher::new());
    add_primary_index(&fetcher, RUNTIME_VERSION);
    let loader = FakeLoader::new();
    let session = SearchSession::connect(options, fetcher.clone(), &loader).await?;
    Ok((fetcher, loader, session))
}

fn search_options(filters: Value) -> SearchOptions {
    SearchOptions {
        filters,
        ..SearchOptions::default()
    }
}

#[tokio::test]
async fn test_first_search_fetches_metadata_once_and_chunks_by_term() -> Result<()> {
    let (fetcher, loader, session) = primary_session(RuntimeOptions::default()).await?;
    let options = SearchOptions::default();

    let response = session.search(Some("hello world"), &options).await?;
    assert_eq!(response.results.len(), 2);

    assert_eq!(fetcher.request_count("pagefind-entry.json"), 1);
    assert_eq!(fetcher.request_count(".pf_meta"), 1);
    assert_eq!(fetcher.request_count("wasm.en.pagefind"), 1);
    assert_eq!(fetcher.request_count("index/en_hello.pf_index"), 1);
    assert_eq!(fetcher.request_count("index/en_world.pf_index"), 1);
    assert_eq!(fetcher.request_count("index/en_rust.pf_index"), 0);

    let again = session.search(Some("hello world"), &options).await?;
    assert_eq!(again.results.len(), 2);
    assert_eq!(fetcher.request_count("index/"), 2);
    assert_eq!(fetcher.request_count(".pf_meta"), 1);
    assert_eq!(loader.instantiations(), 1);
    assert_eq!(loader.count("init"), 1);
    Ok(())
}

#[tokio::test]
async fn test_results_are_scored_and_render_excerpts() -> Result<()> {
    let options = RuntimeOptions {
        highlight_param: Some("highlight".to_string()),
        ..RuntimeOptions::default()
    };
    let (_, _, session) = primary_session(options).await?;

    let response = session
        .search(Some("Hello, World!"), &SearchOptions::default())
        .await?;
    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["en_p1", "en_p2"]);
    assert_eq!(response.results[0].score, 3.5);
    assert_eq!(response.results[0].words, vec![1, 2]);
    assert_eq!(response.unfiltered_result_count, 2);
    assert_eq!(response.timings.len(), 1);

    let data = response.results[0].data().await?;
    assert_eq!(data.raw_url, "/docs/hello/");
    assert_eq!(data.url, "/docs/hello/?highlight=hello&highlight=world");
    assert_eq!(data.meta["title"], "Hello");
    assert_eq!(
        data.excerpt,
        "Say <mark>hello</mark> <mark>world</mark> to the runtime. Usage details follow here."
    );
    assert_eq!(data.sub_results.len(), 1);
    assert_eq!(data.sub_results[0].title, "Hello");
    assert_eq!(
        data.sub_results[0].excerpt,
        "Say <mark>hello</mark> <mark>world</mark> to the runtime."
    );

    let other = response.results[1].data().await?;
    assert_eq!(other.excerpt, "An other page mentions <mark>hello</mark> here.");
    Ok(())
}

#[tokio::test]
async fn test_concurrent_searches_share_chunk_fetches() -> Result<()> {
    let (fetcher, _, session) = primary_session(RuntimeOptions::default()).await?;
    let options = SearchOptions::default();

    let (first, second) = tokio::join!(
        session.search(Some("hello"), &options),
        session.search(Some("hello world"), &options)
    );
    assert_eq!(first?.results.len(), 2);
    assert_eq!(second?.results.len(), 2);
    assert_eq!(fetcher.request_count("index/en_hello.pf_index"), 1);
    assert_eq!(fetcher.request_count("index/en_world.pf_index"), 1);
    Ok(())
}

#[tokio::test]
async fn test_debounced_search_cancels_superseded_calls() -> Result<()> {
    let (_, loader, session) = primary_session(RuntimeOptions::default()).await?;
    let options = SearchOptions::default();
    let delay = Duration::from_millis(50);

    let (first, second) = tokio::join!(
        session.debounced_search(Some("hello"), &options, delay),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.debounced_search(Some("world"), &options, delay).await
        }
    );

    assert!(first?.is_none());
    let second = second?.expect("latest search returns a response");
    assert_eq!(second.results.len(), 1);
    assert_eq!(second.results[0].id, "en_p1");
    assert_eq!(loader.count("search"), 1);
    assert_eq!(session.current_search_id(), 2);

    // direct searches leave the debounce counter alone
    session.search(Some("hello"), &options).await?;
    assert_eq!(session.current_search_id(), 2);
    Ok(())
}

#[tokio::test]
async fn test_merged_index_results_and_filters() -> Result<()> {
    let fetcher = Arc::new(MemoryFetcher::new());
    add_primary_index(&fetcher, RUNTIME_VERSION);
    add_blog_index(&fetcher);
    let loader = FakeLoader::new();
    let session =
        SearchSession::connect(RuntimeOptions::default(), fetcher.clone(), &loader).await?;

    assert!(
        session
            .merge_index("/blog/pagefind/", RuntimeOptions::default())
            .await?
    );
    assert_eq!(session.federation().instances().await.len(), 2);
    // the merged index reuses the primary's scoring module
    assert_eq!(loader.instantiations(), 1);
    assert_eq!(fetcher.request_count("/blog/pagefind/wasm"), 0);

    let response = session.search(Some("hello"), &SearchOptions::default()).await?;
    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["en_q1", "en_p1", "en_p2"]);
    assert_eq!(response.unfiltered_result_count, 3);
    assert_eq!(response.timings.len(), 2);
    assert_eq!(response.results[0].base_path(), "/blog/pagefind/");

    let filters = session.filters().await?;
    assert_eq!(filters["color"]["red"], 3);
    assert_eq!(filters["color"]["blue"], 3);
    assert_eq!(filters["color"].len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_merge_rejects_prefix_of_existing_base_path() -> Result<()> {
    let (fetcher, _, session) = primary_session(RuntimeOptions::default()).await?;
    assert!(
        !session
            .merge_index("/pagefind", RuntimeOptions::default())
            .await?
    );
    assert_eq!(session.federation().instances().await.len(), 1);
    assert_eq!(fetcher.request_count("pagefind-entry.json"), 1);
    Ok(())
}

#[tokio::test]
async fn test_index_weight_scales_merged_scores() -> Result<()> {
    let fetcher = Arc::new(MemoryFetcher::new());
    add_primary_index(&fetcher, RUNTIME_VERSION);
    add_blog_index(&fetcher);
    let loader = FakeLoader::new();
    let session =
        SearchSession::connect(RuntimeOptions::default(), fetcher.clone(), &loader).await?;
    let blog = RuntimeOptions {
        index_weight: 0.1,
        ..RuntimeOptions::default()
    };
    session.merge_index("/blog/pagefind/", blog).await?;

    let response = session.search(Some("hello"), &SearchOptions::default()).await?;
    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["en_p1", "en_p2", "en_q1"]);
    assert!((response.results[2].score - 0.5).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_filter_only_search() -> Result<()> {
    let (fetcher, _, session) = primary_session(RuntimeOptions::default()).await?;

    let response = session
        .search(None, &search_options(json!({"color": "red"})))
        .await?;
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.filters["color"]["red"], 2);
    assert_eq!(fetcher.request_count("filter/en_color.pf_filter"), 1);
    assert_eq!(fetcher.request_count("index/"), 0);
    Ok(())
}

#[tokio::test]
async fn test_filtered_search_narrows_results() -> Result<()> {
    let (_, _, session) = primary_session(RuntimeOptions::default()).await?;
    let response = session
        .search(Some("hello"), &search_options(json!({"color": "blue"})))
        .await?;
    assert!(response.results.is_empty());
    assert_eq!(response.unfiltered_result_count, 2);
    assert_eq!(response.total_filters["color"]["red"], 2);
    Ok(())
}

#[tokio::test]
async fn test_empty_query_returns_empty_response() -> Result<()> {
    let (fetcher, loader, session) = primary_session(RuntimeOptions::default()).await?;
    let response = session.search(Some(" ?! "), &SearchOptions::default()).await?;
    assert!(!response.has_results());
    assert_eq!(response.unfiltered_result_count, 0);
    assert!(response.filters.is_empty());
    assert_eq!(fetcher.request_count("index/"), 0);
    assert_eq!(loader.count("search"), 0);
    Ok(())
}

#[tokio::test]
async fn test_exact_phrase_is_passed_to_engine() -> Result<()> {
    let (_, loader, session) = primary_session(RuntimeOptions::default()).await?;
    session
        .search(Some(r#""hello world""#), &SearchOptions::default())
        .await?;
    assert!(
        loader
            .log()
            .contains(&r#"search "hello world" exact=true"#.to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_chunk_degrades_and_is_not_refetched() -> Result<()> {
    let (fetcher, _, session) = primary_session(RuntimeOptions::default()).await?;
    let options = SearchOptions::default();

    let response = session.search(Some("rust hello"), &options).await?;
    assert_eq!(response.results.len(), 2);
    session.search(Some("rust"), &options).await?;
    assert_eq!(fetcher.request_count("index/en_rust.pf_index"), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_fragment_is_raised_from_data() -> Result<()> {
    let (_, _, session) = primary_session(RuntimeOptions::default()).await?;
    let response = session.search(Some("ghost"), &SearchOptions::default()).await?;
    assert_eq!(response.results.len(), 1);
    assert!(matches!(
        response.results[0].data().await,
        Err(RuntimeError::FetchFailure { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_version_mismatch_only_warns() -> Result<()> {
    let fetcher = Arc::new(MemoryFetcher::new());
    add_primary_index(&fetcher, "0.0.1");
    let loader = FakeLoader::new();
    let session = SearchSession::connect(RuntimeOptions::default(), fetcher, &loader).await?;
    let response = session.search(Some("hello"), &SearchOptions::default()).await?;
    assert_eq!(response.results.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_connect_failures() -> Result<()> {
    let loader = FakeLoader::new();

    let empty = Arc::new(MemoryFetcher::new());
    empty.insert(
        "/pagefind/pagefind-entry.json",
        br#"{"version":"1.3.0","languages":{}}"#.to_vec(),
    );
    let err = SearchSession::connect(RuntimeOptions::default(), empty, &loader)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::NoLanguageIndex { .. }));

    let missing = Arc::new(MemoryFetcher::new());
    let err = SearchSession::connect(RuntimeOptions::default(), missing, &loader)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Manifest { .. }));

    let no_module = Arc::new(MemoryFetcher::new());
    no_module.insert(
        "/pagefind/pagefind-entry.json",
        manifest(RUNTIME_VERSION, "abc123"),
    );
    no_module.insert(
        "/pagefind/pagefind.abc123.pf_meta",
        signed(br#"{"words":{}}"#),
    );
    let err = SearchSession::connect(RuntimeOptions::default(), no_module, &loader)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ModuleLoad { .. }));
    Ok(())
}

#[tokio::test]
async fn test_options_push_ranking_and_merge_filters() -> Result<()> {
    let mut merge_filter = BTreeMap::new();
    merge_filter.insert("site".to_string(), json!("Docs"));
    let options = RuntimeOptions {
        merge_filter,
        ..RuntimeOptions::default()
    };
    let (_, loader, session) = primary_session(options).await?;
    assert!(loader.log().contains(&r#"synthetic {"site":"Docs"}"#.to_string()));

    session
        .options(OptionsUpdate {
            ranking: Some(RankingWeights {
                page_length: Some(0.25),
                ..RankingWeights::default()
            }),
            ..OptionsUpdate::default()
        })
        .await?;
    assert!(loader.log().iter().any(|e| e.starts_with("ranking ") && e.contains(r#""page_length":0.25"#)));

    let base_path_change = session
        .options(OptionsUpdate {
            base_path: Some("/elsewhere/".to_string()),
            ..OptionsUpdate::default()
        })
        .await;
    assert!(matches!(base_path_change, Err(RuntimeError::InvalidOptions(_))));

    let filters = session.filters().await?;
    assert_eq!(filters["site"]["Docs"], 2);
    Ok(())
}
