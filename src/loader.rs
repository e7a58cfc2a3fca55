use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::model::{Catalog, CompactQuote, KeywordMap, Quote, Stats};

const KEYWORDS_PATH: &str = "keywords.json";
const STATS_PATH: &str = "stats.json";
const FULL_INDEX_PATH: &str = "full_index.json";

// Characters that cannot appear raw in a URL path segment. Keyword files
// are named after the keyword itself, so bigram keywords carry spaces.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`');

#[derive(Debug)]
pub enum LoadError {
    Http(reqwest::Error),
    Io(std::io::Error),
    Status { path: String, status: u16 },
    Malformed { path: String, detail: String },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Http(err) => write!(f, "http error: {err}"),
            LoadError::Io(err) => write!(f, "io error: {err}"),
            LoadError::Status { path, status } => {
                write!(f, "unexpected status {status} fetching {path}")
            }
            LoadError::Malformed { path, detail } => {
                write!(f, "malformed payload at {path}: {detail}")
            }
        }
    }
}

impl std::error::Error for LoadError {}

impl From<reqwest::Error> for LoadError {
    fn from(value: reqwest::Error) -> Self {
        LoadError::Http(value)
    }
}

impl From<std::io::Error> for LoadError {
    fn from(value: std::io::Error) -> Self {
        LoadError::Io(value)
    }
}

/// Where the static API lives. One implementation per deployment shape,
/// plus whatever a test needs to count or fail fetches.
pub trait ApiSource: Send + Sync {
    fn fetch_bytes(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Vec<u8>, LoadError>> + Send;
}

/// Static API served over HTTP (the deployed layout under `data/api/`).
pub struct HttpSource {
    base: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base = base_url.into().trim_end_matches('/').to_string();
        Self {
            base,
            client: reqwest::Client::new(),
        }
    }
}

impl ApiSource for HttpSource {
    async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let url = format!("{}/{}", self.base, utf8_percent_encode(path, SEGMENT));
        debug!(%url, "fetching");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(LoadError::Status {
                path: path.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Static API read straight from the generated directory on disk.
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ApiSource for DirSource {
    async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        Ok(std::fs::read(self.root.join(path))?)
    }
}

/// Fetches the static API lazily and memoizes everything it has seen for
/// the lifetime of the session. One writer (this loader), readers
/// everywhere else.
pub struct DataLoader<S: ApiSource> {
    source: S,
    keyword_cache: RwLock<HashMap<String, Arc<Vec<Quote>>>>,
    full_index: OnceCell<Arc<Vec<Quote>>>,
}

impl<S: ApiSource> DataLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            keyword_cache: RwLock::new(HashMap::new()),
            full_index: OnceCell::new(),
        }
    }

    /// Fetches the keyword map and aggregate stats. Both payloads are
    /// required; any fetch or parse failure here is fatal to
    /// initialization and must be surfaced by the caller.
    pub async fn load_initial(&self) -> Result<Catalog, LoadError> {
        let keywords: KeywordMap = self.fetch_json(KEYWORDS_PATH).await?;
        let stats: Stats = self.fetch_json(STATS_PATH).await?;
        info!(
            categories = keywords.len(),
            total_quotes = stats.total_quotes,
            "catalog loaded"
        );
        Ok(Catalog { keywords, stats })
    }

    /// Returns the quote slice for one keyword, fetching it on first use.
    /// Best-effort: a failed fetch logs and yields an empty slice without
    /// poisoning the cache, so a later call can retry.
    pub async fn quotes_for_keyword(&self, keyword: &str) -> Arc<Vec<Quote>> {
        if let Some(cached) = self.keyword_cache.read().get(keyword) {
            return Arc::clone(cached);
        }
        let path = keyword_path(keyword);
        match self.fetch_json::<Vec<Quote>>(&path).await {
            Ok(quotes) => {
                let slice = Arc::new(quotes);
                self.keyword_cache
                    .write()
                    .insert(keyword.to_string(), Arc::clone(&slice));
                debug!(keyword, quotes = slice.len(), "keyword slice cached");
                slice
            }
            Err(err) => {
                warn!(keyword, error = %err, "keyword fetch failed; returning empty slice");
                Arc::new(Vec::new())
            }
        }
    }

    /// Lazily loads the compact full index exactly once per session.
    /// Concurrent callers before the first resolution share the in-flight
    /// fetch and observe the identical index. A failed load resolves to an
    /// empty index; search and author filtering then degrade to no
    /// results.
    pub async fn full_index(&self) -> Arc<Vec<Quote>> {
        self.full_index
            .get_or_init(|| async {
                match self.fetch_json::<Vec<CompactQuote>>(FULL_INDEX_PATH).await {
                    Ok(records) => {
                        let quotes: Vec<Quote> =
                            records.into_iter().map(Quote::from).collect();
                        info!(quotes = quotes.len(), "full index loaded");
                        Arc::new(quotes)
                    }
                    Err(err) => {
                        warn!(error = %err, "full index load failed; deep search degrades to empty");
                        Arc::new(Vec::new())
                    }
                }
            })
            .await
            .clone()
    }

    pub fn full_index_loaded(&self) -> bool {
        self.full_index.initialized()
    }

    /// Seeds the keyword cache from a persisted snapshot. Existing entries
    /// win over seeded ones.
    pub fn seed_keyword_cache(&self, entries: HashMap<String, Vec<Quote>>) {
        let mut cache = self.keyword_cache.write();
        for (keyword, quotes) in entries {
            cache.entry(keyword).or_insert_with(|| Arc::new(quotes));
        }
    }

    /// Seeds the full index from a persisted snapshot. Returns false when
    /// an index is already resolved.
    pub fn seed_full_index(&self, quotes: Vec<Quote>) -> bool {
        self.full_index.set(Arc::new(quotes)).is_ok()
    }

    pub fn keyword_cache_snapshot(&self) -> HashMap<String, Vec<Quote>> {
        self.keyword_cache
            .read()
            .iter()
            .map(|(keyword, slice)| (keyword.clone(), slice.as_ref().clone()))
            .collect()
    }

    pub fn full_index_snapshot(&self) -> Option<Vec<Quote>> {
        self.full_index.get().map(|index| index.as_ref().clone())
    }

    async fn fetch_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, LoadError> {
        let bytes = self.source.fetch_bytes(path).await?;
        serde_json::from_slice(&bytes).map_err(|err| LoadError::Malformed {
            path: path.to_string(),
            detail: err.to_string(),
        })
    }
}

fn keyword_path(keyword: &str) -> String {
    format!("quotes/{}.json", keyword.trim())
}
