use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::loader::{ApiSource, DataLoader};
use crate::model::Quote;

/// Fixed storage keys, one per cached artifact. Scoped to the store
/// directory, no expiry; clearing is an explicit action.
pub const QUOTE_CACHE_KEY: &str = "quote_cache_v2";
pub const SEARCH_INDEX_KEY: &str = "deep_search_index_v2";

/// Best-effort session persistence for the loader's caches. Every failure
/// here is logged and swallowed; a cold cache is always a valid state.
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Per-user cache directory for the CLI.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("quotecloud"))
    }

    /// Seeds the loader from persisted snapshots, if any exist.
    pub fn restore<S: ApiSource>(&self, loader: &DataLoader<S>) {
        if let Some(entries) = self.read::<HashMap<String, Vec<Quote>>>(QUOTE_CACHE_KEY) {
            debug!(keywords = entries.len(), "restored keyword cache");
            loader.seed_keyword_cache(entries);
        }
        if let Some(index) = self.read::<Vec<Quote>>(SEARCH_INDEX_KEY) {
            debug!(quotes = index.len(), "restored full index");
            loader.seed_full_index(index);
        }
    }

    /// Writes snapshots of whatever the loader has accumulated.
    pub fn persist<S: ApiSource>(&self, loader: &DataLoader<S>) {
        let cache = loader.keyword_cache_snapshot();
        if !cache.is_empty() {
            self.write(QUOTE_CACHE_KEY, &cache);
        }
        if let Some(index) = loader.full_index_snapshot() {
            if !index.is_empty() {
                self.write(SEARCH_INDEX_KEY, &index);
            }
        }
    }

    /// Deletes both snapshots.
    pub fn clear(&self) {
        for key in [QUOTE_CACHE_KEY, SEARCH_INDEX_KEY] {
            let path = self.path_for(key);
            if path.exists() {
                if let Err(err) = fs::remove_file(&path) {
                    warn!(key, error = %err, "failed to clear cache snapshot");
                }
            }
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(key, error = %err, "failed to read cache snapshot");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "corrupt cache snapshot ignored");
                None
            }
        }
    }

    fn write<T: serde::Serialize>(&self, key: &str, value: &T) {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %err, "failed to create cache directory");
            return;
        }
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                if let Err(err) = write_atomic(&self.path_for(key), &bytes) {
                    warn!(key, error = %err, "failed to write cache snapshot");
                }
            }
            Err(err) => warn!(key, error = %err, "failed to serialize cache snapshot"),
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DirSource;
    use tempfile::TempDir;

    fn api_fixture(dir: &TempDir) {
        fs::create_dir_all(dir.path().join("quotes")).unwrap();
        fs::write(
            dir.path().join("quotes").join("hope.json"),
            r#"[{"id": 0, "quote": "Hope endures.", "author": "Anon",
                "tags": ["hope"], "category": "inspirational", "popularity": 0.5}]"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn caches_round_trip_through_the_store() {
        let api = TempDir::new().unwrap();
        api_fixture(&api);
        let cache_dir = TempDir::new().unwrap();
        let store = CacheStore::new(cache_dir.path());

        let warm = DataLoader::new(DirSource::new(api.path()));
        let fetched = warm.quotes_for_keyword("hope").await;
        assert_eq!(fetched.len(), 1);
        store.persist(&warm);

        // A loader pointed at an empty API still serves the seeded slice.
        let empty_api = TempDir::new().unwrap();
        let cold = DataLoader::new(DirSource::new(empty_api.path()));
        store.restore(&cold);
        let restored = cold.quotes_for_keyword("hope").await;
        assert_eq!(restored.as_ref(), fetched.as_ref());
    }

    #[tokio::test]
    async fn restored_index_counts_as_loaded() {
        let cache_dir = TempDir::new().unwrap();
        let store = CacheStore::new(cache_dir.path());
        fs::write(
            cache_dir.path().join(format!("{SEARCH_INDEX_KEY}.json")),
            r#"[{"id": 1, "quote": "q", "author": "a", "tags": [],
                "category": "c", "popularity": 0.0}]"#,
        )
        .unwrap();

        let api = TempDir::new().unwrap();
        let loader = DataLoader::new(DirSource::new(api.path()));
        store.restore(&loader);
        assert!(loader.full_index_loaded());
        assert_eq!(loader.full_index().await.len(), 1);
    }

    #[test]
    fn missing_snapshots_are_silent() {
        let cache_dir = TempDir::new().unwrap();
        let store = CacheStore::new(cache_dir.path());
        let api = TempDir::new().unwrap();
        let loader = DataLoader::new(DirSource::new(api.path()));
        store.restore(&loader);
        assert!(!loader.full_index_loaded());
        store.clear();
    }
}
