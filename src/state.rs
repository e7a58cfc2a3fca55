use crate::loader::{ApiSource, DataLoader, LoadError};
use crate::model::{Catalog, KeywordEntry, KeywordMap, Quote};
use crate::search::{SearchConfig, SearchEngine, SortKey, sort_quotes};

/// Search terms below this length never trigger a deep-search fetch or an
/// index load; routing treats them as no search at all.
pub const MIN_SEARCH_LEN: usize = 3;

/// The single mutable filter state of a session. Every field has a defined
/// default; updates replace whole fields, nothing is ever partially unset.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    /// Free-text search term; empty means inactive.
    pub search_term: String,
    /// Selected tags, AND semantics. Single-valued in keyword-browse mode:
    /// selecting a keyword replaces the previous selection.
    pub tags: Vec<String>,
    /// Selected categories, OR semantics. Insertion order is selection
    /// order, so the last element is the last-selected category.
    pub categories: Vec<String>,
    /// Selected authors, OR semantics.
    pub authors: Vec<String>,
    pub min_popularity: f64,
    pub sort: SortKey,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            tags: Vec::new(),
            categories: Vec::new(),
            authors: Vec::new(),
            min_popularity: 0.0,
            sort: SortKey::default(),
        }
    }
}

impl FilterState {
    pub fn search_active(&self) -> bool {
        self.search_term.trim().chars().count() >= MIN_SEARCH_LEN
    }
}

/// Which data path satisfies the current state.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Fuzzy search over the (lazily loaded) full index. Overrides every
    /// facet while active.
    DeepSearch { term: String },
    /// Deterministic filtering over the full index.
    FacetFilter,
    /// Per-keyword browse over a cached slice; no bulk data needed.
    KeywordQuotes { keyword: String },
    /// Aggregate wordcloud view, optionally restricted to categories.
    Cloud,
}

/// Pure decision policy, evaluated on every state change.
pub fn route(state: &FilterState, full_index_loaded: bool) -> Route {
    if state.search_active() {
        return Route::DeepSearch {
            term: state.search_term.trim().to_string(),
        };
    }
    if !state.authors.is_empty() {
        return Route::FacetFilter;
    }
    // A clicked keyword always reads its own slice, whether or not a bulk
    // list happens to be resident: the per-keyword file is a curated
    // top-K, not a literal tag match, and the same selection must return
    // the same quotes either way. Multi-tag AND only exists on the
    // full-index path.
    match state.tags.as_slice() {
        [keyword] => {
            return Route::KeywordQuotes {
                keyword: keyword.clone(),
            };
        }
        [] => {}
        _ => return Route::FacetFilter,
    }
    if full_index_loaded && !state.categories.is_empty() {
        // Once a bulk list exists, category changes filter it directly.
        return Route::FacetFilter;
    }
    Route::Cloud
}

/// Keyword set for the cloud view. With no selection this merges every
/// category (duplicate words keep their highest impact); with a selection
/// it is the intersection by word of every selected category's list,
/// keeping the first-selected category's impact scores. Descending impact
/// either way.
pub fn cloud_keywords(keywords: &KeywordMap, categories: &[String]) -> Vec<KeywordEntry> {
    let mut merged: Vec<KeywordEntry> = match categories {
        [] => {
            let mut all: Vec<KeywordEntry> = Vec::new();
            for entries in keywords.values() {
                for entry in entries {
                    match all.iter_mut().find(|seen| seen.word == entry.word) {
                        Some(seen) if entry.impact > seen.impact => *seen = entry.clone(),
                        Some(_) => {}
                        None => all.push(entry.clone()),
                    }
                }
            }
            all
        }
        [first, rest @ ..] => {
            let base = keywords.get(first).cloned().unwrap_or_default();
            base.into_iter()
                .filter(|entry| {
                    rest.iter().all(|category| {
                        keywords
                            .get(category)
                            .is_some_and(|entries| entries.iter().any(|e| e.word == entry.word))
                    })
                })
                .collect()
        }
    };
    merged.sort_by(|a, b| {
        b.impact
            .partial_cmp(&a.impact)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultMode {
    Search,
    Filter,
    Keyword,
}

/// What an adapter renders after a state change. An empty quote list is a
/// distinct "no results" condition, not an error.
#[derive(Debug, Clone)]
pub enum View {
    Cloud {
        keywords: Vec<KeywordEntry>,
        active_keyword: Option<String>,
        quotes: Vec<Quote>,
    },
    Results {
        mode: ResultMode,
        quotes: Vec<Quote>,
    },
}

impl View {
    pub fn quotes(&self) -> &[Quote] {
        match self {
            View::Cloud { quotes, .. } => quotes,
            View::Results { quotes, .. } => quotes,
        }
    }
}

/// Owns the loader, the catalog, and the session's one filter state. Each
/// command mutates the state, re-runs the decision policy, and returns the
/// resulting view. Commands serialize through `&mut self`, so a superseded
/// fetch can never clobber a newer view.
pub struct Controller<S: ApiSource> {
    loader: DataLoader<S>,
    catalog: Catalog,
    state: FilterState,
    config: SearchConfig,
}

impl<S: ApiSource> Controller<S> {
    /// Fatal on catalog failure: the session never starts with partial
    /// data.
    pub async fn initialize(loader: DataLoader<S>) -> Result<Self, LoadError> {
        let catalog = loader.load_initial().await?;
        Ok(Self {
            loader,
            catalog,
            state: FilterState::default(),
            config: SearchConfig::default(),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn loader(&self) -> &DataLoader<S> {
        &self.loader
    }

    pub async fn set_search_term(&mut self, term: impl Into<String>) -> View {
        self.state.search_term = term.into();
        self.refresh().await
    }

    /// Adds or removes one category, preserving selection order. A
    /// category change invalidates the current keyword selection; the
    /// cloud path re-selects one.
    pub async fn toggle_category(&mut self, category: &str) -> View {
        match self.state.categories.iter().position(|c| c == category) {
            Some(idx) => {
                self.state.categories.remove(idx);
            }
            None => self.state.categories.push(category.to_string()),
        }
        self.state.tags.clear();
        self.refresh().await
    }

    pub async fn toggle_author(&mut self, author: &str) -> View {
        match self.state.authors.iter().position(|a| a == author) {
            Some(idx) => {
                self.state.authors.remove(idx);
            }
            None => self.state.authors.push(author.to_string()),
        }
        self.refresh().await
    }

    /// Keyword clicks replace the tag selection outright; multi-tag
    /// selection only exists on the full-index filter path.
    pub async fn select_keyword(&mut self, keyword: &str) -> View {
        self.state.tags = vec![keyword.to_string()];
        self.refresh().await
    }

    pub async fn set_min_popularity(&mut self, floor: f64) -> View {
        self.state.min_popularity = floor;
        self.refresh().await
    }

    pub async fn set_sort(&mut self, sort: SortKey) -> View {
        self.state.sort = sort;
        self.refresh().await
    }

    /// Replaces the whole filter state. The state is always fully
    /// defined; there is no partial update surface.
    pub async fn apply(&mut self, state: FilterState) -> View {
        self.state = state;
        self.refresh().await
    }

    /// Resets every field to its default; the policy falls back to the
    /// full unfiltered cloud.
    pub async fn clear_filters(&mut self) -> View {
        self.state = FilterState::default();
        self.refresh().await
    }

    /// Re-runs the decision policy against the current state.
    pub async fn refresh(&mut self) -> View {
        match route(&self.state, self.loader.full_index_loaded()) {
            Route::DeepSearch { term } => {
                let engine = self.engine().await;
                let quotes = self.sorted(engine.search(&term));
                View::Results {
                    mode: ResultMode::Search,
                    quotes,
                }
            }
            Route::FacetFilter => {
                let engine = self.engine().await;
                let quotes = self.sorted(engine.filter(&self.state));
                View::Results {
                    mode: ResultMode::Filter,
                    quotes,
                }
            }
            Route::KeywordQuotes { keyword } => {
                let slice = self.loader.quotes_for_keyword(&keyword).await;
                let quotes = self.sorted(self.above_floor(&slice));
                View::Results {
                    mode: ResultMode::Keyword,
                    quotes,
                }
            }
            Route::Cloud => {
                let keywords = cloud_keywords(&self.catalog.keywords, &self.state.categories);
                let mut active_keyword = None;
                let mut quotes = Vec::new();
                // With a category active the quote panel is never left
                // empty: the last-selected category's top keyword drives
                // the click-through path.
                if let Some(category) = self.state.categories.last() {
                    if let Some(first) = self
                        .catalog
                        .keywords
                        .get(category)
                        .and_then(|entries| entries.first())
                    {
                        active_keyword = Some(first.word.clone());
                        let slice = self.loader.quotes_for_keyword(&first.word).await;
                        quotes = self.above_floor(&slice);
                    }
                }
                View::Cloud {
                    keywords,
                    active_keyword,
                    quotes: self.sorted(quotes),
                }
            }
        }
    }

    async fn engine(&self) -> SearchEngine {
        SearchEngine::with_config(self.loader.full_index().await, self.config.clone())
    }

    fn above_floor(&self, quotes: &[Quote]) -> Vec<Quote> {
        quotes
            .iter()
            .filter(|quote| quote.popularity >= self.state.min_popularity)
            .cloned()
            .collect()
    }

    fn sorted(&self, quotes: Vec<Quote>) -> Vec<Quote> {
        sort_quotes(&quotes, self.state.sort)
    }
}
