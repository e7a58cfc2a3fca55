//! Quote Cloud: a keyword-cloud quote browser over a static JSON API.
//!
//! The crate is the session core of the browser: a lazy, memoizing
//! [`DataLoader`] over the generated `data/api/` tree, a fuzzy
//! [`SearchEngine`] with deterministic facet filtering, and a
//! [`Controller`] that owns the single mutable [`FilterState`] and decides
//! which data path satisfies it. Rendering is left to adapters; the CLI in
//! this crate is one such adapter.

pub mod loader;
pub mod model;
pub mod search;
pub mod state;
pub mod store;

pub use loader::{ApiSource, DataLoader, DirSource, HttpSource, LoadError};
pub use model::{Catalog, CompactQuote, KeywordEntry, KeywordMap, Quote, Stats};
pub use search::{SearchConfig, SearchEngine, SortKey, sort_quotes};
pub use state::{
    Controller, FilterState, MIN_SEARCH_LEN, ResultMode, Route, View, cloud_keywords, route,
};
pub use store::{CacheStore, QUOTE_CACHE_KEY, SEARCH_INDEX_KEY};
