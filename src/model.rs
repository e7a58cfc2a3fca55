use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Canonical quote record. Both wire schemas normalize into this shape at
/// the ingestion boundary; nothing downstream branches on field spelling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    #[serde(default, deserialize_with = "quote_id")]
    pub id: u64,
    #[serde(alias = "Quote")]
    pub quote: String,
    #[serde(default, alias = "Author")]
    pub author: String,
    #[serde(default, alias = "Tags")]
    pub tags: Vec<String>,
    #[serde(default, alias = "Category")]
    pub category: String,
    #[serde(default, alias = "Popularity")]
    pub popularity: f64,
}

/// Compact full-index record (`full_index.json`). Field names are
/// abbreviated to keep the transfer small; popularity is intentionally
/// omitted from this format and normalizes to 0.0.
#[derive(Debug, Clone, Deserialize)]
pub struct CompactQuote {
    pub i: u64,
    pub q: String,
    #[serde(default)]
    pub a: String,
    #[serde(default)]
    pub t: Vec<String>,
    #[serde(default)]
    pub c: String,
}

impl From<CompactQuote> for Quote {
    fn from(record: CompactQuote) -> Self {
        Quote {
            id: record.i,
            quote: record.q,
            author: record.a,
            tags: record.t,
            category: record.c,
            popularity: 0.0,
        }
    }
}

/// One tag-cloud term with its normalized importance within a category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordEntry {
    pub word: String,
    #[serde(default)]
    pub count: u64,
    pub impact: f64,
}

/// Category name to keyword list, descending impact, pre-truncated by the
/// generator.
pub type KeywordMap = BTreeMap<String, Vec<KeywordEntry>>;

/// Aggregate corpus statistics from `stats.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub total_quotes: u64,
    #[serde(default)]
    pub total_categories: u64,
    pub top_authors: BTreeMap<String, u64>,
}

/// Everything the initial load produces; the session holds exactly one.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub keywords: KeywordMap,
    pub stats: Stats,
}

impl Catalog {
    pub fn category_names(&self) -> Vec<String> {
        self.keywords.keys().cloned().collect()
    }
}

// The per-keyword generator stringifies store ids, the full index keeps
// them numeric. Accept both.
fn quote_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(u64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Num(id) => Ok(id),
        RawId::Text(text) => text.trim().parse::<u64>().map_err(serde::de::Error::custom),
    }
}
