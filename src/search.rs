use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::thread_rng;
use rapidfuzz::fuzz;
use rayon::prelude::*;

use crate::model::Quote;
use crate::state::{FilterState, MIN_SEARCH_LEN};

/// Thresholds for fuzzy matching against the full index.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Minimum best-window score (0-100) for a hit.
    pub score_cutoff: f64,
    /// Hard cap on returned quotes, for search and filter alike.
    pub max_results: usize,
    /// Terms shorter than this never reach the engine. Must agree with
    /// the routing threshold or routing and scoring disagree on what
    /// counts as a search.
    pub min_term_len: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            score_cutoff: 70.0,
            max_results: 50,
            min_term_len: MIN_SEARCH_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Popularity,
    Author,
    Length,
    Random,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SortKey::Popularity => "popularity",
            SortKey::Author => "author",
            SortKey::Length => "length",
            SortKey::Random => "random",
        };
        write!(f, "{label}")
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "popularity" => Ok(SortKey::Popularity),
            "author" => Ok(SortKey::Author),
            "length" => Ok(SortKey::Length),
            "random" => Ok(SortKey::Random),
            other => Err(format!(
                "unknown sort key {other:?} (expected popularity, author, length, or random)"
            )),
        }
    }
}

/// Fuzzy search and deterministic facet filtering over one loaded full
/// index. The engine never mutates the index; popularity on its records is
/// 0.0 because the compact wire format omits it.
pub struct SearchEngine {
    index: Arc<Vec<Quote>>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(index: Arc<Vec<Quote>>) -> Self {
        Self::with_config(index, SearchConfig::default())
    }

    pub fn with_config(index: Arc<Vec<Quote>>, config: SearchConfig) -> Self {
        Self { index, config }
    }

    /// Fuzzy-matches the term against quote text and author, scoring each
    /// by its best substring window. Hits are ordered by descending score,
    /// ties by original index, and capped at `max_results`.
    pub fn search(&self, term: &str) -> Vec<Quote> {
        let needle: Vec<char> = term.trim().to_lowercase().chars().collect();
        if needle.len() < self.config.min_term_len {
            return Vec::new();
        }
        let scorer = fuzz::RatioBatchComparator::new(needle.iter().copied());
        let needle_len = needle.len();
        let cutoff = self.config.score_cutoff;
        let mut hits: Vec<(usize, f64)> = self
            .index
            .par_iter()
            .enumerate()
            .filter_map(|(idx, quote)| {
                let text_score =
                    best_window_score(&scorer, needle_len, &quote.quote.to_lowercase());
                let score = if text_score >= 100.0 {
                    text_score
                } else {
                    text_score
                        .max(best_window_score(&scorer, needle_len, &quote.author.to_lowercase()))
                };
                (score >= cutoff).then_some((idx, score))
            })
            .collect();
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(self.config.max_results);
        hits.into_iter()
            .map(|(idx, _)| self.index[idx].clone())
            .collect()
    }

    /// Deterministic facet filtering. Stages compose by intersection; an
    /// empty selection is no constraint, never "reject all". Authors run
    /// first because they prune the most on a large index.
    pub fn filter(&self, state: &FilterState) -> Vec<Quote> {
        let authors: Vec<String> = state.authors.iter().map(|a| norm(a)).collect();
        let tags: Vec<String> = state.tags.iter().map(|t| norm(t)).collect();
        let categories: Vec<String> = state.categories.iter().map(|c| norm(c)).collect();

        self.index
            .iter()
            .filter(|quote| authors.is_empty() || authors.contains(&norm(&quote.author)))
            .filter(|quote| {
                tags.is_empty() || {
                    let quote_tags: Vec<String> = quote.tags.iter().map(|t| norm(t)).collect();
                    tags.iter().all(|tag| quote_tags.contains(tag))
                }
            })
            .filter(|quote| categories.is_empty() || categories.contains(&norm(&quote.category)))
            .filter(|quote| quote.popularity >= state.min_popularity)
            .take(self.config.max_results)
            .cloned()
            .collect()
    }
}

/// Returns a newly ordered copy; the input is never mutated. Every key
/// except `Random` sorts stably, so equal keys keep their input order.
/// `Random` reshuffles on every call.
pub fn sort_quotes(quotes: &[Quote], key: SortKey) -> Vec<Quote> {
    let mut sorted = quotes.to_vec();
    match key {
        SortKey::Popularity => sorted.sort_by(|a, b| {
            b.popularity
                .partial_cmp(&a.popularity)
                .unwrap_or(Ordering::Equal)
        }),
        SortKey::Author => sorted.sort_by(|a, b| a.author.cmp(&b.author)),
        SortKey::Length => {
            sorted.sort_by_key(|quote| quote.quote.chars().count());
        }
        SortKey::Random => sorted.shuffle(&mut thread_rng()),
    }
    sorted
}

/// Best ratio of the needle against any needle-length window of the
/// haystack. The fuzz module only ships whole-string ratios, so a short
/// needle against a full sentence needs this sliding scan to score like
/// a substring match.
fn best_window_score(
    scorer: &fuzz::RatioBatchComparator<char>,
    needle_len: usize,
    haystack: &str,
) -> f64 {
    let chars: Vec<char> = haystack.chars().collect();
    if chars.len() <= needle_len {
        return scorer.similarity(chars.iter().copied());
    }
    let mut best = 0.0_f64;
    for window in chars.windows(needle_len) {
        let score = scorer.similarity(window.iter().copied());
        if score > best {
            best = score;
            if best >= 100.0 {
                break;
            }
        }
    }
    best
}

fn norm(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(id: u64, text: &str, author: &str, tags: &[&str], category: &str, pop: f64) -> Quote {
        Quote {
            id,
            quote: text.to_string(),
            author: author.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            category: category.to_string(),
            popularity: pop,
        }
    }

    fn sample_index() -> Arc<Vec<Quote>> {
        Arc::new(vec![
            quote(
                0,
                "The secret of getting ahead is getting started.",
                "Mark Twain",
                &["humor"],
                "motivational",
                0.9,
            ),
            quote(
                1,
                "There is no charm equal to tenderness of heart.",
                "Jane Austen",
                &["love"],
                "love",
                0.7,
            ),
            quote(
                2,
                "Hope is the thing with feathers.",
                "Emily Dickinson",
                &["hope", "life"],
                "inspirational",
                0.8,
            ),
        ])
    }

    #[test]
    fn author_filter_is_exact_or() {
        let engine = SearchEngine::new(sample_index());
        let state = FilterState {
            authors: vec!["Mark Twain".to_string()],
            ..FilterState::default()
        };
        let hits = engine.filter(&state);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].author, "Mark Twain");
    }

    #[test]
    fn tag_filter_requires_every_selected_tag() {
        let engine = SearchEngine::new(sample_index());
        let state = FilterState {
            tags: vec!["Hope".to_string(), "life".to_string()],
            ..FilterState::default()
        };
        let hits = engine.filter(&state);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);

        let partial = FilterState {
            tags: vec!["hope".to_string(), "humor".to_string()],
            ..FilterState::default()
        };
        assert!(engine.filter(&partial).is_empty());
    }

    #[test]
    fn category_filter_is_case_insensitive_union() {
        let engine = SearchEngine::new(sample_index());
        let state = FilterState {
            categories: vec!["LOVE".to_string(), "motivational".to_string()],
            ..FilterState::default()
        };
        let hits = engine.filter(&state);
        let ids: Vec<u64> = hits.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn empty_selections_are_no_constraint() {
        let engine = SearchEngine::new(sample_index());
        assert_eq!(engine.filter(&FilterState::default()).len(), 3);
    }

    #[test]
    fn popularity_floor_applies() {
        let engine = SearchEngine::new(sample_index());
        let state = FilterState {
            min_popularity: 0.75,
            ..FilterState::default()
        };
        let ids: Vec<u64> = engine.filter(&state).iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn filter_respects_result_cap() {
        let many: Vec<Quote> = (0..80)
            .map(|i| quote(i, "same", "a", &[], "c", 0.5))
            .collect();
        let engine = SearchEngine::new(Arc::new(many));
        assert_eq!(engine.filter(&FilterState::default()).len(), 50);
    }

    #[test]
    fn search_scores_short_terms_as_substrings() {
        // A three-word needle against a full sentence must score on its
        // best window, not on the whole-string ratio, which would fall
        // under the cutoff.
        let engine = SearchEngine::new(sample_index());
        let hits = engine.search("tenderness");
        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, 1);

        let exact = engine.search("getting started");
        assert!(!exact.is_empty());
        assert_eq!(exact[0].id, 0);
    }

    #[test]
    fn search_respects_result_cap() {
        let many: Vec<Quote> = (0..80)
            .map(|i| quote(i, "the same exact words", "a", &[], "c", 0.5))
            .collect();
        let engine = SearchEngine::new(Arc::new(many));
        let hits = engine.search("same exact");
        assert_eq!(hits.len(), 50);
        // Equal scores fall back to index order.
        assert_eq!(hits[0].id, 0);
        assert_eq!(hits[49].id, 49);
    }

    #[test]
    fn default_term_floor_matches_routing_threshold() {
        assert_eq!(SearchConfig::default().min_term_len, MIN_SEARCH_LEN);
    }

    #[test]
    fn search_tolerates_transposed_characters() {
        let engine = SearchEngine::new(sample_index());
        let hits = engine.search("faethers");
        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn search_matches_author_names() {
        let engine = SearchEngine::new(sample_index());
        let hits = engine.search("dickinson");
        assert!(!hits.is_empty());
        assert_eq!(hits[0].author, "Emily Dickinson");
    }

    #[test]
    fn short_terms_return_nothing() {
        let engine = SearchEngine::new(sample_index());
        assert!(engine.search("").is_empty());
        assert!(engine.search("ab").is_empty());
    }

    #[test]
    fn sort_is_stable_and_non_mutating() {
        let input = vec![
            quote(0, "bb", "Zed", &[], "c", 0.5),
            quote(1, "aa", "Amy", &[], "c", 0.5),
            quote(2, "cc", "Amy", &[], "c", 0.5),
        ];
        let snapshot = input.clone();
        let by_author = sort_quotes(&input, SortKey::Author);
        assert_eq!(input, snapshot);
        let ids: Vec<u64> = by_author.iter().map(|q| q.id).collect();
        // Equal authors keep input order.
        assert_eq!(ids, vec![1, 2, 0]);
        assert_eq!(sort_quotes(&input, SortKey::Author), by_author);
    }

    #[test]
    fn popularity_sorts_descending_and_length_ascending() {
        let input = vec![
            quote(0, "long quote text", "a", &[], "c", 0.2),
            quote(1, "tiny", "b", &[], "c", 0.9),
        ];
        let by_pop: Vec<u64> = sort_quotes(&input, SortKey::Popularity)
            .iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(by_pop, vec![1, 0]);
        let by_len: Vec<u64> = sort_quotes(&input, SortKey::Length)
            .iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(by_len, vec![1, 0]);
    }
}
