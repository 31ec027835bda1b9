use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::catalog::{search_debug_enabled, Catalog};
use crate::config::DEFAULT_RESULT_LIMIT;
use crate::error::SearchError;
use crate::models::{CatalogSource, Draft, SearchResultItem};

pub const SEARCH_ERROR_MESSAGE: &str = "Search failed. Please try again.";

/// Identifies one `search` invocation; only the latest ticket may publish results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTicket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Blank query; nothing was looked up.
    Skipped,
    Applied { count: usize },
    /// One catalog failed, the other's results were applied.
    Partial { count: usize, failed: CatalogSource },
    /// Every catalog failed; previous results are kept.
    Failed,
    /// A newer search was issued while this one was in flight.
    Stale,
}

#[derive(Debug, Default)]
struct SearchState {
    results: Vec<SearchResultItem>,
    error: Option<String>,
}

pub struct CatalogSearch {
    primary: Box<dyn Catalog>,
    secondary: Box<dyn Catalog>,
    limit: usize,
    latest: AtomicU64,
    state: Mutex<SearchState>,
}

pub fn merge_key(item: &SearchResultItem) -> String {
    format!(
        "{}|{}",
        item.title.to_lowercase(),
        item.first_author().to_lowercase()
    )
    .trim()
    .to_string()
}

/// Merges two result lists by title and first author. Items from `primary`
/// win; later duplicates only fill fields that are still empty.
pub fn merge(
    primary: Vec<SearchResultItem>,
    secondary: Vec<SearchResultItem>,
) -> Vec<SearchResultItem> {
    let mut merged: Vec<SearchResultItem> = Vec::with_capacity(primary.len() + secondary.len());
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for item in primary.into_iter().chain(secondary) {
        let key = merge_key(&item);
        match index_by_key.get(&key).copied() {
            Some(index) => {
                let existing = &mut merged[index];
                if existing.page_count.is_none() {
                    existing.page_count = item.page_count;
                }
                if existing.info_link.is_empty() {
                    existing.info_link = item.info_link;
                }
                if existing.cover.is_empty() {
                    existing.cover = item.cover;
                }
            }
            None => {
                index_by_key.insert(key, merged.len());
                merged.push(item);
            }
        }
    }
    merged
}

impl CatalogSearch {
    pub fn new(primary: Box<dyn Catalog>, secondary: Box<dyn Catalog>) -> Self {
        CatalogSearch {
            primary,
            secondary,
            limit: DEFAULT_RESULT_LIMIT,
            latest: AtomicU64::new(0),
            state: Mutex::new(SearchState::default()),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn search(&self, query: &str) -> SearchOutcome {
        let query = query.trim();
        if query.is_empty() {
            return SearchOutcome::Skipped;
        }
        let ticket = self.begin();
        if search_debug_enabled() {
            log::info!("[search-debug] search start ticket={} query=\"{}\"", ticket.0, query);
        }
        let primary = self.primary.lookup(query, self.limit);
        let secondary = self.secondary.lookup(query, self.limit);
        self.finish(ticket, primary, secondary)
    }

    pub fn begin(&self) -> SearchTicket {
        SearchTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_latest(&self, ticket: SearchTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    pub fn finish(
        &self,
        ticket: SearchTicket,
        primary: Result<Vec<SearchResultItem>, SearchError>,
        secondary: Result<Vec<SearchResultItem>, SearchError>,
    ) -> SearchOutcome {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Checked under the lock so a stale response can never overwrite a newer one.
        if !self.is_latest(ticket) {
            log::debug!("discarding stale search response ticket={}", ticket.0);
            return SearchOutcome::Stale;
        }

        let (merged, failed) = match (primary, secondary) {
            (Ok(a), Ok(b)) => (merge(a, b), None),
            (Ok(a), Err(err)) => {
                log::warn!("{} lookup failed: {}", self.secondary.source(), err);
                (merge(a, vec![]), Some(self.secondary.source()))
            }
            (Err(err), Ok(b)) => {
                log::warn!("{} lookup failed: {}", self.primary.source(), err);
                (merge(vec![], b), Some(self.primary.source()))
            }
            (Err(a_err), Err(b_err)) => {
                log::warn!(
                    "catalog search failed: {}={} {}={}",
                    self.primary.source(),
                    a_err,
                    self.secondary.source(),
                    b_err
                );
                state.error = Some(SEARCH_ERROR_MESSAGE.to_string());
                return SearchOutcome::Failed;
            }
        };

        let count = merged.len().min(DEFAULT_RESULT_LIMIT);
        state.results = merged;
        state.error = None;
        if search_debug_enabled() {
            log::info!("[search-debug] search applied ticket={} results={}", ticket.0, count);
        }
        match failed {
            Some(failed) => SearchOutcome::Partial { count, failed },
            None => SearchOutcome::Applied { count },
        }
    }

    /// Merged results, capped for display.
    pub fn results(&self) -> Vec<SearchResultItem> {
        self.with_state(|state| {
            state
                .results
                .iter()
                .take(DEFAULT_RESULT_LIMIT)
                .cloned()
                .collect()
        })
    }

    pub fn error(&self) -> Option<String> {
        self.with_state(|state| state.error.clone())
    }

    pub fn pick(&self, index: usize) -> Option<Draft> {
        self.with_state(|state| {
            state
                .results
                .iter()
                .take(DEFAULT_RESULT_LIMIT)
                .nth(index)
                .map(Draft::from_pick)
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&SearchState) -> T) -> T {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&state)
    }
}
