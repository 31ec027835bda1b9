use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_DAILY_TARGET: u32 = 20;
pub const DEFAULT_DRAFT_TOTAL: u32 = 200;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub id: String, // UUID
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub total: u32,
    pub current: u32,
    pub daily_target: u32,
}

impl BookRecord {
    pub fn progress_percent(&self) -> f64 {
        let total = self.total.max(1) as f64;
        (self.current as f64 / total * 100.0).min(100.0)
    }

    pub fn is_done(&self) -> bool {
        self.current >= self.total.max(1)
    }
}

/// Partial update for a record. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct BookPatch {
    pub title: Option<String>,
    /// `Some(None)` clears the author.
    pub author: Option<Option<String>>,
    pub total: Option<i64>,
    pub current: Option<i64>,
    pub daily_target: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FilterMode {
    #[default]
    All,
    Active,
    Done,
}

impl FilterMode {
    pub fn matches(self, record: &BookRecord) -> bool {
        match self {
            FilterMode::All => true,
            FilterMode::Active => !record.is_done(),
            FilterMode::Done => record.is_done(),
        }
    }
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FilterMode::All),
            "active" => Ok(FilterMode::Active),
            "done" => Ok(FilterMode::Done),
            other => Err(format!("unknown filter: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogSource {
    GoogleBooks,
    OpenLibrary,
}

impl fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogSource::GoogleBooks => f.write_str("google"),
            CatalogSource::OpenLibrary => f.write_str("openlibrary"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultItem {
    pub source: CatalogSource,
    pub title: String,
    pub authors: Vec<String>,
    /// `None` means the catalog did not know the page count.
    pub page_count: Option<u32>,
    pub info_link: String,
    pub cover: String,
}

impl SearchResultItem {
    pub fn first_author(&self) -> &str {
        self.authors.first().map(String::as_str).unwrap_or("")
    }
}

/// A candidate record staged from a search pick, not yet in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub title: String,
    pub author: String,
    pub total: u32,
    pub daily_target: u32,
}

impl Default for Draft {
    fn default() -> Self {
        Draft {
            title: String::new(),
            author: String::new(),
            total: DEFAULT_DRAFT_TOTAL,
            daily_target: DEFAULT_DAILY_TARGET,
        }
    }
}

impl Draft {
    pub fn from_pick(item: &SearchResultItem) -> Self {
        Draft {
            title: item.title.clone(),
            author: item.first_author().to_string(),
            total: item.page_count.unwrap_or(DEFAULT_DRAFT_TOTAL),
            daily_target: DEFAULT_DAILY_TARGET,
        }
    }
}
