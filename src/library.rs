use uuid::Uuid;

use crate::db::KeyValueStore;
use crate::error::StoreError;
use crate::models::{BookPatch, BookRecord, Draft, FilterMode, DEFAULT_DAILY_TARGET};

pub const BOOKS_KEY: &str = "books";

/// Explicit mutations accepted by the library, including drafts handed over from search.
#[derive(Debug, Clone)]
pub enum LibraryCommand {
    Add {
        title: String,
        total: i64,
        author: Option<String>,
        daily_target: Option<i64>,
    },
    Update {
        id: String,
        patch: BookPatch,
    },
    Remove {
        id: String,
    },
    AdjustPages {
        id: String,
        delta: i64,
    },
    CommitDraft(Draft),
}

pub struct LibraryStore<S: KeyValueStore> {
    storage: S,
    books: Vec<BookRecord>,
}

pub fn seed_books() -> Vec<BookRecord> {
    vec![BookRecord {
        id: Uuid::new_v4().to_string(),
        title: "サンプル本".to_string(),
        author: Some("みきG".to_string()),
        total: 320,
        current: 90,
        daily_target: DEFAULT_DAILY_TARGET,
    }]
}

impl<S: KeyValueStore> LibraryStore<S> {
    /// Loads the collection, falling back to the seed on any read or parse failure.
    pub fn open(storage: S) -> Self {
        let books = load_books(&storage);
        let mut store = LibraryStore { storage, books };
        if let Err(err) = store.persist() {
            log::warn!("failed to persist library after load: {}", err);
        }
        store
    }

    pub fn books(&self) -> &[BookRecord] {
        &self.books
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn get(&self, id: &str) -> Option<&BookRecord> {
        self.books.iter().find(|book| book.id == id)
    }

    /// Resolves a full id or a unique prefix of one.
    pub fn resolve_id(&self, prefix: &str) -> Option<String> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return None;
        }
        if let Some(book) = self.get(prefix) {
            return Some(book.id.clone());
        }
        let mut matches = self.books.iter().filter(|book| book.id.starts_with(prefix));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first.id.clone())
    }

    pub fn list(&self, mode: FilterMode) -> Vec<&BookRecord> {
        self.books.iter().filter(|book| mode.matches(book)).collect()
    }

    pub fn add(
        &mut self,
        title: &str,
        total: i64,
        author: Option<&str>,
        daily_target: Option<i64>,
    ) -> Result<Option<BookRecord>, StoreError> {
        let title = title.trim();
        if title.is_empty() || total <= 0 {
            log::debug!("ignored add: title=\"{}\" total={}", title, total);
            return Ok(None);
        }
        let record = BookRecord {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            author: author
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            total: to_positive_u32(total),
            current: 0,
            daily_target: daily_target
                .map(to_positive_u32)
                .unwrap_or(DEFAULT_DAILY_TARGET),
        };
        self.books.insert(0, record.clone());
        self.persist()?;
        log::info!("added book id={} title=\"{}\"", record.id, record.title);
        Ok(Some(record))
    }

    pub fn commit_draft(&mut self, draft: Draft) -> Result<Option<BookRecord>, StoreError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Ok(None);
        }
        let record = BookRecord {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            author: Some(draft.author.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            total: draft.total.max(1),
            current: 0,
            daily_target: draft.daily_target.max(1),
        };
        self.books.insert(0, record.clone());
        self.persist()?;
        log::info!("committed draft id={} title=\"{}\"", record.id, record.title);
        Ok(Some(record))
    }

    pub fn update(&mut self, id: &str, patch: BookPatch) -> Result<Option<BookRecord>, StoreError> {
        let Some(book) = self.books.iter_mut().find(|book| book.id == id) else {
            return Ok(None);
        };

        if let Some(title) = patch.title {
            let title = title.trim();
            if !title.is_empty() {
                book.title = title.to_string();
            }
        }
        if let Some(author) = patch.author {
            book.author = author
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());
        }
        if let Some(total) = patch.total.filter(|total| *total > 0) {
            book.total = to_positive_u32(total);
        }
        if let Some(daily_target) = patch.daily_target.filter(|target| *target > 0) {
            book.daily_target = to_positive_u32(daily_target);
        }
        let current = patch.current.unwrap_or(book.current as i64);
        book.current = clamp_pages(current, book.total);

        let updated = book.clone();
        self.persist()?;
        Ok(Some(updated))
    }

    pub fn adjust_pages(&mut self, id: &str, delta: i64) -> Result<Option<BookRecord>, StoreError> {
        let Some(current) = self.get(id).map(|book| book.current as i64) else {
            return Ok(None);
        };
        self.update(
            id,
            BookPatch {
                current: Some(current.saturating_add(delta)),
                ..BookPatch::default()
            },
        )
    }

    pub fn remove(&mut self, id: &str) -> Result<Option<BookRecord>, StoreError> {
        let Some(index) = self.books.iter().position(|book| book.id == id) else {
            return Ok(None);
        };
        let removed = self.books.remove(index);
        self.persist()?;
        log::info!("removed book id={}", removed.id);
        Ok(Some(removed))
    }

    pub fn apply(&mut self, command: LibraryCommand) -> Result<Option<BookRecord>, StoreError> {
        match command {
            LibraryCommand::Add {
                title,
                total,
                author,
                daily_target,
            } => self.add(&title, total, author.as_deref(), daily_target),
            LibraryCommand::Update { id, patch } => self.update(&id, patch),
            LibraryCommand::Remove { id } => self.remove(&id),
            LibraryCommand::AdjustPages { id, delta } => self.adjust_pages(&id, delta),
            LibraryCommand::CommitDraft(draft) => self.commit_draft(draft),
        }
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&self.books)?;
        self.storage.set(BOOKS_KEY, &payload)
    }
}

fn load_books<S: KeyValueStore>(storage: &S) -> Vec<BookRecord> {
    let raw = match storage.get(BOOKS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return seed_books(),
        Err(err) => {
            log::warn!("failed to read library, using seed: {}", err);
            return seed_books();
        }
    };
    match serde_json::from_str::<Option<Vec<BookRecord>>>(&raw) {
        Ok(Some(books)) => books,
        Ok(None) => seed_books(),
        Err(err) => {
            log::warn!("stored library is unreadable, using seed: {}", err);
            seed_books()
        }
    }
}

fn clamp_pages(value: i64, total: u32) -> u32 {
    value.clamp(0, total as i64) as u32
}

fn to_positive_u32(value: i64) -> u32 {
    value.clamp(1, u32::MAX as i64) as u32
}
