use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::catalog::{GoogleBooksCatalog, OpenLibraryCatalog};
use crate::config::AppConfig;
use crate::db::{KeyValueStore, SqliteStore};
use crate::library::{LibraryCommand, LibraryStore};
use crate::models::{BookPatch, BookRecord, Draft, FilterMode, SearchResultItem};
use crate::search::{CatalogSearch, SearchOutcome, SEARCH_ERROR_MESSAGE};

#[derive(Parser)]
#[command(name = "readlog")]
#[command(about = "Track reading progress and find books in public catalogs", long_about = None)]
pub struct Cli {
    /// Library database file (defaults to the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tracked books
    List {
        #[arg(short, long, value_enum, default_value_t = FilterMode::All)]
        filter: FilterMode,
    },

    /// Add a book by hand
    Add {
        title: String,
        /// Total page count
        #[arg(allow_negative_numbers = true)]
        total: i64,
        #[arg(short, long)]
        author: Option<String>,
        /// Pages per day goal
        #[arg(short, long)]
        daily_target: Option<i64>,
    },

    /// Edit fields of a book
    Set {
        /// Book id or unique id prefix
        id: String,
        #[arg(long)]
        title: Option<String>,
        /// Author name; pass an empty string to clear it
        #[arg(long)]
        author: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        total: Option<i64>,
        #[arg(long, allow_negative_numbers = true)]
        current: Option<i64>,
        #[arg(long, allow_negative_numbers = true)]
        daily_target: Option<i64>,
    },

    /// Move the read-page count forward or back
    Read {
        /// Book id or unique id prefix
        id: String,
        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },

    /// Remove a book
    Remove {
        /// Book id or unique id prefix
        id: String,
    },

    /// Search Google Books and Open Library, optionally adding a result
    Search {
        query: String,
        /// Result number to add to the library (1-based)
        #[arg(short, long)]
        pick: Option<usize>,
        /// Override the picked title
        #[arg(long)]
        title: Option<String>,
        /// Override the picked author
        #[arg(long)]
        author: Option<String>,
        /// Override the picked page count
        #[arg(long)]
        total: Option<u32>,
        #[arg(long)]
        daily_target: Option<u32>,
    },
}

pub fn execute(cli: Cli) -> Result<(), String> {
    let mut config = AppConfig::from_env();
    if let Some(db) = cli.db {
        config.db_path = Some(db);
    }
    let db_path = config.resolve_db_path().map_err(|err| err.to_string())?;
    log::debug!("using library at {}", db_path.display());
    let storage = SqliteStore::open(&db_path).map_err(|err| err.to_string())?;
    let mut library = LibraryStore::open(storage);

    match cli.command {
        Commands::List { filter } => {
            let books = library.list(filter);
            if books.is_empty() {
                println!("No books.");
            }
            for book in books {
                println!("{}", format_book(book));
            }
        }
        Commands::Add {
            title,
            total,
            author,
            daily_target,
        } => {
            let added = library
                .apply(LibraryCommand::Add {
                    title,
                    total,
                    author,
                    daily_target,
                })
                .map_err(|err| err.to_string())?;
            match added {
                Some(book) => println!("Added {}", format_book(&book)),
                None => println!("Nothing added: a title and a positive page count are required."),
            }
        }
        Commands::Set {
            id,
            title,
            author,
            total,
            current,
            daily_target,
        } => {
            let id = resolve(&library, &id)?;
            let patch = BookPatch {
                title,
                author: author.map(|value| Some(value).filter(|value| !value.trim().is_empty())),
                total,
                current,
                daily_target,
            };
            let updated = library
                .apply(LibraryCommand::Update { id, patch })
                .map_err(|err| err.to_string())?;
            if let Some(book) = updated {
                println!("{}", format_book(&book));
            }
        }
        Commands::Read { id, delta } => {
            let id = resolve(&library, &id)?;
            let updated = library
                .apply(LibraryCommand::AdjustPages { id, delta })
                .map_err(|err| err.to_string())?;
            if let Some(book) = updated {
                println!("{}", format_book(&book));
            }
        }
        Commands::Remove { id } => {
            let id = resolve(&library, &id)?;
            let removed = library
                .apply(LibraryCommand::Remove { id })
                .map_err(|err| err.to_string())?;
            if let Some(book) = removed {
                println!("Removed \"{}\"", book.title);
            }
        }
        Commands::Search {
            query,
            pick,
            title,
            author,
            total,
            daily_target,
        } => {
            let search = CatalogSearch::new(
                Box::new(GoogleBooksCatalog::new(&config).map_err(|err| err.to_string())?),
                Box::new(OpenLibraryCatalog::new(&config).map_err(|err| err.to_string())?),
            )
            .with_limit(config.result_limit);

            let edits = DraftEdits {
                title,
                author,
                total,
                daily_target,
            };
            match search_and_pick(&search, &mut library, &query, pick, edits)? {
                SearchReport::EmptyQuery => println!("Enter a title to search for."),
                SearchReport::Listed(results) => {
                    if results.is_empty() {
                        println!("No results.");
                    }
                    for (index, item) in results.iter().enumerate() {
                        println!("{:>2}. {}", index + 1, format_result(item));
                    }
                }
                SearchReport::Added(book) => println!("Added {}", format_book(&book)),
                SearchReport::NothingAdded => {
                    println!("Nothing added: the picked result has no title.")
                }
            }
        }
    }
    Ok(())
}

/// Field overrides applied to a picked draft before it is committed.
#[derive(Debug, Default)]
struct DraftEdits {
    title: Option<String>,
    author: Option<String>,
    total: Option<u32>,
    daily_target: Option<u32>,
}

impl DraftEdits {
    fn apply_to(self, draft: &mut Draft) {
        if let Some(title) = self.title {
            draft.title = title;
        }
        if let Some(author) = self.author {
            draft.author = author;
        }
        if let Some(total) = self.total {
            draft.total = total;
        }
        if let Some(daily_target) = self.daily_target {
            draft.daily_target = daily_target;
        }
    }
}

#[derive(Debug)]
enum SearchReport {
    EmptyQuery,
    Listed(Vec<SearchResultItem>),
    Added(BookRecord),
    NothingAdded,
}

/// Runs a catalog search; with `pick` (1-based) the chosen result is staged,
/// edited and committed to the library.
fn search_and_pick<S: KeyValueStore>(
    search: &CatalogSearch,
    library: &mut LibraryStore<S>,
    query: &str,
    pick: Option<usize>,
    edits: DraftEdits,
) -> Result<SearchReport, String> {
    match search.search(query) {
        SearchOutcome::Skipped => return Ok(SearchReport::EmptyQuery),
        SearchOutcome::Failed | SearchOutcome::Stale => {
            return Err(search
                .error()
                .unwrap_or_else(|| SEARCH_ERROR_MESSAGE.to_string()));
        }
        SearchOutcome::Partial { failed, .. } => {
            eprintln!("warning: {} did not respond; results may be incomplete", failed);
        }
        SearchOutcome::Applied { .. } => {}
    }

    let Some(number) = pick else {
        return Ok(SearchReport::Listed(search.results()));
    };

    let mut draft = number
        .checked_sub(1)
        .and_then(|index| search.pick(index))
        .ok_or_else(|| format!("No search result numbered {}", number))?;
    edits.apply_to(&mut draft);

    let added = library
        .apply(LibraryCommand::CommitDraft(draft))
        .map_err(|err| err.to_string())?;
    Ok(match added {
        Some(book) => SearchReport::Added(book),
        None => SearchReport::NothingAdded,
    })
}

fn resolve<S: KeyValueStore>(library: &LibraryStore<S>, id: &str) -> Result<String, String> {
    library
        .resolve_id(id)
        .ok_or_else(|| format!("No single book matches id \"{}\"", id))
}

fn format_book(book: &BookRecord) -> String {
    format!(
        "{}  {} ({}/{}p, {:.0}%) by {}",
        short_id(&book.id),
        book.title,
        book.current,
        book.total,
        book.progress_percent(),
        book.author.as_deref().unwrap_or("unknown author")
    )
}

fn format_result(item: &SearchResultItem) -> String {
    let authors = if item.authors.is_empty() {
        "unknown author".to_string()
    } else {
        item.authors.join(", ")
    };
    let pages = item
        .page_count
        .map(|count| count.to_string())
        .unwrap_or_else(|| "?".to_string());
    let mut line = format!("{} by {} [{} pages, {}]", item.title, authors, pages, item.source);
    if !item.info_link.is_empty() {
        line.push_str(&format!(" {}", item.info_link));
    }
    line
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
