use clap::Parser;

pub mod catalog;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod models;
pub mod search;

pub use catalog::{Catalog, GoogleBooksCatalog, OpenLibraryCatalog};
pub use config::AppConfig;
pub use db::{KeyValueStore, MemoryStore, SqliteStore};
pub use error::{SearchError, StoreError};
pub use library::{LibraryCommand, LibraryStore};
pub use models::{BookPatch, BookRecord, CatalogSource, Draft, FilterMode, SearchResultItem};
pub use search::{merge, CatalogSearch, SearchOutcome};

pub fn run() {
  let default_level = if cfg!(debug_assertions) { "info" } else { "warn" };
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

  let cli = cli::Cli::parse();
  if let Err(err) = cli::execute(cli) {
    eprintln!("error: {}", err);
    std::process::exit(1);
  }
}
