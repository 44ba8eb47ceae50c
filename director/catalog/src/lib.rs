#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Catalogs of executable actions and the lexical retriever that ranks them
//! against a free-form directive.
//!
//! Two independent catalogs exist: world actions (keyed by intent) and console
//! commands (keyed by command name). Both are loaded from JSON arrays, are
//! read-only afterwards, and are only ever replaced wholesale.

/// Catalog entry shapes.
pub mod entry;
/// Ranking of entries against a query.
pub mod retrieval;
/// Snapshot-swapping catalog storage and JSON ingestion.
pub mod store;
/// Tokenizer and term-frequency similarity.
pub mod text;

pub use entry::{CatalogEntry, ConsoleCommandEntry, WorldActionEntry};
pub use retrieval::{Candidate, Retriever, ScoringProfile};
pub use store::{Catalog, CatalogError};
pub use text::{cosine_like, tokenize};

/// Catalog of world actions.
pub type WorldCatalog = Catalog<WorldActionEntry>;
/// Catalog of console commands.
pub type ConsoleCatalog = Catalog<ConsoleCommandEntry>;
