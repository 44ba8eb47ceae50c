use std::{
    collections::HashSet,
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::entry::CatalogEntry;

/// Structural failures while reading a catalog source.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Source file missing or unreadable.
    #[error("reading catalog {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Source is not valid JSON.
    #[error("catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Root value is not an array.
    #[error("catalog root must be an array, found {0}")]
    NotAnArray(&'static str),
}

/// Read-only collection of entries, replaced wholesale on reload.
///
/// Readers take a cheap `Arc` snapshot, so retrieval never observes a
/// half-applied reload.
pub struct Catalog<E> {
    entries: RwLock<Arc<[E]>>,
}

impl<E> fmt::Debug for Catalog<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

impl<E: CatalogEntry> Default for Catalog<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CatalogEntry> Catalog<E> {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Creates a catalog from in-memory entries, applying the same filtering
    /// as a load.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = E>) -> Self {
        let catalog = Self::new();
        catalog.install(sanitize(entries));
        catalog
    }

    /// Parses a JSON array of entries. Elements that are not objects, fail to
    /// deserialize, or have an empty key are skipped.
    pub fn try_parse(raw: &str) -> Result<Vec<E>, CatalogError> {
        let root: Value = serde_json::from_str(raw)?;
        let Value::Array(items) = root else {
            return Err(CatalogError::NotAnArray(json_kind(&root)));
        };
        let parsed = items.into_iter().filter_map(|item| {
            if !item.is_object() {
                return None;
            }
            match serde_json::from_value::<E>(item) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!(kind = E::KIND, error = %err, "skipping malformed catalog entry");
                    None
                }
            }
        });
        Ok(sanitize(parsed))
    }

    /// Reads and parses a catalog file.
    pub fn read(path: impl AsRef<Path>) -> Result<Vec<E>, CatalogError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::try_parse(&raw)
    }

    /// Replaces the entries from a JSON string. Returns whether at least one
    /// entry was loaded; structural failures keep the previous entries.
    pub fn load_json(&self, raw: &str) -> bool {
        match Self::try_parse(raw) {
            Ok(entries) => self.install(entries),
            Err(err) => {
                warn!(kind = E::KIND, error = %err, "catalog load failed, keeping previous entries");
                false
            }
        }
    }

    /// Replaces the entries from a JSON file. Same semantics as
    /// [`Catalog::load_json`].
    pub fn load_path(&self, path: impl AsRef<Path>) -> bool {
        match Self::read(path) {
            Ok(entries) => self.install(entries),
            Err(err) => {
                warn!(kind = E::KIND, error = %err, "catalog load failed, keeping previous entries");
                false
            }
        }
    }

    /// Current entries.
    #[must_use]
    pub fn snapshot(&self) -> Arc<[E]> {
        Arc::clone(&self.entries.read())
    }

    /// Case-insensitive lookup by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<E> {
        let key = key.to_lowercase();
        self.snapshot()
            .iter()
            .find(|entry| entry.key().to_lowercase() == key)
            .cloned()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the catalog holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn install(&self, entries: Vec<E>) -> bool {
        let loaded = !entries.is_empty();
        debug!(kind = E::KIND, entries = entries.len(), "catalog installed");
        *self.entries.write() = Arc::from(entries);
        loaded
    }
}

/// Normalizes entries, drops empty keys and keeps the first of any
/// case-insensitive duplicate.
fn sanitize<E: CatalogEntry>(entries: impl IntoIterator<Item = E>) -> Vec<E> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter_map(|mut entry| {
            entry.normalize();
            if entry.key().is_empty() {
                return None;
            }
            if !seen.insert(entry.key().to_lowercase()) {
                debug!(kind = E::KIND, key = entry.key(), "duplicate catalog key ignored");
                return None;
            }
            Some(entry)
        })
        .collect()
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
