// SPDX-License-Identifier: Apache-2.0

//! JSON file-based persistence with atomic writes.
//!
//! State is kept in memory, grouped by scope, and written to disk as one JSON
//! document. Writes go to a temp file that is then renamed over the database.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::sources::file::error::{Error, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct DatabaseState {
    scopes: HashMap<String, HashMap<String, serde_json::Value>>,
}

/// A shared JSON file database handle
#[derive(Clone)]
pub struct JsonFileDatabase {
    path: PathBuf,
    state: Arc<RwLock<DatabaseState>>,
}

impl JsonFileDatabase {
    /// Open or create a database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let file = File::open(&path)
                .map_err(|e| Error::Persistence(format!("failed to open database: {}", e)))?;
            let reader = BufReader::new(file);
            serde_json::from_reader(reader)
                .map_err(|e| Error::Persistence(format!("failed to parse database: {}", e)))?
        } else {
            DatabaseState::default()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Create an in-memory database that is never written to disk
    pub fn open_memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(DatabaseState::default())),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        if self.is_memory() {
            None
        } else {
            Some(&self.path)
        }
    }

    fn is_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    /// Create a persister for one scope
    pub fn persister(&self, scope: impl Into<String>) -> JsonFilePersister {
        JsonFilePersister {
            db: self.clone(),
            scope: scope.into(),
            cache: HashMap::new(),
        }
    }

    /// Write the current state to disk
    pub fn flush(&self) -> Result<()> {
        if self.is_memory() {
            return Ok(());
        }

        let state = self
            .state
            .read()
            .map_err(|e| Error::Persistence(e.to_string()))?;

        atomic_write(&self.path, &state)
    }
}

impl fmt::Debug for JsonFileDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFileDatabase")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A view of one scope of a [`JsonFileDatabase`].
///
/// Changes are made to a local cache; `load` refreshes it from the database
/// and `sync` writes it back and flushes the database to disk.
pub struct JsonFilePersister {
    db: JsonFileDatabase,
    scope: String,
    cache: HashMap<String, serde_json::Value>,
}

impl JsonFilePersister {
    /// Store a value as raw JSON, keeping the database human-readable
    pub fn set_raw_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| Error::Persistence(format!("failed to serialize to JSON: {}", e)))?;
        self.cache.insert(key.to_string(), json_value);
        Ok(())
    }

    /// Returns Ok(None) if the key doesn't exist, Err if it exists but doesn't deserialize
    pub fn try_get_raw_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> std::result::Result<Option<T>, serde_json::Error> {
        match self.cache.get(key) {
            None => Ok(None),
            Some(v) => serde_json::from_value(v.clone()).map(Some),
        }
    }

    /// Replace the cache with the scope's current contents in the database.
    pub fn load(&mut self) -> Result<()> {
        let state = self
            .db
            .state
            .read()
            .map_err(|e| Error::Persistence(e.to_string()))?;

        self.cache = state.scopes.get(&self.scope).cloned().unwrap_or_default();
        Ok(())
    }

    /// Replace the scope in the database with the cache and flush to disk.
    pub fn sync(&self) -> Result<()> {
        self.db
            .state
            .write()
            .map_err(|e| Error::Persistence(e.to_string()))?
            .scopes
            .insert(self.scope.clone(), self.cache.clone());

        self.db.flush()
    }
}

impl fmt::Debug for JsonFilePersister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFilePersister")
            .field("scope", &self.scope)
            .field("keys", &self.cache.len())
            .finish()
    }
}

/// Write state to file atomically (write to temp, then rename)
fn atomic_write(path: &Path, state: &DatabaseState) -> Result<()> {
    use portable_atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!("failed to create parent directory: {}", e))
            })?;
        }
    }

    // Unique per process and per write, so concurrent writers never share a temp file
    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), unique_id));

    let file = File::create(&temp_path)
        .map_err(|e| Error::Persistence(format!("failed to create temp file: {}", e)))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, state)
        .map_err(|e| Error::Persistence(format!("failed to write database: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Persistence(format!("failed to flush database: {}", e)))?;
    drop(writer);

    fs::rename(&temp_path, path)
        .map_err(|e| Error::Persistence(format!("failed to rename database file: {}", e)))?;

    Ok(())
}
