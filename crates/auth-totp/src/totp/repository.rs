//! Entry metadata persistence.
//!
//! The repository owns id assignment. Ids grow monotonically and are never
//! handed out twice, even after the entry holding one is deleted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::totp::types::*;

/// Persistence interface for entry metadata.
#[cfg_attr(test, mockall::automock)]
pub trait EntryRepository {
    /// Every stored entry, in storage order.
    fn load_all(&self) -> Result<Vec<Entry>, TotpError>;

    /// Store a new entry; the `id` field is ignored and the assigned id returned.
    fn insert(&mut self, entry: Entry) -> Result<u64, TotpError>;

    /// Replace the entry with the same id; `Ok(false)` if no such entry.
    fn update(&mut self, entry: &Entry) -> Result<bool, TotpError>;

    /// Delete by id; `Ok(false)` if no such entry.
    fn delete(&mut self, id: u64) -> Result<bool, TotpError>;

    /// Drop every entry and the backing storage itself.
    fn clear(&mut self) -> Result<(), TotpError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Shared document model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// On-disk layout of the entry database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDatabase {
    /// Next id to hand out.
    #[serde(default = "first_id")]
    pub next_id: u64,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

fn first_id() -> u64 {
    1
}

impl Default for EntryDatabase {
    fn default() -> Self {
        Self {
            next_id: first_id(),
            entries: Vec::new(),
        }
    }
}

impl EntryDatabase {
    /// Raise `next_id` past every stored id, in case a file was edited by hand.
    ///
    /// A stored `u64::MAX` pins `next_id` there; `insert` never hands that
    /// value out, so it cannot collide.
    fn normalise(&mut self) {
        let floor = self
            .entries
            .iter()
            .map(|e| e.id.checked_add(1).unwrap_or(u64::MAX))
            .max()
            .unwrap_or(1);
        self.next_id = self.next_id.max(floor).max(1);
    }

    fn insert(&mut self, mut entry: Entry) -> Result<u64, TotpError> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or_else(|| {
            TotpError::new(TotpErrorKind::StorageError, "Entry id space exhausted")
                .with_detail(format!("next id {}", id))
        })?;
        entry.id = id;
        self.entries.push(entry);
        Ok(id)
    }

    fn update(&mut self, entry: &Entry) -> bool {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(slot) => {
                *slot = entry.clone();
                true
            }
            None => false,
        }
    }

    fn delete(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  In-memory repository
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Repository kept entirely in memory. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    db: Arc<Mutex<EntryDatabase>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with entries that already carry ids.
    pub fn with_entries(entries: Vec<Entry>) -> Self {
        let mut db = EntryDatabase {
            next_id: 1,
            entries,
        };
        db.normalise();
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    fn with_db<T>(&self, f: impl FnOnce(&mut EntryDatabase) -> T) -> Result<T, TotpError> {
        let mut db = self
            .db
            .lock()
            .map_err(|e| TotpError::new(TotpErrorKind::StorageError, format!("lock poisoned: {}", e)))?;
        Ok(f(&mut db))
    }
}

impl EntryRepository for MemoryRepository {
    fn load_all(&self) -> Result<Vec<Entry>, TotpError> {
        self.with_db(|db| db.entries.clone())
    }

    fn insert(&mut self, entry: Entry) -> Result<u64, TotpError> {
        self.with_db(|db| db.insert(entry))?
    }

    fn update(&mut self, entry: &Entry) -> Result<bool, TotpError> {
        self.with_db(|db| db.update(entry))
    }

    fn delete(&mut self, id: u64) -> Result<bool, TotpError> {
        self.with_db(|db| db.delete(id))
    }

    fn clear(&mut self) -> Result<(), TotpError> {
        self.with_db(|db| *db = EntryDatabase::default())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  JSON file repository
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Repository backed by a single pretty-printed JSON file.
///
/// The file is read once on open and rewritten after every mutation
/// through a sibling temp file that is renamed over the original.
#[derive(Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
    db: EntryDatabase,
}

impl JsonFileRepository {
    /// Open `path`, starting empty when it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TotpError> {
        let path = path.into();
        let db = if path.exists() {
            let json = fs::read_to_string(&path).map_err(|e| storage_error(&path, "read", e))?;
            let mut db: EntryDatabase = if json.trim().is_empty() {
                EntryDatabase::default()
            } else {
                serde_json::from_str(&json).map_err(|e| {
                    TotpError::new(TotpErrorKind::ParseError, format!("JSON deserialise: {}", e))
                        .with_detail(path.display().to_string())
                })?
            };
            db.normalise();
            db
        } else {
            EntryDatabase::default()
        };
        log::debug!("opened entry database {} ({} entries)", path.display(), db.entries.len());
        Ok(Self { path, db })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), TotpError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| storage_error(parent, "create", e))?;
            }
        }
        let json = serde_json::to_string_pretty(&self.db)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| storage_error(&tmp, "write", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| storage_error(&self.path, "replace", e))
    }

    /// Apply a mutation and persist it, restoring the previous state on failure.
    fn mutate<T>(
        &mut self,
        f: impl FnOnce(&mut EntryDatabase) -> Result<T, TotpError>,
    ) -> Result<T, TotpError> {
        let previous = self.db.clone();
        let out = match f(&mut self.db) {
            Ok(out) => out,
            Err(e) => {
                self.db = previous;
                return Err(e);
            }
        };
        if let Err(e) = self.save() {
            self.db = previous;
            return Err(e);
        }
        Ok(out)
    }
}

fn storage_error(path: &Path, action: &str, e: std::io::Error) -> TotpError {
    TotpError::new(
        TotpErrorKind::StorageError,
        format!("Failed to {} {}", action, path.display()),
    )
    .with_detail(e.to_string())
}

impl EntryRepository for JsonFileRepository {
    fn load_all(&self) -> Result<Vec<Entry>, TotpError> {
        Ok(self.db.entries.clone())
    }

    fn insert(&mut self, entry: Entry) -> Result<u64, TotpError> {
        self.mutate(|db| db.insert(entry))
    }

    fn update(&mut self, entry: &Entry) -> Result<bool, TotpError> {
        if !self.db.entries.iter().any(|e| e.id == entry.id) {
            return Ok(false);
        }
        self.mutate(|db| Ok(db.update(entry)))
    }

    fn delete(&mut self, id: u64) -> Result<bool, TotpError> {
        if !self.db.entries.iter().any(|e| e.id == id) {
            return Ok(false);
        }
        self.mutate(|db| Ok(db.delete(id)))
    }

    fn clear(&mut self) -> Result<(), TotpError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(storage_error(&self.path, "remove", e)),
        }
        self.db = EntryDatabase::default();
        Ok(())
    }
}
