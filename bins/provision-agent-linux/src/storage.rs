//! File-backed durable storage.
//!
//! Each namespace is one JSON object in `<state-dir>/<namespace>.json`.
//! A commit writes the whole document to a temporary file, syncs it,
//! renames it over the previous one and syncs the directory so the rename
//! itself is durable.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use provision_core::{DurableStorage, StorageError};
use tracing::debug;

#[derive(Debug, Default)]
struct Document {
    committed: BTreeMap<String, String>,
    staged: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    document: Mutex<Document>,
}

impl FileStorage {
    /// Open (or create) `namespace` under `dir`.
    pub fn open(dir: &Path, namespace: &str) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|err| io_error("create_dir", &err))?;
        let path = dir.join(format!("{}.json", namespace));

        let committed = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|_| StorageError::new(format!("parse {}", path.display())))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(io_error("read", &err)),
        };
        debug!("Opened namespace '{}' at {}", namespace, path.display());

        Ok(Self {
            path,
            document: Mutex::new(Document {
                committed,
                staged: BTreeMap::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Document> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let content =
            serde_json::to_string_pretty(entries).map_err(|_| StorageError::new("serialize"))?;
        let tmp = self.path.with_extension("json.tmp");

        let mut file = File::create(&tmp).map_err(|err| io_error("create", &err))?;
        file.write_all(content.as_bytes())
            .map_err(|err| io_error("write", &err))?;
        file.sync_all().map_err(|err| io_error("fsync", &err))?;
        fs::rename(&tmp, &self.path).map_err(|err| io_error("rename", &err))?;
        match self.path.parent() {
            Some(dir) => sync_dir(dir),
            None => Ok(()),
        }
    }
}

/// Flush directory entries (creates and renames) to disk.
fn sync_dir(dir: &Path) -> Result<(), StorageError> {
    File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|err| io_error("fsync_dir", &err))
}

impl DurableStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().committed.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock().staged.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn commit(&self) -> Result<(), StorageError> {
        let mut document = self.lock();
        let staged = std::mem::take(&mut document.staged);
        if staged.is_empty() {
            return Ok(());
        }
        let mut entries = document.committed.clone();
        entries.extend(staged);
        self.persist(&entries)?;
        document.committed = entries;
        Ok(())
    }
}

fn io_error(operation: &str, err: &io::Error) -> StorageError {
    match err.raw_os_error() {
        Some(code) => StorageError::with_code(operation, code),
        None => StorageError::new(operation),
    }
}
