//! Durable key-value storage abstraction.
//!
//! This module provides the trait the secret store persists through, which is
//! implemented differently on each platform:
//! - Linux: file-based storage (one JSON document per namespace)
//! - ESP32: NVS (Non-Volatile Storage)
//!
//! All methods are synchronous so they can be called from the control thread
//! and from HTTP handlers alike.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Failure reported by a durable storage backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed{}", .code.map(|c| format!(" (code {c})")).unwrap_or_default())]
pub struct StorageError {
    /// Backend operation that failed (e.g. `nvs_set_str`, `rename`).
    pub operation: String,
    /// Platform status code, if the backend reports one.
    pub code: Option<i32>,
}

impl StorageError {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            code: None,
        }
    }

    pub fn with_code(operation: impl Into<String>, code: i32) -> Self {
        Self {
            operation: operation.into(),
            code: Some(code),
        }
    }
}

/// String-valued durable storage scoped to one private namespace.
///
/// `write` may stage a value; it is only guaranteed durable once `commit`
/// returns `Ok`.
pub trait DurableStorage: Send + Sync {
    /// Read the value stored under `key`, `None` if there is no entry.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`.
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Make every previous `write` durable.
    fn commit(&self) -> Result<(), StorageError>;
}

impl<T: DurableStorage + ?Sized> DurableStorage for Arc<T> {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).write(key, value)
    }

    fn commit(&self) -> Result<(), StorageError> {
        (**self).commit()
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    committed: HashMap<String, String>,
    staged: HashMap<String, String>,
    fail_write: Option<i32>,
    fail_commit: Option<i32>,
}

/// In-memory storage with commit semantics.
///
/// Failures can be injected to exercise the error paths of the layers above.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage with an already committed entry.
    pub fn with_entry(key: &str, value: &str) -> Self {
        let storage = Self::new();
        storage
            .lock()
            .committed
            .insert(key.to_string(), value.to_string());
        storage
    }

    /// Make every subsequent `write` fail with `code` until cleared.
    pub fn fail_writes(&self, code: Option<i32>) {
        self.lock().fail_write = code;
    }

    /// Make every subsequent `commit` fail with `code` until cleared.
    pub fn fail_commits(&self, code: Option<i32>) {
        self.lock().fail_commit = code;
    }

    /// Committed value for `key`, bypassing staging.
    pub fn committed(&self, key: &str) -> Option<String> {
        self.lock().committed.get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl DurableStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().committed.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if let Some(code) = inner.fail_write {
            return Err(StorageError::with_code("write", code));
        }
        inner.staged.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn commit(&self) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if let Some(code) = inner.fail_commit {
            inner.staged.clear();
            return Err(StorageError::with_code("commit", code));
        }
        let staged = std::mem::take(&mut inner.staged);
        inner.committed.extend(staged);
        Ok(())
    }
}
