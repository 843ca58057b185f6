//! One JSON collection on disk.
//!
//! Every read-modify-write acquires the collection lock for the whole
//! read, mutate, write window. Writes go through a temp file and rename,
//! so an aborted operation never leaves a partially written collection.

use crate::lock::{CollectionLock, DEFAULT_LOCK_TIMEOUT};
use cordon_core::{CordonError, CordonResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A named JSON array of records with a `.lock` sidecar.
#[derive(Debug)]
pub struct Collection<T> {
    name: String,
    path: PathBuf,
    lock_timeout: Duration,
    _record: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> Collection<T> {
    /// Bind the collection `name` inside `dir`. The backing file is
    /// created lazily on first write.
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: dir.join(format!("{name}.json")),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            _record: PhantomData,
        }
    }

    /// Override the lock wait bound. Tests use short bounds.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load every record under the collection lock.
    pub fn read_all(&self) -> CordonResult<Vec<T>> {
        let _lock = CollectionLock::acquire(&self.path, &self.name, self.lock_timeout)?;
        self.load_unlocked()
    }

    /// Run `mutate` against the record list under the collection lock and
    /// persist the result atomically. A failing mutation leaves the file
    /// untouched.
    pub fn mutate<R>(&self, mutate: impl FnOnce(&mut Vec<T>) -> CordonResult<R>) -> CordonResult<R> {
        let _lock = CollectionLock::acquire(&self.path, &self.name, self.lock_timeout)?;
        let mut records = self.load_unlocked()?;
        let outcome = mutate(&mut records)?;
        self.write_atomic(&records)?;
        Ok(outcome)
    }

    fn load_unlocked(&self) -> CordonResult<Vec<T>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            CordonError::serialization(format!("collection '{}': {}", self.name, e))
        })
    }

    fn write_atomic(&self, records: &[T]) -> CordonResult<()> {
        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|e| CordonError::serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Next collection-scoped identifier given the last record's, if any.
pub fn next_id(last: Option<u64>) -> u64 {
    last.map_or(1, |id| id + 1)
}
