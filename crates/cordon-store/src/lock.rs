//! Exclusive collection locks via `.lock` sidecar files.
//!
//! A lock is held by the process that created the sidecar with
//! `create_new` and released when the guard drops. Acquisition retries
//! until the bounded wait elapses; the bound is 5 seconds by default.
//! The sidecar convention is shared with any other process operating on
//! the same data directory.

use cordon_core::{CordonError, CordonResult};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::warn;

/// Default bound on waiting for a collection lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Held exclusive lock on one collection. Released on drop.
#[derive(Debug)]
pub struct CollectionLock {
    lock_path: PathBuf,
}

impl CollectionLock {
    /// Acquire the lock for the collection stored at `data_path`,
    /// retrying until `timeout` elapses.
    pub fn acquire(data_path: &Path, collection: &str, timeout: Duration) -> CordonResult<Self> {
        let mut lock_path = data_path.as_os_str().to_owned();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => return Ok(Self { lock_path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(CordonError::LockTimeout {
                            collection: collection.to_string(),
                        });
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for CollectionLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            warn!(path = %self.lock_path.display(), error = %e, "failed to release collection lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");

        let held = CollectionLock::acquire(&path, "events", Duration::from_secs(1)).unwrap();
        let contended = CollectionLock::acquire(&path, "events", Duration::from_millis(120));
        assert!(matches!(
            contended,
            Err(CordonError::LockTimeout { collection }) if collection == "events"
        ));

        drop(held);
        CollectionLock::acquire(&path, "events", Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn sidecar_is_removed_on_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let sidecar = dir.path().join("events.json.lock");

        let held = CollectionLock::acquire(&path, "events", Duration::from_secs(1)).unwrap();
        assert!(sidecar.exists());
        drop(held);
        assert!(!sidecar.exists());
    }
}
