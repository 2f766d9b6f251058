//! Cross-process lock manager
//!
//! Advisory file locks keyed by a small closed set of logical resources,
//! so independent agent processes sharing one on-disk store observe the
//! same mutual exclusion. Acquisition polls up to a timeout and then fails
//! with [`StoreError::LockTimeout`]; guards release on drop, including on
//! error paths.

use dashmap::DashMap;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

/// Default lock acquisition timeout
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Contended locks are re-polled at this interval
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The closed set of lockable logical resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockResource {
    /// The scoped preference file (owned by the preference parser, which
    /// shares this lock manager)
    Preferences,
    /// The extracted fact list under `knowledge/`
    KnowledgeItems,
    /// Daily memory-log files
    DailyLog,
    /// The knowledge graph snapshot
    GraphSnapshot,
    /// The embedded document/vector database
    VectorDb,
}

impl LockResource {
    /// Stable resource name used in errors and logs
    pub fn name(self) -> &'static str {
        match self {
            Self::Preferences => "preferences",
            Self::KnowledgeItems => "knowledge",
            Self::DailyLog => "daily_log",
            Self::GraphSnapshot => "graph",
            Self::VectorDb => "vector_db",
        }
    }

    fn file_name(self) -> &'static str {
        match self {
            Self::Preferences => "preferences.lock",
            Self::KnowledgeItems => "knowledge.lock",
            Self::DailyLog => "daily_log.lock",
            Self::GraphSnapshot => "graph.lock",
            Self::VectorDb => "vector_db.lock",
        }
    }
}

/// One lock object per resource name per process, lazily bound to its
/// backing file on first acquisition.
#[derive(Debug)]
struct ResourceLock {
    path: PathBuf,
}

/// Process-wide lock manager, constructed once and injected into every store
pub struct LockManager {
    dir: PathBuf,
    locks: DashMap<LockResource, Arc<ResourceLock>>,
}

impl LockManager {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            dir: config.locks_dir(),
            locks: DashMap::new(),
        }
    }

    /// Get or create the cached lock object for a resource. The `DashMap`
    /// entry API serializes concurrent first acquisitions, so a resource
    /// name never maps to two distinct lock objects within one process.
    fn resource_lock(&self, resource: LockResource) -> Arc<ResourceLock> {
        self.locks
            .entry(resource)
            .or_insert_with(|| {
                Arc::new(ResourceLock {
                    path: self.dir.join(resource.file_name()),
                })
            })
            .clone()
    }

    /// Acquire the lock for `resource`, blocking up to `timeout`.
    ///
    /// Each acquisition opens a fresh handle on the lock file: the OS
    /// advisory lock then excludes both other processes and other threads
    /// of this process.
    pub fn acquire(&self, resource: LockResource, timeout: Duration) -> Result<LockGuard> {
        let lock = self.resource_lock(resource);
        std::fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock.path)?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    log::trace!("acquired '{}' lock", resource.name());
                    return Ok(LockGuard { file, resource });
                }
                Err(e)
                    if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
                {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(StoreError::LockTimeout {
                            resource: resource.name(),
                            waited: timeout,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL.min(deadline - now));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Acquire with the default 10 second timeout
    pub fn acquire_default(&self, resource: LockResource) -> Result<LockGuard> {
        self.acquire(resource, DEFAULT_LOCK_TIMEOUT)
    }
}

/// Scoped lock guard; releasing always unlocks, including on error paths
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    resource: LockResource,
}

impl LockGuard {
    pub fn resource(&self) -> LockResource {
        self.resource
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log::warn!("failed to release '{}' lock: {}", self.resource.name(), e);
        } else {
            log::trace!("released '{}' lock", self.resource.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(tmp: &TempDir) -> LockManager {
        LockManager::new(&StoreConfig::new(tmp.path()))
    }

    #[test]
    fn test_acquire_and_reacquire() {
        let tmp = TempDir::new().unwrap();
        let locks = manager(&tmp);

        let guard = locks.acquire_default(LockResource::GraphSnapshot).unwrap();
        drop(guard);
        // Released on drop, so a second acquisition succeeds immediately
        let _guard = locks.acquire_default(LockResource::GraphSnapshot).unwrap();
    }

    #[test]
    fn test_contended_acquire_times_out() {
        let tmp = TempDir::new().unwrap();
        let locks = manager(&tmp);

        let _held = locks.acquire_default(LockResource::VectorDb).unwrap();
        let err = locks
            .acquire(LockResource::VectorDb, Duration::from_millis(150))
            .unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { resource, .. } if resource == "vector_db"));
    }

    #[test]
    fn test_different_resources_are_independent() {
        let tmp = TempDir::new().unwrap();
        let locks = manager(&tmp);

        let _graph = locks.acquire_default(LockResource::GraphSnapshot).unwrap();
        // A different resource must not contend
        let _vector = locks
            .acquire(LockResource::VectorDb, Duration::from_millis(100))
            .unwrap();
    }

    #[test]
    fn test_mutual_exclusion_across_threads() {
        let tmp = TempDir::new().unwrap();
        let locks = std::sync::Arc::new(manager(&tmp));

        let guard = locks.acquire_default(LockResource::DailyLog).unwrap();

        let locks2 = locks.clone();
        let waiter = std::thread::spawn(move || {
            // Blocks until the main thread releases, then succeeds
            locks2
                .acquire(LockResource::DailyLog, Duration::from_secs(5))
                .map(|g| g.resource())
        });

        std::thread::sleep(Duration::from_millis(200));
        drop(guard);

        let acquired = waiter.join().unwrap().unwrap();
        assert_eq!(acquired, LockResource::DailyLog);
    }
}
