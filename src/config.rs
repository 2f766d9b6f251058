//! Store configuration and on-disk layout
//!
//! One `StoreConfig` is constructed at process start and passed to every
//! store handle; nothing reads configuration from global state.

use chrono::{Datelike, NaiveDate};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::lock::{LockManager, LockResource};

/// Default embedding dimension (Qwen3-Embedding family)
pub const DEFAULT_DIMENSION: usize = 1024;

/// Store configuration: root directory plus derived layout
#[derive(Debug, Clone)]
pub struct StoreConfig {
    root: PathBuf,
    /// Fixed embedding dimension for the document store
    pub dimension: usize,
    /// Default timeout for lock acquisition
    pub lock_timeout: Duration,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dimension: DEFAULT_DIMENSION,
            lock_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Daily memory-log tree
    pub fn memory_dir(&self) -> PathBuf {
        self.root.join("memory")
    }

    /// Persisted header index
    pub fn index_path(&self) -> PathBuf {
        self.root.join(".index").join("memory_index.json")
    }

    /// Knowledge graph snapshot
    pub fn graph_path(&self) -> PathBuf {
        self.root.join(".graph").join("knowledge.json")
    }

    /// Embedded document/vector database directory
    pub fn vector_dir(&self) -> PathBuf {
        self.root.join(".vector")
    }

    /// Lock files, one per logical resource
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(".locks")
    }

    /// Create the standard directory layout under the root
    pub fn initialize(&self) -> Result<()> {
        for dir in [
            self.memory_dir(),
            self.root.join("knowledge"),
            self.root.join(".index"),
            self.root.join(".graph"),
            self.vector_dir(),
            self.locks_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        log::debug!("memory storage initialized at {}", self.root.display());
        Ok(())
    }

    /// Canonical path for a daily log:
    /// `memory/<YYYY>/<mm_monthname>/week_<WW>/<YYYY-MM-DD>.md`
    pub fn daily_log_path(&self, date: NaiveDate) -> PathBuf {
        let year = date.format("%Y").to_string();
        let month = date.format("%m_%B").to_string().to_lowercase();
        let week = format!("week_{:02}", date.iso_week().week());
        let file = format!("{}.md", date.format("%Y-%m-%d"));
        self.memory_dir().join(year).join(month).join(week).join(file)
    }
}

/// Append an entry to the daily log for `date` under the daily-log lock.
///
/// Entries are separated by a blank line. Returns the log file path.
pub fn append_daily_log(
    config: &StoreConfig,
    locks: &LockManager,
    date: NaiveDate,
    text: &str,
) -> Result<PathBuf> {
    let path = config.daily_log_path(date);
    let _guard = locks.acquire(LockResource::DailyLog, config.lock_timeout)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let existing = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if existing > 0 {
        file.write_all(b"\n\n")?;
    }
    file.write_all(text.as_bytes())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_daily_log_path_layout() {
        let config = StoreConfig::new("/data/agent");
        let date = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        let path = config.daily_log_path(date);
        assert_eq!(
            path,
            PathBuf::from("/data/agent/memory/2025/03_march/week_10/2025-03-05.md")
        );
    }

    #[test]
    fn test_initialize_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::new(tmp.path());
        config.initialize().unwrap();

        assert!(config.memory_dir().is_dir());
        assert!(config.vector_dir().is_dir());
        assert!(config.locks_dir().is_dir());
        assert!(tmp.path().join(".graph").is_dir());
        assert!(tmp.path().join(".index").is_dir());
    }

    #[test]
    fn test_append_daily_log_separates_entries() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::new(tmp.path());
        config.initialize().unwrap();
        let locks = Arc::new(LockManager::new(&config));
        let date = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();

        let path = append_daily_log(&config, &locks, date, "first entry").unwrap();
        append_daily_log(&config, &locks, date, "second entry").unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "first entry\n\nsecond entry");
    }
}
