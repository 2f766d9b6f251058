//! Incremental header index over the daily memory-log tree
//!
//! Walks `memory/` for log documents, extracts the lightweight YAML
//! frontmatter header of each file, and persists an index keyed by relative
//! path. Only entries whose modification time advanced are recomputed; a
//! format version bump discards the whole index.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

/// Current index format version; a mismatch forces a full rebuild
pub const INDEX_VERSION: u32 = 2;

/// Bytes read per file when looking for the frontmatter block
const HEADER_PREFIX_BYTES: u64 = 1000;

fn frontmatter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\A---\s*\n(.*?)\n---\s*(\n|\z)").expect("static frontmatter pattern")
    })
}

/// Per-file index entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Modification time recorded when the entry was (re)computed,
    /// milliseconds since the Unix epoch
    pub mtime_ms: i64,
}

/// Index-level metadata record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub last_build: DateTime<Utc>,
    pub version: u32,
}

/// The persisted index: metadata plus one entry per log file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryIndex {
    pub metadata: IndexMetadata,
    /// Relative path (forward slashes) -> entry; BTreeMap keeps the
    /// serialized form deterministic
    pub files: BTreeMap<String, IndexEntry>,
}

/// Result of one build pass
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub index: MemoryIndex,
    /// Files visited during the walk
    pub scanned: usize,
    /// Entries copied forward unchanged
    pub cache_hits: usize,
    /// Entries (re)computed from file headers
    pub recomputed: usize,
}

/// Staleness-aware indexer over the memory-log tree
pub struct MemoryIndexer {
    memory_dir: PathBuf,
    index_path: PathBuf,
    cached: RwLock<Option<MemoryIndex>>,
}

impl MemoryIndexer {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            memory_dir: config.memory_dir(),
            index_path: config.index_path(),
            cached: RwLock::new(None),
        }
    }

    /// Build (or incrementally refresh) the index and persist it atomically.
    ///
    /// The result set is exactly the current walk's entries, so files
    /// deleted from disk drop out of this build's output.
    pub fn build(&self, force_full: bool) -> Result<BuildReport> {
        let prior = if force_full {
            BTreeMap::new()
        } else {
            match self.read_persisted() {
                Ok(Some(idx)) if idx.metadata.version == INDEX_VERSION => idx.files,
                Ok(Some(idx)) => {
                    log::info!(
                        "index format v{} != v{}, rebuilding from scratch",
                        idx.metadata.version,
                        INDEX_VERSION
                    );
                    BTreeMap::new()
                }
                Ok(None) => BTreeMap::new(),
                Err(e) => {
                    log::warn!("discarding unreadable index, rebuilding: {}", e);
                    BTreeMap::new()
                }
            }
        };

        let mut files = BTreeMap::new();
        let mut scanned = 0;
        let mut cache_hits = 0;
        let mut recomputed = 0;

        if self.memory_dir.is_dir() {
            for entry in WalkDir::new(&self.memory_dir)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(&self.memory_dir) else {
                    continue;
                };
                let rel_path = rel.to_string_lossy().replace('\\', "/");

                let mtime_ms = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
                    Some(t) => system_time_ms(t),
                    None => continue,
                };
                scanned += 1;

                if let Some(prev) = prior.get(&rel_path) {
                    if prev.mtime_ms >= mtime_ms {
                        files.insert(rel_path, prev.clone());
                        cache_hits += 1;
                        continue;
                    }
                }

                match read_header(entry.path(), mtime_ms) {
                    Ok(index_entry) => {
                        files.insert(rel_path, index_entry);
                        recomputed += 1;
                    }
                    Err(e) => {
                        log::warn!("error indexing {}: {}", rel_path, e);
                    }
                }
            }
        }

        let index = MemoryIndex {
            metadata: IndexMetadata {
                last_build: Utc::now(),
                version: INDEX_VERSION,
            },
            files,
        };
        self.persist(&index)?;
        *self.cached.write() = Some(index.clone());

        log::debug!(
            "index build: {} scanned, {} cache hits, {} recomputed",
            scanned,
            cache_hits,
            recomputed
        );
        Ok(BuildReport {
            index,
            scanned,
            cache_hits,
            recomputed,
        })
    }

    /// Return the cached index, the persisted one if its version matches,
    /// or trigger a build.
    pub fn load(&self) -> Result<MemoryIndex> {
        if let Some(idx) = self.cached.read().as_ref() {
            return Ok(idx.clone());
        }

        match self.read_persisted() {
            Ok(Some(idx)) if idx.metadata.version == INDEX_VERSION => {
                *self.cached.write() = Some(idx.clone());
                Ok(idx)
            }
            Ok(_) => Ok(self.build(false)?.index),
            Err(e) => {
                // Transient or corrupt reads mean "not yet available", not fatal
                log::warn!("persisted index unreadable ({}), rebuilding", e);
                Ok(self.build(false)?.index)
            }
        }
    }

    fn read_persisted(&self) -> Result<Option<MemoryIndex>> {
        if !self.index_path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.index_path)?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::corrupt("memory index", e.to_string()))
    }

    /// Atomic replace: write a sibling temp file, then rename over the old
    /// index so readers never observe a partial write.
    fn persist(&self, index: &MemoryIndex) -> Result<()> {
        if let Some(parent) = self.index_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.index_path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(index)?)?;
        std::fs::rename(&tmp, &self.index_path)?;
        Ok(())
    }
}

fn system_time_ms(t: SystemTime) -> i64 {
    match t.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

/// Read a bounded prefix of a log file and parse its frontmatter header.
///
/// No parseable header block yields `type: "plain"` with empty tags and
/// summary; a header block that is not valid YAML yields `type: "unknown"`.
fn read_header(path: &Path, mtime_ms: i64) -> Result<IndexEntry> {
    let mut buf = Vec::with_capacity(HEADER_PREFIX_BYTES as usize);
    std::fs::File::open(path)?
        .take(HEADER_PREFIX_BYTES)
        .read_to_end(&mut buf)?;
    let text = String::from_utf8_lossy(&buf);

    let Some(captures) = frontmatter_re().captures(&text) else {
        return Ok(IndexEntry {
            date: None,
            tags: Vec::new(),
            summary: String::new(),
            kind: "plain".to_string(),
            mtime_ms,
        });
    };

    let header: serde_yaml::Value =
        serde_yaml::from_str(&captures[1]).unwrap_or(serde_yaml::Value::Null);

    Ok(IndexEntry {
        date: header.get("date").and_then(yaml_scalar_string),
        tags: header
            .get("tags")
            .and_then(|v| v.as_sequence())
            .map(|seq| seq.iter().filter_map(yaml_scalar_string).collect())
            .unwrap_or_default(),
        summary: header
            .get("summary")
            .and_then(yaml_scalar_string)
            .unwrap_or_default(),
        kind: header
            .get("type")
            .and_then(yaml_scalar_string)
            .unwrap_or_else(|| "unknown".to_string()),
        mtime_ms,
    })
}

fn yaml_scalar_string(v: &serde_yaml::Value) -> Option<String> {
    match v {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
