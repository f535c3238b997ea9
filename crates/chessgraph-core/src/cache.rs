//! Memoizing store for oracle answers.
//!
//! The cache is passive: no eviction, no expiry, no size bound. Persistence is
//! a bulk load before exploration and a bulk save afterwards.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CacheError;
use crate::types::MoveCandidate;
use crate::util::sharded::ShardedMap;

/// Version tag written into cache files.
const CACHE_FORMAT_VERSION: u32 = 1;

/// Composite cache key: position identity plus oracle parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for a position (merged EPD) under an oracle
    /// configuration string.
    pub fn new(epd: &str, oracle_params: &str) -> Self {
        CacheKey(format!("{epd}|{oracle_params}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<String, Vec<MoveCandidate>>,
}

/// Process-wide oracle cache.
#[derive(Default)]
pub struct OracleCache {
    entries: ShardedMap<CacheKey, Vec<MoveCandidate>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl OracleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the candidates stored for `key`.
    ///
    /// An entry with zero candidates is reported as absent: an empty answer
    /// may come from a transient oracle failure and must be retried.
    pub fn lookup(&self, key: &CacheKey) -> Option<Vec<MoveCandidate>> {
        match self.entries.get_cloned(key) {
            Some(candidates) if !candidates.is_empty() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(candidates)
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores the candidates returned by the oracle for `key`.
    pub fn store(&self, key: CacheKey, candidates: Vec<MoveCandidate>) {
        self.entries.insert(key, candidates);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Loads a cache file. A missing file yields an empty cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no cache file, starting with an empty cache");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let parsed: CacheFile =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| CacheError::Format {
                path: path.to_path_buf(),
                source,
            })?;

        if parsed.version != CACHE_FORMAT_VERSION {
            debug!(
                version = parsed.version,
                expected = CACHE_FORMAT_VERSION,
                "cache file version differs, loading anyway"
            );
        }

        let cache = OracleCache {
            entries: parsed
                .entries
                .into_iter()
                .map(|(k, v)| (CacheKey(k), v))
                .collect(),
            ..Default::default()
        };
        info!(path = %path.display(), entries = cache.len(), "loaded oracle cache");
        Ok(cache)
    }

    /// Writes all entries to `path`, replacing any previous file.
    ///
    /// The data is written to a sibling temporary file first and renamed into
    /// place, so an interrupted save leaves the previous file intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };

        let entries: BTreeMap<String, Vec<MoveCandidate>> = self
            .entries
            .snapshot()
            .into_iter()
            .map(|(k, v)| (k.0, v))
            .collect();
        let n_entries = entries.len();
        let data = CacheFile {
            version: CACHE_FORMAT_VERSION,
            entries,
        };

        let tmp_path = path.with_extension("tmp");
        {
            let file = fs::File::create(&tmp_path).map_err(io_err)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &data).map_err(|source| CacheError::Format {
                path: path.to_path_buf(),
                source,
            })?;
            writer.flush().map_err(io_err)?;
        }
        fs::rename(&tmp_path, path).map_err(io_err)?;

        info!(path = %path.display(), entries = n_entries, "saved oracle cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(epd: &str) -> CacheKey {
        CacheKey::new(epd, "test:depth=1")
    }

    #[test]
    fn test_lookup_missing() {
        let cache = OracleCache::new();
        assert_eq!(cache.lookup(&key("a")), None);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn test_store_and_lookup() {
        let cache = OracleCache::new();
        let moves = vec![MoveCandidate::new("e2e4", 30)];
        cache.store(key("a"), moves.clone());

        assert_eq!(cache.lookup(&key("a")), Some(moves));
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn test_empty_entry_is_not_trusted() {
        let cache = OracleCache::new();
        cache.store(key("a"), Vec::new());

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&key("a")), None);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_params_are_part_of_key() {
        let cache = OracleCache::new();
        cache.store(CacheKey::new("a", "engine:depth=10"), vec![MoveCandidate::new("e2e4", 1)]);
        assert_eq!(cache.lookup(&CacheKey::new("a", "engine:depth=20")), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = OracleCache::new();
        cache.store(key("a"), vec![MoveCandidate::new("e2e4", 30), MoveCandidate::new("d2d4", 25)]);
        cache.store(key("b"), vec![MoveCandidate::new("g1f3", -5)]);
        cache.save(&path).unwrap();

        let loaded = OracleCache::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.lookup(&key("b")), Some(vec![MoveCandidate::new("g1f3", -5)]));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let cache = OracleCache::load(&dir.path().join("absent.json")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            OracleCache::load(&path),
            Err(CacheError::Format { .. })
        ));
    }
}
