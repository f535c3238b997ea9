//! Move oracles: sources of scored candidate moves.
//!
//! Exactly one backend is chosen for a run. Backends never fail loudly:
//! transport errors, timeouts and malformed answers all come back as an empty
//! candidate list, which the exploration engine treats as "no data".

pub mod chessdb;
pub mod explorer;
pub mod uci;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CacheKey, OracleCache};
use crate::error::ConfigError;
use crate::position::GamePosition;
use crate::types::MoveCandidate;

pub use chessdb::ChessDbOracle;
pub use explorer::{ExplorerDatabase, ExplorerOracle, ExplorerOptions};
pub use uci::{UciOptions, UciOracle};

/// Reasons a single oracle query produced no data. Internal to the oracles;
/// converted to an empty candidate list at the [`MoveOracle`] boundary.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("malformed response: {0}")]
    Payload(String),
    #[error("oracle reported status {0:?}")]
    Status(String),
    #[error("engine error: {0}")]
    Engine(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Capability shared by all oracle backends.
pub trait MoveOracle: Send + Sync {
    /// Short backend name, used in logs.
    fn name(&self) -> &str;

    /// Identity of this backend and its parameters, used as part of the cache
    /// key. Two oracles with the same string must give interchangeable answers.
    fn cache_params(&self) -> String;

    /// Returns the scored moves of `position`, unsorted, from the side to
    /// move's perspective. Returns an empty list when no data is available.
    fn get_moves(&self, position: &GamePosition) -> Vec<MoveCandidate>;
}

/// Backend selection, resolved once at startup.
#[derive(Clone, Debug)]
pub enum OracleConfig {
    ChessDb,
    Explorer(ExplorerOptions),
    Engine(UciOptions),
}

impl OracleConfig {
    /// Builds the configured backend.
    ///
    /// The explorer backend performs its calibration request here.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the backend parameters are invalid.
    pub fn build(self) -> Result<Box<dyn MoveOracle>, ConfigError> {
        match self {
            OracleConfig::ChessDb => Ok(Box::new(ChessDbOracle::new())),
            OracleConfig::Explorer(options) => Ok(Box::new(ExplorerOracle::calibrated(options))),
            OracleConfig::Engine(options) => Ok(Box::new(UciOracle::new(options)?)),
        }
    }
}

/// Oracle fronted by the shared cache.
pub struct CachedOracle {
    oracle: Box<dyn MoveOracle>,
    cache: Arc<OracleCache>,
    params: String,
    live_calls: AtomicU64,
}

impl CachedOracle {
    pub fn new(oracle: Box<dyn MoveOracle>, cache: Arc<OracleCache>) -> Self {
        let params = oracle.cache_params();
        CachedOracle {
            oracle,
            cache,
            params,
            live_calls: AtomicU64::new(0),
        }
    }

    /// Returns the candidates of `position`, asking the backend on a cache
    /// miss and storing its answer.
    ///
    /// Two branches may miss on the same key at the same time and both query
    /// the backend; the later store wins.
    pub fn get_moves(&self, position: &GamePosition) -> Vec<MoveCandidate> {
        let key = CacheKey::new(&position.epd(), &self.params);
        if let Some(candidates) = self.cache.lookup(&key) {
            return candidates;
        }

        self.live_calls.fetch_add(1, Ordering::Relaxed);
        let candidates = self.oracle.get_moves(position);
        if candidates.is_empty() {
            debug!(oracle = self.oracle.name(), position = %position, "oracle returned no moves");
        }
        self.cache.store(key, candidates.clone());
        candidates
    }

    pub fn name(&self) -> &str {
        self.oracle.name()
    }

    pub fn cache(&self) -> &Arc<OracleCache> {
        &self.cache
    }

    /// Number of queries that reached the backend.
    pub fn live_calls(&self) -> u64 {
        self.live_calls.load(Ordering::Relaxed)
    }
}

/// Logs a failed query and turns it into "no data".
pub(crate) fn soften(oracle: &str, position: &GamePosition, result: Result<Vec<MoveCandidate>, OracleError>) -> Vec<MoveCandidate> {
    match result {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!(oracle, position = %position, error = %err, "oracle query failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Oracle answering from a queue of prepared responses.
    struct ScriptedOracle {
        responses: Mutex<Vec<Vec<MoveCandidate>>>,
        calls: AtomicU64,
    }

    impl MoveOracle for ScriptedOracle {
        fn name(&self) -> &str {
            "scripted"
        }

        fn cache_params(&self) -> String {
            "scripted".to_string()
        }

        fn get_moves(&self, _position: &GamePosition) -> Vec<MoveCandidate> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.responses.lock().unwrap().pop().unwrap_or_default()
        }
    }

    #[test]
    fn test_cached_oracle_retries_empty_answers() {
        // Responses are popped from the back.
        let scripted = ScriptedOracle {
            responses: Mutex::new(vec![vec![MoveCandidate::new("e2e4", 30)], Vec::new()]),
            calls: AtomicU64::new(0),
        };
        let cached = CachedOracle::new(Box::new(scripted), Arc::new(OracleCache::new()));
        let pos = GamePosition::default();

        assert!(cached.get_moves(&pos).is_empty());
        assert_eq!(cached.get_moves(&pos), vec![MoveCandidate::new("e2e4", 30)]);
        // Served from the cache.
        assert_eq!(cached.get_moves(&pos), vec![MoveCandidate::new("e2e4", 30)]);
        assert_eq!(cached.live_calls(), 2);
        assert_eq!(cached.cache().hits(), 1);
    }

    #[test]
    fn test_soften_converts_errors() {
        let pos = GamePosition::default();
        let failed = soften("test", &pos, Err(OracleError::Status("unknown".into())));
        assert!(failed.is_empty());

        let ok = soften("test", &pos, Ok(vec![MoveCandidate::new("e2e4", 1)]));
        assert_eq!(ok.len(), 1);
    }
}
