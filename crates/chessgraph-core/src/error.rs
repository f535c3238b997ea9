//! Error types for the chessgraph library.
//!
//! Oracle failures never show up here: they are converted into empty
//! candidate lists at the oracle boundary. What remains are configuration
//! errors, raised before exploration starts, and cache or renderer failures at
//! process boundaries.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Invalid run configuration. Reported before any exploration begins.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    #[error("invalid window: alpha ({alpha}) must be lower than beta ({beta})")]
    InvalidWindow { alpha: i32, beta: i32 },
    #[error("invalid window: alpha ({alpha}) and beta ({beta}) must lie within ±{bound}")]
    WindowOutOfRange { alpha: i32, beta: i32, bound: i32 },
    #[error("invalid depth {depth}: must be between 0 and {max}")]
    InvalidDepth { depth: i32, max: i32 },
    #[error("{what} must be at least 1")]
    ZeroConcurrency { what: &'static str },
    #[error("invalid engine command: {0:?}")]
    InvalidEngineCommand(String),
    #[error("failed to build worker pool: {0}")]
    Pool(String),
}

/// Failure to load or save the persistent oracle cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache file {path} is not valid: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to produce the rendered output.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
    #[error("failed to run graphviz `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("graphviz exited with {status}: {stderr}")]
    Graphviz { status: String, stderr: String },
}

/// Any error surfaced by the library.
#[derive(Debug, Error)]
pub enum ChessGraphError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Convenience alias for library results.
pub type Result<T> = std::result::Result<T, ChessGraphError>;
