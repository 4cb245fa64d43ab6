//! Error types for loading data, factorizing, selecting and evaluating.

use thiserror::Error;

/// Errors raised while loading or addressing rating data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// A rating or selection referenced a user outside the user set.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("duplicate user: {0}")]
    DuplicateUser(String),

    #[error("user set is empty")]
    EmptyUsers,

    #[error("rating for ({a}, {b}) is not finite: {value}")]
    NonFiniteRating { a: String, b: String, value: f64 },

    #[error("rating for ({a}, {b}) is negative: {value}")]
    NegativeRating { a: String, b: String, value: f64 },
}

/// Invalid harness configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure while building a working copy from ground truth.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from the non-negative matrix factorization.
#[derive(Debug, Error)]
pub enum FactorizeError {
    #[error("rank must be >= 1")]
    ZeroRank,

    #[error("matrix is empty")]
    EmptyMatrix,

    #[error("matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("matrix entry ({row}, {col}) is negative or not finite: {value}")]
    InvalidEntry { row: usize, col: usize, value: f64 },
}

/// Errors from a selection strategy.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("factorization failed: {0}")]
    Factorize(#[from] FactorizeError),
}

/// Errors surfaced while driving an evaluation.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("selection failed: {0}")]
    Select(#[from] SelectError),

    /// The strategy kept returning pairs absent from ground truth.
    #[error("no ground-truth pair revealed after {misses} consecutive picks")]
    Stalled { misses: usize },
}
