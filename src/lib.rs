#![forbid(unsafe_code)]

//! # elicit-harness
//!
//! Offline evaluation of heuristics that decide whose rating to ask for next.
//!
//! A complete ground-truth rating matrix over a fixed set of users is loaded,
//! part of it is hidden, and a selection strategy repeatedly proposes a
//! `(user, candidate)` pair. The evaluator reveals the true rating, folds it
//! into the working copy and records the value. Strategies other than
//! `random` consult a sparse non-negative factorization of the currently
//! known ratings, recomputed on every call.

pub mod config;
pub mod error;
pub mod evaluation;
pub mod factorize;
pub mod matrix;
pub mod ratings;
pub mod scenario;
pub mod strategy;

pub use config::{load_config_from_path, HarnessConfig};
pub use error::{ConfigError, DataError, EvalError, FactorizeError, ScenarioError, SelectError};
pub use evaluation::{Evaluation, EvaluationConfig, EvaluationReport, Reveal};
pub use factorize::{factorize, factorize_sparse, Factorization, FactorizerConfig};
pub use matrix::{build_symmetric, to_dense};
pub use ratings::{load_ratings, load_users, RatingStore, UserIndex};
pub use strategy::{
    clustered_choice, probability_choice, ClusterEvidence, ClusteredSelect, MaxGuessSelect,
    ProbabilitySelect, RandomSelect, Selection, SelectionStrategy, StrategyKind, Subject,
};
