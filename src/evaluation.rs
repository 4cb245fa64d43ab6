//! Incremental reveal loop against a fully known ground truth.
//!
//! [`Evaluation`] is a lazy iterator: every `next()` asks the strategy for a
//! pair, reveals the true rating and folds it into the working copy. It ends
//! after `target` reveals, when the strategy has nothing left to propose, or
//! on the first error.

use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::ratings::{RatingStore, UserIndex};
use crate::strategy::{SelectionStrategy, StrategyKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Confirmed reveals to collect.
    pub target: usize,
    /// Consecutive picks absent from ground truth before giving up.
    pub max_consecutive_misses: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            target: 25,
            max_consecutive_misses: 1000,
        }
    }
}

/// One confirmed rating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reveal {
    pub user: String,
    pub candidate: String,
    pub rating: f64,
    /// 1-based strategy call that produced this reveal.
    pub attempt: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub strategy: StrategyKind,
    pub target: usize,
    pub values: Vec<f64>,
    pub attempts: usize,
    pub misses: usize,
    /// The strategy ran out of pairs before `target` was reached.
    pub exhausted: bool,
    pub mean: Option<f64>,
}

pub struct Evaluation<'a> {
    truth: &'a RatingStore,
    working: RatingStore,
    users: &'a UserIndex,
    strategy: &'a mut dyn SelectionStrategy,
    cfg: EvaluationConfig,
    values: Vec<f64>,
    attempts: usize,
    misses: usize,
    consecutive_misses: usize,
    exhausted: bool,
    finished: bool,
}

impl<'a> Evaluation<'a> {
    /// `working` is taken by value; the ground truth is only read.
    pub fn new(
        truth: &'a RatingStore,
        working: RatingStore,
        users: &'a UserIndex,
        strategy: &'a mut dyn SelectionStrategy,
        cfg: EvaluationConfig,
    ) -> Self {
        Self {
            truth,
            working,
            users,
            strategy,
            cfg,
            values: Vec::new(),
            attempts: 0,
            misses: 0,
            consecutive_misses: 0,
            exhausted: false,
            finished: false,
        }
    }

    pub fn working(&self) -> &RatingStore {
        &self.working
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn into_report(self) -> EvaluationReport {
        let mean = if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
        };
        EvaluationReport {
            strategy: self.strategy.kind(),
            target: self.cfg.target,
            values: self.values,
            attempts: self.attempts,
            misses: self.misses,
            exhausted: self.exhausted,
            mean,
        }
    }

    /// Drains the sequence and summarizes it.
    pub fn run(mut self) -> Result<EvaluationReport, EvalError> {
        for reveal in self.by_ref() {
            reveal?;
        }
        Ok(self.into_report())
    }
}

impl Iterator for Evaluation<'_> {
    type Item = Result<Reveal, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.values.len() >= self.cfg.target {
            self.finished = true;
            return None;
        }

        loop {
            let picked = match self.strategy.select(&self.working, self.users, None) {
                Ok(picked) => picked,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            };
            self.attempts += 1;

            let Some(selection) = picked else {
                tracing::warn!(
                    strategy = %self.strategy.kind(),
                    revealed = self.values.len(),
                    target = self.cfg.target,
                    "strategy has no candidates left"
                );
                self.exhausted = true;
                self.finished = true;
                return None;
            };

            match self.truth.lookup(&selection.user, &selection.candidate) {
                Some(rating) => {
                    self.working
                        .insert_symmetric(&selection.user, &selection.candidate, rating);
                    self.values.push(rating);
                    self.consecutive_misses = 0;
                    tracing::debug!(
                        user = %selection.user,
                        candidate = %selection.candidate,
                        rating,
                        attempt = self.attempts,
                        "revealed"
                    );
                    return Some(Ok(Reveal {
                        user: selection.user,
                        candidate: selection.candidate,
                        rating,
                        attempt: self.attempts,
                    }));
                }
                None => {
                    self.working
                        .insert_symmetric(&selection.user, &selection.candidate, 0.0);
                    self.misses += 1;
                    self.consecutive_misses += 1;
                    if self.consecutive_misses >= self.cfg.max_consecutive_misses {
                        self.finished = true;
                        return Some(Err(EvalError::Stalled {
                            misses: self.consecutive_misses,
                        }));
                    }
                }
            }
        }
    }
}

impl FusedIterator for Evaluation<'_> {}
