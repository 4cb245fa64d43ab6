//! Pair-selection strategies.
//!
//! Each strategy answers the same question: given what is currently known,
//! which user should be asked about which partner next? Three of the four
//! consult a fresh factorization of the known ratings on every call.

use std::fmt;

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::error::SelectError;
use crate::factorize::{argmax, factorize_sparse, Factorization, FactorizerConfig};
use crate::matrix::build_symmetric;
use crate::ratings::{RatingStore, UserIndex};

/// A user and the partner whose rating should be elicited next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub user: String,
    pub candidate: String,
}

/// Policy that picks the next pair to query.
pub trait SelectionStrategy {
    fn kind(&self) -> StrategyKind;

    /// `Ok(None)` means there is nothing left to ask for.
    fn select(
        &mut self,
        ratings: &RatingStore,
        users: &UserIndex,
        user: Option<&str>,
    ) -> Result<Option<Selection>, SelectError>;
}

// ---------------------------------------------------------------------
//  Strategy names
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Random,
    Clustered,
    MaxGuess,
    Probability,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Random,
        StrategyKind::Clustered,
        StrategyKind::MaxGuess,
        StrategyKind::Probability,
    ];

    /// Short command-line name.
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Random => "rand",
            StrategyKind::Clustered => "clust",
            StrategyKind::MaxGuess => "est",
            StrategyKind::Probability => "prob",
        }
    }

    /// Builds the strategy. `seed` drives its private RNG.
    pub fn build(self, cfg: &FactorizerConfig, seed: u64) -> Box<dyn SelectionStrategy> {
        let rng = StdRng::seed_from_u64(seed);
        match self {
            StrategyKind::Random => Box::new(RandomSelect { rng }),
            StrategyKind::Clustered => Box::new(ClusteredSelect {
                cfg: cfg.clone(),
                rng,
            }),
            StrategyKind::MaxGuess => Box::new(MaxGuessSelect {
                cfg: cfg.clone(),
                rng,
            }),
            StrategyKind::Probability => Box::new(ProbabilitySelect {
                cfg: cfg.clone(),
                rng,
            }),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------
//  Shared steps
// ---------------------------------------------------------------------

/// The user being expanded, what is known about it, and who is left.
#[derive(Debug, Clone)]
pub struct Subject<'a> {
    pub user: &'a str,
    pub idx: usize,
    /// `(partner index, rating)` in index order.
    pub rated: Vec<(usize, f64)>,
    /// Unrated partners in index order.
    pub candidates: Vec<usize>,
}

impl<'a> Subject<'a> {
    /// Resolves `user` (or the least-known user) and its candidate set.
    pub fn resolve(
        ratings: &RatingStore,
        users: &'a UserIndex,
        user: Option<&str>,
    ) -> Result<Self, SelectError> {
        let idx = match user {
            Some(u) => users.position(u)?,
            None => least_known_user(ratings, users),
        };
        let user = users.user(idx).unwrap_or_default();

        let mut rated = Vec::new();
        for (partner, value) in ratings.rated_partners(user) {
            rated.push((users.position(partner)?, value));
        }
        rated.sort_by_key(|(i, _)| *i);

        let candidates = (0..users.len())
            .filter(|i| rated.binary_search_by_key(i, |(p, _)| *p).is_err())
            .collect();

        Ok(Self {
            user,
            idx,
            rated,
            candidates,
        })
    }

    fn selection(&self, users: &UserIndex, candidate: usize) -> Option<Selection> {
        users.user(candidate).map(|c| Selection {
            user: self.user.to_string(),
            candidate: c.to_string(),
        })
    }
}

/// Index of the user with the fewest known entries; ties go to the lowest index.
pub fn least_known_user(ratings: &RatingStore, users: &UserIndex) -> usize {
    let mut counts = vec![0usize; users.len()];
    for (a, b, _) in ratings.iter() {
        if let Some(i) = users.get(a) {
            counts[i] += 1;
        }
        if a != b {
            if let Some(j) = users.get(b) {
                counts[j] += 1;
            }
        }
    }
    counts
        .iter()
        .enumerate()
        .min_by_key(|(i, c)| (**c, *i))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// True once every ordered pair (self pairs included) is known.
pub fn fully_expanded(ratings: &RatingStore, users: &UserIndex) -> bool {
    ratings.len() >= users.len() * users.len()
}

/// Highest-scoring candidate; the earliest one wins ties.
fn best_candidate(candidates: &[usize], score: impl Fn(usize) -> f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for &c in candidates {
        let s = score(c);
        match best {
            None => best = Some((c, s)),
            Some((_, b)) if s > b => best = Some((c, s)),
            _ => {}
        }
    }
    best.map(|(c, _)| c)
}

fn factorize_ratings(
    ratings: &RatingStore,
    users: &UserIndex,
    cfg: &FactorizerConfig,
    rng: &mut StdRng,
) -> Result<Factorization, SelectError> {
    let matrix = build_symmetric(ratings, users)?;
    Ok(factorize_sparse(&matrix, cfg, rng)?)
}

/// Smoothed affinity of the rated partners to each cluster:
/// `(Σ r·W[u,c] + 1) / (|rated| + 1)`.
pub fn cluster_affinity(factors: &Factorization, rated: &[(usize, f64)]) -> Vec<f64> {
    let basis = factors.basis();
    let denom = rated.len() as f64 + 1.0;
    (0..factors.rank())
        .map(|c| {
            let mass: f64 = rated.iter().map(|&(u, r)| r * basis[(u, c)]).sum();
            (mass + 1.0) / denom
        })
        .collect()
}

/// Per-cluster evidence used by the probability strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterEvidence {
    /// Smoothed affinity per cluster.
    pub caff: Vec<f64>,
    /// Share of each cluster's basis mass held by rated partners, scaled so the max is 1.
    pub cconf: Vec<f64>,
    /// Share of the total basis mass held by rated partners.
    pub conf: f64,
}

impl ClusterEvidence {
    pub fn compute(factors: &Factorization, rated: &[(usize, f64)]) -> Self {
        let basis = factors.basis();
        let rank = factors.rank();
        let caff = cluster_affinity(factors, rated);

        let total = factors.basis_sum();
        let rated_mass: f64 = rated.iter().map(|&(u, _)| basis.row(u).sum()).sum();
        let conf = if total > 0.0 { rated_mass / total } else { 0.0 };

        let sums = factors.basis_column_sums();
        let mut cconf: Vec<f64> = (0..rank)
            .map(|c| {
                let mass: f64 = rated.iter().map(|&(u, _)| basis[(u, c)]).sum();
                if sums[c] > 0.0 {
                    mass / sums[c]
                } else {
                    0.0
                }
            })
            .collect();
        let max = cconf.iter().copied().fold(0.0_f64, f64::max);
        let norm = if max > 0.0 { max } else { 1.0 };
        for v in &mut cconf {
            *v /= norm;
        }

        Self { caff, cconf, conf }
    }

    /// Probability score of candidate `x` for `user`: the fitted rating
    /// weighted by `conf`, plus the under-evidenced cluster affinity
    /// weighted by `1 - conf`.
    pub fn score(
        &self,
        basis: &DMatrix<f64>,
        fitted: &DMatrix<f64>,
        user: usize,
        x: usize,
    ) -> f64 {
        let rank = self.caff.len();
        let cluster_term = (0..rank)
            .map(|c| (1.0 - self.cconf[c]) * self.caff[c] * basis[(x, c)])
            .sum::<f64>()
            / rank as f64;
        self.conf * fitted[(user, x)] + (1.0 - self.conf) * cluster_term
    }
}

/// Candidate with the largest basis weight in the cluster the subject's
/// rated partners lean toward most.
pub fn clustered_choice(factors: &Factorization, subject: &Subject<'_>) -> Option<usize> {
    let cluster = argmax(cluster_affinity(factors, &subject.rated));
    let basis = factors.basis();
    best_candidate(&subject.candidates, |c| basis[(c, cluster)])
}

/// Candidate with the highest [`ClusterEvidence::score`].
pub fn probability_choice(factors: &Factorization, subject: &Subject<'_>) -> Option<usize> {
    let basis = factors.basis();
    let fitted = factors.fitted();
    let ev = ClusterEvidence::compute(factors, &subject.rated);
    best_candidate(&subject.candidates, |x| ev.score(basis, &fitted, subject.idx, x))
}

// ---------------------------------------------------------------------
//  Strategies
// ---------------------------------------------------------------------

/// Uniformly random unrated partner.
pub struct RandomSelect {
    rng: StdRng,
}

impl RandomSelect {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SelectionStrategy for RandomSelect {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Random
    }

    fn select(
        &mut self,
        ratings: &RatingStore,
        users: &UserIndex,
        user: Option<&str>,
    ) -> Result<Option<Selection>, SelectError> {
        let subject = Subject::resolve(ratings, users, user)?;
        Ok(subject
            .candidates
            .choose(&mut self.rng)
            .and_then(|&c| subject.selection(users, c)))
    }
}

/// Partner most affiliated with the cluster the user likes best.
pub struct ClusteredSelect {
    cfg: FactorizerConfig,
    rng: StdRng,
}

impl ClusteredSelect {
    pub fn new(cfg: FactorizerConfig, seed: u64) -> Self {
        Self {
            cfg,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SelectionStrategy for ClusteredSelect {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Clustered
    }

    fn select(
        &mut self,
        ratings: &RatingStore,
        users: &UserIndex,
        user: Option<&str>,
    ) -> Result<Option<Selection>, SelectError> {
        if fully_expanded(ratings, users) {
            return Ok(None);
        }
        let subject = Subject::resolve(ratings, users, user)?;
        if subject.candidates.is_empty() {
            return Ok(None);
        }
        let factors = factorize_ratings(ratings, users, &self.cfg, &mut self.rng)?;
        Ok(clustered_choice(&factors, &subject).and_then(|c| subject.selection(users, c)))
    }
}

/// Blend of the predicted rating and under-evidenced cluster affinity.
pub struct ProbabilitySelect {
    cfg: FactorizerConfig,
    rng: StdRng,
}

impl ProbabilitySelect {
    pub fn new(cfg: FactorizerConfig, seed: u64) -> Self {
        Self {
            cfg,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SelectionStrategy for ProbabilitySelect {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Probability
    }

    fn select(
        &mut self,
        ratings: &RatingStore,
        users: &UserIndex,
        user: Option<&str>,
    ) -> Result<Option<Selection>, SelectError> {
        if fully_expanded(ratings, users) {
            return Ok(None);
        }
        let subject = Subject::resolve(ratings, users, user)?;
        if subject.candidates.is_empty() {
            return Ok(None);
        }
        let factors = factorize_ratings(ratings, users, &self.cfg, &mut self.rng)?;
        Ok(probability_choice(&factors, &subject).and_then(|c| subject.selection(users, c)))
    }
}

/// Partner with the highest predicted rating.
pub struct MaxGuessSelect {
    cfg: FactorizerConfig,
    rng: StdRng,
}

impl MaxGuessSelect {
    pub fn new(cfg: FactorizerConfig, seed: u64) -> Self {
        Self {
            cfg,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SelectionStrategy for MaxGuessSelect {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MaxGuess
    }

    fn select(
        &mut self,
        ratings: &RatingStore,
        users: &UserIndex,
        user: Option<&str>,
    ) -> Result<Option<Selection>, SelectError> {
        let subject = Subject::resolve(ratings, users, user)?;
        if subject.candidates.is_empty() {
            return Ok(None);
        }
        let factors = factorize_ratings(ratings, users, &self.cfg, &mut self.rng)?;
        let fitted = factors.fitted();
        Ok(
            best_candidate(&subject.candidates, |x| fitted[(subject.idx, x)])
                .and_then(|c| subject.selection(users, c)),
        )
    }
}
