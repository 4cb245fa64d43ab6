//! Sparse non-negative matrix factorization (SNMF/R).
//!
//! V ≈ W·H with W, H ≥ 0. Each iteration alternates two regularized
//! non-negative least squares problems:
//! - H ← argmin ‖[W; √β·1ᵀ] H − [V; 0]‖   (sparsity on the coefficient side)
//! - W ← argmin ‖[Hᵀ; √η·I] Wᵀ − [Vᵀ; 0]‖ (size control on the basis side)
//!
//! Seeding follows the random-C scheme: every basis column (coefficient row)
//! is the mean of a few randomly chosen columns (rows) among the longest
//! ones. The factorization runs on every selection call, so the iteration
//! budget is small.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sprs::CsMat;

use crate::error::FactorizeError;
use crate::matrix::to_dense;

/// Singular values below this are treated as zero in the passive-set solves.
const SVD_EPS: f64 = 1e-12;

/// Outer iterations of the active-set solver, as a multiple of the column count.
const NNLS_MAX_ITER_FACTOR: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorizerConfig {
    /// Number of latent clusters.
    pub rank: usize,
    /// Hard cap on alternating iterations.
    pub max_iter: usize,
    /// Basis regularization. Negative means `max(V)²`.
    pub eta: f64,
    /// Coefficient sparsity regularization.
    pub beta: f64,
    /// Stop after this many consecutive iterations with stable cluster assignments.
    pub i_conv: usize,
    /// Rows of W allowed to change cluster while still counting as stable.
    pub w_min_change: usize,
}

impl Default for FactorizerConfig {
    fn default() -> Self {
        Self {
            rank: 9,
            max_iter: 12,
            eta: 1.0,
            beta: 1e-4,
            i_conv: 10,
            w_min_change: 0,
        }
    }
}

/// Result of one factorization run.
#[derive(Debug, Clone)]
pub struct Factorization {
    basis: DMatrix<f64>,
    coef: DMatrix<f64>,
    iterations: usize,
}

impl Factorization {
    /// Wraps precomputed factors. `basis` is users × rank and `coef` is
    /// rank × users.
    pub fn from_parts(basis: DMatrix<f64>, coef: DMatrix<f64>, iterations: usize) -> Self {
        Self {
            basis,
            coef,
            iterations,
        }
    }

    /// Basis matrix W (users × rank): cluster affiliation per user.
    pub fn basis(&self) -> &DMatrix<f64> {
        &self.basis
    }

    /// Coefficient matrix H (rank × users).
    pub fn coef(&self) -> &DMatrix<f64> {
        &self.coef
    }

    /// Reconstructed ratings W·H.
    pub fn fitted(&self) -> DMatrix<f64> {
        &self.basis * &self.coef
    }

    pub fn rank(&self) -> usize {
        self.basis.ncols()
    }

    /// Total mass of the basis matrix.
    pub fn basis_sum(&self) -> f64 {
        self.basis.sum()
    }

    /// Basis mass per cluster.
    pub fn basis_column_sums(&self) -> Vec<f64> {
        self.basis.column_iter().map(|c| c.sum()).collect()
    }

    /// Alternating iterations actually performed.
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

pub fn factorize_sparse(
    matrix: &CsMat<f64>,
    cfg: &FactorizerConfig,
    rng: &mut StdRng,
) -> Result<Factorization, FactorizeError> {
    factorize(&to_dense(matrix), cfg, rng)
}

pub fn factorize(
    v: &DMatrix<f64>,
    cfg: &FactorizerConfig,
    rng: &mut StdRng,
) -> Result<Factorization, FactorizeError> {
    validate_input(v, cfg)?;

    let (m, n) = v.shape();
    let rank = cfg.rank;
    let eta = if cfg.eta < 0.0 {
        let max = v.max();
        max * max
    } else {
        cfg.eta
    };

    let (mut w, mut h) = seed_random_c(v, rank, rng);

    // [V; 0] and [Vᵀ; 0] never change between iterations.
    let mut v_aug = DMatrix::<f64>::zeros(m + 1, n);
    v_aug.view_mut((0, 0), (m, n)).copy_from(v);
    let mut vt_aug = DMatrix::<f64>::zeros(n + rank, m);
    vt_aug.view_mut((0, 0), (n, m)).copy_from(&v.transpose());

    let mut w_idx_old = row_argmax(&w);
    let mut h_idx_old = column_argmax(&h);
    let mut stable = 0usize;
    let mut iterations = 0usize;

    while iterations < cfg.max_iter {
        let mut w_aug = DMatrix::<f64>::zeros(m + 1, rank);
        w_aug.view_mut((0, 0), (m, rank)).copy_from(&w);
        w_aug.row_mut(m).fill(cfg.beta.sqrt());
        h = nnls_columns(&w_aug, &v_aug);

        let mut h_aug = DMatrix::<f64>::zeros(n + rank, rank);
        h_aug.view_mut((0, 0), (n, rank)).copy_from(&h.transpose());
        h_aug
            .view_mut((n, 0), (rank, rank))
            .copy_from(&(DMatrix::<f64>::identity(rank, rank) * eta.sqrt()));
        w = nnls_columns(&h_aug, &vt_aug).transpose();

        iterations += 1;

        if cfg.i_conv > 0 {
            let w_idx = row_argmax(&w);
            let h_idx = column_argmax(&h);
            let changed_w = w_idx.iter().zip(&w_idx_old).filter(|(a, b)| a != b).count();
            let changed_h = h_idx.iter().zip(&h_idx_old).filter(|(a, b)| a != b).count();
            if changed_w <= cfg.w_min_change && changed_h == 0 {
                stable += 1;
            } else {
                stable = 0;
            }
            w_idx_old = w_idx;
            h_idx_old = h_idx;
            if stable >= cfg.i_conv {
                break;
            }
        }
    }

    tracing::debug!(rank, iterations, stable, "factorization finished");

    Ok(Factorization::from_parts(w, h, iterations))
}

fn validate_input(v: &DMatrix<f64>, cfg: &FactorizerConfig) -> Result<(), FactorizeError> {
    if cfg.rank == 0 {
        return Err(FactorizeError::ZeroRank);
    }
    let (rows, cols) = v.shape();
    if rows == 0 || cols == 0 {
        return Err(FactorizeError::EmptyMatrix);
    }
    if rows != cols {
        return Err(FactorizeError::NotSquare { rows, cols });
    }
    for j in 0..cols {
        for i in 0..rows {
            let value = v[(i, j)];
            if !value.is_finite() || value < 0.0 {
                return Err(FactorizeError::InvalidEntry {
                    row: i,
                    col: j,
                    value,
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------
//  Seeding
// ---------------------------------------------------------------------

/// Indices of the `keep` largest values, largest first. Ties keep index order.
fn longest(norms: &[f64], keep: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..norms.len()).collect();
    idx.sort_by(|&a, &b| norms[b].total_cmp(&norms[a]).then(a.cmp(&b)));
    idx.truncate(keep.max(1));
    idx
}

fn seed_random_c(v: &DMatrix<f64>, rank: usize, rng: &mut StdRng) -> (DMatrix<f64>, DMatrix<f64>) {
    let (m, n) = v.shape();
    let p_c = n.div_ceil(5);
    let p_r = m.div_ceil(5);
    let l_c = n.div_ceil(2);
    let l_r = m.div_ceil(2);

    let col_norms: Vec<f64> = v.column_iter().map(|c| c.norm()).collect();
    let row_norms: Vec<f64> = v.row_iter().map(|r| r.norm()).collect();
    let top_c = longest(&col_norms, l_c);
    let top_r = longest(&row_norms, l_r);

    let mut w = DMatrix::<f64>::zeros(m, rank);
    let mut h = DMatrix::<f64>::zeros(rank, n);
    for k in 0..rank {
        let mut col = DVector::<f64>::zeros(m);
        for _ in 0..p_c {
            let pick = top_c[rng.gen_range(0..top_c.len())];
            col += v.column(pick);
        }
        w.set_column(k, &(col / p_c as f64));

        let mut row = DVector::<f64>::zeros(n);
        for _ in 0..p_r {
            let pick = top_r[rng.gen_range(0..top_r.len())];
            row += v.row(pick).transpose();
        }
        h.set_row(k, &(row / p_r as f64).transpose());
    }
    (w, h)
}

// ---------------------------------------------------------------------
//  Non-negative least squares
// ---------------------------------------------------------------------

/// Solves `min ‖A x − b‖, x ≥ 0` for every column b of `rhs`.
fn nnls_columns(a: &DMatrix<f64>, rhs: &DMatrix<f64>) -> DMatrix<f64> {
    let k = a.ncols();
    let mut out = DMatrix::<f64>::zeros(k, rhs.ncols());
    let at = a.transpose();
    let tol = 10.0 * f64::EPSILON * a.abs().row_sum().max() * a.nrows().max(k) as f64;
    for (j, b) in rhs.column_iter().enumerate() {
        let b = b.into_owned();
        let x = nnls(a, &at, &b, tol);
        out.set_column(j, &x);
    }
    out
}

/// Least squares restricted to the passive columns; zeros elsewhere.
fn passive_solve(a: &DMatrix<f64>, b: &DVector<f64>, passive: &[bool]) -> Option<DVector<f64>> {
    let cols: Vec<usize> = (0..passive.len()).filter(|&j| passive[j]).collect();
    let sub = a.select_columns(cols.iter());
    let z_sub = sub.svd(true, true).solve(b, SVD_EPS).ok()?;
    let mut z = DVector::<f64>::zeros(passive.len());
    for (p, &j) in cols.iter().enumerate() {
        z[j] = z_sub[p];
    }
    Some(z)
}

/// Lawson–Hanson active-set NNLS.
fn nnls(a: &DMatrix<f64>, at: &DMatrix<f64>, b: &DVector<f64>, tol: f64) -> DVector<f64> {
    let k = a.ncols();
    let mut x = DVector::<f64>::zeros(k);
    let mut passive = vec![false; k];
    let max_outer = NNLS_MAX_ITER_FACTOR * k.max(1);

    for _ in 0..max_outer {
        let grad = at * (b - a * &x);
        let next = (0..k)
            .filter(|&j| !passive[j] && grad[j] > tol)
            .max_by(|&i, &j| grad[i].total_cmp(&grad[j]).then(j.cmp(&i)));
        let Some(t) = next else { break };
        passive[t] = true;

        loop {
            let Some(z) = passive_solve(a, b, &passive) else {
                passive[t] = false;
                return x.map(|v| v.max(0.0));
            };
            if (0..k).filter(|&j| passive[j]).all(|j| z[j] > tol) {
                x = z;
                break;
            }
            let mut alpha = f64::INFINITY;
            for j in (0..k).filter(|&j| passive[j] && z[j] <= tol) {
                let denom = x[j] - z[j];
                if denom > 0.0 {
                    alpha = alpha.min(x[j] / denom);
                }
            }
            if !alpha.is_finite() {
                alpha = 0.0;
            }
            x += (z - &x) * alpha;
            for j in 0..k {
                if passive[j] && x[j] <= tol {
                    passive[j] = false;
                    x[j] = 0.0;
                }
            }
            if !passive.iter().any(|&p| p) {
                break;
            }
        }
    }

    x.map(|v| v.max(0.0))
}

// ---------------------------------------------------------------------
//  Cluster assignments
// ---------------------------------------------------------------------

/// Position of the first maximum.
pub(crate) fn argmax(values: impl IntoIterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, v) in values.into_iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

fn row_argmax(m: &DMatrix<f64>) -> Vec<usize> {
    m.row_iter().map(|r| argmax(r.iter().copied())).collect()
}

fn column_argmax(m: &DMatrix<f64>) -> Vec<usize> {
    m.column_iter().map(|c| argmax(c.iter().copied())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn block_matrix() -> DMatrix<f64> {
        // Two clear communities: {0,1,2} and {3,4,5}.
        let mut v = DMatrix::<f64>::zeros(6, 6);
        for i in 0..3 {
            for j in 0..3 {
                v[(i, j)] = 5.0;
                v[(i + 3, j + 3)] = 4.0;
            }
        }
        v
    }

    #[test]
    fn nnls_matches_unconstrained_solution_when_positive() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let x = nnls(&a, &a.transpose(), &b, 1e-10);
        assert!((x[0] - 1.0).abs() < 1e-8);
        assert!((x[1] - 2.0).abs() < 1e-8);
    }

    #[test]
    fn nnls_clamps_negative_direction() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let b = DVector::from_vec(vec![-1.0, 2.0]);
        let x = nnls(&a, &a.transpose(), &b, 1e-10);
        assert_eq!(x[0], 0.0);
        assert!((x[1] - 2.0).abs() < 1e-8);
    }

    #[test]
    fn factors_are_non_negative_with_expected_shapes() {
        let v = block_matrix();
        let cfg = FactorizerConfig {
            rank: 2,
            ..FactorizerConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let f = factorize(&v, &cfg, &mut rng).unwrap();
        assert_eq!(f.basis().shape(), (6, 2));
        assert_eq!(f.coef().shape(), (2, 6));
        assert_eq!(f.fitted().shape(), (6, 6));
        assert!(f.basis().iter().all(|x| *x >= 0.0 && x.is_finite()));
        assert!(f.coef().iter().all(|x| *x >= 0.0 && x.is_finite()));
        assert!(f.iterations() >= 1 && f.iterations() <= cfg.max_iter);
    }

    #[test]
    fn same_seed_same_factors() {
        let v = block_matrix();
        let cfg = FactorizerConfig::default();
        let a = factorize(&v, &cfg, &mut StdRng::seed_from_u64(11)).unwrap();
        let b = factorize(&v, &cfg, &mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a.basis(), b.basis());
        assert_eq!(a.coef(), b.coef());
    }

    #[test]
    fn zero_matrix_gives_zero_factors() {
        let v = DMatrix::<f64>::zeros(3, 3);
        let mut rng = StdRng::seed_from_u64(1);
        let f = factorize(&v, &FactorizerConfig::default(), &mut rng).unwrap();
        assert_eq!(f.basis_sum(), 0.0);
        assert!(f.fitted().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn rejects_bad_input() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = FactorizerConfig {
            rank: 0,
            ..FactorizerConfig::default()
        };
        assert!(matches!(
            factorize(&DMatrix::zeros(2, 2), &cfg, &mut rng),
            Err(FactorizeError::ZeroRank)
        ));

        let cfg = FactorizerConfig::default();
        assert!(matches!(
            factorize(&DMatrix::zeros(2, 3), &cfg, &mut rng),
            Err(FactorizeError::NotSquare { rows: 2, cols: 3 })
        ));

        let mut v = DMatrix::<f64>::zeros(2, 2);
        v[(1, 0)] = -1.0;
        assert!(matches!(
            factorize(&v, &cfg, &mut rng),
            Err(FactorizeError::InvalidEntry { row: 1, col: 0, .. })
        ));
    }

    #[test]
    fn rank_one_structure_is_reconstructed() {
        let v = DMatrix::from_fn(6, 6, |i, j| ((i + 1) * (j + 1)) as f64);
        let cfg = FactorizerConfig {
            rank: 2,
            max_iter: 30,
            ..FactorizerConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let f = factorize(&v, &cfg, &mut rng).unwrap();
        let fitted = f.fitted();
        assert!(fitted[(5, 2)] > fitted[(2, 2)]);
        assert!(fitted[(2, 2)] > fitted[(0, 2)]);
        assert!((fitted[(5, 5)] - v[(5, 5)]).abs() / v[(5, 5)] < 0.1);
    }
}
