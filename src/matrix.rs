//! Symmetric sparse matrix built from the rating store.

use std::collections::BTreeMap;

use nalgebra::DMatrix;
use sprs::{CsMat, TriMat};

use crate::error::DataError;
use crate::ratings::{RatingStore, UserIndex};

/// Builds the N×N symmetric rating matrix.
///
/// Every known pair writes both (i, j) and (j, i). Cells are collected with
/// overwrite semantics first so mirrored entries never add up in the
/// triplet conversion.
pub fn build_symmetric(ratings: &RatingStore, users: &UserIndex) -> Result<CsMat<f64>, DataError> {
    let n = users.len();
    let mut cells: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (a, b, value) in ratings.iter() {
        let i = users.position(a)?;
        let j = users.position(b)?;
        cells.insert((i, j), value);
        cells.insert((j, i), value);
    }

    let mut triplets = TriMat::with_capacity((n, n), cells.len());
    for ((i, j), value) in cells {
        if value != 0.0 {
            triplets.add_triplet(i, j, value);
        }
    }
    let matrix: CsMat<f64> = triplets.to_csr();
    Ok(matrix)
}

/// Dense copy of a sparse matrix, for the factorizer.
pub fn to_dense(matrix: &CsMat<f64>) -> DMatrix<f64> {
    let (rows, cols) = matrix.shape();
    let mut dense = DMatrix::<f64>::zeros(rows, cols);
    for (value, (i, j)) in matrix.iter() {
        dense[(i, j)] = *value;
    }
    dense
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrored_entries_do_not_accumulate() {
        let users = UserIndex::new(["a", "b"]).unwrap();
        let ratings = RatingStore::from_triples([("a", "b", 3.0)]).unwrap();
        let dense = to_dense(&build_symmetric(&ratings, &users).unwrap());
        assert_eq!(dense[(0, 1)], 3.0);
        assert_eq!(dense[(1, 0)], 3.0);
        assert_eq!(dense[(0, 0)], 0.0);
    }

    #[test]
    fn unknown_user_is_reported() {
        let users = UserIndex::new(["a", "b"]).unwrap();
        let mut ratings = RatingStore::new();
        ratings.insert("a", "z", 1.0);
        assert!(matches!(
            build_symmetric(&ratings, &users),
            Err(DataError::UnknownUser(u)) if u == "z"
        ));
    }
}
