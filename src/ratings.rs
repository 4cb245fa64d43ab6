//! Rating store, user index and JSON loaders.
//!
//! Ratings are keyed by ordered user pairs. A fully known store over N users
//! holds N² entries (both orders plus the self pairs), which is what the
//! density checks in the selection strategies compare against.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::DataError;

// ---------------------------------------------------------------------
//  User index
// ---------------------------------------------------------------------

/// Bijection between user identifiers and dense matrix positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIndex {
    users: Vec<String>,
    positions: HashMap<String, usize>,
}

impl UserIndex {
    /// Positions follow the iteration order of `users`.
    pub fn new<I, S>(users: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Vec::new();
        let mut positions = HashMap::new();
        for user in users {
            let user = user.into();
            if positions.contains_key(&user) {
                return Err(DataError::DuplicateUser(user));
            }
            positions.insert(user.clone(), list.len());
            list.push(user);
        }
        if list.is_empty() {
            return Err(DataError::EmptyUsers);
        }
        Ok(Self {
            users: list,
            positions,
        })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn contains(&self, user: &str) -> bool {
        self.positions.contains_key(user)
    }

    pub fn get(&self, user: &str) -> Option<usize> {
        self.positions.get(user).copied()
    }

    /// Like [`UserIndex::get`], but unknown users are an error.
    pub fn position(&self, user: &str) -> Result<usize, DataError> {
        self.get(user).ok_or_else(|| DataError::UnknownUser(user.to_string()))
    }

    pub fn user(&self, idx: usize) -> Option<&str> {
        self.users.get(idx).map(String::as_str)
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.users.iter().enumerate().map(|(i, u)| (i, u.as_str()))
    }
}

// ---------------------------------------------------------------------
//  Rating store
// ---------------------------------------------------------------------

/// Ordered-pair rating map with sorted iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingStore {
    entries: BTreeMap<(String, String), f64>,
}

impl RatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from `(a, b, rating)` triples, mirroring every pair.
    /// Ratings must be finite and non-negative.
    pub fn from_triples<I, S>(triples: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (S, S, f64)>,
        S: Into<String>,
    {
        let mut store = Self::new();
        for (a, b, value) in triples {
            let (a, b) = (a.into(), b.into());
            if !value.is_finite() {
                return Err(DataError::NonFiniteRating { a, b, value });
            }
            if value < 0.0 {
                return Err(DataError::NegativeRating { a, b, value });
            }
            store.insert_symmetric(&a, &b, value);
        }
        Ok(store)
    }

    /// Number of ordered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rating stored under the exact ordered key `(a, b)`.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        self.entries.get(&(a.to_string(), b.to_string())).copied()
    }

    /// Rating for the unordered pair, checking `(a, b)` before `(b, a)`.
    pub fn lookup(&self, a: &str, b: &str) -> Option<f64> {
        self.get(a, b).or_else(|| self.get(b, a))
    }

    /// True if the pair is present in either order.
    pub fn contains_pair(&self, a: &str, b: &str) -> bool {
        self.lookup(a, b).is_some()
    }

    pub fn insert(&mut self, a: &str, b: &str, value: f64) {
        self.entries.insert((a.to_string(), b.to_string()), value);
    }

    /// Writes `(a, b)` and `(b, a)`; a self pair is written once.
    pub fn insert_symmetric(&mut self, a: &str, b: &str, value: f64) {
        self.insert(a, b, value);
        if a != b {
            self.insert(b, a, value);
        }
    }

    /// Removes both orders of the pair. Returns true if anything was removed.
    pub fn remove_symmetric(&mut self, a: &str, b: &str) -> bool {
        let first = self
            .entries
            .remove(&(a.to_string(), b.to_string()))
            .is_some();
        let second = a != b
            && self
                .entries
                .remove(&(b.to_string(), a.to_string()))
                .is_some();
        first || second
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.entries
            .iter()
            .map(|((a, b), v)| (a.as_str(), b.as_str(), *v))
    }

    /// Number of ordered entries that mention `user` in either position.
    pub fn mentions(&self, user: &str) -> usize {
        self.entries
            .keys()
            .filter(|(a, b)| a == user || b == user)
            .count()
    }

    /// Partners already rated against `user`, with the rating.
    ///
    /// Entries where `user` is the first element win over mirrored ones.
    pub fn rated_partners(&self, user: &str) -> BTreeMap<&str, f64> {
        let mut partners = BTreeMap::new();
        for ((a, b), v) in &self.entries {
            if b == user {
                partners.insert(a.as_str(), *v);
            }
        }
        for ((a, b), v) in &self.entries {
            if a == user {
                partners.insert(b.as_str(), *v);
            }
        }
        partners
    }

    /// Distinct unordered pairs, each as `(min, max)`.
    pub fn unordered_pairs(&self) -> BTreeSet<(String, String)> {
        self.entries
            .keys()
            .map(|(a, b)| {
                if a <= b {
                    (a.clone(), b.clone())
                } else {
                    (b.clone(), a.clone())
                }
            })
            .collect()
    }

    /// Fails on the first rating that references a user outside `users`.
    pub fn check_users(&self, users: &UserIndex) -> Result<(), DataError> {
        for (a, b) in self.entries.keys() {
            for u in [a, b] {
                if !users.contains(u) {
                    return Err(DataError::UnknownUser(u.clone()));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
//  Loaders
// ---------------------------------------------------------------------

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DataError> {
    let raw = std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| DataError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Loads a JSON array of `[user_a, user_b, rating]` triples.
pub fn load_ratings(path: impl AsRef<Path>) -> Result<RatingStore, DataError> {
    let triples: Vec<(String, String, f64)> = read_json(path.as_ref())?;
    RatingStore::from_triples(triples)
}

/// Loads a JSON array of user identifiers.
pub fn load_users(path: impl AsRef<Path>) -> Result<UserIndex, DataError> {
    let users: Vec<String> = read_json(path.as_ref())?;
    UserIndex::new(users)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_index_rejects_duplicates_and_empty() {
        assert!(matches!(
            UserIndex::new(["a", "b", "a"]),
            Err(DataError::DuplicateUser(u)) if u == "a"
        ));
        assert!(matches!(
            UserIndex::new(Vec::<String>::new()),
            Err(DataError::EmptyUsers)
        ));
    }

    #[test]
    fn user_index_positions_follow_input_order() {
        let users = UserIndex::new(["c", "a", "b"]).unwrap();
        assert_eq!(users.position("c").unwrap(), 0);
        assert_eq!(users.position("b").unwrap(), 2);
        assert_eq!(users.user(1), Some("a"));
        assert!(users.position("z").is_err());
    }

    #[test]
    fn symmetric_insert_and_remove() {
        let mut store = RatingStore::new();
        store.insert_symmetric("a", "b", 4.0);
        store.insert_symmetric("a", "a", 1.0);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("b", "a"), Some(4.0));
        assert_eq!(store.mentions("a"), 3);
        assert_eq!(store.mentions("b"), 2);

        assert!(store.remove_symmetric("b", "a"));
        assert_eq!(store.len(), 1);
        assert!(!store.remove_symmetric("b", "a"));
    }

    #[test]
    fn rated_partners_sees_both_positions() {
        let mut store = RatingStore::new();
        store.insert("a", "b", 2.0);
        store.insert("c", "a", 3.0);
        let partners = store.rated_partners("a");
        assert_eq!(partners.len(), 2);
        assert_eq!(partners["b"], 2.0);
        assert_eq!(partners["c"], 3.0);
    }

    #[test]
    fn from_triples_rejects_nan() {
        let err = RatingStore::from_triples([("a", "b", f64::NAN)]).unwrap_err();
        assert!(matches!(err, DataError::NonFiniteRating { .. }));
    }

    #[test]
    fn loader_rejects_negative_ratings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.json");
        std::fs::write(&path, r#"[["a", "b", 3], ["b", "c", -2.0]]"#).unwrap();

        match load_ratings(&path) {
            Err(DataError::NegativeRating { a, b, value }) => {
                assert_eq!((a.as_str(), b.as_str()), ("b", "c"));
                assert_eq!(value, -2.0);
            }
            other => panic!("expected negative rating error, got {other:?}"),
        }
        assert!(RatingStore::from_triples([("a", "a", 0.0)]).is_ok());
    }

    #[test]
    fn unordered_pairs_collapse_mirrors() {
        let store =
            RatingStore::from_triples([("b", "a", 1.0), ("a", "a", 2.0), ("c", "b", 3.0)])
                .unwrap();
        let pairs: Vec<_> = store.unordered_pairs().into_iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "a".to_string()),
                ("a".to_string(), "b".to_string()),
                ("b".to_string(), "c".to_string()),
            ]
        );
    }
}
