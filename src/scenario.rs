//! Initial working copies: ground truth with some pairs hidden.

use rand::rngs::StdRng;
use rand::seq::IteratorRandom;

use crate::error::{ConfigError, DataError, ScenarioError};
use crate::ratings::{RatingStore, UserIndex};

/// Hides `floor(fraction × distinct unordered pairs)` random pairs, both orders.
pub fn hide_random_pairs(
    truth: &RatingStore,
    fraction: f64,
    rng: &mut StdRng,
) -> Result<RatingStore, ConfigError> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(ConfigError::Invalid(format!(
            "hide fraction must be in [0,1], got {fraction}"
        )));
    }
    let pairs = truth.unordered_pairs();
    let count = (fraction * pairs.len() as f64).floor() as usize;
    let hidden = pairs.iter().choose_multiple(rng, count);

    let mut working = truth.clone();
    for (a, b) in hidden {
        working.remove_symmetric(a, b);
    }
    tracing::info!(
        pairs = pairs.len(),
        hidden = count,
        remaining = working.len(),
        "hid random pairs"
    );
    Ok(working)
}

/// "New user" scenario: hides `count` random partners of `focus`.
pub fn hide_user_pairs(
    truth: &RatingStore,
    users: &UserIndex,
    focus: &str,
    count: usize,
    rng: &mut StdRng,
) -> Result<RatingStore, ScenarioError> {
    if !users.contains(focus) {
        return Err(DataError::UnknownUser(focus.to_string()).into());
    }
    if count > users.len() {
        return Err(ConfigError::Invalid(format!(
            "cannot hide {count} partners of {focus}: only {} users",
            users.len()
        ))
        .into());
    }
    let partners = users.users().iter().choose_multiple(rng, count);

    let mut working = truth.clone();
    for partner in partners {
        working.remove_symmetric(focus, partner);
    }
    tracing::info!(
        focus,
        hidden = count,
        remaining = working.len(),
        "hid partners of focus user"
    );
    Ok(working)
}
