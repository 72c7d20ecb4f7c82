//! Deterministic, content-addressed dataset splits.
//!
//! Each identifier is hashed together with a salt and the digest is turned
//! into a number in `[0, 1]`. Buckets own consecutive intervals of `[0, 1]`
//! sized by their normalized weight, laid out in lexicographic order of
//! bucket name. An identifier's bucket therefore depends only on the
//! identifier, the salt, the weights and the digit count: never on the other
//! identifiers or their order.

pub mod persist;


use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::error::{ConfigurationError, Result};

/// Default number of decimal digits drawn from each digest.
pub const DEFAULT_DIGITS: usize = 8;

/// Largest digit count that is still converted through an exact integer.
const MAX_INTEGER_DIGITS: usize = 18;

/// Relative bucket sizes, keyed by bucket name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SplitWeights(BTreeMap<String, f64>);

impl SplitWeights {
    pub fn new(weights: BTreeMap<String, f64>) -> Result<Self> {
        let weights = Self(weights);
        weights.validate()?;
        Ok(weights)
    }

    pub fn from_pairs(pairs: &[(&str, f64)]) -> Result<Self> {
        Self::new(
            pairs
                .iter()
                .map(|&(name, weight)| (name.to_string(), weight))
                .collect(),
        )
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.0.is_empty() {
            return Err(ConfigurationError::EmptyWeights);
        }
        for (bucket, &weight) in &self.0 {
            if !(weight.is_finite() && weight > 0.0) {
                return Err(ConfigurationError::NonPositiveWeight {
                    bucket: bucket.clone(),
                    weight,
                });
            }
        }
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Inclusive upper bound of each bucket's interval, in bucket-name order.
    ///
    /// The last bound is pinned to exactly 1.0 so rounding in the cumulative
    /// sum can never leave a gap at the top of the range.
    fn upper_bounds(&self) -> Vec<f64> {
        let total: f64 = self.0.values().sum();
        let mut cumulative = 0.0;
        let mut bounds: Vec<f64> = self
            .0
            .values()
            .map(|weight| {
                cumulative += weight / total;
                cumulative
            })
            .collect();
        if let Some(last) = bounds.last_mut() {
            *last = 1.0;
        }
        bounds
    }
}

impl Default for SplitWeights {
    fn default() -> Self {
        Self(BTreeMap::from([
            ("test".to_string(), 0.15),
            ("train".to_string(), 0.7),
            ("valid".to_string(), 0.15),
        ]))
    }
}

/// Bucket name → sorted identifier indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Partition {
    buckets: BTreeMap<String, Vec<usize>>,
}

impl Partition {
    pub fn from_buckets(buckets: BTreeMap<String, Vec<usize>>) -> Self {
        let buckets = buckets
            .into_iter()
            .map(|(name, mut indices)| {
                indices.sort_unstable();
                (name, indices)
            })
            .collect();
        Self { buckets }
    }

    pub fn buckets(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.buckets
    }

    /// Indices in `bucket`; empty if the bucket does not exist.
    pub fn get(&self, bucket: &str) -> &[usize] {
        self.buckets.get(bucket).map_or(&[], Vec::as_slice)
    }

    /// Total number of assigned identifiers.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket_of(&self, index: usize) -> Option<&str> {
        self.buckets
            .iter()
            .find(|(_, indices)| indices.binary_search(&index).is_ok())
            .map(|(name, _)| name.as_str())
    }

    /// Bucket name for every identifier, in identifier order.
    pub fn assignment(&self) -> Vec<&str> {
        let mut assignment = vec![""; self.len()];
        for (name, indices) in &self.buckets {
            for &index in indices {
                if let Some(slot) = assignment.get_mut(index) {
                    *slot = name.as_str();
                }
            }
        }
        assignment
    }

    pub fn into_buckets(self) -> BTreeMap<String, Vec<usize>> {
        self.buckets
    }
}

/// Splits `identifiers` into the weighted buckets by hashing `identifier + salt`.
///
/// Identifiers and salt are hashed through their `Display` form, so `3` and
/// `"3"` are the same salt. `digits` controls how finely the `[0, 1]` range is
/// resolved: with few digits many identifiers share a value and the realized
/// bucket sizes drift from the weights. That is a loss of split fidelity, not
/// an error. Equal identifiers always land in the same bucket.
///
/// ```
/// use volprep::partition::{hashsplit, SplitWeights};
///
/// let weights = SplitWeights::from_pairs(&[("train", 0.75), ("test", 0.25)]).unwrap();
/// let split = hashsplit(&["a", "b", "c", "d"], &weights, 0, 8).unwrap();
/// assert_eq!(split.get("train"), &[0, 2, 3]);
/// assert_eq!(split.get("test"), &[1]);
/// ```
pub fn hashsplit<I, S>(
    identifiers: &[I],
    weights: &SplitWeights,
    salt: S,
    digits: usize,
) -> Result<Partition>
where
    I: Display,
    S: Display,
{
    weights.validate()?;
    if digits == 0 {
        return Err(ConfigurationError::ZeroDigits.into());
    }

    let salt = salt.to_string();
    let bounds = weights.upper_bounds();

    let mut buckets: BTreeMap<String, Vec<usize>> =
        weights.names().map(|name| (name.to_string(), Vec::new())).collect();
    let names: Vec<String> = weights.names().map(str::to_string).collect();

    for (index, identifier) in identifiers.iter().enumerate() {
        let value = hash_fraction(&identifier.to_string(), &salt, digits);
        let bucket = bucket_index(&bounds, value);
        if let Some(indices) = buckets.get_mut(&names[bucket]) {
            indices.push(index);
        }
    }

    tracing::info!(
        identifiers = identifiers.len(),
        digits,
        sizes = ?buckets.iter().map(|(k, v)| (k.as_str(), v.len())).collect::<Vec<_>>(),
        "Hash split complete"
    );

    Ok(Partition { buckets })
}

/// Maps `identifier + salt` to a number in `[0, 1]`.
///
/// The first `digits` decimal characters of the hex SHA-512 digest (letters
/// skipped) are read as an integer and divided by `10^digits`. When a digest
/// runs out of decimal characters the digest text itself is hashed again and
/// collection continues.
pub fn hash_fraction(identifier: &str, salt: &str, digits: usize) -> f64 {
    let decimal = decimal_digits(identifier, salt, digits);

    if decimal.len() <= MAX_INTEGER_DIGITS {
        let numerator = decimal
            .bytes()
            .fold(0u64, |acc, b| acc * 10 + u64::from(b - b'0'));
        numerator as f64 / 10u64.pow(decimal.len() as u32) as f64
    } else {
        decimal
            .bytes()
            .rev()
            .fold(0.0f64, |acc, b| (acc + f64::from(b - b'0')) / 10.0)
    }
}

fn decimal_digits(identifier: &str, salt: &str, digits: usize) -> String {
    let mut collected = String::with_capacity(digits);
    let mut hex = hex_digest(format!("{identifier}{salt}").as_bytes());

    loop {
        collected.extend(
            hex.chars()
                .filter(char::is_ascii_digit)
                .take(digits - collected.len()),
        );
        if collected.len() == digits {
            return collected;
        }
        hex = hex_digest(hex.as_bytes());
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha512::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Index of the bucket whose `(lower, upper]` interval holds `value`.
///
/// The first bucket also owns `value == 0`.
fn bucket_index(upper_bounds: &[f64], value: f64) -> usize {
    upper_bounds
        .partition_point(|&upper| upper < value)
        .min(upper_bounds.len() - 1)
}
