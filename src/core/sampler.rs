//! Fan-out sampling: how many choices a non-final scene offers.
//!
//! Weights are configured once per run, for branch counts of 2 and up; the
//! weight of branch count 1 is the remainder after subtracting the others
//! from 1.0. The drawn counts determine the shape of the tree, so the
//! whole table is validated before any generation starts.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WeightError {
    #[error("invalid weight spec '{0}': expected 'count:weight', e.g. '2:0.3'")]
    BadSpec(String),
    #[error("branch count {0} cannot carry a weight (minimum is 2)")]
    BadBranchCount(u32),
    #[error("branch count {0} configured twice")]
    DuplicateBranchCount(u32),
    #[error("weight {1} for branch count {0} is not a finite non-negative number")]
    BadWeight(u32, f64),
    #[error("configured weights sum to {0}, leaving no probability for branch count 1")]
    Oversubscribed(f64),
}

/// Validated branch-count weight table.
#[derive(Debug, Clone, PartialEq)]
pub struct FanoutWeights {
    /// (branch count, probability) pairs sorted by branch count, with the
    /// derived entry for 1 included. Deterministic order keeps seeded
    /// sampling reproducible.
    entries: Vec<(u32, f64)>,
}

impl Default for FanoutWeights {
    /// No configured weights: branch count 1 carries the whole remainder.
    fn default() -> Self {
        Self {
            entries: vec![(1, 1.0)],
        }
    }
}

impl FanoutWeights {
    /// Build from explicit branch-count → weight pairs (counts ≥ 2 only).
    pub fn new(weights: &FxHashMap<u32, f64>) -> Result<Self, WeightError> {
        let mut entries: Vec<(u32, f64)> = Vec::with_capacity(weights.len() + 1);
        for (&count, &weight) in weights {
            if count < 2 {
                return Err(WeightError::BadBranchCount(count));
            }
            if !weight.is_finite() || weight < 0.0 {
                return Err(WeightError::BadWeight(count, weight));
            }
            entries.push((count, weight));
        }

        let sum: f64 = entries.iter().map(|(_, w)| w).sum();
        // The remainder is branch count 1's probability; zero or negative
        // means the configuration left it nothing.
        if sum >= 1.0 {
            return Err(WeightError::Oversubscribed(sum));
        }
        entries.push((1, 1.0 - sum));
        entries.sort_by_key(|&(count, _)| count);
        Ok(Self { entries })
    }

    /// Parse CLI-style specs like `["2:0.3", "3:0.2"]`.
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self, WeightError> {
        let mut weights = FxHashMap::default();
        for spec in specs {
            let spec = spec.as_ref();
            let (count, weight) = spec
                .split_once(':')
                .ok_or_else(|| WeightError::BadSpec(spec.to_string()))?;
            let count: u32 = count
                .trim()
                .parse()
                .map_err(|_| WeightError::BadSpec(spec.to_string()))?;
            let weight: f64 = weight
                .trim()
                .parse()
                .map_err(|_| WeightError::BadSpec(spec.to_string()))?;
            if weights.insert(count, weight).is_some() {
                return Err(WeightError::DuplicateBranchCount(count));
            }
        }
        Self::new(&weights)
    }

    /// Probability assigned to a branch count (derived entry included).
    pub fn probability(&self, count: u32) -> f64 {
        self.entries
            .iter()
            .find(|&&(c, _)| c == count)
            .map(|&(_, w)| w)
            .unwrap_or(0.0)
    }

    pub fn entries(&self) -> &[(u32, f64)] {
        &self.entries
    }
}

/// Draws branch counts for non-final scenes.
#[derive(Debug, Clone)]
pub struct FanoutSampler {
    counts: Vec<u32>,
    index: WeightedIndex<f64>,
}

impl FanoutSampler {
    pub fn new(weights: &FanoutWeights) -> Self {
        let counts = weights.entries.iter().map(|&(c, _)| c).collect();
        // Weights are validated positive-sum, so the index is constructible.
        let index = WeightedIndex::new(weights.entries.iter().map(|&(_, w)| w))
            .unwrap_or_else(|_| WeightedIndex::new([1.0]).unwrap());
        Self { counts, index }
    }

    pub fn sample(&self, rng: &mut StdRng) -> u32 {
        self.counts[self.index.sample(rng)]
    }
}
