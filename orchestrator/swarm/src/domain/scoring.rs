// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pluggable candidate scoring.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use switchyard_core::domain::tuning::ScoreWeights;

/// Inputs to a candidate's score, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreInput {
    pub capability_match: f64,
    pub performance: f64,
    pub load: f64,
}

pub trait ScoringStrategy: Send + Sync {
    fn score(&self, input: &ScoreInput, weights: &ScoreWeights) -> f64;

    fn name(&self) -> &'static str;
}

/// `capability·w_c + performance·w_p + (1 − load)·w_l`, normalized by the
/// weight sum so reweighting never leaves `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedScoring;

impl ScoringStrategy for WeightedScoring {
    fn score(&self, input: &ScoreInput, weights: &ScoreWeights) -> f64 {
        let sum = weights.sum();
        if sum <= 0.0 {
            return 0.0;
        }
        let raw = input.capability_match * weights.capability
            + input.performance * weights.performance
            + (1.0 - input.load) * weights.load;
        (raw / sum).clamp(0.0, 1.0)
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}

/// Weighted score plus uniform jitter in `[-amplitude, amplitude]` drawn from
/// a seeded generator. Same seed and call sequence, same scores.
pub struct ExploratoryScoring {
    inner: WeightedScoring,
    amplitude: f64,
    rng: Mutex<StdRng>,
}

impl ExploratoryScoring {
    pub fn new(amplitude: f64, seed: u64) -> Self {
        Self {
            inner: WeightedScoring,
            amplitude: amplitude.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl ScoringStrategy for ExploratoryScoring {
    fn score(&self, input: &ScoreInput, weights: &ScoreWeights) -> f64 {
        let base = self.inner.score(input, weights);
        if self.amplitude == 0.0 {
            return base;
        }
        let jitter = self.rng.lock().random_range(-self.amplitude..=self.amplitude);
        (base + jitter).clamp(0.0, 1.0)
    }

    fn name(&self) -> &'static str {
        "exploratory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(capability_match: f64, performance: f64, load: f64) -> ScoreInput {
        ScoreInput {
            capability_match,
            performance,
            load,
        }
    }

    #[test]
    fn test_weighted_matches_reference_formula() {
        let score = WeightedScoring.score(&input(1.0, 0.5, 0.25), &ScoreWeights::default());
        assert!((score - (0.5 + 0.15 + 0.15)).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_normalizes_shifted_weights() {
        let weights = ScoreWeights {
            capability: 0.4,
            performance: 0.4,
            load: 0.4,
        };
        let score = WeightedScoring.score(&input(1.0, 1.0, 0.0), &weights);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_exploration_is_reproducible_with_seed() {
        let weights = ScoreWeights::default();
        let a = ExploratoryScoring::new(0.1, 7);
        let b = ExploratoryScoring::new(0.1, 7);
        let base = WeightedScoring.score(&input(0.5, 0.5, 0.5), &weights);
        for _ in 0..20 {
            let sa = a.score(&input(0.5, 0.5, 0.5), &weights);
            let sb = b.score(&input(0.5, 0.5, 0.5), &weights);
            assert_eq!(sa, sb);
            assert!((sa - base).abs() <= 0.1 + 1e-12);
        }
    }
}
