//! Helpers for deterministic tests.

use std::collections::VecDeque;

use crate::random::RandomSource;

/// A [`RandomSource`] that replays queued draws in call order.
///
/// Each kind of draw has its own queue. When a queue runs dry the source
/// falls back to the lowest possible draw: `0.0`, index `0`, and the first
/// `amount` indices. That fallback means "always roll under the threshold,
/// always take the first candidate".
#[derive(Debug, Default, Clone)]
pub struct ScriptedRandom {
    units: VecDeque<f64>,
    indices: VecDeque<usize>,
    choices: VecDeque<Vec<usize>>,
    draws: usize,
}

impl ScriptedRandom {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next `unit()` results.
    #[must_use]
    pub fn with_units(mut self, units: impl IntoIterator<Item = f64>) -> Self {
        self.units.extend(units);
        self
    }

    /// Queue the next `index()` results.
    #[must_use]
    pub fn with_indices(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.indices.extend(indices);
        self
    }

    /// Queue the next `choose_indices()` result.
    #[must_use]
    pub fn with_choice(mut self, choice: Vec<usize>) -> Self {
        self.choices.push_back(choice);
        self
    }

    /// Total number of draws made so far, of any kind.
    #[must_use]
    pub const fn draws(&self) -> usize {
        self.draws
    }
}

impl RandomSource for ScriptedRandom {
    fn unit(&mut self) -> f64 {
        self.draws += 1;
        self.units.pop_front().unwrap_or(0.0)
    }

    fn index(&mut self, len: usize) -> usize {
        self.draws += 1;
        self.indices.pop_front().unwrap_or(0).min(len.saturating_sub(1))
    }

    fn choose_indices(&mut self, len: usize, amount: usize) -> Vec<usize> {
        self.draws += 1;
        self.choices
            .pop_front()
            .unwrap_or_else(|| (0..amount.min(len)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_in_order_then_falls_back() {
        let mut rng = ScriptedRandom::new()
            .with_units([0.9, 0.1])
            .with_indices([1])
            .with_choice(vec![3, 1]);

        assert!((rng.unit() - 0.9).abs() < f64::EPSILON);
        assert!((rng.unit() - 0.1).abs() < f64::EPSILON);
        assert!(rng.unit().abs() < f64::EPSILON);

        assert_eq!(rng.index(2), 1);
        assert_eq!(rng.index(2), 0);

        assert_eq!(rng.choose_indices(4, 2), vec![3, 1]);
        assert_eq!(rng.choose_indices(4, 2), vec![0, 1]);

        assert_eq!(rng.draws(), 7);
    }

    #[test]
    fn test_index_is_clamped() {
        let mut rng = ScriptedRandom::new().with_indices([10]);
        assert_eq!(rng.index(3), 2);
    }
}
