//! Seeded random source.
//!
//! Every stochastic decision draws from an explicit [`SimRng`] owned by the
//! rank that runs the step. There is no global generator, so a run is
//! reproducible from its seed and process topology.

use crate::types::RankId;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

#[derive(Debug, Clone)]
pub struct SimRng {
    inner: ChaCha8Rng,
}

impl SimRng {
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Independent stream for one rank of a run.
    pub fn for_rank(seed: u64, rank: RankId) -> Self {
        Self::seeded(seed.wrapping_add(rank.0 as u64))
    }

    /// Uniform real in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// Uniform integer in `[low, high]`. Returns `low` for an empty range.
    pub fn uniform_int(&mut self, low: i64, high: i64) -> i64 {
        if high <= low {
            return low;
        }
        self.inner.gen_range(low..=high)
    }

    /// Normal draw. A zero or invalid deviation yields the mean.
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        if std_dev <= 0.0 {
            return mean;
        }
        match Normal::new(mean, std_dev) {
            Ok(dist) => dist.sample(&mut self.inner),
            Err(_) => mean,
        }
    }

    /// Right-tail Bernoulli trial: succeeds when `u > 1 - p`.
    ///
    /// The strict comparison is part of the model. `u == 1 - p` fails, so
    /// `p = 0` never succeeds.
    pub fn trial(&mut self, probability: f64) -> bool {
        self.uniform() > 1.0 - probability
    }

    /// Pick one element uniformly.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.uniform_int(0, items.len() as i64 - 1) as usize;
        items.get(index)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = SimRng::seeded(42);
        let mut b = SimRng::seeded(42);
        for _ in 0..100 {
            assert_eq!(a.uniform().to_bits(), b.uniform().to_bits());
        }
    }

    #[test]
    fn test_rank_streams_differ() {
        let mut a = SimRng::for_rank(42, RankId::new(0));
        let mut b = SimRng::for_rank(42, RankId::new(1));
        let draws_a: Vec<u64> = (0..8).map(|_| a.uniform().to_bits()).collect();
        let draws_b: Vec<u64> = (0..8).map(|_| b.uniform().to_bits()).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn test_uniform_range() {
        let mut rng = SimRng::seeded(1);
        for _ in 0..1000 {
            let u = rng.uniform();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn test_uniform_int_inclusive() {
        let mut rng = SimRng::seeded(2);
        let mut seen = [false; 3];
        for _ in 0..500 {
            let v = rng.uniform_int(-1, 1);
            assert!((-1..=1).contains(&v));
            seen[(v + 1) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
        assert_eq!(rng.uniform_int(5, 5), 5);
        assert_eq!(rng.uniform_int(5, 2), 5);
    }

    #[test]
    fn test_normal_zero_deviation() {
        let mut rng = SimRng::seeded(3);
        assert_eq!(rng.normal(12.5, 0.0), 12.5);
    }

    #[test]
    fn test_trial_extremes() {
        let mut rng = SimRng::seeded(4);
        for _ in 0..1000 {
            assert!(!rng.trial(0.0));
        }
        let hits = (0..1000).filter(|_| rng.trial(1.0)).count();
        assert!(hits >= 999);
    }

    #[test]
    fn test_choose() {
        let mut rng = SimRng::seeded(5);
        let empty: [u8; 0] = [];
        assert!(rng.choose(&empty).is_none());
        assert_eq!(rng.choose(&[9]), Some(&9));
    }
}
