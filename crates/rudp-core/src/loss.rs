//! Bernoulli loss injection for protocol evaluation.
//!
//! Interposed on the receiver's inbound path: every datagram, control
//! frames included, is dropped with independent probability `p`. Dropping
//! control frames is what exercises the handshake and teardown under loss.

use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};

/// Per-datagram Bernoulli drop decision.
#[derive(Debug)]
pub struct LossInjector {
    prob: f64,
    rng: StdRng,
}

impl LossInjector {
    /// Injector with entropy-seeded randomness.
    #[must_use]
    pub fn new(prob: f64) -> Self {
        Self { prob, rng: StdRng::from_entropy() }
    }

    /// Injector with a fixed seed, for reproducible evaluation runs.
    #[must_use]
    pub fn with_seed(prob: f64, seed: u64) -> Self {
        Self { prob, rng: StdRng::seed_from_u64(seed) }
    }

    /// Configured drop probability.
    #[must_use]
    pub fn prob(&self) -> f64 {
        self.prob
    }

    /// Decide the fate of one inbound datagram.
    ///
    /// `p <= 0` never drops, `p >= 1` always drops.
    pub fn should_drop(&mut self) -> bool {
        if self.prob <= 0.0 {
            return false;
        }
        if self.prob >= 1.0 {
            return true;
        }
        self.rng.gen_bool(self.prob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_probability_never_drops() {
        let mut injector = LossInjector::new(0.0);
        assert!((0..1000).all(|_| !injector.should_drop()));
    }

    #[test]
    fn negative_probability_never_drops() {
        let mut injector = LossInjector::new(-0.5);
        assert!((0..100).all(|_| !injector.should_drop()));
    }

    #[test]
    fn unit_probability_always_drops() {
        let mut injector = LossInjector::new(1.0);
        assert!((0..1000).all(|_| injector.should_drop()));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let mut a = LossInjector::with_seed(0.3, 42);
        let mut b = LossInjector::with_seed(0.3, 42);
        let first: Vec<bool> = (0..256).map(|_| a.should_drop()).collect();
        let second: Vec<bool> = (0..256).map(|_| b.should_drop()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn drop_rate_tracks_probability() {
        let mut injector = LossInjector::with_seed(0.1, 7);
        let dropped = (0..10_000).filter(|_| injector.should_drop()).count();
        // 10% +- generous tolerance; seeded, so not flaky
        assert!((500..1500).contains(&dropped), "dropped {dropped} of 10000");
    }
}
