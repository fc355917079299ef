//! Frame loss models for the loopback medium.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Decides, frame by frame, whether the medium eats a transmission.
pub trait LossModel: Send {
    fn should_drop(&mut self, frame: &[u8]) -> bool;
}

/// Perfect medium.
pub struct NoLoss;

impl LossModel for NoLoss {
    fn should_drop(&mut self, _frame: &[u8]) -> bool {
        false
    }
}

/// Drops exactly the `nth` transmitted frame (1-based), once.
pub struct DropNth {
    nth: usize,
    seen: usize,
}

impl DropNth {
    pub fn new(nth: usize) -> Self {
        Self { nth, seen: 0 }
    }
}

impl LossModel for DropNth {
    fn should_drop(&mut self, _frame: &[u8]) -> bool {
        self.seen += 1;
        self.seen == self.nth
    }
}

/// Drops every frame. Models a peer that went out of range.
pub struct DropAll;

impl LossModel for DropAll {
    fn should_drop(&mut self, _frame: &[u8]) -> bool {
        true
    }
}

/// Seeded Bernoulli loss; identical seeds give identical drop sequences.
pub struct RandomLoss {
    probability: f64,
    rng: SmallRng,
}

impl RandomLoss {
    pub fn new(probability: f64, seed: u64) -> Self {
        Self {
            probability,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl LossModel for RandomLoss {
    fn should_drop(&mut self, _frame: &[u8]) -> bool {
        self.rng.random_bool(self.probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_nth_hits_once() {
        let mut loss = DropNth::new(3);
        let drops: Vec<bool> = (0..5).map(|_| loss.should_drop(&[])).collect();
        assert_eq!(drops, vec![false, false, true, false, false]);
    }

    #[test]
    fn random_loss_is_reproducible() {
        let mut a = RandomLoss::new(0.5, 7);
        let mut b = RandomLoss::new(0.5, 7);
        for _ in 0..32 {
            assert_eq!(a.should_drop(&[]), b.should_drop(&[]));
        }
    }

    #[test]
    fn extremes() {
        let mut none = RandomLoss::new(0.0, 1);
        let mut all = RandomLoss::new(1.0, 1);
        assert!(!none.should_drop(&[]));
        assert!(all.should_drop(&[]));
    }
}
