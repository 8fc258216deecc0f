use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of six-sided die values.
pub trait DieSource {
    /// Returns a value in `1..=6`.
    fn roll_die(&mut self) -> u8;
}

/// Fair dice backed by a random number generator.
#[derive(Debug, Clone)]
pub struct RandomDice<R> {
    rng: R,
}

impl<R: Rng> RandomDice<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomDice<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> DieSource for RandomDice<R> {
    fn roll_die(&mut self) -> u8 {
        self.rng.gen_range(1..=6)
    }
}

/// Dice that replay a fixed sequence, starting over when exhausted.
#[derive(Debug, Clone)]
pub struct LoadedDice {
    values: Vec<u8>,
    next: usize,
}

impl LoadedDice {
    pub fn new(values: impl IntoIterator<Item = u8>) -> Self {
        Self {
            values: values.into_iter().map(|v| v.clamp(1, 6)).collect(),
            next: 0,
        }
    }
}

impl DieSource for LoadedDice {
    fn roll_die(&mut self) -> u8 {
        if self.values.is_empty() {
            return 1;
        }
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }
}
