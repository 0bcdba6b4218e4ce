//! Correlation token generation

use contracts::limits::CORRELATION_TOKEN_LEN;
use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Produces random `[A-Za-z0-9]` correlation tokens
#[derive(Debug)]
pub struct TokenGenerator {
    rng: StdRng,
}

impl TokenGenerator {
    /// Generator seeded from the operating system
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic generator for tests and replays
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Next token, always `CORRELATION_TOKEN_LEN` characters
    pub fn next_token(&mut self) -> String {
        (&mut self.rng)
            .sample_iter(Alphanumeric)
            .take(CORRELATION_TOKEN_LEN)
            .map(char::from)
            .collect()
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}
