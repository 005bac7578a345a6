//! Randomized exponential backoff for proposer retries.

use rand::rngs::StdRng;
use rand::Rng;
use std::time::Duration;

/// Base delay before the first retry.
const BASE_DELAY: Duration = Duration::from_millis(50);

/// Ceiling on the exponential growth.
const MAX_DELAY: Duration = Duration::from_secs(2);

/// Exponentially growing, uniformly jittered retry delays.
///
/// Attempt `k` draws uniformly from `[base * 2^k / 2, base * 2^k]`,
/// capped at [`MAX_DELAY`]. The jitter decorrelates duelling proposers
/// so they stop preempting each other's rounds.
#[derive(Debug)]
pub struct Backoff {
    attempt: u32,
}

impl Backoff {
    /// Start a fresh backoff sequence.
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    /// Draw the next delay and advance the sequence.
    pub fn next_delay(&mut self, rng: &mut StdRng) -> Duration {
        let exponent = self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);

        let ceiling = BASE_DELAY
            .saturating_mul(1 << exponent)
            .min(MAX_DELAY)
            .as_millis() as u64;
        let floor = (ceiling / 2).max(1);
        Duration::from_millis(rng.random_range(floor..=ceiling))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_delays_stay_within_window() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut backoff = Backoff::new();

        for attempt in 0..20u32 {
            let delay = backoff.next_delay(&mut rng);
            let ceiling = BASE_DELAY
                .saturating_mul(1 << attempt.min(16))
                .min(MAX_DELAY);
            assert!(delay <= ceiling, "attempt {attempt}: {delay:?} > {ceiling:?}");
            assert!(delay >= ceiling / 2 || delay >= Duration::from_millis(1));
        }
    }

    #[test]
    fn test_growth_is_capped() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut backoff = Backoff::new();

        let mut last = Duration::ZERO;
        for _ in 0..30 {
            last = backoff.next_delay(&mut rng);
        }
        assert!(last <= MAX_DELAY);
        assert!(last >= MAX_DELAY / 2);
    }

    #[test]
    fn test_jitter_varies() {
        let mut rng = StdRng::seed_from_u64(3);
        let delays: std::collections::BTreeSet<Duration> = (0..32)
            .map(|_| Backoff::new().next_delay(&mut rng))
            .collect();
        assert!(delays.len() > 1, "jitter should produce varied delays");
    }
}
