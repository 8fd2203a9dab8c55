//! Eviction scoring
//!
//! When the RAM tier is over budget, every resident entry is scored from its
//! idle age and its size, and the entry with the highest score goes first.

/// Scores a resident entry for eviction; higher scores are evicted first
pub trait EvictionPolicy: Send + Sync {
    fn score(&self, age_ms: u64, size_bytes: u64) -> u128;
}

impl<F> EvictionPolicy for F
where
    F: Fn(u64, u64) -> u128 + Send + Sync,
{
    fn score(&self, age_ms: u64, size_bytes: u64) -> u128 {
        self(age_ms, size_bytes)
    }
}

/// Default policy: `age_ms * ceil(size_bytes / 10_000)`
///
/// Staleness is weighted by size in 10 KB steps, so a large idle entry is
/// purged before a small idle one of the same age.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgeSizePolicy;

impl AgeSizePolicy {
    pub const SIZE_STEP: u64 = 10_000;
}

impl EvictionPolicy for AgeSizePolicy {
    fn score(&self, age_ms: u64, size_bytes: u64) -> u128 {
        let steps = size_bytes.div_ceil(Self::SIZE_STEP);
        u128::from(age_ms) * u128::from(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rounds_size_up() {
        let policy = AgeSizePolicy;
        assert_eq!(policy.score(100, 1), 100);
        assert_eq!(policy.score(100, 10_000), 100);
        assert_eq!(policy.score(100, 10_001), 200);
        assert_eq!(policy.score(100, 0), 0);
    }

    #[test]
    fn test_default_prefers_older_and_larger() {
        let policy = AgeSizePolicy;
        assert!(policy.score(2_000, 500) > policy.score(1_000, 500));
        assert!(policy.score(1_000, 25_000) > policy.score(1_000, 500));
    }

    #[test]
    fn test_default_does_not_overflow() {
        let policy = AgeSizePolicy;
        let score = policy.score(u64::MAX, u64::MAX);
        assert!(score > u128::from(u64::MAX));
    }

    #[test]
    fn test_closure_policy() {
        let smallest_first = |_age: u64, size: u64| u128::from(u64::MAX - size);
        assert!(smallest_first.score(0, 1) > smallest_first.score(0, 2));
    }
}
