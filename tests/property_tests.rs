//! Property-based tests for invariants that must hold across the whole input
//! space, not just the handful of examples covered by unit tests.
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

use mnemo::scoring::{centrality_score, frequency_score, recency_decay};
use mnemo::storage::cosine_similarity;

proptest! {
    /// recency_decay never exceeds 1 and never goes negative, for any
    /// non-negative day count and any positive decay constant.
    #[test]
    fn recency_decay_stays_in_unit_range(days in 0.0f64..100_000.0, decay_constant in 0.01f64..10_000.0) {
        let value = recency_decay(days, decay_constant);
        prop_assert!((0.0..=1.0).contains(&value));
    }

    /// Negative days always clamp to exactly 1, regardless of magnitude.
    #[test]
    fn recency_decay_clamps_negative_days_to_one(days in -100_000.0f64..0.0, decay_constant in 0.01f64..1000.0) {
        prop_assert_eq!(recency_decay(days, decay_constant), 1.0);
    }

    /// frequency_score is monotonically non-decreasing in count and never
    /// drops below its count=0 floor of 1.0.
    #[test]
    fn frequency_score_is_monotonic_and_floored(count in 0.0f64..1_000_000.0) {
        let score = frequency_score(count);
        prop_assert!(score >= 1.0);
        prop_assert!(frequency_score(count + 1.0) >= score);
    }

    /// Negative counts behave exactly like zero.
    #[test]
    fn frequency_score_negative_counts_match_zero(count in -1_000.0f64..0.0) {
        prop_assert_eq!(frequency_score(count), frequency_score(0.0));
    }

    /// centrality_score is always in [0, 1] and never panics on the max_rel=0
    /// degenerate case.
    #[test]
    fn centrality_score_stays_in_unit_range(rel_count in 0.0f64..10_000.0, max_rel in 0.0f64..10_000.0) {
        let score = centrality_score(rel_count, max_rel);
        prop_assert!((0.0..=1.0).contains(&score));
    }

    /// cosine_similarity never panics and always lands in [-1, 1] for equal-
    /// length finite vectors.
    #[test]
    fn cosine_similarity_stays_in_bounds(
        a in prop::collection::vec(-1000.0f64..1000.0, 1..16),
        b in prop::collection::vec(-1000.0f64..1000.0, 1..16),
    ) {
        let len = a.len().min(b.len());
        let a = &a[..len];
        let b = &b[..len];
        let score = cosine_similarity(a, b);
        prop_assert!(score.is_finite());
        prop_assert!(score >= -1.0001 && score <= 1.0001);
    }

    /// Mismatched-length vectors always score exactly 0, never panic.
    #[test]
    fn cosine_similarity_mismatched_lengths_score_zero(
        a in prop::collection::vec(-10.0f64..10.0, 1..8),
        extra in 1usize..8,
    ) {
        let mut b = a.clone();
        b.extend(std::iter::repeat(1.0).take(extra));
        prop_assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
