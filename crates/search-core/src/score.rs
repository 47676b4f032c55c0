//! Score normalization and hybrid fusion.

use common::config::HybridWeights;

/// Min-max normalize a scored list into `[0,1]`, preserving order.
///
/// Degenerate inputs collapse to 1.0: a single item, or a list whose
/// scores are all equal, carries no ranking signal of its own.
pub fn normalize_scores<T>(mut items: Vec<(T, f32)>) -> Vec<(T, f32)> {
    match items.len() {
        0 => items,
        1 => {
            items[0].1 = 1.0;
            items
        }
        _ => {
            let min = items.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
            let max = items
                .iter()
                .map(|(_, s)| *s)
                .fold(f32::NEG_INFINITY, f32::max);
            let range = max - min;
            for (_, score) in &mut items {
                *score = if range <= f32::EPSILON {
                    1.0
                } else {
                    (*score - min) / range
                };
            }
            items
        }
    }
}

/// Weighted linear combination of normalized branch scores.
pub fn combine(keyword: f32, vector: f32, weights: HybridWeights) -> f32 {
    weights.keyword * keyword + weights.vector * vector
}

#[cfg(test)]
mod tests {
    use common::config::HybridWeights;
    use proptest::prelude::*;

    use super::{combine, normalize_scores};

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(normalize_scores(Vec::<((), f32)>::new()).is_empty());
    }

    #[test]
    fn single_item_normalizes_to_one() {
        assert_eq!(normalize_scores(vec![("a", 0.37)]), vec![("a", 1.0)]);
    }

    #[test]
    fn equal_scores_normalize_to_one() {
        let out = normalize_scores(vec![("a", 2.5), ("b", 2.5), ("c", 2.5)]);
        assert!(out.iter().all(|(_, s)| *s == 1.0));
    }

    #[test]
    fn min_max_spans_the_unit_interval() {
        let out = normalize_scores(vec![("a", 1.0), ("b", 3.0), ("c", 5.0)]);
        assert_eq!(out, vec![("a", 0.0), ("b", 0.5), ("c", 1.0)]);
    }

    #[test]
    fn combine_applies_weights() {
        let weights = HybridWeights::new(0.6, 0.4).expect("weights");
        let fused = combine(1.0, 0.5, weights);
        assert!((fused - 0.8).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn normalized_scores_stay_in_unit_interval(
            scores in proptest::collection::vec(0.0f32..1000.0, 0..64)
        ) {
            let items: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
            let out = normalize_scores(items);
            prop_assert!(out.iter().all(|(_, s)| (0.0..=1.0).contains(s)));
        }

        #[test]
        fn normalization_preserves_order_and_is_idempotent(
            scores in proptest::collection::vec(0.0f32..1000.0, 1..64)
        ) {
            let items: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
            let once = normalize_scores(items);
            let ids: Vec<usize> = once.iter().map(|(id, _)| *id).collect();
            prop_assert_eq!(ids, (0..once.len()).collect::<Vec<_>>());

            let twice = normalize_scores(once.clone());
            for ((_, first), (_, second)) in once.iter().zip(twice.iter()) {
                prop_assert!((first - second).abs() < 1e-5);
            }
        }

        #[test]
        fn combined_score_stays_in_unit_interval(
            keyword in 0.0f32..=1.0,
            vector in 0.0f32..=1.0,
            weight in 0.0f32..=1.0,
        ) {
            let weights = HybridWeights {
                keyword: weight,
                vector: 1.0 - weight,
            };
            prop_assume!(weights.validate().is_ok());
            let fused = combine(keyword, vector, weights);
            prop_assert!((0.0..=1.0 + 1e-6).contains(&fused));
        }
    }
}
