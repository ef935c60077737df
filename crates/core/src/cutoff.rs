//! Score-cliff truncation for ranked result lists.
//!
//! A list is cut right before the first adjacent gap that exceeds the
//! population standard deviation of all scores in the list.

use crate::CanonicalResult;

pub trait Scored {
    fn score(&self) -> f64;
}

impl Scored for CanonicalResult {
    fn score(&self) -> f64 {
        self.score
    }
}

impl Scored for f64 {
    fn score(&self) -> f64 {
        *self
    }
}

/// Stable descending sort; equal scores keep their arrival order.
pub fn sort_by_score_desc<T: Scored>(items: &mut [T]) {
    items.sort_by(|left, right| right.score().total_cmp(&left.score()));
}

/// Mean and population standard deviation of the scores.
pub fn score_spread<T: Scored>(items: &[T]) -> (f64, f64) {
    if items.is_empty() {
        return (0.0, 0.0);
    }
    let count = items.len() as f64;
    let mean = items.iter().map(Scored::score).sum::<f64>() / count;
    let variance = items
        .iter()
        .map(|item| {
            let delta = item.score() - mean;
            delta * delta
        })
        .sum::<f64>()
        / count;
    (mean, variance.sqrt())
}

/// Truncates a descending-sorted list at its first score cliff.
///
/// Lists of two or fewer items are returned untouched. If nothing survives,
/// the first `fallback_len` items of the input are returned instead.
pub fn apply_cutoff<T: Scored>(mut items: Vec<T>, fallback_len: usize) -> Vec<T> {
    if items.len() <= 2 {
        return items;
    }

    let (_, std_dev) = score_spread(&items);
    let mut kept = items.len();
    for index in 0..items.len() - 1 {
        let gap = (items[index].score() - items[index + 1].score()).abs();
        if gap > std_dev {
            kept = index + 1;
            break;
        }
    }

    if kept == 0 {
        items.truncate(fallback_len.min(items.len()));
        return items;
    }

    items.truncate(kept);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_lists_are_returned_unchanged() {
        assert!(apply_cutoff(Vec::<f64>::new(), 10).is_empty());
        assert_eq!(apply_cutoff(vec![0.9], 10), vec![0.9]);
        assert_eq!(apply_cutoff(vec![0.9, 0.01], 10), vec![0.9, 0.01]);
    }

    #[test]
    fn cuts_at_first_gap_above_std_dev() {
        let scores = vec![0.9, 0.85, 0.83, 0.40, 0.35];
        let (mean, std_dev) = score_spread(&scores);
        assert!((mean - 0.666).abs() < 1e-9);
        assert!((std_dev - 0.2392).abs() < 1e-3);
        assert_eq!(apply_cutoff(scores, 10), vec![0.9, 0.85, 0.83]);
    }

    #[test]
    fn equal_scores_are_all_kept() {
        let scores = vec![0.5, 0.5, 0.5, 0.5];
        assert_eq!(apply_cutoff(scores.clone(), 10), scores);
    }

    #[test]
    fn gradual_decline_keeps_the_last_element() {
        let scores = vec![0.9, 0.8, 0.7, 0.6, 0.5];
        assert_eq!(apply_cutoff(scores.clone(), 10), scores);
    }

    #[test]
    fn cliff_after_first_element_keeps_only_the_best() {
        assert_eq!(apply_cutoff(vec![1.0, 0.1, 0.05], 10), vec![1.0]);
    }

    #[test]
    fn sort_orders_descending_and_is_stable() {
        let mut scores = vec![0.2, 0.9, 0.5, 0.9];
        sort_by_score_desc(&mut scores);
        assert_eq!(scores, vec![0.9, 0.9, 0.5, 0.2]);
    }
}
