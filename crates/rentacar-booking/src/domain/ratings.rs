use crate::domain::types::Rating;
use serde::{Deserialize, Serialize};

/// Running mean of a vehicle's customer ratings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub mean: f64,
    pub count: u32,
}

impl RatingSummary {
    pub fn unrated() -> Self {
        Self {
            mean: 0.0,
            count: 0,
        }
    }

    pub fn is_rated(&self) -> bool {
        self.count > 0
    }
}

impl Default for RatingSummary {
    fn default() -> Self {
        Self::unrated()
    }
}

/// Folds one rating at a time into a [`RatingSummary`] without the history.
pub struct RatingAggregator;

impl RatingAggregator {
    pub fn apply(summary: RatingSummary, rating: Rating) -> RatingSummary {
        let old_count = summary.count as f64;
        let mean = (summary.mean * old_count + rating.value() as f64) / (old_count + 1.0);
        RatingSummary {
            mean,
            count: summary.count + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(value: i64) -> Rating {
        Rating::new(value).unwrap()
    }

    #[test]
    fn test_five_top_ratings_from_unrated() {
        let summary = (0..5).fold(RatingSummary::unrated(), |acc, _| {
            RatingAggregator::apply(acc, rating(5))
        });

        assert_eq!(summary.count, 5);
        assert!((summary.mean - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_running_mean_matches_full_average() {
        let values = [4, 2, 5, 3, 1, 5];
        let summary = values.iter().fold(RatingSummary::unrated(), |acc, v| {
            RatingAggregator::apply(acc, rating(*v))
        });

        let expected = values.iter().sum::<i64>() as f64 / values.len() as f64;
        assert_eq!(summary.count, values.len() as u32);
        assert!((summary.mean - expected).abs() < 1e-9);
        assert!((1.0..=5.0).contains(&summary.mean));
    }

    #[test]
    fn test_first_rating_becomes_mean() {
        let summary = RatingAggregator::apply(RatingSummary::unrated(), rating(3));
        assert!(summary.is_rated());
        assert_eq!(summary.mean, 3.0);
    }
}
