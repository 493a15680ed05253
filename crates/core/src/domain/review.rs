//! Review rating aggregation and in-memory ordering.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Error for out-of-range star ratings.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rating must be between {min} and {max}", min = Rating::MIN, max = Rating::MAX)]
pub struct RatingError;

/// A 1-5 star rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Validate a star rating.
    ///
    /// # Errors
    ///
    /// Returns `RatingError` outside `1..=5`.
    pub fn new(stars: i16) -> Result<Self, RatingError> {
        u8::try_from(stars)
            .ok()
            .filter(|s| (Self::MIN..=Self::MAX).contains(s))
            .map(Self)
            .ok_or(RatingError)
    }

    /// Number of stars.
    #[must_use]
    pub const fn stars(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i16> for Rating {
    type Error = RatingError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for i16 {
    fn from(value: Rating) -> Self {
        Self::from(value.0)
    }
}

/// Arithmetic mean of all ratings, rounded to two places; zero when empty.
#[must_use]
pub fn average_rating(ratings: &[Rating]) -> Decimal {
    if ratings.is_empty() {
        return Decimal::ZERO;
    }
    let sum: u32 = ratings.iter().map(|r| u32::from(r.stars())).sum();
    let count = u32::try_from(ratings.len()).unwrap_or(u32::MAX);
    (Decimal::from(sum) / Decimal::from(count))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Review list ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewSort {
    #[default]
    Newest,
    Oldest,
    Highest,
    Lowest,
    MostLiked,
}

/// Anything that can be ordered as a review.
pub trait SortableReview {
    fn rating(&self) -> Rating;
    fn like_count(&self) -> usize;
    fn created_at(&self) -> DateTime<Utc>;
}

impl ReviewSort {
    /// Sort reviews in place. Ties fall back to newest first.
    pub fn apply<T: SortableReview>(self, reviews: &mut [T]) {
        reviews.sort_by(|a, b| {
            let newest = b.created_at().cmp(&a.created_at());
            match self {
                Self::Newest => newest,
                Self::Oldest => a.created_at().cmp(&b.created_at()),
                Self::Highest => b.rating().cmp(&a.rating()).then(newest),
                Self::Lowest => a.rating().cmp(&b.rating()).then(newest),
                Self::MostLiked => b.like_count().cmp(&a.like_count()).then(newest),
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use chrono::TimeZone;

    use super::*;

    struct R {
        id: u8,
        stars: i16,
        likes: usize,
        day: u32,
    }

    impl SortableReview for R {
        fn rating(&self) -> Rating {
            Rating::new(self.stars).unwrap()
        }
        fn like_count(&self) -> usize {
            self.likes
        }
        fn created_at(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2025, 1, self.day, 0, 0, 0).unwrap()
        }
    }

    fn sample() -> Vec<R> {
        vec![
            R { id: 1, stars: 3, likes: 0, day: 1 },
            R { id: 2, stars: 5, likes: 4, day: 2 },
            R { id: 3, stars: 1, likes: 4, day: 3 },
        ]
    }

    fn ids(reviews: &[R]) -> Vec<u8> {
        reviews.iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert!(Rating::new(-1).is_err());
        assert_eq!(Rating::new(5).unwrap().stars(), 5);
        assert!(serde_json::from_str::<Rating>("7").is_err());
    }

    #[test]
    fn test_average_rating() {
        let ratings: Vec<Rating> = [5, 4, 4].into_iter().map(|s| Rating::new(s).unwrap()).collect();
        assert_eq!(average_rating(&ratings), Decimal::from_str("4.33").unwrap());
        assert_eq!(average_rating(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_sort_orders() {
        let mut reviews = sample();
        ReviewSort::Newest.apply(&mut reviews);
        assert_eq!(ids(&reviews), [3, 2, 1]);

        ReviewSort::Oldest.apply(&mut reviews);
        assert_eq!(ids(&reviews), [1, 2, 3]);

        ReviewSort::Highest.apply(&mut reviews);
        assert_eq!(ids(&reviews), [2, 1, 3]);

        ReviewSort::Lowest.apply(&mut reviews);
        assert_eq!(ids(&reviews), [3, 1, 2]);

        // Equal likes: newer first
        ReviewSort::MostLiked.apply(&mut reviews);
        assert_eq!(ids(&reviews), [3, 2, 1]);
    }
}
