//! Product reviews and likes.

use chrono::{DateTime, Utc};
use electomart_core::domain::{Rating, ReviewSort, SortableReview};
use electomart_core::{ReviewId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::RepositoryError;

/// A review joined with its author and like aggregates.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReviewRow {
    pub id: ReviewId,
    pub user_id: UserId,
    pub user_name: String,
    pub rating: i16,
    pub comment: String,
    pub likes: i64,
    pub liked_by_me: bool,
    pub created_at: DateTime<Utc>,
}

/// Review author as shown next to a review.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewAuthor {
    pub id: UserId,
    pub name: String,
}

/// A review as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: ReviewId,
    pub user: ReviewAuthor,
    pub rating: Rating,
    pub comment: String,
    pub likes: i64,
    pub liked_by_me: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for ReviewView {
    type Error = RepositoryError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let rating = Rating::new(row.rating).map_err(|e| {
            RepositoryError::DataCorruption(format!("review {} rating: {e}", row.id))
        })?;
        Ok(Self {
            id: row.id,
            user: ReviewAuthor {
                id: row.user_id,
                name: row.user_name,
            },
            rating,
            comment: row.comment,
            likes: row.likes,
            liked_by_me: row.liked_by_me,
            created_at: row.created_at,
        })
    }
}

impl SortableReview for ReviewView {
    fn rating(&self) -> Rating {
        self.rating
    }

    fn like_count(&self) -> usize {
        usize::try_from(self.likes).unwrap_or(0)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Body of `POST /api/products/{id}/reviews`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReview {
    pub rating: Rating,
    pub comment: String,
}

/// Query string of `GET /api/products/{id}/reviews`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub sort: ReviewSort,
}

/// Response of `GET /api/products/{id}/reviews`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPage {
    pub reviews: Vec<ReviewView>,
    pub page: u32,
    pub pages: u64,
    pub total: u64,
    pub rating: Decimal,
    pub num_reviews: i32,
}

/// Response of the like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeState {
    pub liked: bool,
    pub likes: i64,
}

/// Rating aggregate after a review write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub rating: Decimal,
    pub num_reviews: i32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(rating: i16) -> ReviewRow {
        ReviewRow {
            id: ReviewId::new(3),
            user_id: UserId::new(7),
            user_name: "Sita".to_owned(),
            rating,
            comment: "Great battery".to_owned(),
            likes: 2,
            liked_by_me: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_view_from_row() {
        let view = ReviewView::try_from(row(4)).unwrap();
        assert_eq!(view.rating.stars(), 4);
        assert_eq!(view.like_count(), 2);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["likedByMe"], true);
        assert_eq!(json["user"]["name"], "Sita");
        assert_eq!(json["rating"], 4);
    }

    #[test]
    fn test_view_rejects_corrupt_rating() {
        assert!(matches!(
            ReviewView::try_from(row(9)),
            Err(RepositoryError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_create_review_rejects_out_of_range_rating() {
        let result: Result<CreateReview, _> =
            serde_json::from_str(r#"{"rating": 6, "comment": "too good"}"#);
        assert!(result.is_err());
    }
}
