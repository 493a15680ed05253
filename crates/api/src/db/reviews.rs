//! Review repository.
//!
//! Every write that changes the set of reviews recomputes the product's
//! `rating`/`num_reviews` in the same transaction, holding the product row
//! lock so concurrent writes serialize.

use electomart_core::domain::{Rating, average_rating};
use electomart_core::{ProductId, ReviewId, UserId};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;

use super::RepositoryError;
use crate::models::review::{LikeState, RatingSummary, ReviewRow, ReviewView};

/// Errors from review writes.
#[derive(Debug, Error)]
pub enum ReviewWriteError {
    #[error("product not found")]
    ProductNotFound,
    #[error("review not found")]
    ReviewNotFound,
    #[error("you have already reviewed this product")]
    AlreadyReviewed,
    #[error("only the author or an admin can delete this review")]
    NotAuthor,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for ReviewWriteError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

const REVIEW_SELECT: &str = r"
    SELECT r.id, r.user_id, u.name AS user_name, r.rating, r.comment, r.created_at,
           COUNT(l.user_id) AS likes,
           COALESCE(BOOL_OR(l.user_id = $2), FALSE) AS liked_by_me
    FROM review r
    JOIN app_user u ON u.id = r.user_id
    LEFT JOIN review_like l ON l.review_id = r.id
";

/// Repository for review database operations.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load every review of a product with like counts.
    ///
    /// `viewer` decides `likedByMe`. Ordering and paging happen in memory.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` for out-of-range ratings.
    pub async fn list_for_product(
        &self,
        product_id: ProductId,
        viewer: Option<UserId>,
    ) -> Result<Vec<ReviewView>, RepositoryError> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "{REVIEW_SELECT} WHERE r.product_id = $1 GROUP BY r.id, u.name"
        ))
        .bind(product_id)
        .bind(viewer)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(ReviewView::try_from).collect()
    }

    /// Current rating aggregate of a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn summary(&self, product_id: ProductId) -> Result<RatingSummary, RepositoryError> {
        sqlx::query_as::<_, (rust_decimal::Decimal, i32)>(
            "SELECT rating, num_reviews FROM product WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(self.pool)
        .await?
        .map(|(rating, num_reviews)| RatingSummary {
            rating,
            num_reviews,
        })
        .ok_or(RepositoryError::NotFound)
    }

    /// Add the caller's review and recompute the product rating.
    ///
    /// # Errors
    ///
    /// Returns `ReviewWriteError::AlreadyReviewed` if the user already
    /// reviewed this product, `ProductNotFound` if it does not exist.
    pub async fn create(
        &self,
        product_id: ProductId,
        user_id: UserId,
        rating: Rating,
        comment: &str,
    ) -> Result<(ReviewView, RatingSummary), ReviewWriteError> {
        let mut tx = self.pool.begin().await?;
        lock_product(&mut tx, product_id).await?;

        let review_id: ReviewId = sqlx::query_scalar(
            r"
            INSERT INTO review (product_id, user_id, rating, comment)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id, user_id) DO NOTHING
            RETURNING id
            ",
        )
        .bind(product_id)
        .bind(user_id)
        .bind(i16::from(rating))
        .bind(comment)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ReviewWriteError::AlreadyReviewed)?;

        let summary = recompute_rating(&mut tx, product_id).await?;

        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "{REVIEW_SELECT} WHERE r.id = $1 GROUP BY r.id, u.name"
        ))
        .bind(review_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((ReviewView::try_from(row)?, summary))
    }

    /// Delete a review as its author (or any review as an admin).
    ///
    /// # Errors
    ///
    /// Returns `ReviewWriteError::ReviewNotFound` if the review is not on
    /// this product, `NotAuthor` if the caller may not delete it.
    pub async fn delete(
        &self,
        product_id: ProductId,
        review_id: ReviewId,
        actor: UserId,
        is_admin: bool,
    ) -> Result<RatingSummary, ReviewWriteError> {
        let mut tx = self.pool.begin().await?;
        lock_product(&mut tx, product_id).await?;

        let author: UserId =
            sqlx::query_scalar("SELECT user_id FROM review WHERE id = $1 AND product_id = $2")
                .bind(review_id)
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(ReviewWriteError::ReviewNotFound)?;
        if author != actor && !is_admin {
            return Err(ReviewWriteError::NotAuthor);
        }

        sqlx::query("DELETE FROM review WHERE id = $1")
            .bind(review_id)
            .execute(&mut *tx)
            .await?;

        let summary = recompute_rating(&mut tx, product_id).await?;
        tx.commit().await?;
        Ok(summary)
    }

    /// Toggle the caller's like on a review.
    ///
    /// # Errors
    ///
    /// Returns `ReviewWriteError::ReviewNotFound` if the review is not on this product.
    pub async fn toggle_like(
        &self,
        product_id: ProductId,
        review_id: ReviewId,
        user_id: UserId,
    ) -> Result<LikeState, ReviewWriteError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, ReviewId>(
            "SELECT id FROM review WHERE id = $1 AND product_id = $2 FOR UPDATE",
        )
        .bind(review_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ReviewWriteError::ReviewNotFound)?;

        let removed = sqlx::query("DELETE FROM review_like WHERE review_id = $1 AND user_id = $2")
            .bind(review_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let liked = if removed == 0 {
            sqlx::query("INSERT INTO review_like (review_id, user_id) VALUES ($1, $2)")
                .bind(review_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            true
        } else {
            false
        };

        let likes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review_like WHERE review_id = $1")
            .bind(review_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(LikeState { liked, likes })
    }
}

async fn lock_product(
    conn: &mut PgConnection,
    product_id: ProductId,
) -> Result<(), ReviewWriteError> {
    sqlx::query_scalar::<_, ProductId>("SELECT id FROM product WHERE id = $1 FOR UPDATE")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ReviewWriteError::ProductNotFound)?;
    Ok(())
}

/// Recompute `rating` and `num_reviews` from the stored reviews.
async fn recompute_rating(
    conn: &mut PgConnection,
    product_id: ProductId,
) -> Result<RatingSummary, RepositoryError> {
    let stars: Vec<i16> = sqlx::query_scalar("SELECT rating FROM review WHERE product_id = $1")
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

    let ratings = stars
        .into_iter()
        .map(Rating::new)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RepositoryError::DataCorruption(format!("product {product_id}: {e}")))?;
    let summary = RatingSummary {
        rating: average_rating(&ratings),
        num_reviews: i32::try_from(ratings.len()).unwrap_or(i32::MAX),
    };

    sqlx::query("UPDATE product SET rating = $2, num_reviews = $3 WHERE id = $1")
        .bind(product_id)
        .bind(summary.rating)
        .bind(summary.num_reviews)
        .execute(&mut *conn)
        .await?;

    Ok(summary)
}
