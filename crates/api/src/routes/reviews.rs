//! Product review route handlers.
//!
//! Reviews are loaded in full, sorted in memory and then sliced, so every
//! sort order pages consistently.

use axum::{Json, extract::State, http::StatusCode};
use electomart_core::domain::PageRequest;
use electomart_core::{ProductId, ReviewId, UserRole};
use serde::Serialize;
use tracing::instrument;

use crate::db::ReviewRepository;
use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::review::{
    CreateReview, LikeState, RatingSummary, ReviewPage, ReviewQuery, ReviewView,
};
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::products::not_found;
use crate::state::AppState;

/// Longest accepted review comment, in characters.
const MAX_COMMENT_LENGTH: usize = 2_000;

/// `GET /api/products/{id}/reviews`
#[instrument(skip(state, auth))]
pub async fn index(
    State(state): State<AppState>,
    auth: OptionalAuth,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiQuery(query): ApiQuery<ReviewQuery>,
) -> Result<Json<ReviewPage>> {
    let repo = ReviewRepository::new(state.pool());
    let summary = repo
        .summary(product_id)
        .await
        .map_err(not_found("Product not found"))?;

    let viewer = auth.0.map(|claims| claims.sub);
    let mut reviews = repo.list_for_product(product_id, viewer).await?;
    query.sort.apply(&mut reviews);
    let page = PageRequest::new(query.page, query.limit).slice(reviews);

    Ok(Json(ReviewPage {
        reviews: page.items,
        page: page.page,
        pages: page.pages,
        total: page.total,
        rating: summary.rating,
        num_reviews: summary.num_reviews,
    }))
}

/// Response of a review write.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCreated {
    pub review: ReviewView,
    #[serde(flatten)]
    pub summary: RatingSummary,
}

/// `POST /api/products/{id}/reviews`
#[instrument(skip(state, auth, body), fields(user_id = %auth.0.sub))]
pub async fn create(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiJson(body): ApiJson<CreateReview>,
) -> Result<(StatusCode, Json<ReviewCreated>)> {
    let comment = body.comment.trim();
    if comment.is_empty() {
        return Err(AppError::Validation("Comment is required".to_string()));
    }
    if comment.chars().count() > MAX_COMMENT_LENGTH {
        return Err(AppError::Validation(format!(
            "Comment must be at most {MAX_COMMENT_LENGTH} characters"
        )));
    }

    let (review, summary) = ReviewRepository::new(state.pool())
        .create(product_id, auth.0.sub, body.rating, comment)
        .await?;
    state.invalidate_product(product_id).await;

    tracing::info!(review_id = %review.id, "Review created");
    Ok((StatusCode::CREATED, Json(ReviewCreated { review, summary })))
}

/// `DELETE /api/products/{id}/reviews/{reviewId}` (author or admin)
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn destroy(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiPath((product_id, review_id)): ApiPath<(ProductId, ReviewId)>,
) -> Result<Json<RatingSummary>> {
    let claims = auth.0;
    let summary = ReviewRepository::new(state.pool())
        .delete(
            product_id,
            review_id,
            claims.sub,
            claims.role == UserRole::Admin,
        )
        .await?;
    state.invalidate_product(product_id).await;

    tracing::info!("Review deleted");
    Ok(Json(summary))
}

/// `POST /api/products/{id}/reviews/{reviewId}/like`
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn toggle_like(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiPath((product_id, review_id)): ApiPath<(ProductId, ReviewId)>,
) -> Result<Json<LikeState>> {
    let like = ReviewRepository::new(state.pool())
        .toggle_like(product_id, review_id, auth.0.sub)
        .await?;
    Ok(Json(like))
}
