//! Wishlist route handlers. All require authentication.

use axum::{Json, extract::State};
use electomart_core::ProductId;
use serde::Serialize;
use tracing::instrument;

use crate::db::WishlistRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::cart::{WishlistAdd, WishlistMerge};
use crate::models::product::Product;
use crate::routes::extract::{ApiJson, ApiPath};
use crate::routes::products::not_found;
use crate::state::AppState;

/// Most ids accepted in one merge.
const MAX_MERGE_IDS: usize = 200;

/// `GET /api/wishlist`
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn show(State(state): State<AppState>, auth: RequireAuth) -> Result<Json<Vec<Product>>> {
    let products = WishlistRepository::new(state.pool())
        .list(auth.0.sub)
        .await?;
    Ok(Json(products))
}

/// `POST /api/wishlist`; adding a product twice is a no-op.
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn add(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiJson(body): ApiJson<WishlistAdd>,
) -> Result<Json<Vec<Product>>> {
    let repo = WishlistRepository::new(state.pool());
    repo.add(auth.0.sub, body.product_id)
        .await
        .map_err(not_found("Product not found"))?;
    Ok(Json(repo.list(auth.0.sub).await?))
}

/// `DELETE /api/wishlist/{productId}`
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn remove(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiPath(product_id): ApiPath<ProductId>,
) -> Result<Json<Vec<Product>>> {
    let repo = WishlistRepository::new(state.pool());
    repo.remove(auth.0.sub, product_id)
        .await
        .map_err(not_found("Product is not in the wishlist"))?;
    Ok(Json(repo.list(auth.0.sub).await?))
}

/// Result of a wishlist merge.
#[derive(Debug, Serialize)]
pub struct Merged {
    pub added: u64,
    pub products: Vec<Product>,
}

/// `POST /api/wishlist/merge`
///
/// Folds a wishlist kept client-side before login into the account. Unknown
/// products are skipped.
#[instrument(skip(state, auth, body), fields(user_id = %auth.0.sub, count = body.product_ids.len()))]
pub async fn merge(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiJson(body): ApiJson<WishlistMerge>,
) -> Result<Json<Merged>> {
    if body.product_ids.len() > MAX_MERGE_IDS {
        return Err(AppError::Validation(format!(
            "At most {MAX_MERGE_IDS} products per merge"
        )));
    }

    let repo = WishlistRepository::new(state.pool());
    let added = repo.merge(auth.0.sub, &body.product_ids).await?;
    let products = repo.list(auth.0.sub).await?;
    Ok(Json(Merged { added, products }))
}
