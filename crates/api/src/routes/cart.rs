//! Cart route handlers. All require authentication.

use axum::{Json, extract::State};
use electomart_core::ProductId;
use tracing::instrument;

use crate::db::CartRepository;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::cart::{AddToCart, CartView, SetQuantity};
use crate::routes::extract::{ApiJson, ApiPath};
use crate::state::AppState;

/// `GET /api/cart`
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn show(State(state): State<AppState>, auth: RequireAuth) -> Result<Json<CartView>> {
    let cart = CartRepository::new(state.pool()).get(auth.0.sub).await?;
    Ok(Json(cart))
}

/// `POST /api/cart`
///
/// Adding a product already in the cart increases that line's quantity.
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn add(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiJson(body): ApiJson<AddToCart>,
) -> Result<Json<CartView>> {
    let cart = CartRepository::new(state.pool())
        .add(auth.0.sub, body.product_id, body.quantity)
        .await?;
    Ok(Json(cart))
}

/// `PUT /api/cart/{productId}`; a quantity of 0 removes the line.
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn update(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiJson(body): ApiJson<SetQuantity>,
) -> Result<Json<CartView>> {
    let cart = CartRepository::new(state.pool())
        .set_quantity(auth.0.sub, product_id, body.quantity)
        .await?;
    Ok(Json(cart))
}

/// `DELETE /api/cart/{productId}`
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn remove(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiPath(product_id): ApiPath<ProductId>,
) -> Result<Json<CartView>> {
    let cart = CartRepository::new(state.pool())
        .remove(auth.0.sub, product_id)
        .await?;
    Ok(Json(cart))
}

/// `DELETE /api/cart`
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn clear(State(state): State<AppState>, auth: RequireAuth) -> Result<Json<CartView>> {
    let cart = CartRepository::new(state.pool()).clear(auth.0.sub).await?;
    Ok(Json(cart))
}
