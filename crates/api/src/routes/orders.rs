//! Order route handlers.

use axum::{Json, extract::State, http::StatusCode};
use electomart_core::domain::PageRequest;
use electomart_core::{OrderId, UserId, UserRole};
use tracing::instrument;

use crate::db::{OrderRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::order::{CreateOrder, Order, OrderPage, OrderQuery, OrderStats, UpdateOrderStatus};
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

/// `POST /api/orders`
///
/// Builds the order from the caller's cart and empties the cart.
#[instrument(skip(state, auth, body), fields(user_id = %auth.0.sub, payment = ?body.payment_method))]
pub async fn create(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiJson(body): ApiJson<CreateOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let address = body.shipping_address.normalized()?;
    let order = OrderRepository::new(state.pool())
        .create_from_cart(
            auth.0.sub,
            &address,
            body.payment_method,
            &state.config().pricing,
        )
        .await?;

    invalidate_items(&state, &order).await;
    tracing::info!(order_id = %order.id, total = %order.totals.total_price, "Order placed");

    send_confirmation(state.clone(), auth.0.sub, order.clone());
    Ok((StatusCode::CREATED, Json(order)))
}

/// Stock changed for every product on the order.
pub(crate) async fn invalidate_items(state: &AppState, order: &Order) {
    for product_id in order.items.iter().filter_map(|item| item.product_id) {
        state.invalidate_product(product_id).await;
    }
}

/// Email the order summary in the background; failures are only logged.
fn send_confirmation(state: AppState, user_id: UserId, order: Order) {
    if state.email().is_none() {
        return;
    }
    tokio::spawn(async move {
        let Some(email) = state.email() else { return };
        let user = match UserRepository::new(state.pool()).get_by_id(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load user for order confirmation");
                return;
            }
        };
        let order_url = format!("{}/orders/{}", state.config().client_url, order.id);
        if let Err(e) = email
            .send_order_confirmation(user.email.as_str(), &user.name, &order, &order_url)
            .await
        {
            tracing::warn!(order_id = %order.id, error = %e, "Order confirmation email failed");
        }
    });
}

/// `GET /api/orders/mine`
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn mine(State(state): State<AppState>, auth: RequireAuth) -> Result<Json<Vec<Order>>> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(auth.0.sub)
        .await?;
    Ok(Json(orders))
}

/// `GET /api/orders/{id}` (owner or admin)
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn show(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>> {
    let order = OrderRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    if order.user_id != Some(auth.0.sub) && auth.0.role != UserRole::Admin {
        return Err(AppError::Forbidden(
            "Not allowed to view this order".to_string(),
        ));
    }
    Ok(Json(order))
}

/// `PUT /api/orders/{id}/cancel` (owner, unpaid and still processing)
///
/// Gateway orders with a started payment are only cancellable once the
/// gateway reports that payment expired or abandoned.
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn cancel(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>> {
    let repo = OrderRepository::new(state.pool());
    if let Some(row) = repo.get_row(id).await?
        && row.is_owned_by(auth.0.sub)
        && row.payment_method.uses_gateway()
        && !row.is_paid
        && let Some(pidx) = row.payment_ref.as_deref()
    {
        // A started payment may still complete at the gateway
        let lookup = state.khalti()?.lookup(pidx).await?;
        if !lookup.is_abandoned() {
            return Err(AppError::BadRequest(format!(
                "A Khalti payment for this order is still open (status: {}); \
                 verify it or wait for it to expire before cancelling",
                lookup.status
            )));
        }
    }

    let order = repo.cancel_by_customer(id, auth.0.sub).await?;
    invalidate_items(&state, &order).await;

    tracing::info!("Order cancelled by customer");
    Ok(Json(order))
}

/// `GET /api/orders` (admin)
#[instrument(skip(state, _admin))]
pub async fn index(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(query): ApiQuery<OrderQuery>,
) -> Result<Json<OrderPage>> {
    let page = PageRequest::new(query.page, query.limit);
    let (orders, total) = OrderRepository::new(state.pool())
        .list(query.status, page)
        .await?;

    Ok(Json(OrderPage {
        orders,
        page: page.page(),
        pages: page.pages(total),
        total,
    }))
}

/// `GET /api/orders/stats` (admin)
#[instrument(skip(state, _admin))]
pub async fn stats(State(state): State<AppState>, _admin: RequireAdmin) -> Result<Json<OrderStats>> {
    let stats = OrderRepository::new(state.pool()).stats().await?;
    Ok(Json(stats))
}

/// `PUT /api/orders/{id}/status` (admin)
///
/// Any status may follow any other; `delivered` stamps `deliveredAt`.
#[instrument(skip(state, admin), fields(admin_id = %admin.0.sub))]
pub async fn update_status(
    State(state): State<AppState>,
    admin: RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(body): ApiJson<UpdateOrderStatus>,
) -> Result<Json<Order>> {
    let order = OrderRepository::new(state.pool())
        .update_status(id, body.status)
        .await?;

    tracing::info!(status = %order.order_status, "Order status updated");
    Ok(Json(order))
}

/// `PUT /api/orders/{id}/pay` (admin, cash on delivery collected)
#[instrument(skip(state, admin), fields(admin_id = %admin.0.sub))]
pub async fn mark_paid(
    State(state): State<AppState>,
    admin: RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>> {
    let order = OrderRepository::new(state.pool()).mark_paid(id).await?;

    tracing::info!("Order marked paid");
    Ok(Json(order))
}
