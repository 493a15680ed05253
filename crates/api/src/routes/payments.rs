//! Khalti payment route handlers.
//!
//! # Flow
//!
//! 1. Client places a `khalti` order, then calls `initiate`
//! 2. We register the payment with Khalti and store the returned `pidx`
//! 3. Client redirects the shopper to `paymentUrl`
//! 4. Khalti redirects back to the client, which calls `verify`
//! 5. We look the payment up server-side and, if it settled for the full
//!    amount, mark the order paid and take the stock in one transaction

use axum::{Json, extract::State};
use electomart_core::{OrderId, OrderStatus, PaymentMethod, UserRole};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::{OrderRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::order::{Order, OrderRow};
use crate::routes::extract::ApiJson;
use crate::routes::orders::invalidate_items;
use crate::services::auth::Claims;
use crate::services::khalti::{CustomerInfo, InitiateRequest};
use crate::state::AppState;

/// Body of `POST /api/payments/khalti/initiate`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePayment {
    pub order_id: OrderId,
}

/// Response of `POST /api/payments/khalti/initiate`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub pidx: String,
    pub payment_url: String,
    pub expires_at: String,
}

/// Body of `POST /api/payments/khalti/verify`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPayment {
    pub pidx: String,
    pub order_id: OrderId,
}

/// Response of `POST /api/payments/khalti/verify`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerified {
    pub message: &'static str,
    pub order: Order,
}

/// Load an order the caller may pay for.
async fn owned_order(state: &AppState, claims: &Claims, id: OrderId) -> Result<OrderRow> {
    let order = OrderRepository::new(state.pool())
        .get_row(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    if !order.is_owned_by(claims.sub) && claims.role != UserRole::Admin {
        return Err(AppError::Forbidden(
            "Not allowed to pay for this order".to_string(),
        ));
    }
    if order.payment_method != PaymentMethod::Khalti {
        return Err(AppError::BadRequest(
            "Order is not a Khalti order".to_string(),
        ));
    }
    if order.order_status == OrderStatus::Cancelled {
        return Err(AppError::BadRequest("Order is cancelled".to_string()));
    }
    Ok(order)
}

fn total_in_paisa(order: &OrderRow) -> Result<i64> {
    order
        .total_price
        .to_paisa()
        .map_err(|e| AppError::Internal(format!("order {} total: {e}", order.id)))
}

/// `POST /api/payments/khalti/initiate`
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn initiate(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiJson(body): ApiJson<InitiatePayment>,
) -> Result<Json<PaymentSession>> {
    let khalti = state.khalti()?;
    let order = owned_order(&state, &auth.0, body.order_id).await?;
    if order.is_paid {
        return Err(AppError::BadRequest("Order is already paid".to_string()));
    }

    let user = UserRepository::new(state.pool())
        .get_by_id(auth.0.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let client_url = &state.config().client_url;
    let request = InitiateRequest {
        return_url: format!("{client_url}/orders/{}/payment", order.id),
        website_url: client_url.clone(),
        amount: total_in_paisa(&order)?,
        purchase_order_id: order.id.to_string(),
        purchase_order_name: format!("Electomart order #{}", order.id),
        customer_info: CustomerInfo {
            name: user.name,
            email: user.email.as_str().to_owned(),
            phone: user.phone.or_else(|| Some(order.ship_phone.clone())),
        },
    };

    let response = khalti.initiate(&request).await?;
    OrderRepository::new(state.pool())
        .set_payment_ref(order.id, &response.pidx)
        .await?;

    tracing::info!(order_id = %order.id, pidx = %response.pidx, "Khalti payment initiated");
    Ok(Json(PaymentSession {
        pidx: response.pidx,
        payment_url: response.payment_url,
        expires_at: response.expires_at,
    }))
}

/// `POST /api/payments/khalti/verify`
///
/// Safe to call more than once; an order already paid with this `pidx` is
/// returned as-is.
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn verify(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiJson(body): ApiJson<VerifyPayment>,
) -> Result<Json<PaymentVerified>> {
    let pidx = body.pidx.trim();
    if pidx.is_empty() {
        return Err(AppError::Validation("pidx is required".to_string()));
    }

    let order = owned_order(&state, &auth.0, body.order_id).await?;
    let repo = OrderRepository::new(state.pool());

    if order.is_paid && order.payment_ref.as_deref() == Some(pidx) {
        let order = repo
            .get(order.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
        return Ok(Json(PaymentVerified {
            message: "Payment already verified",
            order,
        }));
    }

    let lookup = state.khalti()?.lookup(pidx).await?;
    let expected = total_in_paisa(&order)?;
    if lookup.pidx != pidx || !lookup.settles(expected) {
        tracing::warn!(
            order_id = %order.id,
            status = %lookup.status,
            paid = lookup.total_amount,
            expected,
            "Khalti payment not settled"
        );
        return Err(AppError::BadRequest(format!(
            "Payment not completed (status: {})",
            lookup.status
        )));
    }

    let (order, newly_paid) = repo.confirm_payment(order.id, pidx).await?;
    if newly_paid {
        invalidate_items(&state, &order).await;
        tracing::info!(
            order_id = %order.id,
            transaction_id = lookup.transaction_id.as_deref().unwrap_or_default(),
            "Khalti payment verified"
        );
    }

    Ok(Json(PaymentVerified {
        message: "Payment verified",
        order,
    }))
}
