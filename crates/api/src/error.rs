//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error body has the shape `{message, code, timestamp, path, method}`.
//! `AppError` fills in the first three and stashes an [`ErrorInfo`] in the
//! response extensions; [`crate::middleware::error_envelope_middleware`]
//! adds the request path and method.

use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use electomart_core::domain::{AddressError, CartError};
use serde::Serialize;
use thiserror::Error;

use crate::db::{
    CartWriteError, OrderWriteError, ProductWriteError, RepositoryError, ReviewWriteError,
};
use crate::models::product::ProductInputError;
use crate::services::auth::AuthError;
use crate::services::khalti::KhaltiError;
use crate::services::media::MediaError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Payment gateway call failed.
    #[error("Payment gateway error: {0}")]
    Payment(#[from] KhaltiError),

    /// Media CDN call failed.
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request body, path or query failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request conflicts with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Multipart upload was malformed.
    #[error("Upload error: {0}")]
    Upload(String),

    /// An optional integration is not configured.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(&'static str),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable error details left in response extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub message: String,
    pub code: &'static str,
}

/// The JSON error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub message: &'a str,
    pub code: &'a str,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<&'a str>,
}

impl ErrorBody<'_> {
    /// Current time in RFC 3339 with millisecond precision.
    #[must_use]
    pub fn now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Default code for a status produced outside `AppError` (405, 413, 429...).
#[must_use]
pub const fn code_for_status(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "BAD_REQUEST",
        401 => "UNAUTHORIZED",
        403 => "FORBIDDEN",
        404 => "NOT_FOUND",
        405 => "METHOD_NOT_ALLOWED",
        409 => "CONFLICT",
        413 => "PAYLOAD_TOO_LARGE",
        415 | 422 => "VALIDATION_ERROR",
        429 => "RATE_LIMITED",
        502 => "BAD_GATEWAY",
        503 => "SERVICE_UNAVAILABLE",
        400..=499 => "BAD_REQUEST",
        _ => "INTERNAL_ERROR",
    }
}

const INTERNAL: (StatusCode, &str) = (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR");

impl AppError {
    /// Status and code, without side effects.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_)
                | AuthError::InvalidName
                | AuthError::WeakPassword(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
                AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
                AuthError::InvalidToken | AuthError::InvalidRefreshToken => {
                    (StatusCode::UNAUTHORIZED, "INVALID_TOKEN")
                }
                AuthError::InvalidResetToken => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
                AuthError::UserNotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                AuthError::UserAlreadyExists => (StatusCode::CONFLICT, "CONFLICT"),
                AuthError::Repository(err) => repository_status(err),
                AuthError::PasswordHash | AuthError::TokenSigning(_) => INTERNAL,
            },
            Self::Payment(_) => (StatusCode::BAD_GATEWAY, "PAYMENT_GATEWAY_ERROR"),
            Self::Media(_) => (StatusCode::BAD_GATEWAY, "MEDIA_SERVICE_ERROR"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Upload(_) => (StatusCode::BAD_REQUEST, "UPLOAD_ERROR"),
            Self::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            Self::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Self::Internal(_) => INTERNAL,
        }
    }

    /// Client-facing message. Internal details are never exposed.
    fn client_message(&self) -> String {
        match self {
            Self::Database(err) | Self::Auth(AuthError::Repository(err)) => {
                repository_message(err)
            }
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid email or password".to_string(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) => capitalize(msg),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::TokenExpired => "Access token expired".to_string(),
                AuthError::InvalidToken => "Invalid access token".to_string(),
                AuthError::InvalidRefreshToken => "Invalid or expired refresh token".to_string(),
                AuthError::PasswordHash | AuthError::TokenSigning(_) => {
                    "Internal server error".to_string()
                }
                other => capitalize(&other.to_string()),
            },
            Self::Payment(_) => "Payment gateway error".to_string(),
            Self::Media(_) => "Image service error".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            Self::RateLimited => "Too many requests, please slow down".to_string(),
            Self::ServiceUnavailable(what) => format!("{what} is not configured"),
            Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Validation(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::Conflict(msg)
            | Self::Upload(msg) => msg.clone(),
        }
    }
}

fn repository_status(err: &RepositoryError) -> (StatusCode, &'static str) {
    match err {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        RepositoryError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => INTERNAL,
    }
}

fn repository_message(err: &RepositoryError) -> String {
    match err {
        RepositoryError::NotFound => "Resource not found".to_string(),
        RepositoryError::Conflict(msg) => capitalize(msg),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            "Internal server error".to_string()
        }
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, code, "Request rejected");
        }

        let message = self.client_message();
        let body = ErrorBody {
            message: &message,
            code,
            timestamp: ErrorBody::now(),
            path: None,
            method: None,
        };

        let mut response = (status, Json(body)).into_response();
        response
            .extensions_mut()
            .insert(ErrorInfo { message, code });
        response
    }
}

// =============================================================================
// Conversions from domain and extractor errors
// =============================================================================

impl From<CartWriteError> for AppError {
    fn from(err: CartWriteError) -> Self {
        match err {
            CartWriteError::ProductNotFound => Self::NotFound("Product not found".to_string()),
            CartWriteError::Cart(e @ CartError::NotInCart(_)) => {
                Self::NotFound(capitalize(&e.to_string()))
            }
            CartWriteError::Cart(e) => Self::BadRequest(capitalize(&e.to_string())),
            CartWriteError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<ReviewWriteError> for AppError {
    fn from(err: ReviewWriteError) -> Self {
        match err {
            ReviewWriteError::ProductNotFound => Self::NotFound("Product not found".to_string()),
            ReviewWriteError::ReviewNotFound => Self::NotFound("Review not found".to_string()),
            ReviewWriteError::AlreadyReviewed => {
                Self::BadRequest("You have already reviewed this product".to_string())
            }
            ReviewWriteError::NotAuthor => Self::Forbidden(capitalize(&err.to_string())),
            ReviewWriteError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<OrderWriteError> for AppError {
    fn from(err: OrderWriteError) -> Self {
        match err {
            OrderWriteError::NotFound => Self::NotFound("Order not found".to_string()),
            OrderWriteError::NotOwner => Self::Forbidden(capitalize(&err.to_string())),
            OrderWriteError::Repository(e) => Self::Database(e),
            OrderWriteError::EmptyCart
            | OrderWriteError::InsufficientStock { .. }
            | OrderWriteError::NotPayable(_)
            | OrderWriteError::NotCancellable => Self::BadRequest(capitalize(&err.to_string())),
        }
    }
}

impl From<ProductWriteError> for AppError {
    fn from(err: ProductWriteError) -> Self {
        match err {
            ProductWriteError::NotFound => Self::NotFound("Product not found".to_string()),
            ProductWriteError::Invalid(e) => e.into(),
            ProductWriteError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<ProductInputError> for AppError {
    fn from(err: ProductInputError) -> Self {
        Self::Validation(capitalize(&err.to_string()))
    }
}

impl From<AddressError> for AppError {
    fn from(err: AddressError) -> Self {
        Self::Validation(format!("Shipping address: {err}"))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Upload(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::Upload(err.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use electomart_core::ProductId;

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    async fn body_json(err: AppError) -> serde_json::Value {
        let response = err.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::ServiceUnavailable("Khalti")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::Conflict("dup".to_string()))),
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let body = body_json(AppError::Validation("rating must be between 1 and 5".into())).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["message"], "rating must be between 1 and 5");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
        // Filled in later by the envelope middleware
        assert!(body.get("path").is_none());
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let body = body_json(AppError::Database(RepositoryError::DataCorruption(
            "secret detail".to_string(),
        )))
        .await;
        assert_eq!(body["message"], "Internal server error");
        assert_eq!(body["code"], "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn test_token_error_codes() {
        let body = body_json(AuthError::TokenExpired.into()).await;
        assert_eq!(body["code"], "TOKEN_EXPIRED");
        let body = body_json(AuthError::InvalidToken.into()).await;
        assert_eq!(body["code"], "INVALID_TOKEN");
    }

    #[test]
    fn test_response_carries_error_info() {
        let response = AppError::Conflict("taken".to_string()).into_response();
        let info = response.extensions().get::<ErrorInfo>().unwrap();
        assert_eq!(info.code, "CONFLICT");
        assert_eq!(info.message, "taken");
    }

    #[test]
    fn test_domain_error_mapping() {
        let err: AppError = ReviewWriteError::AlreadyReviewed.into();
        assert_eq!(get_status(err), StatusCode::BAD_REQUEST);

        let err: AppError = CartWriteError::Cart(CartError::InsufficientStock {
            available: 1,
            requested: 4,
        })
        .into();
        assert_eq!(get_status(err), StatusCode::BAD_REQUEST);

        let err: AppError = CartWriteError::Cart(CartError::NotInCart(ProductId::new(1))).into();
        assert_eq!(get_status(err), StatusCode::NOT_FOUND);

        let err: AppError = OrderWriteError::NotOwner.into();
        assert_eq!(get_status(err), StatusCode::FORBIDDEN);

        let err: AppError = OrderWriteError::EmptyCart.into();
        assert_eq!(get_status(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_code_for_status() {
        assert_eq!(code_for_status(StatusCode::METHOD_NOT_ALLOWED), "METHOD_NOT_ALLOWED");
        assert_eq!(code_for_status(StatusCode::TOO_MANY_REQUESTS), "RATE_LIMITED");
        assert_eq!(code_for_status(StatusCode::IM_A_TEAPOT), "BAD_REQUEST");
        assert_eq!(code_for_status(StatusCode::GATEWAY_TIMEOUT), "INTERNAL_ERROR");
        assert_eq!(code_for_status(StatusCode::PAYLOAD_TOO_LARGE), "PAYLOAD_TOO_LARGE");
    }

    const NOT_ALLOWED: &str = code_for_status(StatusCode::METHOD_NOT_ALLOWED);

    #[test]
    fn test_code_for_status_in_const_context() {
        assert_eq!(NOT_ALLOWED, "METHOD_NOT_ALLOWED");
    }
}
