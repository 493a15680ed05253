//! HTTP route table for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                               - Liveness
//! GET    /health/ready                         - Readiness (database)
//!
//! # Products
//! GET    /api/products                         - Filtered, paginated catalog
//! GET    /api/products/categories              - Category list
//! GET    /api/products/{id}                    - Product detail
//! POST   /api/products                         - Create (admin)
//! PUT    /api/products/{id}                    - Update (admin)
//! DELETE /api/products/{id}                    - Delete (admin)
//! POST   /api/products/{id}/images             - Upload images (admin, multipart)
//! DELETE /api/products/{id}/images/{imageId}   - Remove image (admin)
//! GET    /api/products/{id}/reviews            - Sorted, paginated reviews
//! POST   /api/products/{id}/reviews            - Add review (auth)
//! DELETE /api/products/{id}/reviews/{reviewId} - Delete review (author or admin)
//! POST   /api/products/{id}/reviews/{reviewId}/like - Toggle like (auth)
//!
//! # Users
//! POST   /api/users/register | login | refresh | logout
//! POST   /api/users/forgot-password | reset-password
//! GET    /api/users/me, PUT /api/users/me, PUT /api/users/me/password
//! GET    /api/users, GET /api/users/{id}       - Admin
//! PUT    /api/users/{id}/role, DELETE /api/users/{id} - Admin
//!
//! # Cart (auth)
//! GET /api/cart, POST /api/cart, DELETE /api/cart
//! PUT /api/cart/{productId}, DELETE /api/cart/{productId}
//!
//! # Wishlist (auth)
//! GET /api/wishlist, POST /api/wishlist, POST /api/wishlist/merge
//! DELETE /api/wishlist/{productId}
//!
//! # Orders (auth)
//! POST /api/orders, GET /api/orders/mine, GET /api/orders/{id}
//! PUT  /api/orders/{id}/cancel
//! GET  /api/orders, GET /api/orders/stats   - Admin
//! PUT  /api/orders/{id}/status, PUT /api/orders/{id}/pay - Admin
//!
//! # Payments (auth)
//! POST /api/payments/khalti/initiate, POST /api/payments/khalti/verify
//! ```

pub mod cart;
pub mod extract;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;
pub mod users;
pub mod wishlist;

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::AppError;
use crate::middleware::{
    api_rate_limiter, auth_rate_limiter, error_envelope_middleware, request_id_middleware,
    security_headers_middleware,
};
use crate::state::AppState;

/// Largest accepted image upload request.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Create the product and review routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route("/categories", get(products::categories))
        .route(
            "/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::destroy),
        )
        .route(
            "/{id}/images",
            post(products::upload_images).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/{id}/images/{image_id}",
            delete(products::delete_image),
        )
        .route("/{id}/reviews", get(reviews::index).post(reviews::create))
        .route(
            "/{id}/reviews/{review_id}",
            delete(reviews::destroy),
        )
        .route("/{id}/reviews/{review_id}/like", post(reviews::toggle_like))
}

/// Create the user routes router.
///
/// Credential endpoints get the strict auth rate limit.
pub fn user_routes(trust_proxy_headers: bool) -> Router<AppState> {
    let credentials = Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/refresh", post(users::refresh))
        .route("/forgot-password", post(users::forgot_password))
        .route("/reset-password", post(users::reset_password))
        .layer(auth_rate_limiter(trust_proxy_headers));

    Router::new()
        .merge(credentials)
        .route("/logout", post(users::logout))
        .route("/me", get(users::me).put(users::update_me))
        .route("/me/password", put(users::change_password))
        .route("/", get(users::index))
        .route("/{id}", get(users::show).delete(users::destroy))
        .route("/{id}/role", put(users::update_role))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(cart::show).post(cart::add).delete(cart::clear),
        )
        .route(
            "/{product_id}",
            put(cart::update).delete(cart::remove),
        )
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::show).post(wishlist::add))
        .route("/merge", post(wishlist::merge))
        .route("/{product_id}", delete(wishlist::remove))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::create))
        .route("/mine", get(orders::mine))
        .route("/stats", get(orders::stats))
        .route("/{id}", get(orders::show))
        .route("/{id}/cancel", put(orders::cancel))
        .route("/{id}/status", put(orders::update_status))
        .route("/{id}/pay", put(orders::mark_paid))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/khalti/initiate", post(payments::initiate))
        .route("/khalti/verify", post(payments::verify))
}

/// Create all `/api` routes.
///
/// Rate limits key on proxy headers only when `trust_proxy_headers` is set.
pub fn routes(trust_proxy_headers: bool) -> Router<AppState> {
    Router::new()
        .nest("/api/products", product_routes())
        .nest("/api/users", user_routes(trust_proxy_headers))
        .nest("/api/cart", cart_routes())
        .nest("/api/wishlist", wishlist_routes())
        .nest("/api/orders", order_routes())
        .nest("/api/payments", payment_routes())
        .layer(api_rate_limiter(trust_proxy_headers))
}

/// CORS for the storefront client; credentials allowed so auth cookies flow.
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origin = HeaderValue::from_str(config.client_url.trim_end_matches('/')).ok();
    if origin.is_none() {
        tracing::warn!(client_url = %config.client_url, "Client URL is not a valid origin; CORS disabled");
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origin))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the complete application with middleware and state.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(state.config());
    let trust_proxy_headers = state.config().trust_proxy_headers;

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes(trust_proxy_headers))
        .fallback(fallback)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(cors)
        .layer(middleware::from_fn(error_envelope_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn fallback() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::SocketAddr;

    use axum::body::to_bytes;
    use axum::extract::ConnectInfo;
    use electomart_core::{UserId, UserRole};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;
    use crate::config::ApiConfig;
    use crate::config::tests::test_config;

    /// State over a pool that never connects; only paths that fail before
    /// touching the database are exercised here.
    fn state_with(config: ApiConfig) -> AppState {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost:1/never")
            .unwrap();
        AppState::new(config, pool).unwrap()
    }

    fn test_state() -> AppState {
        state_with(test_config())
    }

    fn token(state: &AppState, role: UserRole) -> String {
        state.tokens().issue_access(UserId::new(7), role).unwrap()
    }

    fn request(method: Method, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(test_state())
            .oneshot(request(Method::GET, "/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(response.headers()["x-frame-options"], "DENY");
    }

    #[tokio::test]
    async fn test_categories_listed() {
        let (status, body) = send(
            test_state(),
            request(Method::GET, "/api/products/categories")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 9);
        assert_eq!(body[0]["value"], "laptops");
    }

    #[tokio::test]
    async fn test_protected_route_without_token() {
        let (status, body) = send(
            test_state(),
            request(Method::GET, "/api/cart").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
        assert_eq!(body["path"], "/api/cart");
        assert_eq!(body["method"], "GET");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_token() {
        let (status, body) = send(
            test_state(),
            request(Method::GET, "/api/orders/mine")
                .header(header::AUTHORIZATION, "Bearer not.a.jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_expired_token() {
        let mut config = test_config();
        config.jwt.access_ttl = chrono::Duration::minutes(-5);
        let state = state_with(config);
        let expired = token(&state, UserRole::User);

        let (status, body) = send(
            state,
            request(Method::GET, "/api/wishlist")
                .header(header::COOKIE, format!("accessToken={expired}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "TOKEN_EXPIRED");
    }

    #[tokio::test]
    async fn test_admin_route_forbidden_for_customer() {
        let state = test_state();
        let user_token = token(&state, UserRole::User);
        let (status, body) = send(
            state,
            request(Method::GET, "/api/orders/stats")
                .header(header::AUTHORIZATION, format!("Bearer {user_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, body) = send(
            test_state(),
            request(Method::GET, "/api/nope").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["path"], "/api/nope");
    }

    #[tokio::test]
    async fn test_bad_path_parameter() {
        let (status, body) = send(
            test_state(),
            request(Method::GET, "/api/products/not-a-number")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_inverted_price_range() {
        let (status, body) = send(
            test_state(),
            request(Method::GET, "/api/products?minPrice=500&maxPrice=100")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_malformed_json_body() {
        let (status, body) = send(
            test_state(),
            request(Method::POST, "/api/users/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"email\": "))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["method"], "POST");
    }

    #[tokio::test]
    async fn test_invalid_cart_quantity() {
        let state = test_state();
        let user_token = token(&state, UserRole::User);
        let (status, body) = send(
            state,
            request(Method::POST, "/api/cart")
                .header(header::AUTHORIZATION, format!("Bearer {user_token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"productId": 1, "quantity": -2}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_payments_unavailable_without_gateway() {
        let state = test_state();
        let user_token = token(&state, UserRole::User);
        let (status, body) = send(
            state,
            request(Method::POST, "/api/payments/khalti/initiate")
                .header(header::AUTHORIZATION, format!("Bearer {user_token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"orderId": 1}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_method_not_allowed_envelope() {
        let (status, body) = send(
            test_state(),
            request(Method::PATCH, "/api/products/categories")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["code"], "METHOD_NOT_ALLOWED");
    }

    #[tokio::test]
    async fn test_cors_preflight_for_client_origin() {
        let response = app(test_state())
            .oneshot(
                request(Method::OPTIONS, "/api/cart")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
    }
}
