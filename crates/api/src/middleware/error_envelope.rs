//! Uniform JSON error bodies.
//!
//! Handlers produce errors through [`AppError`](crate::error::AppError),
//! which leaves an [`ErrorInfo`] in the response extensions. This middleware
//! rewrites those bodies to include the request path and method. Error
//! responses produced by layers that know nothing about `AppError` (method
//! not allowed, rate limiting, body limits) are converted to the same shape.

use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};

use crate::error::{ErrorBody, ErrorInfo, code_for_status};

/// Bytes of a foreign plain-text error body kept as the message.
const MAX_PLAIN_MESSAGE: usize = 1024;

/// Rewrite every 4xx/5xx body as `{message, code, timestamp, path, method}`.
pub async fn error_envelope_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();

    let info = match parts.extensions.get::<ErrorInfo>() {
        Some(info) => info.clone(),
        None => {
            let is_plain = parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_none_or(|ct| ct.starts_with("text/plain"));
            let text = if is_plain {
                to_bytes(body, MAX_PLAIN_MESSAGE)
                    .await
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes.to_vec()).ok())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            } else {
                None
            };
            ErrorInfo {
                message: text.unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Request failed")
                        .to_string()
                }),
                code: code_for_status(status),
            }
        }
    };

    let envelope = ErrorBody {
        message: &info.message,
        code: info.code,
        timestamp: ErrorBody::now(),
        path: Some(&path),
        method: Some(&method),
    };

    let Ok(bytes) = serde_json::to_vec(&envelope) else {
        return Response::from_parts(parts, Body::empty());
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Response::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        Router,
        http::{Request, StatusCode},
        middleware,
        routing::get,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::error::AppError;

    fn app() -> Router {
        Router::new()
            .route(
                "/missing",
                get(|| async { Err::<(), _>(AppError::NotFound("Product not found".into())) }),
            )
            .route(
                "/plain",
                get(|| async { (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests! Wait for 3s") }),
            )
            .route("/ok", get(|| async { "fine" }))
            .layer(middleware::from_fn(error_envelope_middleware))
    }

    async fn call(method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn test_app_error_gets_path_and_method() {
        let (status, body) = call("GET", "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Product not found");
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["path"], "/missing");
        assert_eq!(body["method"], "GET");
    }

    #[tokio::test]
    async fn test_plain_text_error_is_wrapped() {
        let (status, body) = call("GET", "/plain").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "RATE_LIMITED");
        assert_eq!(body["message"], "Too Many Requests! Wait for 3s");
    }

    #[tokio::test]
    async fn test_method_not_allowed_is_wrapped() {
        let (status, body) = call("DELETE", "/ok").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["code"], "METHOD_NOT_ALLOWED");
        assert_eq!(body["method"], "DELETE");
    }

    #[tokio::test]
    async fn test_success_untouched() {
        let response = app()
            .oneshot(Request::builder().uri("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), b"fine");
    }
}
