//! HTTP middleware stack for the API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Error envelope (stamp path and method on error bodies)
//! 5. CORS (client origin only, credentials allowed)
//! 6. Security headers
//! 7. Rate limiting (governor, per route group)

pub mod auth;
pub mod error_envelope;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use auth::{
    ACCESS_COOKIE, OptionalAuth, REFRESH_COOKIE, RequireAdmin, RequireAuth, cookie_value,
};
pub use error_envelope::error_envelope_middleware;
pub use rate_limit::{api_rate_limiter, auth_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
