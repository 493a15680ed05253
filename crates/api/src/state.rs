//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use electomart_core::ProductId;
use moka::future::Cache;
use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::error::AppError;
use crate::models::product::Product;
use crate::services::auth::TokenIssuer;
use crate::services::email::EmailError;
use crate::services::khalti::KhaltiError;
use crate::services::media::MediaError;
use crate::services::{EmailService, KhaltiClient, MediaClient};

/// How long a product detail stays cached.
const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Maximum number of cached product details.
const PRODUCT_CACHE_CAPACITY: u64 = 1_000;

/// Error building an integration client at startup.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("khalti client: {0}")]
    Khalti(#[from] KhaltiError),
    #[error("media client: {0}")]
    Media(#[from] MediaError),
    #[error("email service: {0}")]
    Email(#[from] EmailError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Integrations whose credentials are absent
/// are `None`; handlers that need them answer 503.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    tokens: TokenIssuer,
    khalti: Option<KhaltiClient>,
    media: Option<MediaClient>,
    email: Option<EmailService>,
    product_cache: Cache<ProductId, Product>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured integration client cannot be built.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, StateError> {
        let timeout = config.http_timeout;
        let tokens = TokenIssuer::new(&config.jwt);
        let khalti = config
            .khalti
            .as_ref()
            .map(|c| KhaltiClient::new(c, timeout))
            .transpose()?;
        let media = config
            .cloudinary
            .as_ref()
            .map(|c| MediaClient::new(c, timeout))
            .transpose()?;
        let email = config
            .sendgrid
            .as_ref()
            .map(|c| EmailService::new(c, timeout))
            .transpose()?;

        let product_cache = Cache::builder()
            .max_capacity(PRODUCT_CACHE_CAPACITY)
            .time_to_live(PRODUCT_CACHE_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                tokens,
                khalti,
                media,
                email,
                product_cache,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Access token signer/verifier.
    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.inner.tokens
    }

    /// Khalti client, or 503 when payments are not configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ServiceUnavailable` if `KHALTI_SECRET_KEY` is unset.
    pub fn khalti(&self) -> Result<&KhaltiClient, AppError> {
        self.inner
            .khalti
            .as_ref()
            .ok_or(AppError::ServiceUnavailable("Khalti payment gateway"))
    }

    /// Cloudinary client, or 503 when uploads are not configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ServiceUnavailable` if Cloudinary credentials are unset.
    pub fn media(&self) -> Result<&MediaClient, AppError> {
        self.inner
            .media
            .as_ref()
            .ok_or(AppError::ServiceUnavailable("Image upload service"))
    }

    /// Mail client, if configured. Mail is best-effort, so callers skip
    /// sending instead of failing.
    #[must_use]
    pub fn email(&self) -> Option<&EmailService> {
        self.inner.email.as_ref()
    }

    /// Cached product details keyed by id.
    #[must_use]
    pub fn product_cache(&self) -> &Cache<ProductId, Product> {
        &self.inner.product_cache
    }

    /// Drop a product from the detail cache after a write.
    pub async fn invalidate_product(&self, id: ProductId) {
        self.inner.product_cache.invalidate(&id).await;
    }
}
