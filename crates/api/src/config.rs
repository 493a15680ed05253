//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ELECTOMART_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `ELECTOMART_JWT_SECRET` - HMAC secret for access tokens (min 32 chars, high entropy)
//!
//! ## Optional
//! - `ELECTOMART_HOST` - Bind address (default: 127.0.0.1)
//! - `ELECTOMART_PORT` - Listen port (default: 5000)
//! - `ELECTOMART_PUBLIC_URL` - Public URL of this API (default: `http://localhost:5000`)
//! - `ELECTOMART_CLIENT_URL` - Storefront client origin (default: `http://localhost:5173`)
//! - `ELECTOMART_ACCESS_TOKEN_TTL_MINUTES` - Access token lifetime (default: 15)
//! - `ELECTOMART_REFRESH_TOKEN_TTL_DAYS` - Refresh token lifetime (default: 7)
//! - `ELECTOMART_SHIPPING_FLAT` - Flat shipping charge in rupees (default: 100)
//! - `ELECTOMART_FREE_SHIPPING_THRESHOLD` - Items subtotal for free shipping (default: 5000)
//! - `ELECTOMART_TAX_RATE` - Tax rate applied to items (default: 0.13)
//! - `ELECTOMART_HTTP_TIMEOUT_SECS` - Timeout for outbound HTTP calls (default: 15)
//! - `ELECTOMART_TRUST_PROXY_HEADERS` - Key rate limits on `X-Forwarded-For` and
//!   friends (default: false; enable only behind a proxy that overwrites them)
//! - `KHALTI_SECRET_KEY` - Khalti live/test secret key (enables payments)
//! - `KHALTI_BASE_URL` - Khalti API base (default: `https://a.khalti.com/api/v2`)
//! - `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY`, `CLOUDINARY_API_SECRET` - Image uploads
//! - `SENDGRID_API_KEY`, `SENDGRID_FROM` - Transactional email
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use electomart_core::domain::PricingPolicy;
use electomart_core::Money;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public URL of this API (decides whether auth cookies are `Secure`)
    pub public_url: String,
    /// Storefront client origin (CORS and payment return URLs)
    pub client_url: String,
    /// Token signing and lifetimes
    pub jwt: JwtConfig,
    /// Shipping and tax rules
    pub pricing: PricingPolicy,
    /// Timeout applied to payment, media and mail HTTP calls
    pub http_timeout: Duration,
    /// Whether client IPs may be taken from forwarding headers
    pub trust_proxy_headers: bool,
    /// Khalti payment gateway (disabled when unset)
    pub khalti: Option<KhaltiConfig>,
    /// Cloudinary image hosting (disabled when unset)
    pub cloudinary: Option<CloudinaryConfig>,
    /// `SendGrid` email delivery (disabled when unset)
    pub sendgrid: Option<SendGridConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// JWT and refresh-token settings.
#[derive(Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 signing secret
    pub secret: SecretString,
    /// Access token lifetime
    pub access_ttl: chrono::Duration,
    /// Refresh token lifetime
    pub refresh_ttl: chrono::Duration,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Khalti ePayment configuration.
#[derive(Clone)]
pub struct KhaltiConfig {
    /// Merchant secret key
    pub secret_key: SecretString,
    /// API base URL (sandbox: `https://dev.khalti.com/api/v2`)
    pub base_url: String,
}

impl std::fmt::Debug for KhaltiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KhaltiConfig")
            .field("secret_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Cloudinary upload configuration.
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: SecretString,
}

impl std::fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// `SendGrid` mail configuration.
#[derive(Clone)]
pub struct SendGridConfig {
    pub api_key: SecretString,
    /// Verified sender address
    pub from_address: String,
}

impl std::fmt::Debug for SendGridConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendGridConfig")
            .field("api_key", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("ELECTOMART_DATABASE_URL")?;
        let host = parse_env_or_default::<IpAddr>("ELECTOMART_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("ELECTOMART_PORT", "5000")?;
        let public_url = get_env_or_default("ELECTOMART_PUBLIC_URL", "http://localhost:5000");
        let client_url = get_env_or_default("ELECTOMART_CLIENT_URL", "http://localhost:5173");
        url::Url::parse(&client_url).map_err(|e| {
            ConfigError::InvalidEnvVar("ELECTOMART_CLIENT_URL".to_string(), e.to_string())
        })?;

        let jwt = JwtConfig::from_env()?;
        let pricing = pricing_from_env()?;
        let http_timeout = Duration::from_secs(parse_env_or_default::<u64>(
            "ELECTOMART_HTTP_TIMEOUT_SECS",
            "15",
        )?);
        let trust_proxy_headers =
            parse_env_or_default::<bool>("ELECTOMART_TRUST_PROXY_HEADERS", "false")?;

        Ok(Self {
            database_url,
            host,
            port,
            public_url,
            client_url,
            jwt,
            pricing,
            http_timeout,
            trust_proxy_headers,
            khalti: KhaltiConfig::from_env()?,
            cloudinary: CloudinaryConfig::from_env(),
            sendgrid: SendGridConfig::from_env(),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether auth cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.public_url.starts_with("https://")
    }
}

impl JwtConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret = get_validated_secret("ELECTOMART_JWT_SECRET")?;
        validate_secret_length(&secret, "ELECTOMART_JWT_SECRET")?;

        let access_minutes =
            parse_env_or_default::<i64>("ELECTOMART_ACCESS_TOKEN_TTL_MINUTES", "15")?;
        let refresh_days = parse_env_or_default::<i64>("ELECTOMART_REFRESH_TOKEN_TTL_DAYS", "7")?;
        if access_minutes <= 0 || refresh_days <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "ELECTOMART_*_TOKEN_TTL".to_string(),
                "token lifetimes must be positive".to_string(),
            ));
        }

        Ok(Self {
            secret,
            access_ttl: chrono::Duration::minutes(access_minutes),
            refresh_ttl: chrono::Duration::days(refresh_days),
        })
    }
}

impl KhaltiConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(secret_key) = get_optional_env("KHALTI_SECRET_KEY") else {
            return Ok(None);
        };
        let base_url = get_env_or_default("KHALTI_BASE_URL", "https://a.khalti.com/api/v2");
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("KHALTI_BASE_URL".to_string(), e.to_string())
        })?;

        Ok(Some(Self {
            secret_key: SecretString::from(secret_key),
            base_url: base_url.trim_end_matches('/').to_string(),
        }))
    }
}

impl CloudinaryConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            cloud_name: get_optional_env("CLOUDINARY_CLOUD_NAME")?,
            api_key: get_optional_env("CLOUDINARY_API_KEY")?,
            api_secret: SecretString::from(get_optional_env("CLOUDINARY_API_SECRET")?),
        })
    }
}

impl SendGridConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            api_key: SecretString::from(get_optional_env("SENDGRID_API_KEY")?),
            from_address: get_env_or_default("SENDGRID_FROM", "no-reply@electomart.com.np"),
        })
    }
}

fn pricing_from_env() -> Result<PricingPolicy, ConfigError> {
    let money = |key: &str, default: &str| -> Result<Money, ConfigError> {
        let amount = parse_env_or_default::<Decimal>(key, default)?;
        Money::new(amount).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    };

    let shipping_flat = money("ELECTOMART_SHIPPING_FLAT", "100")?;
    let free_threshold = money("ELECTOMART_FREE_SHIPPING_THRESHOLD", "5000")?;
    let tax_rate = parse_env_or_default::<Decimal>("ELECTOMART_TAX_RATE", "0.13")?;

    PricingPolicy::new(shipping_flat, free_threshold, tax_rate)
        .map_err(|e| ConfigError::InvalidEnvVar("ELECTOMART_TAX_RATE".to_string(), e.to_string()))
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a signing secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_JWT_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    /// Configuration used by router and service tests.
    pub(crate) fn test_config() -> ApiConfig {
        ApiConfig {
            database_url: SecretString::from("postgres://localhost/electomart_test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 5000,
            public_url: "http://localhost:5000".to_string(),
            client_url: "http://localhost:5173".to_string(),
            jwt: JwtConfig {
                secret: SecretString::from("q8Zt3LmW0pXv6RkN2hYc9JdF4sGb7TaE"),
                access_ttl: chrono::Duration::minutes(15),
                refresh_ttl: chrono::Duration::days(7),
            },
            pricing: PricingPolicy::default(),
            http_timeout: Duration::from_secs(5),
            trust_proxy_headers: false,
            khalti: None,
            cloudinary: None,
            sendgrid: None,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-jwt-secret-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("abababababababababababababababab", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_secret_length() {
        assert!(validate_secret_length(&SecretString::from("short"), "TEST").is_err());
        assert!(validate_secret_length(&SecretString::from("x".repeat(32)), "TEST").is_ok());
    }

    #[test]
    fn test_socket_addr_and_cookie_security() {
        let mut config = test_config();
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 5000);
        assert!(!config.secure_cookies());

        config.public_url = "https://api.electomart.com.np".to_string();
        assert!(config.secure_cookies());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let khalti = KhaltiConfig {
            secret_key: SecretString::from("live_secret_key_abc123"),
            base_url: "https://a.khalti.com/api/v2".to_string(),
        };
        let cloudinary = CloudinaryConfig {
            cloud_name: "electomart".to_string(),
            api_key: "123456".to_string(),
            api_secret: SecretString::from("cloudinary_secret_value"),
        };

        let debug_output = format!("{khalti:?} {cloudinary:?} {:?}", test_config().jwt);

        assert!(debug_output.contains("a.khalti.com"));
        assert!(debug_output.contains("electomart"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("live_secret_key_abc123"));
        assert!(!debug_output.contains("cloudinary_secret_value"));
        assert!(!debug_output.contains("q8Zt3LmW0pXv6RkN2hYc9JdF4sGb7TaE"));
    }
}
