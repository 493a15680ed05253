//! Access and refresh token handling.
//!
//! Access tokens are short-lived HS256 JWTs carrying the user id and role.
//! Refresh tokens are opaque random strings; only their SHA-256 digest is
//! stored, so a database leak does not leak usable tokens.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use electomart_core::{UserId, UserRole};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::AuthError;
use crate::config::JwtConfig;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: UserId,
    pub role: UserRole,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

/// A freshly minted refresh token.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    /// Value handed to the client.
    pub token: String,
    /// Digest persisted server-side.
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies tokens with the configured secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    /// Build an issuer from configuration.
    #[must_use]
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    /// Access token lifetime.
    #[must_use]
    pub const fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Refresh token lifetime.
    #[must_use]
    pub const fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Sign an access token for a user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenSigning` if encoding fails.
    pub fn issue_access(&self, user_id: UserId, role: UserRole) -> Result<String, AuthError> {
        self.issue_access_at(user_id, role, Utc::now())
    }

    fn issue_access_at(
        &self,
        user_id: UserId,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::TokenSigning(e.to_string()))
    }

    /// Verify an access token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenExpired` for expired tokens and
    /// `AuthError::InvalidToken` for anything else that fails validation.
    pub fn verify_access(&self, token: &str) -> Result<Claims, AuthError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }

    /// Mint a new refresh token.
    #[must_use]
    pub fn new_refresh_token(&self) -> RefreshToken {
        let (token, hash) = random_token();
        RefreshToken {
            token,
            hash,
            expires_at: Utc::now() + self.refresh_ttl,
        }
    }
}

/// Generate a random URL-safe token and its digest.
#[must_use]
pub fn random_token() -> (String, String) {
    let bytes: [u8; 32] = rand::random();
    let token = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_token(&token);
    (token, hash)
}

/// SHA-256 digest of a token, base64url encoded.
#[must_use]
pub fn hash_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&JwtConfig {
            secret: SecretString::from("q8Zt3LmW0pXv6RkN2hYc9JdF4sGb7TaE"),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        })
    }

    #[test]
    fn test_access_token_round_trip() {
        let issuer = issuer();
        let token = issuer.issue_access(UserId::new(42), UserRole::Admin).unwrap();
        let claims = issuer.verify_access(&token).unwrap();
        assert_eq!(claims.sub, UserId::new(42));
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_expired_token() {
        let issuer = issuer();
        let issued = Utc::now() - Duration::hours(1);
        let token = issuer
            .issue_access_at(UserId::new(1), UserRole::User, issued)
            .unwrap();
        assert!(matches!(
            issuer.verify_access(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let other = TokenIssuer::new(&JwtConfig {
            secret: SecretString::from("Zx7Qw2Er9Ty4Ui1Op6As3Df8Gh5Jk0Lm"),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        });
        let token = other.issue_access(UserId::new(1), UserRole::Admin).unwrap();
        assert!(matches!(
            issuer().verify_access(&token),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            issuer().verify_access("not-a-jwt"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_refresh_token_hash_is_stable_and_distinct() {
        let refresh = issuer().new_refresh_token();
        assert_eq!(hash_token(&refresh.token), refresh.hash);
        assert_ne!(refresh.token, refresh.hash);
        assert_ne!(issuer().new_refresh_token().token, refresh.token);
        assert!(refresh.expires_at > Utc::now() + Duration::days(6));
    }
}
