//! Authentication service.
//!
//! Provides password authentication with Argon2id hashes, JWT access
//! tokens and rotating refresh tokens, plus password changes and resets.

mod error;
pub mod tokens;

pub use error::AuthError;
pub use tokens::{Claims, RefreshToken, TokenIssuer};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;

use electomart_core::{Email, UserId};

use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::models::user::User;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Longest accepted display name.
const MAX_NAME_LENGTH: usize = 100;

/// How long a password reset link stays valid.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 30;

/// Tokens handed out after a successful login, registration or refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

/// Authentication service.
///
/// Handles registration, login, token refresh and password management.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    tokens: &'a TokenIssuer,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, tokens: &'a TokenIssuer) -> Self {
        Self {
            users: UserRepository::new(pool),
            tokens,
        }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new user and sign them in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let name = validate_name(name)?;
        let email = Email::parse(email)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create(name, &email, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        self.start_session(user).await
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_credentials(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        self.start_session(user).await
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// The presented token is consumed; reusing it fails.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRefreshToken` if the token is unknown or expired.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        let next = self.tokens.new_refresh_token();
        let user_id = self
            .users
            .rotate_refresh_token(&tokens::hash_token(refresh_token), &next.hash, next.expires_at)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        let user = self.get_user(user_id).await?;
        let access_token = self.tokens.issue_access(user.id, user.role)?;

        Ok(AuthSession {
            user,
            access_token,
            refresh_token: next.token,
        })
    }

    /// Revoke a refresh token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.users
            .delete_refresh_token(&tokens::hash_token(refresh_token))
            .await?;
        Ok(())
    }

    /// Change the password after checking the current one.
    ///
    /// All refresh tokens are revoked, signing out other devices.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if `current` is wrong.
    /// Returns `AuthError::WeakPassword` if `new` doesn't meet requirements.
    pub async fn change_password(
        &self,
        user_id: UserId,
        current: &str,
        new: &str,
    ) -> Result<(), AuthError> {
        let password_hash = self.users.get_password_hash(user_id).await.map_err(|e| match e {
            RepositoryError::NotFound => AuthError::UserNotFound,
            other => AuthError::Repository(other),
        })?;
        verify_password(current, &password_hash)?;
        validate_password(new)?;

        self.users
            .update_password(user_id, &hash_password(new)?)
            .await?;
        Ok(())
    }

    /// Create a reset token for the account with this email, if any.
    ///
    /// Returns the user and the raw token to email. Unknown emails return
    /// `None` so callers can respond identically either way.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<Option<(User, String)>, AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Ok(None);
        };
        let Some(user) = self.users.get_by_email(&email).await? else {
            return Ok(None);
        };

        let (token, hash) = tokens::random_token();
        let expires_at = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
        self.users.store_reset_token(user.id, &hash, expires_at).await?;

        Ok(Some((user, token)))
    }

    /// Set a new password using a reset token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidResetToken` if the token is unknown, used or expired.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), AuthError> {
        validate_password(password)?;
        let user_id = self
            .users
            .consume_reset_token(&tokens::hash_token(token))
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        self.users
            .update_password(user_id, &hash_password(password)?)
            .await?;
        Ok(())
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn start_session(&self, user: User) -> Result<AuthSession, AuthError> {
        let access_token = self.tokens.issue_access(user.id, user.role)?;
        let refresh = self.tokens.new_refresh_token();
        self.users
            .store_refresh_token(user.id, &refresh.hash, refresh.expires_at)
            .await?;

        Ok(AuthSession {
            user,
            access_token,
            refresh_token: refresh.token,
        })
    }
}

/// Trim a display name and check its length.
///
/// # Errors
///
/// Returns `AuthError::InvalidName` for blank or overlong names.
pub fn validate_name(name: &str) -> Result<&str, AuthError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidName);
    }
    Ok(name)
}

/// Check password strength.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` describing the first failed rule.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if password.chars().all(char::is_alphabetic) || password.chars().all(char::is_numeric) {
        return Err(AuthError::WeakPassword(
            "password must mix letters with digits or symbols".to_owned(),
        ));
    }

    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("s3cure-pass").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("s3cure-pass", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong-pass1", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("anything1", "not-a-phc-string"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("short1").is_err());
        assert!(validate_password("onlyletters").is_err());
        assert!(validate_password("1234567890").is_err());
        assert!(validate_password("letters-and-1").is_ok());
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Sita Sharma ").unwrap(), "Sita Sharma");
        assert!(matches!(validate_name("   "), Err(AuthError::InvalidName)));
        assert!(validate_name(&"x".repeat(101)).is_err());
    }
}
