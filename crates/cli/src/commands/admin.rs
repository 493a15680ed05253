//! Admin user management commands.
//!
//! # Usage
//!
//! ```bash
//! # Promote an account that registered through the storefront
//! electomart admin promote -e owner@electomart.com.np
//!
//! # Create an admin account directly
//! electomart admin create -e owner@electomart.com.np -n "Store Owner" -p '...'
//! ```

use electomart_api::db::{self, RepositoryError, UserRepository};
use electomart_api::services::auth::{
    AuthError, hash_password, validate_name, validate_password,
};
use electomart_core::{Email, UserId, UserRole};
use thiserror::Error;

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Repository error.
    #[error("Database error: {0}")]
    Repository(RepositoryError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// No account with this email.
    #[error("No user with email: {0}")]
    UserNotFound(String),

    /// User already exists.
    #[error("User already exists with email: {0}")]
    UserExists(String),

    /// Name or password rejected.
    #[error("{0}")]
    Invalid(#[from] AuthError),
}

fn parse_email(email: &str) -> Result<Email, AdminError> {
    Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))
}

/// Set the role of an existing account.
///
/// # Errors
///
/// Returns `AdminError::UserNotFound` if no account uses this email.
pub async fn set_role(email: &str, role: UserRole) -> Result<(), AdminError> {
    let email = parse_email(email)?;
    let database_url = super::database_url().map_err(AdminError::MissingEnvVar)?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;

    let user = UserRepository::new(&pool)
        .set_role_by_email(&email, role)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AdminError::UserNotFound(email.to_string()),
            other => AdminError::Repository(other),
        })?;

    tracing::info!("User {} ({}) now has role {}", user.email, user.id, user.role);
    Ok(())
}

/// Create a new admin account.
///
/// The password is checked with the same rules as storefront registration.
///
/// # Returns
///
/// The ID of the created user.
///
/// # Errors
///
/// Returns `AdminError::UserExists` if the email is already registered.
pub async fn create_user(email: &str, name: &str, password: &str) -> Result<UserId, AdminError> {
    let email = parse_email(email)?;
    let name = validate_name(name)?;
    validate_password(password)?;
    let password_hash = hash_password(password)?;
    let database_url = super::database_url().map_err(AdminError::MissingEnvVar)?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;
    let users = UserRepository::new(&pool);

    tracing::info!("Creating admin user: {}", email);

    let user = users
        .create(name, &email, &password_hash)
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AdminError::UserExists(email.to_string()),
            other => AdminError::Repository(other),
        })?;
    users
        .set_role(user.id, UserRole::Admin)
        .await
        .map_err(AdminError::Repository)?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Email: {}",
        user.id,
        email
    );
    Ok(user.id)
}
