//! Subcommand implementations.

pub mod admin;
pub mod migrate;
pub mod seed;

use secrecy::SecretString;

/// Connection string from `ELECTOMART_DATABASE_URL` or `DATABASE_URL`.
///
/// # Errors
///
/// Returns the name of the variable to set when neither is present.
pub fn database_url() -> Result<SecretString, &'static str> {
    dotenvy::dotenv().ok();

    std::env::var("ELECTOMART_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| "ELECTOMART_DATABASE_URL")
}
