//! Business services and third-party API clients.

pub mod auth;
pub mod email;
pub mod khalti;
pub mod media;

pub use auth::AuthService;
pub use email::EmailService;
pub use khalti::KhaltiClient;
pub use media::MediaClient;
