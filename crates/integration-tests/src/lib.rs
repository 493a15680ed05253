//! End-to-end tests for the Electomart API.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the database, migrate and seed the demo catalog
//! electomart migrate && electomart seed
//!
//! # Start the API
//! cargo run -p electomart-api
//!
//! # Run the ignored tests
//! cargo test -p electomart-integration-tests -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `ELECTOMART_TEST_URL` - API base URL (default `http://localhost:5000`)
//! - `ELECTOMART_TEST_DATABASE_URL` - migrated database for the repository
//!   tests in `tests/stock.rs` (falls back to `DATABASE_URL`)
//! - `ELECTOMART_TEST_ADMIN_EMAIL` / `ELECTOMART_TEST_ADMIN_PASSWORD` - an
//!   admin account; tests that need one are skipped when unset

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

/// Password used for every throwaway account.
pub const TEST_PASSWORD: &str = "hunter2-but-longer";

/// API base URL.
#[must_use]
pub fn base_url() -> String {
    std::env::var("ELECTOMART_TEST_URL").unwrap_or_else(|_| "http://localhost:5000".to_owned())
}

/// A signed-in API client.
pub struct TestContext {
    pub client: Client,
    pub base_url: String,
    pub access_token: String,
    pub user: Value,
}

impl TestContext {
    /// Register a fresh account with a unique email and keep its tokens.
    pub async fn register() -> Self {
        let base_url = base_url();
        let client = Client::builder().cookie_store(true).build().unwrap();
        let email = format!("test-{}@example.com", Uuid::new_v4().simple());

        let resp = client
            .post(format!("{base_url}/api/users/register"))
            .json(&json!({ "name": "Test Shopper", "email": email, "password": TEST_PASSWORD }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let session: Value = resp.json().await.unwrap();

        Self {
            client,
            base_url,
            access_token: session["accessToken"].as_str().unwrap().to_owned(),
            user: session["user"].clone(),
        }
    }

    /// Sign in as the configured admin, if one is configured.
    pub async fn admin() -> Option<Self> {
        let email = std::env::var("ELECTOMART_TEST_ADMIN_EMAIL").ok()?;
        let password = std::env::var("ELECTOMART_TEST_ADMIN_PASSWORD").ok()?;
        let base_url = base_url();
        let client = Client::builder().cookie_store(true).build().unwrap();

        let resp = client
            .post(format!("{base_url}/api/users/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let session: Value = resp.json().await.unwrap();

        Some(Self {
            client,
            base_url,
            access_token: session["accessToken"].as_str().unwrap().to_owned(),
            user: session["user"].clone(),
        })
    }

    /// Absolute URL for an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Authenticated GET.
    #[must_use]
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(&self.access_token)
    }

    /// Authenticated POST.
    #[must_use]
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(&self.access_token)
    }

    /// Authenticated PUT.
    #[must_use]
    pub fn put(&self, path: &str) -> RequestBuilder {
        self.client.put(self.url(path)).bearer_auth(&self.access_token)
    }

    /// Authenticated DELETE.
    #[must_use]
    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path)).bearer_auth(&self.access_token)
    }

    /// Id of a catalog product with at least `min_stock` units.
    pub async fn product_in_stock(&self, min_stock: u64) -> Value {
        let page: Value = self
            .client
            .get(self.url("/api/products?limit=50"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        page["products"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["stock"].as_u64().unwrap_or(0) >= min_stock)
            .cloned()
            .expect("seed the catalog before running integration tests")
    }
}

/// Read the error envelope, checking the status and code.
pub async fn expect_error(resp: Response, status: StatusCode, code: &str) -> Value {
    assert_eq!(resp.status(), status);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], code, "unexpected envelope: {body}");
    assert!(body["timestamp"].is_string());
    body
}
