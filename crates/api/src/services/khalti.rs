//! Khalti ePayment API client.
//!
//! Initiates hosted payments and looks up their outcome. Amounts are sent
//! and received in paisa.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::KhaltiConfig;

/// Lookup status of a settled payment.
pub const STATUS_COMPLETED: &str = "Completed";

/// Lookup statuses after which the payment link can no longer be paid.
pub const STATUSES_ABANDONED: [&str; 2] = ["Expired", "User canceled"];

/// Errors that can occur when interacting with the Khalti API.
#[derive(Debug, Error)]
pub enum KhaltiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Customer details shown on the Khalti payment page.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Body of `epayment/initiate/`.
#[derive(Debug, Clone, Serialize)]
pub struct InitiateRequest {
    pub return_url: String,
    pub website_url: String,
    /// Amount in paisa.
    pub amount: i64,
    pub purchase_order_id: String,
    pub purchase_order_name: String,
    pub customer_info: CustomerInfo,
}

/// Response of `epayment/initiate/`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InitiateResponse {
    pub pidx: String,
    pub payment_url: String,
    pub expires_at: String,
}

/// Response of `epayment/lookup/`.
#[derive(Debug, Clone, Deserialize)]
pub struct LookupResponse {
    pub pidx: String,
    /// Amount in paisa.
    pub total_amount: i64,
    /// `Completed`, `Pending`, `Initiated`, `Refunded`, `Expired` or `User canceled`.
    pub status: String,
    pub transaction_id: Option<String>,
}

impl LookupResponse {
    /// Whether the payment settled for exactly `expected_paisa`.
    #[must_use]
    pub fn settles(&self, expected_paisa: i64) -> bool {
        self.status == STATUS_COMPLETED && self.total_amount == expected_paisa
    }

    /// Whether the shopper can no longer complete this payment.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        STATUSES_ABANDONED.contains(&self.status.as_str())
    }
}

/// Khalti ePayment API client.
#[derive(Clone)]
pub struct KhaltiClient {
    client: reqwest::Client,
    base_url: String,
}

impl KhaltiClient {
    /// Create a new Khalti API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &KhaltiConfig, timeout: std::time::Duration) -> Result<Self, KhaltiError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Key {}", config.secret_key.expose_secret());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|e| KhaltiError::Parse(format!("Invalid secret key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Start a hosted payment.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or rejects the payment.
    #[tracing::instrument(skip(self, request), fields(order = %request.purchase_order_id, amount = request.amount))]
    pub async fn initiate(&self, request: &InitiateRequest) -> Result<InitiateResponse, KhaltiError> {
        self.post("epayment/initiate/", request).await
    }

    /// Look up the state of a payment.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or the `pidx` is unknown.
    #[tracing::instrument(skip(self))]
    pub async fn lookup(&self, pidx: &str) -> Result<LookupResponse, KhaltiError> {
        self.post("epayment/lookup/", &serde_json::json!({ "pidx": pidx }))
            .await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, KhaltiError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{path}", self.base_url);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(KhaltiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| KhaltiError::Parse(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lookup(status: &str, total_amount: i64) -> LookupResponse {
        serde_json::from_value(serde_json::json!({
            "pidx": "bZQLD9wRVWo4CdESSfuSsB",
            "total_amount": total_amount,
            "status": status,
            "transaction_id": "GFq9PFS7b2iYvL8Lir9oXe",
            "fee": 0,
            "refunded": false
        }))
        .unwrap()
    }

    #[test]
    fn test_settles_requires_completed_and_exact_amount() {
        assert!(lookup("Completed", 123_000).settles(123_000));
        assert!(!lookup("Pending", 123_000).settles(123_000));
        assert!(!lookup("Completed", 1_000).settles(123_000));
        assert!(!lookup("User canceled", 123_000).settles(123_000));
    }

    #[test]
    fn test_only_dead_payments_are_abandoned() {
        assert!(lookup("Expired", 123_000).is_abandoned());
        assert!(lookup("User canceled", 123_000).is_abandoned());
        assert!(!lookup("Initiated", 123_000).is_abandoned());
        assert!(!lookup("Pending", 123_000).is_abandoned());
        assert!(!lookup("Completed", 123_000).is_abandoned());
    }

    #[test]
    fn test_initiate_request_shape() {
        let request = InitiateRequest {
            return_url: "http://localhost:5173/payment/verify".to_owned(),
            website_url: "http://localhost:5173".to_owned(),
            amount: 123_000,
            purchase_order_id: "17".to_owned(),
            purchase_order_name: "Electomart order #17".to_owned(),
            customer_info: CustomerInfo {
                name: "Ram".to_owned(),
                email: "ram@example.com".to_owned(),
                phone: None,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["amount"], 123_000);
        assert_eq!(json["purchase_order_id"], "17");
        assert!(json["customer_info"].get("phone").is_none());
    }

    #[test]
    fn test_new_client_builds() {
        let config = KhaltiConfig {
            secret_key: secrecy::SecretString::from("test_secret_key_f59e8b7d18b4499ca40f68195a846e9b"),
            base_url: "https://dev.khalti.com/api/v2".to_owned(),
        };
        assert!(KhaltiClient::new(&config, std::time::Duration::from_secs(5)).is_ok());
    }
}
