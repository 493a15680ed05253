//! Cloudinary media client for product images.
//!
//! Uploads and deletions use signed requests: the sorted request
//! parameters plus the API secret are hashed with SHA-256 (the account's
//! signature algorithm must be set to SHA-256).

use std::fmt::Write as _;

use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::CloudinaryConfig;

/// Cloudinary upload API base URL.
const BASE_URL: &str = "https://api.cloudinary.com/v1_1";

/// Folder all product images are stored under.
const FOLDER: &str = "electomart/products";

/// Errors that can occur when interacting with Cloudinary.
#[derive(Debug, Error)]
pub enum MediaError {
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

/// A stored image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedImage {
    pub secure_url: String,
    pub public_id: String,
}

/// Cloudinary client.
#[derive(Clone)]
pub struct MediaClient {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

impl MediaClient {
    /// Create a new Cloudinary client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &CloudinaryConfig, timeout: std::time::Duration) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Upload one image.
    ///
    /// # Errors
    ///
    /// Returns error if the upload is rejected or the request fails.
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedImage, MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[("folder", FOLDER), ("timestamp", &timestamp)]);

        let part = Part::bytes(bytes)
            .file_name(file_name.to_owned())
            .mime_str(content_type)
            .map_err(|e| MediaError::Parse(format!("invalid content type: {e}")))?;
        let form = Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("folder", FOLDER)
            .text("timestamp", timestamp)
            .text("signature", signature);

        let url = format!("{BASE_URL}/{}/image/upload", self.config.cloud_name);
        let response = self.client.post(&url).multipart(form).send().await?;
        parse_response(response).await
    }

    /// Delete an image by public id. Missing images are not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[tracing::instrument(skip(self))]
    pub async fn destroy(&self, public_id: &str) -> Result<(), MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let response = self.destroy_request(public_id, &timestamp).send().await?;

        let result: DestroyResponse = parse_response(response).await?;
        if result.result != "ok" && result.result != "not found" {
            return Err(MediaError::Api {
                status: 200,
                message: result.result,
            });
        }
        Ok(())
    }

    /// Signed, form-encoded `image/destroy` call.
    fn destroy_request(&self, public_id: &str, timestamp: &str) -> reqwest::RequestBuilder {
        let signature = self.sign(&[("public_id", public_id), ("timestamp", timestamp)]);
        let params = [
            ("public_id", public_id),
            ("timestamp", timestamp),
            ("api_key", self.config.api_key.as_str()),
            ("signature", signature.as_str()),
        ];
        let url = format!("{BASE_URL}/{}/image/destroy", self.config.cloud_name);
        self.client.post(url).form(&params)
    }

    fn sign(&self, params: &[(&str, &str)]) -> String {
        sign_params(params, self.config.api_secret.expose_secret())
    }
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

async fn parse_response<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, MediaError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(MediaError::Api {
            status: status.as_u16(),
            message,
        });
    }
    response
        .json()
        .await
        .map_err(|e| MediaError::Parse(e.to_string()))
}

/// `sha256("k1=v1&k2=v2" + secret)` over parameters sorted by key, hex encoded.
fn sign_params(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by_key(|(k, _)| *k);
    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let digest = Sha256::digest(format!("{to_sign}{secret}").as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> MediaClient {
        let config = CloudinaryConfig {
            cloud_name: "demo".to_owned(),
            api_key: "key123".to_owned(),
            api_secret: "shh".to_owned().into(),
        };
        MediaClient::new(&config, std::time::Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_destroy_request_is_signed_form() {
        let request = client()
            .destroy_request("electomart/products/abc", "1700000000")
            .build()
            .unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert!(request.url().as_str().ends_with("/demo/image/destroy"));
        assert_eq!(
            request.headers()[reqwest::header::CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
        let body = std::str::from_utf8(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert!(body.contains("public_id=electomart%2Fproducts%2Fabc"));
        assert!(body.contains("api_key=key123"));
        let signature = sign_params(
            &[("public_id", "electomart/products/abc"), ("timestamp", "1700000000")],
            "shh",
        );
        assert!(body.contains(&format!("signature={signature}")));
    }

    #[test]
    fn test_sign_params_sorts_keys() {
        let a = sign_params(&[("timestamp", "1700000000"), ("folder", "x")], "secret");
        let b = sign_params(&[("folder", "x"), ("timestamp", "1700000000")], "secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sign_params_depends_on_secret() {
        let params = [("public_id", "electomart/products/abc"), ("timestamp", "1")];
        assert_ne!(sign_params(&params, "one"), sign_params(&params, "two"));
    }

    #[test]
    fn test_sign_params_known_digest() {
        // sha256("a=1&b=2s")
        assert_eq!(
            sign_params(&[("b", "2"), ("a", "1")], "s"),
            "b9d014737a6137029b0d941e6dc2e469a3263824026f053fb62ebafeb021c6c7"
        );
    }
}
