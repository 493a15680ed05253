//! Admin product management. Skipped unless an admin account is configured.

#![allow(clippy::unwrap_used)]

use electomart_integration_tests::{TestContext, expect_error};
use reqwest::StatusCode;
use serde_json::{Value, json};

#[tokio::test]
#[ignore = "Requires running API server and admin credentials"]
async fn test_product_lifecycle() {
    let Some(admin) = TestContext::admin().await else {
        return;
    };

    let resp = admin
        .post("/api/products")
        .json(&json!({
            "name": format!("Test Cable {}", uuid::Uuid::new_v4().simple()),
            "category": "accessories",
            "initialPrice": 900,
            "isDiscounted": true,
            "afterDiscountPrice": 750,
            "stock": 3
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let product: Value = resp.json().await.unwrap();
    assert_eq!(product["price"], 750.0);

    let path = format!("/api/products/{}", product["id"]);
    let updated: Value = admin
        .put(&path)
        .json(&json!({ "isDiscounted": false }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["price"], 900.0);

    let resp = admin.delete(&path).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = admin.get(&path).send().await.unwrap();
    expect_error(resp, StatusCode::NOT_FOUND, "NOT_FOUND").await;
}

#[tokio::test]
#[ignore = "Requires running API server and admin credentials"]
async fn test_discount_must_undercut_price() {
    let Some(admin) = TestContext::admin().await else {
        return;
    };

    let resp = admin
        .post("/api/products")
        .json(&json!({
            "name": "Overpriced Discount",
            "category": "accessories",
            "initialPrice": 500,
            "isDiscounted": true,
            "afterDiscountPrice": 600
        }))
        .send()
        .await
        .unwrap();
    expect_error(resp, StatusCode::BAD_REQUEST, "VALIDATION_ERROR").await;
}

#[tokio::test]
#[ignore = "Requires running API server and admin credentials"]
async fn test_order_stats() {
    let Some(admin) = TestContext::admin().await else {
        return;
    };

    let resp = admin.get("/api/orders/stats").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let stats: Value = resp.json().await.unwrap();
    assert!(stats.is_object());
}
