//! Stock bookkeeping across checkout, payment, cancellation and admin edits,
//! driven through the repositories against a migrated database.

#![allow(clippy::unwrap_used)]

use electomart_api::db::{
    CartRepository, OrderRepository, OrderWriteError, ProductRepository, UserRepository,
    create_pool,
};
use electomart_api::models::order::Order;
use electomart_api::models::product::{CreateProduct, UpdateProduct};
use electomart_core::domain::{PricingPolicy, ShippingAddress};
use electomart_core::{Email, Money, OrderStatus, PaymentMethod, ProductCategory, ProductId, UserId};
use secrecy::SecretString;
use sqlx::PgPool;
use uuid::Uuid;

async fn pool() -> PgPool {
    let url = std::env::var("ELECTOMART_TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .unwrap();
    create_pool(&SecretString::from(url)).await.unwrap()
}

async fn shopper(pool: &PgPool) -> UserId {
    let email = Email::parse(&format!("stock-{}@example.com", Uuid::new_v4().simple())).unwrap();
    UserRepository::new(pool)
        .create("Stock Shopper", &email, "not-a-real-hash")
        .await
        .unwrap()
        .id
}

async fn product(pool: &PgPool, stock: u32) -> ProductId {
    let new = CreateProduct {
        name: format!("Stock test {}", Uuid::new_v4().simple()),
        description: String::new(),
        brand: "Test".to_owned(),
        category: ProductCategory::Laptops,
        initial_price: Money::from_rupees(1000),
        is_discounted: false,
        after_discount_price: None,
        stock,
    }
    .validate()
    .unwrap();
    ProductRepository::new(pool).create(&new).await.unwrap().id
}

async fn stock_of(pool: &PgPool, id: ProductId) -> i32 {
    ProductRepository::new(pool).get(id).await.unwrap().unwrap().stock
}

async fn place_order(
    pool: &PgPool,
    user: UserId,
    lines: &[(ProductId, u32)],
    method: PaymentMethod,
) -> Order {
    let carts = CartRepository::new(pool);
    for &(id, quantity) in lines {
        carts.add(user, id, quantity).await.unwrap();
    }
    let address = ShippingAddress {
        full_name: "Stock Shopper".to_owned(),
        phone: "9800000000".to_owned(),
        address: "New Road 12".to_owned(),
        city: "Kathmandu".to_owned(),
        postal_code: None,
        country: "Nepal".to_owned(),
    };
    OrderRepository::new(pool)
        .create_from_cart(user, &address, method, &PricingPolicy::default())
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "Requires a migrated database"]
async fn test_rename_keeps_stock_sold_since_read() {
    let pool = pool().await;
    let item = product(&pool, 10).await;
    let user = shopper(&pool).await;

    place_order(&pool, user, &[(item, 4)], PaymentMethod::Cod).await;
    assert_eq!(stock_of(&pool, item).await, 6);

    let renamed = ProductRepository::new(&pool)
        .update(
            item,
            UpdateProduct {
                name: Some("Renamed laptop".to_owned()),
                ..UpdateProduct::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Renamed laptop");
    assert_eq!(renamed.stock, 6);
    assert_eq!(stock_of(&pool, item).await, 6);
}

#[tokio::test]
#[ignore = "Requires a migrated database"]
async fn test_admin_cancel_returns_cod_stock() {
    let pool = pool().await;
    let item = product(&pool, 10).await;
    let user = shopper(&pool).await;
    let orders = OrderRepository::new(&pool);

    let order = place_order(&pool, user, &[(item, 3)], PaymentMethod::Cod).await;
    assert_eq!(stock_of(&pool, item).await, 7);

    let cancelled = orders
        .update_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.order_status, OrderStatus::Cancelled);
    assert_eq!(stock_of(&pool, item).await, 10);

    // Cancelling twice must not release twice
    orders
        .update_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(stock_of(&pool, item).await, 10);

    orders
        .update_status(order.id, OrderStatus::Shipped)
        .await
        .unwrap();
    assert_eq!(stock_of(&pool, item).await, 7);
}

#[tokio::test]
#[ignore = "Requires a migrated database"]
async fn test_admin_cancel_returns_paid_khalti_stock() {
    let pool = pool().await;
    let item = product(&pool, 5).await;
    let user = shopper(&pool).await;
    let orders = OrderRepository::new(&pool);

    let order = place_order(&pool, user, &[(item, 2)], PaymentMethod::Khalti).await;
    assert_eq!(stock_of(&pool, item).await, 5);

    let pidx = Uuid::new_v4().simple().to_string();
    orders.set_payment_ref(order.id, &pidx).await.unwrap();
    orders.confirm_payment(order.id, &pidx).await.unwrap();
    assert_eq!(stock_of(&pool, item).await, 3);

    orders
        .update_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(stock_of(&pool, item).await, 5);
}

#[tokio::test]
#[ignore = "Requires a migrated database"]
async fn test_admin_cancel_of_unpaid_khalti_leaves_stock() {
    let pool = pool().await;
    let item = product(&pool, 5).await;
    let user = shopper(&pool).await;

    let order = place_order(&pool, user, &[(item, 2)], PaymentMethod::Khalti).await;
    OrderRepository::new(&pool)
        .update_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(stock_of(&pool, item).await, 5);
}

#[tokio::test]
#[ignore = "Requires a migrated database"]
async fn test_payment_shortfall_decrements_nothing() {
    let pool = pool().await;
    let plenty = product(&pool, 5).await;
    let scarce = product(&pool, 5).await;
    let user = shopper(&pool).await;
    let orders = OrderRepository::new(&pool);

    let order = place_order(
        &pool,
        user,
        &[(plenty, 2), (scarce, 3)],
        PaymentMethod::Khalti,
    )
    .await;

    // Someone else bought most of it before the payment came back
    ProductRepository::new(&pool)
        .update(
            scarce,
            UpdateProduct {
                stock: Some(1),
                ..UpdateProduct::default()
            },
        )
        .await
        .unwrap();

    let pidx = Uuid::new_v4().simple().to_string();
    orders.set_payment_ref(order.id, &pidx).await.unwrap();
    let result = orders.confirm_payment(order.id, &pidx).await;
    assert!(
        matches!(result, Err(OrderWriteError::InsufficientStock { .. })),
        "got {result:?}"
    );

    assert_eq!(stock_of(&pool, plenty).await, 5);
    assert_eq!(stock_of(&pool, scarce).await, 1);
    let stored = orders.get(order.id).await.unwrap().unwrap();
    assert!(!stored.is_paid);
    assert!(stored.paid_at.is_none());
}

#[tokio::test]
#[ignore = "Requires a migrated database"]
async fn test_repeated_confirmation_decrements_once() {
    let pool = pool().await;
    let item = product(&pool, 5).await;
    let user = shopper(&pool).await;
    let orders = OrderRepository::new(&pool);

    let order = place_order(&pool, user, &[(item, 2)], PaymentMethod::Khalti).await;
    let pidx = Uuid::new_v4().simple().to_string();
    orders.set_payment_ref(order.id, &pidx).await.unwrap();

    let (first, changed) = orders.confirm_payment(order.id, &pidx).await.unwrap();
    assert!(changed);
    assert!(first.is_paid);
    assert_eq!(stock_of(&pool, item).await, 3);

    let (second, changed) = orders.confirm_payment(order.id, &pidx).await.unwrap();
    assert!(!changed);
    assert!(second.is_paid);
    assert_eq!(second.paid_at, first.paid_at);
    assert_eq!(stock_of(&pool, item).await, 3);
}
