//! Orders and their snapshot line items.

use chrono::{DateTime, Utc};
use electomart_core::domain::{OrderTotals, ShippingAddress};
use electomart_core::{Money, OrderId, OrderStatus, PaymentMethod, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// An order row with flattened shipping columns.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub ship_full_name: String,
    pub ship_phone: String,
    pub ship_address: String,
    pub ship_city: String,
    pub ship_postal_code: Option<String>,
    pub ship_country: String,
    pub payment_method: PaymentMethod,
    pub payment_ref: Option<String>,
    pub items_price: Money,
    pub shipping_price: Money,
    pub tax_price: Money,
    pub total_price: Money,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub order_status: OrderStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line item frozen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(skip)]
    pub order_id: OrderId,
    /// `None` once the product has been deleted from the catalog.
    pub product_id: Option<ProductId>,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: Money,
    pub quantity: i32,
}

/// An order as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    /// Gateway payment reference (Khalti `pidx`).
    pub payment_ref: Option<String>,
    #[serde(flatten)]
    pub totals: OrderTotals,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub order_status: OrderStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    /// Whether `user_id` placed this order.
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == Some(user_id)
    }

    /// Attach items to build the client-facing order.
    #[must_use]
    pub fn with_items(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            user_id: self.user_id,
            items,
            shipping_address: ShippingAddress {
                full_name: self.ship_full_name,
                phone: self.ship_phone,
                address: self.ship_address,
                city: self.ship_city,
                postal_code: self.ship_postal_code,
                country: self.ship_country,
            },
            payment_method: self.payment_method,
            payment_ref: self.payment_ref,
            totals: OrderTotals {
                items_price: self.items_price,
                shipping_price: self.shipping_price,
                tax_price: self.tax_price,
                total_price: self.total_price,
            },
            is_paid: self.is_paid,
            paid_at: self.paid_at,
            order_status: self.order_status,
            delivered_at: self.delivered_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

/// Body of `PUT /api/orders/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderStatus {
    pub status: OrderStatus,
}

/// Query string of the admin order list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Response of the paginated admin order list.
#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub page: u32,
    pub pages: u64,
    pub total: u64,
}

/// Dashboard figures for `GET /api/orders/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total_orders: i64,
    pub paid_orders: i64,
    /// Sum of `totalPrice` over paid orders.
    pub total_revenue: Money,
    pub processing: i64,
    pub shipped: i64,
    pub delivered: i64,
    pub cancelled: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row() -> OrderRow {
        OrderRow {
            id: OrderId::new(10),
            user_id: Some(UserId::new(2)),
            ship_full_name: "Ram Thapa".to_owned(),
            ship_phone: "9800000000".to_owned(),
            ship_address: "Baneshwor".to_owned(),
            ship_city: "Kathmandu".to_owned(),
            ship_postal_code: None,
            ship_country: "Nepal".to_owned(),
            payment_method: PaymentMethod::Khalti,
            payment_ref: None,
            items_price: Money::from_rupees(1000),
            shipping_price: Money::from_rupees(100),
            tax_price: Money::from_rupees(130),
            total_price: Money::from_rupees(1230),
            is_paid: false,
            paid_at: None,
            order_status: OrderStatus::Processing,
            delivered_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_ownership() {
        let order = row();
        assert!(order.is_owned_by(UserId::new(2)));
        assert!(!order.is_owned_by(UserId::new(3)));
    }

    #[test]
    fn test_order_json_flattens_totals() {
        let json = serde_json::to_value(row().with_items(Vec::new())).unwrap();
        assert_eq!(json["totalPrice"], 1230.0);
        assert_eq!(json["shippingAddress"]["city"], "Kathmandu");
        assert_eq!(json["orderStatus"], "processing");
        assert_eq!(json["paymentMethod"], "khalti");
    }

    #[test]
    fn test_create_order_body() {
        let body: CreateOrder = serde_json::from_value(serde_json::json!({
            "shippingAddress": {
                "fullName": "Ram Thapa",
                "phone": "9800000000",
                "address": "Baneshwor",
                "city": "Kathmandu"
            },
            "paymentMethod": "cod"
        }))
        .unwrap();
        assert_eq!(body.payment_method, PaymentMethod::Cod);
        assert_eq!(body.shipping_address.country, "Nepal");
    }
}
