//! Cart and wishlist responses.

use electomart_core::domain::{Cart, CartLine, CartSummary};
use electomart_core::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::db::{RepositoryError, non_negative};

/// A cart line joined with live product data.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartLineRow {
    pub product_id: ProductId,
    pub quantity: i32,
    pub name: String,
    pub image: Option<String>,
    pub price: Money,
    pub stock: i32,
}

/// Product fields shown next to a cart line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    pub image: Option<String>,
    pub price: Money,
    pub stock: u32,
}

/// One cart line as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemView {
    pub product: CartProduct,
    pub quantity: u32,
    pub subtotal: Money,
}

/// The caller's cart with totals recomputed from the lines.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartItemView>,
    #[serde(flatten)]
    pub summary: CartSummary,
}

impl CartView {
    /// Build the view, recomputing totals with current prices.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DataCorruption` for negative quantities or stock.
    pub fn from_rows(rows: Vec<CartLineRow>) -> Result<Self, RepositoryError> {
        let mut lines = Vec::with_capacity(rows.len());
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let quantity = non_negative(row.quantity, "cart quantity")?;
            let line = CartLine {
                product_id: row.product_id,
                quantity,
                unit_price: row.price,
            };
            items.push(CartItemView {
                subtotal: line.subtotal(),
                product: CartProduct {
                    id: row.product_id,
                    name: row.name,
                    image: row.image,
                    price: row.price,
                    stock: non_negative(row.stock, "stock")?,
                },
                quantity,
            });
            lines.push(line);
        }

        Ok(Self {
            items,
            summary: Cart::from_lines(lines).summary(),
        })
    }
}

/// Body of `POST /api/cart`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCart {
    pub product_id: ProductId,
    #[serde(default = "one")]
    pub quantity: u32,
}

const fn one() -> u32 {
    1
}

/// Body of `PUT /api/cart/{productId}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SetQuantity {
    pub quantity: u32,
}

/// Body of `POST /api/wishlist`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistAdd {
    pub product_id: ProductId,
}

/// Body of `POST /api/wishlist/merge`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistMerge {
    pub product_ids: Vec<ProductId>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(id: i32, quantity: i32, price: u32) -> CartLineRow {
        CartLineRow {
            product_id: ProductId::new(id),
            quantity,
            name: format!("Product {id}"),
            image: None,
            price: Money::from_rupees(price),
            stock: 10,
        }
    }

    #[test]
    fn test_totals_recomputed_from_lines() {
        let view = CartView::from_rows(vec![line(1, 2, 500), line(2, 1, 1200)]).unwrap();
        assert_eq!(view.summary.total_items, 3);
        assert_eq!(view.summary.total_price, Money::from_rupees(2200));
        assert_eq!(view.items[0].subtotal, Money::from_rupees(1000));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["totalItems"], 3);
        assert!(json["items"].is_array());
    }

    #[test]
    fn test_empty_cart() {
        let view = CartView::from_rows(Vec::new()).unwrap();
        assert_eq!(view.summary.total_items, 0);
        assert!(view.summary.total_price.is_zero());
    }

    #[test]
    fn test_negative_quantity_is_corruption() {
        assert!(CartView::from_rows(vec![line(1, -1, 10)]).is_err());
    }

    #[test]
    fn test_add_defaults_to_one() {
        let body: AddToCart = serde_json::from_str(r#"{"productId": 4}"#).unwrap();
        assert_eq!(body.quantity, 1);
        assert_eq!(body.product_id, ProductId::new(4));
    }
}
