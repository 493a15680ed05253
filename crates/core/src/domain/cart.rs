//! Cart quantity reconciliation.
//!
//! A cart holds at most one line per product. Adding a product that is
//! already present increases that line's quantity instead of appending a
//! duplicate, and no line may exceed the product's stock.

use serde::Serialize;

use crate::{Money, ProductId};

/// Upper bound on a single line's quantity, independent of stock.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Errors from cart mutations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    /// Quantity to add must be positive.
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    /// Requested quantity exceeds what is in stock.
    #[error("only {available} left in stock (requested {requested})")]
    InsufficientStock {
        /// Units currently in stock.
        available: u32,
        /// Units the line would hold after the change.
        requested: u32,
    },
    /// Requested quantity exceeds the per-line cap.
    #[error("at most {MAX_LINE_QUANTITY} units per item")]
    LineLimit,
    /// The product is not in the cart.
    #[error("product {0} is not in the cart")]
    NotInCart(ProductId),
}

/// One product in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Current effective unit price of the product (discounted if applicable).
    pub unit_price: Money,
}

impl CartLine {
    /// Line subtotal.
    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Totals recomputed from a cart's lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub total_items: u32,
    pub total_price: Money,
}

/// A user's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Build a cart from stored lines.
    #[must_use]
    pub const fn from_lines(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    /// The cart lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Consume the cart, returning its lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<CartLine> {
        self.lines
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Quantity currently held for a product (0 if absent).
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.lines
            .iter()
            .find(|line| line.product_id == product_id)
            .map_or(0, |line| line.quantity)
    }

    /// Add `quantity` units of a product, merging with an existing line.
    ///
    /// Returns the line's new quantity.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ZeroQuantity` for a zero quantity,
    /// `CartError::LineLimit` above [`MAX_LINE_QUANTITY`], and
    /// `CartError::InsufficientStock` when the merged quantity exceeds `stock`.
    pub fn add_item(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
        stock: u32,
    ) -> Result<u32, CartError> {
        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }

        let merged = self
            .quantity_of(product_id)
            .checked_add(quantity)
            .ok_or(CartError::LineLimit)?;
        check_quantity(merged, stock)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity = merged;
            line.unit_price = unit_price;
        } else {
            self.lines.push(CartLine {
                product_id,
                quantity: merged,
                unit_price,
            });
        }

        Ok(merged)
    }

    /// Set a line's quantity outright. A quantity of zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the product has no line, or the same
    /// limit errors as [`Cart::add_item`].
    pub fn set_quantity(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        stock: u32,
    ) -> Result<Option<u32>, CartError> {
        let index = self
            .lines
            .iter()
            .position(|l| l.product_id == product_id)
            .ok_or(CartError::NotInCart(product_id))?;

        if quantity == 0 {
            self.lines.remove(index);
            return Ok(None);
        }

        check_quantity(quantity, stock)?;
        if let Some(line) = self.lines.get_mut(index) {
            line.quantity = quantity;
        }
        Ok(Some(quantity))
    }

    /// Remove a product's line. Returns whether a line was removed.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        self.lines.len() != before
    }

    /// Recompute totals from every line.
    #[must_use]
    pub fn summary(&self) -> CartSummary {
        CartSummary {
            total_items: self.lines.iter().map(|l| l.quantity).sum(),
            total_price: self.lines.iter().map(CartLine::subtotal).sum(),
        }
    }
}

fn check_quantity(quantity: u32, stock: u32) -> Result<(), CartError> {
    if quantity > MAX_LINE_QUANTITY {
        return Err(CartError::LineLimit);
    }
    if quantity > stock {
        return Err(CartError::InsufficientStock {
            available: stock,
            requested: quantity,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const P1: ProductId = ProductId::new(1);
    const P2: ProductId = ProductId::new(2);

    #[test]
    fn test_adding_same_product_twice_merges_quantity() {
        let mut cart = Cart::default();
        cart.add_item(P1, 2, Money::from_rupees(100), 10).unwrap();
        let qty = cart.add_item(P1, 2, Money::from_rupees(100), 10).unwrap();

        assert_eq!(qty, 4);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of(P1), 4);
    }

    #[test]
    fn test_merge_refreshes_unit_price() {
        let mut cart = Cart::default();
        cart.add_item(P1, 1, Money::from_rupees(100), 10).unwrap();
        cart.add_item(P1, 1, Money::from_rupees(80), 10).unwrap();
        assert_eq!(cart.summary().total_price, Money::from_rupees(160));
    }

    #[test]
    fn test_add_rejects_zero_and_overstock() {
        let mut cart = Cart::default();
        assert_eq!(
            cart.add_item(P1, 0, Money::ZERO, 5),
            Err(CartError::ZeroQuantity)
        );

        cart.add_item(P1, 3, Money::ZERO, 5).unwrap();
        assert_eq!(
            cart.add_item(P1, 3, Money::ZERO, 5),
            Err(CartError::InsufficientStock {
                available: 5,
                requested: 6
            })
        );
        // Failed add leaves the line untouched
        assert_eq!(cart.quantity_of(P1), 3);
    }

    #[test]
    fn test_line_limit() {
        let mut cart = Cart::default();
        assert_eq!(
            cart.add_item(P1, MAX_LINE_QUANTITY + 1, Money::ZERO, 1_000),
            Err(CartError::LineLimit)
        );
    }

    #[test]
    fn test_set_quantity_zero_removes_line() {
        let mut cart = Cart::default();
        cart.add_item(P1, 2, Money::ZERO, 5).unwrap();
        cart.add_item(P2, 1, Money::ZERO, 5).unwrap();

        assert_eq!(cart.set_quantity(P1, 0, 5).unwrap(), None);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.set_quantity(P2, 4, 5).unwrap(), Some(4));
        assert_eq!(
            cart.set_quantity(P1, 1, 5),
            Err(CartError::NotInCart(P1))
        );
    }

    #[test]
    fn test_summary_recomputes_from_all_lines() {
        let mut cart = Cart::default();
        cart.add_item(P1, 2, Money::from_rupees(250), 10).unwrap();
        cart.add_item(P2, 3, Money::from_rupees(10), 10).unwrap();

        let summary = cart.summary();
        assert_eq!(summary.total_items, 5);
        assert_eq!(summary.total_price, Money::from_rupees(530));

        assert!(cart.remove(P1));
        assert!(!cart.remove(P1));
        assert_eq!(cart.summary().total_price, Money::from_rupees(30));
    }
}
