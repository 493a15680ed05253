//! Product pricing invariants and order total computation.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::Money;

/// Errors from validating a product's pricing.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// A discounted product needs a discount price.
    #[error("afterDiscountPrice is required when isDiscounted is true")]
    MissingDiscountPrice,
    /// The discount price must undercut the initial price.
    #[error("afterDiscountPrice ({discounted}) must be less than initialPrice ({initial})")]
    DiscountNotLower {
        /// The list price.
        initial: Money,
        /// The rejected discount price.
        discounted: Money,
    },
    /// Tax rates outside `0..=1` are configuration mistakes.
    #[error("tax rate must be between 0 and 1")]
    InvalidTaxRate,
}

/// Validated pricing fields of a catalog product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductPricing {
    initial_price: Money,
    after_discount_price: Option<Money>,
}

impl ProductPricing {
    /// Validate pricing as submitted by an admin.
    ///
    /// When `is_discounted` is false any submitted discount price is dropped.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::MissingDiscountPrice` or
    /// `PricingError::DiscountNotLower` when the discount invariant fails.
    pub fn new(
        initial_price: Money,
        is_discounted: bool,
        after_discount_price: Option<Money>,
    ) -> Result<Self, PricingError> {
        if !is_discounted {
            return Ok(Self {
                initial_price,
                after_discount_price: None,
            });
        }

        let discounted = after_discount_price.ok_or(PricingError::MissingDiscountPrice)?;
        if discounted >= initial_price {
            return Err(PricingError::DiscountNotLower {
                initial: initial_price,
                discounted,
            });
        }

        Ok(Self {
            initial_price,
            after_discount_price: Some(discounted),
        })
    }

    /// The list price.
    #[must_use]
    pub const fn initial_price(&self) -> Money {
        self.initial_price
    }

    /// Whether a discount applies.
    #[must_use]
    pub const fn is_discounted(&self) -> bool {
        self.after_discount_price.is_some()
    }

    /// The discount price, if any.
    #[must_use]
    pub const fn after_discount_price(&self) -> Option<Money> {
        self.after_discount_price
    }

    /// The price a shopper pays per unit.
    #[must_use]
    pub fn effective_price(&self) -> Money {
        self.after_discount_price.unwrap_or(self.initial_price)
    }
}

/// Order totals frozen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub items_price: Money,
    pub shipping_price: Money,
    pub tax_price: Money,
    pub total_price: Money,
}

/// Shipping and tax rules applied at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    shipping_flat: Money,
    free_shipping_threshold: Money,
    tax_rate: Decimal,
}

impl PricingPolicy {
    /// Create a pricing policy.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::InvalidTaxRate` unless `0 <= tax_rate <= 1`.
    pub fn new(
        shipping_flat: Money,
        free_shipping_threshold: Money,
        tax_rate: Decimal,
    ) -> Result<Self, PricingError> {
        if tax_rate.is_sign_negative() || tax_rate > Decimal::ONE {
            return Err(PricingError::InvalidTaxRate);
        }
        Ok(Self {
            shipping_flat,
            free_shipping_threshold,
            tax_rate,
        })
    }

    /// Compute order totals from line subtotals.
    ///
    /// Shipping is waived once the items subtotal reaches the free-shipping
    /// threshold. Tax is charged on the items subtotal only.
    /// `total_price` is always `items + shipping + tax`.
    #[must_use]
    pub fn totals(&self, line_subtotals: impl IntoIterator<Item = Money>) -> OrderTotals {
        let items_price: Money = line_subtotals.into_iter().sum();
        let shipping_price = if items_price >= self.free_shipping_threshold {
            Money::ZERO
        } else {
            self.shipping_flat
        };
        let tax_price = items_price.apply_rate(self.tax_rate);

        OrderTotals {
            items_price,
            shipping_price,
            tax_price,
            total_price: items_price + shipping_price + tax_price,
        }
    }
}

impl Default for PricingPolicy {
    /// Rs. 100 flat shipping, free from Rs. 5000, 13% VAT.
    fn default() -> Self {
        Self {
            shipping_flat: Money::from_rupees(100),
            free_shipping_threshold: Money::from_rupees(5_000),
            tax_rate: Decimal::new(13, 2),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn rs(s: &str) -> Money {
        Money::new(Decimal::from_str(s).unwrap()).unwrap()
    }

    #[test]
    fn test_discount_must_be_strictly_lower() {
        let err = ProductPricing::new(rs("1000"), true, Some(rs("1000"))).unwrap_err();
        assert!(matches!(err, PricingError::DiscountNotLower { .. }));

        let err = ProductPricing::new(rs("1000"), true, Some(rs("1200"))).unwrap_err();
        assert!(matches!(err, PricingError::DiscountNotLower { .. }));

        let ok = ProductPricing::new(rs("1000"), true, Some(rs("999.99"))).unwrap();
        assert_eq!(ok.effective_price(), rs("999.99"));
        assert!(ok.is_discounted());
    }

    #[test]
    fn test_discount_price_required_when_discounted() {
        assert_eq!(
            ProductPricing::new(rs("1000"), true, None),
            Err(PricingError::MissingDiscountPrice)
        );
    }

    #[test]
    fn test_discount_price_ignored_when_not_discounted() {
        let pricing = ProductPricing::new(rs("1000"), false, Some(rs("2000"))).unwrap();
        assert_eq!(pricing.after_discount_price(), None);
        assert_eq!(pricing.effective_price(), rs("1000"));
    }

    #[test]
    fn test_total_is_sum_of_components() {
        let policy = PricingPolicy::default();
        let totals = policy.totals([rs("1200").times(2), rs("350")]);

        assert_eq!(totals.items_price, rs("2750"));
        assert_eq!(totals.shipping_price, rs("100"));
        assert_eq!(totals.tax_price, rs("357.50"));
        assert_eq!(
            totals.total_price,
            totals.items_price + totals.shipping_price + totals.tax_price
        );
    }

    #[test]
    fn test_free_shipping_at_threshold() {
        let policy = PricingPolicy::default();
        let totals = policy.totals([rs("5000")]);
        assert_eq!(totals.shipping_price, Money::ZERO);
        assert_eq!(totals.total_price, rs("5650"));
    }

    #[test]
    fn test_invalid_tax_rate() {
        assert_eq!(
            PricingPolicy::new(Money::ZERO, Money::ZERO, Decimal::from(2)),
            Err(PricingError::InvalidTaxRate)
        );
    }
}
