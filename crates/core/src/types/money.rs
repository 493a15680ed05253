//! Monetary amounts in Nepalese rupees.
//!
//! All prices in the catalog, carts and orders are rupee amounts held as
//! [`Decimal`] with two fractional digits. The payment gateway works in
//! paisa (1/100 rupee); [`Money::to_paisa`] is the only conversion point.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors produced by money conversions.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Amount is negative where only non-negative amounts make sense.
    #[error("amount cannot be negative")]
    Negative,
    /// Amount does not fit the target representation.
    #[error("amount out of range")]
    OutOfRange,
}

/// A non-negative rupee amount rounded to two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Zero rupees.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a money amount, rounding half-up to two decimal places.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Negative` for amounts below zero.
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        Ok(Self(round2(amount)))
    }

    /// Create a money amount from whole rupees.
    #[must_use]
    pub fn from_rupees(rupees: u32) -> Self {
        Self(Decimal::from(rupees))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Multiply a unit price by a quantity.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(round2(self.0 * Decimal::from(quantity)))
    }

    /// Apply a rate (e.g. a tax rate of `0.13`), rounding to two places.
    #[must_use]
    pub fn apply_rate(self, rate: Decimal) -> Self {
        Self(round2(self.0 * rate).max(Decimal::ZERO))
    }

    /// Convert to paisa for the payment gateway.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::OutOfRange` if the amount does not fit an `i64`.
    pub fn to_paisa(self) -> Result<i64, MoneyError> {
        (self.0 * Decimal::ONE_HUNDRED)
            .round()
            .to_i64()
            .ok_or(MoneyError::OutOfRange)
    }

    /// Whether this amount is exactly zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rs. {:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(amount))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
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
    fn test_new_rounds_to_two_places() {
        assert_eq!(rs("10.005").amount(), Decimal::from_str("10.01").unwrap());
        assert_eq!(rs("10.004").amount(), Decimal::from_str("10.00").unwrap());
    }

    #[test]
    fn test_negative_rejected() {
        assert_eq!(
            Money::new(Decimal::from_str("-0.01").unwrap()),
            Err(MoneyError::Negative)
        );
    }

    #[test]
    fn test_times_and_sum() {
        let total: Money = [rs("199.99").times(2), rs("0.02")].into_iter().sum();
        assert_eq!(total, rs("400.00"));
    }

    #[test]
    fn test_to_paisa() {
        assert_eq!(rs("1234.56").to_paisa().unwrap(), 123_456);
        assert_eq!(Money::ZERO.to_paisa().unwrap(), 0);
    }

    #[test]
    fn test_serializes_as_number() {
        assert_eq!(serde_json::to_string(&rs("99.5")).unwrap(), "99.5");
    }

    #[test]
    fn test_deserialize_rejects_negative() {
        assert!(serde_json::from_str::<Money>("-5").is_err());
        assert_eq!(serde_json::from_str::<Money>("12.5").unwrap(), rs("12.50"));
    }
}
