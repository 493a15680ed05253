//! Checkout input validation and order line snapshots.

use serde::{Deserialize, Serialize};

use crate::{Money, ProductId};

/// Errors validating a shipping address.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// A required field is blank.
    #[error("{0} is required")]
    Missing(&'static str),
    /// The phone number is not 7-15 digits (optionally with a leading +).
    #[error("phone number is invalid")]
    InvalidPhone,
}

/// Where an order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "Nepal".to_owned()
}

impl ShippingAddress {
    /// Trim every field and check required ones.
    ///
    /// # Errors
    ///
    /// Returns the first `AddressError` encountered.
    pub fn normalized(self) -> Result<Self, AddressError> {
        let required = |value: String, name: &'static str| {
            let value = value.trim().to_owned();
            if value.is_empty() {
                Err(AddressError::Missing(name))
            } else {
                Ok(value)
            }
        };

        let full_name = required(self.full_name, "fullName")?;
        let phone = required(self.phone, "phone")?;
        let digits = phone.strip_prefix('+').unwrap_or(&phone);
        if !(7..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AddressError::InvalidPhone);
        }

        Ok(Self {
            full_name,
            phone,
            address: required(self.address, "address")?,
            city: required(self.city, "city")?,
            postal_code: self
                .postal_code
                .map(|p| p.trim().to_owned())
                .filter(|p| !p.is_empty()),
            country: required(self.country, "country")?,
        })
    }
}

/// A product snapshot taken when the order is placed.
///
/// Name, price and image are copied so later catalog edits never change a
/// past order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderLine {
    /// Line subtotal.
    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "  Hari Bahadur ".into(),
            phone: "+9779812345678".into(),
            address: "New Road".into(),
            city: "Kathmandu".into(),
            postal_code: Some("   ".into()),
            country: "Nepal".into(),
        }
    }

    #[test]
    fn test_normalized_trims_and_drops_blank_postal_code() {
        let addr = address().normalized().unwrap();
        assert_eq!(addr.full_name, "Hari Bahadur");
        assert_eq!(addr.postal_code, None);
    }

    #[test]
    fn test_missing_field() {
        let mut addr = address();
        addr.city = "  ".into();
        assert_eq!(addr.normalized(), Err(AddressError::Missing("city")));
    }

    #[test]
    fn test_invalid_phone() {
        let mut addr = address();
        addr.phone = "98-123".into();
        assert_eq!(addr.normalized(), Err(AddressError::InvalidPhone));
    }

    #[test]
    fn test_country_defaults_to_nepal() {
        let addr: ShippingAddress = serde_json::from_str(
            r#"{"fullName":"A","phone":"9812345678","address":"B","city":"Pokhara"}"#,
        )
        .unwrap();
        assert_eq!(addr.country, "Nepal");
    }

    #[test]
    fn test_line_subtotal() {
        let line = OrderLine {
            product_id: ProductId::new(1),
            name: "Earbuds".into(),
            image: None,
            unit_price: Money::from_rupees(1_500),
            quantity: 3,
        };
        assert_eq!(line.subtotal(), Money::from_rupees(4_500));
    }
}
