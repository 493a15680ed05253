//! Status enums for orders, payments and users.

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
///
/// The usual path is `Processing -> Shipped -> Delivered`, or
/// `Processing -> Cancelled`. Admins may set any status from any status;
/// payment state is tracked separately on the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Returns the status as its wire/database string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether a customer may still cancel an order in this state.
    ///
    /// Only unpaid orders that have not left the warehouse qualify.
    #[must_use]
    pub const fn customer_can_cancel(&self, is_paid: bool) -> bool {
        matches!(self, Self::Processing) && !is_paid
    }

    /// Whether an order in this state has its items taken out of stock.
    ///
    /// Cash-on-delivery orders hold stock from checkout, gateway orders from
    /// payment; cancelled orders hold none.
    #[must_use]
    pub const fn holds_stock(&self, method: PaymentMethod, is_paid: bool) -> bool {
        !matches!(self, Self::Cancelled) && (!method.uses_gateway() || is_paid)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash on delivery. Stock is reserved when the order is placed.
    Cod,
    /// Khalti digital wallet. Stock is reserved when payment is verified.
    Khalti,
}

impl PaymentMethod {
    /// Whether this method settles through the online payment gateway.
    #[must_use]
    pub const fn uses_gateway(&self) -> bool {
        matches!(self, Self::Khalti)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cod => write!(f, "cod"),
            Self::Khalti => write!(f, "khalti"),
        }
    }
}

/// Account role controlling access to the admin back-office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Regular shopper.
    #[default]
    User,
    /// Store administrator: manages products, orders and users.
    Admin,
}

impl UserRole {
    /// Whether this role grants admin access.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("invalid user role: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_round_trips_through_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!(" Shipped ".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("returned".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_customer_cancel_rules() {
        assert!(OrderStatus::Processing.customer_can_cancel(false));
        assert!(!OrderStatus::Processing.customer_can_cancel(true));
        assert!(!OrderStatus::Shipped.customer_can_cancel(false));
        assert!(!OrderStatus::Cancelled.customer_can_cancel(false));
    }

    #[test]
    fn test_stock_held_until_cancelled() {
        assert!(OrderStatus::Processing.holds_stock(PaymentMethod::Cod, false));
        assert!(OrderStatus::Shipped.holds_stock(PaymentMethod::Cod, true));
        assert!(!OrderStatus::Cancelled.holds_stock(PaymentMethod::Cod, false));

        assert!(!OrderStatus::Processing.holds_stock(PaymentMethod::Khalti, false));
        assert!(OrderStatus::Processing.holds_stock(PaymentMethod::Khalti, true));
        assert!(!OrderStatus::Cancelled.holds_stock(PaymentMethod::Khalti, true));
    }

    #[test]
    fn test_order_status_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Delivered).unwrap(),
            "\"delivered\""
        );
        let method: PaymentMethod = serde_json::from_str("\"khalti\"").unwrap();
        assert!(method.uses_gateway());
        assert!(!PaymentMethod::Cod.uses_gateway());
    }

    #[test]
    fn test_user_role_from_str() {
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert!("root".parse::<UserRole>().is_err());
    }
}
