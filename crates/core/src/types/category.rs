//! Product catalog categories.

use serde::{Deserialize, Serialize};

/// The fixed set of catalog categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "product_category", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Laptops,
    Smartphones,
    Tablets,
    Audio,
    Cameras,
    Gaming,
    Wearables,
    Televisions,
    Accessories,
}

impl ProductCategory {
    /// Every category, in display order.
    pub const ALL: [Self; 9] = [
        Self::Laptops,
        Self::Smartphones,
        Self::Tablets,
        Self::Audio,
        Self::Cameras,
        Self::Gaming,
        Self::Wearables,
        Self::Televisions,
        Self::Accessories,
    ];

    /// Wire/database name of the category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Laptops => "laptops",
            Self::Smartphones => "smartphones",
            Self::Tablets => "tablets",
            Self::Audio => "audio",
            Self::Cameras => "cameras",
            Self::Gaming => "gaming",
            Self::Wearables => "wearables",
            Self::Televisions => "televisions",
            Self::Accessories => "accessories",
        }
    }

    /// Human-readable name for menus and filters.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Laptops => "Laptops",
            Self::Smartphones => "Smartphones",
            Self::Tablets => "Tablets",
            Self::Audio => "Audio",
            Self::Cameras => "Cameras",
            Self::Gaming => "Gaming",
            Self::Wearables => "Wearables",
            Self::Televisions => "Televisions",
            Self::Accessories => "Accessories",
        }
    }
}

impl std::fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProductCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Laptops".parse(), Ok(ProductCategory::Laptops));
        assert!("fridges".parse::<ProductCategory>().is_err());
    }
}
