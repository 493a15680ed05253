//! Catalog products and their images.

use chrono::{DateTime, Utc};
use electomart_core::domain::{PricingError, ProductPricing};
use electomart_core::{Money, ProductCategory, ProductId, ProductImageId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A product row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub brand: String,
    pub category: ProductCategory,
    pub initial_price: Money,
    pub is_discounted: bool,
    pub after_discount_price: Option<Money>,
    pub stock: i32,
    pub rating: Decimal,
    pub num_reviews: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An image hosted on the media CDN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage {
    pub id: ProductImageId,
    #[serde(skip)]
    pub product_id: ProductId,
    pub url: String,
    pub public_id: String,
}

/// A product with its images, as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub brand: String,
    pub category: ProductCategory,
    pub initial_price: Money,
    pub is_discounted: bool,
    pub after_discount_price: Option<Money>,
    /// What a shopper pays per unit right now.
    pub price: Money,
    pub stock: i32,
    pub rating: Decimal,
    pub num_reviews: i32,
    pub images: Vec<ProductImage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRow {
    /// Unit price charged at checkout.
    #[must_use]
    pub fn effective_price(&self) -> Money {
        match self.after_discount_price {
            Some(discounted) if self.is_discounted => discounted,
            _ => self.initial_price,
        }
    }

    /// Attach images to build the client-facing product.
    #[must_use]
    pub fn with_images(self, images: Vec<ProductImage>) -> Product {
        let price = self.effective_price();
        Product {
            id: self.id,
            name: self.name,
            description: self.description,
            brand: self.brand,
            category: self.category,
            initial_price: self.initial_price,
            is_discounted: self.is_discounted,
            after_discount_price: self.after_discount_price,
            price,
            stock: self.stock,
            rating: self.rating,
            num_reviews: self.num_reviews,
            images,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Validated product fields ready to be written.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub brand: String,
    pub category: ProductCategory,
    pub pricing: ProductPricing,
    pub stock: u32,
}

/// Errors validating product input.
#[derive(Debug, thiserror::Error)]
pub enum ProductInputError {
    #[error("name is required")]
    MissingName,
    #[error(transparent)]
    Pricing(#[from] PricingError),
}

/// Body of `POST /api/products`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub brand: String,
    pub category: ProductCategory,
    pub initial_price: Money,
    #[serde(default)]
    pub is_discounted: bool,
    #[serde(default)]
    pub after_discount_price: Option<Money>,
    #[serde(default)]
    pub stock: u32,
}

impl CreateProduct {
    /// Validate the name and pricing invariants.
    ///
    /// # Errors
    ///
    /// Returns `ProductInputError` for a blank name or a discount that does
    /// not undercut the initial price.
    pub fn validate(self) -> Result<NewProduct, ProductInputError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(ProductInputError::MissingName);
        }
        let pricing = ProductPricing::new(
            self.initial_price,
            self.is_discounted,
            self.after_discount_price,
        )?;

        Ok(NewProduct {
            name,
            description: self.description.trim().to_owned(),
            brand: self.brand.trim().to_owned(),
            category: self.category,
            pricing,
            stock: self.stock,
        })
    }
}

/// Body of `PUT /api/products/{id}`; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub category: Option<ProductCategory>,
    pub initial_price: Option<Money>,
    pub is_discounted: Option<bool>,
    pub after_discount_price: Option<Money>,
    pub stock: Option<u32>,
}

impl UpdateProduct {
    /// Merge onto the stored product and re-validate the result.
    ///
    /// # Errors
    ///
    /// Returns `ProductInputError` if the merged product is invalid.
    pub fn apply(self, current: &ProductRow) -> Result<NewProduct, ProductInputError> {
        let stock = u32::try_from(current.stock).unwrap_or(0);
        CreateProduct {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            description: self
                .description
                .unwrap_or_else(|| current.description.clone()),
            brand: self.brand.unwrap_or_else(|| current.brand.clone()),
            category: self.category.unwrap_or(current.category),
            initial_price: self.initial_price.unwrap_or(current.initial_price),
            is_discounted: self.is_discounted.unwrap_or(current.is_discounted),
            after_discount_price: self.after_discount_price.or(current.after_discount_price),
            stock: self.stock.unwrap_or(stock),
        }
        .validate()
    }
}

/// Catalog ordering for `GET /api/products`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Rating,
}

impl ProductSort {
    /// SQL `ORDER BY` clause; always ends on `id` so paging is stable.
    #[must_use]
    pub const fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "p.created_at DESC, p.id DESC",
            Self::PriceAsc => "effective_price ASC, p.id ASC",
            Self::PriceDesc => "effective_price DESC, p.id DESC",
            Self::Rating => "p.rating DESC, p.num_reviews DESC, p.id DESC",
        }
    }
}

/// Query string of `GET /api/products`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub keyword: Option<String>,
    pub category: Option<ProductCategory>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub sort: ProductSort,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ProductQuery {
    /// Trimmed keyword, `None` when blank.
    #[must_use]
    pub fn keyword(&self) -> Option<&str> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// Response of `GET /api/products`.
#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub page: u32,
    pub pages: u64,
    pub total: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row() -> ProductRow {
        ProductRow {
            id: ProductId::new(1),
            name: "Galaxy S24".to_owned(),
            description: String::new(),
            brand: "Samsung".to_owned(),
            category: ProductCategory::Smartphones,
            initial_price: Money::from_rupees(120_000),
            is_discounted: true,
            after_discount_price: Some(Money::from_rupees(110_000)),
            stock: 5,
            rating: Decimal::ZERO,
            num_reviews: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_effective_price_uses_discount() {
        assert_eq!(row().effective_price(), Money::from_rupees(110_000));
        let mut r = row();
        r.is_discounted = false;
        assert_eq!(r.effective_price(), Money::from_rupees(120_000));
    }

    #[test]
    fn test_create_rejects_discount_not_lower() {
        let input = CreateProduct {
            name: "Pixel 9".to_owned(),
            description: String::new(),
            brand: "Google".to_owned(),
            category: ProductCategory::Smartphones,
            initial_price: Money::from_rupees(100),
            is_discounted: true,
            after_discount_price: Some(Money::from_rupees(100)),
            stock: 1,
        };
        assert!(matches!(
            input.validate(),
            Err(ProductInputError::Pricing(PricingError::DiscountNotLower { .. }))
        ));
    }

    #[test]
    fn test_create_rejects_blank_name() {
        let input: CreateProduct = serde_json::from_value(serde_json::json!({
            "name": "   ",
            "category": "audio",
            "initialPrice": 10
        }))
        .unwrap();
        assert!(matches!(input.validate(), Err(ProductInputError::MissingName)));
    }

    #[test]
    fn test_update_revalidates_merged_pricing() {
        let patch = UpdateProduct {
            initial_price: Some(Money::from_rupees(100_000)),
            ..UpdateProduct::default()
        };
        // Stored discount of 110k is no longer below the new 100k list price.
        assert!(patch.apply(&row()).is_err());

        let patch = UpdateProduct {
            is_discounted: Some(false),
            ..UpdateProduct::default()
        };
        let merged = patch.apply(&row()).unwrap();
        assert!(!merged.pricing.is_discounted());
        assert_eq!(merged.stock, 5);
    }

    #[test]
    fn test_query_keyword_trims_blank() {
        let q = ProductQuery {
            keyword: Some("  ".to_owned()),
            ..ProductQuery::default()
        };
        assert_eq!(q.keyword(), None);
    }

    #[test]
    fn test_sort_deserializes_camel_case() {
        let sort: ProductSort = serde_json::from_str("\"priceDesc\"").unwrap();
        assert_eq!(sort, ProductSort::PriceDesc);
    }
}
