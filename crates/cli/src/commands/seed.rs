//! Seed the catalog with demo products.
//!
//! Reads products from a YAML file, validates them with the same rules the
//! API applies, and inserts any whose name is not already in the catalog.
//! Running the command twice is harmless.

use std::path::Path;

use electomart_api::db::{self, ProductRepository};
use electomart_api::models::product::CreateProduct;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{error, info};

/// Top-level YAML document.
#[derive(Debug, Deserialize)]
pub struct SeedCatalog {
    pub products: Vec<SeedProduct>,
}

/// One product entry; the same fields `POST /api/products` accepts plus
/// image URLs hosted elsewhere.
#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    #[serde(flatten)]
    pub product: CreateProduct,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Counts reported after seeding.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub inserted: usize,
    pub skipped: usize,
}

/// Parse and validate a catalog without touching the database.
///
/// Returns one message per invalid entry.
pub fn validate_catalog(catalog: &SeedCatalog) -> Vec<String> {
    catalog
        .products
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            entry
                .product
                .clone()
                .validate()
                .err()
                .map(|e| format!("product #{} ({}): {e}", index + 1, entry.product.name))
        })
        .collect()
}

/// Seed products from a YAML file.
///
/// # Arguments
///
/// * `file_path` - Path to the YAML catalog
/// * `clear_existing` - If true, delete every product first
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, any entry is
/// invalid, or a database operation fails.
pub async fn catalog(file_path: &str, clear_existing: bool) -> Result<(), Box<dyn std::error::Error>> {
    let database_url = super::database_url().map_err(|var| format!("{var} not set"))?;

    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let catalog: SeedCatalog = serde_yaml::from_str(&content)?;

    info!(products = catalog.products.len(), "Parsed catalog");

    let errors = validate_catalog(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    if clear_existing {
        let deleted = sqlx::query("DELETE FROM product")
            .execute(&pool)
            .await?
            .rows_affected();
        info!(deleted, "Cleared existing products");
    }

    let summary = insert_products(&pool, catalog).await?;

    info!("Seeding complete!");
    info!("  Products inserted: {}", summary.inserted);
    info!("  Products skipped (already exist): {}", summary.skipped);
    Ok(())
}

async fn insert_products(
    pool: &PgPool,
    catalog: SeedCatalog,
) -> Result<SeedSummary, Box<dyn std::error::Error>> {
    let repo = ProductRepository::new(pool);
    let mut summary = SeedSummary::default();

    for entry in catalog.products {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM product WHERE lower(name) = lower($1))")
                .bind(entry.product.name.trim())
                .fetch_one(pool)
                .await?;
        if exists {
            summary.skipped += 1;
            continue;
        }

        let product = repo.create(&entry.product.validate()?).await?;
        if !entry.images.is_empty() {
            // Externally hosted images have no CDN public id
            let images: Vec<(String, String)> = entry
                .images
                .into_iter()
                .map(|url| (url, String::new()))
                .collect();
            repo.add_images(product.id, &images).await?;
        }

        info!(id = %product.id, name = %product.name, "Inserted product");
        summary.inserted += 1;
    }

    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
products:
  - name: ThinkPad X1 Carbon
    brand: Lenovo
    category: laptops
    initialPrice: 245000
    stock: 4
    images:
      - https://images.example.com/x1.jpg
  - name: Galaxy Buds
    category: audio
    initialPrice: 18000
    isDiscounted: true
    afterDiscountPrice: 20000
";

    #[test]
    fn test_parse_catalog() {
        let catalog: SeedCatalog = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(catalog.products.len(), 2);
        assert_eq!(catalog.products[0].images.len(), 1);
        assert_eq!(catalog.products[0].product.stock, 4);
        assert!(catalog.products[1].images.is_empty());
    }

    #[test]
    fn test_validation_flags_bad_discount() {
        let catalog: SeedCatalog = serde_yaml::from_str(SAMPLE).unwrap();
        let errors = validate_catalog(&catalog);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Galaxy Buds"));
    }

    #[test]
    fn test_bundled_catalog_is_valid() {
        let content = include_str!("../../data/catalog.yaml");
        let catalog: SeedCatalog = serde_yaml::from_str(content).unwrap();
        assert!(!catalog.products.is_empty());
        assert!(validate_catalog(&catalog).is_empty());
    }
}
