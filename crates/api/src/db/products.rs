//! Product repository: catalog queries and admin writes.

use std::collections::HashMap;

use electomart_core::domain::PageRequest;
use electomart_core::{ProductId, ProductImageId};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{RepositoryError, count};
use crate::models::product::{
    NewProduct, Product, ProductImage, ProductInputError, ProductQuery, ProductRow, UpdateProduct,
};

/// Errors from product edits.
#[derive(Debug, thiserror::Error)]
pub enum ProductWriteError {
    #[error("product not found")]
    NotFound,
    #[error(transparent)]
    Invalid(#[from] ProductInputError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for ProductWriteError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Unit price a shopper pays, as a SQL expression over `product p`.
const EFFECTIVE_PRICE: &str =
    "(CASE WHEN p.is_discounted THEN p.after_discount_price ELSE p.initial_price END)";

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.description, p.brand, p.category, \
     p.initial_price, p.is_discounted, p.after_discount_price, p.stock, p.rating, \
     p.num_reviews, p.created_at, p.updated_at";

/// Repository for catalog database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Search the catalog with filters, ordering and paging.
    ///
    /// Returns one page of products and the total number of matches.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(
        &self,
        query: &ProductQuery,
        page: PageRequest,
    ) -> Result<(Vec<Product>, u64), RepositoryError> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM product p");
        push_filters(&mut count_query, query);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(self.pool)
            .await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS}, {EFFECTIVE_PRICE} AS effective_price FROM product p"
        ));
        push_filters(&mut select, query);
        select.push(" ORDER BY ");
        select.push(query.sort.order_by());
        select.push(" LIMIT ");
        select.push_bind(i64::from(page.limit()));
        select.push(" OFFSET ");
        select.push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows: Vec<ProductRow> = select.build_query_as().fetch_all(self.pool).await?;
        let products = self.attach_images(rows).await?;

        Ok((products, count(total)))
    }

    /// Get a product row without images.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_row(&self, id: ProductId) -> Result<Option<ProductRow>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Get a product with its images.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let Some(row) = self.get_row(id).await? else {
            return Ok(None);
        };
        Ok(self.attach_images(vec![row]).await?.pop())
    }

    /// Fetch several products by id, keeping the order of `ids`.
    ///
    /// Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let raw: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product p WHERE p.id = ANY($1)"
        ))
        .bind(&raw)
        .fetch_all(self.pool)
        .await?;

        let mut by_id: HashMap<ProductId, Product> = self
            .attach_images(rows)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Insert a new product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO product AS p
                (name, description, brand, category, initial_price, is_discounted,
                 after_discount_price, stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.brand)
        .bind(product.category)
        .bind(product.pricing.initial_price())
        .bind(product.pricing.is_discounted())
        .bind(product.pricing.after_discount_price())
        .bind(stock_column(product.stock))
        .fetch_one(self.pool)
        .await?;

        Ok(row.with_images(Vec::new()))
    }

    /// Apply a partial edit to a product.
    ///
    /// The row is locked while the edit is merged and re-validated, and
    /// `stock` is only written when the edit sets it, so checkouts that
    /// commit in between keep their decrements.
    ///
    /// # Errors
    ///
    /// Returns `ProductWriteError::NotFound` if the product does not exist and
    /// `Invalid` if the merged product breaks a pricing rule.
    pub async fn update(
        &self,
        id: ProductId,
        changes: UpdateProduct,
    ) -> Result<Product, ProductWriteError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product p WHERE p.id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ProductWriteError::NotFound)?;

        let stock = changes.stock.map(stock_column);
        let product = changes.apply(&current)?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            UPDATE product AS p
            SET name = $2, description = $3, brand = $4, category = $5,
                initial_price = $6, is_discounted = $7, after_discount_price = $8,
                stock = COALESCE($9, p.stock), updated_at = now()
            WHERE p.id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.brand)
        .bind(product.category)
        .bind(product.pricing.initial_price())
        .bind(product.pricing.is_discounted())
        .bind(product.pricing.after_discount_price())
        .bind(stock)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.attach_images(vec![row])
            .await?
            .pop()
            .ok_or(ProductWriteError::NotFound)
    }

    /// Delete a product, returning its images so the CDN copies can be removed.
    ///
    /// Reviews, likes, cart and wishlist lines cascade; order items keep
    /// their snapshot with a null product reference.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn delete(&self, id: ProductId) -> Result<Vec<ProductImage>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let images = sqlx::query_as::<_, ProductImage>(
            "SELECT id, product_id, url, public_id FROM product_image WHERE product_id = $1",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM product WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(images)
    }

    /// Append uploaded images after the product's existing ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn add_images(
        &self,
        id: ProductId,
        uploads: &[(String, String)],
    ) -> Result<Vec<ProductImage>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let next: Option<i32> = sqlx::query_scalar(
            r"
            SELECT COALESCE(MAX(i.position) + 1, 0)
            FROM product p
            LEFT JOIN product_image i ON i.product_id = p.id
            WHERE p.id = $1
            GROUP BY p.id
            ",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let mut position = next.ok_or(RepositoryError::NotFound)?;

        let mut images = Vec::with_capacity(uploads.len());
        for (url, public_id) in uploads {
            let image = sqlx::query_as::<_, ProductImage>(
                r"
                INSERT INTO product_image (product_id, url, public_id, position)
                VALUES ($1, $2, $3, $4)
                RETURNING id, product_id, url, public_id
                ",
            )
            .bind(id)
            .bind(url)
            .bind(public_id)
            .bind(position)
            .fetch_one(&mut *tx)
            .await?;
            images.push(image);
            position += 1;
        }

        sqlx::query("UPDATE product SET updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(images)
    }

    /// Remove one image, returning it so the CDN copy can be destroyed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the image does not belong to the product.
    pub async fn remove_image(
        &self,
        id: ProductId,
        image_id: ProductImageId,
    ) -> Result<ProductImage, RepositoryError> {
        sqlx::query_as::<_, ProductImage>(
            r"
            DELETE FROM product_image
            WHERE id = $1 AND product_id = $2
            RETURNING id, product_id, url, public_id
            ",
        )
        .bind(image_id)
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Load images for a batch of rows in one query.
    async fn attach_images(&self, rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = rows.iter().map(|r| r.id.as_i32()).collect();
        let images = sqlx::query_as::<_, ProductImage>(
            r"
            SELECT id, product_id, url, public_id
            FROM product_image
            WHERE product_id = ANY($1)
            ORDER BY position, id
            ",
        )
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        let mut grouped: HashMap<ProductId, Vec<ProductImage>> = HashMap::new();
        for image in images {
            grouped.entry(image.product_id).or_default().push(image);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let images = grouped.remove(&row.id).unwrap_or_default();
                row.with_images(images)
            })
            .collect())
    }
}

/// Append `WHERE` clauses for the catalog filters.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
    builder.push(" WHERE TRUE");

    if let Some(keyword) = query.keyword() {
        let pattern = format!("%{}%", escape_like(keyword));
        builder.push(" AND (p.name ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR p.brand ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR p.description ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
    if let Some(category) = query.category {
        builder.push(" AND p.category = ");
        builder.push_bind(category);
    }
    if let Some(min) = query.min_price {
        builder.push(format!(" AND {EFFECTIVE_PRICE} >= "));
        builder.push_bind(min);
    }
    if let Some(max) = query.max_price {
        builder.push(format!(" AND {EFFECTIVE_PRICE} <= "));
        builder.push_bind(max);
    }
}

/// Escape `LIKE` wildcards so keywords match literally.
fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn stock_column(stock: u32) -> i32 {
    i32::try_from(stock).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_cotton\\"), "100\\%\\_cotton\\\\");
        assert_eq!(escape_like("iphone"), "iphone");
    }

    #[test]
    fn test_filters_sql() {
        let query = ProductQuery {
            keyword: Some("pixel".to_owned()),
            category: Some(electomart_core::ProductCategory::Smartphones),
            min_price: Some(rust_decimal::Decimal::ONE_HUNDRED),
            ..ProductQuery::default()
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM product p");
        push_filters(&mut builder, &query);
        let sql = builder.sql();

        assert!(sql.contains("p.name ILIKE $1"));
        assert!(sql.contains("p.category = $4"));
        assert!(sql.contains(">= $5"));
        assert!(!sql.contains("<="));
    }
}
