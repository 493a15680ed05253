//! Wishlist repository.

use electomart_core::{ProductId, UserId};
use sqlx::PgPool;

use super::{ProductRepository, RepositoryError};
use crate::models::product::Product;

/// Repository for wishlist database operations.
pub struct WishlistRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> WishlistRepository<'a> {
    /// Create a new wishlist repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Saved products, most recently added first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Product>, RepositoryError> {
        let ids: Vec<ProductId> = sqlx::query_scalar(
            r"
            SELECT product_id FROM wishlist_item
            WHERE user_id = $1
            ORDER BY added_at DESC, product_id
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        ProductRepository::new(self.pool).get_many(&ids).await
    }

    /// Save a product. Adding an already-saved product is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn add(&self, user_id: UserId, product_id: ProductId) -> Result<(), RepositoryError> {
        let inserted = sqlx::query(
            r"
            INSERT INTO wishlist_item (user_id, product_id)
            SELECT $1, p.id FROM product p WHERE p.id = $2
            ON CONFLICT (user_id, product_id) DO NOTHING
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .execute(self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM product WHERE id = $1)")
                    .bind(product_id)
                    .fetch_one(self.pool)
                    .await?;
            if !exists {
                return Err(RepositoryError::NotFound);
            }
        }
        Ok(())
    }

    /// Remove a saved product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it was not saved.
    pub async fn remove(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<(), RepositoryError> {
        let removed =
            sqlx::query("DELETE FROM wishlist_item WHERE user_id = $1 AND product_id = $2")
                .bind(user_id)
                .bind(product_id)
                .execute(self.pool)
                .await?
                .rows_affected();
        if removed == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Merge a client-side wishlist, silently skipping unknown products.
    ///
    /// Returns the number of newly saved products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn merge(
        &self,
        user_id: UserId,
        product_ids: &[ProductId],
    ) -> Result<u64, RepositoryError> {
        let raw: Vec<i32> = product_ids.iter().map(ProductId::as_i32).collect();
        let inserted = sqlx::query(
            r"
            INSERT INTO wishlist_item (user_id, product_id)
            SELECT DISTINCT $1, p.id
            FROM unnest($2::int4[]) AS wanted(id)
            JOIN product p ON p.id = wanted.id
            ON CONFLICT (user_id, product_id) DO NOTHING
            ",
        )
        .bind(user_id)
        .bind(&raw)
        .execute(self.pool)
        .await?
        .rows_affected();
        Ok(inserted)
    }
}
