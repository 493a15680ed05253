//! Cart repository.
//!
//! Each user has at most one line per product. Mutations lock the owning
//! `app_user` row so concurrent adds from two tabs merge instead of racing.

use electomart_core::domain::{Cart, CartError, CartLine};
use electomart_core::{Money, ProductId, UserId};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;

use super::{RepositoryError, non_negative};
use crate::models::cart::{CartLineRow, CartView};

/// Errors from cart writes.
#[derive(Debug, Error)]
pub enum CartWriteError {
    #[error("product not found")]
    ProductNotFound,
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for CartWriteError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load the user's cart with current prices.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, user_id: UserId) -> Result<CartView, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_cart(&mut conn, user_id).await
    }

    /// Add `quantity` of a product, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Returns `CartWriteError::Cart` when the merged quantity exceeds the
    /// stock or the per-line limit.
    pub async fn add(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartView, CartWriteError> {
        let mut tx = self.pool.begin().await?;
        lock_owner(&mut tx, user_id).await?;

        let (price, stock) = product_price_and_stock(&mut tx, product_id).await?;
        let mut cart = current_line(&mut tx, user_id, product_id, price).await?;
        let merged = cart.add_item(product_id, quantity, price, stock)?;

        sqlx::query(
            r"
            INSERT INTO cart_item (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity_column(merged))
        .execute(&mut *tx)
        .await?;

        let view = load_cart(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Set a line's quantity; zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartWriteError::Cart(CartError::NotInCart)` if the product is
    /// not in the cart, or a stock/limit error.
    pub async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartView, CartWriteError> {
        let mut tx = self.pool.begin().await?;
        lock_owner(&mut tx, user_id).await?;

        let (price, stock) = product_price_and_stock(&mut tx, product_id).await?;
        let mut cart = current_line(&mut tx, user_id, product_id, price).await?;

        match cart.set_quantity(product_id, quantity, stock)? {
            Some(quantity) => {
                sqlx::query(
                    "UPDATE cart_item SET quantity = $3 WHERE user_id = $1 AND product_id = $2",
                )
                .bind(user_id)
                .bind(product_id)
                .bind(quantity_column(quantity))
                .execute(&mut *tx)
                .await?;
            }
            None => delete_line(&mut tx, user_id, product_id).await?,
        }

        let view = load_cart(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Remove a product from the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartWriteError::Cart(CartError::NotInCart)` if it was not there.
    pub async fn remove(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<CartView, CartWriteError> {
        let mut tx = self.pool.begin().await?;
        lock_owner(&mut tx, user_id).await?;

        let removed = sqlx::query("DELETE FROM cart_item WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(CartError::NotInCart(product_id).into());
        }

        let view = load_cart(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn clear(&self, user_id: UserId) -> Result<CartView, RepositoryError> {
        sqlx::query("DELETE FROM cart_item WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(CartView::from_rows(Vec::new())?)
    }
}

/// Cart lines joined with live product data, oldest first.
pub(crate) async fn load_cart_rows(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Vec<CartLineRow>, RepositoryError> {
    let rows = sqlx::query_as::<_, CartLineRow>(
        r"
        SELECT c.product_id, c.quantity, p.name, p.stock,
               CASE WHEN p.is_discounted THEN p.after_discount_price ELSE p.initial_price END
                   AS price,
               (SELECT i.url FROM product_image i
                WHERE i.product_id = p.id
                ORDER BY i.position, i.id
                LIMIT 1) AS image
        FROM cart_item c
        JOIN product p ON p.id = c.product_id
        WHERE c.user_id = $1
        ORDER BY c.added_at, c.product_id
        ",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

async fn load_cart(conn: &mut PgConnection, user_id: UserId) -> Result<CartView, RepositoryError> {
    CartView::from_rows(load_cart_rows(conn, user_id).await?)
}

async fn lock_owner(conn: &mut PgConnection, user_id: UserId) -> Result<(), RepositoryError> {
    sqlx::query_scalar::<_, UserId>("SELECT id FROM app_user WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    Ok(())
}

async fn product_price_and_stock(
    conn: &mut PgConnection,
    product_id: ProductId,
) -> Result<(Money, u32), CartWriteError> {
    let (price, stock) = sqlx::query_as::<_, (Money, i32)>(
        r"
        SELECT CASE WHEN is_discounted THEN after_discount_price ELSE initial_price END,
               stock
        FROM product
        WHERE id = $1
        ",
    )
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(CartWriteError::ProductNotFound)?;

    Ok((price, non_negative(stock, "stock")?))
}

/// The existing line for one product as a single-line cart.
async fn current_line(
    conn: &mut PgConnection,
    user_id: UserId,
    product_id: ProductId,
    price: Money,
) -> Result<Cart, RepositoryError> {
    let quantity: Option<i32> = sqlx::query_scalar(
        "SELECT quantity FROM cart_item WHERE user_id = $1 AND product_id = $2",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;

    let lines = match quantity {
        Some(quantity) => vec![CartLine {
            product_id,
            quantity: non_negative(quantity, "cart quantity")?,
            unit_price: price,
        }],
        None => Vec::new(),
    };
    Ok(Cart::from_lines(lines))
}

async fn delete_line(
    conn: &mut PgConnection,
    user_id: UserId,
    product_id: ProductId,
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM cart_item WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn quantity_column(quantity: u32) -> i32 {
    i32::try_from(quantity).unwrap_or(i32::MAX)
}
