//! Order repository: checkout, payment confirmation and fulfilment.
//!
//! Stock moves only inside transactions. Cash-on-delivery orders reserve
//! stock when placed; gateway orders reserve it when the payment is
//! confirmed. Product rows are updated in ascending id order so concurrent
//! checkouts cannot deadlock.

use std::collections::HashMap;

use electomart_core::domain::{OrderLine, PageRequest, PricingPolicy, ShippingAddress};
use electomart_core::{OrderId, OrderStatus, PaymentMethod, ProductId, UserId};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;

use super::carts::load_cart_rows;
use super::{RepositoryError, count, non_negative};
use crate::models::order::{Order, OrderItem, OrderRow, OrderStats};

/// Errors from order writes.
#[derive(Debug, Error)]
pub enum OrderWriteError {
    #[error("your cart is empty")]
    EmptyCart,
    #[error("{name} has only {available} left in stock (requested {requested})")]
    InsufficientStock {
        name: String,
        available: u32,
        requested: u32,
    },
    #[error("order not found")]
    NotFound,
    #[error("this order belongs to another user")]
    NotOwner,
    #[error("order cannot be paid: {0}")]
    NotPayable(&'static str),
    #[error("only unpaid orders that are still processing can be cancelled")]
    NotCancellable,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for OrderWriteError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

const ORDER_COLUMNS: &str = "o.id, o.user_id, o.ship_full_name, o.ship_phone, o.ship_address, \
     o.ship_city, o.ship_postal_code, o.ship_country, o.payment_method, o.payment_ref, \
     o.items_price, o.shipping_price, o.tax_price, o.total_price, o.is_paid, o.paid_at, \
     o.order_status, o.delivered_at, o.created_at, o.updated_at";

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Turn the user's cart into an order and empty the cart.
    ///
    /// Line items snapshot the current name, effective price and first image.
    ///
    /// # Errors
    ///
    /// Returns `OrderWriteError::EmptyCart` for an empty cart and
    /// `InsufficientStock` if any line exceeds the available stock.
    pub async fn create_from_cart(
        &self,
        user_id: UserId,
        address: &ShippingAddress,
        payment_method: PaymentMethod,
        pricing: &PricingPolicy,
    ) -> Result<Order, OrderWriteError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, UserId>("SELECT id FROM app_user WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let rows = load_cart_rows(&mut tx, user_id).await?;
        if rows.is_empty() {
            return Err(OrderWriteError::EmptyCart);
        }

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let quantity = non_negative(row.quantity, "cart quantity")?;
            let available = non_negative(row.stock, "stock")?;
            if quantity > available {
                return Err(OrderWriteError::InsufficientStock {
                    name: row.name,
                    available,
                    requested: quantity,
                });
            }
            lines.push(OrderLine {
                product_id: row.product_id,
                name: row.name,
                image: row.image,
                unit_price: row.price,
                quantity,
            });
        }

        if !payment_method.uses_gateway() {
            let reservations: Vec<_> = lines
                .iter()
                .map(|l| (l.product_id, l.quantity))
                .collect();
            reserve_stock(&mut tx, &reservations).await?;
        }

        let totals = pricing.totals(lines.iter().map(OrderLine::subtotal));
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO customer_order AS o
                (user_id, ship_full_name, ship_phone, ship_address, ship_city,
                 ship_postal_code, ship_country, payment_method,
                 items_price, shipping_price, tax_price, total_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(user_id)
        .bind(&address.full_name)
        .bind(&address.phone)
        .bind(&address.address)
        .bind(&address.city)
        .bind(address.postal_code.as_deref())
        .bind(&address.country)
        .bind(payment_method)
        .bind(totals.items_price)
        .bind(totals.shipping_price)
        .bind(totals.tax_price)
        .bind(totals.total_price)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = sqlx::query_as::<_, OrderItem>(
                r"
                INSERT INTO order_item (order_id, product_id, name, image, unit_price, quantity)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING order_id, product_id, name, image, unit_price, quantity
                ",
            )
            .bind(row.id)
            .bind(line.product_id)
            .bind(&line.name)
            .bind(line.image.as_deref())
            .bind(line.unit_price)
            .bind(i32::try_from(line.quantity).unwrap_or(i32::MAX))
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);
        }

        sqlx::query("DELETE FROM cart_item WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.with_items(items))
    }

    /// Get an order row without items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_row(&self, id: OrderId) -> Result<Option<OrderRow>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order o WHERE o.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Get an order with its items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let Some(row) = self.get_row(id).await? else {
            return Ok(None);
        };
        Ok(self.attach_items(vec![row]).await?.pop())
    }

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM customer_order o
            WHERE o.user_id = $1
            ORDER BY o.created_at DESC, o.id DESC
            "
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        self.attach_items(rows).await
    }

    /// All orders, optionally filtered by status, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM customer_order WHERE $1::order_status IS NULL OR order_status = $1",
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM customer_order o
            WHERE $1::order_status IS NULL OR o.order_status = $1
            ORDER BY o.created_at DESC, o.id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(status)
        .bind(i64::from(page.limit()))
        .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
        .fetch_all(self.pool)
        .await?;

        Ok((self.attach_items(rows).await?, count(total)))
    }

    /// Remember the gateway payment reference for a later lookup.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn set_payment_ref(&self, id: OrderId, pidx: &str) -> Result<(), RepositoryError> {
        let updated = sqlx::query(
            "UPDATE customer_order SET payment_ref = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(pidx)
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "payment reference already used"))?
        .rows_affected();
        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Mark a gateway order paid and reserve its stock, atomically.
    ///
    /// Returns the order and whether this call changed it. Confirming an
    /// already-paid order is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `OrderWriteError::NotPayable` for cancelled orders or a
    /// mismatched reference, `InsufficientStock` if any item is sold out
    /// (nothing is decremented in that case).
    pub async fn confirm_payment(
        &self,
        id: OrderId,
        pidx: &str,
    ) -> Result<(Order, bool), OrderWriteError> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, id).await?;

        if order.is_paid {
            tx.commit().await?;
            let order = self.get(id).await?.ok_or(OrderWriteError::NotFound)?;
            return Ok((order, false));
        }
        if order.order_status == OrderStatus::Cancelled {
            return Err(OrderWriteError::NotPayable("order is cancelled"));
        }
        if order.payment_ref.as_deref() != Some(pidx) {
            return Err(OrderWriteError::NotPayable("payment reference does not match"));
        }

        let items = load_items(&mut tx, &[id]).await?;
        reserve_stock(&mut tx, &reservations(&items)?).await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE customer_order AS o
            SET is_paid = TRUE, paid_at = now(), updated_at = now()
            WHERE o.id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((row.with_items(items), true))
    }

    /// Cancel the caller's own order and return reserved stock.
    ///
    /// # Errors
    ///
    /// Returns `OrderWriteError::NotOwner` for someone else's order and
    /// `NotCancellable` once it is paid or has left `processing`.
    pub async fn cancel_by_customer(
        &self,
        id: OrderId,
        user_id: UserId,
    ) -> Result<Order, OrderWriteError> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, id).await?;

        if !order.is_owned_by(user_id) {
            return Err(OrderWriteError::NotOwner);
        }
        if !order.order_status.customer_can_cancel(order.is_paid) {
            return Err(OrderWriteError::NotCancellable);
        }

        let items = load_items(&mut tx, &[id]).await?;
        if order.order_status.holds_stock(order.payment_method, order.is_paid) {
            release_stock(&mut tx, &reservations(&items)?).await?;
        }

        let row = set_status(&mut tx, id, OrderStatus::Cancelled).await?;
        tx.commit().await?;
        Ok(row.with_items(items))
    }

    /// Admin status change; any status may follow any other.
    ///
    /// Cancelling an order that holds stock puts it back; reopening a
    /// cancelled order takes it out again.
    ///
    /// # Errors
    ///
    /// Returns `OrderWriteError::NotFound` if the order does not exist and
    /// `InsufficientStock` if a reopened order can no longer be filled.
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, OrderWriteError> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, id).await?;
        let items = load_items(&mut tx, &[id]).await?;

        let held = order.order_status.holds_stock(order.payment_method, order.is_paid);
        let holds = status.holds_stock(order.payment_method, order.is_paid);
        match (held, holds) {
            (true, false) => release_stock(&mut tx, &reservations(&items)?).await?,
            (false, true) => reserve_stock(&mut tx, &reservations(&items)?).await?,
            _ => {}
        }

        let row = set_status(&mut tx, id, status).await?;
        tx.commit().await?;
        Ok(row.with_items(items))
    }

    /// Record cash collected for a cash-on-delivery order.
    ///
    /// # Errors
    ///
    /// Returns `OrderWriteError::NotPayable` for gateway orders, which are
    /// only marked paid by payment verification.
    pub async fn mark_paid(&self, id: OrderId) -> Result<Order, OrderWriteError> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, id).await?;

        if order.payment_method.uses_gateway() {
            return Err(OrderWriteError::NotPayable(
                "gateway orders are marked paid by payment verification",
            ));
        }
        if order.order_status == OrderStatus::Cancelled {
            return Err(OrderWriteError::NotPayable("order is cancelled"));
        }

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE customer_order AS o
            SET is_paid = TRUE, paid_at = COALESCE(o.paid_at, now()), updated_at = now()
            WHERE o.id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let items = load_items(&mut tx, &[id]).await?;

        tx.commit().await?;
        Ok(row.with_items(items))
    }

    /// Dashboard counters.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stats(&self) -> Result<OrderStats, RepositoryError> {
        let stats = sqlx::query_as::<_, OrderStats>(
            r"
            SELECT COUNT(*) AS total_orders,
                   COUNT(*) FILTER (WHERE is_paid) AS paid_orders,
                   COALESCE(SUM(total_price) FILTER (WHERE is_paid), 0) AS total_revenue,
                   COUNT(*) FILTER (WHERE order_status = 'processing') AS processing,
                   COUNT(*) FILTER (WHERE order_status = 'shipped') AS shipped,
                   COUNT(*) FILTER (WHERE order_status = 'delivered') AS delivered,
                   COUNT(*) FILTER (WHERE order_status = 'cancelled') AS cancelled
            FROM customer_order
            ",
        )
        .fetch_one(self.pool)
        .await?;
        Ok(stats)
    }

    async fn attach_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<OrderId> = rows.iter().map(|r| r.id).collect();
        let mut conn = self.pool.acquire().await?;
        let items = load_items(&mut conn, &ids).await?;

        let mut grouped: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for item in items {
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(rows
            .into_iter()
            .map(|row| {
                let items = grouped.remove(&row.id).unwrap_or_default();
                row.with_items(items)
            })
            .collect())
    }
}

async fn lock_order(conn: &mut PgConnection, id: OrderId) -> Result<OrderRow, OrderWriteError> {
    sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM customer_order o WHERE o.id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(OrderWriteError::NotFound)
}

async fn set_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: OrderStatus,
) -> Result<OrderRow, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        UPDATE customer_order AS o
        SET order_status = $2,
            delivered_at = CASE WHEN $2 = 'delivered'::order_status THEN now() ELSE o.delivered_at END,
            updated_at = now()
        WHERE o.id = $1
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(id)
    .bind(status)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

async fn load_items(
    conn: &mut PgConnection,
    order_ids: &[OrderId],
) -> Result<Vec<OrderItem>, RepositoryError> {
    let raw: Vec<i32> = order_ids.iter().map(OrderId::as_i32).collect();
    let items = sqlx::query_as::<_, OrderItem>(
        r"
        SELECT order_id, product_id, name, image, unit_price, quantity
        FROM order_item
        WHERE order_id = ANY($1)
        ORDER BY id
        ",
    )
    .bind(&raw)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

/// Per-product quantities of the items whose product still exists.
fn reservations(items: &[OrderItem]) -> Result<Vec<(ProductId, u32)>, RepositoryError> {
    items
        .iter()
        .filter_map(|item| item.product_id.map(|id| (id, item.quantity)))
        .map(|(id, quantity)| Ok((id, non_negative(quantity, "order quantity")?)))
        .collect()
}

/// Merge quantities per product and sort by id to fix the lock order.
fn lock_order_quantities(items: &[(ProductId, u32)]) -> Vec<(ProductId, u32)> {
    let mut merged: Vec<(ProductId, u32)> = Vec::with_capacity(items.len());
    for &(id, quantity) in items {
        match merged.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, total)) => *total = total.saturating_add(quantity),
            None => merged.push((id, quantity)),
        }
    }
    merged.sort_by_key(|(id, _)| *id);
    merged
}

/// Decrement stock for every product or fail without touching any.
///
/// The caller's transaction rolls back the earlier decrements when a later
/// product is short.
async fn reserve_stock(
    conn: &mut PgConnection,
    items: &[(ProductId, u32)],
) -> Result<(), OrderWriteError> {
    for (product_id, quantity) in lock_order_quantities(items) {
        let quantity_i32 = i32::try_from(quantity).unwrap_or(i32::MAX);
        let updated: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE product SET stock = stock - $2, updated_at = now()
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            ",
        )
        .bind(product_id)
        .bind(quantity_i32)
        .fetch_optional(&mut *conn)
        .await?;

        if updated.is_none() {
            let current = sqlx::query_as::<_, (String, i32)>(
                "SELECT name, stock FROM product WHERE id = $1",
            )
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;
            let (name, stock) = current.unwrap_or_else(|| (format!("product {product_id}"), 0));
            return Err(OrderWriteError::InsufficientStock {
                name,
                available: non_negative(stock, "stock")?,
                requested: quantity,
            });
        }
    }
    Ok(())
}

async fn release_stock(
    conn: &mut PgConnection,
    items: &[(ProductId, u32)],
) -> Result<(), RepositoryError> {
    for (product_id, quantity) in lock_order_quantities(items) {
        sqlx::query("UPDATE product SET stock = stock + $2, updated_at = now() WHERE id = $1")
            .bind(product_id)
            .bind(i32::try_from(quantity).unwrap_or(i32::MAX))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
