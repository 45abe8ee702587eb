use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    AddressId, CartId, CartItemId, CouponId, OrderId, PaymentId, ProductId, SessionToken, UserId,
    VariantId,
};
use domain::{
    Address, Cart, CartIdentity, CartItem, Coupon, CouponCode, CouponDiscount, Money, Order,
    OrderItem, OrderNumber, OrderTotals, OrderUpdate, Payment, Product, StatusChange,
};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{CommerceStore, OrderPlacement, PaymentRecordOutcome},
};

const CART_COLUMNS: &str =
    "id, user_id, session_token, coupon_code, discount, expires_at, created_at, updated_at";

const ORDER_COLUMNS: &str = r#"
    id, order_number, user_id, session_token, status, payment_method, payment_status,
    shipping_method, subtotal, discount, shipping_cost, tax, total, shipping_address,
    coupon_code, stock_reserved, confirmed_at, shipped_at, delivered_at, cancelled_at,
    refunded_at, version, created_at, updated_at
"#;

const PAYMENT_COLUMNS: &str =
    "id, order_id, method, amount, currency, external_reference, status, created_at, updated_at";

/// PostgreSQL-backed store implementation.
///
/// Each multi-entity write runs in a single transaction; returning early with
/// an error drops the transaction, which rolls it back.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn load_cart(&self, row: PgRow) -> Result<Cart> {
        let id: Uuid = row.try_get("id")?;
        let items = sqlx::query(
            r#"
            SELECT id, product_id, variant_id, quantity, unit_price, added_at
            FROM cart_items
            WHERE cart_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(row_to_cart_item)
        .collect::<Result<Vec<_>>>()?;

        Ok(Cart {
            id: CartId::from_uuid(id),
            identity: identity_from_row(&row)?,
            items,
            coupon_code: row
                .try_get::<Option<String>, _>("coupon_code")?
                .map(CouponCode::new),
            discount: Money::from_minor(row.try_get("discount")?),
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn load_order(&self, row: PgRow) -> Result<Order> {
        let id: Uuid = row.try_get("id")?;

        let items = sqlx::query(
            r#"
            SELECT product_id, variant_id, name, sku, unit_price, quantity, line_total, image
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(row_to_order_item)
        .collect::<Result<Vec<_>>>()?;

        let history = sqlx::query(
            r#"
            SELECT from_status, to_status, note, changed_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(row_to_status_change)
        .collect::<Result<Vec<_>>>()?;

        Ok(Order {
            id: OrderId::from_uuid(id),
            order_number: row.try_get::<String, _>("order_number")?.parse()?,
            identity: identity_from_row(&row)?,
            status: row.try_get::<String, _>("status")?.parse()?,
            payment_method: row.try_get::<String, _>("payment_method")?.parse()?,
            payment_status: row.try_get::<String, _>("payment_status")?.parse()?,
            shipping_method: row.try_get::<String, _>("shipping_method")?.parse()?,
            totals: OrderTotals {
                subtotal: Money::from_minor(row.try_get("subtotal")?),
                discount: Money::from_minor(row.try_get("discount")?),
                shipping_cost: Money::from_minor(row.try_get("shipping_cost")?),
                tax: Money::from_minor(row.try_get("tax")?),
                total: Money::from_minor(row.try_get("total")?),
            },
            shipping_address: serde_json::from_value(row.try_get("shipping_address")?)?,
            coupon_code: row
                .try_get::<Option<String>, _>("coupon_code")?
                .map(CouponCode::new),
            items,
            stock_reserved: row.try_get("stock_reserved")?,
            confirmed_at: row.try_get("confirmed_at")?,
            shipped_at: row.try_get("shipped_at")?,
            delivered_at: row.try_get("delivered_at")?,
            cancelled_at: row.try_get("cancelled_at")?,
            refunded_at: row.try_get("refunded_at")?,
            history,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn write_cart(conn: &mut PgConnection, cart: &Cart) -> Result<()> {
        let (user_id, session_token) = owner_columns(&cart.identity);

        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, session_token, coupon_code, discount, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                coupon_code = EXCLUDED.coupon_code,
                discount = EXCLUDED.discount,
                expires_at = EXCLUDED.expires_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(user_id)
        .bind(session_token)
        .bind(cart.coupon_code.as_ref().map(CouponCode::as_str))
        .bind(cart.discount.minor_units())
        .bind(cart.expires_at)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&mut *conn)
        .await?;

        Self::write_cart_items(conn, cart).await
    }

    async fn write_cart_items(conn: &mut PgConnection, cart: &Cart) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id.as_uuid())
            .execute(&mut *conn)
            .await?;

        for (position, item) in cart.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO cart_items (id, cart_id, position, product_id, variant_id, quantity, unit_price, added_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(cart.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_uuid())
            .bind(item.variant_id.map(|v| v.as_uuid()))
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.minor_units())
            .bind(item.added_at)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
        let (user_id, session_token) = owner_columns(&order.identity);
        let shipping_address = serde_json::to_value(&order.shipping_address)?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, user_id, session_token, status, payment_method, payment_status,
                shipping_method, subtotal, discount, shipping_cost, tax, total, shipping_address,
                coupon_code, stock_reserved, confirmed_at, shipped_at, delivered_at, cancelled_at,
                refunded_at, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(user_id)
        .bind(session_token)
        .bind(order.status.as_str())
        .bind(order.payment_method.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.shipping_method.as_str())
        .bind(order.totals.subtotal.minor_units())
        .bind(order.totals.discount.minor_units())
        .bind(order.totals.shipping_cost.minor_units())
        .bind(order.totals.tax.minor_units())
        .bind(order.totals.total.minor_units())
        .bind(shipping_address)
        .bind(order.coupon_code.as_ref().map(CouponCode::as_str))
        .bind(order.stock_reserved)
        .bind(order.confirmed_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(order.refunded_at)
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_order_number")
            {
                return StoreError::DuplicateOrderNumber(order.order_number.clone());
            }
            StoreError::Database(e)
        })?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, variant_id, name, sku, unit_price, quantity, line_total, image)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_uuid())
            .bind(item.variant_id.map(|v| v.as_uuid()))
            .bind(&item.name)
            .bind(&item.sku)
            .bind(item.unit_price.minor_units())
            .bind(i64::from(item.quantity))
            .bind(item.line_total.minor_units())
            .bind(item.image.as_deref())
            .execute(&mut *conn)
            .await?;
        }

        for change in &order.history {
            Self::insert_status_change(conn, order.id, change).await?;
        }

        Ok(())
    }

    async fn insert_status_change(
        conn: &mut PgConnection,
        order_id: OrderId,
        change: &StatusChange,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_status_history (order_id, from_status, to_status, note, changed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(change.from.map(|s| s.as_str()))
        .bind(change.to.as_str())
        .bind(change.note.as_deref())
        .bind(change.at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn write_update(conn: &mut PgConnection, update: &OrderUpdate) -> Result<()> {
        let order = &update.order;

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = $3,
                payment_status = $4,
                stock_reserved = $5,
                confirmed_at = $6,
                shipped_at = $7,
                delivered_at = $8,
                cancelled_at = $9,
                refunded_at = $10,
                version = $11,
                updated_at = $12
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(update.expected_version)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.stock_reserved)
        .bind(order.confirmed_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(order.refunded_at)
        .bind(order.version)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                .bind(order.id.as_uuid())
                .fetch_optional(&mut *conn)
                .await?;

            return Err(match actual {
                Some(actual) => StoreError::ConcurrencyConflict {
                    order_id: order.id,
                    expected: update.expected_version,
                    actual,
                },
                None => StoreError::OrderNotFound(order.id),
            });
        }

        if let Some(change) = &update.change {
            Self::insert_status_change(conn, order.id, change).await?;
        }

        for line in &update.restock {
            sqlx::query("UPDATE products SET stock = stock + $1, updated_at = NOW() WHERE id = $2")
                .bind(i64::from(line.quantity))
                .bind(line.product_id.as_uuid())
                .execute(&mut *conn)
                .await?;
        }

        if update.refund_payments {
            sqlx::query(
                r#"
                UPDATE payments SET status = 'refunded', updated_at = $2
                WHERE order_id = $1 AND status = 'completed'
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(order.updated_at)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl CommerceStore for PostgresStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, sku, price, stock, status, images FROM products WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_product).transpose()
    }

    async fn save_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, sku, price, stock, status, images)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                sku = EXCLUDED.sku,
                price = EXCLUDED.price,
                stock = EXCLUDED.stock,
                status = EXCLUDED.status,
                images = EXCLUDED.images,
                updated_at = NOW()
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.price.minor_units())
        .bind(product.stock)
        .bind(product.status.as_str())
        .bind(&product.images)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_address(&self, id: AddressId, owner: &CartIdentity) -> Result<Option<Address>> {
        let (user_id, session_token) = owner_columns(owner);
        let row = sqlx::query(
            r#"
            SELECT id, user_id, session_token, name, phone, address_line1, address_line2,
                   district, division, postal_code
            FROM addresses
            WHERE id = $1 AND (user_id = $2 OR session_token = $3)
            "#,
        )
        .bind(id.as_uuid())
        .bind(user_id)
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_address).transpose()
    }

    async fn save_address(&self, address: Address) -> Result<()> {
        let (user_id, session_token) = owner_columns(&address.owner);
        sqlx::query(
            r#"
            INSERT INTO addresses (id, user_id, session_token, name, phone, address_line1,
                                   address_line2, district, division, postal_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                phone = EXCLUDED.phone,
                address_line1 = EXCLUDED.address_line1,
                address_line2 = EXCLUDED.address_line2,
                district = EXCLUDED.district,
                division = EXCLUDED.division,
                postal_code = EXCLUDED.postal_code
            "#,
        )
        .bind(address.id.as_uuid())
        .bind(user_id)
        .bind(session_token)
        .bind(&address.name)
        .bind(&address.phone)
        .bind(&address.address_line1)
        .bind(address.address_line2.as_deref())
        .bind(&address.district)
        .bind(&address.division)
        .bind(address.postal_code.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_cart(&self, identity: &CartIdentity) -> Result<Option<Cart>> {
        let (user_id, session_token) = owner_columns(identity);
        let row = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1 OR session_token = $2"
        ))
        .bind(user_id)
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load_cart(row).await?)),
            None => Ok(None),
        }
    }

    async fn create_cart_if_absent(&self, cart: Cart) -> Result<Cart> {
        let (user_id, session_token) = owner_columns(&cart.identity);
        let mut tx = self.pool.begin().await?;

        // Either partial unique index on the owner columns turns a concurrent
        // insert for the same identity into a no-op.
        let inserted = sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, session_token, coupon_code, discount, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(user_id)
        .bind(session_token)
        .bind(cart.coupon_code.as_ref().map(CouponCode::as_str))
        .bind(cart.discount.minor_units())
        .bind(cart.expires_at)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            drop(tx);
            return self
                .get_cart(&cart.identity)
                .await?
                .ok_or_else(|| StoreError::InvalidData(format!("cart for {} vanished", cart.identity)));
        }

        Self::write_cart_items(&mut tx, &cart).await?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::write_cart(&mut tx, cart).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_cart(&self, cart_id: CartId) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn merge_carts(&self, user_cart: &Cart, guest_cart_id: CartId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(guest_cart_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        Self::write_cart(&mut tx, user_cart).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_expired_guest_carts(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM carts WHERE session_token IS NOT NULL AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get_coupon(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, discount_type, percent, amount, min_order_amount, max_discount,
                   starts_at, expires_at, usage_limit, usage_count, is_active, created_at, updated_at
            FROM coupons
            WHERE code = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_coupon).transpose()
    }

    async fn save_coupon(&self, coupon: Coupon) -> Result<()> {
        let (percent, amount) = match coupon.discount {
            CouponDiscount::Percentage { percent } => (Some(percent), None),
            CouponDiscount::Fixed { amount } => (None, Some(amount.minor_units())),
        };

        sqlx::query(
            r#"
            INSERT INTO coupons (id, code, discount_type, percent, amount, min_order_amount,
                                 max_discount, starts_at, expires_at, usage_limit, usage_count,
                                 is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                discount_type = EXCLUDED.discount_type,
                percent = EXCLUDED.percent,
                amount = EXCLUDED.amount,
                min_order_amount = EXCLUDED.min_order_amount,
                max_discount = EXCLUDED.max_discount,
                starts_at = EXCLUDED.starts_at,
                expires_at = EXCLUDED.expires_at,
                usage_limit = EXCLUDED.usage_limit,
                usage_count = EXCLUDED.usage_count,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(coupon.id.as_uuid())
        .bind(coupon.code.as_str())
        .bind(coupon.discount.kind())
        .bind(percent)
        .bind(amount)
        .bind(coupon.min_order_amount.map(|m| m.minor_units()))
        .bind(coupon.max_discount.map(|m| m.minor_units()))
        .bind(coupon.starts_at)
        .bind(coupon.expires_at)
        .bind(coupon.usage_limit.map(i64::from))
        .bind(i64::from(coupon.usage_count))
        .bind(coupon.is_active)
        .bind(coupon.created_at)
        .bind(coupon.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_orders_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn place_order(&self, placement: OrderPlacement) -> Result<Order> {
        let order = placement.order;
        let mut tx = self.pool.begin().await?;

        for line in order.stock_lines() {
            let requested = i64::from(line.quantity);
            let remaining: Option<i64> = sqlx::query_scalar(
                "UPDATE products SET stock = stock - $1, updated_at = NOW() WHERE id = $2 RETURNING stock",
            )
            .bind(requested)
            .bind(line.product_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

            match remaining {
                Some(remaining) if remaining >= 0 => {}
                other => {
                    tracing::debug!(product_id = %line.product_id, "stock decrement went negative");
                    return Err(StoreError::StockRaceLost {
                        product_id: line.product_id,
                        requested: line.quantity,
                        available: other.map_or(0, |remaining| remaining + requested),
                    });
                }
            }
        }

        Self::insert_order(&mut tx, &order).await?;

        // Locking the cart row serialises with `save_cart`, which upserts it.
        // A cart that is gone has no lines.
        sqlx::query("SELECT id FROM carts WHERE id = $1 FOR UPDATE")
            .bind(placement.cart_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        let mut stored: Vec<_> = sqlx::query(
            "SELECT id, product_id, variant_id, quantity, unit_price, added_at FROM cart_items WHERE cart_id = $1",
        )
        .bind(placement.cart_id.as_uuid())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|row| row_to_cart_item(row).map(|item| (item.id, item.quantity)))
        .collect::<Result<Vec<_>>>()?;
        stored.sort_unstable();
        if stored != placement.cart_lines {
            tracing::debug!(cart_id = %placement.cart_id, "cart changed during checkout");
            return Err(StoreError::CartChanged(placement.cart_id));
        }

        if placement.delete_cart {
            sqlx::query("DELETE FROM carts WHERE id = $1")
                .bind(placement.cart_id.as_uuid())
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
                .bind(placement.cart_id.as_uuid())
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE carts SET coupon_code = NULL, discount = 0, updated_at = $2 WHERE id = $1",
            )
            .bind(placement.cart_id.as_uuid())
            .bind(order.created_at)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(code) = &placement.coupon {
            let claimed = sqlx::query(
                r#"
                UPDATE coupons SET usage_count = usage_count + 1, updated_at = $2
                WHERE code = $1 AND (usage_limit IS NULL OR usage_count < usage_limit)
                "#,
            )
            .bind(code.as_str())
            .bind(order.created_at)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if claimed == 0 {
                return Err(StoreError::CouponExhausted(code.to_string()));
            }
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.load_order(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
        ))
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load_order(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, identity: &CartIdentity) -> Result<Vec<Order>> {
        let (user_id, session_token) = owner_columns(identity);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE user_id = $1 OR session_token = $2
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .bind(session_token)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(self.load_order(row).await?);
        }
        Ok(orders)
    }

    async fn apply_order_update(&self, update: OrderUpdate) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        Self::write_update(&mut tx, &update).await?;
        tx.commit().await?;
        Ok(update.order)
    }

    async fn record_payment(
        &self,
        payment: Payment,
        update: Option<OrderUpdate>,
    ) -> Result<PaymentRecordOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO payments (id, order_id, method, amount, currency, external_reference, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (external_reference) DO UPDATE SET
                status = EXCLUDED.status,
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                updated_at = EXCLUDED.updated_at
            WHERE EXCLUDED.status = 'completed' AND payments.status IN ('pending', 'failed')
            RETURNING id
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.method.as_str())
        .bind(payment.amount.minor_units())
        .bind(&payment.currency)
        .bind(&payment.external_reference)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            return Ok(PaymentRecordOutcome::Duplicate);
        }

        if let Some(update) = &update {
            Self::write_update(&mut tx, update).await?;
        }

        tx.commit().await?;
        Ok(PaymentRecordOutcome::Recorded)
    }

    async fn get_payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at ASC"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_payment).collect()
    }
}

fn owner_columns(identity: &CartIdentity) -> (Option<Uuid>, Option<String>) {
    match identity {
        CartIdentity::User(id) => (Some(id.as_uuid()), None),
        CartIdentity::Guest(token) => (None, Some(token.as_str().to_string())),
    }
}

fn identity_from_row(row: &PgRow) -> Result<CartIdentity> {
    let user_id: Option<Uuid> = row.try_get("user_id")?;
    let session_token: Option<String> = row.try_get("session_token")?;

    match (user_id, session_token) {
        (Some(id), _) => Ok(CartIdentity::User(UserId::from_uuid(id))),
        (None, Some(token)) => Ok(CartIdentity::Guest(SessionToken::new(token))),
        (None, None) => Err(StoreError::InvalidData(
            "row has neither user_id nor session_token".to_string(),
        )),
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{column} out of range: {value}")))
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        sku: row.try_get("sku")?,
        price: Money::from_minor(row.try_get("price")?),
        stock: row.try_get("stock")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        images: row.try_get("images")?,
    })
}

fn row_to_address(row: PgRow) -> Result<Address> {
    Ok(Address {
        id: AddressId::from_uuid(row.try_get("id")?),
        owner: identity_from_row(&row)?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        address_line1: row.try_get("address_line1")?,
        address_line2: row.try_get("address_line2")?,
        district: row.try_get("district")?,
        division: row.try_get("division")?,
        postal_code: row.try_get("postal_code")?,
    })
}

fn row_to_cart_item(row: PgRow) -> Result<CartItem> {
    Ok(CartItem {
        id: CartItemId::from_uuid(row.try_get("id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        variant_id: row
            .try_get::<Option<Uuid>, _>("variant_id")?
            .map(VariantId::from_uuid),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: Money::from_minor(row.try_get("unit_price")?),
        added_at: row.try_get("added_at")?,
    })
}

fn row_to_coupon(row: PgRow) -> Result<Coupon> {
    let discount_type: String = row.try_get("discount_type")?;
    let discount = match discount_type.as_str() {
        "percentage" => CouponDiscount::Percentage {
            percent: row
                .try_get::<Option<Decimal>, _>("percent")?
                .ok_or_else(|| StoreError::InvalidData("percentage coupon without percent".to_string()))?,
        },
        "fixed" => CouponDiscount::Fixed {
            amount: row
                .try_get::<Option<i64>, _>("amount")?
                .map(Money::from_minor)
                .ok_or_else(|| StoreError::InvalidData("fixed coupon without amount".to_string()))?,
        },
        other => {
            return Err(StoreError::InvalidData(format!(
                "unknown coupon discount type: {other}"
            )));
        }
    };

    Ok(Coupon {
        id: CouponId::from_uuid(row.try_get("id")?),
        code: CouponCode::new(row.try_get::<String, _>("code")?),
        discount,
        min_order_amount: row
            .try_get::<Option<i64>, _>("min_order_amount")?
            .map(Money::from_minor),
        max_discount: row
            .try_get::<Option<i64>, _>("max_discount")?
            .map(Money::from_minor),
        starts_at: row.try_get("starts_at")?,
        expires_at: row.try_get("expires_at")?,
        usage_limit: row
            .try_get::<Option<i64>, _>("usage_limit")?
            .map(|limit| to_u32(limit, "usage_limit"))
            .transpose()?,
        usage_count: to_u32(row.try_get("usage_count")?, "usage_count")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_item(row: PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        variant_id: row
            .try_get::<Option<Uuid>, _>("variant_id")?
            .map(VariantId::from_uuid),
        name: row.try_get("name")?,
        sku: row.try_get("sku")?,
        unit_price: Money::from_minor(row.try_get("unit_price")?),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        line_total: Money::from_minor(row.try_get("line_total")?),
        image: row.try_get("image")?,
    })
}

fn row_to_status_change(row: PgRow) -> Result<StatusChange> {
    Ok(StatusChange {
        from: row
            .try_get::<Option<String>, _>("from_status")?
            .map(|s| s.parse())
            .transpose()?,
        to: row.try_get::<String, _>("to_status")?.parse()?,
        note: row.try_get("note")?,
        at: row.try_get("changed_at")?,
    })
}

fn row_to_payment(row: PgRow) -> Result<Payment> {
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        method: row.try_get::<String, _>("method")?.parse()?,
        amount: Money::from_minor(row.try_get("amount")?),
        currency: row.try_get("currency")?,
        external_reference: row.try_get("external_reference")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
