use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CartId, CartItemId, CouponId, InventoryLogId, Money, OrderId, ProductId, UserId, Version,
};
use domain::{
    Cart, CartItem, CheckoutPlan, Coupon, CouponUsage, Discrepancy, DiscountRule,
    DiscrepancyReport, DomainError, InventoryLogEntry, Order, OrderItem, OrderNumber,
    PaymentStatus, PhysicalCount, Product, ShippingAddress, StatusChange, StockAdjustment,
    StockMovement, validate_counts,
};
use futures_util::{StreamExt, TryStreamExt, stream};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    LedgerQuery, OrderQuery, ProductQuery, Result, StoreError,
    store::{LedgerStream, Store},
};

const PRODUCT_COLUMNS: &str = "id, sku, name, price_cents, sale_price_cents, stock_quantity, \
     is_active, version, created_at, updated_at";

const LEDGER_COLUMNS: &str = "seq, id, product_id, entry_type, quantity, reason, created_at";

const COUPON_COLUMNS: &str = "id, code, discount_type, discount_value, min_purchase_cents, \
     max_discount_cents, usage_limit, per_user_limit, used_count, valid_from, valid_until, \
     is_active, version, created_at";

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, payment_status, subtotal_cents, \
     discount_cents, shipping_cents, tax_cents, total_cents, coupon_id, coupon_code, \
     shipping_address, payment_method, notes, created_at, updated_at";

/// Ledger rows fetched per round trip when streaming.
const LEDGER_PAGE_SIZE: i64 = 500;

/// How long a checkout waits on a row lock before giving up with 55P03.
const LOCK_TIMEOUT: &str = "5s";

/// PostgreSQL-backed store.
///
/// Units of work run in a transaction at READ COMMITTED with explicit row
/// locks (`SELECT … FOR UPDATE`) taken in a fixed order: cart, products by id,
/// coupon, then the per-day order sequence.
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

    async fn load_order_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, product_name, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id: Uuid = row.try_get("order_id")?;
            items.entry(order_id).or_default().push(OrderItem {
                product_id: ProductId::from_uuid(row.try_get("product_id")?),
                product_name: row.try_get("product_name")?,
                quantity: to_u32(row.try_get("quantity")?, "quantity")?,
                unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            });
        }
        Ok(items)
    }

    async fn load_cart_items(&self, cart_id: CartId) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, quantity, added_at
            FROM cart_items
            WHERE cart_id = $1
            ORDER BY position
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CartItem {
                    id: CartItemId::from_uuid(row.try_get("id")?),
                    product_id: ProductId::from_uuid(row.try_get("product_id")?),
                    quantity: to_u32(row.try_get("quantity")?, "quantity")?,
                    added_at: row.try_get("added_at")?,
                })
            })
            .collect()
    }
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

fn to_i32(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("value out of range: {value}")))
}

fn parse_column<T: FromStr<Err = DomainError>>(value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|e: DomainError| StoreError::Corrupt(e.to_string()))
}

fn product_from_row(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id")?),
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        sale_price: row
            .try_get::<Option<i64>, _>("sale_price_cents")?
            .map(Money::from_cents),
        stock_quantity: row.try_get("stock_quantity")?,
        is_active: row.try_get("is_active")?,
        version: Version::new(row.try_get("version")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ledger_entry_from_row(row: &PgRow) -> Result<InventoryLogEntry> {
    Ok(InventoryLogEntry {
        id: InventoryLogId::from_uuid(row.try_get("id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        entry_type: parse_column(row.try_get::<&str, _>("entry_type")?)?,
        quantity: row.try_get("quantity")?,
        reason: row.try_get("reason")?,
        created_at: row.try_get("created_at")?,
    })
}

fn coupon_from_row(row: &PgRow) -> Result<Coupon> {
    let rule = DiscountRule::from_parts(
        row.try_get::<&str, _>("discount_type")?,
        row.try_get("discount_value")?,
    )
    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let limit = |column: &str| -> Result<Option<u32>> {
        row.try_get::<Option<i32>, _>(column)?
            .map(|v| to_u32(v, column))
            .transpose()
    };

    Ok(Coupon {
        id: CouponId::from_uuid(row.try_get("id")?),
        code: row.try_get("code")?,
        rule,
        min_purchase: row
            .try_get::<Option<i64>, _>("min_purchase_cents")?
            .map(Money::from_cents),
        max_discount: row
            .try_get::<Option<i64>, _>("max_discount_cents")?
            .map(Money::from_cents),
        usage_limit: limit("usage_limit")?,
        per_user_limit: limit("per_user_limit")?,
        used_count: to_u32(row.try_get("used_count")?, "used_count")?,
        valid_from: row.try_get("valid_from")?,
        valid_until: row.try_get("valid_until")?,
        is_active: row.try_get("is_active")?,
        version: Version::new(row.try_get("version")?),
        created_at: row.try_get("created_at")?,
    })
}

fn order_from_row(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id")?),
        order_number: OrderNumber::from_stored(row.try_get::<String, _>("order_number")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        status: parse_column(row.try_get::<&str, _>("status")?)?,
        payment_status: parse_column(row.try_get::<&str, _>("payment_status")?)?,
        items,
        subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
        discount: Money::from_cents(row.try_get("discount_cents")?),
        shipping_cost: Money::from_cents(row.try_get("shipping_cents")?),
        tax: Money::from_cents(row.try_get("tax_cents")?),
        total: Money::from_cents(row.try_get("total_cents")?),
        coupon_id: row
            .try_get::<Option<Uuid>, _>("coupon_id")?
            .map(CouponId::from_uuid),
        coupon_code: row.try_get("coupon_code")?,
        shipping_address: row
            .try_get::<Json<ShippingAddress>, _>("shipping_address")?
            .0,
        payment_method: parse_column(row.try_get::<&str, _>("payment_method")?)?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ledger_select(query: &LedgerQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {LEDGER_COLUMNS} FROM inventory_logs WHERE TRUE"
    ));
    if let Some(product_id) = query.product_id {
        qb.push(" AND product_id = ").push_bind(product_id.as_uuid());
    }
    if let Some(types) = &query.entry_types {
        let names: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
        qb.push(" AND entry_type = ANY(").push_bind(names).push(")");
    }
    if let Some(from) = query.from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = query.to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
    qb
}

async fn lock_product(conn: &mut PgConnection, id: ProductId) -> Result<Product> {
    let row = sqlx::query(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DomainError::not_found("Product", id))?;
    product_from_row(&row)
}

/// Applies a signed delta to stock and appends its ledger entry.
async fn write_movement(
    conn: &mut PgConnection,
    entry: &InventoryLogEntry,
    at: DateTime<Utc>,
) -> Result<()> {
    let updated = sqlx::query(
        r#"
        UPDATE products
        SET stock_quantity = stock_quantity + $2, updated_at = $3
        WHERE id = $1 AND stock_quantity + $2 >= 0
        "#,
    )
    .bind(entry.product_id.as_uuid())
    .bind(entry.quantity)
    .bind(at)
    .execute(&mut *conn)
    .await?;
    if updated.rows_affected() == 0 {
        let product = lock_product(conn, entry.product_id).await?;
        return Err(DomainError::InsufficientStock {
            product_id: product.id,
            product_name: product.name,
            available: product.stock_quantity,
            requested: -entry.quantity,
        }
        .into());
    }

    sqlx::query(
        r#"
        INSERT INTO inventory_logs (id, product_id, entry_type, quantity, reason, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.product_id.as_uuid())
    .bind(entry.entry_type.as_str())
    .bind(entry.quantity)
    .bind(&entry.reason)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn count_usages(conn: &mut PgConnection, coupon_id: CouponId, user_id: UserId) -> Result<u32> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND user_id = $2",
    )
    .bind(coupon_id.as_uuid())
    .bind(user_id.as_uuid())
    .fetch_one(&mut *conn)
    .await?;
    u32::try_from(count).map_err(|_| StoreError::Corrupt(format!("usage count {count}")))
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_product(
        &self,
        product: &Product,
        opening: Option<&InventoryLogEntry>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, price_cents, sale_price_cents, stock_quantity,
                                  is_active, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8, $9)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.sale_price.map(|p| p.cents()))
        .bind(product.is_active)
        .bind(product.version.as_i64())
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;

        if let Some(entry) = opening {
            write_movement(&mut tx, entry, product.created_at).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(uuids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| product_from_row(row).map(|p| (p.id, p)))
            .collect()
    }

    async fn list_products(&self, query: ProductQuery) -> Result<Vec<Product>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE"
        ));
        if query.active_only {
            qb.push(" AND is_active");
        }
        if let Some(max) = query.max_stock {
            qb.push(" AND stock_quantity <= ").push_bind(max);
        }
        qb.push(" ORDER BY sku ASC");
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            qb.push(" OFFSET ").push_bind(offset as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn update_product(&self, product: &Product, expected: Version) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET name = $3, price_cents = $4, sale_price_cents = $5, is_active = $6,
                updated_at = $7, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product.id.as_uuid())
        .bind(expected.as_i64())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.sale_price.map(|p| p.cents()))
        .bind(product.is_active)
        .bind(product.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => product_from_row(&row),
            None => match self.get_product(product.id).await? {
                Some(current) => Err(StoreError::conflict(
                    "Product",
                    product.id,
                    format!("expected version {expected}, found {}", current.version),
                )),
                None => Err(DomainError::not_found("Product", product.id).into()),
            },
        }
    }

    async fn apply_stock_adjustment(
        &self,
        adjustment: &StockAdjustment,
        at: DateTime<Utc>,
    ) -> Result<StockMovement> {
        let entry = adjustment.to_entry(at)?;
        let mut tx = self.pool.begin().await?;

        let mut product = lock_product(&mut tx, adjustment.product_id).await?;
        product.stock_quantity = adjustment.resulting_stock(&product)?;
        product.updated_at = at;
        write_movement(&mut tx, &entry, at).await?;

        tx.commit().await?;
        Ok(StockMovement {
            product,
            log_entry: entry,
        })
    }

    async fn reconcile(
        &self,
        counts: &[PhysicalCount],
        at: DateTime<Utc>,
    ) -> Result<DiscrepancyReport> {
        validate_counts(counts)?;
        let mut lock_order: Vec<ProductId> = counts.iter().map(|c| c.product_id).collect();
        lock_order.sort();

        let mut tx = self.pool.begin().await?;
        let mut locked = HashMap::with_capacity(lock_order.len());
        for id in lock_order {
            locked.insert(id, lock_product(&mut tx, id).await?);
        }

        let mut discrepancies = Vec::new();
        for count in counts {
            let product = locked
                .get(&count.product_id)
                .ok_or_else(|| DomainError::not_found("Product", count.product_id))?;
            if let Some(discrepancy) = Discrepancy::between(product, count.actual_quantity) {
                write_movement(&mut tx, &discrepancy.to_entry(at)?, at).await?;
                discrepancies.push(discrepancy);
            }
        }
        tx.commit().await?;

        tracing::info!(
            products_checked = counts.len(),
            discrepancies = discrepancies.len(),
            "inventory reconciled"
        );
        Ok(DiscrepancyReport {
            products_checked: counts.len(),
            discrepancies,
            reconciled_at: at,
        })
    }

    async fn ledger(&self, query: LedgerQuery) -> Result<Vec<InventoryLogEntry>> {
        let mut qb = ledger_select(&query);
        qb.push(" ORDER BY seq ASC");
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            qb.push(" OFFSET ").push_bind(offset as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(ledger_entry_from_row).collect()
    }

    async fn stream_ledger(&self, query: LedgerQuery) -> Result<LedgerStream> {
        // Keyset pagination on `seq` so the stream owns its state and never
        // holds a connection between pages.
        let pages = stream::try_unfold(
            (self.pool.clone(), query, Some(0_i64)),
            |(pool, query, cursor)| async move {
                let Some(after) = cursor else {
                    return Ok(None);
                };
                let mut qb = ledger_select(&query);
                qb.push(" AND seq > ")
                    .push_bind(after)
                    .push(" ORDER BY seq ASC LIMIT ")
                    .push_bind(LEDGER_PAGE_SIZE);
                let rows = qb.build().fetch_all(&pool).await?;
                if rows.is_empty() {
                    return Ok(None);
                }

                let last_seq: i64 = rows[rows.len() - 1].try_get("seq")?;
                let next = (rows.len() as i64 == LEDGER_PAGE_SIZE).then_some(last_seq);
                let entries = rows
                    .iter()
                    .map(ledger_entry_from_row)
                    .collect::<Result<Vec<_>>>()?;
                Ok::<_, StoreError>(Some((entries, (pool, query, next))))
            },
        );

        let entries = pages
            .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
            .try_flatten();
        Ok(entries.boxed())
    }

    async fn get_or_create_cart(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Cart> {
        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, coupon_id, version, created_at, updated_at)
            VALUES ($1, $2, NULL, 1, $3, $3)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(CartId::new().as_uuid())
        .bind(user_id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT id, user_id, coupon_id, version, created_at, updated_at
            FROM carts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        let id = CartId::from_uuid(row.try_get("id")?);
        Ok(Cart {
            id,
            user_id,
            items: self.load_cart_items(id).await?,
            coupon_id: row
                .try_get::<Option<Uuid>, _>("coupon_id")?
                .map(CouponId::from_uuid),
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn save_cart(&self, cart: &Cart) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;

        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE carts
            SET coupon_id = $3, updated_at = $4, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.version.as_i64())
        .bind(cart.coupon_id.map(|c| c.as_uuid()))
        .bind(cart.updated_at)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(version) = version else {
            return Err(StoreError::conflict(
                "Cart",
                cart.id,
                format!("expected version {}", cart.version),
            ));
        };

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        for (position, item) in cart.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO cart_items (id, cart_id, product_id, quantity, position, added_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(cart.id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(to_i32(item.quantity)?)
            .bind(position as i32)
            .bind(item.added_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        let mut saved = cart.clone();
        saved.version = Version::new(version);
        Ok(saved)
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO coupons (id, code, discount_type, discount_value, min_purchase_cents,
                                 max_discount_cents, usage_limit, per_user_limit, used_count,
                                 valid_from, valid_until, is_active, version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(coupon.id.as_uuid())
        .bind(&coupon.code)
        .bind(coupon.rule.type_str())
        .bind(coupon.rule.raw_value())
        .bind(coupon.min_purchase.map(|m| m.cents()))
        .bind(coupon.max_discount.map(|m| m.cents()))
        .bind(coupon.usage_limit.map(to_i32).transpose()?)
        .bind(coupon.per_user_limit.map(to_i32).transpose()?)
        .bind(to_i32(coupon.used_count)?)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.is_active)
        .bind(coupon.version.as_i64())
        .bind(coupon.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_coupon(&self, id: CouponId) -> Result<Option<Coupon>> {
        let row = sqlx::query(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(coupon_from_row).transpose()
    }

    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(coupon_from_row).transpose()
    }

    async fn update_coupon(&self, coupon: &Coupon, expected: Version) -> Result<Coupon> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE coupons
            SET is_active = $3, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {COUPON_COLUMNS}
            "#
        ))
        .bind(coupon.id.as_uuid())
        .bind(expected.as_i64())
        .bind(coupon.is_active)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => coupon_from_row(&row),
            None if self.get_coupon(coupon.id).await?.is_some() => Err(StoreError::conflict(
                "Coupon",
                coupon.id,
                format!("expected version {expected}"),
            )),
            None => Err(DomainError::not_found("Coupon", coupon.id).into()),
        }
    }

    async fn count_coupon_usages(&self, coupon_id: CouponId, user_id: UserId) -> Result<u32> {
        let mut conn = self.pool.acquire().await?;
        count_usages(&mut conn, coupon_id, user_id).await
    }

    async fn coupon_usages(&self, coupon_id: CouponId) -> Result<Vec<CouponUsage>> {
        let rows = sqlx::query(
            r#"
            SELECT coupon_id, user_id, order_id, used_at
            FROM coupon_usages
            WHERE coupon_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(coupon_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CouponUsage {
                    coupon_id: CouponId::from_uuid(row.try_get("coupon_id")?),
                    user_id: UserId::from_uuid(row.try_get("user_id")?),
                    order_id: OrderId::from_uuid(row.try_get("order_id")?),
                    used_at: row.try_get("used_at")?,
                })
            })
            .collect()
    }

    async fn commit_checkout(&self, plan: &CheckoutPlan) -> Result<Order> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("SET LOCAL lock_timeout = '{LOCK_TIMEOUT}'"))
            .execute(&mut *tx)
            .await?;

        // The cart guard also empties the coupon slot; items go at the end.
        let cart = sqlx::query(
            r#"
            UPDATE carts
            SET coupon_id = NULL, version = version + 1, updated_at = $3
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(plan.cart_id.as_uuid())
        .bind(plan.cart_version.as_i64())
        .bind(plan.placed_at)
        .execute(&mut *tx)
        .await?;
        if cart.rows_affected() == 0 {
            return Err(StoreError::conflict(
                "Cart",
                plan.cart_id,
                "cart changed during checkout",
            ));
        }

        for line in &plan.lines {
            let product = lock_product(&mut tx, line.product_id).await?;
            if product.version != line.product_version {
                return Err(StoreError::conflict(
                    "Product",
                    product.id,
                    "catalog entry changed during checkout",
                ));
            }
            product.ensure_available(line.quantity)?;
        }

        if let Some(redemption) = &plan.redemption {
            let row = sqlx::query(
                "SELECT used_count, version FROM coupons WHERE id = $1 FOR UPDATE",
            )
            .bind(redemption.coupon_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DomainError::not_found("Coupon", redemption.coupon_id))?;
            if Version::new(row.try_get("version")?) != redemption.coupon_version {
                return Err(StoreError::conflict(
                    "Coupon",
                    redemption.coupon_id,
                    "coupon changed during checkout",
                ));
            }
            let used_count = to_u32(row.try_get("used_count")?, "used_count")?;
            let uses = count_usages(&mut tx, redemption.coupon_id, plan.user_id).await?;
            redemption
                .check_limits(used_count, uses)
                .map_err(DomainError::from)?;
        }

        let sequence: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO order_sequences (day, last_value)
            VALUES ($1, 1)
            ON CONFLICT (day) DO UPDATE SET last_value = order_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(plan.order_day())
        .fetch_one(&mut *tx)
        .await?;
        let order_number = OrderNumber::for_day(plan.order_day(), to_u32(sequence, "last_value")?);
        let order = plan.to_order(order_number.clone());

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, user_id, status, payment_status, subtotal_cents,
                                discount_cents, shipping_cents, tax_cents, total_cents, coupon_id,
                                coupon_code, shipping_address, payment_method, notes,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.subtotal.cents())
        .bind(order.discount.cents())
        .bind(order.shipping_cost.cents())
        .bind(order.tax.cents())
        .bind(order.total.cents())
        .bind(order.coupon_id.map(|c| c.as_uuid()))
        .bind(order.coupon_code.as_deref())
        .bind(Json(&order.shipping_address))
        .bind(order.payment_method.as_str())
        .bind(order.notes.as_deref())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::UniqueViolation { constraint }
                if constraint == "orders_order_number_key" =>
            {
                StoreError::conflict("Order", order.order_number.as_str(), "order number taken")
            }
            other => other,
        })?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, product_name, quantity,
                                         unit_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_uuid())
            .bind(&item.product_name)
            .bind(to_i32(item.quantity)?)
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        for entry in plan.sale_entries(&order_number) {
            write_movement(&mut tx, &entry, plan.placed_at).await?;
        }

        if let Some(usage) = plan.coupon_usage() {
            let redeemed = sqlx::query(
                r#"
                UPDATE coupons
                SET used_count = used_count + 1
                WHERE id = $1 AND (usage_limit IS NULL OR used_count < usage_limit)
                "#,
            )
            .bind(usage.coupon_id.as_uuid())
            .execute(&mut *tx)
            .await?;
            if redeemed.rows_affected() == 0 {
                return Err(DomainError::from(domain::CouponRejection::UsageLimitReached).into());
            }
            sqlx::query(
                r#"
                INSERT INTO coupon_usages (coupon_id, user_id, order_id, used_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(usage.coupon_id.as_uuid())
            .bind(usage.user_id.as_uuid())
            .bind(usage.order_id.as_uuid())
            .bind(usage.used_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(plan.cart_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        metrics::histogram!("store_checkout_commit_seconds").record(start.elapsed().as_secs_f64());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut items = self.load_order_items(&[id.as_uuid()]).await?;
        order_from_row(&row, items.remove(&id.as_uuid()).unwrap_or_default()).map(Some)
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE TRUE"
        ));
        if let Some(user_id) = query.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.as_uuid());
        }
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(from) = query.from {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = query.to {
            qb.push(" AND created_at <= ").push_bind(to);
        }
        qb.push(" ORDER BY created_at DESC, order_number DESC");
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            qb.push(" OFFSET ").push_bind(offset as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.load_order_items(&ids).await?;
        rows.iter()
            .zip(ids)
            .map(|(row, id)| order_from_row(row, items.remove(&id).unwrap_or_default()))
            .collect()
    }

    async fn commit_status_change(&self, change: &StatusChange) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, updated_at = $4
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(change.order_id.as_uuid())
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .bind(change.at)
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                    .bind(change.order_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(status) = status else {
                return Err(DomainError::not_found("Order", change.order_id).into());
            };
            let actual: domain::OrderStatus = parse_column(&status)?;
            return Err(if actual.can_transition_to(change.to) {
                StoreError::conflict(
                    "Order",
                    change.order_id,
                    format!("status moved from {} to {actual}", change.from),
                )
            } else {
                DomainError::InvalidStateTransition {
                    from: actual,
                    to: change.to,
                }
                .into()
            });
        }

        let mut restock: Vec<&InventoryLogEntry> = change.restock.iter().collect();
        restock.sort_by_key(|e| e.product_id);
        for entry in restock {
            lock_product(&mut tx, entry.product_id).await?;
            write_movement(&mut tx, entry, change.at).await?;
        }

        tx.commit().await?;
        self.get_order(change.order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", change.order_id).into())
    }

    async fn update_payment_status(
        &self,
        order_id: OrderId,
        expected: PaymentStatus,
        next: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Order> {
        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $3, updated_at = $4
            WHERE id = $1 AND payment_status = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        let order = self
            .get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", order_id))?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::conflict(
                "Order",
                order_id,
                format!("payment status moved from {expected} to {}", order.payment_status),
            ));
        }
        Ok(order)
    }
}
