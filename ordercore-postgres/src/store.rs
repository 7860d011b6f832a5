//! Port implementations and schema for the PostgreSQL adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ordercore::delivery::{Address, City, Delivery, DeliveryStatus, Street, ZipCode};
use ordercore::errors::{StoreError, StoreResult};
use ordercore::store::{
    CouponCatalog, ItemRecord, MemberDirectory, MemberRecord, OrderStore, Page, PageRequest,
    SortOrder, StockLedger,
};
use ordercore::{
    AppliedCoupon, Coupon, CouponCode, Discount, DiscountRate, ItemId, ItemName, MemberId,
    MemberName, Money, Order, OrderId, OrderLine, OrderStatus, Quantity, Timestamp,
};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{query, Row};
use tracing::{debug, instrument};

use crate::PostgresStore;

/// Statements run by `PostgresStore::initialize`.
pub(crate) const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS items (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        price NUMERIC(12,2) NOT NULL,
        stock BIGINT NOT NULL CHECK (stock >= 0)
    )",
    "CREATE TABLE IF NOT EXISTS members (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS coupons (
        code TEXT PRIMARY KEY,
        discount_kind TEXT NOT NULL,
        flat_amount NUMERIC(12,2),
        discount_rate NUMERIC(5,4),
        min_purchase NUMERIC(12,2),
        valid_from TIMESTAMPTZ,
        valid_until TIMESTAMPTZ
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id TEXT PRIMARY KEY,
        member_id TEXT NOT NULL REFERENCES members(id),
        status TEXT NOT NULL,
        ordered_at TIMESTAMPTZ NOT NULL,
        delivery_city TEXT NOT NULL,
        delivery_street TEXT NOT NULL,
        delivery_zip_code TEXT NOT NULL,
        delivery_status TEXT NOT NULL,
        coupon_code TEXT,
        discount_amount NUMERIC(12,2)
    )",
    "CREATE INDEX IF NOT EXISTS idx_orders_member_ordered_at
        ON orders (member_id, ordered_at DESC, id DESC)",
    "CREATE TABLE IF NOT EXISTS order_lines (
        order_id TEXT NOT NULL REFERENCES orders(id),
        line_no INT NOT NULL,
        item_id TEXT NOT NULL,
        item_name TEXT NOT NULL,
        unit_price NUMERIC(12,2) NOT NULL,
        quantity BIGINT NOT NULL,
        PRIMARY KEY (order_id, line_no)
    )",
];

fn decode_err(error: impl std::fmt::Display) -> StoreError {
    StoreError::Serialization(error.to_string())
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::Io(e) => StoreError::ConnectionFailed(e.to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::ConnectionFailed(error.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => decode_err(error),
        other => StoreError::Internal(other.to_string()),
    }
}

/// Database row for an order, delivery columns inlined.
#[derive(Debug)]
struct OrderRow {
    id: String,
    member_id: String,
    status: String,
    ordered_at: DateTime<Utc>,
    delivery_city: String,
    delivery_street: String,
    delivery_zip_code: String,
    delivery_status: String,
    coupon_code: Option<String>,
    discount_amount: Option<Decimal>,
}

impl TryFrom<&PgRow> for OrderRow {
    type Error = sqlx::Error;

    fn try_from(row: &PgRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            member_id: row.try_get("member_id")?,
            status: row.try_get("status")?,
            ordered_at: row.try_get("ordered_at")?,
            delivery_city: row.try_get("delivery_city")?,
            delivery_street: row.try_get("delivery_street")?,
            delivery_zip_code: row.try_get("delivery_zip_code")?,
            delivery_status: row.try_get("delivery_status")?,
            coupon_code: row.try_get("coupon_code")?,
            discount_amount: row.try_get("discount_amount")?,
        })
    }
}

impl OrderRow {
    /// Hydrate the aggregate from this row plus its line rows.
    fn into_order(self, lines: Vec<OrderLine>) -> StoreResult<Order> {
        let id = OrderId::try_new(self.id).map_err(decode_err)?;
        let member_id = MemberId::try_new(self.member_id).map_err(decode_err)?;
        let status: OrderStatus = self.status.parse().map_err(decode_err)?;
        let delivery_status: DeliveryStatus = self.delivery_status.parse().map_err(decode_err)?;
        let address = Address::new(
            City::try_new(self.delivery_city).map_err(decode_err)?,
            Street::try_new(self.delivery_street).map_err(decode_err)?,
            ZipCode::try_new(self.delivery_zip_code).map_err(decode_err)?,
        );

        let coupon = match (self.coupon_code, self.discount_amount) {
            (Some(code), Some(amount)) => Some(AppliedCoupon {
                code: CouponCode::try_new(code).map_err(decode_err)?,
                amount: Money::new(amount).map_err(decode_err)?,
            }),
            (None, None) => None,
            _ => {
                return Err(StoreError::Serialization(
                    "coupon_code and discount_amount must be set together".to_string(),
                ))
            }
        };

        Ok(Order::restore(
            id,
            member_id,
            Delivery::restore(address, delivery_status),
            lines,
            coupon,
            Timestamp::new(self.ordered_at),
            status,
        ))
    }
}

fn line_from_row(row: &PgRow) -> StoreResult<OrderLine> {
    let item_id: String = row.try_get("item_id").map_err(map_sqlx_error)?;
    let item_name: String = row.try_get("item_name").map_err(map_sqlx_error)?;
    let unit_price: Decimal = row.try_get("unit_price").map_err(map_sqlx_error)?;
    let quantity: i64 = row.try_get("quantity").map_err(map_sqlx_error)?;

    let quantity = u32::try_from(quantity).map_err(decode_err)?;
    OrderLine::new(
        ItemId::try_new(item_id).map_err(decode_err)?,
        ItemName::try_new(item_name).map_err(decode_err)?,
        Money::new(unit_price).map_err(decode_err)?,
        Quantity::new(quantity).map_err(decode_err)?,
    )
    .map_err(decode_err)
}

impl PostgresStore {
    /// Insert or replace an item.
    pub async fn upsert_item(&self, item: &ItemRecord) -> StoreResult<()> {
        query(
            "INSERT INTO items (id, name, price, stock) VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE
             SET name = EXCLUDED.name, price = EXCLUDED.price, stock = EXCLUDED.stock",
        )
        .bind(item.id.as_str())
        .bind(item.name.as_str())
        .bind(item.price.amount())
        .bind(i64::from(item.stock))
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Insert or replace a member.
    pub async fn upsert_member(&self, member: &MemberRecord) -> StoreResult<()> {
        query(
            "INSERT INTO members (id, name) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
        )
        .bind(member.id.as_str())
        .bind(member.name.as_str())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Insert or replace a coupon.
    pub async fn upsert_coupon(&self, coupon: &Coupon) -> StoreResult<()> {
        let (kind, flat_amount, discount_rate) = match coupon.discount {
            Discount::Flat(amount) => ("FLAT", Some(amount.amount()), None),
            Discount::Rate(rate) => ("RATE", None, Some(rate.fraction())),
        };
        query(
            "INSERT INTO coupons
                (code, discount_kind, flat_amount, discount_rate,
                 min_purchase, valid_from, valid_until)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (code) DO UPDATE
             SET discount_kind = EXCLUDED.discount_kind,
                 flat_amount = EXCLUDED.flat_amount,
                 discount_rate = EXCLUDED.discount_rate,
                 min_purchase = EXCLUDED.min_purchase,
                 valid_from = EXCLUDED.valid_from,
                 valid_until = EXCLUDED.valid_until",
        )
        .bind(coupon.code.as_str())
        .bind(kind)
        .bind(flat_amount)
        .bind(discount_rate)
        .bind(coupon.min_purchase.map(Money::amount))
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn lines_of(&self, order_id: &str) -> StoreResult<Vec<OrderLine>> {
        let rows = query(
            "SELECT item_id, item_name, unit_price, quantity
             FROM order_lines WHERE order_id = $1 ORDER BY line_no ASC",
        )
        .bind(order_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(line_from_row).collect()
    }
}

#[async_trait]
impl StockLedger for PostgresStore {
    #[instrument(name = "postgres.item", skip(self), fields(item = %id))]
    async fn item(&self, id: &ItemId) -> StoreResult<Option<ItemRecord>> {
        let row = query("SELECT id, name, price, stock FROM items WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else { return Ok(None) };

        let stock: i64 = row.try_get("stock").map_err(map_sqlx_error)?;
        let name: String = row.try_get("name").map_err(map_sqlx_error)?;
        let price: Decimal = row.try_get("price").map_err(map_sqlx_error)?;
        Ok(Some(ItemRecord::new(
            id.clone(),
            ItemName::try_new(name).map_err(decode_err)?,
            Money::new(price).map_err(decode_err)?,
            u32::try_from(stock).map_err(decode_err)?,
        )))
    }

    #[instrument(name = "postgres.reserve", skip(self), fields(item = %id, quantity = quantity.value()))]
    async fn reserve(&self, id: &ItemId, quantity: Quantity) -> StoreResult<()> {
        // Check and decrement in one statement; concurrent reservations
        // serialize on the row and the losing request matches zero rows.
        let result = query("UPDATE items SET stock = stock - $2 WHERE id = $1 AND stock >= $2")
            .bind(id.as_str())
            .bind(i64::from(quantity.value()))
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            debug!("stock reserved");
            return Ok(());
        }

        // Zero rows: either the item is gone or the stock ran short.
        let row = query("SELECT stock FROM items WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match row {
            None => Err(StoreError::ItemNotFound(id.clone())),
            Some(row) => {
                let available: i64 = row.try_get("stock").map_err(map_sqlx_error)?;
                Err(StoreError::InsufficientStock {
                    item: id.clone(),
                    requested: quantity.value(),
                    available: u32::try_from(available).map_err(decode_err)?,
                })
            }
        }
    }

    #[instrument(name = "postgres.release", skip(self), fields(item = %id, quantity = quantity.value()))]
    async fn release(&self, id: &ItemId, quantity: Quantity) -> StoreResult<()> {
        let result = query("UPDATE items SET stock = stock + $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(i64::from(quantity.value()))
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ItemNotFound(id.clone()));
        }
        debug!("stock released");
        Ok(())
    }
}

#[async_trait]
impl CouponCatalog for PostgresStore {
    #[instrument(name = "postgres.find_coupon", skip(self), fields(code = %code))]
    async fn find_by_code(&self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        let row = query(
            "SELECT code, discount_kind, flat_amount, discount_rate,
                    min_purchase, valid_from, valid_until
             FROM coupons WHERE code = $1",
        )
        .bind(code.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else { return Ok(None) };

        let kind: String = row.try_get("discount_kind").map_err(map_sqlx_error)?;
        let discount = match kind.as_str() {
            "FLAT" => {
                let amount: Decimal = row.try_get("flat_amount").map_err(map_sqlx_error)?;
                Discount::Flat(Money::new(amount).map_err(decode_err)?)
            }
            "RATE" => {
                let rate: Decimal = row.try_get("discount_rate").map_err(map_sqlx_error)?;
                Discount::Rate(DiscountRate::new(rate).map_err(decode_err)?)
            }
            other => {
                return Err(StoreError::Serialization(format!(
                    "unknown discount kind '{other}'"
                )))
            }
        };

        let min_purchase: Option<Decimal> = row.try_get("min_purchase").map_err(map_sqlx_error)?;
        let min_purchase = min_purchase
            .map(|amount| Money::new(amount).map_err(decode_err))
            .transpose()?;

        Ok(Some(Coupon {
            code: code.clone(),
            discount,
            min_purchase,
            valid_from: row.try_get("valid_from").map_err(map_sqlx_error)?,
            valid_until: row.try_get("valid_until").map_err(map_sqlx_error)?,
        }))
    }
}

#[async_trait]
impl MemberDirectory for PostgresStore {
    #[instrument(name = "postgres.find_member", skip(self), fields(member = %id))]
    async fn find(&self, id: &MemberId) -> StoreResult<Option<MemberRecord>> {
        let row = query("SELECT id, name FROM members WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else { return Ok(None) };
        let name: String = row.try_get("name").map_err(map_sqlx_error)?;
        Ok(Some(MemberRecord::new(
            id.clone(),
            MemberName::try_new(name).map_err(decode_err)?,
        )))
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    #[instrument(name = "postgres.insert_order", skip_all, fields(order = %order.id()))]
    async fn insert(&self, order: &Order) -> StoreResult<()> {
        // Order, delivery columns, and lines commit or roll back together.
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let (coupon_code, discount_amount) = match order.coupon() {
            Some(applied) => (Some(applied.code.as_str()), Some(applied.amount.amount())),
            None => (None, None),
        };

        query(
            "INSERT INTO orders
                (id, member_id, status, ordered_at,
                 delivery_city, delivery_street, delivery_zip_code, delivery_status,
                 coupon_code, discount_amount)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(order.id().as_str())
        .bind(order.member_id().as_str())
        .bind(order.status().to_string())
        .bind(order.ordered_at().into_datetime())
        .bind(order.delivery().address().city.as_str())
        .bind(order.delivery().address().street.as_str())
        .bind(order.delivery().address().zip_code.as_str())
        .bind(order.delivery().status().to_string())
        .bind(coupon_code)
        .bind(discount_amount)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        for (index, line) in order.lines().iter().enumerate() {
            query(
                "INSERT INTO order_lines
                    (order_id, line_no, item_id, item_name, unit_price, quantity)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(order.id().as_str())
            .bind(i32::try_from(index).map_err(decode_err)?)
            .bind(line.item_id().as_str())
            .bind(line.item_name().as_str())
            .bind(line.unit_price().amount())
            .bind(i64::from(line.quantity().value()))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!("order inserted");
        Ok(())
    }

    #[instrument(name = "postgres.find_order", skip(self), fields(order = %id))]
    async fn find(&self, id: &OrderId) -> StoreResult<Option<Order>> {
        let row = query(
            "SELECT id, member_id, status, ordered_at,
                    delivery_city, delivery_street, delivery_zip_code, delivery_status,
                    coupon_code, discount_amount
             FROM orders WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else { return Ok(None) };
        let order_row = OrderRow::try_from(&row).map_err(map_sqlx_error)?;
        let lines = self.lines_of(id.as_str()).await?;
        Ok(Some(order_row.into_order(lines)?))
    }

    #[instrument(name = "postgres.save_order", skip_all, fields(order = %order.id()))]
    async fn save(&self, order: &Order) -> StoreResult<()> {
        let (coupon_code, discount_amount) = match order.coupon() {
            Some(applied) => (Some(applied.code.as_str()), Some(applied.amount.amount())),
            None => (None, None),
        };

        let result = query(
            "UPDATE orders
             SET status = $2,
                 delivery_city = $3, delivery_street = $4, delivery_zip_code = $5,
                 delivery_status = $6, coupon_code = $7, discount_amount = $8
             WHERE id = $1",
        )
        .bind(order.id().as_str())
        .bind(order.status().to_string())
        .bind(order.delivery().address().city.as_str())
        .bind(order.delivery().address().street.as_str())
        .bind(order.delivery().address().zip_code.as_str())
        .bind(order.delivery().status().to_string())
        .bind(coupon_code)
        .bind(discount_amount)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order.id().clone()));
        }
        debug!("order saved");
        Ok(())
    }

    #[instrument(name = "postgres.list_orders", skip(self), fields(member = %member, page = request.page))]
    async fn list_by_member(
        &self,
        member: &MemberId,
        request: &PageRequest,
    ) -> StoreResult<Page<Order>> {
        let total: i64 = query("SELECT COUNT(*) AS total FROM orders WHERE member_id = $1")
            .bind(member.as_str())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .try_get("total")
            .map_err(map_sqlx_error)?;

        let statement = match request.sort {
            SortOrder::NewestFirst => {
                "SELECT id, member_id, status, ordered_at,
                        delivery_city, delivery_street, delivery_zip_code, delivery_status,
                        coupon_code, discount_amount
                 FROM orders WHERE member_id = $1
                 ORDER BY ordered_at DESC, id DESC LIMIT $2 OFFSET $3"
            }
            SortOrder::OldestFirst => {
                "SELECT id, member_id, status, ordered_at,
                        delivery_city, delivery_street, delivery_zip_code, delivery_status,
                        coupon_code, discount_amount
                 FROM orders WHERE member_id = $1
                 ORDER BY ordered_at ASC, id ASC LIMIT $2 OFFSET $3"
            }
        };

        let rows = query(statement)
            .bind(member.as_str())
            .bind(i64::from(u32::from(request.size)))
            .bind(i64::try_from(request.offset()).map_err(decode_err)?)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let order_row = OrderRow::try_from(row).map_err(map_sqlx_error)?;
            let lines = self.lines_of(&order_row.id).await?;
            items.push(order_row.into_order(lines)?);
        }

        Ok(Page::new(
            items,
            request,
            u64::try_from(total).map_err(decode_err)?,
        ))
    }
}
