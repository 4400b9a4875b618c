//! PostgreSQL 账本存储

use async_trait::async_trait;
use leal_shared::error::Result as SharedResult;
use leal_shared::idempotency::{IdempotencyPort, try_mark_processed_in_tx};
use leal_shared::outbox::{NewOutboxMessage, OutboxPort, PgOutboxStore};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::traits::{
    CustomerPort, LedgerPort, LedgerStore, LedgerUnitOfWork, PurchasePort, RedemptionPort,
};
use crate::error::Result;
use crate::models::{
    Customer, NewPurchase, NewRedemption, NewTransaction, PointsBalance, Purchase,
    RedemptionRecord, TransactionLogEntry,
};

/// 基于 PostgreSQL 的账本存储
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn get_customer_in_tx(
        conn: &mut PgConnection,
        customer_id: i64,
    ) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT id, name, email, phone, registered_at FROM customers WHERE id = $1",
        )
        .bind(customer_id)
        .fetch_optional(conn)
        .await?;
        Ok(customer)
    }

    pub async fn record_transaction_in_tx(
        conn: &mut PgConnection,
        entry: &NewTransaction,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO points_transactions (customer_id, brand_id, change, reason, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id
            "#,
        )
        .bind(entry.customer_id)
        .bind(entry.brand_id)
        .bind(entry.change)
        .bind(&entry.reason)
        .fetch_one(conn)
        .await?;
        Ok(id)
    }

    /// 积分 upsert
    ///
    /// 新行取 `max(delta, 0)`，已有行取 `max(points + delta, 0)`，单条语句完成读改写。
    pub async fn upsert_points_in_tx(
        conn: &mut PgConnection,
        customer_id: i64,
        brand_id: i64,
        delta: i64,
    ) -> Result<i64> {
        let points: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO points_balances (customer_id, brand_id, points, updated_at)
            VALUES ($1, $2, GREATEST($3, 0), NOW())
            ON CONFLICT (customer_id, brand_id)
            DO UPDATE SET points = GREATEST(points_balances.points + $3, 0), updated_at = NOW()
            RETURNING points
            "#,
        )
        .bind(customer_id)
        .bind(brand_id)
        .bind(delta)
        .fetch_one(conn)
        .await?;
        Ok(points)
    }

    pub async fn upsert_coins_in_tx(
        conn: &mut PgConnection,
        customer_id: i64,
        delta: i64,
    ) -> Result<i64> {
        let coins: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO coin_balances (customer_id, coins, updated_at)
            VALUES ($1, GREATEST($2, 0), NOW())
            ON CONFLICT (customer_id)
            DO UPDATE SET coins = GREATEST(coin_balances.coins + $2, 0), updated_at = NOW()
            RETURNING coins
            "#,
        )
        .bind(customer_id)
        .bind(delta)
        .fetch_one(conn)
        .await?;
        Ok(coins)
    }

    /// 锁定积分行（FOR UPDATE）
    pub async fn get_points_for_update(
        conn: &mut PgConnection,
        customer_id: i64,
        brand_id: i64,
    ) -> Result<Option<PointsBalance>> {
        let balance = sqlx::query_as::<_, PointsBalance>(
            r#"
            SELECT customer_id, brand_id, points
            FROM points_balances
            WHERE customer_id = $1 AND brand_id = $2
            FOR UPDATE
            "#,
        )
        .bind(customer_id)
        .bind(brand_id)
        .fetch_optional(conn)
        .await?;
        Ok(balance)
    }

    /// 锁定金币行（FOR UPDATE）
    pub async fn get_coins_for_update(conn: &mut PgConnection, customer_id: i64) -> Result<i64> {
        let coins: Option<i64> = sqlx::query_scalar(
            "SELECT coins FROM coin_balances WHERE customer_id = $1 FOR UPDATE",
        )
        .bind(customer_id)
        .fetch_optional(conn)
        .await?;
        Ok(coins.unwrap_or(0))
    }

    pub async fn record_purchase_in_tx(
        conn: &mut PgConnection,
        purchase: &NewPurchase,
    ) -> Result<Purchase> {
        let row = sqlx::query_as::<_, Purchase>(
            r#"
            INSERT INTO purchases (customer_id, brand_id, branch_id, amount, coins_used, purchase_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, customer_id, brand_id, branch_id, amount, coins_used, purchase_date
            "#,
        )
        .bind(purchase.customer_id)
        .bind(purchase.brand_id)
        .bind(purchase.branch_id)
        .bind(purchase.amount)
        .bind(purchase.coins_used)
        .bind(purchase.purchase_date)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    pub async fn record_redemption_in_tx(
        conn: &mut PgConnection,
        redemption: &NewRedemption,
    ) -> Result<RedemptionRecord> {
        let row = sqlx::query_as::<_, RedemptionRecord>(
            r#"
            INSERT INTO redemptions (customer_id, brand_id, reward_id, points_spent, redeemed_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, customer_id, brand_id, reward_id, points_spent, redeemed_at
            "#,
        )
        .bind(redemption.customer_id)
        .bind(redemption.brand_id)
        .bind(redemption.reward_id)
        .bind(redemption.points_spent)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerUnitOfWork { tx }))
    }

    async fn save_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, phone, registered_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, email = EXCLUDED.email, phone = EXCLUDED.phone
            "#,
        )
        .bind(customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(customer.registered_at)
        .execute(&self.pool)
        .await?;

        debug!(customer_id = customer.id, "客户资料已保存");
        Ok(())
    }

    async fn find_customer(&self, customer_id: i64) -> Result<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_customer_in_tx(&mut *conn, customer_id).await
    }

    async fn list_points(&self, customer_id: i64) -> Result<Vec<PointsBalance>> {
        let rows = sqlx::query_as::<_, PointsBalance>(
            r#"
            SELECT customer_id, brand_id, points
            FROM points_balances
            WHERE customer_id = $1
            ORDER BY brand_id
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn coin_balance(&self, customer_id: i64) -> Result<i64> {
        let coins: Option<i64> =
            sqlx::query_scalar("SELECT coins FROM coin_balances WHERE customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(coins.unwrap_or(0))
    }

    async fn list_transactions(
        &self,
        customer_id: i64,
        limit: i64,
    ) -> Result<Vec<TransactionLogEntry>> {
        let rows = sqlx::query_as::<_, TransactionLogEntry>(
            r#"
            SELECT id, customer_id, brand_id, change, reason, created_at
            FROM points_transactions
            WHERE customer_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(customer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_purchases(&self, customer_id: i64) -> Result<Vec<Purchase>> {
        let rows = sqlx::query_as::<_, Purchase>(
            r#"
            SELECT id, customer_id, brand_id, branch_id, amount, coins_used, purchase_date
            FROM purchases
            WHERE customer_id = $1
            ORDER BY id
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_redemptions(&self, customer_id: i64) -> Result<Vec<RedemptionRecord>> {
        let rows = sqlx::query_as::<_, RedemptionRecord>(
            r#"
            SELECT id, customer_id, brand_id, reward_id, points_spent, redeemed_at
            FROM redemptions
            WHERE customer_id = $1
            ORDER BY id
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// PostgreSQL 事务单元，未提交即丢弃时由 sqlx 回滚
pub struct PgLedgerUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CustomerPort for PgLedgerUnitOfWork {
    async fn get_customer(&mut self, customer_id: i64) -> Result<Option<Customer>> {
        PgLedgerStore::get_customer_in_tx(&mut self.tx, customer_id).await
    }
}

#[async_trait]
impl LedgerPort for PgLedgerUnitOfWork {
    async fn record_transaction(&mut self, entry: &NewTransaction) -> Result<i64> {
        PgLedgerStore::record_transaction_in_tx(&mut self.tx, entry).await
    }

    async fn upsert_points(&mut self, customer_id: i64, brand_id: i64, delta: i64) -> Result<i64> {
        PgLedgerStore::upsert_points_in_tx(&mut self.tx, customer_id, brand_id, delta).await
    }

    async fn upsert_coins(&mut self, customer_id: i64, delta: i64) -> Result<i64> {
        PgLedgerStore::upsert_coins_in_tx(&mut self.tx, customer_id, delta).await
    }

    async fn get_points(
        &mut self,
        customer_id: i64,
        brand_id: i64,
    ) -> Result<Option<PointsBalance>> {
        PgLedgerStore::get_points_for_update(&mut self.tx, customer_id, brand_id).await
    }

    async fn get_coins(&mut self, customer_id: i64) -> Result<i64> {
        PgLedgerStore::get_coins_for_update(&mut self.tx, customer_id).await
    }
}

#[async_trait]
impl PurchasePort for PgLedgerUnitOfWork {
    async fn record_purchase(&mut self, purchase: &NewPurchase) -> Result<Purchase> {
        PgLedgerStore::record_purchase_in_tx(&mut self.tx, purchase).await
    }
}

#[async_trait]
impl RedemptionPort for PgLedgerUnitOfWork {
    async fn record_redemption(&mut self, redemption: &NewRedemption) -> Result<RedemptionRecord> {
        PgLedgerStore::record_redemption_in_tx(&mut self.tx, redemption).await
    }
}

#[async_trait]
impl IdempotencyPort for PgLedgerUnitOfWork {
    async fn try_mark_processed(&mut self, event_id: Uuid) -> SharedResult<bool> {
        try_mark_processed_in_tx(&mut self.tx, event_id).await
    }
}

#[async_trait]
impl OutboxPort for PgLedgerUnitOfWork {
    async fn enqueue(&mut self, message: NewOutboxMessage) -> SharedResult<i64> {
        PgOutboxStore::enqueue_in_tx(&mut self.tx, &message).await
    }
}

#[async_trait]
impl LedgerUnitOfWork for PgLedgerUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
