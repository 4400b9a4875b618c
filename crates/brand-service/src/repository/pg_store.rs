//! PostgreSQL 活动存储

use async_trait::async_trait;
use leal_shared::error::Result as SharedResult;
use leal_shared::idempotency::{IdempotencyPort, try_mark_processed_in_tx};
use leal_shared::outbox::{NewOutboxMessage, OutboxPort, PgOutboxStore};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::traits::{CampaignPort, CampaignStore, CampaignUnitOfWork};
use crate::error::{AccrualError, Result};
use crate::models::{BASE_CAMPAIGN_NAME, Campaign};

/// 查询活动时附带关联门店
const CAMPAIGN_COLUMNS: &str = r#"
    c.id, c.brand_id, c.name, c.min_value, c.max_value, c.start_date, c.end_date,
    c.point_factor, c.coin_factor, c.status, c.customer_count,
    ARRAY(SELECT cb.branch_id FROM campaign_branches cb WHERE cb.campaign_id = c.id ORDER BY cb.branch_id) AS branch_ids
"#;

/// 基于 PostgreSQL 的活动存储
#[derive(Clone)]
pub struct PgCampaignStore {
    pool: PgPool,
}

impl PgCampaignStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 在事务中读取品牌的基础活动
    pub async fn get_base_campaign_in_tx(
        conn: &mut PgConnection,
        brand_id: i64,
    ) -> Result<Option<Campaign>> {
        let sql = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns c WHERE c.brand_id = $1 AND c.name = $2 LIMIT 1"
        );
        let campaign = sqlx::query_as::<_, Campaign>(&sql)
            .bind(brand_id)
            .bind(BASE_CAMPAIGN_NAME)
            .fetch_optional(conn)
            .await?;
        Ok(campaign)
    }

    /// 在事务中读取门店关联的活动
    pub async fn get_campaigns_for_branch_in_tx(
        conn: &mut PgConnection,
        branch_id: i64,
    ) -> Result<Vec<Campaign>> {
        let sql = format!(
            r#"
            SELECT {CAMPAIGN_COLUMNS}
            FROM campaigns c
            JOIN campaign_branches b ON b.campaign_id = c.id
            WHERE b.branch_id = $1
            ORDER BY c.id
            "#
        );
        let campaigns = sqlx::query_as::<_, Campaign>(&sql)
            .bind(branch_id)
            .fetch_all(conn)
            .await?;
        Ok(campaigns)
    }

    /// 在事务中递增命中计数
    ///
    /// 单条 UPDATE 由数据库保证原子性，并发的购买不会丢失计数。
    pub async fn increment_customer_count_in_tx(
        conn: &mut PgConnection,
        campaign_id: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE campaigns SET customer_count = customer_count + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(campaign_id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AccrualError::InvalidCampaign(format!(
                "活动不存在: {campaign_id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CampaignStore for PgCampaignStore {
    async fn begin(&self) -> Result<Box<dyn CampaignUnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCampaignUnitOfWork { tx }))
    }

    async fn save_campaign(&self, campaign: &Campaign) -> Result<i64> {
        campaign.validate()?;

        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO campaigns (brand_id, name, min_value, max_value, start_date, end_date,
                                   point_factor, coin_factor, status, customer_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
            RETURNING id
            "#,
        )
        .bind(campaign.brand_id)
        .bind(&campaign.name)
        .bind(campaign.min_value)
        .bind(campaign.max_value)
        .bind(campaign.start_date)
        .bind(campaign.end_date)
        .bind(campaign.point_factor)
        .bind(campaign.coin_factor)
        .bind(campaign.status)
        .bind(campaign.customer_count)
        .fetch_one(&mut *tx)
        .await?;

        for branch_id in &campaign.branch_ids {
            sqlx::query(
                "INSERT INTO campaign_branches (campaign_id, branch_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(branch_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(campaign_id = id, brand_id = campaign.brand_id, "活动已保存");
        Ok(id)
    }

    async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns c WHERE c.id = $1");
        let campaign = sqlx::query_as::<_, Campaign>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(campaign)
    }

    async fn link_branch_to_base(&self, brand_id: i64, branch_id: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        let base = Self::get_base_campaign_in_tx(&mut *conn, brand_id)
            .await?
            .ok_or(AccrualError::NoBaseCampaign(brand_id))?;

        sqlx::query(
            "INSERT INTO campaign_branches (campaign_id, branch_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(base.id)
        .bind(branch_id)
        .execute(&mut *conn)
        .await?;

        debug!(campaign_id = base.id, brand_id, branch_id, "门店已关联基础活动");
        Ok(base.id)
    }
}

/// PostgreSQL 事务单元，未提交即丢弃时由 sqlx 回滚
pub struct PgCampaignUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CampaignPort for PgCampaignUnitOfWork {
    async fn get_base_campaign(&mut self, brand_id: i64) -> Result<Option<Campaign>> {
        PgCampaignStore::get_base_campaign_in_tx(&mut self.tx, brand_id).await
    }

    async fn get_campaigns_for_branch(&mut self, branch_id: i64) -> Result<Vec<Campaign>> {
        PgCampaignStore::get_campaigns_for_branch_in_tx(&mut self.tx, branch_id).await
    }

    async fn increment_customer_count(&mut self, campaign_id: i64) -> Result<()> {
        PgCampaignStore::increment_customer_count_in_tx(&mut self.tx, campaign_id).await
    }
}

#[async_trait]
impl IdempotencyPort for PgCampaignUnitOfWork {
    async fn try_mark_processed(&mut self, event_id: Uuid) -> SharedResult<bool> {
        try_mark_processed_in_tx(&mut self.tx, event_id).await
    }
}

#[async_trait]
impl OutboxPort for PgCampaignUnitOfWork {
    async fn enqueue(&mut self, message: NewOutboxMessage) -> SharedResult<i64> {
        PgOutboxStore::enqueue_in_tx(&mut self.tx, &message).await
    }
}

#[async_trait]
impl CampaignUnitOfWork for PgCampaignUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
