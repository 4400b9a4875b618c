//! 账本入账服务
//!
//! 一条入账事件在同一事务内完成：
//!
//! 1. 登记事件 ID，已登记则什么也不做
//! 2. 追加积分流水
//! 3. 积分 upsert（下限 0）
//! 4. 金币 upsert（下限 0）
//!
//! 提交成功后消费端才提交偏移量；任何一步失败整体回滚，消息会被重新投递。

use std::sync::Arc;
use std::time::Instant;

use leal_shared::events::AccrualEvent;
use leal_shared::observability::metrics;
use tracing::{info, instrument};

use crate::error::Result;
use crate::models::NewTransaction;
use crate::repository::LedgerStore;

/// 入账结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { points: i64, coins: i64 },
    /// 事件已入账过
    Duplicate,
}

/// 账本入账服务
pub struct LedgerService<S>
where
    S: LedgerStore + ?Sized,
{
    store: Arc<S>,
}

impl<S> LedgerService<S>
where
    S: LedgerStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// 应用一条入账事件
    #[instrument(
        skip(self, event),
        fields(
            event_id = %event.event_id,
            customer_id = event.customer_id,
            brand_id = event.brand_id
        )
    )]
    pub async fn apply_accrual(&self, event: &AccrualEvent) -> Result<ApplyOutcome> {
        let started = Instant::now();
        let mut uow = self.store.begin().await?;

        if !uow.try_mark_processed(event.event_id).await? {
            metrics::record_accrual_applied("duplicate", started.elapsed().as_secs_f64());
            info!("入账事件已处理过，跳过");
            return Ok(ApplyOutcome::Duplicate);
        }

        uow.record_transaction(&NewTransaction::new(
            event.customer_id,
            event.brand_id,
            event.points,
            event.reason.clone(),
        ))
        .await?;
        let points = uow
            .upsert_points(event.customer_id, event.brand_id, event.points)
            .await?;
        let coins = uow.upsert_coins(event.customer_id, event.coins).await?;

        uow.commit().await?;

        metrics::record_accrual_applied("applied", started.elapsed().as_secs_f64());
        info!(
            delta_points = event.points,
            delta_coins = event.coins,
            points,
            coins,
            reason = %event.reason,
            "入账完成"
        );

        Ok(ApplyOutcome::Applied { points, coins })
    }
}
