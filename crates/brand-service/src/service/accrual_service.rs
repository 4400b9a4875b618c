//! 积分计算服务
//!
//! 处理一条购买事件：
//!
//! 1. 登记事件 ID（重复投递直接返回 `Duplicate`）
//! 2. 读取品牌基础活动，按基础系数计算基础积分/金币
//! 3. 读取门店关联活动，逐个匹配；命中的活动计数加一，
//!    并在基础奖励上叠加 `基础值 × 活动系数`（加成之间不复利）
//! 4. 截断为整数，生成入账事件写入 outbox
//! 5. 以上全部在同一事务内提交；任何一步失败，计数与 outbox 一起回滚

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use leal_shared::events::{AccrualEvent, PurchaseEvent};
use leal_shared::observability::metrics;
use leal_shared::outbox::NewOutboxMessage;
use tracing::{debug, info, instrument};

use crate::error::{AccrualError, Result};
use crate::models::Campaign;
use crate::repository::CampaignStore;

/// 一次购买的奖励合计（浮点，尚未截断）
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualTotals {
    pub points: f64,
    pub coins: f64,
    pub matched_campaign_ids: Vec<i64>,
}

/// 处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum AccrualOutcome {
    /// 已计算并写入 outbox
    Accrued {
        event: AccrualEvent,
        matched_campaigns: usize,
    },
    /// 事件已处理过，本次未做任何变更
    Duplicate,
}

/// 计算一次购买的奖励
///
/// 门店开设时会关联基础活动，因此基础活动也出现在门店活动里：
/// 命中时同样计数，并叠加 `基础值 × 基础系数`。
pub fn compute_accrual(
    base: &Campaign,
    branch_campaigns: &[Campaign],
    amount: f64,
    purchase_date: DateTime<Utc>,
) -> AccrualTotals {
    let base_points = amount * base.point_factor;
    let base_coins = amount * base.coin_factor;

    let mut totals = AccrualTotals {
        points: base_points,
        coins: base_coins,
        matched_campaign_ids: Vec::new(),
    };

    for campaign in branch_campaigns
        .iter()
        .filter(|c| c.matches(amount, purchase_date))
    {
        totals.points += base_points * campaign.point_factor;
        totals.coins += base_coins * campaign.coin_factor;
        totals.matched_campaign_ids.push(campaign.id);
    }

    totals
}

/// 积分计算服务
pub struct AccrualService<S>
where
    S: CampaignStore + ?Sized,
{
    store: Arc<S>,
    apply_points_topic: String,
}

impl<S> AccrualService<S>
where
    S: CampaignStore + ?Sized,
{
    pub fn new(store: Arc<S>, apply_points_topic: impl Into<String>) -> Self {
        Self {
            store,
            apply_points_topic: apply_points_topic.into(),
        }
    }

    /// 处理购买事件
    #[instrument(
        skip(self, purchase),
        fields(
            event_id = %purchase.event_id,
            customer_id = purchase.customer_id,
            brand_id = purchase.brand_id,
            branch_id = purchase.branch_id
        )
    )]
    pub async fn process_purchase(&self, purchase: &PurchaseEvent) -> Result<AccrualOutcome> {
        validate_purchase(purchase)?;
        let started = Instant::now();

        let mut uow = self.store.begin().await?;

        if !uow.try_mark_processed(purchase.event_id).await? {
            info!("购买事件已处理过，跳过");
            return Ok(AccrualOutcome::Duplicate);
        }

        let base = uow
            .get_base_campaign(purchase.brand_id)
            .await?
            .ok_or(AccrualError::NoBaseCampaign(purchase.brand_id))?;

        let campaigns = uow.get_campaigns_for_branch(purchase.branch_id).await?;
        let totals = compute_accrual(&base, &campaigns, purchase.amount, purchase.purchase_date);

        for campaign_id in &totals.matched_campaign_ids {
            uow.increment_customer_count(*campaign_id).await?;
        }

        let event = AccrualEvent::for_purchase(purchase, totals.points, totals.coins);
        let message =
            NewOutboxMessage::json(&self.apply_points_topic, event.message_key(), &event)?;
        let outbox_id = uow.enqueue(message).await?;

        uow.commit().await?;

        let matched_campaigns = totals.matched_campaign_ids.len();
        metrics::record_accrual_computed(purchase.brand_id, matched_campaigns);
        debug!(outbox_id, elapsed_ms = started.elapsed().as_millis() as u64, "入账事件已写入 outbox");
        info!(
            points = event.points,
            coins = event.coins,
            raw_points = totals.points,
            raw_coins = totals.coins,
            matched_campaigns,
            "购买奖励计算完成"
        );

        Ok(AccrualOutcome::Accrued {
            event,
            matched_campaigns,
        })
    }
}

fn validate_purchase(purchase: &PurchaseEvent) -> Result<()> {
    if !purchase.amount.is_finite() || purchase.amount <= 0.0 {
        return Err(AccrualError::InvalidPurchase(format!(
            "金额必须为正数: {}",
            purchase.amount
        )));
    }
    if purchase.coins_used < 0 {
        return Err(AccrualError::InvalidPurchase(format!(
            "coins_used 不能为负: {}",
            purchase.coins_used
        )));
    }
    Ok(())
}
