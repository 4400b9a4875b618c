//! 仓储 Trait 定义
//!
//! 一次购买事件的处理是一个事务单元：登记事件 ID、读取活动、递增命中计数、
//! 写入 outbox，最后一起提交。事务单元被丢弃而未提交时全部回滚。

use async_trait::async_trait;
use leal_shared::idempotency::IdempotencyPort;
use leal_shared::outbox::OutboxPort;

use crate::error::Result;
use crate::models::Campaign;

/// 活动读写端口（事务内）
#[async_trait]
pub trait CampaignPort: Send {
    /// 品牌的基础活动
    async fn get_base_campaign(&mut self, brand_id: i64) -> Result<Option<Campaign>>;

    /// 关联到门店的全部活动（不做状态与时间过滤）
    async fn get_campaigns_for_branch(&mut self, branch_id: i64) -> Result<Vec<Campaign>>;

    /// 原子地将命中计数加一
    async fn increment_customer_count(&mut self, campaign_id: i64) -> Result<()>;
}

/// 品牌侧事务单元
#[async_trait]
pub trait CampaignUnitOfWork: CampaignPort + IdempotencyPort + OutboxPort {
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// 活动存储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// 开启事务单元
    async fn begin(&self) -> Result<Box<dyn CampaignUnitOfWork>>;

    /// 校验后保存活动，返回活动 ID
    async fn save_campaign(&self, campaign: &Campaign) -> Result<i64>;

    async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>>;

    /// 新门店开设时关联到品牌的基础活动，返回基础活动 ID
    ///
    /// 品牌没有基础活动时返回 `NoBaseCampaign`；重复关联不报错。
    async fn link_branch_to_base(&self, brand_id: i64, branch_id: i64) -> Result<i64>;
}
