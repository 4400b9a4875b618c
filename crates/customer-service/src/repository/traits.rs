//! 仓储 Trait 定义
//!
//! 入账、购买、兑换各自是一个事务单元：所有读写（含幂等登记与 outbox）
//! 在 `commit` 时一起生效，未提交即丢弃则全部回滚。

use async_trait::async_trait;
use leal_shared::idempotency::IdempotencyPort;
use leal_shared::outbox::OutboxPort;

use crate::error::Result;
use crate::models::{
    Customer, NewPurchase, NewRedemption, NewTransaction, Purchase, PointsBalance,
    RedemptionRecord, TransactionLogEntry,
};

/// 客户读取端口（事务内）
#[async_trait]
pub trait CustomerPort: Send {
    async fn get_customer(&mut self, customer_id: i64) -> Result<Option<Customer>>;
}

/// 账本读写端口（事务内）
///
/// `get_points` / `get_coins` 会锁定对应的余额行直到事务结束。
#[async_trait]
pub trait LedgerPort: Send {
    /// 追加一条积分流水，返回流水 ID
    async fn record_transaction(&mut self, entry: &NewTransaction) -> Result<i64>;

    /// 积分增减，不存在则创建；结果下限为 0，返回新余额
    async fn upsert_points(&mut self, customer_id: i64, brand_id: i64, delta: i64) -> Result<i64>;

    /// 金币增减，不存在则创建；结果下限为 0，返回新余额
    async fn upsert_coins(&mut self, customer_id: i64, delta: i64) -> Result<i64>;

    /// 锁定并读取积分余额，没有记录时返回 None
    async fn get_points(&mut self, customer_id: i64, brand_id: i64)
    -> Result<Option<PointsBalance>>;

    /// 锁定并读取金币余额，没有记录视为 0
    async fn get_coins(&mut self, customer_id: i64) -> Result<i64>;
}

/// 购买记录端口（事务内）
#[async_trait]
pub trait PurchasePort: Send {
    async fn record_purchase(&mut self, purchase: &NewPurchase) -> Result<Purchase>;
}

/// 兑换记录端口（事务内）
#[async_trait]
pub trait RedemptionPort: Send {
    async fn record_redemption(&mut self, redemption: &NewRedemption) -> Result<RedemptionRecord>;
}

/// 客户侧事务单元
#[async_trait]
pub trait LedgerUnitOfWork:
    CustomerPort + LedgerPort + PurchasePort + RedemptionPort + IdempotencyPort + OutboxPort
{
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// 账本存储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// 开启事务单元
    async fn begin(&self) -> Result<Box<dyn LedgerUnitOfWork>>;

    /// 写入或更新客户资料
    async fn save_customer(&self, customer: &Customer) -> Result<()>;

    async fn find_customer(&self, customer_id: i64) -> Result<Option<Customer>>;

    /// 客户在各品牌下的积分
    async fn list_points(&self, customer_id: i64) -> Result<Vec<PointsBalance>>;

    /// 金币余额，没有记录视为 0
    async fn coin_balance(&self, customer_id: i64) -> Result<i64>;

    /// 按时间倒序的积分流水
    async fn list_transactions(&self, customer_id: i64, limit: i64)
    -> Result<Vec<TransactionLogEntry>>;

    async fn list_purchases(&self, customer_id: i64) -> Result<Vec<Purchase>>;

    async fn list_redemptions(&self, customer_id: i64) -> Result<Vec<RedemptionRecord>>;
}
