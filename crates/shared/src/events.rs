//! 跨服务事件定义
//!
//! 两个服务之间只通过两类事件通信：
//! - `PurchaseEvent`：客户侧记录购买后发布到 `purchase` 频道，品牌侧消费
//! - `AccrualEvent`：品牌侧计算出奖励后发布到 `apply-points` 频道，客户侧消费
//!
//! 每个事件都带有 `event_id`，消费方以它做幂等去重，因此至少一次投递是安全的。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::kafka::ConsumerMessage;

/// 默认频道名
pub mod channels {
    pub const PURCHASE: &str = "purchase";
    pub const APPLY_POINTS: &str = "apply-points";
}

/// 入账原因
pub mod reasons {
    /// 购买产生的奖励
    pub const PURCHASE: &str = "purchase";
    /// 兑换奖品时的积分扣减
    pub const REDEEM: &str = "Redeem reward";
}

/// 入账事件 ID 的命名空间，用于从购买事件 ID 派生出确定性的 v5 UUID
const ACCRUAL_NAMESPACE: Uuid = Uuid::from_u128(0x6c65_616c_2d61_6363_7275_616c_2d65_7674);

// ---------------------------------------------------------------------------
// PurchaseEvent
// ---------------------------------------------------------------------------

/// 购买事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub event_id: Uuid,
    pub purchase_id: i64,
    pub customer_id: i64,
    pub brand_id: i64,
    pub amount: f64,
    pub branch_id: i64,
    pub coins_used: i64,
    pub purchase_date: DateTime<Utc>,
}

impl PurchaseEvent {
    /// 消息 key，同一客户的事件落在同一分区，保持相对顺序
    pub fn message_key(&self) -> String {
        self.customer_id.to_string()
    }
}

// ---------------------------------------------------------------------------
// AccrualEvent
// ---------------------------------------------------------------------------

/// 积分/金币入账事件
///
/// `points` 与 `coins` 可以为负（兑换扣减），入账时余额会被下限钳制为 0。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualEvent {
    pub event_id: Uuid,
    pub customer_id: i64,
    pub brand_id: i64,
    pub points: i64,
    pub coins: i64,
    pub reason: String,
}

impl AccrualEvent {
    /// 根据购买事件的累计奖励构造入账事件
    ///
    /// 奖励在浮点域内累加，这里才截断为整数（向零截断）。
    /// 同一购买事件重复处理时产生相同的 `event_id`，下游据此去重。
    pub fn for_purchase(purchase: &PurchaseEvent, total_points: f64, total_coins: f64) -> Self {
        Self {
            event_id: Self::derive_event_id(purchase.event_id),
            customer_id: purchase.customer_id,
            brand_id: purchase.brand_id,
            points: total_points.trunc() as i64,
            coins: total_coins.trunc() as i64,
            reason: reasons::PURCHASE.to_string(),
        }
    }

    pub fn derive_event_id(purchase_event_id: Uuid) -> Uuid {
        Uuid::new_v5(&ACCRUAL_NAMESPACE, purchase_event_id.as_bytes())
    }

    pub fn message_key(&self) -> String {
        self.customer_id.to_string()
    }
}

// ---------------------------------------------------------------------------
// 发布 / 消费抽象
// ---------------------------------------------------------------------------

/// 事件发布端口
///
/// 生产环境由 `KafkaProducer` 实现，测试中由 `MemoryEventBus` 实现。
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, channel: &str, key: &str, payload: &[u8]) -> Result<()>;
}

/// 消息处理结果，决定消费端如何处理偏移量
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// 处理完成（包括幂等跳过），提交偏移量
    Commit,
    /// 瞬时故障，不提交，稍后重新处理
    Retry { reason: String },
    /// 消息本身有问题，转入死信后提交
    DeadLetter { reason: String },
}

impl Ack {
    pub fn retry(reason: impl Into<String>) -> Self {
        Self::Retry {
            reason: reason.into(),
        }
    }

    pub fn dead_letter(reason: impl Into<String>) -> Self {
        Self::DeadLetter {
            reason: reason.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Retry { .. } => "retry",
            Self::DeadLetter { .. } => "dead_letter",
        }
    }
}

/// 事件处理器
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, message: &ConsumerMessage) -> Ack;
}
