//! 账本模型
//!
//! 流水只追加不修改；积分按 (客户, 品牌) 唯一，金币按客户唯一，余额均不为负。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 积分流水
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransactionLogEntry {
    pub id: i64,
    pub customer_id: i64,
    pub brand_id: i64,
    /// 带符号的积分变动
    pub change: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// 待写入的流水
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub customer_id: i64,
    pub brand_id: i64,
    pub change: i64,
    pub reason: String,
}

impl NewTransaction {
    pub fn new(customer_id: i64, brand_id: i64, change: i64, reason: impl Into<String>) -> Self {
        Self {
            customer_id,
            brand_id,
            change,
            reason: reason.into(),
        }
    }
}

/// 客户在某品牌下的积分余额
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PointsBalance {
    pub customer_id: i64,
    pub brand_id: i64,
    pub points: i64,
}

/// 客户的金币余额（跨品牌通用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CoinBalance {
    pub customer_id: i64,
    pub coins: i64,
}

/// 余额变动后不为负
pub fn clamp_balance(current: i64, delta: i64) -> i64 {
    current.saturating_add(delta).max(0)
}
