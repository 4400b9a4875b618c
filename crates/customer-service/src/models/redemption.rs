//! 兑换记录模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 奖励兑换记录，不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RedemptionRecord {
    pub id: i64,
    pub customer_id: i64,
    pub brand_id: i64,
    pub reward_id: i64,
    pub points_spent: i64,
    pub redeemed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRedemption {
    pub customer_id: i64,
    pub brand_id: i64,
    pub reward_id: i64,
    pub points_spent: i64,
}
