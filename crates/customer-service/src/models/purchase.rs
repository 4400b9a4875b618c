//! 购买模型

use chrono::{DateTime, Utc};
use leal_shared::events::PurchaseEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 已落库的购买，不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Purchase {
    pub id: i64,
    pub customer_id: i64,
    pub brand_id: i64,
    pub branch_id: i64,
    pub amount: f64,
    pub coins_used: i64,
    pub purchase_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPurchase {
    pub customer_id: i64,
    pub brand_id: i64,
    pub branch_id: i64,
    pub amount: f64,
    pub coins_used: i64,
    pub purchase_date: DateTime<Utc>,
}

impl Purchase {
    /// 生成发往品牌侧的购买事件，`event_id` 每次调用都是新的
    pub fn to_event(&self) -> PurchaseEvent {
        PurchaseEvent {
            event_id: Uuid::now_v7(),
            purchase_id: self.id,
            customer_id: self.customer_id,
            brand_id: self.brand_id,
            amount: self.amount,
            branch_id: self.branch_id,
            coins_used: self.coins_used,
            purchase_date: self.purchase_date,
        }
    }
}
