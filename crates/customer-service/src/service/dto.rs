//! 服务层数据传输对象
//!
//! 请求由外部接入层（HTTP 等）构造，返回值同样交给接入层序列化

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::models::{PointsBalance, Purchase, RedemptionRecord, TransactionLogEntry};

/// 购买请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub customer_id: i64,
    pub brand_id: i64,
    pub branch_id: i64,
    pub amount: f64,
    #[serde(default)]
    pub coins_used: i64,
    /// 缺省为受理时刻
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<DateTime<Utc>>,
}

impl PurchaseRequest {
    pub fn new(customer_id: i64, brand_id: i64, branch_id: i64, amount: f64, coins_used: i64) -> Self {
        Self {
            customer_id,
            brand_id,
            branch_id,
            amount,
            coins_used,
            purchase_date: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(LedgerError::InvalidRequest(format!(
                "金额必须为正数: {}",
                self.amount
            )));
        }
        if self.coins_used < 0 {
            return Err(LedgerError::InvalidRequest(format!(
                "coins_used 不能为负: {}",
                self.coins_used
            )));
        }
        Ok(())
    }
}

/// 购买结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub purchase: Purchase,
    pub remaining_coins: i64,
    pub outbox_id: i64,
}

/// 兑换请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub customer_id: i64,
    pub brand_id: i64,
    pub reward_id: i64,
    pub points_spend: i64,
}

impl RedeemRequest {
    pub fn validate(&self) -> Result<()> {
        if self.points_spend < 0 {
            return Err(LedgerError::InvalidRequest(format!(
                "points_spend 不能为负: {}",
                self.points_spend
            )));
        }
        Ok(())
    }
}

/// 兑换结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionReceipt {
    pub record: RedemptionRecord,
    pub remaining_points: i64,
}

/// 客户余额概览
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummary {
    pub customer_id: i64,
    pub coins: i64,
    pub points: Vec<PointsBalance>,
}

/// 流水分页结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionHistory {
    pub customer_id: i64,
    pub entries: Vec<TransactionLogEntry>,
}
