//! 余额查询服务
//!
//! 只读查询，直接走存储的非事务读取。

use std::sync::Arc;

use tracing::instrument;

use crate::error::{LedgerError, Result};
use crate::models::PointsBalance;
use crate::repository::LedgerStore;
use crate::service::dto::{BalanceSummary, TransactionHistory};

/// 流水查询的默认与最大条数
const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

pub struct BalanceQueryService<S>
where
    S: LedgerStore + ?Sized,
{
    store: Arc<S>,
}

impl<S> BalanceQueryService<S>
where
    S: LedgerStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// 客户在各品牌下的积分
    #[instrument(skip(self))]
    pub async fn points(&self, customer_id: i64) -> Result<Vec<PointsBalance>> {
        self.store.list_points(customer_id).await
    }

    /// 客户的金币余额
    #[instrument(skip(self))]
    pub async fn coins(&self, customer_id: i64) -> Result<i64> {
        self.ensure_customer(customer_id).await?;
        self.store.coin_balance(customer_id).await
    }

    /// 积分与金币的汇总
    #[instrument(skip(self))]
    pub async fn summary(&self, customer_id: i64) -> Result<BalanceSummary> {
        self.ensure_customer(customer_id).await?;
        Ok(BalanceSummary {
            customer_id,
            coins: self.store.coin_balance(customer_id).await?,
            points: self.store.list_points(customer_id).await?,
        })
    }

    /// 最近的积分流水，`limit` 缺省 50，最多 500
    #[instrument(skip(self))]
    pub async fn history(&self, customer_id: i64, limit: Option<i64>) -> Result<TransactionHistory> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        Ok(TransactionHistory {
            customer_id,
            entries: self.store.list_transactions(customer_id, limit).await?,
        })
    }

    async fn ensure_customer(&self, customer_id: i64) -> Result<()> {
        self.store
            .find_customer(customer_id)
            .await?
            .map(|_| ())
            .ok_or(LedgerError::CustomerNotFound(customer_id))
    }
}
