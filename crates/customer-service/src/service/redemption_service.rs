//! 奖励兑换服务
//!
//! ## 兑换流程
//!
//! 1. 锁定积分行 -> 2. 余额检查 -> 3. 扣减积分
//!    -> 4. 写入流水 -> 5. 写入兑换记录 -> 6. 提交
//!
//! 兑换是同步操作，不产生跨服务事件。

use std::sync::Arc;
use std::time::Instant;

use leal_shared::events::reasons;
use leal_shared::observability::metrics;
use tracing::{info, instrument, warn};

use crate::error::{LedgerError, Result};
use crate::models::{NewRedemption, NewTransaction};
use crate::repository::LedgerStore;
use crate::service::dto::{RedeemRequest, RedemptionReceipt};

/// 奖励兑换服务
pub struct RedemptionService<S>
where
    S: LedgerStore + ?Sized,
{
    store: Arc<S>,
}

impl<S> RedemptionService<S>
where
    S: LedgerStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// 兑换奖励
    #[instrument(
        skip(self, request),
        fields(
            customer_id = request.customer_id,
            brand_id = request.brand_id,
            reward_id = request.reward_id
        )
    )]
    pub async fn redeem_reward(&self, request: &RedeemRequest) -> Result<RedemptionReceipt> {
        let started = Instant::now();
        let result = self.execute(request).await;

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.error_code(),
        };
        metrics::record_redemption(status, started.elapsed().as_secs_f64());

        match &result {
            Ok(receipt) => info!(
                redemption_id = receipt.record.id,
                points_spent = request.points_spend,
                remaining_points = receipt.remaining_points,
                "奖励兑换成功"
            ),
            Err(e) => warn!(error = %e, code = e.error_code(), "奖励兑换失败"),
        }

        result
    }

    async fn execute(&self, request: &RedeemRequest) -> Result<RedemptionReceipt> {
        request.validate()?;

        let mut uow = self.store.begin().await?;

        let balance = uow
            .get_points(request.customer_id, request.brand_id)
            .await?
            .ok_or(LedgerError::PointsRecordNotFound {
                customer_id: request.customer_id,
                brand_id: request.brand_id,
            })?;

        if balance.points < request.points_spend {
            return Err(LedgerError::InsufficientPoints {
                required: request.points_spend,
                available: balance.points,
            });
        }

        let remaining_points = uow
            .upsert_points(request.customer_id, request.brand_id, -request.points_spend)
            .await?;

        uow.record_transaction(&NewTransaction::new(
            request.customer_id,
            request.brand_id,
            -request.points_spend,
            reasons::REDEEM,
        ))
        .await?;

        let record = uow
            .record_redemption(&NewRedemption {
                customer_id: request.customer_id,
                brand_id: request.brand_id,
                reward_id: request.reward_id,
                points_spent: request.points_spend,
            })
            .await?;

        uow.commit().await?;

        Ok(RedemptionReceipt {
            record,
            remaining_points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryLedgerStore;

    fn request(points_spend: i64) -> RedeemRequest {
        RedeemRequest {
            customer_id: 1,
            brand_id: 2,
            reward_id: 30,
            points_spend,
        }
    }

    async fn store_with_points(points: i64) -> Arc<MemoryLedgerStore> {
        let store = Arc::new(MemoryLedgerStore::new());
        let mut uow = store.begin().await.unwrap();
        uow.upsert_points(1, 2, points).await.unwrap();
        uow.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_redeem_debits_points_and_logs() {
        let store = store_with_points(100).await;
        let service = RedemptionService::new(store.clone());

        let receipt = service.redeem_reward(&request(40)).await.unwrap();

        assert_eq!(receipt.remaining_points, 60);
        assert_eq!(receipt.record.points_spent, 40);
        assert_eq!(receipt.record.reward_id, 30);
        assert_eq!(store.points_of(1, 2).await, Some(60));

        let log = store.list_transactions(1, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].change, -40);
        assert_eq!(log[0].reason, "Redeem reward");
    }

    #[tokio::test]
    async fn test_exact_balance_can_be_spent() {
        let store = store_with_points(25).await;
        let service = RedemptionService::new(store.clone());

        let receipt = service.redeem_reward(&request(25)).await.unwrap();
        assert_eq!(receipt.remaining_points, 0);
    }

    #[tokio::test]
    async fn test_insufficient_points_leaves_no_trace() {
        let store = store_with_points(10).await;
        let service = RedemptionService::new(store.clone());

        let err = service.redeem_reward(&request(11)).await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::InsufficientPoints {
                required: 11,
                available: 10
            }
        ));
        assert_eq!(store.points_of(1, 2).await, Some(10));
        assert!(store.list_transactions(1, 10).await.unwrap().is_empty());
        assert!(store.list_redemptions(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_points_record() {
        let service = RedemptionService::new(Arc::new(MemoryLedgerStore::new()));

        let err = service.redeem_reward(&request(1)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::PointsRecordNotFound {
                customer_id: 1,
                brand_id: 2
            }
        ));
    }
}
