//! 兑换流程测试套件
//!
//! 购买攒积分后兑换奖励，积分余额与流水保持一致。

use customer_leal::error::LedgerError;
use customer_leal::repository::LedgerStore;
use customer_leal::service::{PurchaseRequest, RedeemRequest};

use crate::setup::TestEnvironment;

async fn earn_points(env: &TestEnvironment, customer_id: i64, purchases: usize) {
    for _ in 0..purchases {
        env.purchases
            .process_purchase(&PurchaseRequest::new(customer_id, 1, 10, 10_000.0, 0))
            .await
            .unwrap();
    }
    env.pump().await;
}

fn redeem(customer_id: i64, points_spend: i64) -> RedeemRequest {
    RedeemRequest {
        customer_id,
        brand_id: 1,
        reward_id: 500,
        points_spend,
    }
}

#[tokio::test]
async fn test_redeem_after_earning() {
    let env = TestEnvironment::new();
    env.onboard_brand(1).await;
    env.register_customer(21).await;
    earn_points(&env, 21, 3).await;

    let receipt = env.redemptions.redeem_reward(&redeem(21, 25)).await.unwrap();
    assert_eq!(receipt.remaining_points, 5);

    let history = env.queries.history(21, None).await.unwrap();
    assert_eq!(history.entries.len(), 4);
    assert_eq!(history.entries[0].change, -25);
    assert_eq!(history.entries[0].reason, "Redeem reward");

    // 账本流水之和等于余额
    let sum: i64 = history.entries.iter().map(|e| e.change).sum();
    assert_eq!(env.queries.points(21).await.unwrap()[0].points, sum);
}

#[tokio::test]
async fn test_redeem_above_balance_is_rejected() {
    let env = TestEnvironment::new();
    env.onboard_brand(1).await;
    env.register_customer(22).await;
    earn_points(&env, 22, 1).await;

    let err = env
        .redemptions
        .redeem_reward(&redeem(22, 11))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientPoints { required: 11, available: 10 }));
    assert_eq!(env.queries.history(22, None).await.unwrap().entries.len(), 1);
    assert!(env.ledger.list_redemptions(22).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_redeem_without_points_record() {
    let env = TestEnvironment::new();
    env.onboard_brand(1).await;
    env.register_customer(23).await;

    let err = env
        .redemptions
        .redeem_reward(&redeem(23, 1))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "POINTS_RECORD_NOT_FOUND");
}
