//! 消息系统故障测试套件
//!
//! 发布失败时业务数据已经落库，消息留在 outbox 中，恢复后补发。

use customer_leal::repository::LedgerStore;
use customer_leal::service::PurchaseRequest;
use leal_shared::events::channels;

use crate::setup::TestEnvironment;

#[tokio::test]
async fn test_purchase_survives_broker_outage() {
    let env = TestEnvironment::new();
    env.onboard_brand(1).await;
    env.register_customer(11).await;

    env.bus.fail_publishes(true);
    let receipt = env
        .purchases
        .process_purchase(&PurchaseRequest::new(11, 1, 10, 2000.0, 0))
        .await
        .unwrap();

    let report = env.pump().await;
    assert_eq!(report.relayed, 0);
    assert_eq!(env.ledger.pending_outbox().await.len(), 1);
    assert_eq!(env.ledger.list_purchases(11).await.unwrap().len(), 1);

    env.bus.fail_publishes(false);
    env.pump().await;

    assert!(env.ledger.pending_outbox().await.is_empty());
    assert_eq!(env.bus.published(channels::PURCHASE).len(), 1);
    assert_eq!(env.queries.coins(11).await.unwrap(), 2);
    assert_eq!(receipt.purchase.customer_id, 11);
}

#[tokio::test]
async fn test_outage_backlog_is_credited_exactly_once() {
    let env = TestEnvironment::new();
    env.onboard_brand(1).await;
    env.register_customer(12).await;

    env.bus.fail_publishes(true);
    for _ in 0..3 {
        env.purchases
            .process_purchase(&PurchaseRequest::new(12, 1, 10, 1000.0, 0))
            .await
            .unwrap();
    }
    env.pump().await;
    assert_eq!(env.queries.coins(12).await.unwrap(), 0);
    assert_eq!(env.ledger.pending_outbox().await.len(), 3);

    env.bus.fail_publishes(false);
    let report = env.pump().await;

    assert_eq!(report.relayed, 6);
    assert_eq!(env.queries.coins(12).await.unwrap(), 3);
    assert!(env.ledger.pending_outbox().await.is_empty());
    assert!(env.campaigns.pending_outbox().await.is_empty());
}

#[tokio::test]
async fn test_long_outage_keeps_purchase_pending_until_recovery() {
    let env = TestEnvironment::new();
    env.onboard_brand(1).await;
    env.register_customer(13).await;

    env.bus.fail_publishes(true);
    env.purchases
        .process_purchase(&PurchaseRequest::new(13, 1, 10, 1000.0, 0))
        .await
        .unwrap();

    // 故障持续的轮数超过 outbox 的 max_attempts
    for _ in 0..15 {
        let report = env.pump().await;
        assert_eq!(report.relayed, 0);
    }
    let pending = env.ledger.pending_outbox().await;
    assert_eq!(pending.len(), 1);
    assert!(pending[0].attempts >= 15);

    env.bus.fail_publishes(false);
    env.pump().await;

    assert_eq!(env.bus.published(channels::PURCHASE).len(), 1);
    assert!(env.ledger.pending_outbox().await.is_empty());
    assert_eq!(env.queries.coins(13).await.unwrap(), 1);
}
