//! 重复投递测试套件
//!
//! 至少一次投递下，同一事件无论投递多少次都只生效一次。

use brand_leal::models::Campaign;
use brand_leal::repository::CampaignStore;
use customer_leal::service::PurchaseRequest;
use leal_shared::events::channels;

use crate::setup::TestEnvironment;

#[tokio::test]
async fn test_replayed_purchase_events_accrue_once() {
    let env = TestEnvironment::new();
    env.onboard_brand(1).await;
    env.register_customer(5).await;

    env.purchases
        .process_purchase(&PurchaseRequest::new(5, 1, 10, 4000.0, 0))
        .await
        .unwrap();
    env.pump().await;

    // 购买事件重放：品牌侧识别为重复，不再产生新的入账事件
    env.bus.replay(channels::PURCHASE);
    let report = env.pump().await;
    assert_eq!(report.committed, 1);
    assert_eq!(env.bus.published(channels::APPLY_POINTS).len(), 1);

    assert_eq!(env.queries.coins(5).await.unwrap(), 4);
}

#[tokio::test]
async fn test_replayed_accrual_events_apply_once() {
    let env = TestEnvironment::new();
    env.onboard_brand(1).await;
    env.register_customer(6).await;

    for _ in 0..3 {
        env.purchases
            .process_purchase(&PurchaseRequest::new(6, 1, 10, 1000.0, 0))
            .await
            .unwrap();
    }
    env.pump().await;

    for _ in 0..2 {
        env.bus.replay(channels::APPLY_POINTS);
        let report = env.deliver_pending().await;
        assert_eq!(report.committed, 3);
    }

    let points = env.queries.points(6).await.unwrap();
    assert_eq!(points[0].points, 3);
    assert_eq!(env.queries.coins(6).await.unwrap(), 3);
    assert_eq!(env.queries.history(6, None).await.unwrap().entries.len(), 3);
}

#[tokio::test]
async fn test_campaign_counter_not_inflated_by_replays() {
    let env = TestEnvironment::new();
    env.onboard_brand(1).await;
    let campaign_id = env
        .add_campaign(&Campaign {
            name: "always-on".to_string(),
            branch_ids: vec![10],
            ..Campaign::base_for_brand(1)
        })
        .await;
    env.register_customer(9).await;

    env.purchases
        .process_purchase(&PurchaseRequest::new(9, 1, 10, 1000.0, 0))
        .await
        .unwrap();
    env.pump().await;
    env.bus.replay(channels::PURCHASE);
    env.pump().await;

    let campaign = env.campaigns.get_campaign(campaign_id).await.unwrap().unwrap();
    assert_eq!(campaign.customer_count, 1);
}
