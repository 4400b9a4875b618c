//! 购买全链路测试套件
//!
//! 购买 -> 品牌侧奖励计算 -> 客户侧入账。

use brand_leal::models::{Campaign, CampaignStatus};
use brand_leal::repository::CampaignStore;
use chrono::{TimeZone, Utc};
use customer_leal::service::PurchaseRequest;
use leal_shared::events::{AccrualEvent, PurchaseEvent, channels};

use crate::setup::TestEnvironment;

fn march(day: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
}

fn double_points(brand_id: i64, branch_id: i64) -> Campaign {
    Campaign {
        id: 0,
        brand_id,
        name: "march-double".to_string(),
        min_value: 500.0,
        max_value: 5000.0,
        start_date: march(1),
        end_date: march(31),
        point_factor: 1.0,
        coin_factor: 0.0,
        status: CampaignStatus::Active,
        customer_count: 0,
        branch_ids: vec![branch_id],
    }
}

#[tokio::test]
async fn test_base_purchase_credits_one_point_and_one_coin() {
    let env = TestEnvironment::new();
    env.onboard_brand(1).await;
    env.register_customer(42).await;

    let receipt = env
        .purchases
        .process_purchase(&PurchaseRequest::new(42, 1, 10, 1000.0, 0))
        .await
        .unwrap();

    // 提交前总线上没有任何消息
    assert!(env.bus.published(channels::PURCHASE).is_empty());

    let report = env.pump().await;
    assert!(report.dead_lettered.is_empty());
    assert_eq!(report.relayed, 2);

    let purchase_events = env.bus.published(channels::PURCHASE);
    assert_eq!(purchase_events.len(), 1);
    let purchase_event: PurchaseEvent = purchase_events[0].decode().unwrap();
    assert_eq!(purchase_event.purchase_id, receipt.purchase.id);
    assert_eq!(purchase_events[0].key, "42");

    let accruals = env.bus.published(channels::APPLY_POINTS);
    assert_eq!(accruals.len(), 1);
    let accrual: AccrualEvent = accruals[0].decode().unwrap();
    assert_eq!(
        (accrual.points, accrual.coins, accrual.reason.as_str()),
        (1, 1, "purchase")
    );

    let summary = env.queries.summary(42).await.unwrap();
    assert_eq!(summary.coins, 1);
    assert_eq!(summary.points.len(), 1);
    assert_eq!(summary.points[0].points, 1);
}

#[tokio::test]
async fn test_branch_campaign_bonus_reaches_ledger() {
    let env = TestEnvironment::new();
    env.onboard_brand(1).await;
    let campaign_id = env.add_campaign(&double_points(1, 10)).await;
    env.register_customer(7).await;

    let mut request = PurchaseRequest::new(7, 1, 10, 3000.0, 0);
    request.purchase_date = Some(march(15));
    env.purchases.process_purchase(&request).await.unwrap();
    env.pump().await;

    // 基础 3 积分 + 加成 3×1.0；金币无加成
    let points = env.queries.points(7).await.unwrap();
    assert_eq!(points[0].points, 6);
    assert_eq!(env.queries.coins(7).await.unwrap(), 3);

    let campaign = env.campaigns.get_campaign(campaign_id).await.unwrap().unwrap();
    assert_eq!(campaign.customer_count, 1);
}

#[tokio::test]
async fn test_base_campaign_counts_purchases_at_every_branch() {
    let env = TestEnvironment::new();
    env.onboard_brand(1).await;
    let base_id = env.open_branch(1, 20).await;
    env.register_customer(5).await;

    for branch_id in [10, 20, 20] {
        env.purchases
            .process_purchase(&PurchaseRequest::new(5, 1, branch_id, 1000.0, 0))
            .await
            .unwrap();
    }
    env.pump().await;

    let base = env.campaigns.get_campaign(base_id).await.unwrap().unwrap();
    assert_eq!(base.customer_count, 3);
    assert_eq!(base.branch_ids, vec![10, 20]);
    // 基础活动自身的加成只有 0.001 倍，截断后不影响整数奖励
    assert_eq!(env.queries.coins(5).await.unwrap(), 3);
}

#[tokio::test]
async fn test_coins_spent_then_earned() {
    let env = TestEnvironment::new();
    env.onboard_brand(1).await;
    env.register_customer(3).await;

    // 先攒 5 枚金币
    env.purchases
        .process_purchase(&PurchaseRequest::new(3, 1, 10, 5000.0, 0))
        .await
        .unwrap();
    env.pump().await;
    assert_eq!(env.queries.coins(3).await.unwrap(), 5);

    // 花掉 4 枚，再获得 2 枚
    let receipt = env
        .purchases
        .process_purchase(&PurchaseRequest::new(3, 1, 10, 2000.0, 4))
        .await
        .unwrap();
    assert_eq!(receipt.remaining_coins, 1);
    env.pump().await;

    assert_eq!(env.queries.coins(3).await.unwrap(), 3);
    let history = env.queries.history(3, None).await.unwrap();
    assert_eq!(history.entries.len(), 2);
}

#[tokio::test]
async fn test_brand_without_base_campaign_is_dead_lettered() {
    let env = TestEnvironment::new();
    env.register_customer(8).await;

    env.purchases
        .process_purchase(&PurchaseRequest::new(8, 99, 10, 100.0, 0))
        .await
        .unwrap();
    let report = env.pump().await;

    assert_eq!(report.dead_lettered.len(), 1);
    assert!(report.dead_lettered[0].1.contains("brand_id=99"));
    assert!(env.bus.published(channels::APPLY_POINTS).is_empty());
    assert!(env.queries.points(8).await.unwrap().is_empty());
}
