//! 测试环境管理
//!
//! 装配两个服务的全部组件，并提供 `pump` 驱动 outbox 中继与消费端，
//! 直到总线上没有可投递的消息为止。

use std::sync::Arc;

use brand_leal::consumer::PurchaseEventHandler;
use brand_leal::models::Campaign;
use brand_leal::repository::{CampaignStore, MemoryCampaignStore};
use brand_leal::service::AccrualService;
use customer_leal::consumer::AccrualEventHandler;
use customer_leal::models::Customer;
use customer_leal::repository::{LedgerStore, MemoryLedgerStore};
use customer_leal::service::{
    BalanceQueryService, LedgerService, PurchaseService, RedemptionService,
};
use leal_shared::config::OutboxConfig;
use leal_shared::events::channels;
use leal_shared::outbox::OutboxRelay;
use leal_shared::test_utils::{MemoryEventBus, PublishedMessage};

/// `onboard_brand` 默认开设的门店
pub const DEFAULT_BRANCH: i64 = 10;

/// 最多驱动的轮数，防止处理器一直要求重试时死循环
const MAX_PUMP_ROUNDS: usize = 20;

/// 一次 `pump` 的统计
#[derive(Debug, Default)]
pub struct PumpReport {
    pub relayed: usize,
    pub committed: usize,
    pub retried: usize,
    pub dead_lettered: Vec<(PublishedMessage, String)>,
}

/// 测试环境
pub struct TestEnvironment {
    pub bus: Arc<MemoryEventBus>,
    pub campaigns: Arc<MemoryCampaignStore>,
    pub ledger: Arc<MemoryLedgerStore>,
    pub purchases: PurchaseService<MemoryLedgerStore>,
    pub redemptions: RedemptionService<MemoryLedgerStore>,
    pub queries: BalanceQueryService<MemoryLedgerStore>,
    purchase_handler: PurchaseEventHandler<MemoryCampaignStore>,
    accrual_handler: AccrualEventHandler<MemoryLedgerStore>,
    brand_relay: OutboxRelay,
    customer_relay: OutboxRelay,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let bus = Arc::new(MemoryEventBus::new());
        let campaigns = Arc::new(MemoryCampaignStore::new());
        let ledger = Arc::new(MemoryLedgerStore::new());

        let accrual = Arc::new(AccrualService::new(
            campaigns.clone(),
            channels::APPLY_POINTS,
        ));
        let ledger_service = Arc::new(LedgerService::new(ledger.clone()));

        Self {
            purchases: PurchaseService::new(ledger.clone(), channels::PURCHASE),
            redemptions: RedemptionService::new(ledger.clone()),
            queries: BalanceQueryService::new(ledger.clone()),
            purchase_handler: PurchaseEventHandler::new(accrual),
            accrual_handler: AccrualEventHandler::new(ledger_service),
            brand_relay: OutboxRelay::new(campaigns.clone(), bus.clone(), OutboxConfig::default()),
            customer_relay: OutboxRelay::new(ledger.clone(), bus.clone(), OutboxConfig::default()),
            bus,
            campaigns,
            ledger,
        }
    }

    /// 品牌入驻：创建基础活动并开设默认门店
    pub async fn onboard_brand(&self, brand_id: i64) {
        self.campaigns
            .save_campaign(&Campaign::base_for_brand(brand_id))
            .await
            .expect("save base campaign");
        self.open_branch(brand_id, DEFAULT_BRANCH).await;
    }

    /// 开设门店，返回它关联的基础活动 ID
    pub async fn open_branch(&self, brand_id: i64, branch_id: i64) -> i64 {
        self.campaigns
            .link_branch_to_base(brand_id, branch_id)
            .await
            .expect("link branch to base campaign")
    }

    pub async fn add_campaign(&self, campaign: &Campaign) -> i64 {
        self.campaigns
            .save_campaign(campaign)
            .await
            .expect("save campaign")
    }

    pub async fn register_customer(&self, customer_id: i64) {
        self.ledger
            .save_customer(&Customer::new(customer_id, format!("customer-{customer_id}")))
            .await
            .expect("save customer");
    }

    /// 驱动两侧的中继与消费端，直到没有新的发布和投递
    pub async fn pump(&self) -> PumpReport {
        let mut report = PumpReport::default();

        for _ in 0..MAX_PUMP_ROUNDS {
            let mut progressed = 0;

            let relayed = self.customer_relay.relay_once().await.expect("customer relay");
            let delivered = self
                .bus
                .deliver(channels::PURCHASE, &self.purchase_handler)
                .await;
            progressed += relayed + delivered.committed + delivered.dead_lettered.len();
            report.relayed += relayed;
            report.committed += delivered.committed;
            report.retried += delivered.retried;
            report.dead_lettered.extend(delivered.dead_lettered);

            let relayed = self.brand_relay.relay_once().await.expect("brand relay");
            let delivered = self
                .bus
                .deliver(channels::APPLY_POINTS, &self.accrual_handler)
                .await;
            progressed += relayed + delivered.committed + delivered.dead_lettered.len();
            report.relayed += relayed;
            report.committed += delivered.committed;
            report.retried += delivered.retried;
            report.dead_lettered.extend(delivered.dead_lettered);

            if progressed == 0 {
                break;
            }
        }

        report
    }

    /// 只投递总线上已有的消息，不运行中继
    pub async fn deliver_pending(&self) -> PumpReport {
        let mut report = PumpReport::default();
        for delivered in [
            self.bus
                .deliver(channels::PURCHASE, &self.purchase_handler)
                .await,
            self.bus
                .deliver(channels::APPLY_POINTS, &self.accrual_handler)
                .await,
        ] {
            report.committed += delivered.committed;
            report.retried += delivered.retried;
            report.dead_lettered.extend(delivered.dead_lettered);
        }
        report
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}
