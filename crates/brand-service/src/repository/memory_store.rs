//! 内存活动存储
//!
//! 事务单元持有整个存储的独占锁，并在状态副本上操作；
//! 提交时用副本替换原状态，丢弃时副本随之丢弃，等价于回滚。

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use leal_shared::error::Result as SharedResult;
use leal_shared::idempotency::IdempotencyPort;
use leal_shared::outbox::{MemoryOutboxTable, NewOutboxMessage, OutboxMessage, OutboxPort, OutboxStore};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::traits::{CampaignPort, CampaignStore, CampaignUnitOfWork};
use crate::error::{AccrualError, Result};
use crate::models::Campaign;

#[derive(Debug, Clone, Default)]
struct CampaignState {
    campaigns: BTreeMap<i64, Campaign>,
    processed_events: HashSet<Uuid>,
    outbox: MemoryOutboxTable,
    next_campaign_id: i64,
}

/// 内存活动存储，可 Clone 共享同一份状态
#[derive(Debug, Clone, Default)]
pub struct MemoryCampaignStore {
    state: Arc<Mutex<CampaignState>>,
}

impl MemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// outbox 中待发布的消息
    pub async fn pending_outbox(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.outbox.fetch_pending(i64::MAX)
    }

    /// outbox 中的消息总数（含已发布）
    pub async fn outbox_len(&self) -> usize {
        self.state.lock().await.outbox.len()
    }

    pub async fn processed_event_count(&self) -> usize {
        self.state.lock().await.processed_events.len()
    }
}

#[async_trait]
impl CampaignStore for MemoryCampaignStore {
    async fn begin(&self) -> Result<Box<dyn CampaignUnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryCampaignUnitOfWork { guard, working }))
    }

    async fn save_campaign(&self, campaign: &Campaign) -> Result<i64> {
        campaign.validate()?;

        let mut state = self.state.lock().await;
        state.next_campaign_id += 1;
        let id = state.next_campaign_id;
        state.campaigns.insert(
            id,
            Campaign {
                id,
                ..campaign.clone()
            },
        );
        Ok(id)
    }

    async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>> {
        Ok(self.state.lock().await.campaigns.get(&id).cloned())
    }

    async fn link_branch_to_base(&self, brand_id: i64, branch_id: i64) -> Result<i64> {
        let mut state = self.state.lock().await;
        let base = state
            .campaigns
            .values_mut()
            .find(|c| c.brand_id == brand_id && c.is_base())
            .ok_or(AccrualError::NoBaseCampaign(brand_id))?;
        if !base.branch_ids.contains(&branch_id) {
            base.branch_ids.push(branch_id);
        }
        Ok(base.id)
    }
}

#[async_trait]
impl OutboxStore for MemoryCampaignStore {
    async fn fetch_pending(&self, limit: i64) -> SharedResult<Vec<OutboxMessage>> {
        Ok(self.state.lock().await.outbox.fetch_pending(limit))
    }

    async fn mark_published(&self, id: i64) -> SharedResult<()> {
        self.state.lock().await.outbox.mark_published(id);
        Ok(())
    }

    async fn record_failure(&self, id: i64, _error: &str) -> SharedResult<i32> {
        Ok(self.state.lock().await.outbox.record_failure(id))
    }

    async fn mark_dead(&self, id: i64) -> SharedResult<()> {
        self.state.lock().await.outbox.mark_dead(id);
        Ok(())
    }
}

struct MemoryCampaignUnitOfWork {
    guard: OwnedMutexGuard<CampaignState>,
    working: CampaignState,
}

#[async_trait]
impl CampaignPort for MemoryCampaignUnitOfWork {
    async fn get_base_campaign(&mut self, brand_id: i64) -> Result<Option<Campaign>> {
        Ok(self
            .working
            .campaigns
            .values()
            .find(|c| c.brand_id == brand_id && c.is_base())
            .cloned())
    }

    async fn get_campaigns_for_branch(&mut self, branch_id: i64) -> Result<Vec<Campaign>> {
        Ok(self
            .working
            .campaigns
            .values()
            .filter(|c| c.branch_ids.contains(&branch_id))
            .cloned()
            .collect())
    }

    async fn increment_customer_count(&mut self, campaign_id: i64) -> Result<()> {
        let campaign = self
            .working
            .campaigns
            .get_mut(&campaign_id)
            .ok_or_else(|| AccrualError::InvalidCampaign(format!("活动不存在: {campaign_id}")))?;
        campaign.customer_count += 1;
        Ok(())
    }
}

#[async_trait]
impl IdempotencyPort for MemoryCampaignUnitOfWork {
    async fn try_mark_processed(&mut self, event_id: Uuid) -> SharedResult<bool> {
        Ok(self.working.processed_events.insert(event_id))
    }
}

#[async_trait]
impl OutboxPort for MemoryCampaignUnitOfWork {
    async fn enqueue(&mut self, message: NewOutboxMessage) -> SharedResult<i64> {
        Ok(self.working.outbox.enqueue(message))
    }
}

#[async_trait]
impl CampaignUnitOfWork for MemoryCampaignUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
