//! 内存账本存储
//!
//! 与品牌侧的内存存储相同：事务单元持有独占锁并在状态副本上读写，
//! 提交时整体替换，丢弃即回滚。所有事务因此串行执行。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use leal_shared::error::Result as SharedResult;
use leal_shared::idempotency::IdempotencyPort;
use leal_shared::outbox::{
    MemoryOutboxTable, NewOutboxMessage, OutboxMessage, OutboxPort, OutboxStore,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::traits::{
    CustomerPort, LedgerPort, LedgerStore, LedgerUnitOfWork, PurchasePort, RedemptionPort,
};
use crate::error::Result;
use crate::models::{
    Customer, NewPurchase, NewRedemption, NewTransaction, PointsBalance, Purchase,
    RedemptionRecord, TransactionLogEntry, clamp_balance,
};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    customers: BTreeMap<i64, Customer>,
    coins: HashMap<i64, i64>,
    points: BTreeMap<(i64, i64), i64>,
    transactions: Vec<TransactionLogEntry>,
    purchases: Vec<Purchase>,
    redemptions: Vec<RedemptionRecord>,
    processed_events: HashSet<Uuid>,
    outbox: MemoryOutboxTable,
}

/// 内存账本存储，可 Clone 共享同一份状态
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// outbox 中待发布的消息
    pub async fn pending_outbox(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.outbox.fetch_pending(i64::MAX)
    }

    pub async fn outbox_len(&self) -> usize {
        self.state.lock().await.outbox.len()
    }

    pub async fn processed_event_count(&self) -> usize {
        self.state.lock().await.processed_events.len()
    }

    pub async fn points_of(&self, customer_id: i64, brand_id: i64) -> Option<i64> {
        self.state
            .lock()
            .await
            .points
            .get(&(customer_id, brand_id))
            .copied()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryLedgerUnitOfWork { guard, working }))
    }

    async fn save_customer(&self, customer: &Customer) -> Result<()> {
        self.state
            .lock()
            .await
            .customers
            .insert(customer.id, customer.clone());
        Ok(())
    }

    async fn find_customer(&self, customer_id: i64) -> Result<Option<Customer>> {
        Ok(self.state.lock().await.customers.get(&customer_id).cloned())
    }

    async fn list_points(&self, customer_id: i64) -> Result<Vec<PointsBalance>> {
        let state = self.state.lock().await;
        Ok(state
            .points
            .iter()
            .filter(|((customer, _), _)| *customer == customer_id)
            .map(|(&(customer_id, brand_id), &points)| PointsBalance {
                customer_id,
                brand_id,
                points,
            })
            .collect())
    }

    async fn coin_balance(&self, customer_id: i64) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .await
            .coins
            .get(&customer_id)
            .copied()
            .unwrap_or(0))
    }

    async fn list_transactions(
        &self,
        customer_id: i64,
        limit: i64,
    ) -> Result<Vec<TransactionLogEntry>> {
        let state = self.state.lock().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.customer_id == customer_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_purchases(&self, customer_id: i64) -> Result<Vec<Purchase>> {
        let state = self.state.lock().await;
        Ok(state
            .purchases
            .iter()
            .filter(|p| p.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn list_redemptions(&self, customer_id: i64) -> Result<Vec<RedemptionRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .redemptions
            .iter()
            .filter(|r| r.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OutboxStore for MemoryLedgerStore {
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

struct MemoryLedgerUnitOfWork {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
}

#[async_trait]
impl CustomerPort for MemoryLedgerUnitOfWork {
    async fn get_customer(&mut self, customer_id: i64) -> Result<Option<Customer>> {
        Ok(self.working.customers.get(&customer_id).cloned())
    }
}

#[async_trait]
impl LedgerPort for MemoryLedgerUnitOfWork {
    async fn record_transaction(&mut self, entry: &NewTransaction) -> Result<i64> {
        let id = self.working.transactions.len() as i64 + 1;
        self.working.transactions.push(TransactionLogEntry {
            id,
            customer_id: entry.customer_id,
            brand_id: entry.brand_id,
            change: entry.change,
            reason: entry.reason.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn upsert_points(&mut self, customer_id: i64, brand_id: i64, delta: i64) -> Result<i64> {
        let points = self
            .working
            .points
            .entry((customer_id, brand_id))
            .or_insert(0);
        *points = clamp_balance(*points, delta);
        Ok(*points)
    }

    async fn upsert_coins(&mut self, customer_id: i64, delta: i64) -> Result<i64> {
        let coins = self.working.coins.entry(customer_id).or_insert(0);
        *coins = clamp_balance(*coins, delta);
        Ok(*coins)
    }

    async fn get_points(
        &mut self,
        customer_id: i64,
        brand_id: i64,
    ) -> Result<Option<PointsBalance>> {
        Ok(self
            .working
            .points
            .get(&(customer_id, brand_id))
            .map(|&points| PointsBalance {
                customer_id,
                brand_id,
                points,
            }))
    }

    async fn get_coins(&mut self, customer_id: i64) -> Result<i64> {
        Ok(self.working.coins.get(&customer_id).copied().unwrap_or(0))
    }
}

#[async_trait]
impl PurchasePort for MemoryLedgerUnitOfWork {
    async fn record_purchase(&mut self, purchase: &NewPurchase) -> Result<Purchase> {
        let row = Purchase {
            id: self.working.purchases.len() as i64 + 1,
            customer_id: purchase.customer_id,
            brand_id: purchase.brand_id,
            branch_id: purchase.branch_id,
            amount: purchase.amount,
            coins_used: purchase.coins_used,
            purchase_date: purchase.purchase_date,
        };
        self.working.purchases.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl RedemptionPort for MemoryLedgerUnitOfWork {
    async fn record_redemption(&mut self, redemption: &NewRedemption) -> Result<RedemptionRecord> {
        let row = RedemptionRecord {
            id: self.working.redemptions.len() as i64 + 1,
            customer_id: redemption.customer_id,
            brand_id: redemption.brand_id,
            reward_id: redemption.reward_id,
            points_spent: redemption.points_spent,
            redeemed_at: Utc::now(),
        };
        self.working.redemptions.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl IdempotencyPort for MemoryLedgerUnitOfWork {
    async fn try_mark_processed(&mut self, event_id: Uuid) -> SharedResult<bool> {
        Ok(self.working.processed_events.insert(event_id))
    }
}

#[async_trait]
impl OutboxPort for MemoryLedgerUnitOfWork {
    async fn enqueue(&mut self, message: NewOutboxMessage) -> SharedResult<i64> {
        Ok(self.working.outbox.enqueue(message))
    }
}

#[async_trait]
impl LedgerUnitOfWork for MemoryLedgerUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upserts_clamp_at_zero() {
        let store = MemoryLedgerStore::new();
        let mut uow = store.begin().await.unwrap();

        assert_eq!(uow.upsert_points(1, 2, -5).await.unwrap(), 0);
        assert_eq!(uow.upsert_points(1, 2, 7).await.unwrap(), 7);
        assert_eq!(uow.upsert_points(1, 2, -10).await.unwrap(), 0);
        assert_eq!(uow.upsert_coins(1, 3).await.unwrap(), 3);
        assert_eq!(uow.upsert_coins(1, -4).await.unwrap(), 0);
        uow.commit().await.unwrap();

        assert_eq!(store.points_of(1, 2).await, Some(0));
        assert_eq!(store.coin_balance(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_rolls_back() {
        let store = MemoryLedgerStore::new();

        {
            let mut uow = store.begin().await.unwrap();
            uow.upsert_coins(1, 50).await.unwrap();
            uow.record_transaction(&NewTransaction::new(1, 2, 5, "purchase"))
                .await
                .unwrap();
            assert!(uow.try_mark_processed(Uuid::new_v4()).await.unwrap());
        }

        assert_eq!(store.coin_balance(1).await.unwrap(), 0);
        assert!(store.list_transactions(1, 10).await.unwrap().is_empty());
        assert_eq!(store.processed_event_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_rows() {
        let store = MemoryLedgerStore::new();
        let mut uow = store.begin().await.unwrap();

        assert!(uow.get_customer(1).await.unwrap().is_none());
        assert!(uow.get_points(1, 2).await.unwrap().is_none());
        assert_eq!(uow.get_coins(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transactions_listed_newest_first() {
        let store = MemoryLedgerStore::new();
        let mut uow = store.begin().await.unwrap();
        for change in [1, 2, 3] {
            uow.record_transaction(&NewTransaction::new(1, 2, change, "purchase"))
                .await
                .unwrap();
        }
        uow.record_transaction(&NewTransaction::new(9, 2, 100, "purchase"))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let changes: Vec<i64> = store
            .list_transactions(1, 2)
            .await
            .unwrap()
            .iter()
            .map(|t| t.change)
            .collect();
        assert_eq!(changes, vec![3, 2]);
    }
}
