//! 购买服务
//!
//! 单个事务内完成：
//!
//! 1. 读取客户，不存在返回 `CustomerNotFound`
//! 2. 锁定金币余额，余额小于 `coins_used` 返回 `InsufficientCoins`
//! 3. 扣减金币
//! 4. 写入购买记录
//! 5. 购买事件写入 outbox，由中继发布到 `purchase` 频道
//!
//! 任何一步失败，扣减、购买记录与 outbox 一起回滚。

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use leal_shared::observability::metrics;
use leal_shared::outbox::NewOutboxMessage;
use tracing::{info, instrument, warn};

use crate::error::{LedgerError, Result};
use crate::models::NewPurchase;
use crate::repository::LedgerStore;
use crate::service::dto::{PurchaseReceipt, PurchaseRequest};

/// 购买服务
pub struct PurchaseService<S>
where
    S: LedgerStore + ?Sized,
{
    store: Arc<S>,
    purchase_topic: String,
}

impl<S> PurchaseService<S>
where
    S: LedgerStore + ?Sized,
{
    pub fn new(store: Arc<S>, purchase_topic: impl Into<String>) -> Self {
        Self {
            store,
            purchase_topic: purchase_topic.into(),
        }
    }

    /// 处理购买
    #[instrument(
        skip(self, request),
        fields(
            customer_id = request.customer_id,
            brand_id = request.brand_id,
            branch_id = request.branch_id
        )
    )]
    pub async fn process_purchase(&self, request: &PurchaseRequest) -> Result<PurchaseReceipt> {
        let started = Instant::now();
        let result = self.execute(request).await;

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.error_code(),
        };
        metrics::record_purchase(status, started.elapsed().as_secs_f64());

        match &result {
            Ok(receipt) => info!(
                purchase_id = receipt.purchase.id,
                amount = request.amount,
                coins_used = request.coins_used,
                remaining_coins = receipt.remaining_coins,
                "购买已受理"
            ),
            Err(e) => warn!(error = %e, code = e.error_code(), "购买被拒绝"),
        }

        result
    }

    async fn execute(&self, request: &PurchaseRequest) -> Result<PurchaseReceipt> {
        request.validate()?;

        let mut uow = self.store.begin().await?;

        uow.get_customer(request.customer_id)
            .await?
            .ok_or(LedgerError::CustomerNotFound(request.customer_id))?;

        let available = uow.get_coins(request.customer_id).await?;
        if available < request.coins_used {
            return Err(LedgerError::InsufficientCoins {
                required: request.coins_used,
                available,
            });
        }
        let remaining_coins = uow
            .upsert_coins(request.customer_id, -request.coins_used)
            .await?;

        let purchase = uow
            .record_purchase(&NewPurchase {
                customer_id: request.customer_id,
                brand_id: request.brand_id,
                branch_id: request.branch_id,
                amount: request.amount,
                coins_used: request.coins_used,
                purchase_date: request.purchase_date.unwrap_or_else(Utc::now),
            })
            .await?;

        let event = purchase.to_event();
        let outbox_id = uow
            .enqueue(NewOutboxMessage::json(
                &self.purchase_topic,
                event.message_key(),
                &event,
            )?)
            .await?;

        uow.commit().await?;

        Ok(PurchaseReceipt {
            purchase,
            remaining_coins,
            outbox_id,
        })
    }
}
