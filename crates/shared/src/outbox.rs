//! 事务性 outbox
//!
//! 需要发布的事件与业务数据在同一个数据库事务里写入 `outbox_messages` 表，
//! 事务提交后由 `OutboxRelay` 轮询发布。这样事件发布与状态变更要么都发生，
//! 要么都不发生；中继重复发布时由消费端的幂等账本吸收。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::OutboxConfig;
use crate::error::Result;
use crate::events::EventPublisher;
use crate::observability::metrics;
use crate::retry::RetryPolicy;
use crate::shutdown::wait_for_shutdown;

/// 待写入 outbox 的消息
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxMessage {
    pub channel: String,
    pub message_key: String,
    pub payload: Vec<u8>,
}

impl NewOutboxMessage {
    pub fn json<T: Serialize>(channel: &str, key: String, value: &T) -> Result<Self> {
        Ok(Self {
            channel: channel.to_string(),
            message_key: key,
            payload: serde_json::to_vec(value)?,
        })
    }
}

/// outbox 中尚未发布的消息
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OutboxMessage {
    pub id: i64,
    pub channel: String,
    pub message_key: String,
    pub payload: Vec<u8>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

/// outbox 写入端口，由各服务的事务单元实现
#[async_trait]
pub trait OutboxPort: Send {
    /// 在当前事务中登记一条待发布消息，返回 outbox ID
    async fn enqueue(&mut self, message: NewOutboxMessage) -> Result<i64>;
}

/// outbox 存储端口（中继侧）
///
/// 写入端在各服务的事务单元里完成，这里只负责读取与状态推进。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// 按写入顺序取出待发布消息
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>>;

    async fn mark_published(&self, id: i64) -> Result<()>;

    /// 记录一次发布失败，返回累计尝试次数
    async fn record_failure(&self, id: i64, error: &str) -> Result<i32>;

    /// 放弃发布（仅用于不可重试的失败），消息保留在表中供人工处理
    async fn mark_dead(&self, id: i64) -> Result<()>;
}

// ---------------------------------------------------------------------------
// PostgreSQL 实现
// ---------------------------------------------------------------------------

/// 基于 PostgreSQL 的 outbox 存储
#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在调用方事务中写入一条消息
    pub async fn enqueue_in_tx(conn: &mut PgConnection, msg: &NewOutboxMessage) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO outbox_messages (channel, message_key, payload, status, attempts, created_at)
            VALUES ($1, $2, $3, 'pending', 0, NOW())
            RETURNING id
            "#,
        )
        .bind(&msg.channel)
        .bind(&msg.message_key)
        .bind(&msg.payload)
        .fetch_one(conn)
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query_as::<_, OutboxMessage>(
            r#"
            SELECT id, channel, message_key, payload, attempts, created_at
            FROM outbox_messages
            WHERE status = 'pending'
            ORDER BY id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn mark_published(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE outbox_messages SET status = 'published', published_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_failure(&self, id: i64, error: &str) -> Result<i32> {
        let attempts: i32 = sqlx::query_scalar(
            r#"
            UPDATE outbox_messages
            SET attempts = attempts + 1, last_error = $2
            WHERE id = $1
            RETURNING attempts
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempts)
    }

    async fn mark_dead(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE outbox_messages SET status = 'dead' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 内存实现（嵌入各服务的内存存储状态中）
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemoryOutboxStatus {
    Pending,
    Published,
    Dead,
}

#[derive(Debug, Clone)]
struct MemoryOutboxRow {
    message: OutboxMessage,
    status: MemoryOutboxStatus,
}

/// 内存中的 outbox 表
///
/// 本身不加锁，作为服务内存状态的一部分随事务副本一起克隆与提交。
#[derive(Debug, Clone, Default)]
pub struct MemoryOutboxTable {
    rows: Vec<MemoryOutboxRow>,
}

impl MemoryOutboxTable {
    pub fn enqueue(&mut self, msg: NewOutboxMessage) -> i64 {
        let id = self.rows.len() as i64 + 1;
        self.rows.push(MemoryOutboxRow {
            message: OutboxMessage {
                id,
                channel: msg.channel,
                message_key: msg.message_key,
                payload: msg.payload,
                attempts: 0,
                created_at: Utc::now(),
            },
            status: MemoryOutboxStatus::Pending,
        });
        id
    }

    pub fn fetch_pending(&self, limit: i64) -> Vec<OutboxMessage> {
        self.rows
            .iter()
            .filter(|r| r.status == MemoryOutboxStatus::Pending)
            .take(limit.max(0) as usize)
            .map(|r| r.message.clone())
            .collect()
    }

    pub fn mark_published(&mut self, id: i64) {
        if let Some(row) = self.row_mut(id) {
            row.status = MemoryOutboxStatus::Published;
        }
    }

    pub fn record_failure(&mut self, id: i64) -> i32 {
        match self.row_mut(id) {
            Some(row) => {
                row.message.attempts += 1;
                row.message.attempts
            }
            None => 0,
        }
    }

    pub fn mark_dead(&mut self, id: i64) {
        if let Some(row) = self.row_mut(id) {
            row.status = MemoryOutboxStatus::Dead;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.status == MemoryOutboxStatus::Pending)
            .count()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn row_mut(&mut self, id: i64) -> Option<&mut MemoryOutboxRow> {
        self.rows.iter_mut().find(|r| r.message.id == id)
    }
}

// ---------------------------------------------------------------------------
// 中继
// ---------------------------------------------------------------------------

/// 一轮中继的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayRound {
    pub published: usize,
    /// 队首消息因可重试故障发布失败时，它累计的尝试次数
    pub blocked_attempts: Option<i32>,
}

/// outbox 中继
///
/// 按写入顺序发布消息；遇到发布失败即结束本轮，
/// 避免同一客户的后续消息越过失败的消息先被投递。
///
/// 可重试的故障（broker 不可达、超时）永不放弃，轮询间隔按尝试次数指数退避；
/// 只有不可重试的失败在达到 `max_attempts` 后标记为 dead。
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn EventPublisher>,
    config: OutboxConfig,
    backoff: RetryPolicy,
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        publisher: Arc<dyn EventPublisher>,
        config: OutboxConfig,
    ) -> Self {
        let backoff = RetryPolicy::for_outbox(config.poll_interval());
        Self {
            store,
            publisher,
            config,
            backoff,
        }
    }

    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// 执行一轮发布，返回成功发布的条数
    pub async fn relay_once(&self) -> Result<usize> {
        self.relay_round().await.map(|round| round.published)
    }

    /// 执行一轮发布
    #[instrument(skip(self))]
    pub async fn relay_round(&self) -> Result<RelayRound> {
        let pending = self.store.fetch_pending(self.config.batch_size).await?;
        let mut round = RelayRound::default();

        for msg in pending {
            let err = match self
                .publisher
                .publish(&msg.channel, &msg.message_key, &msg.payload)
                .await
            {
                Ok(()) => {
                    self.store.mark_published(msg.id).await?;
                    metrics::record_outbox(&msg.channel, "published");
                    round.published += 1;
                    continue;
                }
                Err(e) => e,
            };

            let attempts = self.store.record_failure(msg.id, &err.to_string()).await?;
            metrics::record_outbox(&msg.channel, "failed");

            if err.is_retryable() {
                warn!(
                    outbox_id = msg.id,
                    channel = %msg.channel,
                    attempts,
                    error = %err,
                    "outbox 消息发布失败，退避后重试"
                );
                round.blocked_attempts = Some(attempts);
                break;
            }

            if attempts >= self.config.max_attempts {
                self.store.mark_dead(msg.id).await?;
                metrics::record_outbox(&msg.channel, "dead");
                error!(
                    outbox_id = msg.id,
                    channel = %msg.channel,
                    attempts,
                    error = %err,
                    "outbox 消息无法发布，停止尝试"
                );
                continue;
            }

            warn!(
                outbox_id = msg.id,
                channel = %msg.channel,
                attempts,
                error = %err,
                "outbox 消息发布被拒绝，等待下一轮"
            );
            round.blocked_attempts = Some(attempts);
            break;
        }

        if round.published > 0 {
            debug!(published = round.published, "outbox 本轮发布完成");
        }
        Ok(round)
    }

    /// 下一轮开始前的等待时间
    ///
    /// 正常情况下为轮询间隔；队首消息发布失败时按它的尝试次数退避。
    pub fn delay_after(&self, round: &RelayRound) -> Duration {
        match round.blocked_attempts {
            Some(attempts) => {
                let retry = attempts.saturating_sub(1).max(0) as u32;
                self.backoff
                    .delay_for_attempt(retry)
                    .max(self.config.poll_interval())
            }
            None => self.config.poll_interval(),
        }
    }

    /// 轮询发布，直到收到关闭信号
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            "outbox 中继已启动"
        );

        loop {
            let delay = match self.relay_round().await {
                Ok(round) => self.delay_after(&round),
                Err(e) => {
                    error!(error = %e, "outbox 中继轮询失败");
                    self.config.poll_interval()
                }
            };

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("收到关闭信号，outbox 中继退出");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
