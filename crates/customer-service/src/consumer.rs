//! 入账事件消费者
//!
//! 从 `apply-points` 频道拉取入账事件交给 `LedgerService`：
//! - 入账成功 / 重复事件 -> `Commit`
//! - 数据库故障等 -> `Retry`，偏移量不提交
//! - 无法解析 -> `DeadLetter`

use std::sync::Arc;

use async_trait::async_trait;
use leal_shared::config::AppConfig;
use leal_shared::dlq::DlqProducer;
use leal_shared::events::{Ack, AccrualEvent, EventHandler};
use leal_shared::kafka::{ConsumerMessage, KafkaConsumer};
use leal_shared::retry::RetryPolicy;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::repository::LedgerStore;
use crate::service::LedgerService;

/// 入账事件处理器
pub struct AccrualEventHandler<S>
where
    S: LedgerStore + ?Sized,
{
    service: Arc<LedgerService<S>>,
}

impl<S> AccrualEventHandler<S>
where
    S: LedgerStore + ?Sized,
{
    pub fn new(service: Arc<LedgerService<S>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for AccrualEventHandler<S>
where
    S: LedgerStore + ?Sized + 'static,
{
    async fn handle(&self, message: &ConsumerMessage) -> Ack {
        handle_message(&self.service, message).await
    }
}

/// 处理单条入账消息
pub async fn handle_message<S>(service: &LedgerService<S>, msg: &ConsumerMessage) -> Ack
where
    S: LedgerStore + ?Sized,
{
    let event: AccrualEvent = match msg.deserialize_payload() {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, topic = %msg.topic, offset = msg.offset, "入账事件反序列化失败");
            return Ack::dead_letter(format!("无法解析入账事件: {e}"));
        }
    };

    match service.apply_accrual(&event).await {
        Ok(_) => Ack::Commit,
        Err(e) if e.is_retryable() => {
            warn!(event_id = %event.event_id, error = %e, "入账失败，稍后重试");
            Ack::retry(e.to_string())
        }
        Err(e) => {
            error!(
                event_id = %event.event_id,
                error = %e,
                code = e.error_code(),
                "入账事件无法处理，转入死信队列"
            );
            Ack::dead_letter(e.to_string())
        }
    }
}

/// 入账事件消费者
pub struct AccrualConsumer<S>
where
    S: LedgerStore + ?Sized + 'static,
{
    consumer: KafkaConsumer,
    handler: Arc<AccrualEventHandler<S>>,
    dead_letters: DlqProducer,
    topic: String,
}

impl<S> AccrualConsumer<S>
where
    S: LedgerStore + ?Sized + 'static,
{
    pub fn new(
        config: &AppConfig,
        handler: Arc<AccrualEventHandler<S>>,
        dead_letters: DlqProducer,
    ) -> Result<Self> {
        let consumer = KafkaConsumer::new(&config.kafka, None)?;
        Ok(Self {
            consumer,
            handler,
            dead_letters,
            topic: config.kafka.apply_points_topic.clone(),
        })
    }

    /// 启动消费循环，直到收到关闭信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.consumer.subscribe(&[self.topic.as_str()])?;
        info!(topic = %self.topic, "入账事件消费者已启动");

        self.consumer
            .run(
                self.handler,
                self.dead_letters,
                RetryPolicy::for_consumer(),
                shutdown,
            )
            .await;

        info!("入账事件消费者已停止");
        Ok(())
    }
}
