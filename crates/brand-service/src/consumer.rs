//! 购买事件消费者
//!
//! 从 `purchase` 频道拉取购买事件交给 `AccrualService`，
//! 并把处理结果翻译为偏移量提交语义：
//! - 计算成功 / 重复事件 -> `Commit`
//! - 瞬时故障 -> `Retry`
//! - 无法解析、品牌缺少基础活动等 -> `DeadLetter`

use std::sync::Arc;

use async_trait::async_trait;
use leal_shared::config::AppConfig;
use leal_shared::dlq::DlqProducer;
use leal_shared::events::{Ack, EventHandler, PurchaseEvent};
use leal_shared::kafka::{ConsumerMessage, KafkaConsumer};
use leal_shared::retry::RetryPolicy;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::repository::CampaignStore;
use crate::service::{AccrualOutcome, AccrualService};

/// 购买事件处理器
pub struct PurchaseEventHandler<S>
where
    S: CampaignStore + ?Sized,
{
    service: Arc<AccrualService<S>>,
}

impl<S> PurchaseEventHandler<S>
where
    S: CampaignStore + ?Sized,
{
    pub fn new(service: Arc<AccrualService<S>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for PurchaseEventHandler<S>
where
    S: CampaignStore + ?Sized + 'static,
{
    async fn handle(&self, message: &ConsumerMessage) -> Ack {
        handle_message(&self.service, message).await
    }
}

/// 处理单条购买消息
///
/// 独立为函数，测试时不必构造 Kafka 消费者。
pub async fn handle_message<S>(service: &AccrualService<S>, msg: &ConsumerMessage) -> Ack
where
    S: CampaignStore + ?Sized,
{
    let purchase: PurchaseEvent = match msg.deserialize_payload() {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, topic = %msg.topic, offset = msg.offset, "购买事件反序列化失败");
            return Ack::dead_letter(format!("无法解析购买事件: {e}"));
        }
    };

    match service.process_purchase(&purchase).await {
        Ok(AccrualOutcome::Accrued { .. }) | Ok(AccrualOutcome::Duplicate) => Ack::Commit,
        Err(e) if e.is_retryable() => {
            warn!(event_id = %purchase.event_id, error = %e, "购买事件处理失败，稍后重试");
            Ack::retry(e.to_string())
        }
        Err(e) => {
            error!(
                event_id = %purchase.event_id,
                error = %e,
                code = e.error_code(),
                "购买事件无法处理，转入死信队列"
            );
            Ack::dead_letter(e.to_string())
        }
    }
}

/// 购买事件消费者
pub struct PurchaseConsumer<S>
where
    S: CampaignStore + ?Sized + 'static,
{
    consumer: KafkaConsumer,
    handler: Arc<PurchaseEventHandler<S>>,
    dead_letters: DlqProducer,
    topic: String,
}

impl<S> PurchaseConsumer<S>
where
    S: CampaignStore + ?Sized + 'static,
{
    pub fn new(
        config: &AppConfig,
        handler: Arc<PurchaseEventHandler<S>>,
        dead_letters: DlqProducer,
    ) -> Result<Self> {
        let consumer = KafkaConsumer::new(&config.kafka, None)?;
        Ok(Self {
            consumer,
            handler,
            dead_letters,
            topic: config.kafka.purchase_topic.clone(),
        })
    }

    /// 启动消费循环，直到收到关闭信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.consumer.subscribe(&[self.topic.as_str()])?;
        info!(topic = %self.topic, "购买事件消费者已启动");

        self.consumer
            .run(
                self.handler,
                self.dead_letters,
                RetryPolicy::for_consumer(),
                shutdown,
            )
            .await;

        info!("购买事件消费者已停止");
        Ok(())
    }
}
