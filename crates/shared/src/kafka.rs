//! Kafka 基础设施封装
//!
//! 生产者实现 `EventPublisher` 端口；消费者关闭自动提交，
//! 由处理器返回的 `Ack` 决定偏移量何时提交，保证至少一次投递。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::dlq::DlqProducer;
use crate::error::{LealError, Result};
use crate::events::{Ack, EventHandler, EventPublisher};
use crate::retry::RetryPolicy;
use crate::shutdown::wait_for_shutdown;

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的消息的统一表示
///
/// 拥有所有字段的所有权，可以跨 await 点传给异步处理器；
/// 内存总线也用它向处理器投递消息。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    pub fn new(topic: impl Into<String>, key: Option<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: 0,
            key,
            payload,
            timestamp: None,
            headers: HashMap::new(),
        }
    }

    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                if let Some(raw) = header.value
                    && let Ok(value) = std::str::from_utf8(raw)
                {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp: msg.timestamp().to_millis(),
            headers,
        }
    }

    pub fn payload_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| LealError::Validation(format!("负载非 UTF-8 编码: {e}")))
    }

    /// 将 JSON 负载反序列化为目标类型
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 生产者（`FutureProducer` 内部已是 Arc，可直接 Clone）
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// `message.timeout.ms` 为 5 秒，超时后由 outbox 中继下一轮重试
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| LealError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    pub async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(i32, i64)> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| send_error(topic, e))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }

    pub async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> Result<(i32, i64)> {
        let payload = serde_json::to_vec(value)?;
        self.send(topic, key, &payload).await
    }
}

/// 消息本身被 broker 拒绝（超出大小限制、格式错误）时重试无意义，
/// 其余发送失败视为 broker 暂时不可用
fn send_error(topic: &str, e: KafkaError) -> LealError {
    match e.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::MessageSizeTooLarge
            | RDKafkaErrorCode::InvalidMessageSize
            | RDKafkaErrorCode::InvalidMessage,
        ) => LealError::Validation(format!("{topic}: {e}")),
        _ => LealError::Publish {
            channel: topic.to_string(),
            message: e.to_string(),
        },
    }
}

#[async_trait]
impl EventPublisher for KafkaProducer {
    async fn publish(&self, channel: &str, key: &str, payload: &[u8]) -> Result<()> {
        self.send(channel, key, payload).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 消费者
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// 创建消费者
    ///
    /// `group_id_suffix` 让同一服务内不同的消费逻辑使用独立的消费组。
    pub fn new(config: &KafkaConfig, group_id_suffix: Option<&str>) -> Result<Self> {
        let group_id = match group_id_suffix {
            Some(suffix) => format!("{}.{}", config.consumer_group, suffix),
            None => config.consumer_group.clone(),
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| LealError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(brokers = %config.brokers, group_id, "Kafka 消费者已初始化");
        Ok(Self { consumer })
    }

    pub fn subscribe(&self, topics: &[&str]) -> Result<()> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| LealError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }

    /// 启动消费循环
    ///
    /// 每条消息交给 handler，按返回的 `Ack`：
    /// - `Commit`：提交偏移量
    /// - `Retry`：按退避策略原地重新处理，直到成功或收到关闭信号（不提交，重启后重投）
    /// - `DeadLetter`：写入死信队列后提交；死信写入失败按 `Retry` 处理
    pub async fn run(
        self,
        handler: Arc<dyn EventHandler>,
        dead_letters: DlqProducer,
        retry_policy: RetryPolicy,
        mut shutdown: watch::Receiver<bool>,
    ) {
        use futures::StreamExt;

        let stream = self.consumer.stream();
        futures::pin_mut!(stream);

        info!("Kafka 消费循环已启动");

        loop {
            let msg = tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("收到关闭信号，Kafka 消费循环退出");
                    break;
                }

                next = stream.next() => {
                    let Some(next) = next else {
                        warn!("Kafka 消息流意外结束");
                        break;
                    };

                    match next {
                        Ok(borrowed) => ConsumerMessage::from_borrowed(&borrowed),
                        Err(e) => {
                            error!(error = %e, "接收 Kafka 消息出错");
                            continue;
                        }
                    }
                }
            };

            debug!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                "收到 Kafka 消息"
            );

            let settled = dispatch(
                handler.as_ref(),
                &dead_letters,
                &retry_policy,
                &msg,
                &mut shutdown,
            )
            .await;

            if !settled {
                info!(
                    topic = %msg.topic,
                    offset = msg.offset,
                    "关闭时消息仍未处理完成，偏移量不提交"
                );
                break;
            }

            if let Err(e) = self.commit(&msg) {
                // 提交失败只会导致重复投递，幂等账本会吸收
                error!(error = %e, topic = %msg.topic, offset = msg.offset, "提交偏移量失败");
            }
        }
    }

    fn commit(&self, msg: &ConsumerMessage) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.offset + 1))
            .map_err(|e| LealError::Kafka(format!("构造提交偏移量失败: {e}")))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| LealError::Kafka(format!("提交偏移量失败: {e}")))
    }
}

/// 处理单条消息直到它可以被提交
///
/// 返回 `true` 表示消息已处理完成（包括转入死信），
/// 返回 `false` 表示在重试退避期间收到了关闭信号。
pub async fn dispatch(
    handler: &dyn EventHandler,
    dead_letters: &DlqProducer,
    retry_policy: &RetryPolicy,
    msg: &ConsumerMessage,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let mut attempt: u32 = 0;

    loop {
        match handler.handle(msg).await {
            Ack::Commit => return true,
            Ack::DeadLetter { reason } => {
                match dead_letters.send(msg, &reason).await {
                    Ok(()) => return true,
                    Err(e) => error!(error = %e, topic = %msg.topic, "写入死信队列失败"),
                }
            }
            Ack::Retry { reason } => {
                warn!(topic = %msg.topic, offset = msg.offset, attempt, reason, "消息处理失败，稍后重试");
            }
        }

        let delay = retry_policy.delay_for_attempt(attempt);
        attempt = attempt.saturating_add(1);

        tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => return false,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
