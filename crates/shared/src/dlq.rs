//! 死信队列
//!
//! 无法处理的消息（无法解析、引用了不存在的数据、品牌缺少基础活动等）
//! 不会无限重投，而是连同失败原因一起写入死信频道，等待人工介入。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::events::EventPublisher;
use crate::kafka::ConsumerMessage;

/// 死信消息信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterMessage {
    /// 原始消息 key（客户 ID），可能缺失
    pub message_key: Option<String>,
    pub source_topic: String,
    /// 原始负载；非 UTF-8 内容按有损方式转换
    pub payload: String,
    pub error: String,
    pub source_service: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterMessage {
    pub fn from_message(msg: &ConsumerMessage, error: &str, source_service: &str) -> Self {
        Self {
            message_key: msg.key.clone(),
            source_topic: msg.topic.clone(),
            payload: String::from_utf8_lossy(&msg.payload).into_owned(),
            error: error.to_string(),
            source_service: source_service.to_string(),
            failed_at: Utc::now(),
        }
    }
}

/// 死信生产者
///
/// 通过 `EventPublisher` 发送，因此既可以落到 Kafka，也可以落到内存总线。
#[derive(Clone)]
pub struct DlqProducer {
    publisher: Arc<dyn EventPublisher>,
    topic: String,
    source_service: String,
}

impl DlqProducer {
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        topic: impl Into<String>,
        source_service: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            topic: topic.into(),
            source_service: source_service.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// 将处理失败的消息写入死信频道
    pub async fn send(&self, msg: &ConsumerMessage, error: &str) -> Result<()> {
        let letter = DeadLetterMessage::from_message(msg, error, &self.source_service);
        let payload = serde_json::to_vec(&letter)?;
        let key = msg.key.as_deref().unwrap_or_default();

        self.publisher.publish(&self.topic, key, &payload).await?;

        warn!(
            source_topic = %msg.topic,
            key,
            error,
            "消息已发送到死信队列"
        );
        Ok(())
    }
}
