//! 共享库
//!
//! 品牌服务与客户服务共用的配置、错误处理、数据库连接、
//! 事件定义、Kafka 收发、outbox 中继与可观测性基础设施。

pub mod config;
pub mod database;
pub mod dlq;
pub mod error;
pub mod events;
pub mod idempotency;
pub mod kafka;
pub mod observability;
pub mod outbox;
pub mod retry;
pub mod shutdown;
pub mod test_utils;
