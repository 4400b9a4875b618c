//! 客户积分账本服务
//!
//! 持有客户积分/金币的权威账本：
//! - 消费入账事件，幂等地写入流水并更新余额
//! - 购买时校验并扣减金币，通过 outbox 发布购买事件
//! - 兑换奖励时校验并扣减积分
//! - 余额与流水查询

pub mod consumer;
pub mod error;
pub mod models;
pub mod repository;
pub mod service;

pub use error::{LedgerError, Result};
