//! 品牌积分服务
//!
//! 消费购买事件，按品牌基础活动与门店活动计算积分/金币奖励，
//! 通过 outbox 发布入账事件。

pub mod consumer;
pub mod error;
pub mod models;
pub mod repository;
pub mod service;

pub use error::{AccrualError, Result};
