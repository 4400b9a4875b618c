//! 服务层
//!
//! - `accrual_service`: 购买事件 -> 活动匹配 -> 积分/金币入账事件

pub mod accrual_service;

pub use accrual_service::{AccrualOutcome, AccrualService, AccrualTotals, compute_accrual};
