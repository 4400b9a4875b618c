//! 服务层
//!
//! - `ledger_service`: 入账事件 -> 流水 + 积分/金币余额
//! - `purchase_service`: 购买时扣减金币并发布购买事件
//! - `redemption_service`: 兑换奖励扣减积分
//! - `query_service`: 余额与流水查询

pub mod dto;
pub mod ledger_service;
pub mod purchase_service;
pub mod query_service;
pub mod redemption_service;

pub use dto::*;
pub use ledger_service::{ApplyOutcome, LedgerService};
pub use purchase_service::PurchaseService;
pub use query_service::BalanceQueryService;
pub use redemption_service::RedemptionService;
