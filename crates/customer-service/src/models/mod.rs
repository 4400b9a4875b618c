//! 账本服务数据模型

mod customer;
mod ledger;
mod purchase;
mod redemption;

pub use customer::*;
pub use ledger::*;
pub use purchase::*;
pub use redemption::*;
