//! 测试套件模块
//!
//! 按业务流程组织的测试用例集合。

pub mod broker_outage;
pub mod purchase_flow;
pub mod redelivery;
pub mod redemption;
