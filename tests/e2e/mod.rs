//! 积分系统端到端测试
//!
//! 两个服务通过内存消息总线连接，覆盖完整链路：
//! - 购买扣减金币 -> 购买事件 -> 品牌侧计算奖励 -> 入账事件 -> 客户侧入账
//! - 至少一次投递下的重复事件
//! - 消息系统故障与恢复
//! - 兑换与余额查询

pub mod setup;
pub mod suites;

pub use setup::TestEnvironment;
