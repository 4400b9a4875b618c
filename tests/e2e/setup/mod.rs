//! 测试环境设置模块
//!
//! 在一个进程内装配品牌侧与客户侧，存储均为内存实现。

mod environment;

pub use environment::{PumpReport, TestEnvironment};
