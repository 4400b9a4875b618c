//! 仓储层
//!
//! 活动数据与 outbox 的读写。服务层只依赖 `traits` 中的端口，
//! 生产环境注入 PostgreSQL 实现，测试注入内存实现。

mod memory_store;
mod pg_store;
mod traits;

pub use memory_store::MemoryCampaignStore;
pub use pg_store::PgCampaignStore;
pub use traits::*;
