//! 仓储层
//!
//! - `traits`: 事务单元与存储端口
//! - `pg_store`: PostgreSQL 实现
//! - `memory_store`: 内存实现，供测试与本地运行

mod memory_store;
mod pg_store;
mod traits;

pub use memory_store::MemoryLedgerStore;
pub use pg_store::{PgLedgerStore, PgLedgerUnitOfWork};
pub use traits::*;
