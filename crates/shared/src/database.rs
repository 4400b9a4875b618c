//! PostgreSQL 连接池
//!
//! 每个服务拥有独立的库，迁移脚本放在各自 crate 的 `migrations/` 下，
//! 由服务把 `sqlx::migrate!` 生成的 `Migrator` 传进来执行。

use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::{LealError, Result};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 建立连接池并确认库可达
    ///
    /// 连接失败返回可重试的 `LealError::Database`，启动时配合 `retry_with_policy` 等待数据库就绪。
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        let db = Self { pool };
        db.ping().await?;
        info!("数据库连接池已就绪");
        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(LealError::from)
    }

    /// 执行服务自带的迁移，已执行过的版本会跳过
    #[instrument(skip(self, migrator), fields(known = migrator.iter().count()))]
    pub async fn run_migrations(&self, migrator: &Migrator) -> Result<()> {
        migrator
            .run(&self.pool)
            .await
            .map_err(|e| LealError::Database(e.into()))?;
        info!("数据库迁移完成");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("数据库连接池已关闭");
    }
}
