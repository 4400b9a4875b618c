//! 品牌积分服务
//!
//! 启动购买事件消费者、outbox 中继与指标端点。

use std::sync::Arc;

use anyhow::{Context, Result};
use leal_shared::{
    config::AppConfig,
    database::Database,
    dlq::DlqProducer,
    error::LealError,
    kafka::KafkaProducer,
    observability,
    outbox::{OutboxRelay, PgOutboxStore},
    retry::{RetryPolicy, retry_with_policy},
};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use brand_leal::{
    consumer::{PurchaseConsumer, PurchaseEventHandler},
    repository::PgCampaignStore,
    service::AccrualService,
};

const SERVICE_NAME: &str = "brand-leal-service";

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置
    // 此时日志尚未初始化，加载失败直接退出并由 anyhow 输出错误
    let config = AppConfig::load(SERVICE_NAME)
        .with_context(|| format!("加载 {SERVICE_NAME} 配置失败"))?;

    // 2. 可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(environment = %config.environment, "Starting brand-leal-service...");

    // 3. 数据库（启动时数据库可能尚未就绪，按退避策略重试）
    let db = retry_with_policy(
        &RetryPolicy::default(),
        "connect_database",
        LealError::is_retryable,
        || Database::connect(&config.database),
    )
    .await?;
    db.run_migrations(&MIGRATOR).await?;
    let pool = db.pool().clone();

    // 4. 组件装配
    let store = Arc::new(PgCampaignStore::new(pool.clone()));
    let service = Arc::new(AccrualService::new(
        store,
        config.kafka.apply_points_topic.clone(),
    ));
    let handler = Arc::new(PurchaseEventHandler::new(service));

    let producer = Arc::new(KafkaProducer::new(&config.kafka)?);
    let dead_letters = DlqProducer::new(
        producer.clone(),
        config.kafka.dead_letter_topic.clone(),
        SERVICE_NAME,
    );
    let relay = OutboxRelay::new(
        Arc::new(PgOutboxStore::new(pool)),
        producer,
        config.outbox.clone(),
    );
    let consumer = PurchaseConsumer::new(&config, handler, dead_letters)?;

    // 5. 启动后台任务
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_task = tokio::spawn(relay.run(shutdown_rx.clone()));
    let consumer_task = tokio::spawn(consumer.run(shutdown_rx));

    info!("brand-leal-service started");

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    match consumer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "购买事件消费者异常退出"),
        Err(e) => error!(error = %e, "购买事件消费者任务 panic"),
    }
    if let Err(e) = relay_task.await {
        error!(error = %e, "outbox 中继任务 panic");
    }

    db.close().await;
    info!("brand-leal-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
