//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 与 `/health` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册业务指标描述，出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "accrual_events_published_total",
        "Accrual events computed from purchases"
    );
    metrics::describe_counter!(
        "campaign_matches_total",
        "Purchases that matched a non-base campaign"
    );
    metrics::describe_counter!(
        "accrual_events_applied_total",
        "Accrual events applied to the ledger, by outcome"
    );
    metrics::describe_counter!("purchases_total", "Purchases processed, by status");
    metrics::describe_counter!("redemptions_total", "Reward redemptions, by status");
    metrics::describe_histogram!(
        "ledger_operation_duration_seconds",
        "Duration of ledger transactions"
    );
    metrics::describe_counter!(
        "outbox_messages_total",
        "Outbox relay outcomes, by status"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录品牌侧算出的一次入账
#[inline]
pub fn record_accrual_computed(brand_id: i64, matched_campaigns: usize) {
    metrics::counter!(
        "accrual_events_published_total",
        "brand_id" => brand_id.to_string()
    )
    .increment(1);

    if matched_campaigns > 0 {
        metrics::counter!(
            "campaign_matches_total",
            "brand_id" => brand_id.to_string()
        )
        .increment(matched_campaigns as u64);
    }
}

/// 记录入账事件的处理结果（applied / duplicate / failed）
#[inline]
pub fn record_accrual_applied(outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "accrual_events_applied_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "ledger_operation_duration_seconds",
        "operation" => "apply_accrual"
    )
    .record(duration_secs);
}

/// 记录购买
#[inline]
pub fn record_purchase(status: &str, duration_secs: f64) {
    metrics::counter!("purchases_total", "status" => status.to_string()).increment(1);

    metrics::histogram!(
        "ledger_operation_duration_seconds",
        "operation" => "purchase"
    )
    .record(duration_secs);
}

/// 记录兑换
#[inline]
pub fn record_redemption(status: &str, duration_secs: f64) {
    metrics::counter!("redemptions_total", "status" => status.to_string()).increment(1);

    metrics::histogram!(
        "ledger_operation_duration_seconds",
        "operation" => "redeem"
    )
    .record(duration_secs);
}

/// 记录 outbox 中继结果（published / failed / dead_lettered）
#[inline]
pub fn record_outbox(channel: &str, status: &str) {
    metrics::counter!(
        "outbox_messages_total",
        "channel" => channel.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
