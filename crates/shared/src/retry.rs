//! 重试策略
//!
//! 指数退避用于两处：
//! - 消费端收到 `Ack::Retry` 后的原地重试间隔
//! - 启动阶段连接数据库等一次性操作（`retry_with_policy`）

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::LealError;

/// 指数退避策略
///
/// 第 N 次重试等待 `initial_delay * multiplier^N`，不超过 `max_delay`。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// `retry_with_policy` 的最大重试次数（不含首次执行）；消费端重试不受此限制
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 消费端使用的策略：起步快，上限 10 秒
    pub fn for_consumer() -> Self {
        Self {
            max_retries: u32::MAX,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }

    /// outbox 中继使用的策略：从轮询间隔起步，上限 30 秒，不设次数上限
    pub fn for_outbox(poll_interval: Duration) -> Self {
        Self {
            max_retries: u32::MAX,
            initial_delay: poll_interval,
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    /// 第 `attempt` 次重试前的等待时间（从 0 开始）
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// 带重试的异步执行器
///
/// 仅在 `is_retryable` 返回 true 时重试，其余错误直接返回。
pub async fn retry_with_policy<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&LealError) -> bool,
    mut operation: F,
) -> Result<T, LealError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LealError>>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation = operation_name, attempt, "操作在重试后成功");
                }
                return Ok(value);
            }
            Err(err) if !is_retryable(&err) || !policy.should_retry(attempt) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    code = err.code(),
                    "操作失败，不再重试"
                );
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "操作失败，退避后重试"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
