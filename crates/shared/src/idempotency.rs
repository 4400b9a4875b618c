//! 幂等账本
//!
//! 消费端在同一个事务里先登记事件 ID，再执行状态变更。
//! 登记失败（ID 已存在）说明事件已经处理过，整个处理退化为直接确认。

use async_trait::async_trait;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::Result;

/// 幂等登记端口，由各服务的事务单元实现
#[async_trait]
pub trait IdempotencyPort: Send {
    /// 登记事件 ID；首次登记返回 true，已存在返回 false
    async fn try_mark_processed(&mut self, event_id: Uuid) -> Result<bool>;
}

/// 在调用方事务中登记事件 ID
///
/// 依赖 `processed_events.event_id` 主键，并发的重复投递只有一个能插入成功，
/// 另一个在主键冲突上等待前者事务结束后得到 0 行。
pub async fn try_mark_processed_in_tx(conn: &mut PgConnection, event_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO processed_events (event_id, processed_at)
        VALUES ($1, NOW())
        ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(event_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}
