//! 账本服务错误类型
//!
//! 余额不足、客户不存在等业务错误直接返回给调用方或转入死信；
//! 数据库与消息系统的瞬时故障标记为可重试。

use leal_shared::error::{LealError, is_transient_db_error};
use thiserror::Error;

/// 账本服务错误类型
#[derive(Debug, Error)]
pub enum LedgerError {
    // === 业务错误 ===
    #[error("客户不存在: {0}")]
    CustomerNotFound(i64),

    #[error("积分记录不存在: customer_id={customer_id}, brand_id={brand_id}")]
    PointsRecordNotFound { customer_id: i64, brand_id: i64 },

    #[error("金币不足: 需要 {required}, 可用 {available}")]
    InsufficientCoins { required: i64, available: i64 },

    #[error("积分不足: 需要 {required}, 可用 {available}")]
    InsufficientPoints { required: i64, available: i64 },

    #[error("请求参数无效: {0}")]
    InvalidRequest(String),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Shared(#[from] LealError),

    #[error("内部错误: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(e) => is_transient_db_error(e),
            Self::Shared(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// 是否为业务错误
    pub fn is_business_error(&self) -> bool {
        matches!(
            self,
            Self::CustomerNotFound(_)
                | Self::PointsRecordNotFound { .. }
                | Self::InsufficientCoins { .. }
                | Self::InsufficientPoints { .. }
                | Self::InvalidRequest(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CustomerNotFound(_) => "CUSTOMER_NOT_FOUND",
            Self::PointsRecordNotFound { .. } => "POINTS_RECORD_NOT_FOUND",
            Self::InsufficientCoins { .. } => "INSUFFICIENT_COINS",
            Self::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Shared(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
