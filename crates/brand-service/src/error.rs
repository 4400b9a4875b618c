//! 品牌服务错误类型
//!
//! 区分业务错误（消息本身无法处理，转入死信）与系统错误（瞬时故障，重试）

use leal_shared::error::{LealError, is_transient_db_error};
use thiserror::Error;

/// 品牌服务错误类型
#[derive(Debug, Error)]
pub enum AccrualError {
    // === 业务错误 ===
    #[error("品牌缺少基础活动: brand_id={0}")]
    NoBaseCampaign(i64),

    #[error("活动配置无效: {0}")]
    InvalidCampaign(String),

    #[error("购买事件无效: {0}")]
    InvalidPurchase(String),

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

pub type Result<T> = std::result::Result<T, AccrualError>;

impl AccrualError {
    /// 是否为可重试的错误
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
            Self::NoBaseCampaign(_) | Self::InvalidCampaign(_) | Self::InvalidPurchase(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoBaseCampaign(_) => "NO_BASE_CAMPAIGN",
            Self::InvalidCampaign(_) => "INVALID_CAMPAIGN",
            Self::InvalidPurchase(_) => "INVALID_PURCHASE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Shared(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_base_campaign_is_terminal() {
        let err = AccrualError::NoBaseCampaign(7);
        assert!(!err.is_retryable());
        assert!(err.is_business_error());
        assert_eq!(err.error_code(), "NO_BASE_CAMPAIGN");
        assert!(err.to_string().contains("brand_id=7"));
    }

    #[test]
    fn test_infrastructure_errors_are_retryable() {
        assert!(AccrualError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!AccrualError::Database(sqlx::Error::ColumnNotFound("points".to_string())).is_retryable());
        assert!(AccrualError::Shared(LealError::Kafka("down".to_string())).is_retryable());
        assert!(!AccrualError::Shared(LealError::Validation("x".to_string())).is_retryable());
        assert!(!AccrualError::Internal("bug".to_string()).is_business_error());
    }

    #[test]
    fn test_shared_error_code_passthrough() {
        let err = AccrualError::Shared(LealError::Publish {
            channel: "apply-points".to_string(),
            message: "timeout".to_string(),
        });
        assert_eq!(err.error_code(), "PUBLISH_ERROR");
    }
}
