//! 统一错误处理模块
//!
//! 定义两个服务共享的基础设施错误类型，使用 thiserror 提供良好的错误信息。
//! 业务错误（余额不足、基础活动缺失等）由各服务在自己的错误类型中定义。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum LealError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    // ==================== 消息总线错误 ====================
    #[error("Kafka 错误: {0}")]
    Kafka(String),

    #[error("消息发布失败: channel={channel}, {message}")]
    Publish { channel: String, message: String },

    // ==================== 序列化错误 ====================
    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==================== 配置错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    // ==================== 通用错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, LealError>;

impl LealError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Publish { .. } => "PUBLISH_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 瞬时的存储/传输故障可以重试；序列化、校验类错误重试也不会成功。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(e) => is_transient_db_error(e),
            Self::Kafka(_) | Self::Publish { .. } => true,
            _ => false,
        }
    }
}

/// 数据库错误是否为瞬时故障
///
/// 约束冲突、数值溢出、解码失败由数据本身决定，重试结果不变；
/// 连接、超时、死锁与序列化冲突等视为瞬时故障。
pub fn is_transient_db_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => !db.code().is_some_and(|code| is_permanent_sqlstate(&code)),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_) => false,
        _ => true,
    }
}

/// SQLSTATE 22 类（数据异常）、23 类（完整性约束）、42 类（语法或权限）
pub fn is_permanent_sqlstate(code: &str) -> bool {
    matches!(code.get(..2), Some("22" | "23" | "42"))
}
