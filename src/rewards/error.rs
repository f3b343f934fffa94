//! 积分与好友核心的错误定义
//!
//! DAO 层统一返回 `anyhow::Result`，服务层把业务结果映射为 [`RewardsError`]，
//! 外部 HTTP 层根据 [`ErrorKind`] 决定响应码。

use serde::Serialize;
use thiserror::Error;

/// 对外稳定的错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Forbidden,
    AlreadyExists,
    CapacityExceeded,
    Internal,
}

/// 核心错误类型
#[derive(Debug, Error)]
pub enum RewardsError {
    /// 客户端输入错误（非法好友码、非正数积分、负序号）
    #[error("参数非法: {0}")]
    InvalidArgument(String),

    /// 用户、好友关系或好友码不存在
    #[error("资源不存在: {0}")]
    NotFound(String),

    /// 无权执行该操作（自己加自己、非被邀请人接受、重复接受等）
    #[error("无权操作: {0}")]
    Forbidden(String),

    /// 资源已存在（同一对用户已有好友关系、好友码已分配等）
    #[error("资源已存在: {0}")]
    AlreadyExists(String),

    /// 好友码空间耗尽，需要运维介入
    #[error("好友码空间耗尽: 序号 {ordinal} 超出容量 {capacity}")]
    CapacityExceeded { ordinal: i64, capacity: u64 },

    /// 存储或其他内部错误
    #[error("内部错误: {0:#}")]
    Internal(#[from] anyhow::Error),
}

/// 核心统一的 Result 别名
pub type RewardsResult<T> = std::result::Result<T, RewardsError>;

impl RewardsError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// 错误类别（供外部传输层映射）
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 调用方是否值得重试：客户端错误与容量耗尽都不可重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

/// 判断 sqlx 错误是否为唯一约束冲突
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

/// 判断错误链中是否包含 SQLite 的 BUSY / LOCKED（写锁竞争，可以重试）
pub(crate) fn is_transient_conflict(err: &anyhow::Error) -> bool {
    let Some(sqlx_err) = err.downcast_ref::<sqlx::Error>() else {
        return false;
    };
    let Some(db_err) = sqlx_err.as_database_error() else {
        return false;
    };
    // 扩展错误码的低 8 位是主错误码：5 = SQLITE_BUSY，6 = SQLITE_LOCKED
    db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| matches!(code & 0xff, 5 | 6))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            RewardsError::invalid_argument("x").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(RewardsError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(RewardsError::forbidden("x").kind(), ErrorKind::Forbidden);
        assert_eq!(
            RewardsError::already_exists("x").kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            RewardsError::CapacityExceeded {
                ordinal: 1,
                capacity: 1
            }
            .kind(),
            ErrorKind::CapacityExceeded
        );
    }

    #[test]
    fn only_internal_errors_are_retryable() {
        assert!(!RewardsError::forbidden("double accept").is_retryable());
        assert!(!RewardsError::CapacityExceeded {
            ordinal: 60_466_176,
            capacity: 60_466_176
        }
        .is_retryable());
        assert!(RewardsError::Internal(anyhow::anyhow!("disk full")).is_retryable());
    }

    #[test]
    fn plain_anyhow_error_is_not_a_conflict() {
        assert!(!is_transient_conflict(&anyhow::anyhow!("database is locked")));
    }
}
