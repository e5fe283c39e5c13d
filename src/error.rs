//! 统一错误类型
//!
//! 所有错误载荷都不得包含明文私钥或密码

use uuid::Uuid;

use crate::domain::transaction::NewTransaction;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 解密失败：密码错误或密文损坏（两者刻意不区分）
    #[error("wrong password or corrupt encrypted data")]
    WrongPasswordOrCorruptData,

    /// 生成的地址未通过格式校验，说明生成器本身有缺陷
    #[error("generated {chain} address failed format validation")]
    InvalidAddressFormat { chain: &'static str },

    /// 持久化记录与其解密结果不一致
    #[error("corrupt wallet record: {0}")]
    CorruptRecord(String),

    #[error("wallet not found: {0}")]
    WalletNotFound(Uuid),

    #[error("transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("wallet store is not connected")]
    StoreNotConnected,

    #[error("exchange gateway error: {0}")]
    ExternalGatewayError(String),

    /// 外部订单已创建，但本地记录写入失败，需要人工或补偿流程处理
    #[error("swap order {external_id} created externally but local record failed: {reason}")]
    PartialSwapCreationFailure {
        external_id: String,
        reason: String,
        pending: Box<NewTransaction>,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// 稳定的错误码，用于日志和上层映射
    pub fn code(&self) -> &'static str {
        match self {
            AppError::WrongPasswordOrCorruptData => "wrong_password_or_corrupt_data",
            AppError::InvalidAddressFormat { .. } => "invalid_address_format",
            AppError::CorruptRecord(_) => "corrupt_record",
            AppError::WalletNotFound(_) => "wallet_not_found",
            AppError::TransactionNotFound(_) => "transaction_not_found",
            AppError::StoreNotConnected => "store_not_connected",
            AppError::ExternalGatewayError(_) => "external_gateway_error",
            AppError::PartialSwapCreationFailure { .. } => "partial_swap_creation_failure",
            AppError::InvalidParameter(_) => "invalid_parameter",
            AppError::KeyGeneration(_) => "key_generation_failed",
            AppError::Database(_) => "database_error",
            AppError::Config(_) => "config_error",
        }
    }

    /// 内部错误（生成器缺陷、数据损坏）需要告警，而不是提示用户重试
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::InvalidAddressFormat { .. }
                | AppError::CorruptRecord(_)
                | AppError::KeyGeneration(_)
                | AppError::Database(_)
        )
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        AppError::ExternalGatewayError(msg.into())
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        AppError::InvalidParameter(msg.into())
    }
}

// 从 SQLx 错误转换
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => AppError::StoreNotConnected,
            sqlx::Error::Database(ref db_err) => {
                if let Some(code) = db_err.code() {
                    if code == "23503" {
                        // PostgreSQL foreign_key_violation
                        return AppError::Database("foreign key constraint violation".into());
                    }
                }
                AppError::Database(db_err.to_string())
            }
            _ => AppError::Database(format!("database operation failed: {}", err)),
        }
    }
}

// 从 reqwest 错误转换
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return AppError::ExternalGatewayError("request timed out".into());
        }
        AppError::ExternalGatewayError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            AppError::WrongPasswordOrCorruptData.code(),
            "wrong_password_or_corrupt_data"
        );
        assert_eq!(AppError::StoreNotConnected.code(), "store_not_connected");
        assert_eq!(
            AppError::WalletNotFound(Uuid::nil()).code(),
            "wallet_not_found"
        );
    }

    #[test]
    fn test_internal_classification() {
        assert!(AppError::InvalidAddressFormat { chain: "tron" }.is_internal());
        assert!(!AppError::WrongPasswordOrCorruptData.is_internal());
        assert!(!AppError::gateway("rate limited").is_internal());
    }
}
