//! 交易状态定义
//!
//! 本地只持久化粗粒度状态；兑换服务商上报的细粒度状态通过 `SwapStatus::coarse` 投影

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// 本地持久化的交易状态
/// ✅ 单调：Pending → Completed | Failed，终态不可逆
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    /// 是否为最终状态（不可再转换）
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// 验证状态转换合法性
    pub fn can_transition_to(&self, target: &Self) -> bool {
        use TransactionStatus::*;

        matches!((self, target), (Pending, Completed) | (Pending, Failed))
    }

    /// 转换为数据库字符串
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

impl FromStr for TransactionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(AppError::CorruptRecord(format!(
                "unknown transaction status: {}",
                other
            ))),
        }
    }
}

/// 兑换服务商上报的细粒度状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    /// 等待用户充值
    Waiting,
    /// 充值已上链，等待确认
    Confirming,
    Exchanging,
    /// 正在向目标地址打款
    Sending,
    Finished,
    Failed,
    Refunded,
}

impl SwapStatus {
    /// 投影到本地粗粒度状态
    pub fn coarse(&self) -> TransactionStatus {
        match self {
            Self::Waiting | Self::Confirming | Self::Exchanging | Self::Sending => {
                TransactionStatus::Pending
            }
            Self::Finished => TransactionStatus::Completed,
            Self::Failed | Self::Refunded => TransactionStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Confirming => "confirming",
            Self::Exchanging => "exchanging",
            Self::Sending => "sending",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapStatus {
    type Err = AppError;

    /// 兼容服务商的别名：new / verifying / expired
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "waiting" | "new" => Ok(Self::Waiting),
            "confirming" | "verifying" => Ok(Self::Confirming),
            "exchanging" => Ok(Self::Exchanging),
            "sending" => Ok(Self::Sending),
            "finished" => Ok(Self::Finished),
            "failed" | "expired" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(AppError::gateway(format!("unknown swap status: {}", other))),
        }
    }
}
