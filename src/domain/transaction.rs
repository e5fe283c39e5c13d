//! 交易领域模型
//!
//! 金额与手续费一律使用精确的十进制字符串，禁止浮点

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::transaction_status::TransactionStatus;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Send,
    Receive,
    Swap,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Receive => "receive",
            Self::Swap => "swap",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "send" => Ok(Self::Send),
            "receive" => Ok(Self::Receive),
            "swap" => Ok(Self::Swap),
            other => Err(AppError::CorruptRecord(format!(
                "unknown transaction kind: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub kind: TransactionKind,
    pub from_address: String,
    pub to_address: String,
    pub amount: String,
    pub currency_symbol: String,
    pub fee: String,
    pub status: TransactionStatus,
    /// 与兑换服务商关联的不透明 id（非兑换交易为链上哈希）
    pub external_hash: Option<String>,
    pub evm_chain_id: Option<u64>,
    /// 仅 swap：桥接的源网络
    pub source_evm_chain_id: Option<u64>,
    /// 仅 swap：桥接的目标网络
    pub destination_evm_chain_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    /// 应用部分更新，返回是否有字段发生变化
    pub fn apply(&mut self, update: TransactionUpdate) -> bool {
        let mut changed = false;
        if let Some(status) = update.status {
            if self.status != status {
                self.status = status;
                changed = true;
            }
        }
        if let Some(hash) = update.external_hash {
            if self.external_hash.as_deref() != Some(hash.as_str()) {
                self.external_hash = Some(hash);
                changed = true;
            }
        }
        if let Some(fee) = update.fee {
            if self.fee != fee {
                self.fee = fee;
                changed = true;
            }
        }
        changed
    }
}

/// 新交易字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub wallet_id: Uuid,
    pub kind: TransactionKind,
    pub from_address: String,
    pub to_address: String,
    pub amount: String,
    pub currency_symbol: String,
    pub fee: String,
    pub status: TransactionStatus,
    pub external_hash: Option<String>,
    pub evm_chain_id: Option<u64>,
    pub source_evm_chain_id: Option<u64>,
    pub destination_evm_chain_id: Option<u64>,
}

impl NewTransaction {
    /// 校验金额精度表示与 swap 专属字段
    pub fn validate(&self) -> AppResult<()> {
        let amount = parse_decimal("amount", &self.amount)?;
        if amount <= Decimal::ZERO {
            return Err(AppError::invalid_parameter("amount must be positive"));
        }
        let fee = parse_decimal("fee", &self.fee)?;
        if fee < Decimal::ZERO {
            return Err(AppError::invalid_parameter("fee must not be negative"));
        }

        let has_bridge_ids =
            self.source_evm_chain_id.is_some() || self.destination_evm_chain_id.is_some();
        if has_bridge_ids && self.kind != TransactionKind::Swap {
            return Err(AppError::invalid_parameter(
                "source/destination evm chain ids are only valid for swaps",
            ));
        }
        Ok(())
    }

    pub fn into_record(self) -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4(),
            wallet_id: self.wallet_id,
            kind: self.kind,
            from_address: self.from_address,
            to_address: self.to_address,
            amount: self.amount,
            currency_symbol: self.currency_symbol,
            fee: self.fee,
            status: self.status,
            external_hash: self.external_hash,
            evm_chain_id: self.evm_chain_id,
            source_evm_chain_id: self.source_evm_chain_id,
            destination_evm_chain_id: self.destination_evm_chain_id,
            timestamp: Utc::now(),
        }
    }
}

/// 交易部分更新
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub status: Option<TransactionStatus>,
    pub external_hash: Option<String>,
    pub fee: Option<String>,
}

impl TransactionUpdate {
    pub fn status(status: TransactionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.external_hash.is_none() && self.fee.is_none()
    }

    /// 与写入时相同的字段约束
    pub fn validate(&self) -> AppResult<()> {
        if let Some(fee) = &self.fee {
            if parse_decimal("fee", fee)? < Decimal::ZERO {
                return Err(AppError::invalid_parameter("fee must not be negative"));
            }
        }
        if let Some(hash) = &self.external_hash {
            if hash.trim().is_empty() {
                return Err(AppError::invalid_parameter("external hash must not be empty"));
            }
        }
        Ok(())
    }
}

/// 解析十进制金额字符串
pub fn parse_decimal(field: &str, value: &str) -> AppResult<Decimal> {
    Decimal::from_str(value.trim())
        .map_err(|_| AppError::invalid_parameter(format!("{} is not a decimal: {}", field, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: TransactionKind) -> NewTransaction {
        NewTransaction {
            wallet_id: Uuid::new_v4(),
            kind,
            from_address: "0xfrom".into(),
            to_address: "0xto".into(),
            amount: "0.000000000000000001".into(),
            currency_symbol: "ETH".into(),
            fee: "0".into(),
            status: TransactionStatus::Pending,
            external_hash: None,
            evm_chain_id: Some(1),
            source_evm_chain_id: None,
            destination_evm_chain_id: None,
        }
    }

    #[test]
    fn test_validate_keeps_exact_precision() {
        let tx = sample(TransactionKind::Send);
        tx.validate().unwrap();
        // 字符串原样保存，不经过浮点
        assert_eq!(tx.into_record().amount, "0.000000000000000001");
    }

    #[test]
    fn test_validate_rejects_non_decimal() {
        let mut tx = sample(TransactionKind::Send);
        tx.amount = "1.5 ETH".into();
        assert!(matches!(tx.validate(), Err(AppError::InvalidParameter(_))));

        let mut tx = sample(TransactionKind::Send);
        tx.amount = "0".into();
        assert!(tx.validate().is_err());
    }

    #[test]
    fn test_bridge_ids_only_for_swaps() {
        let mut tx = sample(TransactionKind::Receive);
        tx.source_evm_chain_id = Some(1);
        assert!(tx.validate().is_err());

        let mut swap = sample(TransactionKind::Swap);
        swap.source_evm_chain_id = Some(1);
        swap.destination_evm_chain_id = Some(137);
        assert!(swap.validate().is_ok());
    }

    #[test]
    fn test_apply_reports_change() {
        let mut record = sample(TransactionKind::Swap).into_record();
        assert!(!record.apply(TransactionUpdate::status(TransactionStatus::Pending)));
        assert!(record.apply(TransactionUpdate::status(TransactionStatus::Completed)));
        assert_eq!(record.status, TransactionStatus::Completed);
    }

    #[test]
    fn test_update_validates_fee() {
        let update = |fee: &str| TransactionUpdate {
            fee: Some(fee.to_string()),
            ..Default::default()
        };
        assert!(update("0.000021").validate().is_ok());
        assert!(update("not-a-number").validate().is_err());
        assert!(update("-1").validate().is_err());
        assert!(TransactionUpdate::status(TransactionStatus::Failed)
            .validate()
            .is_ok());
    }
}
