//! 钱包领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::chain::{BitcoinNetwork, ChainKind, ChainOptions};
use crate::error::{AppError, AppResult};
use crate::infrastructure::encryption::EncryptedSecret;

/// 持久化的钱包记录
///
/// `encrypted_secret` 是私钥唯一的落盘形式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub id: Uuid,
    /// 不透明的用户标识
    pub owner_id: String,
    pub chain_kind: ChainKind,
    pub public_address: String,
    pub encrypted_secret: EncryptedSecret,
    /// 仅 Bitcoin
    pub network: Option<BitcoinNetwork>,
    /// 仅 EVM
    pub evm_chain_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletRecord {
    /// 应用部分更新，返回是否有字段发生变化
    pub fn apply(&mut self, update: WalletUpdate) -> bool {
        if update.is_empty() {
            return false;
        }
        if let Some(address) = update.public_address {
            self.public_address = address;
        }
        if let Some(secret) = update.encrypted_secret {
            self.encrypted_secret = secret;
        }
        if let Some(network) = update.network {
            self.network = Some(network);
        }
        if let Some(chain_id) = update.evm_chain_id {
            self.evm_chain_id = Some(chain_id);
        }
        self.updated_at = Utc::now();
        true
    }
}

/// 新钱包字段（尚未分配 id / owner）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWallet {
    pub chain_kind: ChainKind,
    pub public_address: String,
    pub encrypted_secret: EncryptedSecret,
    pub network: Option<BitcoinNetwork>,
    pub evm_chain_id: Option<u64>,
}

impl NewWallet {
    /// 链元数据必须与 chain_kind 匹配
    pub fn validate(&self) -> AppResult<()> {
        ChainOptions {
            network: self.network,
            evm_chain_id: self.evm_chain_id,
        }
        .ensure_scoped_to(self.chain_kind)
    }

    pub fn into_record(self, owner_id: &str) -> WalletRecord {
        let now = Utc::now();
        WalletRecord {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            chain_kind: self.chain_kind,
            public_address: self.public_address,
            encrypted_secret: self.encrypted_secret,
            network: self.network,
            evm_chain_id: self.evm_chain_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 钱包部分更新：只允许链相关的元数据
#[derive(Debug, Clone, Default)]
pub struct WalletUpdate {
    pub public_address: Option<String>,
    pub encrypted_secret: Option<EncryptedSecret>,
    pub network: Option<BitcoinNetwork>,
    pub evm_chain_id: Option<u64>,
}

impl WalletUpdate {
    pub fn is_empty(&self) -> bool {
        self.public_address.is_none()
            && self.encrypted_secret.is_none()
            && self.network.is_none()
            && self.evm_chain_id.is_none()
    }

    /// 更新与创建遵循同一套链元数据规则
    pub fn validate_for(&self, kind: ChainKind) -> AppResult<()> {
        if let Some(address) = &self.public_address {
            if address.trim().is_empty() {
                return Err(AppError::invalid_parameter("public address must not be empty"));
            }
        }
        ChainOptions {
            network: self.network,
            evm_chain_id: self.evm_chain_id,
        }
        .ensure_scoped_to(kind)
    }
}
