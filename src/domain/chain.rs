//! 链类型定义
//!
//! 四种链是封闭集合，链特有的元数据（network / evm_chain_id）作为记录上的可选字段

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// EVM 默认链ID（以太坊主网）
pub const DEFAULT_EVM_CHAIN_ID: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    /// 以太坊及所有 EVM 兼容链（BSC、Polygon 等共享同一套密钥和地址格式）
    Ethereum,
    Bitcoin,
    Solana,
    Tron,
}

impl ChainKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainKind::Ethereum => "ethereum",
            ChainKind::Bitcoin => "bitcoin",
            ChainKind::Solana => "solana",
            ChainKind::Tron => "tron",
        }
    }

    /// 曲线类型
    pub fn curve(&self) -> &'static str {
        match self {
            ChainKind::Solana => "ed25519",
            _ => "secp256k1",
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ethereum" | "eth" | "evm" => Ok(ChainKind::Ethereum),
            "bitcoin" | "btc" => Ok(ChainKind::Bitcoin),
            "solana" | "sol" => Ok(ChainKind::Solana),
            "tron" | "trx" => Ok(ChainKind::Tron),
            other => Err(AppError::invalid_parameter(format!(
                "unsupported chain kind: {}",
                other
            ))),
        }
    }
}

/// Bitcoin 网络
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitcoinNetwork {
    #[default]
    Mainnet,
    Testnet,
}

impl BitcoinNetwork {
    pub fn as_str(&self) -> &'static str {
        match self {
            BitcoinNetwork::Mainnet => "mainnet",
            BitcoinNetwork::Testnet => "testnet",
        }
    }

    pub(crate) fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            BitcoinNetwork::Mainnet => bitcoin::Network::Bitcoin,
            BitcoinNetwork::Testnet => bitcoin::Network::Testnet,
        }
    }
}

impl FromStr for BitcoinNetwork {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "bitcoin" => Ok(BitcoinNetwork::Mainnet),
            "testnet" => Ok(BitcoinNetwork::Testnet),
            other => Err(AppError::invalid_parameter(format!(
                "unsupported bitcoin network: {}",
                other
            ))),
        }
    }
}

/// 钱包创建时的链选项
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainOptions {
    /// 仅 Bitcoin 有效，缺省为主网
    pub network: Option<BitcoinNetwork>,
    /// 仅 EVM 有效，缺省为 1；只是归属元数据，不影响密钥生成
    pub evm_chain_id: Option<u64>,
}

impl ChainOptions {
    pub fn evm(chain_id: u64) -> Self {
        Self {
            network: None,
            evm_chain_id: Some(chain_id),
        }
    }

    pub fn bitcoin(network: BitcoinNetwork) -> Self {
        Self {
            network: Some(network),
            evm_chain_id: None,
        }
    }

    /// network 仅限 Bitcoin，evm_chain_id 仅限 EVM
    pub fn ensure_scoped_to(&self, kind: ChainKind) -> AppResult<()> {
        if self.network.is_some() && kind != ChainKind::Bitcoin {
            return Err(AppError::invalid_parameter(format!(
                "network option is only valid for bitcoin, got {}",
                kind
            )));
        }
        if self.evm_chain_id.is_some() && kind != ChainKind::Ethereum {
            return Err(AppError::invalid_parameter(format!(
                "evm_chain_id option is only valid for ethereum-compatible chains, got {}",
                kind
            )));
        }
        Ok(())
    }
}
