//! 兑换服务商抽象
//!
//! 报价、下单、订单状态查询三个操作；金额一律为十进制字符串

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::transaction::parse_decimal;
use crate::domain::SwapStatus;
use crate::error::{AppError, AppResult};

/// 报价请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRequest {
    pub from_currency: String,
    pub to_currency: String,
    pub amount: String,
    pub from_evm_chain_id: Option<u64>,
    pub to_evm_chain_id: Option<u64>,
}

/// 下单请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub pair: RateRequest,
    pub destination_address: String,
    pub refund_address: String,
}

/// 报价结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
    pub estimated_amount: String,
    pub rate: String,
    pub fee: String,
    pub network_fee: String,
}

impl RateQuote {
    /// 服务费 + 网络费
    pub fn total_fee(&self) -> AppResult<Decimal> {
        let fee = parse_decimal("fee", &self.fee)?;
        let network_fee = parse_decimal("network_fee", &self.network_fee)?;
        fee.checked_add(network_fee)
            .ok_or_else(|| AppError::gateway("quoted fee overflows decimal range"))
    }
}

/// 已创建的外部订单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrder {
    /// 服务商订单号，本地保存为 `external_hash`
    pub external_id: String,
    pub deposit_address: String,
    pub expected_amount_out: String,
}

/// 订单状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub fine_status: SwapStatus,
    pub payin_hash: Option<String>,
    pub payout_hash: Option<String>,
}

/// 兑换服务商接口
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn get_rate(&self, request: &RateRequest) -> AppResult<RateQuote>;

    async fn create_order(&self, request: &OrderRequest) -> AppResult<CreatedOrder>;

    async fn get_order_status(&self, external_id: &str) -> AppResult<OrderStatusReport>;
}

/// EVM 链ID → 服务商网络名
///
/// 未登记的链ID不给出网络提示，由服务商使用默认网络
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkMap {
    entries: BTreeMap<u64, String>,
}

impl Default for NetworkMap {
    fn default() -> Self {
        let entries = [
            (1, "eth"),
            (56, "bsc"),
            (137, "polygon"),
            (43114, "avalanche"),
            (10, "optimism"),
            (42161, "arbitrum"),
        ]
        .into_iter()
        .map(|(id, name)| (id, name.to_string()))
        .collect();
        Self { entries }
    }
}

impl NetworkMap {
    pub fn new(entries: BTreeMap<u64, String>) -> Self {
        Self { entries }
    }

    /// 从配置表构建（配置中的键是字符串形式的链ID）
    pub fn from_config(table: &BTreeMap<String, String>) -> AppResult<Self> {
        let mut entries = BTreeMap::new();
        for (chain_id, network) in table {
            let id = chain_id.trim().parse::<u64>().map_err(|_| {
                AppError::Config(format!("network_map key is not a chain id: {}", chain_id))
            })?;
            entries.insert(id, network.to_lowercase());
        }
        Ok(Self { entries })
    }

    pub fn network_for(&self, evm_chain_id: Option<u64>) -> Option<&str> {
        evm_chain_id.and_then(|id| self.entries.get(&id).map(String::as_str))
    }
}
