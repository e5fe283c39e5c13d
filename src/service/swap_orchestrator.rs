//! 兑换生命周期编排
//!
//! 状态机（本地粗粒度）：
//! - Pending → Completed（服务商 finished）
//! - Pending → Failed（服务商 failed / refunded / expired）
//! 终态记录不再写入；对账只在状态变化时写入，重复执行是幂等的

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::transaction::parse_decimal;
use crate::domain::{
    NewTransaction, SwapStatus, TransactionKind, TransactionRecord, TransactionStatus,
    TransactionUpdate,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::log_redact::redact_external_id;
use crate::repository::WalletStore;
use crate::service::exchange_gateway::{ExchangeGateway, OrderRequest, RateQuote, RateRequest};

/// 创建兑换请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSwapRequest {
    pub wallet_id: Uuid,
    pub from_currency: String,
    pub to_currency: String,
    pub amount: String,
    pub destination_address: String,
    pub refund_address: String,
    pub from_evm_chain_id: Option<u64>,
    pub to_evm_chain_id: Option<u64>,
}

impl CreateSwapRequest {
    fn rate_request(&self) -> RateRequest {
        RateRequest {
            from_currency: self.from_currency.clone(),
            to_currency: self.to_currency.clone(),
            amount: self.amount.clone(),
            from_evm_chain_id: self.from_evm_chain_id,
            to_evm_chain_id: self.to_evm_chain_id,
        }
    }
}

/// 单笔兑换的实时状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapStatusReport {
    pub transaction_id: Uuid,
    pub external_id: String,
    pub fine_status: SwapStatus,
    /// 本地记录的状态（可能落后于服务商，等待下一轮对账）
    pub local_status: TransactionStatus,
    pub payin_hash: Option<String>,
    pub payout_hash: Option<String>,
}

pub struct SwapOrchestrator {
    store: Arc<dyn WalletStore>,
    gateway: Arc<dyn ExchangeGateway>,
    call_timeout: Duration,
    /// 同一进程内的对账互斥
    reconcile_guard: Mutex<()>,
}

impl SwapOrchestrator {
    pub fn new(
        store: Arc<dyn WalletStore>,
        gateway: Arc<dyn ExchangeGateway>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            call_timeout,
            reconcile_guard: Mutex::new(()),
        }
    }

    /// 每次外部调用都带超时
    async fn call_gateway<T, F>(&self, op: &str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::gateway(format!(
                "{} timed out after {}s",
                op,
                self.call_timeout.as_secs_f64()
            ))),
        }
    }

    /// 报价（只读，不落库）
    pub async fn quote(&self, request: &RateRequest) -> AppResult<RateQuote> {
        ensure_positive_amount(&request.amount)?;
        self.call_gateway("get_rate", self.gateway.get_rate(request))
            .await
    }

    /// 创建兑换
    ///
    /// 1. 服务商下单，订单号作为 `external_hash`
    /// 2. 报价用于记账手续费，失败时手续费记为 0
    /// 3. 写入 pending 状态的 swap 记录
    ///
    /// 第 3 步失败时外部订单已存在，返回 `PartialSwapCreationFailure`，
    /// 携带未落库的记录供 `replay_orphaned_swap` 补偿
    pub async fn create_swap(&self, request: CreateSwapRequest) -> AppResult<TransactionRecord> {
        ensure_positive_amount(&request.amount)?;
        if request.destination_address.trim().is_empty() || request.refund_address.trim().is_empty()
        {
            return Err(AppError::invalid_parameter(
                "destination and refund addresses are required",
            ));
        }

        let wallet = self
            .store
            .get_wallet_by_id(request.wallet_id)
            .await?
            .ok_or(AppError::WalletNotFound(request.wallet_id))?;

        let mut pending = NewTransaction {
            wallet_id: wallet.id,
            kind: TransactionKind::Swap,
            from_address: wallet.public_address.clone(),
            to_address: request.destination_address.clone(),
            amount: request.amount.clone(),
            currency_symbol: request.from_currency.to_uppercase(),
            fee: "0".to_string(),
            status: TransactionStatus::Pending,
            external_hash: None,
            evm_chain_id: request.from_evm_chain_id.or(wallet.evm_chain_id),
            source_evm_chain_id: request.from_evm_chain_id,
            destination_evm_chain_id: request.to_evm_chain_id,
        };
        // 下单前先校验，避免因本地字段问题产生孤儿订单
        pending.validate()?;

        let rate_request = request.rate_request();
        let order_request = OrderRequest {
            pair: rate_request.clone(),
            destination_address: request.destination_address,
            refund_address: request.refund_address,
        };
        let order = self
            .call_gateway("create_order", self.gateway.create_order(&order_request))
            .await?;
        pending.external_hash = Some(order.external_id.clone());

        pending.fee = match self
            .call_gateway("get_rate", self.gateway.get_rate(&rate_request))
            .await
            .and_then(|quote| quote.total_fee())
        {
            Ok(fee) => fee.normalize().to_string(),
            Err(e) => {
                tracing::warn!(
                    external_id = %redact_external_id(&order.external_id),
                    error = %e,
                    "fee quote unavailable, recording zero fee"
                );
                Decimal::ZERO.to_string()
            }
        };

        match self.store.record_transaction(pending.clone()).await {
            Ok(record) => {
                tracing::info!(
                    transaction_id = %record.id,
                    wallet_id = %record.wallet_id,
                    external_id = %redact_external_id(&order.external_id),
                    "swap created"
                );
                Ok(record)
            }
            Err(e) => {
                tracing::error!(
                    wallet_id = %wallet.id,
                    external_id = %order.external_id,
                    error = %e,
                    "swap order created but local record failed"
                );
                Err(AppError::PartialSwapCreationFailure {
                    external_id: order.external_id,
                    reason: e.to_string(),
                    pending: Box::new(pending),
                })
            }
        }
    }

    /// 补写 `PartialSwapCreationFailure` 中未落库的记录
    ///
    /// 以 `external_hash` 去重：已存在则直接返回已有记录
    pub async fn replay_orphaned_swap(
        &self,
        pending: NewTransaction,
    ) -> AppResult<TransactionRecord> {
        if pending.kind != TransactionKind::Swap {
            return Err(AppError::invalid_parameter("only swap records can be replayed"));
        }
        let external_id = pending
            .external_hash
            .clone()
            .ok_or_else(|| AppError::invalid_parameter("orphaned swap has no external id"))?;

        if let Some(existing) = self
            .store
            .get_transaction_by_external_hash(&external_id)
            .await?
        {
            tracing::debug!(transaction_id = %existing.id, "orphaned swap already recorded");
            return Ok(existing);
        }

        let record = self.store.record_transaction(pending).await?;
        tracing::info!(
            transaction_id = %record.id,
            external_id = %redact_external_id(&external_id),
            "orphaned swap recorded"
        );
        Ok(record)
    }

    /// 对账所有 pending 状态的 swap 记录，返回实际更新的条数
    ///
    /// 单条记录失败只记录日志，不影响其它记录；已有一轮对账在进行时直接返回 0
    pub async fn reconcile_pending(&self) -> AppResult<usize> {
        let Ok(_guard) = self.reconcile_guard.try_lock() else {
            tracing::debug!("reconciliation already in progress, skipping");
            return Ok(0);
        };

        let pending = self
            .store
            .get_transactions_by_status(TransactionStatus::Pending)
            .await?;

        let mut updated = 0;
        for tx in pending
            .into_iter()
            .filter(|tx| tx.kind == TransactionKind::Swap)
        {
            let Some(external_id) = tx.external_hash.as_deref() else {
                tracing::warn!(transaction_id = %tx.id, "pending swap has no external id");
                continue;
            };

            let report = match self
                .call_gateway(
                    "get_order_status",
                    self.gateway.get_order_status(external_id),
                )
                .await
            {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(transaction_id = %tx.id, error = %e, "failed to fetch swap status");
                    continue;
                }
            };

            let next = report.fine_status.coarse();
            if next == tx.status {
                continue;
            }

            match self
                .store
                .update_transaction(tx.id, TransactionUpdate::status(next))
                .await
            {
                Ok(true) => {
                    updated += 1;
                    tracing::info!(
                        transaction_id = %tx.id,
                        fine_status = %report.fine_status,
                        status = %next,
                        "swap status updated"
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(transaction_id = %tx.id, error = %e, "failed to update swap status");
                }
            }
        }

        Ok(updated)
    }

    /// 查询单笔兑换在服务商处的实时状态（不写库）
    pub async fn swap_status(&self, transaction_id: Uuid) -> AppResult<SwapStatusReport> {
        let tx = self
            .store
            .get_transaction_by_id(transaction_id)
            .await?
            .ok_or(AppError::TransactionNotFound(transaction_id))?;

        if tx.kind != TransactionKind::Swap {
            return Err(AppError::invalid_parameter(format!(
                "transaction {} is not a swap",
                transaction_id
            )));
        }
        let external_id = tx
            .external_hash
            .ok_or_else(|| AppError::invalid_parameter("swap has no external id"))?;

        let report = self
            .call_gateway(
                "get_order_status",
                self.gateway.get_order_status(&external_id),
            )
            .await?;

        Ok(SwapStatusReport {
            transaction_id,
            external_id,
            fine_status: report.fine_status,
            local_status: tx.status,
            payin_hash: report.payin_hash,
            payout_hash: report.payout_hash,
        })
    }
}

fn ensure_positive_amount(amount: &str) -> AppResult<()> {
    if parse_decimal("amount", amount)? <= Decimal::ZERO {
        return Err(AppError::invalid_parameter("amount must be positive"));
    }
    Ok(())
}
