//! 钱包存储抽象
//!
//! 内存实现与 Postgres 实现满足同一契约，启动时按配置选择并以 `Arc<dyn WalletStore>` 注入

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    NewTransaction, NewWallet, TransactionRecord, TransactionStatus, TransactionUpdate,
    WalletRecord, WalletUpdate,
};
use crate::error::AppResult;

/// 钱包与交易记录的持久化接口
///
/// 约定：
/// - `connect` 之前或 `disconnect` 之后的任何操作都返回 `StoreNotConnected`
/// - 删除钱包级联删除其全部交易
/// - 交易状态只能向前推进（pending → completed | failed）
/// - 列表按创建时间升序返回
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn connect(&self) -> AppResult<()>;

    async fn disconnect(&self) -> AppResult<()>;

    fn is_connected(&self) -> bool;

    /// 创建钱包（同一 owner 下地址唯一）
    async fn create_wallet(&self, owner_id: &str, wallet: NewWallet) -> AppResult<WalletRecord>;

    async fn get_wallet_by_id(&self, id: Uuid) -> AppResult<Option<WalletRecord>>;

    /// 按 owner 与地址查询
    async fn get_wallet(&self, owner_id: &str, address: &str) -> AppResult<Option<WalletRecord>>;

    async fn get_wallets_by_owner(&self, owner_id: &str) -> AppResult<Vec<WalletRecord>>;

    /// 按 EVM 链ID 过滤 owner 的钱包
    async fn get_wallets_by_evm_chain_id(
        &self,
        owner_id: &str,
        evm_chain_id: u64,
    ) -> AppResult<Vec<WalletRecord>>;

    /// 部分更新链元数据，钱包不存在返回 false
    async fn update_wallet(&self, id: Uuid, update: WalletUpdate) -> AppResult<bool>;

    /// 删除钱包并级联删除交易，钱包不存在返回 false
    async fn delete_wallet(&self, id: Uuid) -> AppResult<bool>;

    /// 写入交易，所属钱包必须存在
    async fn record_transaction(&self, tx: NewTransaction) -> AppResult<TransactionRecord>;

    async fn get_transaction_by_id(&self, id: Uuid) -> AppResult<Option<TransactionRecord>>;

    async fn get_transactions_by_wallet(&self, wallet_id: Uuid)
        -> AppResult<Vec<TransactionRecord>>;

    async fn get_transactions_by_owner(&self, owner_id: &str) -> AppResult<Vec<TransactionRecord>>;

    async fn get_transaction_by_external_hash(
        &self,
        external_hash: &str,
    ) -> AppResult<Option<TransactionRecord>>;

    async fn get_transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> AppResult<Vec<TransactionRecord>>;

    /// 部分更新交易，交易不存在或无变化返回 false
    async fn update_transaction(&self, id: Uuid, update: TransactionUpdate) -> AppResult<bool>;
}

/// 校验状态推进，供各实现复用
pub(crate) fn check_status_transition(
    current: TransactionStatus,
    update: &TransactionUpdate,
) -> AppResult<()> {
    if let Some(next) = update.status {
        if next != current && !current.can_transition_to(&next) {
            return Err(crate::error::AppError::invalid_parameter(format!(
                "illegal transaction status transition: {} -> {}",
                current, next
            )));
        }
    }
    Ok(())
}
