//! 内存钱包存储
//!
//! 钱包与交易放在同一把 `RwLock` 下，级联删除是原子的

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    NewTransaction, NewWallet, TransactionRecord, TransactionStatus, TransactionUpdate,
    WalletRecord, WalletUpdate,
};
use crate::error::{AppError, AppResult};
use crate::repository::wallet_store::{check_status_transition, WalletStore};

#[derive(Default)]
struct MemoryState {
    wallets: HashMap<Uuid, WalletRecord>,
    transactions: HashMap<Uuid, TransactionRecord>,
}

impl MemoryState {
    /// (owner, address) 是否已被其它钱包占用
    fn address_taken(&self, owner_id: &str, address: &str, except: Option<Uuid>) -> bool {
        self.wallets.values().any(|w| {
            Some(w.id) != except && w.owner_id == owner_id && w.public_address == address
        })
    }

    fn owner_wallet_ids(&self, owner_id: &str) -> Vec<Uuid> {
        self.wallets
            .values()
            .filter(|w| w.owner_id == owner_id)
            .map(|w| w.id)
            .collect()
    }
}

/// 内存实现（测试与本地开发）
#[derive(Default)]
pub struct InMemoryWalletStore {
    connected: AtomicBool,
    state: RwLock<MemoryState>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_connected(&self) -> AppResult<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(AppError::StoreNotConnected)
        }
    }
}

fn sorted_wallets(mut wallets: Vec<WalletRecord>) -> Vec<WalletRecord> {
    wallets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    wallets
}

fn sorted_transactions(mut txs: Vec<TransactionRecord>) -> Vec<TransactionRecord> {
    txs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    txs
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn connect(&self) -> AppResult<()> {
        self.connected.store(true, Ordering::Release);
        tracing::debug!("in-memory wallet store connected");
        Ok(())
    }

    async fn disconnect(&self) -> AppResult<()> {
        self.connected.store(false, Ordering::Release);
        tracing::debug!("in-memory wallet store disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn create_wallet(&self, owner_id: &str, wallet: NewWallet) -> AppResult<WalletRecord> {
        self.ensure_connected()?;
        wallet.validate()?;
        let mut state = self.state.write().await;

        if state.address_taken(owner_id, &wallet.public_address, None) {
            return Err(AppError::invalid_parameter(
                "wallet address already registered for owner",
            ));
        }

        let record = wallet.into_record(owner_id);
        state.wallets.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_wallet_by_id(&self, id: Uuid) -> AppResult<Option<WalletRecord>> {
        self.ensure_connected()?;
        Ok(self.state.read().await.wallets.get(&id).cloned())
    }

    async fn get_wallet(&self, owner_id: &str, address: &str) -> AppResult<Option<WalletRecord>> {
        self.ensure_connected()?;
        let state = self.state.read().await;
        Ok(state
            .wallets
            .values()
            .find(|w| w.owner_id == owner_id && w.public_address == address)
            .cloned())
    }

    async fn get_wallets_by_owner(&self, owner_id: &str) -> AppResult<Vec<WalletRecord>> {
        self.ensure_connected()?;
        let state = self.state.read().await;
        Ok(sorted_wallets(
            state
                .wallets
                .values()
                .filter(|w| w.owner_id == owner_id)
                .cloned()
                .collect(),
        ))
    }

    async fn get_wallets_by_evm_chain_id(
        &self,
        owner_id: &str,
        evm_chain_id: u64,
    ) -> AppResult<Vec<WalletRecord>> {
        self.ensure_connected()?;
        let state = self.state.read().await;
        Ok(sorted_wallets(
            state
                .wallets
                .values()
                .filter(|w| w.owner_id == owner_id && w.evm_chain_id == Some(evm_chain_id))
                .cloned()
                .collect(),
        ))
    }

    async fn update_wallet(&self, id: Uuid, update: WalletUpdate) -> AppResult<bool> {
        self.ensure_connected()?;
        let mut state = self.state.write().await;
        let Some(wallet) = state.wallets.get(&id) else {
            return Ok(false);
        };
        update.validate_for(wallet.chain_kind)?;
        if let Some(address) = &update.public_address {
            if state.address_taken(&wallet.owner_id, address, Some(id)) {
                return Err(AppError::invalid_parameter(
                    "wallet address already registered for owner",
                ));
            }
        }

        match state.wallets.get_mut(&id) {
            Some(wallet) => Ok(wallet.apply(update)),
            None => Ok(false),
        }
    }

    async fn delete_wallet(&self, id: Uuid) -> AppResult<bool> {
        self.ensure_connected()?;
        let mut state = self.state.write().await;
        if state.wallets.remove(&id).is_none() {
            return Ok(false);
        }

        let before = state.transactions.len();
        state.transactions.retain(|_, tx| tx.wallet_id != id);
        tracing::debug!(
            wallet_id = %id,
            cascaded = before - state.transactions.len(),
            "wallet deleted"
        );
        Ok(true)
    }

    async fn record_transaction(&self, tx: NewTransaction) -> AppResult<TransactionRecord> {
        self.ensure_connected()?;
        tx.validate()?;
        let mut state = self.state.write().await;
        if !state.wallets.contains_key(&tx.wallet_id) {
            return Err(AppError::WalletNotFound(tx.wallet_id));
        }

        let record = tx.into_record();
        state.transactions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_transaction_by_id(&self, id: Uuid) -> AppResult<Option<TransactionRecord>> {
        self.ensure_connected()?;
        Ok(self.state.read().await.transactions.get(&id).cloned())
    }

    async fn get_transactions_by_wallet(
        &self,
        wallet_id: Uuid,
    ) -> AppResult<Vec<TransactionRecord>> {
        self.ensure_connected()?;
        let state = self.state.read().await;
        Ok(sorted_transactions(
            state
                .transactions
                .values()
                .filter(|tx| tx.wallet_id == wallet_id)
                .cloned()
                .collect(),
        ))
    }

    async fn get_transactions_by_owner(&self, owner_id: &str) -> AppResult<Vec<TransactionRecord>> {
        self.ensure_connected()?;
        let state = self.state.read().await;
        let wallet_ids = state.owner_wallet_ids(owner_id);
        Ok(sorted_transactions(
            state
                .transactions
                .values()
                .filter(|tx| wallet_ids.contains(&tx.wallet_id))
                .cloned()
                .collect(),
        ))
    }

    async fn get_transaction_by_external_hash(
        &self,
        external_hash: &str,
    ) -> AppResult<Option<TransactionRecord>> {
        self.ensure_connected()?;
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .find(|tx| tx.external_hash.as_deref() == Some(external_hash))
            .cloned())
    }

    async fn get_transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> AppResult<Vec<TransactionRecord>> {
        self.ensure_connected()?;
        let state = self.state.read().await;
        Ok(sorted_transactions(
            state
                .transactions
                .values()
                .filter(|tx| tx.status == status)
                .cloned()
                .collect(),
        ))
    }

    async fn update_transaction(&self, id: Uuid, update: TransactionUpdate) -> AppResult<bool> {
        self.ensure_connected()?;
        update.validate()?;
        let mut state = self.state.write().await;
        let Some(tx) = state.transactions.get_mut(&id) else {
            return Ok(false);
        };
        check_status_transition(tx.status, &update)?;
        Ok(tx.apply(update))
    }
}
