//! 测试辅助模块
//! 提供内存存储、可编排的兑换服务商 mock 和常用构造函数

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use ironvault::domain::{
    ChainKind, ChainOptions, NewTransaction, NewWallet, SwapStatus, TransactionRecord,
    TransactionStatus, TransactionUpdate, WalletRecord, WalletUpdate,
};
use ironvault::error::{AppError, AppResult};
use ironvault::infrastructure::encryption::SecretCipher;
use ironvault::infrastructure::pbkdf2::KdfParams;
use ironvault::repository::{InMemoryWalletStore, WalletStore};
use ironvault::service::{
    CreateSwapRequest, CreatedOrder, ExchangeGateway, OrderRequest, OrderStatusReport, RateQuote,
    RateRequest, SwapOrchestrator, WalletVault,
};

pub const PASSWORD: &str = "correct horse battery staple";
pub const OWNER: &str = "user-1";

/// 测试数据库URL
pub fn test_database_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost:5432/ironvault_test".into())
}

/// 测试用低迭代次数
pub fn test_kdf() -> KdfParams {
    KdfParams { iterations: 1_000 }
}

pub fn test_vault() -> WalletVault {
    WalletVault::new(SecretCipher::new(test_kdf()))
}

pub async fn connected_memory_store() -> Arc<InMemoryWalletStore> {
    let store = Arc::new(InMemoryWalletStore::new());
    store.connect().await.unwrap();
    store
}

pub async fn create_wallet(
    store: &dyn WalletStore,
    kind: ChainKind,
    options: ChainOptions,
) -> WalletRecord {
    test_vault()
        .create_and_store_wallet(store, OWNER, kind, PASSWORD, &options)
        .await
        .unwrap()
}

pub fn swap_request(wallet_id: Uuid) -> CreateSwapRequest {
    CreateSwapRequest {
        wallet_id,
        from_currency: "usdt".into(),
        to_currency: "usdt".into(),
        amount: "250.000001".into(),
        destination_address: "0x742d35cc6634c0532925a3b844bc9e7595f0beb6".into(),
        refund_address: "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".into(),
        from_evm_chain_id: Some(1),
        to_evm_chain_id: Some(137),
    }
}

pub fn orchestrator(
    store: Arc<dyn WalletStore>,
    gateway: Arc<MockGateway>,
) -> SwapOrchestrator {
    SwapOrchestrator::new(store, gateway, Duration::from_secs(2))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 兑换服务商 mock
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 可编排的服务商：订单号自增，状态按订单号设置
#[derive(Default)]
pub struct MockGateway {
    next_order: AtomicUsize,
    statuses: Mutex<HashMap<String, SwapStatus>>,
    failing_ids: Mutex<HashSet<String>>,
    pub fail_quotes: AtomicBool,
    pub fail_orders: AtomicBool,
    /// 覆盖报价中的服务费
    pub quote_fee: Mutex<Option<String>>,
    /// 状态查询延迟（用于超时与并发测试）
    pub status_delay: Mutex<Option<Duration>>,
    pub order_requests: Mutex<Vec<OrderRequest>>,
    pub status_calls: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, external_id: &str, status: SwapStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(external_id.to_string(), status);
    }

    pub fn fail_status_for(&self, external_id: &str) {
        self.failing_ids
            .lock()
            .unwrap()
            .insert(external_id.to_string());
    }

    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn get_rate(&self, request: &RateRequest) -> AppResult<RateQuote> {
        if self.fail_quotes.load(Ordering::SeqCst) {
            return Err(AppError::gateway("quote service unavailable"));
        }
        Ok(RateQuote {
            estimated_amount: request.amount.clone(),
            rate: "1".into(),
            fee: self
                .quote_fee
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| "0.5".into()),
            network_fee: "1.25".into(),
        })
    }

    async fn create_order(&self, request: &OrderRequest) -> AppResult<CreatedOrder> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(AppError::gateway("HTTP 503"));
        }
        let n = self.next_order.fetch_add(1, Ordering::SeqCst) + 1;
        let external_id = format!("order-{}", n);
        self.set_status(&external_id, SwapStatus::Waiting);
        self.order_requests.lock().unwrap().push(request.clone());
        Ok(CreatedOrder {
            external_id,
            deposit_address: "0xdeposit".into(),
            expected_amount_out: request.pair.amount.clone(),
        })
    }

    async fn get_order_status(&self, external_id: &str) -> AppResult<OrderStatusReport> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.status_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_ids.lock().unwrap().contains(external_id) {
            return Err(AppError::gateway("lookup failed"));
        }
        let status = self
            .statuses
            .lock()
            .unwrap()
            .get(external_id)
            .copied()
            .ok_or_else(|| AppError::gateway("unknown order"))?;
        Ok(OrderStatusReport {
            fine_status: status,
            payin_hash: Some(format!("{}-payin", external_id)),
            payout_hash: None,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 写交易可失败的存储
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 包装内存存储，可让 `record_transaction` 失败
pub struct FlakyStore {
    pub inner: InMemoryWalletStore,
    pub fail_records: AtomicBool,
}

impl FlakyStore {
    pub async fn connected() -> Arc<Self> {
        let store = Arc::new(Self {
            inner: InMemoryWalletStore::new(),
            fail_records: AtomicBool::new(false),
        });
        store.connect().await.unwrap();
        store
    }
}

#[async_trait]
impl WalletStore for FlakyStore {
    async fn connect(&self) -> AppResult<()> {
        self.inner.connect().await
    }

    async fn disconnect(&self) -> AppResult<()> {
        self.inner.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn create_wallet(&self, owner_id: &str, wallet: NewWallet) -> AppResult<WalletRecord> {
        self.inner.create_wallet(owner_id, wallet).await
    }

    async fn get_wallet_by_id(&self, id: Uuid) -> AppResult<Option<WalletRecord>> {
        self.inner.get_wallet_by_id(id).await
    }

    async fn get_wallet(&self, owner_id: &str, address: &str) -> AppResult<Option<WalletRecord>> {
        self.inner.get_wallet(owner_id, address).await
    }

    async fn get_wallets_by_owner(&self, owner_id: &str) -> AppResult<Vec<WalletRecord>> {
        self.inner.get_wallets_by_owner(owner_id).await
    }

    async fn get_wallets_by_evm_chain_id(
        &self,
        owner_id: &str,
        evm_chain_id: u64,
    ) -> AppResult<Vec<WalletRecord>> {
        self.inner
            .get_wallets_by_evm_chain_id(owner_id, evm_chain_id)
            .await
    }

    async fn update_wallet(&self, id: Uuid, update: WalletUpdate) -> AppResult<bool> {
        self.inner.update_wallet(id, update).await
    }

    async fn delete_wallet(&self, id: Uuid) -> AppResult<bool> {
        self.inner.delete_wallet(id).await
    }

    async fn record_transaction(&self, tx: NewTransaction) -> AppResult<TransactionRecord> {
        if self.fail_records.load(Ordering::SeqCst) {
            return Err(AppError::Database("connection reset".into()));
        }
        self.inner.record_transaction(tx).await
    }

    async fn get_transaction_by_id(&self, id: Uuid) -> AppResult<Option<TransactionRecord>> {
        self.inner.get_transaction_by_id(id).await
    }

    async fn get_transactions_by_wallet(
        &self,
        wallet_id: Uuid,
    ) -> AppResult<Vec<TransactionRecord>> {
        self.inner.get_transactions_by_wallet(wallet_id).await
    }

    async fn get_transactions_by_owner(&self, owner_id: &str) -> AppResult<Vec<TransactionRecord>> {
        self.inner.get_transactions_by_owner(owner_id).await
    }

    async fn get_transaction_by_external_hash(
        &self,
        external_hash: &str,
    ) -> AppResult<Option<TransactionRecord>> {
        self.inner.get_transaction_by_external_hash(external_hash).await
    }

    async fn get_transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> AppResult<Vec<TransactionRecord>> {
        self.inner.get_transactions_by_status(status).await
    }

    async fn update_transaction(&self, id: Uuid, update: TransactionUpdate) -> AppResult<bool> {
        self.inner.update_transaction(id, update).await
    }
}
