use std::sync::Arc;

use anyhow::Context;

use crate::{
    config::{Config, StoreBackend, StoreConfig},
    infrastructure::encryption::SecretCipher,
    repository::{InMemoryWalletStore, PgWalletStore, WalletStore},
    service::{
        changenow_client::ChangeNowClient,
        exchange_gateway::ExchangeGateway,
        reconciliation_worker::{ReconciliationWorker, WorkerHandle},
        swap_orchestrator::SwapOrchestrator,
        wallet_vault::WalletVault,
    },
};

/// 应用状态
/// 包含所有共享组件；存储与兑换服务商以 trait 对象注入
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn WalletStore>,
    pub gateway: Arc<dyn ExchangeGateway>,
    pub vault: Arc<WalletVault>,
    pub orchestrator: Arc<SwapOrchestrator>,
}

/// 按配置选择存储后端
pub fn build_store(config: &StoreConfig) -> Arc<dyn WalletStore> {
    match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryWalletStore::new()),
        StoreBackend::Postgres => Arc::new(PgWalletStore::new(config.clone())),
    }
}

impl AppState {
    /// 从配置创建并连接所有组件
    pub async fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        config.validate().context("invalid configuration")?;

        let store = build_store(&config.store);
        store
            .connect()
            .await
            .context("Failed to connect wallet store")?;

        let gateway: Arc<dyn ExchangeGateway> = Arc::new(
            ChangeNowClient::new(&config.gateway).context("Failed to build exchange client")?,
        );

        tracing::info!(
            backend = ?config.store.backend,
            kdf_iterations = config.kdf.iterations,
            "✅ Application state initialized"
        );

        Self::with_components(config, store, gateway)
    }

    /// 使用外部提供的存储与服务商组装（存储需已连接）
    pub fn with_components(
        config: Arc<Config>,
        store: Arc<dyn WalletStore>,
        gateway: Arc<dyn ExchangeGateway>,
    ) -> anyhow::Result<Self> {
        config
            .validate_runtime()
            .context("invalid runtime configuration")?;

        let vault = Arc::new(WalletVault::new(SecretCipher::new(config.kdf.params())));
        let orchestrator = Arc::new(SwapOrchestrator::new(
            store.clone(),
            gateway.clone(),
            config.gateway.timeout(),
        ));

        Ok(Self {
            config,
            store,
            gateway,
            vault,
            orchestrator,
        })
    }

    /// 按配置启动后台对账
    pub fn start_reconciliation(&self) -> anyhow::Result<Option<WorkerHandle>> {
        if !self.config.reconciliation.enabled {
            tracing::info!("Swap reconciliation worker disabled");
            return Ok(None);
        }

        let worker = ReconciliationWorker::new(
            self.orchestrator.clone(),
            std::time::Duration::from_secs(self.config.reconciliation.interval_secs),
        )
        .context("Failed to start reconciliation worker")?;
        Ok(Some(worker.spawn()))
    }

    /// 断开存储连接
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.store
            .disconnect()
            .await
            .context("Failed to disconnect wallet store")?;
        Ok(())
    }
}
