//! Postgres 钱包存储
//!
//! 加密私钥按字段拆开存储（密文 / 盐值 / IV / 版本 / 迭代次数），
//! 金额与手续费以 TEXT 保存，链ID以 BIGINT 保存

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::domain::{
    BitcoinNetwork, ChainKind, NewTransaction, NewWallet, TransactionKind, TransactionRecord,
    TransactionStatus, TransactionUpdate, WalletRecord, WalletUpdate,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::db::{init_pool, PgPool};
use crate::infrastructure::encryption::{CipherVersion, EncryptedSecret};
use crate::repository::wallet_store::{check_status_transition, WalletStore};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS wallets (
        id UUID PRIMARY KEY,
        owner_id TEXT NOT NULL,
        chain_kind TEXT NOT NULL,
        public_address TEXT NOT NULL,
        secret_ciphertext BYTEA NOT NULL,
        secret_salt BYTEA NOT NULL,
        secret_iv BYTEA NOT NULL,
        cipher_version SMALLINT NOT NULL,
        kdf_iterations BIGINT NOT NULL,
        network TEXT,
        evm_chain_id BIGINT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        UNIQUE (owner_id, public_address)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_wallets_owner_evm ON wallets (owner_id, evm_chain_id)",
    r#"CREATE TABLE IF NOT EXISTS wallet_transactions (
        id UUID PRIMARY KEY,
        wallet_id UUID NOT NULL REFERENCES wallets(id) ON DELETE CASCADE,
        kind TEXT NOT NULL,
        from_address TEXT NOT NULL,
        to_address TEXT NOT NULL,
        amount TEXT NOT NULL,
        currency_symbol TEXT NOT NULL,
        fee TEXT NOT NULL,
        status TEXT NOT NULL,
        external_hash TEXT,
        evm_chain_id BIGINT,
        source_evm_chain_id BIGINT,
        destination_evm_chain_id BIGINT,
        created_at TIMESTAMPTZ NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_wallet_tx_wallet ON wallet_transactions (wallet_id)",
    "CREATE INDEX IF NOT EXISTS idx_wallet_tx_status ON wallet_transactions (status)",
    "CREATE INDEX IF NOT EXISTS idx_wallet_tx_external ON wallet_transactions (external_hash)",
];

const WALLET_COLUMNS: &str = "id, owner_id, chain_kind, public_address, secret_ciphertext, \
    secret_salt, secret_iv, cipher_version, kdf_iterations, network, evm_chain_id, \
    created_at, updated_at";

const TX_COLUMNS: &str = "t.id, t.wallet_id, t.kind, t.from_address, t.to_address, t.amount, \
    t.currency_symbol, t.fee, t.status, t.external_hash, t.evm_chain_id, \
    t.source_evm_chain_id, t.destination_evm_chain_id, t.created_at";

#[derive(sqlx::FromRow)]
struct WalletRow {
    id: Uuid,
    owner_id: String,
    chain_kind: String,
    public_address: String,
    secret_ciphertext: Vec<u8>,
    secret_salt: Vec<u8>,
    secret_iv: Vec<u8>,
    cipher_version: i16,
    kdf_iterations: i64,
    network: Option<String>,
    evm_chain_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WalletRow> for WalletRecord {
    type Error = AppError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        let chain_kind: ChainKind = row
            .chain_kind
            .parse()
            .map_err(|_| AppError::CorruptRecord(format!("unknown chain kind: {}", row.chain_kind)))?;
        let network = row
            .network
            .as_deref()
            .map(str::parse::<BitcoinNetwork>)
            .transpose()
            .map_err(|_| AppError::CorruptRecord("unknown bitcoin network".into()))?;
        let kdf_iterations = u32::try_from(row.kdf_iterations)
            .map_err(|_| AppError::CorruptRecord("kdf iterations out of range".into()))?;

        Ok(WalletRecord {
            id: row.id,
            owner_id: row.owner_id,
            chain_kind,
            public_address: row.public_address,
            encrypted_secret: EncryptedSecret {
                version: CipherVersion::from_i16(row.cipher_version)?,
                kdf_iterations,
                ciphertext: row.secret_ciphertext,
                salt: row.secret_salt,
                iv: row.secret_iv,
            },
            network,
            evm_chain_id: from_db_chain_id(row.evm_chain_id)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    wallet_id: Uuid,
    kind: String,
    from_address: String,
    to_address: String,
    amount: String,
    currency_symbol: String,
    fee: String,
    status: String,
    external_hash: Option<String>,
    evm_chain_id: Option<i64>,
    source_evm_chain_id: Option<i64>,
    destination_evm_chain_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(TransactionRecord {
            id: row.id,
            wallet_id: row.wallet_id,
            kind: row.kind.parse::<TransactionKind>()?,
            from_address: row.from_address,
            to_address: row.to_address,
            amount: row.amount,
            currency_symbol: row.currency_symbol,
            fee: row.fee,
            status: row.status.parse::<TransactionStatus>()?,
            external_hash: row.external_hash,
            evm_chain_id: from_db_chain_id(row.evm_chain_id)?,
            source_evm_chain_id: from_db_chain_id(row.source_evm_chain_id)?,
            destination_evm_chain_id: from_db_chain_id(row.destination_evm_chain_id)?,
            timestamp: row.created_at,
        })
    }
}

fn to_db_chain_id(id: Option<u64>) -> AppResult<Option<i64>> {
    id.map(i64::try_from)
        .transpose()
        .map_err(|_| AppError::invalid_parameter("evm chain id out of range"))
}

fn from_db_chain_id(id: Option<i64>) -> AppResult<Option<u64>> {
    id.map(u64::try_from)
        .transpose()
        .map_err(|_| AppError::CorruptRecord("negative evm chain id".into()))
}

fn db_error_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// (owner_id, public_address) 唯一约束冲突
fn map_unique_violation(err: sqlx::Error) -> AppError {
    match db_error_code(&err).as_deref() {
        // unique_violation
        Some("23505") => AppError::invalid_parameter("wallet address already registered for owner"),
        _ => AppError::from(err),
    }
}

/// Postgres 实现
pub struct PgWalletStore {
    config: StoreConfig,
    pool: RwLock<Option<PgPool>>,
}

impl PgWalletStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    /// 建表（幂等）
    pub async fn ensure_schema(pool: &PgPool) -> AppResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }

    async fn pool(&self) -> AppResult<PgPool> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or(AppError::StoreNotConnected)
    }
}

#[async_trait]
impl WalletStore for PgWalletStore {
    async fn connect(&self) -> AppResult<()> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let pool = init_pool(&self.config).await?;
        Self::ensure_schema(&pool).await?;
        *guard = Some(pool);
        tracing::info!("✅ Postgres wallet store connected");
        Ok(())
    }

    async fn disconnect(&self) -> AppResult<()> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
            tracing::info!("Postgres wallet store disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool
            .try_read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    async fn create_wallet(&self, owner_id: &str, wallet: NewWallet) -> AppResult<WalletRecord> {
        let pool = self.pool().await?;
        wallet.validate()?;
        let record = wallet.into_record(owner_id);
        let secret = &record.encrypted_secret;

        sqlx::query(
            "INSERT INTO wallets (id, owner_id, chain_kind, public_address, secret_ciphertext,
                secret_salt, secret_iv, cipher_version, kdf_iterations, network, evm_chain_id,
                created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(record.id)
        .bind(&record.owner_id)
        .bind(record.chain_kind.as_str())
        .bind(&record.public_address)
        .bind(&secret.ciphertext)
        .bind(&secret.salt)
        .bind(&secret.iv)
        .bind(secret.version.as_i16())
        .bind(i64::from(secret.kdf_iterations))
        .bind(record.network.map(|n| n.as_str()))
        .bind(to_db_chain_id(record.evm_chain_id)?)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&pool)
        .await
        .map_err(map_unique_violation)?;

        Ok(record)
    }

    async fn get_wallet_by_id(&self, id: Uuid) -> AppResult<Option<WalletRecord>> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE id = $1",
            WALLET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&pool)
        .await?;

        row.map(WalletRecord::try_from).transpose()
    }

    async fn get_wallet(&self, owner_id: &str, address: &str) -> AppResult<Option<WalletRecord>> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE owner_id = $1 AND public_address = $2",
            WALLET_COLUMNS
        ))
        .bind(owner_id)
        .bind(address)
        .fetch_optional(&pool)
        .await?;

        row.map(WalletRecord::try_from).transpose()
    }

    async fn get_wallets_by_owner(&self, owner_id: &str) -> AppResult<Vec<WalletRecord>> {
        let pool = self.pool().await?;
        let rows = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE owner_id = $1 ORDER BY created_at, id",
            WALLET_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&pool)
        .await?;

        rows.into_iter().map(WalletRecord::try_from).collect()
    }

    async fn get_wallets_by_evm_chain_id(
        &self,
        owner_id: &str,
        evm_chain_id: u64,
    ) -> AppResult<Vec<WalletRecord>> {
        let pool = self.pool().await?;
        let rows = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE owner_id = $1 AND evm_chain_id = $2
             ORDER BY created_at, id",
            WALLET_COLUMNS
        ))
        .bind(owner_id)
        .bind(to_db_chain_id(Some(evm_chain_id))?)
        .fetch_all(&pool)
        .await?;

        rows.into_iter().map(WalletRecord::try_from).collect()
    }

    async fn update_wallet(&self, id: Uuid, update: WalletUpdate) -> AppResult<bool> {
        let pool = self.pool().await?;
        if update.is_empty() {
            return Ok(false);
        }

        // chain_kind 创建后不可变，先读出再校验元数据
        let chain_kind: Option<String> =
            sqlx::query_scalar("SELECT chain_kind FROM wallets WHERE id = $1")
                .bind(id)
                .fetch_optional(&pool)
                .await?;
        let Some(chain_kind) = chain_kind else {
            return Ok(false);
        };
        let chain_kind: ChainKind = chain_kind
            .parse()
            .map_err(|_| AppError::CorruptRecord(format!("unknown chain kind: {}", chain_kind)))?;
        update.validate_for(chain_kind)?;

        let secret = update.encrypted_secret.as_ref();
        let result = sqlx::query(
            "UPDATE wallets SET
                public_address = COALESCE($2, public_address),
                secret_ciphertext = COALESCE($3, secret_ciphertext),
                secret_salt = COALESCE($4, secret_salt),
                secret_iv = COALESCE($5, secret_iv),
                cipher_version = COALESCE($6, cipher_version),
                kdf_iterations = COALESCE($7, kdf_iterations),
                network = COALESCE($8, network),
                evm_chain_id = COALESCE($9, evm_chain_id),
                updated_at = $10
             WHERE id = $1",
        )
        .bind(id)
        .bind(update.public_address.as_deref())
        .bind(secret.map(|s| s.ciphertext.clone()))
        .bind(secret.map(|s| s.salt.clone()))
        .bind(secret.map(|s| s.iv.clone()))
        .bind(secret.map(|s| s.version.as_i16()))
        .bind(secret.map(|s| i64::from(s.kdf_iterations)))
        .bind(update.network.map(|n| n.as_str()))
        .bind(to_db_chain_id(update.evm_chain_id)?)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .map_err(map_unique_violation)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_wallet(&self, id: Uuid) -> AppResult<bool> {
        let pool = self.pool().await?;
        // wallet_transactions 通过 ON DELETE CASCADE 一并删除
        let result = sqlx::query("DELETE FROM wallets WHERE id = $1")
            .bind(id)
            .execute(&pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_transaction(&self, tx: NewTransaction) -> AppResult<TransactionRecord> {
        let pool = self.pool().await?;
        tx.validate()?;
        let record = tx.into_record();

        sqlx::query(
            "INSERT INTO wallet_transactions (id, wallet_id, kind, from_address, to_address,
                amount, currency_symbol, fee, status, external_hash, evm_chain_id,
                source_evm_chain_id, destination_evm_chain_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(record.id)
        .bind(record.wallet_id)
        .bind(record.kind.as_str())
        .bind(&record.from_address)
        .bind(&record.to_address)
        .bind(&record.amount)
        .bind(&record.currency_symbol)
        .bind(&record.fee)
        .bind(record.status.to_db_string())
        .bind(record.external_hash.as_deref())
        .bind(to_db_chain_id(record.evm_chain_id)?)
        .bind(to_db_chain_id(record.source_evm_chain_id)?)
        .bind(to_db_chain_id(record.destination_evm_chain_id)?)
        .bind(record.timestamp)
        .execute(&pool)
        .await
        .map_err(|e| match db_error_code(&e).as_deref() {
            // foreign_key_violation：所属钱包不存在
            Some("23503") => AppError::WalletNotFound(record.wallet_id),
            _ => AppError::from(e),
        })?;

        Ok(record)
    }

    async fn get_transaction_by_id(&self, id: Uuid) -> AppResult<Option<TransactionRecord>> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM wallet_transactions t WHERE t.id = $1",
            TX_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&pool)
        .await?;

        row.map(TransactionRecord::try_from).transpose()
    }

    async fn get_transactions_by_wallet(
        &self,
        wallet_id: Uuid,
    ) -> AppResult<Vec<TransactionRecord>> {
        let pool = self.pool().await?;
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM wallet_transactions t WHERE t.wallet_id = $1
             ORDER BY t.created_at, t.id",
            TX_COLUMNS
        ))
        .bind(wallet_id)
        .fetch_all(&pool)
        .await?;

        rows.into_iter().map(TransactionRecord::try_from).collect()
    }

    async fn get_transactions_by_owner(&self, owner_id: &str) -> AppResult<Vec<TransactionRecord>> {
        let pool = self.pool().await?;
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM wallet_transactions t
             JOIN wallets w ON w.id = t.wallet_id
             WHERE w.owner_id = $1
             ORDER BY t.created_at, t.id",
            TX_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&pool)
        .await?;

        rows.into_iter().map(TransactionRecord::try_from).collect()
    }

    async fn get_transaction_by_external_hash(
        &self,
        external_hash: &str,
    ) -> AppResult<Option<TransactionRecord>> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM wallet_transactions t WHERE t.external_hash = $1
             ORDER BY t.created_at LIMIT 1",
            TX_COLUMNS
        ))
        .bind(external_hash)
        .fetch_optional(&pool)
        .await?;

        row.map(TransactionRecord::try_from).transpose()
    }

    async fn get_transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> AppResult<Vec<TransactionRecord>> {
        let pool = self.pool().await?;
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM wallet_transactions t WHERE t.status = $1
             ORDER BY t.created_at, t.id",
            TX_COLUMNS
        ))
        .bind(status.to_db_string())
        .fetch_all(&pool)
        .await?;

        rows.into_iter().map(TransactionRecord::try_from).collect()
    }

    async fn update_transaction(&self, id: Uuid, update: TransactionUpdate) -> AppResult<bool> {
        let pool = self.pool().await?;
        update.validate()?;
        let mut db_tx = pool.begin().await?;

        // 行锁保证状态校验与写入之间不被并发修改
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM wallet_transactions t WHERE t.id = $1 FOR UPDATE",
            TX_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *db_tx)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };
        let mut record = TransactionRecord::try_from(row)?;
        check_status_transition(record.status, &update)?;
        if !record.apply(update) {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE wallet_transactions SET status = $2, external_hash = $3, fee = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(record.status.to_db_string())
        .bind(record.external_hash.as_deref())
        .bind(&record.fee)
        .execute(&mut *db_tx)
        .await?;

        db_tx.commit().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet_row() -> WalletRow {
        let now = Utc::now();
        WalletRow {
            id: Uuid::new_v4(),
            owner_id: "alice".into(),
            chain_kind: "bitcoin".into(),
            public_address: "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa".into(),
            secret_ciphertext: vec![9; 48],
            secret_salt: vec![1; 16],
            secret_iv: vec![2; 16],
            cipher_version: 1,
            kdf_iterations: 100_000,
            network: Some("testnet".into()),
            evm_chain_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_wallet_row_conversion() {
        let record = WalletRecord::try_from(wallet_row()).unwrap();
        assert_eq!(record.chain_kind, ChainKind::Bitcoin);
        assert_eq!(record.network, Some(BitcoinNetwork::Testnet));
        assert_eq!(record.encrypted_secret.kdf_iterations, 100_000);
        assert_eq!(record.encrypted_secret.version, CipherVersion::V1);
    }

    #[test]
    fn test_corrupt_rows_are_rejected() {
        let mut row = wallet_row();
        row.cipher_version = 9;
        assert!(matches!(
            WalletRecord::try_from(row),
            Err(AppError::CorruptRecord(_))
        ));

        let mut row = wallet_row();
        row.evm_chain_id = Some(-1);
        assert!(WalletRecord::try_from(row).is_err());
    }

    #[test]
    fn test_chain_id_range() {
        assert_eq!(to_db_chain_id(Some(137)).unwrap(), Some(137));
        assert!(to_db_chain_id(Some(u64::MAX)).is_err());
        assert_eq!(from_db_chain_id(None).unwrap(), None);
    }

    #[tokio::test]
    async fn test_operations_before_connect() {
        let store = PgWalletStore::new(StoreConfig::default());
        assert!(!store.is_connected());
        assert!(matches!(
            store.get_wallet_by_id(Uuid::new_v4()).await,
            Err(AppError::StoreNotConnected)
        ));
        // 未连接时断开是空操作
        store.disconnect().await.unwrap();
    }
}
