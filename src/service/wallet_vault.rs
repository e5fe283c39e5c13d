//! 钱包保险库
//!
//! 组合密钥生成与私钥加密：明文私钥只在本模块内短暂存在，离开时已加密或已清零

use zeroize::Zeroizing;

use crate::domain::{
    ChainKeyProvider, ChainKind, ChainOptions, NewWallet, WalletRecord, DEFAULT_EVM_CHAIN_ID,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::encryption::{EncryptedSecret, SecretCipher};
use crate::infrastructure::log_redact::redact_address;
use crate::repository::WalletStore;
use crate::utils::AddressValidator;

pub struct WalletVault {
    cipher: SecretCipher,
}

impl WalletVault {
    pub fn new(cipher: SecretCipher) -> Self {
        Self { cipher }
    }

    pub fn cipher(&self) -> &SecretCipher {
        &self.cipher
    }

    /// 生成新密钥并加密，返回待持久化的钱包字段
    pub fn create_encrypted_wallet(
        &self,
        chain_kind: ChainKind,
        password: &str,
        options: &ChainOptions,
    ) -> AppResult<NewWallet> {
        ensure_password(password)?;

        let provider = ChainKeyProvider::for_chain(chain_kind, options)?;
        let generated = provider.generate()?;
        let encrypted_secret = self.cipher.encrypt(generated.secret.as_bytes(), password)?;

        tracing::info!(
            chain = %chain_kind,
            address = %redact_address(&generated.public_address),
            "wallet key generated"
        );

        Ok(NewWallet {
            chain_kind,
            public_address: generated.public_address.clone(),
            encrypted_secret,
            network: generated.network,
            evm_chain_id: generated.evm_chain_id,
        })
    }

    /// 解密钱包私钥
    ///
    /// 解密后重新推导地址并与记录比对，不一致视为记录损坏
    pub fn decrypt_wallet(
        &self,
        record: &WalletRecord,
        password: &str,
    ) -> AppResult<Zeroizing<String>> {
        let secret = self
            .cipher
            .decrypt_string(&record.encrypted_secret, password)?;

        if record.chain_kind == ChainKind::Tron
            && !AddressValidator::validate_tron_address(&record.public_address)
        {
            tracing::error!(wallet_id = %record.id, "stored tron address failed validation");
            return Err(AppError::CorruptRecord(
                "stored tron address has an invalid format".into(),
            ));
        }

        let derived = provider_for_record(record).address_from_secret(&secret)?;
        if !same_address(record.chain_kind, &derived, &record.public_address) {
            tracing::error!(
                wallet_id = %record.id,
                chain = %record.chain_kind,
                "decrypted secret does not match stored address"
            );
            return Err(AppError::CorruptRecord(
                "public address does not match decrypted secret".into(),
            ));
        }

        Ok(secret)
    }

    /// 生成、加密并写入存储
    pub async fn create_and_store_wallet(
        &self,
        store: &dyn WalletStore,
        owner_id: &str,
        chain_kind: ChainKind,
        password: &str,
        options: &ChainOptions,
    ) -> AppResult<WalletRecord> {
        let wallet = self.create_encrypted_wallet(chain_kind, password, options)?;
        let record = store.create_wallet(owner_id, wallet).await?;
        tracing::info!(wallet_id = %record.id, chain = %chain_kind, "wallet stored");
        Ok(record)
    }

    /// 用新密码重新加密（新的盐值与 IV），由调用方通过 `update_wallet` 持久化
    pub fn change_password(
        &self,
        record: &WalletRecord,
        old_password: &str,
        new_password: &str,
    ) -> AppResult<EncryptedSecret> {
        ensure_password(new_password)?;
        let secret = self.decrypt_wallet(record, old_password)?;
        self.cipher.encrypt(secret.as_bytes(), new_password)
    }
}

fn ensure_password(password: &str) -> AppResult<()> {
    if password.is_empty() {
        return Err(AppError::invalid_parameter("password must not be empty"));
    }
    Ok(())
}

/// 按记录上的元数据重建生成器，缺省值与生成时一致
fn provider_for_record(record: &WalletRecord) -> ChainKeyProvider {
    match record.chain_kind {
        ChainKind::Ethereum => ChainKeyProvider::Ethereum {
            evm_chain_id: record.evm_chain_id.unwrap_or(DEFAULT_EVM_CHAIN_ID),
        },
        ChainKind::Bitcoin => ChainKeyProvider::Bitcoin {
            network: record.network.unwrap_or_default(),
        },
        ChainKind::Solana => ChainKeyProvider::Solana,
        ChainKind::Tron => ChainKeyProvider::Tron,
    }
}

/// EVM 地址大小写不敏感，其它链严格比较
fn same_address(kind: ChainKind, derived: &str, stored: &str) -> bool {
    match kind {
        ChainKind::Ethereum => derived.eq_ignore_ascii_case(stored),
        _ => derived == stored,
    }
}
