//! 多链密钥生成
//!
//! 每条链一个生成函数，统一返回（地址，私钥文本，链元数据）。
//! 私钥文本只在内存中短暂存在，交给 `SecretCipher` 加密后即被清零。

use std::fmt;

use k256::ecdsa::SigningKey;
use rand::RngCore;
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use crate::domain::chain::{BitcoinNetwork, ChainKind, ChainOptions, DEFAULT_EVM_CHAIN_ID};
use crate::error::{AppError, AppResult};
use crate::utils::address_validator::AddressValidator;

/// Tron 主网地址版本字节
const TRON_ADDRESS_VERSION: u8 = 0x41;

/// 随机标量落在曲线阶之外的概率可以忽略，重试上限只是兜底
const MAX_KEYGEN_ATTEMPTS: usize = 8;

/// 生成结果
pub struct GeneratedKey {
    pub chain_kind: ChainKind,
    pub public_address: String,
    /// 链原生的私钥文本编码（EVM: 0x hex，BTC: WIF，SOL: base58 keypair，TRX: hex）
    pub secret: Zeroizing<String>,
    pub network: Option<BitcoinNetwork>,
    pub evm_chain_id: Option<u64>,
}

impl fmt::Debug for GeneratedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedKey")
            .field("chain_kind", &self.chain_kind)
            .field("public_address", &self.public_address)
            .field("secret", &"<redacted>")
            .field("network", &self.network)
            .field("evm_chain_id", &self.evm_chain_id)
            .finish()
    }
}

/// 链密钥生成器（封闭枚举，每个变体携带自己的元数据）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKeyProvider {
    Ethereum { evm_chain_id: u64 },
    Bitcoin { network: BitcoinNetwork },
    Solana,
    Tron,
}

impl ChainKeyProvider {
    /// 根据链类型和选项构造生成器
    ///
    /// 选项必须与链匹配：network 仅限 Bitcoin，evm_chain_id 仅限 EVM
    pub fn for_chain(kind: ChainKind, options: &ChainOptions) -> AppResult<Self> {
        options.ensure_scoped_to(kind)?;

        Ok(match kind {
            ChainKind::Ethereum => ChainKeyProvider::Ethereum {
                evm_chain_id: options.evm_chain_id.unwrap_or(DEFAULT_EVM_CHAIN_ID),
            },
            ChainKind::Bitcoin => ChainKeyProvider::Bitcoin {
                network: options.network.unwrap_or_default(),
            },
            ChainKind::Solana => ChainKeyProvider::Solana,
            ChainKind::Tron => ChainKeyProvider::Tron,
        })
    }

    pub fn kind(&self) -> ChainKind {
        match self {
            ChainKeyProvider::Ethereum { .. } => ChainKind::Ethereum,
            ChainKeyProvider::Bitcoin { .. } => ChainKind::Bitcoin,
            ChainKeyProvider::Solana => ChainKind::Solana,
            ChainKeyProvider::Tron => ChainKind::Tron,
        }
    }

    /// 生成新的密钥对
    pub fn generate(&self) -> AppResult<GeneratedKey> {
        let (public_address, secret) = match self {
            ChainKeyProvider::Ethereum { .. } => generate_ethereum()?,
            ChainKeyProvider::Bitcoin { network } => generate_bitcoin(*network)?,
            ChainKeyProvider::Solana => generate_solana(),
            ChainKeyProvider::Tron => generate_tron()?,
        };

        // 生成器输出必须通过格式校验，否则视为内部缺陷
        if !AddressValidator::validate(self.kind(), &public_address) {
            tracing::error!(chain = %self.kind(), "generated address failed format validation");
            return Err(AppError::InvalidAddressFormat {
                chain: self.kind().as_str(),
            });
        }

        Ok(GeneratedKey {
            chain_kind: self.kind(),
            public_address,
            secret,
            network: match self {
                ChainKeyProvider::Bitcoin { network } => Some(*network),
                _ => None,
            },
            evm_chain_id: match self {
                ChainKeyProvider::Ethereum { evm_chain_id } => Some(*evm_chain_id),
                _ => None,
            },
        })
    }

    /// 从解密后的私钥文本重新推导地址
    pub fn address_from_secret(&self, secret: &str) -> AppResult<String> {
        match self {
            ChainKeyProvider::Ethereum { .. } => {
                let key = parse_secp256k1_hex(secret)?;
                ethereum_address(&key)
            }
            ChainKeyProvider::Bitcoin { network } => bitcoin_address_from_wif(secret, *network),
            ChainKeyProvider::Solana => solana_address_from_keypair(secret),
            ChainKeyProvider::Tron => {
                let key = parse_secp256k1_hex(secret)?;
                Ok(tron_address(&key))
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// secp256k1 (EVM, Tron)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn random_secp256k1_key() -> AppResult<SigningKey> {
    let mut bytes = Zeroizing::new([0u8; 32]);
    for _ in 0..MAX_KEYGEN_ATTEMPTS {
        rand::thread_rng().fill_bytes(&mut bytes[..]);
        if let Ok(key) = SigningKey::from_slice(&bytes[..]) {
            return Ok(key);
        }
    }
    Err(AppError::KeyGeneration(
        "failed to sample a valid secp256k1 scalar".into(),
    ))
}

fn parse_secp256k1_hex(secret: &str) -> AppResult<SigningKey> {
    let raw = Zeroizing::new(
        hex::decode(secret.trim_start_matches("0x"))
            .map_err(|_| AppError::CorruptRecord("secret is not valid hex".into()))?,
    );
    SigningKey::from_slice(&raw)
        .map_err(|_| AppError::CorruptRecord("secret is not a valid secp256k1 key".into()))
}

/// Keccak256(未压缩公钥去掉 0x04 前缀) 的后 20 字节
fn keccak_account_id(key: &SigningKey) -> [u8; 20] {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    out
}

fn ethereum_address(key: &SigningKey) -> AppResult<String> {
    AddressValidator::to_checksum_address(&hex::encode(keccak_account_id(key)))
        .ok_or_else(|| AppError::KeyGeneration("invalid ethereum account id".into()))
}

fn tron_address(key: &SigningKey) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(TRON_ADDRESS_VERSION);
    payload.extend_from_slice(&keccak_account_id(key));
    bs58::encode(payload).with_check().into_string()
}

fn generate_ethereum() -> AppResult<(String, Zeroizing<String>)> {
    let key = random_secp256k1_key()?;
    let secret = Zeroizing::new(format!("0x{}", hex::encode(key.to_bytes())));
    Ok((ethereum_address(&key)?, secret))
}

fn generate_tron() -> AppResult<(String, Zeroizing<String>)> {
    let key = random_secp256k1_key()?;
    let secret = Zeroizing::new(hex::encode(key.to_bytes()));
    Ok((tron_address(&key), secret))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bitcoin (P2PKH)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn generate_bitcoin(network: BitcoinNetwork) -> AppResult<(String, Zeroizing<String>)> {
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use bitcoin::{Address, PrivateKey, PublicKey};

    let secp = Secp256k1::new();
    let mut bytes = Zeroizing::new([0u8; 32]);
    let mut secret_key = None;
    for _ in 0..MAX_KEYGEN_ATTEMPTS {
        rand::thread_rng().fill_bytes(&mut bytes[..]);
        if let Ok(key) = SecretKey::from_slice(&bytes[..]) {
            secret_key = Some(key);
            break;
        }
    }
    let secret_key = secret_key.ok_or_else(|| {
        AppError::KeyGeneration("failed to sample a valid bitcoin secret key".into())
    })?;

    let private_key = PrivateKey::new(secret_key, network.to_bitcoin());
    let public_key = PublicKey::from_private_key(&secp, &private_key);
    let address = Address::p2pkh(&public_key, network.to_bitcoin()).to_string();

    Ok((address, Zeroizing::new(private_key.to_wif())))
}

fn bitcoin_address_from_wif(wif: &str, network: BitcoinNetwork) -> AppResult<String> {
    use bitcoin::secp256k1::Secp256k1;
    use bitcoin::{Address, PrivateKey, PublicKey};

    let private_key = PrivateKey::from_wif(wif)
        .map_err(|_| AppError::CorruptRecord("secret is not a valid WIF key".into()))?;
    let secp = Secp256k1::new();
    let public_key = PublicKey::from_private_key(&secp, &private_key);
    Ok(Address::p2pkh(&public_key, network.to_bitcoin()).to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ed25519 (Solana)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn generate_solana() -> (String, Zeroizing<String>) {
    let mut seed = Zeroizing::new([0u8; 32]);
    rand::thread_rng().fill_bytes(&mut seed[..]);
    let signing_key = ed25519_dalek::SigningKey::from_bytes(&seed);

    // Solana 地址就是公钥的 Base58 编码
    let address = bs58::encode(signing_key.verifying_key().to_bytes()).into_string();
    let keypair = Zeroizing::new(signing_key.to_keypair_bytes());
    let secret = Zeroizing::new(bs58::encode(&keypair[..]).into_string());
    (address, secret)
}

fn solana_address_from_keypair(secret: &str) -> AppResult<String> {
    let raw = Zeroizing::new(
        bs58::decode(secret)
            .into_vec()
            .map_err(|_| AppError::CorruptRecord("secret is not valid base58".into()))?,
    );
    let keypair: Zeroizing<[u8; 64]> = Zeroizing::new(
        raw.as_slice()
            .try_into()
            .map_err(|_| AppError::CorruptRecord("solana keypair must be 64 bytes".into()))?,
    );
    let signing_key = ed25519_dalek::SigningKey::from_keypair_bytes(&keypair)
        .map_err(|_| AppError::CorruptRecord("inconsistent solana keypair".into()))?;
    Ok(bs58::encode(signing_key.verifying_key().to_bytes()).into_string())
}
