//! 私钥静态加密模块
//!
//! PBKDF2-HMAC-SHA256 派生密钥 + AES-256-GCM（16字节 IV）加密。
//! 每条记录携带算法版本与迭代次数，调整参数后旧记录仍可解密。

use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, Aead, KeyInit},
    aes::Aes256,
    AesGcm,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{AppError, AppResult};
use crate::infrastructure::pbkdf2::{
    derive_key, random_salt, KdfParams, MAX_ITERATIONS, SALT_LENGTH,
};

/// AES-256-GCM，使用 128 位 nonce
type Aes256Gcm16 = AesGcm<Aes256, U16>;

pub const IV_LENGTH: usize = 16;

/// 加密套件版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherVersion {
    /// PBKDF2-HMAC-SHA256 + AES-256-GCM，16字节盐值与 IV
    V1,
}

impl CipherVersion {
    pub const CURRENT: CipherVersion = CipherVersion::V1;

    pub fn as_i16(&self) -> i16 {
        match self {
            CipherVersion::V1 => 1,
        }
    }

    pub fn from_i16(value: i16) -> AppResult<Self> {
        match value {
            1 => Ok(CipherVersion::V1),
            other => Err(AppError::CorruptRecord(format!(
                "unknown cipher version: {}",
                other
            ))),
        }
    }
}

/// 加密后的私钥，包含解密所需的全部数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub version: CipherVersion,
    /// 加密时使用的 PBKDF2 迭代次数
    pub kdf_iterations: u32,
    pub ciphertext: Vec<u8>,
    pub salt: Vec<u8>,
    pub iv: Vec<u8>,
}

/// 基于密码的私钥加解密器
#[derive(Debug, Clone, Default)]
pub struct SecretCipher {
    params: KdfParams,
}

impl SecretCipher {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }

    /// 加密私钥；每次调用都生成新的盐值与 IV
    pub fn encrypt(&self, plaintext: &[u8], password: &str) -> AppResult<EncryptedSecret> {
        if self.params.iterations == 0 || self.params.iterations > MAX_ITERATIONS {
            return Err(AppError::invalid_parameter(format!(
                "kdf iterations must be between 1 and {}",
                MAX_ITERATIONS
            )));
        }
        let salt = random_salt();
        let mut iv = [0u8; IV_LENGTH];
        rand::thread_rng().fill_bytes(&mut iv);

        let key = derive_key(password, &salt, self.params.iterations);
        let cipher = Aes256Gcm16::new_from_slice(&key[..])
            .map_err(|_| AppError::KeyGeneration("invalid derived key length".into()))?;

        let ciphertext = cipher
            .encrypt(GenericArray::from_slice(&iv), plaintext)
            .map_err(|_| AppError::KeyGeneration("encryption failed".into()))?;

        Ok(EncryptedSecret {
            version: CipherVersion::CURRENT,
            kdf_iterations: self.params.iterations,
            ciphertext,
            salt: salt.to_vec(),
            iv: iv.to_vec(),
        })
    }

    /// 解密私钥
    ///
    /// 按记录自身的版本和迭代次数派生密钥，与当前配置无关
    pub fn decrypt(
        &self,
        encrypted: &EncryptedSecret,
        password: &str,
    ) -> AppResult<Zeroizing<Vec<u8>>> {
        match encrypted.version {
            CipherVersion::V1 => decrypt_v1(encrypted, password),
        }
    }

    /// 解密为 UTF-8 字符串（各链私钥的文本编码）
    pub fn decrypt_string(
        &self,
        encrypted: &EncryptedSecret,
        password: &str,
    ) -> AppResult<Zeroizing<String>> {
        let mut bytes = self.decrypt(encrypted, password)?;
        let text = String::from_utf8(std::mem::take(&mut *bytes))
            .map_err(|e| {
                e.into_bytes().zeroize();
                AppError::WrongPasswordOrCorruptData
            })?;
        Ok(Zeroizing::new(text))
    }
}

fn decrypt_v1(encrypted: &EncryptedSecret, password: &str) -> AppResult<Zeroizing<Vec<u8>>> {
    if encrypted.salt.len() != SALT_LENGTH
        || encrypted.iv.len() != IV_LENGTH
        || encrypted.kdf_iterations == 0
        || encrypted.kdf_iterations > MAX_ITERATIONS
    {
        return Err(AppError::WrongPasswordOrCorruptData);
    }

    let key = derive_key(password, &encrypted.salt, encrypted.kdf_iterations);
    let cipher = Aes256Gcm16::new_from_slice(&key[..])
        .map_err(|_| AppError::WrongPasswordOrCorruptData)?;

    // 认证标签校验失败即密码错误或密文被篡改
    let plaintext = cipher
        .decrypt(
            GenericArray::from_slice(&encrypted.iv),
            encrypted.ciphertext.as_ref(),
        )
        .map_err(|_| AppError::WrongPasswordOrCorruptData)?;

    Ok(Zeroizing::new(plaintext))
}
