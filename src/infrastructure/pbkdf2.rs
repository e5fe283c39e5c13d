//! PBKDF2 密钥派生模块
//! 用于从用户密码派生加密密钥

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

/// 默认迭代次数，也是生产配置允许的下限
pub const MIN_PRODUCTION_ITERATIONS: u32 = 100_000;
/// 迭代次数上限，超过即视为记录损坏
pub const MAX_ITERATIONS: u32 = 10_000_000;
pub const SALT_LENGTH: usize = 16; // 16字节盐值
pub const KEY_LENGTH: usize = 32; // 32字节密钥（AES-256）

/// PBKDF2 密钥派生参数
///
/// 作为显式配置注入 `SecretCipher`，测试中可以调低迭代次数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: MIN_PRODUCTION_ITERATIONS,
        }
    }
}

/// 生成随机盐值
pub fn random_salt() -> [u8; SALT_LENGTH] {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// 从密码和盐值派生密钥
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_LENGTH]> {
    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key[..]);
    key
}
