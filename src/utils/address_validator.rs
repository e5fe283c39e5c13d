//! 地址验证模块
//!
//! 统一的地址格式校验，生成器输出与持久化记录都经过这里

use sha3::{Digest, Keccak256};

use crate::domain::chain::ChainKind;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Tron 地址前缀字符与固定长度
pub const TRON_ADDRESS_PREFIX: char = 'T';
pub const TRON_ADDRESS_LENGTH: usize = 34;

/// 地址验证器
pub struct AddressValidator;

impl AddressValidator {
    /// 按链类型验证地址格式
    pub fn validate(chain: ChainKind, address: &str) -> bool {
        match chain {
            ChainKind::Ethereum => Self::validate_evm_address(address),
            ChainKind::Bitcoin => Self::validate_bitcoin_address(address),
            ChainKind::Solana => Self::validate_solana_address(address),
            ChainKind::Tron => Self::validate_tron_address(address),
        }
    }

    /// 验证EVM地址（支持EIP-55 Checksum）
    pub fn validate_evm_address(address: &str) -> bool {
        let Some(hex_part) = address.strip_prefix("0x") else {
            return false;
        };

        if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return false;
        }

        // 混合大小写时必须满足 EIP-55
        let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower {
            return Self::to_checksum_address(hex_part).as_deref() == Some(address);
        }

        true
    }

    /// EIP-55 Checksum 编码，输入必须是 40 位十六进制
    /// https://eips.ethereum.org/EIPS/eip-55
    pub fn to_checksum_address(hex_part: &str) -> Option<String> {
        let addr_lower = hex_part.trim_start_matches("0x").to_lowercase();
        if addr_lower.len() != 40 || !addr_lower.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let hash = Keccak256::digest(addr_lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, ch) in addr_lower.chars().enumerate() {
            let hash_byte = hash[i / 2];
            let hash_nibble = if i % 2 == 0 {
                hash_byte >> 4
            } else {
                hash_byte & 0x0f
            };

            if ch.is_ascii_alphabetic() && hash_nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }
        Some(out)
    }

    /// 验证Solana地址（Base58编码，32字节公钥）
    pub fn validate_solana_address(address: &str) -> bool {
        // 典型长度：32-44个字符
        if address.len() < 32 || address.len() > 44 || !is_base58(address) {
            return false;
        }

        match bs58::decode(address).into_vec() {
            Ok(decoded) => decoded.len() == 32,
            Err(_) => false,
        }
    }

    /// 验证 Bitcoin Base58Check P2PKH / P2SH 地址（主网与测试网）
    pub fn validate_bitcoin_address(address: &str) -> bool {
        if address.len() < 26 || address.len() > 35 || !is_base58(address) {
            return false;
        }

        match bs58::decode(address).with_check(None).into_vec() {
            // 版本字节 + 20字节哈希
            Ok(payload) => {
                payload.len() == 21 && matches!(payload[0], 0x00 | 0x05 | 0x6f | 0xc4)
            }
            Err(_) => false,
        }
    }

    /// 验证Tron地址格式：`T` 开头、34个字符、Base58 字符集
    pub fn validate_tron_address(address: &str) -> bool {
        address.len() == TRON_ADDRESS_LENGTH
            && address.starts_with(TRON_ADDRESS_PREFIX)
            && is_base58(address)
    }
}

fn is_base58(s: &str) -> bool {
    s.chars().all(|c| BASE58_ALPHABET.contains(c))
}
