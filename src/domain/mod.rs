//! Domain 模块
//!
//! 链类型、钱包与交易模型、兑换状态机、多链密钥生成

pub mod chain;
pub mod key_generation;
pub mod transaction;
pub mod transaction_status;
pub mod wallet;

// 重新导出常用类型
pub use chain::{BitcoinNetwork, ChainKind, ChainOptions, DEFAULT_EVM_CHAIN_ID};
pub use key_generation::{ChainKeyProvider, GeneratedKey};
pub use transaction::{NewTransaction, TransactionKind, TransactionRecord, TransactionUpdate};
pub use transaction_status::{SwapStatus, TransactionStatus};
pub use wallet::{NewWallet, WalletRecord, WalletUpdate};
