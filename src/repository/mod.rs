// 存储抽象与两种实现
pub mod memory_store;
pub mod pg_store;
pub mod wallet_store;

pub use memory_store::InMemoryWalletStore;
pub use pg_store::PgWalletStore;
pub use wallet_store::WalletStore;
