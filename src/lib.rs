//! IronVault - 多链加密钱包托管与跨链兑换生命周期
//!
//! 私钥只以加密形式落盘；兑换订单状态由后台对账同步到本地记录

pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod repository;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use app_state::AppState;
pub use error::{AppError, AppResult};

pub mod prelude {
    pub use crate::{
        app_state::AppState,
        domain::{ChainKind, ChainOptions, TransactionStatus, WalletRecord},
        error::{AppError, AppResult},
        repository::WalletStore,
        service::{CreateSwapRequest, SwapOrchestrator, WalletVault},
    };
}
