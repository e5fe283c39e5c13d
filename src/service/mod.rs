pub mod changenow_client;
pub mod exchange_gateway;
pub mod reconciliation_worker;
pub mod swap_orchestrator;
pub mod wallet_vault;

pub use exchange_gateway::{
    CreatedOrder, ExchangeGateway, NetworkMap, OrderRequest, OrderStatusReport, RateQuote,
    RateRequest,
};
pub use swap_orchestrator::{CreateSwapRequest, SwapOrchestrator, SwapStatusReport};
pub use wallet_vault::WalletVault;
