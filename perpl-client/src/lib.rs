pub mod abi;
pub mod constants;
pub mod errors;
pub mod providers;
pub mod signers;
pub mod types;
pub mod units;

// Re-export commonly used items at crate root
pub use constants::Network;
pub use errors::PerplError;
pub use providers::{
    ContractClient, OrderTicket, RequestIdAllocator, RestClient, Session, WsClient, WsConfig,
    WsEndpoint,
};
pub use signers::WalletSigner;
