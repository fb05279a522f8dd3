pub mod contract;
pub mod request_id;
pub mod rest;
pub mod websocket;

pub use contract::ContractClient;
pub use request_id::RequestIdAllocator;
pub use rest::{RestClient, Session};
pub use websocket::{OrderTicket, WsClient, WsConfig, WsEndpoint};
