pub mod account;
pub mod market;
pub mod order;
pub mod rest;
pub mod ws;

use serde::{Deserialize, Serialize};

pub type PerpetualId = u64;
pub type AccountId = u64;

/// Contract-assigned order identifier — the only authoritative one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order identifier as reported by the REST API. Deliberately a distinct
/// type: API ids and contract ids live in different sequences and must
/// never be interchanged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ApiOrderId(pub u64);

impl std::fmt::Display for ApiOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Re-export commonly used types
pub use account::{Account, Position, PositionType};
pub use market::{BookLevel, Candle, OrderBook, Perpetual};
pub use order::{Fill, Liquidity, Order, OrderDescriptor, OrderFlags, OrderStatus, OrderType};
