//! Liquidation-price analysis: a closed-form estimate that is always
//! available, and a fork-based verifier that replays the contract's own
//! solvency rule on a local Anvil fork.

pub mod fork;
pub mod math;

use thiserror::Error;

pub use fork::{ForkSimulator, LiquidationReport, SimConfig};
pub use math::ClosedFormInputs;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("anvil unavailable: {0}")]
    AnvilUnavailable(String),

    #[error("storage slot discovery failed: {0}")]
    SlotDiscoveryFailed(String),

    #[error("price write verification failed: {0}")]
    PriceWriteVerificationFailed(String),

    #[error("sweep found no liquidation boundary")]
    SweepNoBoundary,

    #[error("no open position for account {account_id} on perpetual {perp_id}")]
    NoPosition { perp_id: u64, account_id: u64 },

    #[error("rpc error: {0}")]
    Rpc(String),
}
