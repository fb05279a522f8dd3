//! PerplBot — trading agent toolkit for the Perpl perpetual-futures
//! exchange.
//!
//! The crate is the core that front-ends (CLI, chat UI, Telegram bot)
//! consume: a hybrid API/contract router, a streaming state tracker, a
//! liquidation simulator and an LLM tool loop, all built on the
//! [`perpl_client`] exchange client.

pub mod agent;
pub mod config;
pub mod liquidation;
pub mod router;
pub mod tracker;

pub use config::BotConfig;
pub use router::HybridRouter;
pub use tracker::StateTracker;

// Re-export the client crate so consumers need a single dependency.
pub use perpl_client;
