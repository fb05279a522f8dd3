//! Payload types of the REST API.

use serde::{Deserialize, Serialize};

use super::market::Candle;
use super::{ApiOrderId, PerpetualId};

// ==================== Authentication ====================

#[derive(Debug, Clone, Serialize)]
pub struct AuthPayloadRequest {
    pub chain_id: u64,
    pub address: String,
}

/// Challenge returned by `/v1/auth/payload`; every field is echoed back on
/// connect so the server can verify the MAC statelessly.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    pub message: String,
    pub nonce: String,
    pub issued_at: String,
    pub mac: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthConnectRequest {
    pub chain_id: u64,
    pub address: String,
    pub message: String,
    pub nonce: String,
    pub issued_at: String,
    pub mac: String,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConnectResponse {
    #[serde(default)]
    pub nonce: String,
}

// ==================== Public Context ====================

#[derive(Debug, Clone, Deserialize)]
pub struct Context {
    pub chain: ChainInfo,
    #[serde(default)]
    pub markets: Vec<MarketInfo>,
    #[serde(default)]
    pub tokens: Vec<TokenInfo>,
    #[serde(default)]
    pub instances: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainInfo {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketInfo {
    pub id: PerpetualId,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub config: MarketConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub price_decimals: u8,
    pub lot_decimals: u8,
    #[serde(default)]
    pub init_margin_hdths: u32,
    #[serde(default)]
    pub maint_margin_hdths: u32,
    #[serde(default)]
    pub maker_fee_per_100k: u64,
    #[serde(default)]
    pub taker_fee_per_100k: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
}

// ==================== Candles ====================

/// Envelope of the candle endpoint: message type, request time, resolution
/// and the data window.
#[derive(Debug, Clone, Deserialize)]
pub struct CandleWindow {
    #[serde(default)]
    pub mt: u32,
    #[serde(default)]
    pub at: u64,
    #[serde(default)]
    pub r: u32,
    #[serde(default)]
    pub d: Vec<Candle>,
}

// ==================== History ====================

/// One page of a history endpoint. `np` is the opaque next-page cursor;
/// an empty cursor terminates pagination.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPage<T> {
    #[serde(default = "Vec::new")]
    pub d: Vec<T>,
    #[serde(default)]
    pub np: String,
}

impl<T> Default for HistoryPage<T> {
    fn default() -> Self {
        Self { d: Vec::new(), np: String::new() }
    }
}

impl<T> HistoryPage<T> {
    pub fn has_next(&self) -> bool {
        !self.np.is_empty()
    }
}

/// Historical fill. Carries the API-side order id, which is never
/// interchangeable with a contract order id.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FillRecord {
    #[serde(rename = "oid")]
    pub api_order_id: ApiOrderId,
    #[serde(rename = "pid")]
    pub perpetual_id: PerpetualId,
    #[serde(rename = "p")]
    pub price_pns: u64,
    #[serde(rename = "l")]
    pub lot_lns: u64,
    #[serde(rename = "fe")]
    pub fee_cns: u64,
    /// "m" maker / "t" taker.
    #[serde(rename = "lq", default)]
    pub liquidity: String,
    #[serde(rename = "ts", default)]
    pub timestamp_ms: u64,
    #[serde(rename = "bn", default)]
    pub block_number: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderHistoryRecord {
    #[serde(rename = "oid")]
    pub api_order_id: ApiOrderId,
    #[serde(rename = "pid")]
    pub perpetual_id: PerpetualId,
    #[serde(rename = "t")]
    pub order_type: u8,
    #[serde(rename = "p")]
    pub price_pns: u64,
    #[serde(rename = "l")]
    pub lot_lns: u64,
    #[serde(rename = "f", default)]
    pub filled_lns: u64,
    #[serde(rename = "st")]
    pub status: u8,
    #[serde(rename = "ts", default)]
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PositionHistoryRecord {
    #[serde(rename = "pid")]
    pub perpetual_id: PerpetualId,
    #[serde(rename = "pt")]
    pub position_type: u8,
    #[serde(rename = "ep")]
    pub entry_pns: u64,
    #[serde(rename = "l")]
    pub lot_lns: u64,
    #[serde(rename = "dp")]
    pub deposit_cns: u64,
    #[serde(rename = "pnl", default)]
    pub pnl_cns: i64,
    #[serde(rename = "ts", default)]
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountHistoryRecord {
    /// Entry kind, e.g. "deposit", "withdraw", "funding", "fee".
    #[serde(rename = "k", default)]
    pub kind: String,
    #[serde(rename = "a")]
    pub amount_cns: i64,
    #[serde(rename = "b", default)]
    pub balance_cns: u64,
    #[serde(rename = "ts", default)]
    pub timestamp_ms: u64,
}

/// Current positions as reported by the API (one batched call across all
/// perpetuals). Scaled identically to the contract representation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PositionRecord {
    #[serde(rename = "id")]
    pub position_id: u64,
    #[serde(rename = "pid")]
    pub perpetual_id: PerpetualId,
    #[serde(rename = "aid")]
    pub account_id: u64,
    #[serde(rename = "pt")]
    pub position_type: u8,
    #[serde(rename = "ep")]
    pub entry_pns: u64,
    #[serde(rename = "l")]
    pub lot_lns: u64,
    #[serde(rename = "dp")]
    pub deposit_cns: u64,
    #[serde(rename = "pnl", default)]
    pub pnl_cns: i64,
}

// ==================== Announcements ====================

#[derive(Debug, Clone, Deserialize)]
pub struct Announcements {
    #[serde(default)]
    pub ver: u64,
    #[serde(default)]
    pub active: Vec<Announcement>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Announcement {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}
