//! WebSocket frame types and the `mt` dispatcher.
//!
//! Every frame is a JSON object carrying a numeric `mt` message type. The
//! dispatcher is a closed sum over the protocol's known codes; unknown
//! codes are dropped silently for forward compatibility.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::mt;
use crate::errors::PerplError;
use crate::units::{Cns, Lns, Pns};

use super::{AccountId, OrderId, PerpetualId};

// ==================== Stream Names ====================

pub fn order_book_stream(perp: PerpetualId) -> String {
    format!("order-book@{perp}")
}

pub fn trades_stream(perp: PerpetualId) -> String {
    format!("trades@{perp}")
}

pub fn market_state_stream(chain_id: u64) -> String {
    format!("market-state@{chain_id}")
}

pub fn heartbeat_stream(chain_id: u64) -> String {
    format!("heartbeat@{chain_id}")
}

pub fn candles_stream(perp: PerpetualId, resolution_sec: u32) -> String {
    format!("candles@{perp}*{resolution_sec}")
}

pub fn funding_stream(chain_id: u64) -> String {
    format!("funding@{chain_id}")
}

// ==================== Outbound Frames ====================

#[derive(Debug, Serialize)]
pub struct PingFrame {
    pub mt: u32,
    pub t: u64,
}

impl PingFrame {
    pub fn now() -> Self {
        let t = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self { mt: mt::PING, t }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthFrame {
    pub mt: u32,
    pub chain_id: u64,
    pub nonce: String,
    pub ses: Uuid,
}

impl AuthFrame {
    pub fn new(chain_id: u64, nonce: impl Into<String>) -> Self {
        Self {
            mt: mt::AUTH,
            chain_id,
            nonce: nonce.into(),
            ses: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionRequest {
    pub stream: String,
    pub subscribe: bool,
}

#[derive(Debug, Serialize)]
pub struct SubscribeFrame {
    pub mt: u32,
    pub subs: Vec<SubscriptionRequest>,
}

impl SubscribeFrame {
    pub fn subscribe<I, S>(streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mt: mt::SUBSCRIBE,
            subs: streams
                .into_iter()
                .map(|stream| SubscriptionRequest { stream: stream.into(), subscribe: true })
                .collect(),
        }
    }

    pub fn unsubscribe<I, S>(streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mt: mt::SUBSCRIBE,
            subs: streams
                .into_iter()
                .map(|stream| SubscriptionRequest { stream: stream.into(), subscribe: false })
                .collect(),
        }
    }
}

/// Trading-socket order request (`mt` 22). Field names follow the wire
/// protocol: `rq` request id, `t` order type, `p` price, `l` lot, `lv`
/// leverage hundredths, `fl` flags, `lb` last execution block, `lp`
/// linked position (closes only), `xb` expiry block.
#[derive(Debug, Serialize)]
pub struct OrderFrame {
    pub mt: u32,
    pub rq: u64,
    pub pid: PerpetualId,
    pub aid: AccountId,
    pub t: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<Pns>,
    pub l: Lns,
    pub lv: u32,
    pub fl: u32,
    pub lb: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lp: Option<u64>,
    /// Target order id, cancels only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oid: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xb: Option<u64>,
}

// ==================== Inbound Frames ====================

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionAck {
    pub stream: String,
    pub sid: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribedFrame {
    #[serde(default)]
    pub subs: Vec<SubscriptionAck>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PongFrame {
    #[serde(default)]
    pub t: u64,
}

/// Market-state delta for one perpetual.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketState {
    pub pid: PerpetualId,
    /// Mark price PNS.
    #[serde(default)]
    pub mp: Pns,
    /// Oracle price PNS.
    #[serde(default)]
    pub op: Pns,
    /// Mark timestamp, seconds.
    #[serde(default)]
    pub mts: u64,
    /// Funding rate per-100k.
    #[serde(default)]
    pub fr: i64,
    /// Long open interest LNS.
    #[serde(default)]
    pub oil: Lns,
    /// Short open interest LNS.
    #[serde(default)]
    pub ois: Lns,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsBookLevel {
    /// Price PNS.
    pub p: Pns,
    /// Resting volume LNS; zero removes the level.
    pub l: Lns,
    /// Order count at this level.
    #[serde(default)]
    pub n: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BookSnapshot {
    pub pid: PerpetualId,
    #[serde(default)]
    pub b: Vec<WsBookLevel>,
    #[serde(default)]
    pub a: Vec<WsBookLevel>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BookDelta {
    pub pid: PerpetualId,
    /// Changed bid levels.
    #[serde(default)]
    pub b: Vec<WsBookLevel>,
    /// Changed ask levels.
    #[serde(default)]
    pub a: Vec<WsBookLevel>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsTrade {
    pub p: Pns,
    pub l: Lns,
    /// Milliseconds.
    #[serde(default)]
    pub ts: u64,
    /// True when the taker bought.
    #[serde(default)]
    pub tk: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradesFrame {
    pub pid: PerpetualId,
    #[serde(default)]
    pub tr: Vec<WsTrade>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsWalletAccount {
    pub aid: AccountId,
    /// Owner address, 0x-prefixed.
    #[serde(default)]
    pub ad: String,
    /// Balance CNS.
    #[serde(default)]
    pub b: Cns,
    /// Locked balance CNS.
    #[serde(default)]
    pub lk: Cns,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletSnapshot {
    #[serde(default)]
    pub acs: Vec<WsWalletAccount>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsOrderRow {
    pub oid: OrderId,
    pub pid: PerpetualId,
    pub aid: AccountId,
    /// WS order-type code.
    pub t: u8,
    #[serde(default)]
    pub p: Pns,
    #[serde(default)]
    pub l: Lns,
    /// Filled lot LNS.
    #[serde(default)]
    pub f: Lns,
    #[serde(default)]
    pub lv: u32,
    /// Status code.
    #[serde(default)]
    pub st: u8,
    /// Remove flag: the order left the open set.
    #[serde(default)]
    pub r: bool,
    /// Request id of the submission this row acknowledges, if any.
    #[serde(default)]
    pub rq: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrdersFrame {
    #[serde(default)]
    pub os: Vec<WsOrderRow>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsFillRow {
    pub oid: OrderId,
    pub pid: PerpetualId,
    pub aid: AccountId,
    /// "m" maker / "t" taker.
    #[serde(default)]
    pub lq: String,
    pub p: Pns,
    pub l: Lns,
    #[serde(default)]
    pub fe: Cns,
    #[serde(default)]
    pub bn: u64,
    #[serde(default)]
    pub li: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FillsFrame {
    #[serde(default)]
    pub fs: Vec<WsFillRow>,
}

/// Position status code carried in `st`: 1 = open.
pub const POSITION_STATUS_OPEN: u8 = 1;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsPositionRow {
    /// Position id — the tracker's map key.
    pub id: u64,
    pub pid: PerpetualId,
    pub aid: AccountId,
    /// Position type code.
    pub pt: u8,
    /// Entry price PNS.
    #[serde(default)]
    pub ep: Pns,
    #[serde(default)]
    pub l: Lns,
    /// Deposit CNS.
    #[serde(default)]
    pub dp: Cns,
    #[serde(default)]
    pub pnl: i64,
    #[serde(default = "default_position_status")]
    pub st: u8,
}

fn default_position_status() -> u8 {
    POSITION_STATUS_OPEN
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PositionsFrame {
    #[serde(default)]
    pub ps: Vec<WsPositionRow>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeartbeatFrame {
    /// Head block number.
    #[serde(default)]
    pub blk: u64,
}

// ==================== Dispatch ====================

/// Event emitted to listeners. Snapshot/update distinction is preserved
/// where consumers need it (orders, positions, book, trades).
#[derive(Debug, Clone)]
pub enum WsEvent {
    MarketState(MarketState),
    BookSnapshot(BookSnapshot),
    BookDelta(BookDelta),
    TradesSnapshot(TradesFrame),
    TradesUpdate(TradesFrame),
    Wallet(WalletSnapshot),
    Orders { snapshot: bool, rows: Vec<WsOrderRow> },
    Fills(Vec<WsFillRow>),
    Positions { snapshot: bool, rows: Vec<WsPositionRow> },
    Heartbeat { block: u64 },
    /// The server invalidated the session (close code 3401); the client
    /// will not reconnect until re-authenticated.
    AuthExpired,
    /// Reconnect attempts exhausted.
    Fatal,
}

/// Internal decode result: events plus frames the client consumes itself.
#[derive(Debug)]
pub enum Decoded {
    Event(WsEvent),
    SubscriptionAcks(Vec<SubscriptionAck>),
    Pong,
}

#[derive(Deserialize)]
struct MtProbe {
    mt: u32,
}

/// Decode one JSON frame. `Ok(None)` means an unknown `mt` (dropped) or a
/// frame without one (malformed frames surface as errors).
pub fn decode_frame(bytes: &[u8]) -> Result<Option<Decoded>, PerplError> {
    let mut probe_buf = bytes.to_vec();
    let probe: MtProbe = simd_json::from_slice(&mut probe_buf)
        .map_err(|e| PerplError::Malformed(format!("missing or invalid mt: {e}")))?;

    let mut buf = bytes.to_vec();
    let decoded = match probe.mt {
        mt::PONG => {
            let _: PongFrame = simd_json::from_slice(&mut buf)?;
            Decoded::Pong
        }
        mt::SUBSCRIBED => {
            let frame: SubscribedFrame = simd_json::from_slice(&mut buf)?;
            Decoded::SubscriptionAcks(frame.subs)
        }
        mt::MARKET_STATE => {
            let frame: MarketState = simd_json::from_slice(&mut buf)?;
            Decoded::Event(WsEvent::MarketState(frame))
        }
        mt::BOOK_SNAPSHOT => {
            let frame: BookSnapshot = simd_json::from_slice(&mut buf)?;
            Decoded::Event(WsEvent::BookSnapshot(frame))
        }
        mt::BOOK_UPDATE => {
            let frame: BookDelta = simd_json::from_slice(&mut buf)?;
            Decoded::Event(WsEvent::BookDelta(frame))
        }
        mt::TRADES_SNAPSHOT => {
            let frame: TradesFrame = simd_json::from_slice(&mut buf)?;
            Decoded::Event(WsEvent::TradesSnapshot(frame))
        }
        mt::TRADES_UPDATE => {
            let frame: TradesFrame = simd_json::from_slice(&mut buf)?;
            Decoded::Event(WsEvent::TradesUpdate(frame))
        }
        mt::WALLET_SNAPSHOT => {
            let frame: WalletSnapshot = simd_json::from_slice(&mut buf)?;
            Decoded::Event(WsEvent::Wallet(frame))
        }
        mt::ORDERS_SNAPSHOT => {
            let frame: OrdersFrame = simd_json::from_slice(&mut buf)?;
            Decoded::Event(WsEvent::Orders { snapshot: true, rows: frame.os })
        }
        mt::ORDERS_UPDATE => {
            let frame: OrdersFrame = simd_json::from_slice(&mut buf)?;
            Decoded::Event(WsEvent::Orders { snapshot: false, rows: frame.os })
        }
        mt::FILLS_UPDATE => {
            let frame: FillsFrame = simd_json::from_slice(&mut buf)?;
            Decoded::Event(WsEvent::Fills(frame.fs))
        }
        mt::POSITIONS_SNAPSHOT => {
            let frame: PositionsFrame = simd_json::from_slice(&mut buf)?;
            Decoded::Event(WsEvent::Positions { snapshot: true, rows: frame.ps })
        }
        mt::POSITIONS_UPDATE => {
            let frame: PositionsFrame = simd_json::from_slice(&mut buf)?;
            Decoded::Event(WsEvent::Positions { snapshot: false, rows: frame.ps })
        }
        mt::HEARTBEAT => {
            let frame: HeartbeatFrame = simd_json::from_slice(&mut buf)?;
            Decoded::Event(WsEvent::Heartbeat { block: frame.blk })
        }
        _ => return Ok(None),
    };

    Ok(Some(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Option<Decoded> {
        decode_frame(json.as_bytes()).unwrap()
    }

    #[test]
    fn every_known_mt_emits_exactly_one_decoded_frame() {
        let frames = [
            (r#"{"mt":2,"t":123}"#, "pong"),
            (r#"{"mt":6,"subs":[{"stream":"trades@16","sid":9}]}"#, "sub"),
            (r#"{"mt":9,"pid":16,"mp":950000,"op":949500,"mts":1,"fr":125,"oil":10,"ois":20}"#, "market-state"),
            (r#"{"mt":15,"pid":16,"b":[{"p":949000,"l":10000}],"a":[{"p":951000,"l":5000}]}"#, "book snapshot"),
            (r#"{"mt":16,"pid":16,"b":[{"p":949000,"l":0}],"a":[]}"#, "book delta"),
            (r#"{"mt":17,"pid":16,"tr":[{"p":950000,"l":100,"ts":5,"tk":true}]}"#, "trades snapshot"),
            (r#"{"mt":18,"pid":16,"tr":[]}"#, "trades update"),
            (r#"{"mt":19,"acs":[{"aid":100,"ad":"0xabc","b":1000000,"lk":0}]}"#, "wallet"),
            (r#"{"mt":23,"os":[{"oid":7,"pid":16,"aid":100,"t":1,"p":950000,"l":1000,"st":1}]}"#, "orders snapshot"),
            (r#"{"mt":24,"os":[{"oid":7,"pid":16,"aid":100,"t":1,"r":true}]}"#, "orders update"),
            (r#"{"mt":25,"fs":[{"oid":7,"pid":16,"aid":100,"lq":"t","p":950000,"l":1000,"fe":47}]}"#, "fills"),
            (r#"{"mt":26,"ps":[{"id":3,"pid":16,"aid":100,"pt":1,"ep":950000,"l":1000,"dp":100,"pnl":0}]}"#, "positions snapshot"),
            (r#"{"mt":27,"ps":[{"id":3,"pid":16,"aid":100,"pt":1,"st":2}]}"#, "positions update"),
            (r#"{"mt":100,"blk":123456}"#, "heartbeat"),
        ];

        for (json, label) in frames {
            assert!(decode(json).is_some(), "frame {label} was dropped");
        }
    }

    #[test]
    fn unknown_mt_is_dropped_silently() {
        assert!(decode(r#"{"mt":999,"whatever":true}"#).is_none());
    }

    #[test]
    fn missing_mt_is_malformed() {
        assert!(decode_frame(br#"{"hello":"world"}"#).is_err());
        assert!(decode_frame(b"not json at all").is_err());
    }

    #[test]
    fn snapshot_and_update_are_distinguished() {
        match decode(r#"{"mt":23,"os":[]}"#) {
            Some(Decoded::Event(WsEvent::Orders { snapshot: true, .. })) => {}
            other => panic!("expected orders snapshot, got {other:?}"),
        }
        match decode(r#"{"mt":24,"os":[]}"#) {
            Some(Decoded::Event(WsEvent::Orders { snapshot: false, .. })) => {}
            other => panic!("expected orders update, got {other:?}"),
        }
    }

    #[test]
    fn subscription_ack_carries_sid() {
        match decode(r#"{"mt":6,"subs":[{"stream":"order-book@16","sid":42}]}"#) {
            Some(Decoded::SubscriptionAcks(acks)) => {
                assert_eq!(acks.len(), 1);
                assert_eq!(acks[0].stream, "order-book@16");
                assert_eq!(acks[0].sid, 42);
            }
            other => panic!("expected acks, got {other:?}"),
        }
    }

    #[test]
    fn market_order_frame_shape() {
        // A market order is encoded as IOC with no price.
        let frame = OrderFrame {
            mt: crate::constants::mt::ORDER_REQUEST,
            rq: 1,
            pid: 16,
            aid: 100,
            t: 1,
            p: None,
            l: 1000,
            lv: 1000,
            fl: 4,
            lb: 50_000,
            lp: None,
            oid: None,
            xb: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["mt"], 22);
        assert_eq!(json["t"], 1);
        assert_eq!(json["fl"], 4);
        assert!(json.get("p").is_none());

        let limit = OrderFrame { p: Some(50_000), fl: 0, ..frame };
        let json = serde_json::to_value(&limit).unwrap();
        assert_eq!(json["fl"], 0);
        assert_eq!(json["p"], 50_000);
    }

    #[test]
    fn stream_names() {
        assert_eq!(order_book_stream(16), "order-book@16");
        assert_eq!(trades_stream(16), "trades@16");
        assert_eq!(market_state_stream(10143), "market-state@10143");
        assert_eq!(heartbeat_stream(10143), "heartbeat@10143");
        assert_eq!(candles_stream(16, 60), "candles@16*60");
        assert_eq!(funding_stream(10143), "funding@10143");
    }
}
