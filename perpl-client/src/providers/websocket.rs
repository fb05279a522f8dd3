//! Market-data and trading WebSocket clients.
//!
//! Both sockets speak the same `mt`-framed JSON protocol. The market-data
//! endpoint is public; the trading endpoint authenticates with the REST
//! session's nonce and cookie and is confirmed by a wallet snapshot.
//!
//! The connection task owns the read half; all writes go through a shared
//! write half so subscriptions and order submissions stay usable across
//! reconnects. Events fan out to every registered listener in the order
//! frames arrive.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use fastwebsockets::{
    Frame, OpCode, Role, WebSocket, WebSocketError, WebSocketRead, WebSocketWrite,
};
use http_body_util::Empty;
use hyper::{body::Bytes, header, upgrade::Upgraded, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::constants::*;
use crate::errors::PerplError;
use crate::providers::request_id::RequestIdAllocator;
use crate::providers::rest::Session;
use crate::types::ws::*;
use crate::types::{AccountId, OrderId, OrderType, PerpetualId};
use crate::units::{LeverageHdths, Lns, Pns};

type Result<T> = std::result::Result<T, PerplError>;
type Reader = WebSocketRead<ReadHalf<TokioIo<Upgraded>>>;
type Writer = WebSocketWrite<WriteHalf<TokioIo<Upgraded>>>;

// ==================== Configuration ====================

#[derive(Clone, Debug)]
pub struct WsConfig {
    /// Interval between liveness pings.
    pub ping_interval: Duration,
    /// How long to wait for the wallet snapshot confirming authentication.
    pub auth_timeout: Duration,
    /// Delay schedule in seconds; attempts past the end reuse the last entry.
    pub reconnect_backoff_secs: &'static [u64],
    pub max_reconnect_attempts: u32,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(PING_INTERVAL_SECS),
            auth_timeout: Duration::from_secs(AUTH_TIMEOUT_SECS),
            reconnect_backoff_secs: &RECONNECT_BACKOFF_SECS,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsEndpoint {
    MarketData,
    Trading,
}

impl WsEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            WsEndpoint::MarketData => WS_MARKET_DATA_PATH,
            WsEndpoint::Trading => WS_TRADING_PATH,
        }
    }
}

// ==================== Order tickets ====================

/// High-level order submission request for the trading socket.
#[derive(Debug, Clone)]
pub struct OrderTicket {
    pub perpetual_id: PerpetualId,
    pub account_id: AccountId,
    pub order_type: OrderType,
    /// `None` means a market order, encoded as IOC without a price.
    pub price_pns: Option<Pns>,
    pub lot_lns: Lns,
    pub leverage_hdths: LeverageHdths,
    /// Explicit flags; defaults to IOC for market orders and GTC otherwise.
    pub flags: Option<u32>,
    /// Mandatory last-execution-block bound.
    pub last_execution_block: u64,
    /// Linked position id; required on closes.
    pub linked_position_id: Option<u64>,
    /// Target order id; required on cancels.
    pub target_order_id: Option<OrderId>,
    pub expiry_block: Option<u64>,
}

impl OrderTicket {
    pub fn open_long(
        perpetual_id: PerpetualId,
        account_id: AccountId,
        lot_lns: Lns,
        price_pns: Option<Pns>,
        leverage_hdths: LeverageHdths,
        last_execution_block: u64,
    ) -> Self {
        Self {
            perpetual_id,
            account_id,
            order_type: OrderType::OpenLong,
            price_pns,
            lot_lns,
            leverage_hdths,
            flags: None,
            last_execution_block,
            linked_position_id: None,
            target_order_id: None,
            expiry_block: None,
        }
    }

    pub fn open_short(
        perpetual_id: PerpetualId,
        account_id: AccountId,
        lot_lns: Lns,
        price_pns: Option<Pns>,
        leverage_hdths: LeverageHdths,
        last_execution_block: u64,
    ) -> Self {
        Self {
            order_type: OrderType::OpenShort,
            ..Self::open_long(
                perpetual_id,
                account_id,
                lot_lns,
                price_pns,
                leverage_hdths,
                last_execution_block,
            )
        }
    }

    pub fn close(
        perpetual_id: PerpetualId,
        account_id: AccountId,
        long_position: bool,
        lot_lns: Lns,
        price_pns: Option<Pns>,
        linked_position_id: u64,
        last_execution_block: u64,
    ) -> Self {
        Self {
            perpetual_id,
            account_id,
            order_type: if long_position { OrderType::CloseLong } else { OrderType::CloseShort },
            price_pns,
            lot_lns,
            leverage_hdths: CLOSE_LEVERAGE_SENTINEL_HDTHS,
            flags: None,
            last_execution_block,
            linked_position_id: Some(linked_position_id),
            target_order_id: None,
            expiry_block: None,
        }
    }

    pub fn cancel(
        perpetual_id: PerpetualId,
        account_id: AccountId,
        target_order_id: OrderId,
        last_execution_block: u64,
    ) -> Self {
        Self {
            perpetual_id,
            account_id,
            order_type: OrderType::Cancel,
            price_pns: None,
            lot_lns: 0,
            leverage_hdths: CLOSE_LEVERAGE_SENTINEL_HDTHS,
            flags: Some(0),
            last_execution_block,
            linked_position_id: None,
            target_order_id: Some(target_order_id),
            expiry_block: None,
        }
    }

    fn to_frame(&self, rq: u64) -> Result<OrderFrame> {
        let t = self.order_type.ws_code().ok_or_else(|| {
            PerplError::InvalidRequest(format!(
                "{:?} has no trading-socket encoding",
                self.order_type
            ))
        })?;

        if self.last_execution_block == 0 {
            return Err(PerplError::InvalidRequest(
                "order requests must carry a last-execution-block bound".into(),
            ));
        }
        if (self.order_type.is_open() || self.order_type.is_close()) && self.lot_lns == 0 {
            return Err(PerplError::InvalidRequest(
                "order lot must be strictly positive".into(),
            ));
        }
        if self.order_type.is_close() && self.linked_position_id.is_none() {
            return Err(PerplError::InvalidRequest(
                "close requests must carry the linked position id".into(),
            ));
        }
        if matches!(self.order_type, OrderType::Cancel) && self.target_order_id.is_none() {
            return Err(PerplError::InvalidRequest(
                "cancel requests must carry the target order id".into(),
            ));
        }

        // Market orders (no price) default to immediate-or-cancel.
        let fl = self
            .flags
            .unwrap_or(if self.price_pns.is_none() { 4 } else { 0 });

        Ok(OrderFrame {
            mt: mt::ORDER_REQUEST,
            rq,
            pid: self.perpetual_id,
            aid: self.account_id,
            t,
            p: self.price_pns,
            l: self.lot_lns,
            lv: self.leverage_hdths,
            fl,
            lb: self.last_execution_block,
            lp: self.linked_position_id,
            oid: self.target_order_id.map(|id| id.0),
            xb: self.expiry_block,
        })
    }
}

// ==================== Client ====================

pub struct WsClient {
    url: String,
    endpoint: WsEndpoint,
    chain_id: u64,
    config: WsConfig,
    auth: Option<Session>,

    listeners: DashMap<u64, mpsc::UnboundedSender<WsEvent>>,
    next_listener: AtomicU64,
    /// stream name -> server-assigned subscription id once confirmed.
    subscriptions: DashMap<String, Option<u64>>,

    writer: Mutex<Option<Writer>>,
    request_ids: RequestIdAllocator,
    pending_acks: DashMap<u64, oneshot::Sender<WsOrderRow>>,
    authed_tx: watch::Sender<bool>,
    closed: AtomicBool,
    tasks: parking_lot::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl WsClient {
    pub fn market_data(base_url: &str, chain_id: u64) -> Arc<Self> {
        Self::new(base_url, WsEndpoint::MarketData, chain_id, None, WsConfig::default())
    }

    pub fn trading(base_url: &str, chain_id: u64, session: Session) -> Arc<Self> {
        Self::new(base_url, WsEndpoint::Trading, chain_id, Some(session), WsConfig::default())
    }

    pub fn new(
        base_url: &str,
        endpoint: WsEndpoint,
        chain_id: u64,
        auth: Option<Session>,
        config: WsConfig,
    ) -> Arc<Self> {
        let (authed_tx, _) = watch::channel(false);
        Arc::new(Self {
            url: format!("{}{}", base_url.trim_end_matches('/'), endpoint.path()),
            endpoint,
            chain_id,
            config,
            auth,
            listeners: DashMap::new(),
            next_listener: AtomicU64::new(1),
            subscriptions: DashMap::new(),
            writer: Mutex::new(None),
            request_ids: RequestIdAllocator::new(),
            pending_acks: DashMap::new(),
            authed_tx,
            closed: AtomicBool::new(false),
            tasks: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn endpoint(&self) -> WsEndpoint {
        self.endpoint
    }

    pub fn is_authenticated(&self) -> bool {
        *self.authed_tx.borrow()
    }

    /// Register an event listener. Safe to call before `connect`, so no
    /// message can be missed for lack of a handler.
    pub fn events(&self) -> mpsc::UnboundedReceiver<WsEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.insert(id, tx);
        rx
    }

    /// Establish the connection, start the reader and ping tasks, and (on
    /// the trading endpoint) wait for the wallet snapshot that confirms
    /// authentication.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        let reader = self.open_socket().await?;

        let run_task = tokio::spawn(Arc::clone(self).run(reader));
        let ping_task = tokio::spawn(Arc::clone(self).ping_loop());
        self.tasks.lock().extend([run_task, ping_task]);

        if matches!(self.endpoint, WsEndpoint::Trading) {
            let mut authed = self.authed_tx.subscribe();
            timeout(self.config.auth_timeout, authed.wait_for(|ok| *ok))
                .await
                .map_err(|_| {
                    PerplError::ConnectFailed("trading socket authentication timed out".into())
                })?
                .map_err(|_| {
                    PerplError::ConnectFailed("connection closed during authentication".into())
                })?;
        }
        Ok(())
    }

    /// Stop the connection tasks. No further events are emitted.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.writer.lock().await = None;
        let _ = self.authed_tx.send(false);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    // ==================== Subscriptions ====================

    pub async fn subscribe(&self, stream: impl Into<String>) -> Result<()> {
        let stream = stream.into();
        self.subscriptions.entry(stream.clone()).or_insert(None);
        if self.writer.lock().await.is_some() {
            self.send_json(&SubscribeFrame::subscribe([stream])).await?;
        }
        Ok(())
    }

    pub async fn unsubscribe(&self, stream: &str) -> Result<()> {
        if self.subscriptions.remove(stream).is_some() && self.writer.lock().await.is_some() {
            self.send_json(&SubscribeFrame::unsubscribe([stream.to_string()])).await?;
        }
        Ok(())
    }

    pub async fn subscribe_order_book(&self, perp: PerpetualId) -> Result<()> {
        self.subscribe(order_book_stream(perp)).await
    }

    pub async fn subscribe_trades(&self, perp: PerpetualId) -> Result<()> {
        self.subscribe(trades_stream(perp)).await
    }

    pub async fn subscribe_market_state(&self) -> Result<()> {
        self.subscribe(market_state_stream(self.chain_id)).await
    }

    pub async fn subscribe_heartbeat(&self) -> Result<()> {
        self.subscribe(heartbeat_stream(self.chain_id)).await
    }

    pub async fn subscribe_candles(&self, perp: PerpetualId, resolution_sec: u32) -> Result<()> {
        self.subscribe(candles_stream(perp, resolution_sec)).await
    }

    pub async fn subscribe_funding(&self) -> Result<()> {
        self.subscribe(funding_stream(self.chain_id)).await
    }

    /// Server-assigned subscription id for a stream, once confirmed.
    pub fn subscription_id(&self, stream: &str) -> Option<u64> {
        self.subscriptions.get(stream).and_then(|entry| *entry.value())
    }

    // ==================== Order submission ====================

    /// Fire-and-forget submission; returns the `rq` correlation id.
    pub async fn submit_order(&self, ticket: &OrderTicket) -> Result<u64> {
        let rq = self.request_ids.next_id();
        let frame = ticket.to_frame(rq)?;
        self.send_json(&frame).await?;
        Ok(rq)
    }

    /// Submit and wait for the orders update acknowledging this `rq`.
    pub async fn submit_order_and_wait(
        &self,
        ticket: &OrderTicket,
        wait: Duration,
    ) -> Result<WsOrderRow> {
        let rq = self.request_ids.next_id();
        let frame = ticket.to_frame(rq)?;

        let (tx, rx) = oneshot::channel();
        self.pending_acks.insert(rq, tx);
        if let Err(e) = self.send_json(&frame).await {
            self.pending_acks.remove(&rq);
            return Err(e);
        }

        match timeout(wait, rx).await {
            Ok(Ok(row)) => Ok(row),
            Ok(Err(_)) => Err(PerplError::WebSocket("ack channel closed".into())),
            Err(_) => {
                self.pending_acks.remove(&rq);
                Err(PerplError::WebSocket(format!("no ack for rq {rq} within {wait:?}")))
            }
        }
    }

    // ==================== Connection internals ====================

    async fn open_socket(&self) -> Result<Reader> {
        let ws = establish_connection(&self.url, self.auth.as_ref()).await?;
        let (reader, writer) = ws.split(tokio::io::split);
        *self.writer.lock().await = Some(writer);

        if matches!(self.endpoint, WsEndpoint::Trading) {
            let auth = self.auth.as_ref().ok_or_else(|| {
                PerplError::InvalidRequest(
                    "trading socket requires an authenticated REST session".into(),
                )
            })?;
            self.send_json(&AuthFrame::new(self.chain_id, auth.nonce.clone())).await?;
        }

        // Flush subscriptions registered before connect.
        let streams: Vec<String> =
            self.subscriptions.iter().map(|entry| entry.key().clone()).collect();
        if !streams.is_empty() {
            self.send_json(&SubscribeFrame::subscribe(streams)).await?;
        }

        Ok(reader)
    }

    async fn run(self: Arc<Self>, mut reader: Reader) {
        loop {
            let close_code = self.pump(&mut reader).await;
            *self.writer.lock().await = None;
            let _ = self.authed_tx.send(false);

            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            if close_code == Some(CLOSE_CODE_AUTH_EXPIRED) {
                warn!("server closed with 3401; session expired");
                self.broadcast(WsEvent::AuthExpired);
                return;
            }

            match self.reconnect().await {
                Some(new_reader) => reader = new_reader,
                None => {
                    self.broadcast(WsEvent::Fatal);
                    return;
                }
            }
        }
    }

    /// Read frames until the connection drops; returns the close code.
    async fn pump(&self, reader: &mut Reader) -> Option<u16> {
        let mut obligated = |_frame: Frame<'_>| async { Ok::<(), WebSocketError>(()) };
        loop {
            let frame = match reader.read_frame(&mut obligated).await {
                Ok(frame) => frame,
                Err(e) => {
                    if !self.closed.load(Ordering::SeqCst) {
                        warn!(error = %e, "websocket read failed");
                    }
                    return None;
                }
            };
            match frame.opcode {
                OpCode::Text => self.handle_text(&frame.payload),
                OpCode::Close => return close_code(&frame.payload),
                _ => {}
            }
        }
    }

    fn handle_text(&self, payload: &[u8]) {
        match decode_frame(payload) {
            Ok(Some(Decoded::Pong)) => debug!("pong"),
            Ok(Some(Decoded::SubscriptionAcks(acks))) => {
                for ack in acks {
                    self.subscriptions.insert(ack.stream, Some(ack.sid));
                }
            }
            Ok(Some(Decoded::Event(event))) => {
                match &event {
                    WsEvent::Wallet(_) => {
                        // Wallet snapshot doubles as the auth confirmation.
                        let _ = self.authed_tx.send(true);
                    }
                    WsEvent::Orders { rows, .. } => {
                        for row in rows {
                            if let Some(rq) = row.rq {
                                if let Some((_, waiter)) = self.pending_acks.remove(&rq) {
                                    let _ = waiter.send(row.clone());
                                }
                            }
                        }
                    }
                    _ => {}
                }
                self.broadcast(event);
            }
            Ok(None) => {} // unknown mt, dropped
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }

    fn broadcast(&self, event: WsEvent) {
        self.listeners.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    async fn reconnect(&self) -> Option<Reader> {
        for attempt in 0..self.config.max_reconnect_attempts {
            let delay = backoff_delay(self.config.reconnect_backoff_secs, attempt);
            sleep(Duration::from_secs(delay)).await;
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            match self.reopen().await {
                Ok(reader) => {
                    info!(attempt = attempt + 1, "reconnected, {} subscriptions replayed",
                        self.subscriptions.len());
                    return Some(reader);
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "reconnect attempt failed");
                }
            }
        }
        warn!(attempts = self.config.max_reconnect_attempts, "reconnect attempts exhausted");
        None
    }

    /// Re-establish the socket: authentication first on the trading
    /// endpoint, then one batched resubscription of every named stream.
    async fn reopen(&self) -> Result<Reader> {
        let ws = establish_connection(&self.url, self.auth.as_ref()).await?;
        let (mut reader, writer) = ws.split(tokio::io::split);
        *self.writer.lock().await = Some(writer);

        if matches!(self.endpoint, WsEndpoint::Trading) {
            let auth = self.auth.as_ref().ok_or_else(|| {
                PerplError::InvalidRequest(
                    "trading socket requires an authenticated REST session".into(),
                )
            })?;
            self.send_json(&AuthFrame::new(self.chain_id, auth.nonce.clone())).await?;
            self.await_wallet(&mut reader).await?;
        }

        let streams: Vec<String> =
            self.subscriptions.iter().map(|entry| entry.key().clone()).collect();
        if !streams.is_empty() {
            self.send_json(&SubscribeFrame::subscribe(streams)).await?;
        }

        Ok(reader)
    }

    async fn await_wallet(&self, reader: &mut Reader) -> Result<()> {
        let wait = async {
            let mut obligated = |_frame: Frame<'_>| async { Ok::<(), WebSocketError>(()) };
            loop {
                let frame = reader
                    .read_frame(&mut obligated)
                    .await
                    .map_err(|e| PerplError::WebSocket(e.to_string()))?;
                match frame.opcode {
                    OpCode::Text => {
                        self.handle_text(&frame.payload);
                        if *self.authed_tx.borrow() {
                            return Ok(());
                        }
                    }
                    OpCode::Close => {
                        return Err(PerplError::Disconnected { code: close_code(&frame.payload) })
                    }
                    _ => {}
                }
            }
        };
        timeout(self.config.auth_timeout, wait)
            .await
            .map_err(|_| PerplError::ConnectFailed("re-authentication timed out".into()))?
    }

    async fn ping_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.ping_interval);
        interval.tick().await; // skip the immediate first tick
        loop {
            interval.tick().await;
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            // Failures here mean a reconnect is already in progress.
            let _ = self.send_json(&PingFrame::now()).await;
        }
    }

    async fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let payload =
            serde_json::to_vec(value).map_err(|e| PerplError::Serialize(e.to_string()))?;
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| PerplError::WebSocket("not connected".into()))?;
        writer
            .write_frame(Frame::text(payload.into()))
            .await
            .map_err(|e| PerplError::WebSocket(e.to_string()))
    }
}

// ==================== Connection establishment ====================

async fn establish_connection(
    url: &str,
    auth: Option<&Session>,
) -> Result<WebSocket<TokioIo<Upgraded>>> {
    use fastwebsockets::handshake;
    use hyper_rustls::HttpsConnectorBuilder;
    use hyper_util::client::legacy::Client;

    let uri = url
        .parse::<hyper::Uri>()
        .map_err(|e| PerplError::ConnectFailed(format!("invalid URL: {e}")))?;

    let https = HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|e| PerplError::ConnectFailed(format!("failed to load native roots: {e}")))?
        .https_or_http()
        .enable_http1()
        .build();

    let client = Client::builder(hyper_util::rt::TokioExecutor::new())
        .build::<_, Empty<Bytes>>(https);

    let host = uri
        .host()
        .ok_or_else(|| PerplError::ConnectFailed("no host in URL".into()))?;

    let mut builder = Request::builder()
        .method("GET")
        .uri(&uri)
        .header(header::HOST, host)
        .header(header::CONNECTION, "upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_VERSION, "13")
        .header(header::SEC_WEBSOCKET_KEY, handshake::generate_key());
    if let Some(session) = auth {
        builder = builder.header(header::COOKIE, &session.cookie);
    }
    let request = builder
        .body(Empty::new())
        .map_err(|e| PerplError::ConnectFailed(format!("request build failed: {e}")))?;

    let response = client
        .request(request)
        .await
        .map_err(|e| PerplError::ConnectFailed(format!("HTTP request failed: {e}")))?;

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(PerplError::ConnectFailed(format!(
            "WebSocket upgrade failed: {}",
            response.status()
        )));
    }

    let upgraded = hyper::upgrade::on(response)
        .await
        .map_err(|e| PerplError::ConnectFailed(format!("upgrade failed: {e}")))?;

    let mut ws = WebSocket::after_handshake(TokioIo::new(upgraded), Role::Client);
    ws.set_auto_close(false);
    ws.set_auto_pong(false);
    Ok(ws)
}

fn backoff_delay(schedule: &[u64], attempt: u32) -> u64 {
    schedule
        .get(attempt as usize)
        .or(schedule.last())
        .copied()
        .unwrap_or(60)
}

fn close_code(payload: &[u8]) -> Option<u16> {
    if payload.len() >= 2 {
        Some(u16::from_be_bytes([payload[0], payload[1]]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_matches_the_protocol() {
        let schedule = &RECONNECT_BACKOFF_SECS;
        let delays: Vec<u64> = (0..10).map(|a| backoff_delay(schedule, a)).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60, 60, 60]);
    }

    #[test]
    fn close_code_parsing() {
        assert_eq!(close_code(&[0x0D, 0x49]), Some(3401));
        assert_eq!(close_code(&[0x03, 0xE8, b'b', b'y', b'e']), Some(1000));
        assert_eq!(close_code(&[]), None);
        assert_eq!(close_code(&[7]), None);
    }

    #[test]
    fn market_open_long_encodes_as_ioc_without_price() {
        // openLong(marketId=16, accountId=100, size=1000, price=None,
        // leverage=1000, lastBlock=50000)
        let ticket = OrderTicket::open_long(16, 100, 1000, None, 1000, 50_000);
        let frame = ticket.to_frame(1).unwrap();
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["mt"], 22);
        assert_eq!(json["t"], 1);
        assert_eq!(json["fl"], 4);
        assert_eq!(json["lb"], 50_000);
        assert!(json.get("p").is_none());
    }

    #[test]
    fn limit_open_long_encodes_as_gtc_with_price() {
        let ticket = OrderTicket::open_long(16, 100, 1000, Some(50_000), 1000, 50_000);
        let frame = ticket.to_frame(2).unwrap();
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["t"], 1);
        assert_eq!(json["fl"], 0);
        assert_eq!(json["p"], 50_000);
    }

    #[test]
    fn close_without_linked_position_is_rejected() {
        let mut ticket = OrderTicket::close(16, 100, true, 500, None, 3, 50_000);
        ticket.linked_position_id = None;
        assert!(matches!(ticket.to_frame(3), Err(PerplError::InvalidRequest(_))));

        let ticket = OrderTicket::close(16, 100, true, 500, None, 3, 50_000);
        let frame = ticket.to_frame(4).unwrap();
        assert_eq!(frame.t, 3);
        assert_eq!(frame.lp, Some(3));
    }

    #[test]
    fn cancel_targets_an_order_id() {
        let ticket = OrderTicket::cancel(16, 100, OrderId(77), 50_000);
        let frame = ticket.to_frame(5).unwrap();
        assert_eq!(frame.t, 5);
        assert_eq!(frame.oid, Some(77));

        let mut bad = ticket.clone();
        bad.target_order_id = None;
        assert!(bad.to_frame(6).is_err());
    }

    #[test]
    fn missing_last_execution_block_is_rejected() {
        let ticket = OrderTicket::open_long(16, 100, 1000, None, 1000, 0);
        assert!(matches!(ticket.to_frame(7), Err(PerplError::InvalidRequest(_))));
    }

    #[test]
    fn resubscribe_batch_carries_every_stream_once() {
        let streams = vec![
            order_book_stream(16),
            trades_stream(16),
            market_state_stream(10143),
        ];
        let frame = SubscribeFrame::subscribe(streams.clone());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["mt"], 5);
        let subs = json["subs"].as_array().unwrap();
        assert_eq!(subs.len(), 3);
        for (sub, stream) in subs.iter().zip(&streams) {
            assert_eq!(sub["stream"], stream.as_str());
            assert_eq!(sub["subscribe"], true);
        }
    }
}
