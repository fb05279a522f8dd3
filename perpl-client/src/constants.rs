// ==================== Network Configuration ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn api_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.perpl.xyz",
            Network::Testnet => "https://api.testnet.perpl.xyz",
        }
    }

    pub fn ws_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.perpl.xyz",
            Network::Testnet => "https://api.testnet.perpl.xyz",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => CHAIN_ID_MAINNET,
            Network::Testnet => CHAIN_ID_TESTNET,
        }
    }
}

// Chain IDs (Monad)
pub const CHAIN_ID_MAINNET: u64 = 143;
pub const CHAIN_ID_TESTNET: u64 = 10143;

// ==================== REST Paths ====================

pub const AUTH_PAYLOAD_PATH: &str = "/v1/auth/payload";
pub const AUTH_CONNECT_PATH: &str = "/v1/auth/connect";
pub const CONTEXT_PATH: &str = "/v1/pub/context";
pub const ANNOUNCEMENTS_PATH: &str = "/v1/profile/announcements";

// ==================== WebSocket Endpoints ====================

pub const WS_MARKET_DATA_PATH: &str = "/ws/v1/market-data";
pub const WS_TRADING_PATH: &str = "/ws/v1/trading";

// ==================== WebSocket Message Types ====================

/// `mt` codes of the wire protocol. The dispatcher is a closed sum over
/// these; any other value is dropped for forward compatibility.
pub mod mt {
    pub const PING: u32 = 1;
    pub const PONG: u32 = 2;
    pub const AUTH: u32 = 4;
    pub const SUBSCRIBE: u32 = 5;
    pub const SUBSCRIBED: u32 = 6;
    pub const MARKET_STATE: u32 = 9;
    pub const BOOK_SNAPSHOT: u32 = 15;
    pub const BOOK_UPDATE: u32 = 16;
    pub const TRADES_SNAPSHOT: u32 = 17;
    pub const TRADES_UPDATE: u32 = 18;
    pub const WALLET_SNAPSHOT: u32 = 19;
    pub const ORDER_REQUEST: u32 = 22;
    pub const ORDERS_SNAPSHOT: u32 = 23;
    pub const ORDERS_UPDATE: u32 = 24;
    pub const FILLS_UPDATE: u32 = 25;
    pub const POSITIONS_SNAPSHOT: u32 = 26;
    pub const POSITIONS_UPDATE: u32 = 27;
    pub const HEARTBEAT: u32 = 100;
}

/// Server close code signalling the session is no longer valid.
/// The client must not reconnect with the same credentials.
pub const CLOSE_CODE_AUTH_EXPIRED: u16 = 3401;

// ==================== Connection Lifecycle ====================

pub const PING_INTERVAL_SECS: u64 = 30;
pub const AUTH_TIMEOUT_SECS: u64 = 10;

/// Reconnect delays in seconds; attempts past the end reuse the last entry.
pub const RECONNECT_BACKOFF_SECS: [u64; 7] = [1, 2, 4, 8, 16, 32, 60];
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

// ==================== Rate Limit Weights ====================

pub const WEIGHT_CONTEXT: u32 = 1;
pub const WEIGHT_CANDLES: u32 = 2;
pub const WEIGHT_ANNOUNCEMENTS: u32 = 1;
pub const WEIGHT_AUTH: u32 = 2;
pub const WEIGHT_HISTORY: u32 = 2;
pub const WEIGHT_POSITIONS: u32 = 2;

// ==================== Rate Limit Configuration ====================

pub const RATE_LIMIT_MAX_TOKENS: u32 = 1200;
pub const RATE_LIMIT_REFILL_PER_MIN: u32 = 600;

// ==================== Numeric Conventions ====================

/// The collateral token always carries 6 decimals; CNS is fixed to it.
pub const CNS_DECIMALS: u8 = 6;

/// Leverage travels as hundredths (leverage x 100).
pub const LEVERAGE_SCALE: u8 = 2;

/// Funding rates travel as signed per-100k units; percent = value / 1000.
pub const FUNDING_PER_100K_DIVISOR: f64 = 1000.0;

/// Sentinel leverage for close descriptors; the matching engine ignores it.
pub const CLOSE_LEVERAGE_SENTINEL_HDTHS: u32 = 100;
