use thiserror::Error;

#[derive(Error, Debug)]
pub enum PerplError {
    // ---- auth / session ----
    #[error("not authenticated: call authenticate() first")]
    Unauthenticated,

    #[error("session expired")]
    SessionExpired,

    #[error("access code required: wallet is not whitelisted (status {status})")]
    AccessRequired { status: u16 },

    // ---- protocol ----
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {available} tokens available, {required} required")]
    RateLimited { available: u32, required: u32 },

    #[error("rate limited by server")]
    ServerRateLimited,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: status {status}, body: {body}")]
    Http { status: u16, body: String },

    // ---- transport ----
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("disconnected (close code {code:?})")]
    Disconnected { code: Option<u16> },

    #[error("reconnect attempts exhausted after {attempts} tries")]
    MaxReconnectExceeded { attempts: u32 },

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("network error: {0}")]
    Network(String),

    // ---- contract ----
    #[error("contract reverted: {0}")]
    Reverted(String),

    #[error("call simulation failed: {0}")]
    SimulationFailed(String),

    #[error("mark price is stale or invalid")]
    StaleMark,

    // ---- encoding / misc ----
    #[error("json parsing error: {0}")]
    Json(#[from] simd_json::Error),

    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("hyper http error: {0}")]
    HyperHttp(#[from] hyper::http::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("signer error: {0}")]
    Signer(#[from] crate::signers::SignerError),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
