//! REST client with sign-in-with-wallet session authentication.

use std::future::Future;
use std::time::Instant;

use http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::constants::*;
use crate::errors::PerplError;
use crate::signers::WalletSigner;
use crate::types::rest::*;
use crate::types::{Candle, PerpetualId};

type Result<T> = std::result::Result<T, PerplError>;

/// Header carrying the session nonce on authenticated requests. The nonce
/// and the cookie are only valid together.
const AUTH_NONCE_HEADER: &str = "x-auth-nonce";

// ==================== Rate limiter ====================

/// Client-side token bucket so bursts fail fast instead of earning 429s.
pub struct RateLimiter {
    state: Mutex<(f64, Instant)>,
    max_tokens: f64,
    refill_per_sec: f64,
}

impl RateLimiter {
    pub fn new(max_tokens: u32, refill_per_min: u32) -> Self {
        Self {
            state: Mutex::new((max_tokens as f64, Instant::now())),
            max_tokens: max_tokens as f64,
            refill_per_sec: refill_per_min as f64 / 60.0,
        }
    }

    pub fn check_weight(&self, weight: u32) -> Result<()> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.1).as_secs_f64();
        state.0 = (state.0 + elapsed * self.refill_per_sec).min(self.max_tokens);
        state.1 = now;

        if state.0 >= weight as f64 {
            state.0 -= weight as f64;
            Ok(())
        } else {
            Err(PerplError::RateLimited {
                available: state.0 as u32,
                required: weight,
            })
        }
    }
}

// ==================== Session ====================

/// Authenticated REST session. The cookie bundle and the nonce are always
/// presented together; neither is valid alone.
#[derive(Debug, Clone)]
pub struct Session {
    pub nonce: String,
    pub cookie: String,
}

// ==================== Client ====================

pub struct RestClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    base_url: String,
    chain_id: u64,
    session: RwLock<Option<Session>>,
    rate_limiter: RateLimiter,
}

impl RestClient {
    pub fn mainnet() -> Self {
        Self::new(Network::Mainnet.api_url(), Network::Mainnet.chain_id())
    }

    pub fn testnet() -> Self {
        Self::new(Network::Testnet.api_url(), Network::Testnet.chain_id())
    }

    pub fn new(base_url: impl Into<String>, chain_id: u64) -> Self {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let https = HttpsConnectorBuilder::new()
            .with_native_roots()
            .expect("TLS initialization failed")
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            chain_id,
            session: RwLock::new(None),
            rate_limiter: RateLimiter::new(RATE_LIMIT_MAX_TOKENS, RATE_LIMIT_REFILL_PER_MIN),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.read().is_some()
    }

    /// Snapshot of the current session, for the trading socket handshake.
    pub fn session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    /// Reset local session state. The server side is untouched.
    pub fn clear_auth(&self) {
        *self.session.write() = None;
    }

    // ==================== Authentication ====================

    /// Two-step sign-in: request the challenge payload, sign it with the
    /// caller's wallet, post the connect request, and capture the session
    /// cookie plus nonce. Both must be present for the sign-in to count.
    pub async fn authenticate<S>(&self, signer: &S, ref_code: Option<String>) -> Result<()>
    where
        S: WalletSigner + ?Sized,
    {
        self.rate_limiter.check_weight(WEIGHT_AUTH)?;
        let address = signer.address().to_string();

        let payload_req = AuthPayloadRequest {
            chain_id: self.chain_id,
            address: address.clone(),
        };
        let (status, _, body) = self
            .send(Method::POST, AUTH_PAYLOAD_PATH, Some(serde_json::to_vec(&payload_req)?), None)
            .await?;
        self.check_status(status, &body, false)?;
        let payload: AuthPayload = parse_json(body)?;

        let signature = signer.sign_message(&payload.message).await?;

        let connect_req = AuthConnectRequest {
            chain_id: self.chain_id,
            address,
            message: payload.message,
            nonce: payload.nonce,
            issued_at: payload.issued_at,
            mac: payload.mac,
            signature,
            ref_code,
        };
        let (status, headers, body) = self
            .send(Method::POST, AUTH_CONNECT_PATH, Some(serde_json::to_vec(&connect_req)?), None)
            .await?;
        self.check_status(status, &body, false)?;

        let cookie = session_cookie(&headers).ok_or_else(|| {
            PerplError::InvalidResponse("sign-in response carried no session cookie".into())
        })?;
        let connect: AuthConnectResponse = parse_json(body)?;
        if connect.nonce.is_empty() {
            return Err(PerplError::InvalidResponse(
                "sign-in response carried no session nonce".into(),
            ));
        }

        debug!(address = %signer.address(), "authenticated against {}", self.base_url);
        *self.session.write() = Some(Session { nonce: connect.nonce, cookie });
        Ok(())
    }

    // ==================== Public endpoints ====================

    pub async fn get_context(&self) -> Result<Context> {
        self.rate_limiter.check_weight(WEIGHT_CONTEXT)?;
        self.get_json(CONTEXT_PATH, false).await
    }

    pub async fn get_candles(
        &self,
        market_id: PerpetualId,
        resolution_sec: u32,
        from_ms: u64,
        to_ms: u64,
    ) -> Result<Vec<Candle>> {
        self.rate_limiter.check_weight(WEIGHT_CANDLES)?;
        let path =
            format!("/v1/market-data/{market_id}/candles/{resolution_sec}/{from_ms}-{to_ms}");
        let window: CandleWindow = self.get_json(&path, false).await?;
        Ok(window.d)
    }

    pub async fn get_announcements(&self) -> Result<Announcements> {
        self.rate_limiter.check_weight(WEIGHT_ANNOUNCEMENTS)?;
        self.get_json(ANNOUNCEMENTS_PATH, false).await
    }

    // ==================== Authenticated reads ====================

    /// Current positions across all perpetuals, one batched call.
    pub async fn get_positions(&self) -> Result<Vec<PositionRecord>> {
        self.rate_limiter.check_weight(WEIGHT_POSITIONS)?;
        let page: HistoryPage<PositionRecord> =
            self.get_json("/v1/trading/positions", true).await?;
        Ok(page.d)
    }

    pub async fn get_fills(
        &self,
        count: u32,
        page: Option<&str>,
    ) -> Result<HistoryPage<FillRecord>> {
        self.history_page("fills", count, page).await
    }

    pub async fn get_order_history(
        &self,
        count: u32,
        page: Option<&str>,
    ) -> Result<HistoryPage<OrderHistoryRecord>> {
        self.history_page("order-history", count, page).await
    }

    pub async fn get_position_history(
        &self,
        count: u32,
        page: Option<&str>,
    ) -> Result<HistoryPage<PositionHistoryRecord>> {
        self.history_page("position-history", count, page).await
    }

    pub async fn get_account_history(
        &self,
        count: u32,
        page: Option<&str>,
    ) -> Result<HistoryPage<AccountHistoryRecord>> {
        self.history_page("account-history", count, page).await
    }

    pub async fn get_fills_all(
        &self,
        count: u32,
        max_pages: Option<usize>,
    ) -> Result<Vec<FillRecord>> {
        collect_pages(|page| self.page_owned("fills", count, page), max_pages).await
    }

    pub async fn get_order_history_all(
        &self,
        count: u32,
        max_pages: Option<usize>,
    ) -> Result<Vec<OrderHistoryRecord>> {
        collect_pages(|page| self.page_owned("order-history", count, page), max_pages).await
    }

    pub async fn get_position_history_all(
        &self,
        count: u32,
        max_pages: Option<usize>,
    ) -> Result<Vec<PositionHistoryRecord>> {
        collect_pages(|page| self.page_owned("position-history", count, page), max_pages).await
    }

    pub async fn get_account_history_all(
        &self,
        count: u32,
        max_pages: Option<usize>,
    ) -> Result<Vec<AccountHistoryRecord>> {
        collect_pages(|page| self.page_owned("account-history", count, page), max_pages).await
    }

    // ==================== Plumbing ====================

    async fn history_page<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        count: u32,
        page: Option<&str>,
    ) -> Result<HistoryPage<T>> {
        self.rate_limiter.check_weight(WEIGHT_HISTORY)?;

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("count", &count.to_string());
        if let Some(cursor) = page {
            query.append_pair("page", cursor);
        }
        let path = format!("/v1/trading/{endpoint}?{}", query.finish());

        match self.get_json(&path, true).await {
            Ok(page) => Ok(page),
            // History endpoints normalize 404 to "no data".
            Err(PerplError::NotFound(_)) => Ok(HistoryPage::default()),
            Err(e) => Err(e),
        }
    }

    async fn page_owned<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        count: u32,
        page: Option<String>,
    ) -> Result<HistoryPage<T>> {
        self.history_page(endpoint, count, page.as_deref()).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, authenticated: bool) -> Result<T> {
        let session = if authenticated {
            // Refuse to issue the request at all while signed out.
            Some(self.session.read().clone().ok_or(PerplError::Unauthenticated)?)
        } else {
            None
        };
        let (status, _, body) = self.send(Method::GET, path, None, session).await?;
        self.check_status(status, &body, authenticated)?;
        parse_json(body)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        session: Option<Session>,
    ) -> Result<(StatusCode, HeaderMap, Bytes)> {
        let uri = format!("{}{}", self.base_url, path);
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(session) = &session {
            builder = builder
                .header(AUTH_NONCE_HEADER, &session.nonce)
                .header(COOKIE, &session.cookie);
        }
        let request = builder.body(Full::new(Bytes::from(body.unwrap_or_default())))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| PerplError::Network(e.to_string()))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .collect()
            .await
            .map_err(|e| PerplError::Network(e.to_string()))?
            .to_bytes();
        Ok((status, headers, body))
    }

    fn check_status(&self, status: StatusCode, body: &Bytes, authenticated: bool) -> Result<()> {
        if status.is_success() {
            return Ok(());
        }
        if status.as_u16() == 401 && authenticated {
            // The session is gone; make the caller re-authenticate explicitly.
            self.clear_auth();
        }
        Err(status_error(status.as_u16(), String::from_utf8_lossy(body).into_owned()))
    }
}

/// Map a non-2xx status to the error taxonomy.
fn status_error(status: u16, body: String) -> PerplError {
    match status {
        401 => PerplError::SessionExpired,
        418 | 423 => PerplError::AccessRequired { status },
        404 => PerplError::NotFound(body),
        429 => PerplError::ServerRateLimited,
        _ => PerplError::Http { status, body },
    }
}

fn parse_json<T: DeserializeOwned>(body: Bytes) -> Result<T> {
    let mut buf = body.to_vec();
    simd_json::from_slice(&mut buf).map_err(PerplError::from)
}

/// Extract the session cookie pairs from `Set-Cookie` headers, dropping
/// attributes (Path, HttpOnly, ...) so the bundle can be replayed.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let pairs: Vec<String> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(|pair| pair.trim().to_string())
        .filter(|pair| !pair.is_empty())
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

/// Walk pages forward until the next-page cursor is empty or `max_pages`
/// is reached, concatenating the data arrays.
async fn collect_pages<T, F, Fut>(mut fetch: F, max_pages: Option<usize>) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<HistoryPage<T>>>,
{
    let mut out = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let HistoryPage { d, np } = fetch(cursor.take()).await?;
        out.extend(d);
        pages += 1;
        if np.is_empty() || max_pages.is_some_and(|max| pages >= max) {
            break;
        }
        cursor = Some(np);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_the_taxonomy() {
        assert!(matches!(status_error(401, String::new()), PerplError::SessionExpired));
        assert!(matches!(
            status_error(418, String::new()),
            PerplError::AccessRequired { status: 418 }
        ));
        assert!(matches!(
            status_error(423, String::new()),
            PerplError::AccessRequired { status: 423 }
        ));
        assert!(matches!(status_error(404, String::new()), PerplError::NotFound(_)));
        assert!(matches!(status_error(429, String::new()), PerplError::ServerRateLimited));
        assert!(matches!(
            status_error(500, "boom".into()),
            PerplError::Http { status: 500, .. }
        ));
    }

    #[test]
    fn cookie_extraction_keeps_pairs_drops_attributes() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, "session=abc123; Path=/; HttpOnly".parse().unwrap());
        headers.append(SET_COOKIE, "csrf=xyz; Secure".parse().unwrap());
        assert_eq!(session_cookie(&headers).unwrap(), "session=abc123; csrf=xyz");

        let empty = HeaderMap::new();
        assert!(session_cookie(&empty).is_none());
    }

    #[tokio::test]
    async fn paginator_concatenates_until_cursor_empty() {
        let pages = vec![
            HistoryPage { d: vec![1, 2], np: "a".into() },
            HistoryPage { d: vec![3], np: "b".into() },
            HistoryPage { d: vec![4, 5], np: String::new() },
        ];
        let mut served: Vec<Option<String>> = Vec::new();
        let mut iter = pages.into_iter();
        let all = collect_pages(
            |cursor| {
                served.push(cursor);
                let page = iter.next().unwrap();
                async move { Ok::<_, PerplError>(page) }
            },
            None,
        )
        .await
        .unwrap();

        assert_eq!(all, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            served,
            vec![None, Some("a".to_string()), Some("b".to_string())]
        );
    }

    #[tokio::test]
    async fn paginator_respects_max_pages() {
        let mut calls = 0u32;
        let all = collect_pages(
            |_cursor| {
                calls += 1;
                async move {
                    Ok::<_, PerplError>(HistoryPage {
                        d: vec![calls],
                        np: "more".to_string(),
                    })
                }
            },
            Some(2),
        )
        .await
        .unwrap();

        assert_eq!(all, vec![1, 2]);
        assert_eq!(calls, 2);
    }

    #[test]
    fn local_rate_limiter_rejects_bursts() {
        let limiter = RateLimiter::new(3, 60);
        assert!(limiter.check_weight(2).is_ok());
        assert!(limiter.check_weight(1).is_ok());
        match limiter.check_weight(5) {
            Err(PerplError::RateLimited { required: 5, .. }) => {}
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }
}
