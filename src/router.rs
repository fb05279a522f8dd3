//! Hybrid read/write router.
//!
//! Resolves every public operation to the fastest correct path. Writes and
//! open-order reads are contract-only so order ids stay authoritative;
//! position reads prefer the API (one batched call) and fall back to the
//! contract; history is API-only. A preferred-path failure is downgraded
//! to a warning and the other path's view is returned — never with API
//! order ids standing in for contract ids.

use std::sync::{Arc, RwLock};

use alloy::network::EthereumWallet;
use alloy::primitives::B256;
use alloy::providers::{DynProvider, ProviderBuilder};
use anyhow::{Context, Result, anyhow};
use tracing::warn;

use perpl_client::types::rest::{
    AccountHistoryRecord, Announcements, FillRecord, MarketInfo, OrderHistoryRecord,
    PositionHistoryRecord, PositionRecord,
};
use perpl_client::types::market::FeeSchedule;
use perpl_client::types::{
    Account, AccountId, Candle, Order, OrderBook, OrderDescriptor, OrderFlags, OrderId,
    Perpetual, PerpetualId, Position, PositionType,
};
use perpl_client::units::{self, Pns};
use perpl_client::{ContractClient, PerplError, RestClient};

use crate::config::BotConfig;

/// How far past the current head an order stays executable.
const LAST_EXEC_HORIZON_BLOCKS: u64 = 300;

/// Price bound applied to market orders on the contract path, as a
/// fraction of the mark. The order is IOC so the bound only caps slippage.
const MARKET_PRICE_BOUND_PCT: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct OpenPositionRequest {
    pub market: PerpetualId,
    pub long: bool,
    /// Size in display units (contracts).
    pub size: f64,
    /// Limit price in display units; `None` places a market (IOC) order.
    pub price: Option<f64>,
    pub leverage: f64,
    pub post_only: bool,
}

#[derive(Debug, Clone)]
pub struct ClosePositionRequest {
    pub market: PerpetualId,
    /// Display-unit size to close; `None` closes the whole position.
    pub size: Option<f64>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ExecutionReceipt {
    pub tx_hash: B256,
    pub descriptor: OrderDescriptor,
}

pub struct HybridRouter {
    rest: Arc<RestClient>,
    contract: Arc<ContractClient<DynProvider>>,
    account_owner: alloy::primitives::Address,
    use_api: bool,
    markets: RwLock<Option<Vec<MarketInfo>>>,
}

impl HybridRouter {
    pub fn new(config: &BotConfig) -> Result<Self> {
        let signer = config.operator_signer()?;
        let operator_address = signer.address();
        let wallet = EthereumWallet::from(signer);
        let url: reqwest::Url = config
            .rpc_url
            .parse()
            .context("invalid PERPLBOT_RPC_URL")?;
        let provider = DynProvider::new(ProviderBuilder::new().wallet(wallet).connect_http(url));

        let mut contract = ContractClient::new(config.exchange_address, provider);
        if let Some(proxy) = config.delegated_account_address {
            contract = contract.with_proxy(proxy);
        }

        Ok(Self {
            rest: Arc::new(RestClient::new(config.api_base_url.clone(), config.chain_id)),
            contract: Arc::new(contract),
            // The exchange account belongs to the proxy when one is set.
            account_owner: config.delegated_account_address.unwrap_or(operator_address),
            use_api: config.use_api,
            markets: RwLock::new(None),
        })
    }

    pub fn rest(&self) -> &Arc<RestClient> {
        &self.rest
    }

    pub fn contract(&self) -> &Arc<ContractClient<DynProvider>> {
        &self.contract
    }

    pub fn provider(&self) -> &DynProvider {
        self.contract.provider()
    }

    // ==================== Market resolution ====================

    /// Markets from the public context, fetched once and cached.
    pub async fn markets(&self) -> Result<Vec<MarketInfo>> {
        if let Some(markets) = self.markets.read().unwrap().clone() {
            return Ok(markets);
        }
        let context = self.rest.get_context().await?;
        *self.markets.write().unwrap() = Some(context.markets.clone());
        Ok(context.markets)
    }

    /// Resolve a market by numeric id or symbol (case-insensitive).
    pub async fn resolve_market(&self, market: &str) -> Result<PerpetualId> {
        if let Ok(id) = market.parse::<PerpetualId>() {
            return Ok(id);
        }
        let markets = self.markets().await?;
        markets
            .iter()
            .find(|m| m.symbol.eq_ignore_ascii_case(market))
            .map(|m| m.id)
            .ok_or_else(|| anyhow!("unknown market '{market}'"))
    }

    // ==================== Reads ====================

    /// Canonical market data — contract only, no freshness ambiguity.
    pub async fn get_perpetual(&self, perp: PerpetualId) -> Result<Perpetual> {
        Ok(self.contract.get_perpetual_info(perp).await?)
    }

    pub async fn get_account(&self) -> Result<Account> {
        Ok(self.contract.get_account_by_address(self.account_owner).await?)
    }

    /// Open orders are contract-only: their ids must be authoritative.
    pub async fn get_open_orders(
        &self,
        perp: PerpetualId,
        account_id: AccountId,
    ) -> Result<Vec<Order>> {
        Ok(self.contract.get_open_orders(perp, account_id).await?)
    }

    /// Positions: one batched API call when authenticated, else one
    /// contract read per perpetual. The API view maps onto the same scaled
    /// representation; order ids are not involved on either path.
    pub async fn get_positions(
        &self,
        account_id: AccountId,
        perps: &[PerpetualId],
    ) -> Result<Vec<Position>> {
        if self.use_api && self.rest.is_authenticated() {
            match self.rest.get_positions().await {
                Ok(records) => {
                    return Ok(records.iter().map(position_from_record).collect());
                }
                Err(e) => {
                    warn!(error = %e, "API positions read failed; falling back to contract");
                }
            }
        }
        self.positions_from_contract(account_id, perps).await
    }

    async fn positions_from_contract(
        &self,
        account_id: AccountId,
        perps: &[PerpetualId],
    ) -> Result<Vec<Position>> {
        let mut positions = Vec::new();
        for perp in perps {
            let (position, _, _) = self.contract.get_position(*perp, account_id).await?;
            if position.is_open() {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    /// Authoritative mark/oracle read for liquidation logic. Errors with
    /// `StaleMark` when the settlement rules would reject the mark.
    pub async fn get_mark(
        &self,
        perp: PerpetualId,
        account_id: AccountId,
    ) -> Result<(Position, Pns)> {
        let (position, mark, valid) = self.contract.get_position(perp, account_id).await?;
        if !valid {
            return Err(PerplError::StaleMark.into());
        }
        Ok((position, mark))
    }

    pub async fn get_order_book(&self, perp: PerpetualId, depth: usize) -> Result<OrderBook> {
        let info = self.contract.get_perpetual_info(perp).await?;
        Ok(self.contract.order_book(&info, depth).await?)
    }

    pub async fn get_fees(&self, perp: PerpetualId) -> Result<FeeSchedule> {
        Ok(self.contract.get_fees(perp).await?)
    }

    pub async fn get_maintenance_margin_hdths(&self, perp: PerpetualId) -> Result<u32> {
        let (_, maint) = self.contract.get_margin_fractions(perp, 0).await?;
        Ok(maint)
    }

    pub async fn get_candles(
        &self,
        perp: PerpetualId,
        resolution_sec: u32,
        from_ms: u64,
        to_ms: u64,
    ) -> Result<Vec<Candle>> {
        Ok(self.rest.get_candles(perp, resolution_sec, from_ms, to_ms).await?)
    }

    pub async fn get_announcements(&self) -> Result<Announcements> {
        Ok(self.rest.get_announcements().await?)
    }

    // History is API-only; the contract offers no history query.

    pub async fn get_fills(&self, count: u32, max_pages: Option<usize>) -> Result<Vec<FillRecord>> {
        Ok(self.rest.get_fills_all(count, max_pages).await?)
    }

    pub async fn get_order_history(
        &self,
        count: u32,
        max_pages: Option<usize>,
    ) -> Result<Vec<OrderHistoryRecord>> {
        Ok(self.rest.get_order_history_all(count, max_pages).await?)
    }

    pub async fn get_position_history(
        &self,
        count: u32,
        max_pages: Option<usize>,
    ) -> Result<Vec<PositionHistoryRecord>> {
        Ok(self.rest.get_position_history_all(count, max_pages).await?)
    }

    pub async fn get_account_history(
        &self,
        count: u32,
        max_pages: Option<usize>,
    ) -> Result<Vec<AccountHistoryRecord>> {
        Ok(self.rest.get_account_history_all(count, max_pages).await?)
    }

    // ==================== Writes (contract only) ====================

    pub async fn open_position(&self, req: &OpenPositionRequest) -> Result<ExecutionReceipt> {
        if req.leverage < 1.0 {
            return Err(anyhow!("leverage must be at least 1x"));
        }
        let perp = self.contract.get_perpetual_info(req.market).await?;
        let head = self.contract.block_number().await?;

        let (price_pns, flags) = match req.price {
            Some(price) => (
                perp.pns(price),
                if req.post_only { OrderFlags::POST_ONLY } else { OrderFlags::GTC },
            ),
            None => (market_bound_pns(&perp, req.long), OrderFlags::IOC),
        };

        let desc = OrderDescriptor::open(
            req.market,
            req.long,
            price_pns,
            perp.lns(req.size),
            units::leverage_to_hdths(req.leverage),
            flags,
            head + LAST_EXEC_HORIZON_BLOCKS,
        );
        let tx_hash = self.contract.exec_order(&desc).await?;
        Ok(ExecutionReceipt { tx_hash, descriptor: desc })
    }

    pub async fn close_position(
        &self,
        account_id: AccountId,
        req: &ClosePositionRequest,
    ) -> Result<ExecutionReceipt> {
        let perp = self.contract.get_perpetual_info(req.market).await?;
        let (position, _, _) = self.contract.get_position(req.market, account_id).await?;
        if !position.is_open() {
            return Err(anyhow!("no open position on market {}", req.market));
        }
        let long = position.position_type.is_long();
        let head = self.contract.block_number().await?;

        let lot = match req.size {
            Some(size) => perp.lns(size).min(position.lot_lns),
            None => position.lot_lns,
        };
        let (price_pns, flags) = match req.price {
            Some(price) => (perp.pns(price), OrderFlags::GTC),
            // Closing a long sells, so the bound is on the sell side.
            None => (market_bound_pns(&perp, !long), OrderFlags::IOC),
        };

        let desc = OrderDescriptor::close(
            req.market,
            long,
            price_pns,
            lot,
            flags,
            head + LAST_EXEC_HORIZON_BLOCKS,
        );
        let tx_hash = self.contract.exec_order(&desc).await?;
        Ok(ExecutionReceipt { tx_hash, descriptor: desc })
    }

    pub async fn cancel_order(
        &self,
        perp: PerpetualId,
        order_id: OrderId,
    ) -> Result<ExecutionReceipt> {
        let head = self.contract.block_number().await?;
        let desc = OrderDescriptor::cancel(perp, order_id, head + LAST_EXEC_HORIZON_BLOCKS);
        let tx_hash = self.contract.exec_order(&desc).await?;
        Ok(ExecutionReceipt { tx_hash, descriptor: desc })
    }

    /// Batched execution with the batch-unavailable fallback: if
    /// `execOrders` reverts, each descriptor is retried as a single.
    pub async fn exec_batch(&self, descs: &[OrderDescriptor]) -> Result<Vec<B256>> {
        match self.contract.exec_orders(descs, true).await {
            Ok(tx_hash) => Ok(vec![tx_hash]),
            Err(PerplError::Reverted(reason)) => {
                warn!(%reason, "execOrders reverted; falling back to sequential singles");
                let mut hashes = Vec::with_capacity(descs.len());
                for desc in descs {
                    hashes.push(self.contract.exec_order(desc).await?);
                }
                Ok(hashes)
            }
            Err(e) => Err(e.into()),
        }
    }

    // ==================== Collateral ====================

    pub async fn deposit_collateral(&self, amount: f64) -> Result<B256> {
        Ok(self.contract.deposit_collateral(units::amount_to_cns(amount)).await?)
    }

    pub async fn increase_position_collateral(
        &self,
        perp: PerpetualId,
        amount: f64,
    ) -> Result<B256> {
        Ok(self
            .contract
            .increase_position_collateral(perp, units::amount_to_cns(amount))
            .await?)
    }

    pub async fn decrease_position_collateral(
        &self,
        perp: PerpetualId,
        amount: f64,
        clamp_to_maximum: bool,
    ) -> Result<B256> {
        let amount_cns = units::amount_to_cns(amount);
        self.contract.request_decrease_position_collateral(perp, amount_cns).await?;
        Ok(self
            .contract
            .decrease_position_collateral(perp, amount_cns, clamp_to_maximum)
            .await?)
    }
}

/// IOC price bound for a market order: a hair through the mark so the
/// order crosses, without accepting unbounded slippage.
fn market_bound_pns(perp: &Perpetual, buying: bool) -> Pns {
    let mark = perp.mark_pns as f64;
    let bound = if buying {
        mark * (1.0 + MARKET_PRICE_BOUND_PCT)
    } else {
        mark * (1.0 - MARKET_PRICE_BOUND_PCT)
    };
    bound.round().max(1.0) as Pns
}

/// Map an API position record onto the core representation. Scaling and
/// sign carry over exactly; nothing here touches order ids.
fn position_from_record(record: &PositionRecord) -> Position {
    Position {
        perpetual_id: record.perpetual_id,
        account_id: record.account_id,
        position_type: PositionType::from_code(record.position_type),
        entry_pns: record.entry_pns,
        lot_lns: record.lot_lns,
        deposit_cns: record.deposit_cns,
        pnl_cns: record.pnl_cns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_record_maps_onto_core_position_exactly() {
        let record = PositionRecord {
            position_id: 9,
            perpetual_id: 16,
            account_id: 100,
            position_type: 2,
            entry_pns: 950_000,
            lot_lns: 12_500,
            deposit_cns: 1_000_000,
            pnl_cns: -42_000,
        };
        let position = position_from_record(&record);
        assert_eq!(position.position_type, PositionType::Short);
        assert_eq!(position.entry_pns, 950_000);
        assert_eq!(position.lot_lns, 12_500);
        assert_eq!(position.pnl_cns, -42_000);
    }

    #[test]
    fn market_bound_crosses_the_mark() {
        let perp = Perpetual {
            id: 16,
            name: "Bitcoin".into(),
            symbol: "BTC".into(),
            price_decimals: 1,
            lot_decimals: 5,
            base_price_pns: 900_000,
            mark_pns: 950_000,
            oracle_pns: 950_000,
            mark_timestamp: 0,
            oracle_timestamp: 0,
            funding_rate_per_100k: 0,
            funding_start_block: 0,
            long_open_interest_lns: 0,
            short_open_interest_lns: 0,
            max_bid_ons: 0,
            min_bid_ons: 0,
            max_ask_ons: 0,
            min_ask_ons: 0,
            total_orders: 0,
            paused: false,
        };
        assert!(market_bound_pns(&perp, true) > perp.mark_pns);
        assert!(market_bound_pns(&perp, false) < perp.mark_pns);
    }
}
