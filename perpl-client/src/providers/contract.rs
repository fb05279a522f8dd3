//! Chain-side reads and writes against the exchange contract.
//!
//! When a proxy is configured, writes are tunneled through it: the wallet
//! calls the proxy, which forwards the allowlisted selector to the
//! exchange. Reads always go straight to the exchange.

use std::collections::VecDeque;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, FixedBytes, B256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use tracing::debug;

use crate::abi::{AccountProxy, Exchange};
use crate::errors::PerplError;
use crate::types::market::FeeSchedule;
use crate::types::{
    Account, AccountId, BookLevel, Order, OrderBook, OrderDescriptor, OrderId, Perpetual,
    PerpetualId, Position,
};
use crate::units::{self, Cns, Lns, Ons, Pns};

type Result<T> = std::result::Result<T, PerplError>;

/// Upper bound on walked levels per book side, against pathological books.
const BOOK_WALK_MAX_LEVELS: usize = 4096;

pub struct ContractClient<P: Provider + Clone> {
    exchange: Exchange::ExchangeInstance<P>,
    proxy: Option<AccountProxy::AccountProxyInstance<P>>,
    exchange_address: Address,
}

impl<P: Provider + Clone> ContractClient<P> {
    pub fn new(exchange_address: Address, provider: P) -> Self {
        Self {
            exchange: Exchange::new(exchange_address, provider),
            proxy: None,
            exchange_address,
        }
    }

    /// Route writes through the owner/operator account proxy.
    pub fn with_proxy(mut self, proxy_address: Address) -> Self {
        let provider = self.exchange.provider().clone();
        self.proxy = Some(AccountProxy::new(proxy_address, provider));
        self
    }

    pub fn exchange_address(&self) -> Address {
        self.exchange_address
    }

    pub fn provider(&self) -> &P {
        self.exchange.provider()
    }

    pub async fn block_number(&self) -> Result<u64> {
        self.exchange
            .provider()
            .get_block_number()
            .await
            .map_err(|e| PerplError::Network(e.to_string()))
    }

    // ==================== Reads ====================

    pub async fn get_perpetual_info(&self, perp_id: PerpetualId) -> Result<Perpetual> {
        let info = self
            .exchange
            .getPerpetualInfo(perp_id)
            .call()
            .await
            .map_err(call_error)?;
        Ok(Perpetual::from_abi(perp_id, &info))
    }

    pub async fn get_account_by_id(&self, account_id: AccountId) -> Result<Account> {
        let info = self
            .exchange
            .getAccountById(account_id)
            .call()
            .await
            .map_err(call_error)?;
        Ok(Account::from_abi(&info))
    }

    pub async fn get_account_by_address(&self, owner: Address) -> Result<Account> {
        let info = self
            .exchange
            .getAccountByAddr(owner)
            .call()
            .await
            .map_err(call_error)?;
        Ok(Account::from_abi(&info))
    }

    /// Position plus the mark it was valued at and whether that mark is
    /// currently acceptable to the settlement rules.
    pub async fn get_position(
        &self,
        perp_id: PerpetualId,
        account_id: AccountId,
    ) -> Result<(Position, Pns, bool)> {
        let ret = self
            .exchange
            .getPosition(perp_id, account_id)
            .call()
            .await
            .map_err(call_error)?;
        Ok((Position::from_abi(&ret.positionInfo), ret.markPNS, ret.markValid))
    }

    pub async fn get_open_orders(
        &self,
        perp_id: PerpetualId,
        account_id: AccountId,
    ) -> Result<Vec<Order>> {
        let rows = self
            .exchange
            .getOpenOrders(perp_id, account_id)
            .call()
            .await
            .map_err(call_error)?;
        Ok(rows.iter().filter_map(Order::from_abi).collect())
    }

    pub async fn get_fees(&self, perp_id: PerpetualId) -> Result<FeeSchedule> {
        let maker = self.exchange.getMakerFee(perp_id).call().await.map_err(call_error)?;
        let taker = self.exchange.getTakerFee(perp_id).call().await.map_err(call_error)?;
        Ok(FeeSchedule { maker_per_100k: maker, taker_per_100k: taker })
    }

    /// (initial, maintenance) margin fractions in hundredths.
    pub async fn get_margin_fractions(
        &self,
        perp_id: PerpetualId,
        account_id: AccountId,
    ) -> Result<(u32, u32)> {
        let ret = self
            .exchange
            .getMarginFractions(perp_id, account_id)
            .call()
            .await
            .map_err(call_error)?;
        Ok((ret.perpInitMarginFracHdths, ret.perpMaintMarginFracHdths))
    }

    pub async fn get_volume_at_book_price(
        &self,
        perp_id: PerpetualId,
        ons: Ons,
    ) -> Result<Lns> {
        self.exchange
            .getVolumeAtBookPrice(perp_id, ons)
            .call()
            .await
            .map_err(call_error)
    }

    pub async fn get_next_price_below_with_orders(
        &self,
        perp_id: PerpetualId,
        ons: Ons,
    ) -> Result<Ons> {
        self.exchange
            .getNextPriceBelowWithOrders(perp_id, ons)
            .call()
            .await
            .map_err(call_error)
    }

    /// Reconstruct the book by walking the chain-side primitives.
    ///
    /// Bids walk from the best bid downward, so the first `depth` levels
    /// are the ones closest to the spread. Asks walk from the worst ask
    /// downward, so the walk keeps the *last* `depth` levels it visits.
    /// An empty book (both best offsets zero) performs no walker calls.
    pub async fn order_book(&self, perp: &Perpetual, depth: usize) -> Result<OrderBook> {
        let mut book = OrderBook { total_orders: perp.total_orders, ..Default::default() };
        if perp.has_empty_book() {
            return Ok(book);
        }

        let mut cur = perp.max_bid_ons;
        let mut visited = 0usize;
        while cur != 0 && book.bids.len() < depth && visited < BOOK_WALK_MAX_LEVELS {
            let volume = self.get_volume_at_book_price(perp.id, cur).await?;
            if volume > 0 {
                book.bids.push(BookLevel {
                    price_pns: units::pns_from_ons(cur, perp.base_price_pns),
                    volume_lns: volume,
                });
            }
            cur = self.get_next_price_below_with_orders(perp.id, cur).await?;
            visited += 1;
        }

        let mut tail = AskTail::new(depth);
        let mut cur = perp.max_ask_ons;
        let mut visited = 0usize;
        while cur != 0 && visited < BOOK_WALK_MAX_LEVELS {
            let volume = self.get_volume_at_book_price(perp.id, cur).await?;
            if volume > 0 {
                tail.push(BookLevel {
                    price_pns: units::pns_from_ons(cur, perp.base_price_pns),
                    volume_lns: volume,
                });
            }
            cur = self.get_next_price_below_with_orders(perp.id, cur).await?;
            visited += 1;
        }
        book.asks = tail.into_best_first();

        debug!(
            perp = perp.id,
            bids = book.bids.len(),
            asks = book.asks.len(),
            "book walk complete"
        );
        Ok(book)
    }

    // ==================== Writes ====================

    pub async fn exec_order(&self, desc: &OrderDescriptor) -> Result<B256> {
        desc.validate()?;
        let calldata = self.exchange.execOrder(desc.to_abi()).calldata().clone();
        self.dispatch(calldata).await
    }

    /// Batched execution. A revert here may simply mean the batch entry
    /// point is unavailable to user accounts; callers fall back to
    /// sequential singles.
    pub async fn exec_orders(
        &self,
        descs: &[OrderDescriptor],
        revert_on_fail: bool,
    ) -> Result<B256> {
        for desc in descs {
            desc.validate()?;
        }
        let abi_descs: Vec<_> = descs.iter().map(OrderDescriptor::to_abi).collect();
        let calldata = self
            .exchange
            .execOrders(abi_descs, revert_on_fail)
            .calldata()
            .clone();
        self.dispatch(calldata).await
    }

    pub async fn deposit_collateral(&self, amount_cns: Cns) -> Result<B256> {
        let calldata = self.exchange.depositCollateral(amount_cns).calldata().clone();
        self.dispatch(calldata).await
    }

    pub async fn increase_position_collateral(
        &self,
        perp_id: PerpetualId,
        amount_cns: Cns,
    ) -> Result<B256> {
        let calldata = self
            .exchange
            .increasePositionCollateral(perp_id, amount_cns)
            .calldata()
            .clone();
        self.dispatch(calldata).await
    }

    pub async fn request_decrease_position_collateral(
        &self,
        perp_id: PerpetualId,
        amount_cns: Cns,
    ) -> Result<B256> {
        let calldata = self
            .exchange
            .requestDecreasePositionCollateral(perp_id, amount_cns)
            .calldata()
            .clone();
        self.dispatch(calldata).await
    }

    pub async fn decrease_position_collateral(
        &self,
        perp_id: PerpetualId,
        amount_cns: Cns,
        clamp_to_maximum: bool,
    ) -> Result<B256> {
        let calldata = self
            .exchange
            .decreasePositionCollateral(perp_id, amount_cns, clamp_to_maximum)
            .calldata()
            .clone();
        self.dispatch(calldata).await
    }

    /// Owner-side proxy administration: authorize (or revoke) the trading
    /// selectors the operator key may forward.
    pub async fn set_operator_allowlist(
        &self,
        selectors: Vec<FixedBytes<4>>,
        allowed: bool,
    ) -> Result<B256> {
        let proxy = self.proxy.as_ref().ok_or_else(|| {
            PerplError::InvalidRequest("no account proxy configured".into())
        })?;
        let pending = proxy
            .setOperatorAllowlist(selectors, allowed)
            .send()
            .await
            .map_err(call_error)?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| PerplError::Network(e.to_string()))?;
        Ok(receipt.transaction_hash)
    }

    async fn dispatch(&self, calldata: Bytes) -> Result<B256> {
        if let Some(proxy) = &self.proxy {
            let pending = proxy.forward(calldata).send().await.map_err(call_error)?;
            let receipt = pending
                .get_receipt()
                .await
                .map_err(|e| PerplError::Network(e.to_string()))?;
            Ok(receipt.transaction_hash)
        } else {
            let tx = TransactionRequest::default()
                .with_to(self.exchange_address)
                .with_input(calldata);
            let pending = self
                .exchange
                .provider()
                .send_transaction(tx)
                .await
                .map_err(|e| send_error(e.to_string()))?;
            let receipt = pending
                .get_receipt()
                .await
                .map_err(|e| PerplError::Network(e.to_string()))?;
            Ok(receipt.transaction_hash)
        }
    }

    /// Open orders as a map key check: true iff the id came from the
    /// contract's open-order set.
    pub async fn has_open_order(
        &self,
        perp_id: PerpetualId,
        account_id: AccountId,
        order_id: OrderId,
    ) -> Result<bool> {
        let orders = self.get_open_orders(perp_id, account_id).await?;
        Ok(orders.iter().any(|order| order.id == order_id))
    }
}

fn call_error(e: alloy::contract::Error) -> PerplError {
    send_error(e.to_string())
}

fn send_error(msg: String) -> PerplError {
    if msg.contains("revert") {
        PerplError::Reverted(msg)
    } else {
        PerplError::Network(msg)
    }
}

/// Rolling window over the ask walk keeping the last `depth` levels,
/// returned best-first (lowest price first).
struct AskTail {
    levels: VecDeque<BookLevel>,
    depth: usize,
}

impl AskTail {
    fn new(depth: usize) -> Self {
        Self { levels: VecDeque::with_capacity(depth.min(64)), depth }
    }

    fn push(&mut self, level: BookLevel) {
        if self.depth == 0 {
            return;
        }
        if self.levels.len() == self.depth {
            self.levels.pop_front();
        }
        self.levels.push_back(level);
    }

    fn into_best_first(self) -> Vec<BookLevel> {
        // The walk runs from the worst ask downward, so the deque is
        // descending by price; the best ask is at the back.
        self.levels.into_iter().rev().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price_pns: Pns, volume_lns: Lns) -> BookLevel {
        BookLevel { price_pns, volume_lns }
    }

    #[test]
    fn ask_tail_keeps_levels_closest_to_the_spread() {
        // Walk visits ONS 60000, 58000, 55000, 53000, 51000 (base 0).
        let mut tail = AskTail::new(3);
        for ons in [60_000, 58_000, 55_000, 53_000, 51_000] {
            tail.push(level(ons, 10_000));
        }
        let asks = tail.into_best_first();
        let prices: Vec<Pns> = asks.iter().map(|l| l.price_pns).collect();
        assert_eq!(prices, vec![51_000, 53_000, 55_000]);
    }

    #[test]
    fn ask_tail_with_fewer_levels_than_depth() {
        let mut tail = AskTail::new(5);
        tail.push(level(51_000, 1));
        tail.push(level(50_000, 2));
        let asks = tail.into_best_first();
        assert_eq!(asks.len(), 2);
        assert_eq!(asks[0].price_pns, 50_000);
    }

    #[test]
    fn zero_depth_keeps_nothing() {
        let mut tail = AskTail::new(0);
        tail.push(level(51_000, 1));
        assert!(tail.into_best_first().is_empty());
    }

    #[test]
    fn revert_strings_map_to_reverted() {
        assert!(matches!(
            send_error("execution reverted: paused".into()),
            PerplError::Reverted(_)
        ));
        assert!(matches!(
            send_error("connection refused".into()),
            PerplError::Network(_)
        ));
    }
}
