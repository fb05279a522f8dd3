use serde::{Deserialize, Serialize};

use crate::abi;
use crate::units::{self, Cns, Lns, Ons, Pns};

use super::PerpetualId;

/// Perpetual contract tradeable at the exchange. Read-only from the
/// client's perspective; mutated only on chain.
#[derive(Debug, Clone)]
pub struct Perpetual {
    pub id: PerpetualId,
    pub name: String,
    pub symbol: String,
    pub price_decimals: u8,
    pub lot_decimals: u8,
    pub base_price_pns: Pns,

    pub mark_pns: Pns,
    pub oracle_pns: Pns,
    pub mark_timestamp: u64,
    pub oracle_timestamp: u64,

    pub funding_rate_per_100k: i64,
    pub funding_start_block: u64,

    pub long_open_interest_lns: Lns,
    pub short_open_interest_lns: Lns,

    // Book summary, in offsets from the base price.
    pub max_bid_ons: Ons,
    pub min_bid_ons: Ons,
    pub max_ask_ons: Ons,
    pub min_ask_ons: Ons,
    pub total_orders: u64,

    pub paused: bool,
}

impl Perpetual {
    pub fn from_abi(id: PerpetualId, info: &abi::Exchange::PerpetualInfo) -> Self {
        Self {
            id,
            name: info.name.clone(),
            symbol: info.symbol.clone(),
            price_decimals: info.priceDecimals,
            lot_decimals: info.lotDecimals,
            base_price_pns: info.basePricePNS,
            mark_pns: info.markPNS,
            oracle_pns: info.oraclePNS,
            mark_timestamp: info.markTimestamp,
            oracle_timestamp: info.oracleTimestampSec,
            funding_rate_per_100k: info.fundingRatePer100K,
            funding_start_block: info.fundingStartBlock,
            long_open_interest_lns: info.longOpenInterestLNS,
            short_open_interest_lns: info.shortOpenInterestLNS,
            max_bid_ons: info.maxBidPriceONS,
            min_bid_ons: info.minBidPriceONS,
            max_ask_ons: info.maxAskPriceONS,
            min_ask_ons: info.minAskPriceONS,
            total_orders: info.totalOrders,
            paused: info.paused,
        }
    }

    pub fn mark_price(&self) -> f64 {
        units::pns_to_price(self.mark_pns, self.price_decimals)
    }

    pub fn oracle_price(&self) -> f64 {
        units::pns_to_price(self.oracle_pns, self.price_decimals)
    }

    pub fn funding_rate_percent(&self) -> f64 {
        units::funding_per_100k_to_percent(self.funding_rate_per_100k)
    }

    /// An empty book is signalled by both best offsets being zero.
    pub fn has_empty_book(&self) -> bool {
        self.max_bid_ons == 0 && self.max_ask_ons == 0
    }

    pub fn pns(&self, price: f64) -> Pns {
        units::price_to_pns(price, self.price_decimals)
    }

    pub fn lns(&self, lot: f64) -> Lns {
        units::lot_to_lns(lot, self.lot_decimals)
    }
}

/// One price level of a walked order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookLevel {
    pub price_pns: Pns,
    pub volume_lns: Lns,
}

/// Order book reconstructed from the chain-side walk primitives.
/// Bids and asks are both sorted best-first (highest bid, lowest ask).
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub total_orders: u64,
}

impl OrderBook {
    /// Best-ask minus best-bid, `None` while either side is empty.
    pub fn spread_pns(&self) -> Option<Pns> {
        let best_bid = self.bids.first()?.price_pns;
        let best_ask = self.asks.first()?.price_pns;
        Some(best_ask.saturating_sub(best_bid))
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// OHLCV candle as returned by the market-data endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    /// Open time, milliseconds.
    pub t: u64,
    pub o: f64,
    pub c: f64,
    pub h: f64,
    pub l: f64,
    /// Volume in display units.
    pub v: f64,
    /// Number of trades.
    pub n: u64,
}

/// Fee schedule of a perpetual, both legs in per-100k units.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeeSchedule {
    pub maker_per_100k: u64,
    pub taker_per_100k: u64,
}

impl FeeSchedule {
    pub fn maker_percent(&self) -> f64 {
        self.maker_per_100k as f64 / 1000.0
    }

    pub fn taker_percent(&self) -> f64 {
        self.taker_per_100k as f64 / 1000.0
    }

    /// Fee in CNS for a fill of the given notional value.
    pub fn taker_fee_cns(&self, notional_cns: u128) -> Cns {
        (notional_cns * self.taker_per_100k as u128 / 100_000) as Cns
    }

    pub fn maker_fee_cns(&self, notional_cns: u128) -> Cns {
        (notional_cns * self.maker_per_100k as u128 / 100_000) as Cns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_book_is_signalled_by_zero_best_offsets() {
        let mut perp = Perpetual {
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
            funding_rate_per_100k: 125,
            funding_start_block: 0,
            long_open_interest_lns: 0,
            short_open_interest_lns: 0,
            max_bid_ons: 0,
            min_bid_ons: 0,
            max_ask_ons: 0,
            min_ask_ons: 0,
            total_orders: 7,
            paused: false,
        };
        assert!(perp.has_empty_book());

        perp.max_bid_ons = 49_000;
        assert!(!perp.has_empty_book());
    }

    #[test]
    fn spread_requires_both_sides() {
        let mut book = OrderBook { total_orders: 3, ..Default::default() };
        assert_eq!(book.spread_pns(), None);

        book.bids.push(BookLevel { price_pns: 949_000, volume_lns: 10_000 });
        assert_eq!(book.spread_pns(), None);

        book.asks.push(BookLevel { price_pns: 951_000, volume_lns: 5_000 });
        assert_eq!(book.spread_pns(), Some(2_000));
    }

    #[test]
    fn fee_schedule_display_conversions() {
        let fees = FeeSchedule { maker_per_100k: 100, taker_per_100k: 450 };
        assert_eq!(fees.maker_percent(), 0.1);
        assert_eq!(fees.taker_percent(), 0.45);
        // 47500.0 notional in CNS -> taker fee 213.75
        assert_eq!(fees.taker_fee_cns(47_500_000_000), 213_750_000);
    }
}
