//! Tool catalogue and dispatch for the agent loop.
//!
//! Read tools route through the hybrid router (and the tracker when its
//! snapshot is fresh). Write tools carry an explicit confirmation
//! contract in their descriptions; enforcement is policy in the system
//! prompt, not a hard gate here.

use std::sync::Arc;
use std::time::Duration;

use alloy::providers::Provider;
use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use perpl_client::types::ws::WsEvent;
use perpl_client::types::{PerpetualId, Position};
use perpl_client::units;
use perpl_client::WsClient;

use crate::config::BotConfig;
use crate::liquidation::{ForkSimulator, SimConfig, math};
use crate::router::{ClosePositionRequest, HybridRouter, OpenPositionRequest};
use crate::tracker::StateTracker;

use super::llm::ToolSpec;

/// Tracker snapshots older than this force a contract refresh.
const TRACKER_MAX_AGE_MS: u64 = 5_000;
const DEFAULT_BOOK_DEPTH: usize = 10;
const DEFAULT_TRADES_LIMIT: usize = 20;
const TRADES_WAIT: Duration = Duration::from_secs(5);

pub struct ToolContext {
    pub router: Arc<HybridRouter>,
    pub tracker: Option<Arc<StateTracker>>,
    pub config: Arc<BotConfig>,
}

pub fn catalogue() -> Vec<ToolSpec> {
    let market_arg = json!({
        "type": "object",
        "properties": {
            "market": { "type": "string", "description": "Market symbol or numeric id" }
        },
        "required": ["market"]
    });

    vec![
        ToolSpec {
            name: "account_summary".into(),
            description: "Balance, locked, available, equity and unrealized PnL of the trading account.".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ToolSpec {
            name: "positions".into(),
            description: "Open positions across all markets.".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ToolSpec {
            name: "markets".into(),
            description: "All tradeable markets with decimals, margins, fees and current marks.".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ToolSpec {
            name: "open_orders".into(),
            description: "Resting orders, optionally filtered to one market. Order ids are contract ids.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "market": { "type": "string", "description": "Optional market symbol or id" }
                }
            }),
        },
        ToolSpec {
            name: "funding_info".into(),
            description: "Current funding rate and schedule for a market.".into(),
            input_schema: market_arg.clone(),
        },
        ToolSpec {
            name: "liquidation_analysis".into(),
            description: "Liquidation price for the account's position on a market: closed-form estimate plus a fork-verified boundary when the fork binary is available.".into(),
            input_schema: market_arg.clone(),
        },
        ToolSpec {
            name: "trading_fees".into(),
            description: "Maker and taker fees for a market.".into(),
            input_schema: market_arg.clone(),
        },
        ToolSpec {
            name: "order_book".into(),
            description: "Order book levels for a market.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "market": { "type": "string" },
                    "depth": { "type": "integer", "description": "Levels per side, default 10" }
                },
                "required": ["market"]
            }),
        },
        ToolSpec {
            name: "recent_trades".into(),
            description: "Recent trades on a market.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "market": { "type": "string" },
                    "limit": { "type": "integer", "description": "Max trades, default 20" }
                },
                "required": ["market"]
            }),
        },
        ToolSpec {
            name: "debug_transaction".into(),
            description: "Inspect a transaction by hash: status, gas, logs.".into(),
            input_schema: json!({
                "type": "object",
                "properties": { "hash": { "type": "string" } },
                "required": ["hash"]
            }),
        },
        ToolSpec {
            name: "simulate_strategy".into(),
            description: "Estimate levels, margin and fees for a grid or market-making strategy. Pure simulation, nothing is placed.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "market": { "type": "string" },
                    "strategy": { "type": "string", "enum": ["grid", "mm"] },
                    "size": { "type": "number", "description": "Total size in contracts" },
                    "leverage": { "type": "number" },
                    "levels": { "type": "integer", "description": "Levels per side, default 5" },
                    "spacing_pct": { "type": "number", "description": "Grid spacing percent, default 0.5" },
                    "spread_bps": { "type": "number", "description": "MM quote spread in bps, default 10" }
                },
                "required": ["market", "strategy", "size", "leverage"]
            }),
        },
        ToolSpec {
            name: "dry_run_trade".into(),
            description: "Validate a prospective trade without placing it: required margin, fees, estimated liquidation price, balance check.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "market": { "type": "string" },
                    "side": { "type": "string", "enum": ["long", "short"] },
                    "size": { "type": "number" },
                    "leverage": { "type": "number" },
                    "price": { "type": "number", "description": "Optional limit price" }
                },
                "required": ["market", "side", "size", "leverage"]
            }),
        },
        ToolSpec {
            name: "open_position".into(),
            description: "WRITE: open a long or short position. Requires explicit user confirmation in the conversation before calling.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "market": { "type": "string" },
                    "side": { "type": "string", "enum": ["long", "short"] },
                    "size": { "type": "number" },
                    "leverage": { "type": "number" },
                    "price": { "type": "number", "description": "Optional limit price; omit for market order" },
                    "post_only": { "type": "boolean" }
                },
                "required": ["market", "side", "size", "leverage"]
            }),
        },
        ToolSpec {
            name: "close_position".into(),
            description: "WRITE: close (part of) a position. Requires explicit user confirmation in the conversation before calling.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "market": { "type": "string" },
                    "size": { "type": "number", "description": "Optional partial size; omit to close fully" },
                    "price": { "type": "number", "description": "Optional limit price" }
                },
                "required": ["market"]
            }),
        },
        ToolSpec {
            name: "cancel_order".into(),
            description: "WRITE: cancel a resting order by its contract order id. Requires explicit user confirmation in the conversation before calling.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "market": { "type": "string" },
                    "order_id": { "type": "integer" }
                },
                "required": ["market", "order_id"]
            }),
        },
    ]
}

pub async fn execute(ctx: &ToolContext, name: &str, input: &Value) -> Result<Value> {
    match name {
        "account_summary" => account_summary(ctx).await,
        "positions" => positions(ctx).await,
        "markets" => markets(ctx).await,
        "open_orders" => open_orders(ctx, input).await,
        "funding_info" => funding_info(ctx, input).await,
        "liquidation_analysis" => liquidation_analysis(ctx, input).await,
        "trading_fees" => trading_fees(ctx, input).await,
        "order_book" => order_book(ctx, input).await,
        "recent_trades" => recent_trades(ctx, input).await,
        "debug_transaction" => debug_transaction(ctx, input).await,
        "simulate_strategy" => simulate_strategy(ctx, input).await,
        "dry_run_trade" => dry_run_trade(ctx, input).await,
        "open_position" => open_position(ctx, input).await,
        "close_position" => close_position(ctx, input).await,
        "cancel_order" => cancel_order(ctx, input).await,
        _ => Err(anyhow!("unknown tool '{name}'")),
    }
}

// ==================== Input helpers ====================

fn str_field<'a>(input: &'a Value, field: &str) -> Result<&'a str> {
    input[field]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("missing '{field}'"))
}

fn f64_field(input: &Value, field: &str) -> Result<f64> {
    input[field].as_f64().ok_or_else(|| anyhow!("missing '{field}'"))
}

async fn resolve_market(ctx: &ToolContext, input: &Value) -> Result<PerpetualId> {
    ctx.router.resolve_market(str_field(input, "market")?).await
}

fn fresh_tracker(ctx: &ToolContext) -> Option<&Arc<StateTracker>> {
    ctx.tracker.as_ref().filter(|t| !t.is_stale(TRACKER_MAX_AGE_MS))
}

fn position_json(position: &Position, price_decimals: u8) -> Value {
    let lot_decimals = perpl_client::constants::CNS_DECIMALS.saturating_sub(price_decimals);
    json!({
        "market_id": position.perpetual_id,
        "side": position.position_type,
        "entry_price": units::pns_to_price(position.entry_pns, price_decimals),
        "size": units::lns_to_lot(position.lot_lns, lot_decimals),
        "collateral": units::cns_to_amount(position.deposit_cns),
        "unrealized_pnl": position.pnl_cns as f64 / 1e6,
        "pnl_percent": position.pnl_percent(),
    })
}

// ==================== Read tools ====================

async fn account_summary(ctx: &ToolContext) -> Result<Value> {
    if let Some(tracker) = fresh_tracker(ctx) {
        return Ok(json!({
            "source": "stream",
            "balance": tracker.balance(),
            "locked": tracker.locked(),
            "available": tracker.available(),
            "unrealized_pnl": tracker.total_unrealized_pnl(),
            "equity": tracker.total_equity(),
        }));
    }
    let account = ctx.router.get_account().await?;
    Ok(json!({
        "source": "contract",
        "account_id": account.id,
        "balance": account.balance(),
        "locked": account.locked(),
        "available": account.available(),
    }))
}

async fn positions(ctx: &ToolContext) -> Result<Value> {
    let markets = ctx.router.markets().await?;
    let account = ctx.router.get_account().await?;
    let perp_ids: Vec<PerpetualId> = markets.iter().map(|m| m.id).collect();
    let positions = ctx.router.get_positions(account.id, &perp_ids).await?;

    let rows: Vec<Value> = positions
        .iter()
        .map(|position| {
            let decimals = markets
                .iter()
                .find(|m| m.id == position.perpetual_id)
                .map(|m| m.config.price_decimals)
                .unwrap_or(0);
            position_json(position, decimals)
        })
        .collect();
    Ok(json!({ "positions": rows }))
}

async fn markets(ctx: &ToolContext) -> Result<Value> {
    let markets = ctx.router.markets().await?;
    let mut rows = Vec::with_capacity(markets.len());
    for market in &markets {
        let perp = ctx.router.get_perpetual(market.id).await?;
        rows.push(json!({
            "id": market.id,
            "symbol": market.symbol,
            "name": market.name,
            "mark_price": perp.mark_price(),
            "oracle_price": perp.oracle_price(),
            "funding_rate_percent": perp.funding_rate_percent(),
            "paused": perp.paused,
            "maker_fee_per_100k": market.config.maker_fee_per_100k,
            "taker_fee_per_100k": market.config.taker_fee_per_100k,
        }));
    }
    Ok(json!({ "markets": rows }))
}

async fn open_orders(ctx: &ToolContext, input: &Value) -> Result<Value> {
    let account = ctx.router.get_account().await?;
    let perp_ids: Vec<PerpetualId> = match input["market"].as_str() {
        Some(market) if !market.is_empty() => vec![ctx.router.resolve_market(market).await?],
        _ => ctx.router.markets().await?.iter().map(|m| m.id).collect(),
    };

    let mut rows = Vec::new();
    for perp_id in perp_ids {
        let perp = ctx.router.get_perpetual(perp_id).await?;
        for order in ctx.router.get_open_orders(perp_id, account.id).await? {
            rows.push(json!({
                "order_id": order.id,
                "market_id": order.perpetual_id,
                "type": order.order_type,
                "price": units::pns_to_price(order.price_pns, perp.price_decimals),
                "size": units::lns_to_lot(order.lot_lns, perp.lot_decimals),
                "filled": units::lns_to_lot(order.filled_lns, perp.lot_decimals),
                "status": order.status,
            }));
        }
    }
    Ok(json!({ "orders": rows }))
}

async fn funding_info(ctx: &ToolContext, input: &Value) -> Result<Value> {
    let perp_id = resolve_market(ctx, input).await?;
    let perp = ctx.router.get_perpetual(perp_id).await?;
    Ok(json!({
        "market_id": perp.id,
        "symbol": perp.symbol,
        "funding_rate_per_100k": perp.funding_rate_per_100k,
        "funding_rate_percent": perp.funding_rate_percent(),
        "funding_start_block": perp.funding_start_block,
        "long_open_interest": units::lns_to_lot(perp.long_open_interest_lns, perp.lot_decimals),
        "short_open_interest": units::lns_to_lot(perp.short_open_interest_lns, perp.lot_decimals),
    }))
}

async fn liquidation_analysis(ctx: &ToolContext, input: &Value) -> Result<Value> {
    let perp_id = resolve_market(ctx, input).await?;
    let account = ctx.router.get_account().await?;
    let perp = ctx.router.get_perpetual(perp_id).await?;
    let (position, mark_pns) = ctx.router.get_mark(perp_id, account.id).await?;
    if !position.is_open() {
        return Ok(json!({ "error": "no open position on this market" }));
    }

    let maint_hdths = ctx.router.get_maintenance_margin_hdths(perp_id).await?;
    let maintenance_margin = maint_hdths as f64 / 10_000.0;
    let math_price =
        math::position_liquidation_price(&position, perp.price_decimals, maintenance_margin);
    let mark_price = units::pns_to_price(mark_pns, perp.price_decimals);

    // Fork verification is best-effort: the closed form is always there.
    let simulator = ForkSimulator::new(
        ctx.config.anvil_path.clone(),
        ctx.config.rpc_url.clone(),
        ctx.config.exchange_address,
        SimConfig { maintenance_margin, ..SimConfig::default() },
    );
    let (fork_price, divergence_pct, fork_note) =
        match simulator.simulate(perp_id, account.id).await {
            Ok(report) => (report.fork_price, report.divergence_pct, None),
            Err(e) => (None, None, Some(e.to_string())),
        };

    let report_line = match (math_price, fork_price) {
        (Some(math), Some(fork)) => format!(
            "{}: mark {mark_price:.2}, closed-form liquidation {math:.2}, fork-verified {fork:.2} ({:+.3}% divergence)",
            perp.symbol,
            divergence_pct.unwrap_or(0.0)
        ),
        (Some(math), None) => format!(
            "{}: mark {mark_price:.2}, closed-form liquidation {math:.2} (fork verification unavailable)",
            perp.symbol
        ),
        _ => format!("{}: no liquidation boundary (position fully collateralized)", perp.symbol),
    };

    Ok(json!({
        "market_id": perp_id,
        "side": position.position_type,
        "mark_price": mark_price,
        "maintenance_margin": maintenance_margin,
        "math_price": math_price,
        "fork_price": fork_price,
        "divergence_pct": divergence_pct,
        "fork_error": fork_note,
        "_report": report_line,
    }))
}

async fn trading_fees(ctx: &ToolContext, input: &Value) -> Result<Value> {
    let perp_id = resolve_market(ctx, input).await?;
    let fees = ctx.router.get_fees(perp_id).await?;
    Ok(json!({
        "market_id": perp_id,
        "maker_percent": fees.maker_percent(),
        "taker_percent": fees.taker_percent(),
    }))
}

async fn order_book(ctx: &ToolContext, input: &Value) -> Result<Value> {
    let perp_id = resolve_market(ctx, input).await?;
    let depth = input["depth"].as_u64().map(|d| d as usize).unwrap_or(DEFAULT_BOOK_DEPTH);
    let perp = ctx.router.get_perpetual(perp_id).await?;
    let book = ctx.router.get_order_book(perp_id, depth).await?;

    let side = |levels: &[perpl_client::types::BookLevel]| -> Vec<Value> {
        levels
            .iter()
            .map(|level| {
                json!({
                    "price": units::pns_to_price(level.price_pns, perp.price_decimals),
                    "volume": units::lns_to_lot(level.volume_lns, perp.lot_decimals),
                })
            })
            .collect()
    };

    Ok(json!({
        "market_id": perp_id,
        "bids": side(&book.bids),
        "asks": side(&book.asks),
        "total_orders": book.total_orders,
        "spread": book.spread_pns().map(|s| units::pns_to_price(s, perp.price_decimals)),
    }))
}

/// Trades are only available on the market-data stream, so take a
/// short-lived subscription and wait for the snapshot.
async fn recent_trades(ctx: &ToolContext, input: &Value) -> Result<Value> {
    let perp_id = resolve_market(ctx, input).await?;
    let limit = input["limit"].as_u64().map(|l| l as usize).unwrap_or(DEFAULT_TRADES_LIMIT);
    let perp = ctx.router.get_perpetual(perp_id).await?;

    let ws = WsClient::market_data(&ctx.config.ws_url, ctx.config.chain_id);
    let mut events = ws.events();
    ws.connect().await?;
    ws.subscribe_trades(perp_id).await?;

    let trades = tokio::time::timeout(TRADES_WAIT, async {
        while let Some(event) = events.recv().await {
            if let WsEvent::TradesSnapshot(frame) | WsEvent::TradesUpdate(frame) = event {
                if frame.pid == perp_id {
                    return Some(frame.tr);
                }
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
    .unwrap_or_default();
    ws.close().await;

    let rows: Vec<Value> = trades
        .iter()
        .rev()
        .take(limit)
        .map(|trade| {
            json!({
                "price": units::pns_to_price(trade.p, perp.price_decimals),
                "size": units::lns_to_lot(trade.l, perp.lot_decimals),
                "taker_buy": trade.tk,
                "timestamp_ms": trade.ts,
            })
        })
        .collect();
    Ok(json!({ "market_id": perp_id, "trades": rows }))
}

async fn debug_transaction(ctx: &ToolContext, input: &Value) -> Result<Value> {
    let hash = str_field(input, "hash")?;
    let receipt: Value = ctx
        .router
        .provider()
        .raw_request("eth_getTransactionReceipt".into(), (hash.to_string(),))
        .await
        .map_err(|e| anyhow!("receipt lookup failed: {e}"))?;

    if receipt.is_null() {
        return Ok(json!({ "hash": hash, "status": "not_found" }));
    }
    let success = receipt["status"].as_str() == Some("0x1");
    Ok(json!({
        "hash": hash,
        "status": if success { "success" } else { "reverted" },
        "block": receipt["blockNumber"],
        "gas_used": receipt["gasUsed"],
        "logs": receipt["logs"].as_array().map(|l| l.len()).unwrap_or(0),
    }))
}

// ==================== Simulation tools ====================

async fn simulate_strategy(ctx: &ToolContext, input: &Value) -> Result<Value> {
    let perp_id = resolve_market(ctx, input).await?;
    let strategy = str_field(input, "strategy")?;
    let size = f64_field(input, "size")?;
    let leverage = f64_field(input, "leverage")?;
    let perp = ctx.router.get_perpetual(perp_id).await?;
    let fees = ctx.router.get_fees(perp_id).await?;
    let mark = perp.mark_price();

    match strategy {
        "grid" => {
            let levels = input["levels"].as_u64().unwrap_or(5) as usize;
            let spacing_pct = input["spacing_pct"].as_f64().unwrap_or(0.5);
            let per_level = size / levels as f64;

            let mut buys = Vec::new();
            let mut sells = Vec::new();
            for i in 1..=levels {
                let offset = mark * spacing_pct / 100.0 * i as f64;
                buys.push(json!({ "price": mark - offset, "size": per_level }));
                sells.push(json!({ "price": mark + offset, "size": per_level }));
            }
            let notional = size * mark;
            Ok(json!({
                "strategy": "grid",
                "market_id": perp_id,
                "mark_price": mark,
                "buy_levels": buys,
                "sell_levels": sells,
                "required_margin": notional / leverage,
                "fees_if_all_filled": notional * fees.maker_percent() / 100.0,
            }))
        }
        "mm" => {
            let spread_bps = input["spread_bps"].as_f64().unwrap_or(10.0);
            let half = mark * spread_bps / 10_000.0 / 2.0;
            let notional = size * mark;
            Ok(json!({
                "strategy": "mm",
                "market_id": perp_id,
                "mark_price": mark,
                "bid": mark - half,
                "ask": mark + half,
                "quote_size": size / 2.0,
                "required_margin": notional / leverage,
                "round_trip_fee": notional * fees.maker_percent() / 100.0 * 2.0,
                "gross_spread_capture": size * half * 2.0,
            }))
        }
        other => Err(anyhow!("unknown strategy '{other}' (expected grid or mm)")),
    }
}

async fn dry_run_trade(ctx: &ToolContext, input: &Value) -> Result<Value> {
    let perp_id = resolve_market(ctx, input).await?;
    let side = str_field(input, "side")?;
    let long = side == "long";
    let size = f64_field(input, "size")?;
    let leverage = f64_field(input, "leverage")?;
    let perp = ctx.router.get_perpetual(perp_id).await?;
    let fees = ctx.router.get_fees(perp_id).await?;
    let account = ctx.router.get_account().await?;

    let price = input["price"].as_f64().unwrap_or_else(|| perp.mark_price());
    let notional = size * price;
    let required_margin = notional / leverage.max(1.0);
    let fee = notional
        * if input["price"].is_null() { fees.taker_percent() } else { fees.maker_percent() }
        / 100.0;

    let maint_hdths = ctx.router.get_maintenance_margin_hdths(perp_id).await?;
    let liquidation = math::liquidation_price(&math::ClosedFormInputs {
        entry_price: price,
        size,
        collateral: required_margin,
        maintenance_margin: maint_hdths as f64 / 10_000.0,
        long,
    });

    Ok(json!({
        "market_id": perp_id,
        "side": side,
        "entry_price": price,
        "notional": notional,
        "required_margin": required_margin,
        "estimated_fee": fee,
        "estimated_liquidation_price": liquidation,
        "available_balance": account.available(),
        "sufficient_balance": account.available() >= required_margin + fee,
    }))
}

// ==================== Write tools ====================

async fn open_position(ctx: &ToolContext, input: &Value) -> Result<Value> {
    let request = OpenPositionRequest {
        market: resolve_market(ctx, input).await?,
        long: str_field(input, "side")? == "long",
        size: f64_field(input, "size")?,
        price: input["price"].as_f64(),
        leverage: f64_field(input, "leverage")?,
        post_only: input["post_only"].as_bool().unwrap_or(false),
    };
    let receipt = ctx.router.open_position(&request).await?;
    Ok(json!({
        "tx_hash": format!("{:#x}", receipt.tx_hash),
        "market_id": request.market,
        "side": if request.long { "long" } else { "short" },
        "size": request.size,
        "order_type": receipt.descriptor.order_type,
    }))
}

async fn close_position(ctx: &ToolContext, input: &Value) -> Result<Value> {
    let account = ctx.router.get_account().await?;
    let request = ClosePositionRequest {
        market: resolve_market(ctx, input).await?,
        size: input["size"].as_f64(),
        price: input["price"].as_f64(),
    };
    let receipt = ctx.router.close_position(account.id, &request).await?;
    Ok(json!({
        "tx_hash": format!("{:#x}", receipt.tx_hash),
        "market_id": request.market,
        "order_type": receipt.descriptor.order_type,
    }))
}

async fn cancel_order(ctx: &ToolContext, input: &Value) -> Result<Value> {
    let perp_id = resolve_market(ctx, input).await?;
    let order_id = input["order_id"]
        .as_u64()
        .ok_or_else(|| anyhow!("missing 'order_id'"))?;
    let receipt = ctx
        .router
        .cancel_order(perp_id, perpl_client::types::OrderId(order_id))
        .await?;
    Ok(json!({
        "tx_hash": format!("{:#x}", receipt.tx_hash),
        "market_id": perp_id,
        "cancelled_order_id": order_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_names_are_unique_and_complete() {
        let tools = catalogue();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), 15);
        let mut deduped = names.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len());

        for expected in [
            "account_summary",
            "positions",
            "markets",
            "open_orders",
            "funding_info",
            "liquidation_analysis",
            "trading_fees",
            "order_book",
            "recent_trades",
            "debug_transaction",
            "simulate_strategy",
            "dry_run_trade",
            "open_position",
            "close_position",
            "cancel_order",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
    }

    #[test]
    fn write_tools_document_the_confirmation_contract() {
        for tool in catalogue() {
            if ["open_position", "close_position", "cancel_order"].contains(&tool.name.as_str()) {
                assert!(
                    tool.description.contains("confirmation"),
                    "{} must state the confirmation rule",
                    tool.name
                );
            }
        }
    }
}
