//! Fork-based liquidation verifier.
//!
//! Spawns an Anvil fork of the live chain, discovers the packed storage
//! word holding the perpetual's mark/oracle prices by tracing
//! `getPerpetualInfo` and probing candidate slots, then sweeps and
//! binary-searches the exact price at which the position becomes
//! liquidatable under the contract's own solvency rule.
//!
//! Layout discovery re-runs on every simulation — the exchange may be
//! upgraded between runs, so offsets are never cached.

use alloy::node_bindings::Anvil;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use perpl_client::abi::Exchange;
use perpl_client::units::{self, Pns, word_window, word_with_window};

use super::{SimError, math};

type Result<T> = std::result::Result<T, SimError>;

/// Probe written into candidate mark windows. Distinctive, fits 32 bits,
/// and far from any plausible live price.
const MARK_PROBE: u32 = 0x00A1_B2C3;
const ORACLE_PROBE: u32 = 0x00D4_E5F6;
/// Offset applied to the wall clock for the timestamp probe.
const TS_PROBE_SKEW_SECS: u32 = 777_777;
/// Plausibility window for the oracle-timestamp heuristic.
const ONE_YEAR_SECS: i64 = 31_536_000;

#[derive(Debug, Clone, Serialize)]
pub struct SimConfig {
    /// Half-width of the sweep range as a percent of the current mark.
    pub price_range_pct: f64,
    /// Number of sweep points.
    pub price_steps: usize,
    pub binary_search_iterations: u32,
    pub anvil_timeout_ms: u64,
    /// Maintenance margin fraction assumed by both models.
    pub maintenance_margin: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            price_range_pct: 30.0,
            price_steps: 20,
            binary_search_iterations: 10,
            anvil_timeout_ms: 30_000,
            maintenance_margin: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidationReport {
    pub long: bool,
    pub mark_price: f64,
    /// Closed-form estimate, display units.
    pub math_price: Option<f64>,
    /// Fork-verified boundary, display units.
    pub fork_price: Option<f64>,
    /// fork - math.
    pub divergence_abs: Option<f64>,
    /// (fork - math) / math * 100.
    pub divergence_pct: Option<f64>,
    /// The position was liquidatable at the current mark; the sweep was
    /// skipped and the mark reported as the boundary.
    pub already_liquidatable: bool,
}

/// Discovered layout of the packed price word.
#[derive(Debug, Clone)]
struct PriceWordLayout {
    slot: U256,
    mark_offset: usize,
    oracle_offset: Option<usize>,
    mark_ts_offset: Option<usize>,
    oracle_ts_offset: Option<usize>,
}

pub struct ForkSimulator {
    anvil_path: String,
    fork_rpc_url: String,
    exchange_address: Address,
    config: SimConfig,
}

impl ForkSimulator {
    pub fn new(
        anvil_path: impl Into<String>,
        fork_rpc_url: impl Into<String>,
        exchange_address: Address,
        config: SimConfig,
    ) -> Self {
        Self {
            anvil_path: anvil_path.into(),
            fork_rpc_url: fork_rpc_url.into(),
            exchange_address,
            config,
        }
    }

    /// Run a full simulation for one position. The Anvil child lives for
    /// exactly this call; dropping the instance kills the process on
    /// every exit path.
    pub async fn simulate(&self, perp_id: u64, account_id: u64) -> Result<LiquidationReport> {
        let anvil = Anvil::at(&self.anvil_path)
            .fork(self.fork_rpc_url.clone())
            .timeout(self.config.anvil_timeout_ms)
            .try_spawn()
            .map_err(|e| SimError::AnvilUnavailable(e.to_string()))?;

        let url: reqwest::Url = anvil
            .endpoint()
            .parse()
            .map_err(|e| SimError::AnvilUnavailable(format!("bad endpoint: {e}")))?;
        let provider = ProviderBuilder::new().connect_http(url);

        let session = ForkSession {
            exchange: Exchange::new(self.exchange_address, provider.clone()),
            provider,
            exchange_address: self.exchange_address,
            perp_id,
            account_id,
            maint_per_10k: (self.config.maintenance_margin * 10_000.0).round() as u128,
        };

        let result = self.run(&session).await;
        drop(anvil);
        result
    }

    async fn run<P: Provider + Clone>(
        &self,
        session: &ForkSession<P>,
    ) -> Result<LiquidationReport> {
        let baseline = session.perp_info().await?;
        let (position, mark_pns, _) = session.position().await?;
        if position.positionType == 0 || position.lotLNS == 0 {
            return Err(SimError::NoPosition {
                perp_id: session.perp_id,
                account_id: session.account_id,
            });
        }
        let long = position.positionType == 1;
        let price_decimals = baseline.priceDecimals;
        let mark_price = units::pns_to_price(mark_pns, price_decimals);

        let core_position = perpl_client::types::Position::from_abi(&position);
        let math_price = math::position_liquidation_price(
            &core_position,
            price_decimals,
            self.config.maintenance_margin,
        );

        // Already liquidatable at the live mark: report it and skip the
        // sweep entirely.
        if session.is_liquidatable().await? {
            let fork_price = Some(mark_price);
            let (divergence_abs, divergence_pct) = divergence(math_price, fork_price);
            return Ok(LiquidationReport {
                long,
                mark_price,
                math_price,
                fork_price,
                divergence_abs,
                divergence_pct,
                already_liquidatable: true,
            });
        }

        let layout = self.discover_layout(session, &baseline).await?;
        info!(
            slot = %layout.slot,
            mark_offset = layout.mark_offset,
            "price word located"
        );

        // Coarse sweep over [mark*(1-r), mark*(1+r)].
        let range = self.config.price_range_pct / 100.0;
        let mark = mark_pns as f64;
        let points =
            linspace_pns(mark * (1.0 - range), mark * (1.0 + range), self.config.price_steps);

        let mut samples = Vec::with_capacity(points.len());
        for pns in points {
            let liquidatable = session.probe_price(&layout, pns).await?;
            samples.push((pns, liquidatable));
        }

        let (mut liq_side, mut safe_side) =
            find_boundary(&samples, long).ok_or(SimError::SweepNoBoundary)?;

        // Refine the bracket.
        for _ in 0..self.config.binary_search_iterations {
            let mid = midpoint(liq_side, safe_side);
            if mid == liq_side || mid == safe_side {
                break;
            }
            if session.probe_price(&layout, mid).await? {
                liq_side = mid;
            } else {
                safe_side = mid;
            }
        }

        let boundary_pns = midpoint(liq_side, safe_side);
        let fork_price = Some(units::pns_to_price(boundary_pns, price_decimals));
        let (divergence_abs, divergence_pct) = divergence(math_price, fork_price);

        Ok(LiquidationReport {
            long,
            mark_price,
            math_price,
            fork_price,
            divergence_abs,
            divergence_pct,
            already_liquidatable: false,
        })
    }

    // ==================== Layout discovery ====================

    async fn discover_layout<P: Provider + Clone>(
        &self,
        session: &ForkSession<P>,
        baseline: &Exchange::PerpetualInfo,
    ) -> Result<PriceWordLayout> {
        // Collect every slot SLOADed by the view call.
        let calldata = session.exchange.getPerpetualInfo(session.perp_id).calldata().clone();
        let trace: Value = session
            .provider
            .raw_request(
                "debug_traceCall".into(),
                (
                    json!({ "to": session.exchange_address, "data": calldata }),
                    "latest",
                    json!({ "disableStorage": false, "disableStack": false, "disableMemory": true }),
                ),
            )
            .await
            .map_err(|e| SimError::SlotDiscoveryFailed(format!("debug_traceCall: {e}")))?;
        let slots = collect_sload_slots(&trace);
        if slots.is_empty() {
            return Err(SimError::SlotDiscoveryFailed("trace contained no SLOADs".into()));
        }
        debug!(candidates = slots.len(), "SLOAD slots collected");

        // The price slot is the one whose zeroing changes markPNS.
        let mut price_slot = None;
        for slot in slots {
            let snapshot = session.snapshot().await?;
            let probe = async {
                session.write_word(slot, U256::ZERO).await?;
                let info = session.perp_info().await?;
                Ok::<bool, SimError>(info.markPNS != baseline.markPNS)
            }
            .await;
            session.revert(snapshot).await?;
            if probe? {
                price_slot = Some(slot);
                break;
            }
        }
        let slot = price_slot
            .ok_or_else(|| SimError::SlotDiscoveryFailed("no slot moved markPNS".into()))?;

        let word = session.read_word(slot).await?;

        // Probe 32-bit windows for each field.
        let mark_offset = self
            .probe_field(session, slot, word, MARK_PROBE, |info| info.markPNS as u32, &[])
            .await?
            .ok_or_else(|| {
                SimError::SlotDiscoveryFailed("markPNS bit offset not found".into())
            })?;

        let oracle_offset = self
            .probe_field(
                session,
                slot,
                word,
                ORACLE_PROBE,
                |info| info.oraclePNS as u32,
                &[mark_offset],
            )
            .await?;

        let ts_probe = (Utc::now().timestamp() as u32).wrapping_sub(TS_PROBE_SKEW_SECS);
        let mark_ts_offset = self
            .probe_field(
                session,
                slot,
                word,
                ts_probe,
                |info| info.markTimestamp as u32,
                &[mark_offset],
            )
            .await?;

        // The oracle timestamp is located heuristically near the mark
        // timestamp, filtered by wall-clock plausibility.
        let oracle_ts_offset = mark_ts_offset.and_then(|ts_off| {
            let now = Utc::now().timestamp();
            let taken = [Some(mark_offset), oracle_offset, Some(ts_off)];
            [32isize, -32, 64, -64].iter().find_map(|delta| {
                let candidate = ts_off as isize + delta;
                if !(0..=224).contains(&candidate) || candidate % 32 != 0 {
                    return None;
                }
                let candidate = candidate as usize;
                if taken.iter().flatten().any(|used| *used == candidate) {
                    return None;
                }
                let value = word_window(word, candidate) as i64;
                ((value - now).abs() < ONE_YEAR_SECS).then_some(candidate)
            })
        });

        Ok(PriceWordLayout { slot, mark_offset, oracle_offset, mark_ts_offset, oracle_ts_offset })
    }

    /// Find the 32-bit offset at which writing `probe` makes `read` return
    /// it. Each attempt runs under its own snapshot.
    async fn probe_field<P, F>(
        &self,
        session: &ForkSession<P>,
        slot: U256,
        word: U256,
        probe: u32,
        read: F,
        skip: &[usize],
    ) -> Result<Option<usize>>
    where
        P: Provider + Clone,
        F: Fn(&Exchange::PerpetualInfo) -> u32,
    {
        for offset in (0..=224usize).step_by(32) {
            if skip.contains(&offset) {
                continue;
            }
            let snapshot = session.snapshot().await?;
            let attempt = async {
                session.write_word(slot, word_with_window(word, offset, probe)).await?;
                let info = session.perp_info().await?;
                Ok::<bool, SimError>(read(&info) == probe)
            }
            .await;
            session.revert(snapshot).await?;
            if attempt? {
                return Ok(Some(offset));
            }
        }
        Ok(None)
    }
}

// ==================== Fork session ====================

struct ForkSession<P: Provider + Clone> {
    provider: P,
    exchange: Exchange::ExchangeInstance<P>,
    exchange_address: Address,
    perp_id: u64,
    account_id: u64,
    maint_per_10k: u128,
}

impl<P: Provider + Clone> ForkSession<P> {
    async fn perp_info(&self) -> Result<Exchange::PerpetualInfo> {
        self.exchange
            .getPerpetualInfo(self.perp_id)
            .call()
            .await
            .map_err(|e| SimError::Rpc(e.to_string()))
    }

    async fn position(&self) -> Result<(Exchange::PositionInfo, Pns, bool)> {
        let ret = self
            .exchange
            .getPosition(self.perp_id, self.account_id)
            .call()
            .await
            .map_err(|e| SimError::Rpc(e.to_string()))?;
        Ok((ret.positionInfo, ret.markPNS, ret.markValid))
    }

    /// The contract's own rule: equity (deposit + pnl) below the
    /// maintenance requirement on the current mark valuation.
    async fn is_liquidatable(&self) -> Result<bool> {
        let (position, mark_pns, _) = self.position().await?;
        let equity = position.depositCNS as i128 + position.pnlCNS as i128;
        let position_value = units::position_value_cns(mark_pns, position.lotLNS);
        let maintenance = position_value * self.maint_per_10k / 10_000;
        Ok(equity < maintenance as i128)
    }

    /// Write the packed word so the mark (and oracle, when distinct)
    /// equals `target_pns`, refresh the timestamps, verify the read-back,
    /// and evaluate liquidatability — all under one snapshot, reverted on
    /// every exit path.
    async fn probe_price(&self, layout: &PriceWordLayout, target_pns: Pns) -> Result<bool> {
        let snapshot = self.snapshot().await?;
        let result = self.write_and_check(layout, target_pns).await;
        self.revert(snapshot).await?;
        result
    }

    async fn write_and_check(&self, layout: &PriceWordLayout, target_pns: Pns) -> Result<bool> {
        if target_pns > u32::MAX as u64 {
            return Err(SimError::PriceWriteVerificationFailed(format!(
                "price {target_pns} exceeds the 32-bit window"
            )));
        }
        let target = target_pns as u32;

        let mut word = self.read_word(layout.slot).await?;
        word = word_with_window(word, layout.mark_offset, target);
        if let Some(offset) = layout.oracle_offset {
            word = word_with_window(word, offset, target);
        }
        let now = Utc::now().timestamp() as u32;
        if let Some(offset) = layout.mark_ts_offset {
            word = word_with_window(word, offset, now);
        }
        if let Some(offset) = layout.oracle_ts_offset {
            word = word_with_window(word, offset, now);
        }
        self.write_word(layout.slot, word).await?;

        let info = self.perp_info().await?;
        if info.markPNS != target_pns {
            return Err(SimError::PriceWriteVerificationFailed(format!(
                "wrote {target_pns}, contract reports {}",
                info.markPNS
            )));
        }

        self.is_liquidatable().await
    }

    async fn snapshot(&self) -> Result<U256> {
        self.provider
            .raw_request("evm_snapshot".into(), ())
            .await
            .map_err(|e| SimError::Rpc(format!("evm_snapshot: {e}")))
    }

    async fn revert(&self, snapshot: U256) -> Result<()> {
        let reverted: bool = self
            .provider
            .raw_request("evm_revert".into(), (snapshot,))
            .await
            .map_err(|e| SimError::Rpc(format!("evm_revert: {e}")))?;
        if !reverted {
            warn!(%snapshot, "snapshot revert was rejected");
        }
        Ok(())
    }

    async fn read_word(&self, slot: U256) -> Result<U256> {
        self.provider
            .get_storage_at(self.exchange_address, slot)
            .await
            .map_err(|e| SimError::Rpc(format!("eth_getStorageAt: {e}")))
    }

    async fn write_word(&self, slot: U256, value: U256) -> Result<()> {
        let _: Value = self
            .provider
            .raw_request(
                "anvil_setStorageAt".into(),
                (self.exchange_address, B256::from(slot), B256::from(value)),
            )
            .await
            .map_err(|e| SimError::Rpc(format!("anvil_setStorageAt: {e}")))?;
        Ok(())
    }
}

// ==================== Pure helpers ====================

/// Distinct SLOAD slots in trace order.
fn collect_sload_slots(trace: &Value) -> Vec<U256> {
    let mut slots = Vec::new();
    let Some(logs) = trace.get("structLogs").and_then(Value::as_array) else {
        return slots;
    };
    for entry in logs {
        if entry.get("op").and_then(Value::as_str) != Some("SLOAD") {
            continue;
        }
        let Some(top) = entry
            .get("stack")
            .and_then(Value::as_array)
            .and_then(|stack| stack.last())
            .and_then(Value::as_str)
        else {
            continue;
        };
        let Ok(slot) = U256::from_str_radix(top.trim_start_matches("0x"), 16) else {
            continue;
        };
        if !slots.contains(&slot) {
            slots.push(slot);
        }
    }
    slots
}

/// `steps` evenly spaced PNS points across [lo, hi], deduplicated and
/// ascending.
fn linspace_pns(lo: f64, hi: f64, steps: usize) -> Vec<Pns> {
    if steps == 0 {
        return Vec::new();
    }
    if steps == 1 {
        return vec![lo.round().max(1.0) as Pns];
    }
    let mut points = Vec::with_capacity(steps);
    let stride = (hi - lo) / (steps - 1) as f64;
    for i in 0..steps {
        let pns = (lo + stride * i as f64).round().max(1.0) as Pns;
        if points.last() != Some(&pns) {
            points.push(pns);
        }
    }
    points
}

/// Locate the bracketing pair in an ascending price sweep. Returns
/// (liquidatable side, safe side), or `None` when every point agrees.
///
/// Longs liquidate at low prices, so the bracket is the first
/// liquidatable -> safe transition going up; shorts are symmetric.
fn find_boundary(samples: &[(Pns, bool)], long: bool) -> Option<(Pns, Pns)> {
    for pair in samples.windows(2) {
        let (lower, lower_liq) = pair[0];
        let (upper, upper_liq) = pair[1];
        if long && lower_liq && !upper_liq {
            return Some((lower, upper));
        }
        if !long && !lower_liq && upper_liq {
            return Some((upper, lower));
        }
    }
    None
}

fn midpoint(a: Pns, b: Pns) -> Pns {
    a / 2 + b / 2 + (a % 2 + b % 2) / 2
}

fn divergence(math_price: Option<f64>, fork_price: Option<f64>) -> (Option<f64>, Option<f64>) {
    match (math_price, fork_price) {
        (Some(math), Some(fork)) => {
            let abs = fork - math;
            let pct = if math != 0.0 { Some(abs / math * 100.0) } else { None };
            (Some(abs), pct)
        }
        _ => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sload_slots_are_collected_in_order_without_duplicates() {
        let trace = json!({
            "structLogs": [
                { "op": "PUSH1", "stack": ["0x0"] },
                { "op": "SLOAD", "stack": ["0x1", "0x5"] },
                { "op": "SLOAD", "stack": ["0x2a"] },
                { "op": "SLOAD", "stack": ["0x5"] },
                { "op": "ADD", "stack": ["0x1", "0x2"] },
            ]
        });
        let slots = collect_sload_slots(&trace);
        assert_eq!(slots, vec![U256::from(5), U256::from(42)]);
    }

    #[test]
    fn empty_or_malformed_traces_yield_no_slots() {
        assert!(collect_sload_slots(&json!({})).is_empty());
        assert!(collect_sload_slots(&json!({ "structLogs": [] })).is_empty());
    }

    #[test]
    fn linspace_covers_the_range() {
        let points = linspace_pns(700_000.0, 1_300_000.0, 20);
        assert_eq!(points.len(), 20);
        assert_eq!(*points.first().unwrap(), 700_000);
        assert_eq!(*points.last().unwrap(), 1_300_000);
        assert!(points.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn long_boundary_is_the_liquidatable_to_safe_transition() {
        // Long: liquidatable below, safe above.
        let samples = vec![
            (90u64, true),
            (95, true),
            (100, false),
            (105, false),
        ];
        assert_eq!(find_boundary(&samples, true), Some((95, 100)));
    }

    #[test]
    fn short_boundary_is_symmetric() {
        let samples = vec![
            (90u64, false),
            (95, false),
            (100, true),
            (105, true),
        ];
        assert_eq!(find_boundary(&samples, false), Some((100, 95)));
    }

    #[test]
    fn all_safe_or_all_liquidatable_has_no_boundary() {
        let all_safe = vec![(90u64, false), (100, false), (110, false)];
        assert_eq!(find_boundary(&all_safe, true), None);
        assert_eq!(find_boundary(&all_safe, false), None);

        let all_liq = vec![(90u64, true), (100, true), (110, true)];
        assert_eq!(find_boundary(&all_liq, true), None);
        assert_eq!(find_boundary(&all_liq, false), None);
    }

    #[test]
    fn midpoint_never_overflows() {
        assert_eq!(midpoint(10, 20), 15);
        assert_eq!(midpoint(u64::MAX, u64::MAX - 2), u64::MAX - 1);
    }

    #[test]
    fn divergence_is_signed_and_relative_to_math() {
        let (abs, pct) = divergence(Some(94_736.84), Some(94_750.0));
        assert!((abs.unwrap() - 13.16).abs() < 0.01);
        assert!(pct.unwrap() > 0.0 && pct.unwrap() < 1.0);
    }
}
