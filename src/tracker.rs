//! In-memory snapshot of account, positions and orders, fed by the
//! trading socket's event stream.
//!
//! The tracker subscribes to the WebSocket client; the client never
//! references the tracker. Register the event receiver before connecting
//! so no message is missed for lack of a handler.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::debug;

use perpl_client::types::ws::{
    WsEvent, WsOrderRow, WsPositionRow, WsWalletAccount, POSITION_STATUS_OPEN,
};
use perpl_client::types::{
    Account, Order, OrderFlags, OrderId, OrderStatus, OrderType, PerpetualId, Position,
    PositionType,
};
use perpl_client::units::{self, Pns};

use crate::liquidation::math;

#[derive(Default)]
struct TrackerState {
    account: Option<Account>,
    wallet_accounts: Vec<WsWalletAccount>,
    /// Keyed by position id; entries with status != Open are removed.
    positions: HashMap<u64, WsPositionRow>,
    /// Keyed by contract order id; removed on `r` or terminal status.
    orders: HashMap<OrderId, Order>,
    last_block: u64,

    account_at: Option<Instant>,
    positions_at: Option<Instant>,
    orders_at: Option<Instant>,
}

#[derive(Clone, Default)]
pub struct StateTracker {
    inner: Arc<RwLock<TrackerState>>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pump events from a WebSocket listener into the tracker.
    pub fn attach(&self, mut events: UnboundedReceiver<WsEvent>) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                tracker.apply(&event);
            }
            debug!("tracker event stream ended");
        })
    }

    /// Apply one event. Public so tests and custom pumps can drive it.
    pub fn apply(&self, event: &WsEvent) {
        let mut state = self.inner.write().unwrap();
        let now = Instant::now();
        match event {
            WsEvent::Wallet(snapshot) => {
                state.wallet_accounts = snapshot.acs.clone();
                state.account = snapshot.acs.first().map(account_from_wallet);
                state.account_at = Some(now);
            }
            WsEvent::Orders { snapshot, rows } => {
                if *snapshot {
                    state.orders.clear();
                }
                for row in rows {
                    let status = OrderStatus::from_code(row.st);
                    if row.r || !status.is_live() {
                        state.orders.remove(&row.oid);
                    } else if let Some(order) = order_from_row(row) {
                        state.orders.insert(row.oid, order);
                    }
                }
                state.orders_at = Some(now);
            }
            WsEvent::Positions { snapshot, rows } => {
                if *snapshot {
                    state.positions.clear();
                }
                for row in rows {
                    if row.st != POSITION_STATUS_OPEN {
                        state.positions.remove(&row.id);
                    } else {
                        state.positions.insert(row.id, row.clone());
                    }
                }
                state.positions_at = Some(now);
            }
            WsEvent::Fills(_) => {
                // Fills imply fresh positions/balances follow; nothing to
                // store here.
            }
            WsEvent::Heartbeat { block } => {
                state.last_block = *block;
            }
            _ => {}
        }
    }

    // ==================== Raw views ====================

    pub fn account(&self) -> Option<Account> {
        self.inner.read().unwrap().account.clone()
    }

    pub fn wallet_accounts(&self) -> Vec<WsWalletAccount> {
        self.inner.read().unwrap().wallet_accounts.clone()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.inner
            .read()
            .unwrap()
            .positions
            .values()
            .map(position_from_row)
            .collect()
    }

    pub fn open_orders(&self) -> Vec<Order> {
        self.inner.read().unwrap().orders.values().cloned().collect()
    }

    pub fn has_order(&self, id: OrderId) -> bool {
        self.inner.read().unwrap().orders.contains_key(&id)
    }

    pub fn last_block(&self) -> u64 {
        self.inner.read().unwrap().last_block
    }

    // ==================== Derived reads ====================

    pub fn balance(&self) -> f64 {
        self.account().map(|a| a.balance()).unwrap_or(0.0)
    }

    pub fn locked(&self) -> f64 {
        self.account().map(|a| a.locked()).unwrap_or(0.0)
    }

    pub fn available(&self) -> f64 {
        self.account().map(|a| a.available()).unwrap_or(0.0)
    }

    pub fn total_unrealized_pnl_cns(&self) -> i128 {
        self.inner
            .read()
            .unwrap()
            .positions
            .values()
            .map(|p| p.pnl as i128)
            .sum()
    }

    pub fn total_unrealized_pnl(&self) -> f64 {
        units::cns_i128_to_amount(self.total_unrealized_pnl_cns())
    }

    /// Balance plus total unrealized PnL, in display units.
    pub fn total_equity(&self) -> f64 {
        self.balance() + self.total_unrealized_pnl()
    }

    /// True when any position's liquidation distance (fraction of the
    /// current mark) falls below `threshold`. Marks come from the caller
    /// since the trading socket does not carry them.
    pub fn at_risk(
        &self,
        marks: &HashMap<PerpetualId, (Pns, u8)>,
        maintenance_margin: f64,
        threshold: f64,
    ) -> bool {
        let state = self.inner.read().unwrap();
        state.positions.values().any(|row| {
            let Some((mark_pns, price_decimals)) = marks.get(&row.pid) else {
                return false;
            };
            let position = position_from_row(row);
            let Some(liq) =
                math::position_liquidation_price(&position, *price_decimals, maintenance_margin)
            else {
                return false;
            };
            let mark = units::pns_to_price(*mark_pns, *price_decimals);
            if mark <= 0.0 {
                return false;
            }
            ((mark - liq).abs() / mark) < threshold
        })
    }

    /// Whether any tracked section is older than `max_age_ms` (or has
    /// never been seen), meaning a contract refresh should be forced.
    pub fn is_stale(&self, max_age_ms: u64) -> bool {
        let state = self.inner.read().unwrap();
        let max_age = std::time::Duration::from_millis(max_age_ms);
        [state.account_at, state.positions_at, state.orders_at]
            .iter()
            .any(|stamp| stamp.map(|t| t.elapsed() > max_age).unwrap_or(true))
    }
}

fn account_from_wallet(row: &WsWalletAccount) -> Account {
    Account {
        id: row.aid,
        owner: row.ad.parse().unwrap_or(alloy::primitives::Address::ZERO),
        balance_cns: row.b,
        locked_cns: row.lk,
    }
}

fn position_from_row(row: &WsPositionRow) -> Position {
    Position {
        perpetual_id: row.pid,
        account_id: row.aid,
        position_type: PositionType::from_code(row.pt),
        entry_pns: row.ep,
        lot_lns: row.l,
        deposit_cns: row.dp,
        pnl_cns: row.pnl,
    }
}

fn order_from_row(row: &WsOrderRow) -> Option<Order> {
    let order_type = match row.t {
        1 => OrderType::OpenLong,
        2 => OrderType::OpenShort,
        3 => OrderType::CloseLong,
        4 => OrderType::CloseShort,
        _ => return None,
    };
    Some(Order {
        id: row.oid,
        perpetual_id: row.pid,
        account_id: row.aid,
        order_type,
        price_pns: row.p,
        lot_lns: row.l,
        filled_lns: row.f,
        leverage_hdths: row.lv,
        flags: OrderFlags::GTC,
        expiry_block: 0,
        status: OrderStatus::from_code(row.st),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpl_client::types::ws::WalletSnapshot;

    fn order_row(oid: u64, st: u8, r: bool) -> WsOrderRow {
        WsOrderRow {
            oid: OrderId(oid),
            pid: 16,
            aid: 100,
            t: 1,
            p: 950_000,
            l: 1_000,
            f: 0,
            lv: 1_000,
            st,
            r,
            rq: None,
        }
    }

    fn position_row(id: u64, st: u8) -> WsPositionRow {
        WsPositionRow {
            id,
            pid: 16,
            aid: 100,
            pt: 1,
            ep: 950_000,
            l: 1_000,
            dp: 10_000_000,
            pnl: 500_000,
            st,
        }
    }

    #[test]
    fn orders_with_remove_flag_or_terminal_status_disappear() {
        let tracker = StateTracker::new();
        tracker.apply(&WsEvent::Orders {
            snapshot: true,
            rows: vec![order_row(1, 1, false), order_row(2, 2, false)],
        });
        assert_eq!(tracker.open_orders().len(), 2);

        // Remove flag set.
        tracker.apply(&WsEvent::Orders { snapshot: false, rows: vec![order_row(1, 1, true)] });
        assert!(!tracker.has_order(OrderId(1)));

        // Terminal status (filled).
        tracker.apply(&WsEvent::Orders { snapshot: false, rows: vec![order_row(2, 3, false)] });
        assert!(!tracker.has_order(OrderId(2)));
        assert!(tracker.open_orders().is_empty());
    }

    #[test]
    fn snapshot_replaces_the_whole_order_set() {
        let tracker = StateTracker::new();
        tracker.apply(&WsEvent::Orders { snapshot: true, rows: vec![order_row(1, 1, false)] });
        tracker.apply(&WsEvent::Orders { snapshot: true, rows: vec![order_row(9, 1, false)] });
        assert!(!tracker.has_order(OrderId(1)));
        assert!(tracker.has_order(OrderId(9)));
    }

    #[test]
    fn closed_positions_are_removed_on_update() {
        let tracker = StateTracker::new();
        tracker.apply(&WsEvent::Positions {
            snapshot: true,
            rows: vec![position_row(3, POSITION_STATUS_OPEN)],
        });
        assert_eq!(tracker.positions().len(), 1);

        tracker.apply(&WsEvent::Positions { snapshot: false, rows: vec![position_row(3, 2)] });
        assert!(tracker.positions().is_empty());
    }

    #[test]
    fn derived_equity_sums_balance_and_pnl() {
        let tracker = StateTracker::new();
        tracker.apply(&WsEvent::Wallet(WalletSnapshot {
            acs: vec![WsWalletAccount {
                aid: 100,
                ad: "0x0000000000000000000000000000000000000001".into(),
                b: 25_000_000, // 25.0
                lk: 5_000_000, // 5.0
            }],
        }));
        tracker.apply(&WsEvent::Positions {
            snapshot: true,
            rows: vec![position_row(3, POSITION_STATUS_OPEN)], // pnl 0.5
        });

        assert_eq!(tracker.balance(), 25.0);
        assert_eq!(tracker.locked(), 5.0);
        assert_eq!(tracker.available(), 20.0);
        assert_eq!(tracker.total_unrealized_pnl(), 0.5);
        assert_eq!(tracker.total_equity(), 25.5);
    }

    #[test]
    fn staleness_before_any_event_and_after_updates() {
        let tracker = StateTracker::new();
        assert!(tracker.is_stale(60_000));

        tracker.apply(&WsEvent::Wallet(WalletSnapshot { acs: vec![] }));
        tracker.apply(&WsEvent::Orders { snapshot: true, rows: vec![] });
        tracker.apply(&WsEvent::Positions { snapshot: true, rows: vec![] });
        assert!(!tracker.is_stale(60_000));
        assert!(tracker.is_stale(0));
    }

    #[test]
    fn at_risk_flags_positions_near_their_boundary() {
        let tracker = StateTracker::new();
        // Long 0.01 BTC-ish: entry 95000.0 (decimals 1), deposit 10.0,
        // heavily leveraged so the boundary is close to the mark.
        tracker.apply(&WsEvent::Positions {
            snapshot: true,
            rows: vec![WsPositionRow {
                id: 1,
                pid: 16,
                aid: 100,
                pt: 1,
                ep: 950_000,
                l: 1_000, // 0.01 lots at lotDecimals 5
                dp: 10_000_000,
                pnl: 0,
                st: POSITION_STATUS_OPEN,
            }],
        });

        let mut marks = HashMap::new();
        marks.insert(16u64, (950_000u64, 1u8));
        // Entry 95000, size 0.01, collateral 10 -> boundary ~98947,
        // about 4% away from the mark.
        assert!(tracker.at_risk(&marks, 0.05, 0.05));
        assert!(!tracker.at_risk(&marks, 0.05, 0.001));
    }
}
