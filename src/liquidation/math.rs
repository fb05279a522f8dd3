//! Closed-form liquidation price.
//!
//! The boundary solves `equity(L) = m * |position_value(L)|` with
//! `equity(L) = C + sign * S * (L - E)`:
//!
//!   long:  L = (E*S - C) / (S * (1 - m))
//!   short: L = (E*S + C) / (S * (1 + m))
//!
//! Funding accrual and the taker fee on close are ignored; the fork
//! verifier exists to measure that divergence.

use perpl_client::constants::CNS_DECIMALS;
use perpl_client::types::Position;
use perpl_client::units;

#[derive(Debug, Clone, Copy)]
pub struct ClosedFormInputs {
    pub entry_price: f64,
    /// Absolute size in display units.
    pub size: f64,
    /// Collateral in display units.
    pub collateral: f64,
    /// Maintenance margin fraction, e.g. 0.05.
    pub maintenance_margin: f64,
    pub long: bool,
}

/// Closed-form boundary. `None` when the position is degenerate
/// (zero size) or the denominator collapses.
pub fn liquidation_price(inputs: &ClosedFormInputs) -> Option<f64> {
    let ClosedFormInputs { entry_price, size, collateral, maintenance_margin, long } = *inputs;
    if size <= 0.0 {
        return None;
    }
    let denominator = if long {
        size * (1.0 - maintenance_margin)
    } else {
        size * (1.0 + maintenance_margin)
    };
    if denominator <= 0.0 {
        return None;
    }
    let numerator = if long {
        entry_price * size - collateral
    } else {
        entry_price * size + collateral
    };
    Some((numerator / denominator).max(0.0))
}

/// Closed-form boundary for a scaled on-chain position. Lot decimals are
/// derived from the platform invariant priceDecimals + lotDecimals =
/// collateral decimals.
pub fn position_liquidation_price(
    position: &Position,
    price_decimals: u8,
    maintenance_margin: f64,
) -> Option<f64> {
    if !position.is_open() {
        return None;
    }
    let lot_decimals = CNS_DECIMALS.checked_sub(price_decimals)?;
    let inputs = ClosedFormInputs {
        entry_price: units::pns_to_price(position.entry_pns, price_decimals),
        size: units::lns_to_lot(position.lot_lns, lot_decimals),
        collateral: units::cns_to_amount(position.deposit_cns),
        maintenance_margin,
        long: position.position_type.is_long(),
    };
    liquidation_price(&inputs)
}

#[cfg(test)]
mod tests {
    use perpl_client::types::PositionType;

    use super::*;

    #[test]
    fn long_literal_from_the_solvency_rule() {
        // Entry 100000, size 1, collateral 10000, maintenance 0.05.
        let price = liquidation_price(&ClosedFormInputs {
            entry_price: 100_000.0,
            size: 1.0,
            collateral: 10_000.0,
            maintenance_margin: 0.05,
            long: true,
        })
        .unwrap();
        assert!((price - 94_736.84).abs() < 0.01, "got {price}");
    }

    #[test]
    fn short_boundary_sits_above_entry() {
        let price = liquidation_price(&ClosedFormInputs {
            entry_price: 100_000.0,
            size: 1.0,
            collateral: 10_000.0,
            maintenance_margin: 0.05,
            long: false,
        })
        .unwrap();
        // (100000 + 10000) / 1.05
        assert!((price - 104_761.90).abs() < 0.01, "got {price}");
        assert!(price > 100_000.0);
    }

    #[test]
    fn degenerate_positions_have_no_boundary() {
        assert!(liquidation_price(&ClosedFormInputs {
            entry_price: 100.0,
            size: 0.0,
            collateral: 10.0,
            maintenance_margin: 0.05,
            long: true,
        })
        .is_none());

        // m >= 1 collapses the long denominator.
        assert!(liquidation_price(&ClosedFormInputs {
            entry_price: 100.0,
            size: 1.0,
            collateral: 10.0,
            maintenance_margin: 1.0,
            long: true,
        })
        .is_none());
    }

    #[test]
    fn deep_collateral_clamps_at_zero() {
        let price = liquidation_price(&ClosedFormInputs {
            entry_price: 100.0,
            size: 1.0,
            collateral: 1_000.0,
            maintenance_margin: 0.05,
            long: true,
        })
        .unwrap();
        assert_eq!(price, 0.0);
    }

    #[test]
    fn scaled_position_round_trips_through_display_units() {
        // priceDecimals 1 -> lotDecimals 5. Entry 100000.0, 1.0 lot,
        // 10000.0 collateral.
        let position = Position {
            perpetual_id: 16,
            account_id: 100,
            position_type: PositionType::Long,
            entry_pns: 1_000_000,
            lot_lns: 100_000,
            deposit_cns: 10_000_000_000,
            pnl_cns: 0,
        };
        let price = position_liquidation_price(&position, 1, 0.05).unwrap();
        assert!((price - 94_736.84).abs() < 0.01, "got {price}");
    }
}
