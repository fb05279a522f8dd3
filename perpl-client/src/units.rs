//! Fixed-point integer encodings of the wire protocol.
//!
//! The exchange is integer-only; the meaning of a number is carried by the
//! per-perpetual decimal declarations. Conversions to and from floating
//! point happen only at display boundaries.
//!
//! - PNS: price scaled by 10^priceDecimals
//! - LNS: lot (size) scaled by 10^lotDecimals
//! - CNS: collateral scaled by 10^6 (the collateral token's decimals)
//! - ONS: signed price offset from a perpetual's base price, in PNS units
//!
//! The platform picks priceDecimals + lotDecimals equal to the collateral
//! decimals, so PNS x LNS is a CNS value exactly.

use alloy::primitives::U256;

use crate::constants::CNS_DECIMALS;

pub type Pns = u64;
pub type Lns = u64;
pub type Cns = u64;
pub type Ons = i64;
pub type LeverageHdths = u32;

pub fn pow10(decimals: u8) -> u64 {
    10u64.pow(decimals as u32)
}

// ==================== Price ====================

pub fn price_to_pns(price: f64, price_decimals: u8) -> Pns {
    (price * pow10(price_decimals) as f64).round() as Pns
}

pub fn pns_to_price(pns: Pns, price_decimals: u8) -> f64 {
    pns as f64 / pow10(price_decimals) as f64
}

// ==================== Lot ====================

pub fn lot_to_lns(lot: f64, lot_decimals: u8) -> Lns {
    (lot * pow10(lot_decimals) as f64).round() as Lns
}

pub fn lns_to_lot(lns: Lns, lot_decimals: u8) -> f64 {
    lns as f64 / pow10(lot_decimals) as f64
}

// ==================== Collateral ====================

pub fn amount_to_cns(amount: f64) -> Cns {
    (amount * pow10(CNS_DECIMALS) as f64).round() as Cns
}

pub fn cns_to_amount(cns: Cns) -> f64 {
    cns as f64 / pow10(CNS_DECIMALS) as f64
}

pub fn cns_i128_to_amount(cns: i128) -> f64 {
    cns as f64 / pow10(CNS_DECIMALS) as f64
}

// ==================== Leverage ====================

pub fn leverage_to_hdths(leverage: f64) -> LeverageHdths {
    (leverage * 100.0).round() as LeverageHdths
}

pub fn hdths_to_leverage(hdths: LeverageHdths) -> f64 {
    hdths as f64 / 100.0
}

// ==================== Offsets ====================

pub fn ons_from_pns(pns: Pns, base_price_pns: Pns) -> Ons {
    pns as i64 - base_price_pns as i64
}

pub fn pns_from_ons(ons: Ons, base_price_pns: Pns) -> Pns {
    (base_price_pns as i64 + ons).max(0) as Pns
}

// ==================== Derived ====================

/// Exact position value in CNS. Valid because the platform declares
/// priceDecimals + lotDecimals = collateral decimals for every perpetual.
pub fn position_value_cns(pns: Pns, lns: Lns) -> u128 {
    pns as u128 * lns as u128
}

/// Funding rate percentage from the signed per-100k wire value.
pub fn funding_per_100k_to_percent(per_100k: i64) -> f64 {
    per_100k as f64 / crate::constants::FUNDING_PER_100K_DIVISOR
}

// ==================== Packed Storage Words ====================

const WINDOW_BITS: usize = 32;
const WINDOW_MASK: u64 = (1u64 << WINDOW_BITS) - 1;

/// Read a 32-bit window out of a 256-bit storage word.
pub fn word_window(word: U256, bit_offset: usize) -> u32 {
    debug_assert!(bit_offset + WINDOW_BITS <= 256);
    let shifted = word >> bit_offset;
    (shifted & U256::from(WINDOW_MASK)).to::<u64>() as u32
}

/// Write a 32-bit window into a 256-bit storage word, preserving every
/// other bit exactly.
pub fn word_with_window(word: U256, bit_offset: usize, value: u32) -> U256 {
    debug_assert!(bit_offset + WINDOW_BITS <= 256);
    let mask = U256::from(WINDOW_MASK) << bit_offset;
    (word & !mask) | (U256::from(value) << bit_offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btc_price_round_trip() {
        // priceDecimals = 1
        assert_eq!(price_to_pns(95_000.0, 1), 950_000);
        assert_eq!(pns_to_price(950_000, 1), 95_000.0);

        assert_eq!(price_to_pns(94_900.0, 1), 949_000);
        assert_eq!(ons_from_pns(949_000, 900_000), 49_000);
        assert_eq!(pns_from_ons(49_000, 900_000), 949_000);
    }

    #[test]
    fn round_trips_within_one_ulp() {
        for decimals in 0u8..=8 {
            let unit = 1.0 / pow10(decimals) as f64;
            for &value in &[0.0, 0.1, 1.5, 42.42, 12_345.678_9, 99_999.9] {
                let fixed = price_to_pns(value, decimals);
                let back = pns_to_price(fixed, decimals);
                assert!(
                    (back - value).abs() <= unit,
                    "decimals={decimals} value={value} back={back}"
                );
            }
        }

        let lns = lot_to_lns(0.125, 5);
        assert_eq!(lns, 12_500);
        assert_eq!(lns_to_lot(lns, 5), 0.125);

        let cns = amount_to_cns(1_234.5678);
        assert_eq!(cns, 1_234_567_800);
        assert!((cns_to_amount(cns) - 1_234.5678).abs() < 1e-9);
    }

    #[test]
    fn leverage_hundredths() {
        assert_eq!(leverage_to_hdths(1.0), 100);
        assert_eq!(leverage_to_hdths(10.0), 1_000);
        assert_eq!(leverage_to_hdths(2.55), 255);
        assert_eq!(hdths_to_leverage(255), 2.55);
    }

    #[test]
    fn negative_offsets() {
        assert_eq!(ons_from_pns(890_000, 900_000), -10_000);
        assert_eq!(pns_from_ons(-10_000, 900_000), 890_000);
        // Offsets below the base clamp at zero rather than wrapping.
        assert_eq!(pns_from_ons(-1_000_000, 900_000), 0);
    }

    #[test]
    fn position_value_is_exact() {
        // priceDecimals=1, lotDecimals=5 -> 6 collateral decimals.
        let pns = price_to_pns(95_000.0, 1);
        let lns = lot_to_lns(0.5, 5);
        let value = position_value_cns(pns, lns);
        assert_eq!(value, 950_000u128 * 50_000u128);
        assert_eq!(cns_i128_to_amount(value as i128), 47_500.0);
    }

    #[test]
    fn funding_percent() {
        assert_eq!(funding_per_100k_to_percent(1_000), 1.0);
        assert_eq!(funding_per_100k_to_percent(-125), -0.125);
    }

    #[test]
    fn window_round_trip_preserves_other_bits() {
        // A word with a recognizable bit pattern in every 32-bit lane.
        let mut word = U256::ZERO;
        for lane in 0u64..8 {
            word |= U256::from(0x1111_1111u64 * (lane + 1)) << (lane as usize * 32);
        }

        for offset in (0..=224).step_by(32) {
            let original = word_window(word, offset);
            let written = word_with_window(word, offset, 0xDEAD_BEEF);
            assert_eq!(word_window(written, offset), 0xDEAD_BEEF);

            // Restoring the original value restores the exact word.
            let restored = word_with_window(written, offset, original);
            assert_eq!(restored, word);

            // All other windows were untouched by the write.
            for other in (0..=224).step_by(32) {
                if other != offset {
                    assert_eq!(word_window(written, other), word_window(word, other));
                }
            }
        }
    }
}
