use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::abi;
use crate::units::{self, Cns, Lns, Pns};

use super::{AccountId, PerpetualId};

/// Side of a position. Never inferred from the size — only from this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    #[default]
    None,
    Long,
    Short,
}

impl PositionType {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => PositionType::Long,
            2 => PositionType::Short,
            _ => PositionType::None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            PositionType::None => 0,
            PositionType::Long => 1,
            PositionType::Short => 2,
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, PositionType::Long)
    }
}

/// Exchange account owned by an on-chain address (the owner or the
/// owner's proxy).
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub owner: Address,
    pub balance_cns: Cns,
    pub locked_cns: Cns,
}

impl Account {
    pub fn from_abi(info: &abi::Exchange::AccountInfo) -> Self {
        Self {
            id: info.accountId,
            owner: info.owner,
            balance_cns: info.balanceCNS,
            locked_cns: info.lockedBalanceCNS,
        }
    }

    /// Balance not locked behind open orders or position margin.
    pub fn available_cns(&self) -> Cns {
        self.balance_cns.saturating_sub(self.locked_cns)
    }

    pub fn balance(&self) -> f64 {
        units::cns_to_amount(self.balance_cns)
    }

    pub fn locked(&self) -> f64 {
        units::cns_to_amount(self.locked_cns)
    }

    pub fn available(&self) -> f64 {
        units::cns_to_amount(self.available_cns())
    }
}

/// Open position keyed by (perpetual, account).
#[derive(Debug, Clone)]
pub struct Position {
    pub perpetual_id: PerpetualId,
    pub account_id: AccountId,
    pub position_type: PositionType,
    pub entry_pns: Pns,
    pub lot_lns: Lns,
    pub deposit_cns: Cns,
    pub pnl_cns: i64,
}

impl Position {
    pub fn from_abi(info: &abi::Exchange::PositionInfo) -> Self {
        Self {
            perpetual_id: info.perpId,
            account_id: info.accountId,
            position_type: PositionType::from_code(info.positionType),
            entry_pns: info.pricePNS,
            lot_lns: info.lotLNS,
            deposit_cns: info.depositCNS,
            pnl_cns: info.pnlCNS,
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.position_type, PositionType::None) && self.lot_lns > 0
    }

    /// Contract-rule equity: deposit plus accrued PnL.
    pub fn equity_cns(&self) -> i128 {
        self.deposit_cns as i128 + self.pnl_cns as i128
    }

    /// Unrealized PnL as a percentage of margin. Zero margin yields zero
    /// rather than infinity.
    pub fn pnl_percent(&self) -> f64 {
        if self.deposit_cns == 0 {
            return 0.0;
        }
        self.pnl_cns as f64 / self.deposit_cns as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_never_underflows() {
        let account = Account {
            id: 7,
            owner: Address::ZERO,
            balance_cns: 100,
            locked_cns: 250,
        };
        assert_eq!(account.available_cns(), 0);
    }

    #[test]
    fn pnl_percent_with_zero_margin_is_zero() {
        let position = Position {
            perpetual_id: 1,
            account_id: 1,
            position_type: PositionType::Long,
            entry_pns: 950_000,
            lot_lns: 1,
            deposit_cns: 0,
            pnl_cns: 42,
        };
        assert_eq!(position.pnl_percent(), 0.0);
    }

    #[test]
    fn side_comes_from_the_tag_not_the_size() {
        let position = Position {
            perpetual_id: 1,
            account_id: 1,
            position_type: PositionType::Short,
            entry_pns: 950_000,
            lot_lns: 100_000,
            deposit_cns: 1_000_000,
            pnl_cns: 0,
        };
        assert!(!position.position_type.is_long());
        assert!(position.is_open());
    }
}
