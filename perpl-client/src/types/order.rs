use serde::{Deserialize, Serialize};

use crate::abi;
use crate::constants::CLOSE_LEVERAGE_SENTINEL_HDTHS;
use crate::errors::PerplError;
use crate::units::{Cns, LeverageHdths, Lns, Pns};

use super::{AccountId, OrderId, PerpetualId};

/// Order request type. Contract descriptors and WebSocket frames encode
/// this differently; use the explicit accessors, never the discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
    Cancel,
    Change,
    IncreaseCollateral,
}

impl OrderType {
    /// Code used by `execOrder`/`execOrders` descriptors.
    pub fn contract_code(&self) -> u8 {
        match self {
            OrderType::OpenLong => 0,
            OrderType::OpenShort => 1,
            OrderType::CloseLong => 2,
            OrderType::CloseShort => 3,
            OrderType::Cancel => 4,
            OrderType::Change => 5,
            OrderType::IncreaseCollateral => 6,
        }
    }

    pub fn from_contract_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => OrderType::OpenLong,
            1 => OrderType::OpenShort,
            2 => OrderType::CloseLong,
            3 => OrderType::CloseShort,
            4 => OrderType::Cancel,
            5 => OrderType::Change,
            6 => OrderType::IncreaseCollateral,
            _ => return None,
        })
    }

    /// Code used by trading-socket order requests. Collateral changes have
    /// no socket encoding.
    pub fn ws_code(&self) -> Option<u8> {
        Some(match self {
            OrderType::OpenLong => 1,
            OrderType::OpenShort => 2,
            OrderType::CloseLong => 3,
            OrderType::CloseShort => 4,
            OrderType::Cancel => 5,
            OrderType::Change | OrderType::IncreaseCollateral => return None,
        })
    }

    pub fn is_open(&self) -> bool {
        matches!(self, OrderType::OpenLong | OrderType::OpenShort)
    }

    pub fn is_close(&self) -> bool {
        matches!(self, OrderType::CloseLong | OrderType::CloseShort)
    }
}

/// Execution flags, ORed on the wire: GTC=0, PostOnly=1, FillOrKill=2,
/// ImmediateOrCancel=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderFlags {
    pub post_only: bool,
    pub fill_or_kill: bool,
    pub immediate_or_cancel: bool,
}

impl OrderFlags {
    pub const GTC: OrderFlags = OrderFlags {
        post_only: false,
        fill_or_kill: false,
        immediate_or_cancel: false,
    };

    pub const IOC: OrderFlags = OrderFlags {
        post_only: false,
        fill_or_kill: false,
        immediate_or_cancel: true,
    };

    pub const POST_ONLY: OrderFlags = OrderFlags {
        post_only: true,
        fill_or_kill: false,
        immediate_or_cancel: false,
    };

    pub fn bits(&self) -> u32 {
        (self.post_only as u32) | ((self.fill_or_kill as u32) << 1) | ((self.immediate_or_cancel as u32) << 2)
    }

    pub fn from_bits(bits: u32) -> Self {
        Self {
            post_only: bits & 1 != 0,
            fill_or_kill: bits & 2 != 0,
            immediate_or_cancel: bits & 4 != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => OrderStatus::Open,
            2 => OrderStatus::PartiallyFilled,
            3 => OrderStatus::Filled,
            4 => OrderStatus::Cancelled,
            5 => OrderStatus::Rejected,
            6 => OrderStatus::Expired,
            _ => OrderStatus::Pending,
        }
    }

    /// Orders in a live status stay in the open-orders set; everything
    /// else is terminal.
    pub fn is_live(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }
}

/// A resting or recently-settled order, identified by its contract id.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub perpetual_id: PerpetualId,
    pub account_id: AccountId,
    pub order_type: OrderType,
    pub price_pns: Pns,
    pub lot_lns: Lns,
    pub filled_lns: Lns,
    pub leverage_hdths: LeverageHdths,
    pub flags: OrderFlags,
    pub expiry_block: u64,
    pub status: OrderStatus,
}

impl Order {
    pub fn from_abi(info: &abi::Exchange::OrderInfo) -> Option<Self> {
        Some(Self {
            id: OrderId(info.orderId),
            perpetual_id: info.perpId,
            account_id: info.accountId,
            order_type: OrderType::from_contract_code(info.orderType)?,
            price_pns: info.pricePNS,
            lot_lns: info.lotLNS,
            filled_lns: info.filledLNS,
            leverage_hdths: info.leverageHdths,
            flags: OrderFlags {
                post_only: info.postOnly,
                fill_or_kill: info.fillOrKill,
                immediate_or_cancel: info.immediateOrCancel,
            },
            expiry_block: info.expiryBlock,
            status: OrderStatus::from_code(info.status),
        })
    }

    pub fn remaining_lns(&self) -> Lns {
        self.lot_lns.saturating_sub(self.filled_lns)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liquidity {
    Maker,
    Taker,
}

/// Immutable fill event.
#[derive(Debug, Clone)]
pub struct Fill {
    pub order_id: OrderId,
    pub perpetual_id: PerpetualId,
    pub account_id: AccountId,
    pub liquidity: Liquidity,
    pub price_pns: Pns,
    pub lot_lns: Lns,
    pub fee_cns: Cns,
    pub block_number: u64,
    pub log_index: u64,
}

/// Order descriptor as consumed by the on-chain `execOrder`/`execOrders`
/// entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDescriptor {
    pub descriptor_id: u64,
    pub perpetual_id: PerpetualId,
    pub order_type: OrderType,
    /// Target order for cancels/changes; zero for new orders.
    pub order_id: OrderId,
    pub price_pns: Pns,
    pub lot_lns: Lns,
    pub expiry_block: u64,
    pub flags: OrderFlags,
    pub max_matches: u32,
    pub leverage_hdths: LeverageHdths,
    pub last_execution_block: u64,
    pub amount_cns: Cns,
}

impl OrderDescriptor {
    pub fn open(
        perpetual_id: PerpetualId,
        long: bool,
        price_pns: Pns,
        lot_lns: Lns,
        leverage_hdths: LeverageHdths,
        flags: OrderFlags,
        last_execution_block: u64,
    ) -> Self {
        Self {
            descriptor_id: 0,
            perpetual_id,
            order_type: if long { OrderType::OpenLong } else { OrderType::OpenShort },
            order_id: OrderId(0),
            price_pns,
            lot_lns,
            expiry_block: 0,
            flags,
            max_matches: 0,
            leverage_hdths,
            last_execution_block,
            amount_cns: 0,
        }
    }

    pub fn close(
        perpetual_id: PerpetualId,
        long_position: bool,
        price_pns: Pns,
        lot_lns: Lns,
        flags: OrderFlags,
        last_execution_block: u64,
    ) -> Self {
        Self {
            descriptor_id: 0,
            perpetual_id,
            order_type: if long_position { OrderType::CloseLong } else { OrderType::CloseShort },
            order_id: OrderId(0),
            price_pns,
            lot_lns,
            expiry_block: 0,
            flags,
            max_matches: 0,
            // Ignored by the matching engine on closes.
            leverage_hdths: CLOSE_LEVERAGE_SENTINEL_HDTHS,
            last_execution_block,
            amount_cns: 0,
        }
    }

    pub fn cancel(perpetual_id: PerpetualId, order_id: OrderId, last_execution_block: u64) -> Self {
        Self {
            descriptor_id: 0,
            perpetual_id,
            order_type: OrderType::Cancel,
            order_id,
            price_pns: 0,
            lot_lns: 0,
            expiry_block: 0,
            flags: OrderFlags::GTC,
            max_matches: 0,
            leverage_hdths: CLOSE_LEVERAGE_SENTINEL_HDTHS,
            last_execution_block,
            amount_cns: 0,
        }
    }

    pub fn increase_collateral(
        perpetual_id: PerpetualId,
        amount_cns: Cns,
        last_execution_block: u64,
    ) -> Self {
        Self {
            descriptor_id: 0,
            perpetual_id,
            order_type: OrderType::IncreaseCollateral,
            order_id: OrderId(0),
            price_pns: 0,
            lot_lns: 0,
            expiry_block: 0,
            flags: OrderFlags::GTC,
            max_matches: 0,
            leverage_hdths: CLOSE_LEVERAGE_SENTINEL_HDTHS,
            last_execution_block,
            amount_cns,
        }
    }

    pub fn validate(&self) -> Result<(), PerplError> {
        if (self.order_type.is_open() || self.order_type.is_close()) && self.lot_lns == 0 {
            return Err(PerplError::InvalidRequest(
                "order lot must be strictly positive".into(),
            ));
        }
        if self.order_type.is_open() && self.leverage_hdths < 100 {
            return Err(PerplError::InvalidRequest(
                "leverage must be at least 1x (100 hundredths)".into(),
            ));
        }
        if matches!(self.order_type, OrderType::Cancel | OrderType::Change) && self.order_id.0 == 0 {
            return Err(PerplError::InvalidRequest(
                "cancel/change requires a target order id".into(),
            ));
        }
        Ok(())
    }

    pub fn to_abi(&self) -> abi::Exchange::OrderDesc {
        abi::Exchange::OrderDesc {
            descId: self.descriptor_id,
            perpId: self.perpetual_id,
            orderType: self.order_type.contract_code(),
            orderId: self.order_id.0,
            pricePNS: self.price_pns,
            lotLNS: self.lot_lns,
            expiryBlock: self.expiry_block,
            postOnly: self.flags.post_only,
            fillOrKill: self.flags.fill_or_kill,
            immediateOrCancel: self.flags.immediate_or_cancel,
            maxMatches: self.max_matches,
            leverageHdths: self.leverage_hdths,
            lastExecutionBlock: self.last_execution_block,
            amountCNS: self.amount_cns,
        }
    }

    pub fn from_abi(desc: &abi::Exchange::OrderDesc) -> Option<Self> {
        Some(Self {
            descriptor_id: desc.descId,
            perpetual_id: desc.perpId,
            order_type: OrderType::from_contract_code(desc.orderType)?,
            order_id: OrderId(desc.orderId),
            price_pns: desc.pricePNS,
            lot_lns: desc.lotLNS,
            expiry_block: desc.expiryBlock,
            flags: OrderFlags {
                post_only: desc.postOnly,
                fill_or_kill: desc.fillOrKill,
                immediate_or_cancel: desc.immediateOrCancel,
            },
            max_matches: desc.maxMatches,
            leverage_hdths: desc.leverageHdths,
            last_execution_block: desc.lastExecutionBlock,
            amount_cns: desc.amountCNS,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy::sol_types::SolValue;

    use super::*;

    #[test]
    fn flag_bits_or_together() {
        assert_eq!(OrderFlags::GTC.bits(), 0);
        assert_eq!(OrderFlags::POST_ONLY.bits(), 1);
        assert_eq!(
            OrderFlags { fill_or_kill: true, ..Default::default() }.bits(),
            2
        );
        assert_eq!(OrderFlags::IOC.bits(), 4);

        let all = OrderFlags {
            post_only: true,
            fill_or_kill: true,
            immediate_or_cancel: true,
        };
        assert_eq!(all.bits(), 7);
        assert_eq!(OrderFlags::from_bits(7), all);
    }

    #[test]
    fn contract_and_ws_codes_differ() {
        assert_eq!(OrderType::OpenLong.contract_code(), 0);
        assert_eq!(OrderType::OpenLong.ws_code(), Some(1));
        assert_eq!(OrderType::Cancel.contract_code(), 4);
        assert_eq!(OrderType::Cancel.ws_code(), Some(5));
        assert_eq!(OrderType::IncreaseCollateral.ws_code(), None);
    }

    #[test]
    fn descriptor_abi_round_trip() {
        let desc = OrderDescriptor::open(
            16,
            true,
            950_000,
            1_000,
            1_000,
            OrderFlags::POST_ONLY,
            50_000,
        );
        let encoded = desc.to_abi().abi_encode();
        let decoded = abi::Exchange::OrderDesc::abi_decode(&encoded).unwrap();
        assert_eq!(OrderDescriptor::from_abi(&decoded).unwrap(), desc);
    }

    #[test]
    fn close_descriptor_carries_sentinel_leverage() {
        let desc = OrderDescriptor::close(16, true, 0, 500, OrderFlags::IOC, 50_000);
        assert_eq!(desc.order_type, OrderType::CloseLong);
        assert_eq!(desc.leverage_hdths, CLOSE_LEVERAGE_SENTINEL_HDTHS);
        desc.validate().unwrap();
    }

    #[test]
    fn validation_rejects_bad_descriptors() {
        let mut desc = OrderDescriptor::open(1, false, 100, 0, 500, OrderFlags::GTC, 10);
        assert!(desc.validate().is_err());

        desc.lot_lns = 10;
        desc.leverage_hdths = 99;
        assert!(desc.validate().is_err());

        let cancel = OrderDescriptor::cancel(1, OrderId(0), 10);
        assert!(cancel.validate().is_err());
    }
}
