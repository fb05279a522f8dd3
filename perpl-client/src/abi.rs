//! Contract bindings for the exchange and the owner/operator account proxy.

use alloy::sol;

sol! {
    #[sol(rpc)]
    #[derive(Debug)]
    contract Exchange {
        struct OrderDesc {
            uint64 descId;
            uint64 perpId;
            uint8 orderType;
            uint64 orderId;
            uint64 pricePNS;
            uint64 lotLNS;
            uint64 expiryBlock;
            bool postOnly;
            bool fillOrKill;
            bool immediateOrCancel;
            uint32 maxMatches;
            uint32 leverageHdths;
            uint64 lastExecutionBlock;
            uint64 amountCNS;
        }

        struct PerpetualInfo {
            string name;
            string symbol;
            uint8 priceDecimals;
            uint8 lotDecimals;
            uint64 basePricePNS;
            uint64 markPNS;
            uint64 oraclePNS;
            uint64 markTimestamp;
            uint64 oracleTimestampSec;
            int64 fundingRatePer100K;
            uint64 fundingStartBlock;
            uint64 longOpenInterestLNS;
            uint64 shortOpenInterestLNS;
            int64 maxBidPriceONS;
            int64 minBidPriceONS;
            int64 maxAskPriceONS;
            int64 minAskPriceONS;
            uint64 totalOrders;
            bool paused;
        }

        struct AccountInfo {
            uint64 accountId;
            address owner;
            uint64 balanceCNS;
            uint64 lockedBalanceCNS;
        }

        struct PositionInfo {
            uint64 perpId;
            uint64 accountId;
            uint8 positionType;
            uint64 pricePNS;
            uint64 lotLNS;
            uint64 depositCNS;
            int64 pnlCNS;
        }

        struct OrderInfo {
            uint64 orderId;
            uint64 perpId;
            uint64 accountId;
            uint8 orderType;
            uint64 pricePNS;
            uint64 lotLNS;
            uint64 filledLNS;
            uint32 leverageHdths;
            bool postOnly;
            bool fillOrKill;
            bool immediateOrCancel;
            uint64 expiryBlock;
            uint8 status;
        }

        function getPerpetualInfo(uint64 perpId) external view returns (PerpetualInfo memory);
        function getAccountById(uint64 accountId) external view returns (AccountInfo memory);
        function getAccountByAddr(address owner) external view returns (AccountInfo memory);
        function getPosition(uint64 perpId, uint64 accountId)
            external view returns (PositionInfo memory positionInfo, uint64 markPNS, bool markValid);
        function getOpenOrders(uint64 perpId, uint64 accountId) external view returns (OrderInfo[] memory);
        function getVolumeAtBookPrice(uint64 perpId, int64 ons) external view returns (uint64);
        function getNextPriceBelowWithOrders(uint64 perpId, int64 ons) external view returns (int64);
        function getMakerFee(uint64 perpId) external view returns (uint64);
        function getTakerFee(uint64 perpId) external view returns (uint64);
        function getMarginFractions(uint64 perpId, uint64 accountId)
            external view returns (uint32 perpInitMarginFracHdths, uint32 perpMaintMarginFracHdths);

        function execOrder(OrderDesc calldata desc) external;
        function execOrders(OrderDesc[] calldata descs, bool revertOnFail) external;
        function depositCollateral(uint64 amountCNS) external;
        function increasePositionCollateral(uint64 perpId, uint64 amountCNS) external;
        function requestDecreasePositionCollateral(uint64 perpId, uint64 amountCNS) external;
        function decreasePositionCollateral(uint64 perpId, uint64 amountCNS, bool clampToMaximum) external;
    }
}

sol! {
    #[sol(rpc)]
    #[derive(Debug)]
    contract AccountProxy {
        function forward(bytes calldata data) external returns (bytes memory);
        function setOperatorAllowlist(bytes4[] calldata selectors, bool allowed) external;
        function owner() external view returns (address);
        function operator() external view returns (address);
    }
}
