// 11.0: every committed state change produces an event. used for audit trails and state
// reconstruction. failed calls emit nothing. the EventPayload enum lists all event types.

use crate::market::FeeKind;
use crate::types::{Address, EpochId, MarketId, PoolRef, Timestamp, TokenRef, Wad};
use crate::vault::AssetPair;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }

    pub fn market(&self) -> MarketId {
        self.payload.market()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Lifecycle events
    MarketInitialized(MarketInitializedEvent),
    EpochIssued(EpochIssuedEvent),
    LiquiditySeparated(LiquiditySeparatedEvent),
    VaultLiquidated(VaultLiquidatedEvent),
    FeeRateUpdated(FeeRateUpdatedEvent),

    // PSM events
    PsmDeposited(PsmDepositedEvent),
    DsRedeemed(DsRedeemedEvent),
    CtRedeemed(CtRedeemedEvent),
    Repurchased(RepurchasedEvent),
    PositionCancelled(PositionCancelledEvent),

    // Flash swap events
    DsSold(DsSoldEvent),
    DsBought(DsBoughtEvent),

    // Vault events
    LvDeposited(LvDepositedEvent),
    RedemptionRequested(RedemptionRequestedEvent),
    RedemptionRightsTransferred(RedemptionRightsTransferredEvent),
    LvRedeemedExpired(LvRedeemedEvent),
    LvRedeemedEarly(LvRedeemedEvent),
}

impl EventPayload {
    pub fn market(&self) -> MarketId {
        match self {
            EventPayload::MarketInitialized(e) => e.market_id,
            EventPayload::EpochIssued(e) => e.market_id,
            EventPayload::LiquiditySeparated(e) => e.market_id,
            EventPayload::VaultLiquidated(e) => e.market_id,
            EventPayload::FeeRateUpdated(e) => e.market_id,
            EventPayload::PsmDeposited(e) => e.market_id,
            EventPayload::DsRedeemed(e) => e.market_id,
            EventPayload::CtRedeemed(e) => e.market_id,
            EventPayload::Repurchased(e) => e.market_id,
            EventPayload::PositionCancelled(e) => e.market_id,
            EventPayload::DsSold(e) => e.market_id,
            EventPayload::DsBought(e) => e.market_id,
            EventPayload::LvDeposited(e) => e.market_id,
            EventPayload::RedemptionRequested(e) => e.market_id,
            EventPayload::RedemptionRightsTransferred(e) => e.market_id,
            EventPayload::LvRedeemedExpired(e) | EventPayload::LvRedeemedEarly(e) => e.market_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInitializedEvent {
    pub market_id: MarketId,
    pub pa: TokenRef,
    pub ra: TokenRef,
    pub lv: TokenRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochIssuedEvent {
    pub market_id: MarketId,
    pub epoch: EpochId,
    pub ct: TokenRef,
    pub ds: TokenRef,
    pub pool: PoolRef,
    pub expiry: Timestamp,
    pub exchange_rate: Wad,
    pub ra_provisioned: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquiditySeparatedEvent {
    pub market_id: MarketId,
    pub epoch: EpochId,
    pub locked: Wad,
    pub total_weight: Wad,
    pub reserved: AssetPair,
    pub amm_exposed: AssetPair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultLiquidatedEvent {
    pub market_id: MarketId,
    pub epoch: EpochId,
    pub lp_removed: Wad,
    pub ct_redeemed: Wad,
    pub ds_dropped: Wad,
    pub ra_recovered: Wad,
    pub pa_recovered: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRateUpdatedEvent {
    pub market_id: MarketId,
    pub kind: FeeKind,
    pub old_rate: Wad,
    pub new_rate: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsmDepositedEvent {
    pub market_id: MarketId,
    pub epoch: EpochId,
    pub depositor: Address,
    pub ra_in: Wad,
    pub minted: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsRedeemedEvent {
    pub market_id: MarketId,
    pub epoch: EpochId,
    pub redeemer: Address,
    pub ds_burned: Wad,
    pub pa_in: Wad,
    pub ra_out: Wad,
    pub fee: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtRedeemedEvent {
    pub market_id: MarketId,
    pub epoch: EpochId,
    pub redeemer: Address,
    pub ct_burned: Wad,
    pub ra_out: Wad,
    pub pa_out: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepurchasedEvent {
    pub market_id: MarketId,
    pub epoch: EpochId,
    pub buyer: Address,
    pub ra_in: Wad,
    pub pa_out: Wad,
    pub fee: Wad,
    pub ds_retired: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionCancelledEvent {
    pub market_id: MarketId,
    pub epoch: EpochId,
    pub owner: Address,
    pub pairs: Wad,
    pub ra_out: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsSoldEvent {
    pub market_id: MarketId,
    pub epoch: EpochId,
    pub buyer: Address,
    pub ra_provided: Wad,
    pub ra_borrowed: Wad,
    pub ds_out: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsBoughtEvent {
    pub market_id: MarketId,
    pub epoch: EpochId,
    pub seller: Address,
    pub ds_in: Wad,
    pub ra_cost: Wad,
    pub ra_out: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LvDepositedEvent {
    pub market_id: MarketId,
    pub depositor: Address,
    pub ra_in: Wad,
    pub shares: Wad,
    pub ra_provisioned: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionRequestedEvent {
    pub market_id: MarketId,
    pub owner: Address,
    pub generation: EpochId,
    pub amount: Wad,
    pub total_locked: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionRightsTransferredEvent {
    pub market_id: MarketId,
    pub from: Address,
    pub to: Address,
    pub amount: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LvRedeemedEvent {
    pub market_id: MarketId,
    pub owner: Address,
    pub receiver: Address,
    pub shares: Wad,
    pub ra_out: Wad,
    pub pa_out: Wad,
    pub fee: Wad,
}
