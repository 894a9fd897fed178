// 8.0.2: result types and errors for engine operations.
// ProtocolError groups failures by kind. every entry point validates first and mutates
// after, so an error always means no state changed.

use crate::access::AccessError;
use crate::amm::AmmError;
use crate::config::ConfigError;
use crate::flash_swap::PricingError;
use crate::market::FeeKind;
use crate::math::MathError;
use crate::token::TokenError;
use crate::types::{Address, EpochId, MarketId, Timestamp, Wad};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("paused: {0}")]
    Paused(#[from] PausedError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("math error: {0}")]
    Math(#[from] MathError),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("amm error: {0}")]
    Amm(#[from] AmmError),
}

impl From<AccessError> for ProtocolError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::NotManager(who) => PermissionError::NotManager(who).into(),
            AccessError::ZeroAddress => ConfigurationError::ZeroAddress.into(),
        }
    }
}

impl From<ConfigError> for ProtocolError {
    fn from(err: ConfigError) -> Self {
        ConfigurationError::Invalid {
            reason: err.to_string(),
        }
        .into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("zero address or token reference")]
    ZeroAddress,

    #[error("market {0} already initialized")]
    AlreadyInitialized(MarketId),

    #[error("{kind:?} fee rate {rate} exceeds ceiling {ceiling}")]
    FeeAboveCeiling {
        kind: FeeKind,
        rate: Wad,
        ceiling: Wad,
    },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("{0:?} is not a manager")]
    NotManager(Address),

    #[error("insufficient allowance: needed {needed}, available {available}")]
    InsufficientAllowance { needed: Wad, available: Wad },

    #[error("permit rejected: {0}")]
    Permit(TokenError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PausedError {
    #[error("PSM deposits are paused")]
    PsmDepositPaused,

    #[error("PSM withdrawals are paused")]
    PsmWithdrawalPaused,

    #[error("repurchases are paused")]
    RepurchasePaused,

    #[error("LV deposits are paused")]
    LvDepositPaused,

    #[error("LV withdrawals are paused")]
    LvWithdrawalPaused,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("deposit must be non-zero")]
    ZeroDeposit,

    #[error("expiry {expiry} is not after {now}")]
    ExpiryNotInFuture { expiry: Timestamp, now: Timestamp },

    #[error("window of {requested} exceeds page cap {max}")]
    WindowTooLarge { requested: usize, max: usize },

    #[error("exchange rate must be non-zero")]
    ZeroExchangeRate,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("market {0} not initialized")]
    MarketNotInitialized(MarketId),

    #[error("market {0} has no issued epoch")]
    NoActiveEpoch(MarketId),

    #[error("epoch {0} not found")]
    EpochNotFound(EpochId),

    #[error("epoch {epoch} expired at {expiry}")]
    EpochExpired { epoch: EpochId, expiry: Timestamp },

    #[error("epoch {epoch} does not expire until {expiry}")]
    EpochNotExpired { epoch: EpochId, expiry: Timestamp },

    #[error("epoch {0} must expire before the next issuance")]
    PreviousEpochActive(EpochId),

    #[error("insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: Wad, available: Wad },

    #[error("insufficient locked balance: needed {needed}, available {available}")]
    InsufficientLockedBalance { needed: Wad, available: Wad },

    #[error("redemption of {requested} exceeds cap {cap}")]
    RedemptionCapExceeded { requested: Wad, cap: Wad },

    #[error("repurchase of {requested} exceeds available {available}")]
    RepurchaseExceedsAvailable { requested: Wad, available: Wad },
}

/// Maps a failed authorization check onto the permission taxonomy.
pub(crate) fn authorization_error(err: TokenError) -> ProtocolError {
    match err {
        TokenError::InsufficientAllowance { needed, available } => {
            PermissionError::InsufficientAllowance { needed, available }.into()
        }
        TokenError::PermitExpired { .. }
        | TokenError::PermitAmountTooLow { .. }
        | TokenError::InvalidSignature => PermissionError::Permit(err).into(),
        other => other.into(),
    }
}

// 8.0.3: receipts returned by the mutating entry points

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsRedemption {
    pub ra_gross: Wad,
    pub fee: Wad,
    pub ra_out: Wad,
    pub pa_in: Wad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtRedemption {
    pub ra_out: Wad,
    pub pa_out: Wad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepurchaseReceipt {
    pub pa_gross: Wad,
    pub fee: Wad,
    pub pa_out: Wad,
    pub ds_retired: Wad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsSale {
    pub ra_borrowed: Wad,
    pub ds_out: Wad,
    // pool output above the borrow, returned to the caller
    pub ra_refund: Wad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsPurchase {
    pub ra_cost: Wad,
    pub ra_out: Wad,
    pub ct_refund: Wad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvRedemption {
    pub ra_out: Wad,
    pub pa_out: Wad,
    pub fee: Wad,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    pub lp_removed: Wad,
    pub ct_redeemed: Wad,
    pub ds_dropped: Wad,
    pub ra_recovered: Wad,
    pub pa_recovered: Wad,
}
