// 4.0 issuance.rs: epoch registry. each epoch is an immutable record with its own CT/DS pair,
// pool, expiry and frozen exchange rate. lookups always go through the ledger so an epoch's
// economics never change after it is issued.

use crate::config::MAX_FEE_RATE;
use crate::engine::{ConfigurationError, ProtocolError, StateError, ValidationError};
use crate::market::FeeKind;
use crate::types::{EpochId, PoolRef, Timestamp, TokenRef, Wad};
use serde::{Deserialize, Serialize};

/** 4.1: one issuance cycle */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    pub id: EpochId,
    pub ct: TokenRef,
    pub ds: TokenRef,
    pub pool: PoolRef,
    pub issued_at: Timestamp,
    pub expiry: Timestamp,
    pub exchange_rate: Wad,
}

impl Epoch {
    // expiry is inclusive: at t == expiry the epoch is already over
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expiry
    }

    pub fn require_active(&self, now: Timestamp) -> Result<(), StateError> {
        if self.is_expired(now) {
            return Err(StateError::EpochExpired {
                epoch: self.id,
                expiry: self.expiry,
            });
        }
        Ok(())
    }

    pub fn require_expired(&self, now: Timestamp) -> Result<(), StateError> {
        if !self.is_expired(now) {
            return Err(StateError::EpochNotExpired {
                epoch: self.id,
                expiry: self.expiry,
            });
        }
        Ok(())
    }
}

/// Terms of a new epoch. the two fee rates seed the market's fee schedule, only the
/// exchange rate is frozen on the epoch itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochParams {
    pub expiry: Timestamp,
    pub exchange_rate: Wad,
    pub repurchase_fee_rate: Wad,
    pub early_redemption_fee_rate: Wad,
}

impl EpochParams {
    pub fn validate(&self, now: Timestamp, fee_ceiling: Wad) -> Result<(), ProtocolError> {
        if self.expiry <= now {
            return Err(ValidationError::ExpiryNotInFuture {
                expiry: self.expiry,
                now,
            }
            .into());
        }
        if self.exchange_rate.is_zero() {
            return Err(ValidationError::ZeroExchangeRate.into());
        }
        check_fee(FeeKind::Repurchase, self.repurchase_fee_rate, fee_ceiling)?;
        check_fee(FeeKind::EarlyRedemption, self.early_redemption_fee_rate, fee_ceiling)?;
        Ok(())
    }
}

/// `ceiling` is the configured bound. it is clamped to `MAX_FEE_RATE` whatever the config says.
pub fn check_fee(kind: FeeKind, rate: Wad, ceiling: Wad) -> Result<(), ConfigurationError> {
    let ceiling = ceiling.min(MAX_FEE_RATE);
    if rate > ceiling {
        return Err(ConfigurationError::FeeAboveCeiling {
            kind,
            rate,
            ceiling,
        });
    }
    Ok(())
}

/** 4.2: append-only epoch list. epoch n sits at index n - 1 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceLedger {
    epochs: Vec<Epoch>,
}

impl IssuanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest_id(&self) -> EpochId {
        EpochId(self.epochs.len() as u32)
    }

    pub fn next_id(&self) -> EpochId {
        self.latest_id().next()
    }

    pub fn latest(&self) -> Option<&Epoch> {
        self.epochs.last()
    }

    pub fn latest_mut(&mut self) -> Option<&mut Epoch> {
        self.epochs.last_mut()
    }

    pub fn get(&self, id: EpochId) -> Option<&Epoch> {
        if id.is_zero() {
            return None;
        }
        self.epochs.get(id.0 as usize - 1)
    }

    pub fn get_mut(&mut self, id: EpochId) -> Option<&mut Epoch> {
        if id.is_zero() {
            return None;
        }
        self.epochs.get_mut(id.0 as usize - 1)
    }

    pub fn push(&mut self, epoch: Epoch) {
        self.epochs.push(epoch);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    // out-of-range slots come back as None
    pub fn page(&self, start: usize, count: usize) -> Vec<Option<Epoch>> {
        (start..start.saturating_add(count))
            .map(|i| self.epochs.get(i).cloned())
            .collect()
    }
}
