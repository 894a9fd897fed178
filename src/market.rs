//! Market configuration and state.
//!
//! A market is one (PA, RA) pair with its LV token, its epoch ledger, the PSM books for
//! every epoch and the vault's bookkeeping.

use crate::engine::StateError;
use crate::issuance::{Epoch, IssuanceLedger};
use crate::psm::EpochBook;
use crate::types::{EpochId, MarketId, Timestamp, TokenRef, Wad, WAD};
use crate::vault::VaultState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fee rates a manager can set. all are percentages where 100% is `100 * WAD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    /// Charged on the PA leg of a repurchase
    Repurchase,
    /// Charged on RA paid out by an early LV redemption, retained by the vault
    EarlyRedemption,
    /// Charged on RA paid out by redeem-with-DS, retained behind CT
    BaseRedemption,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRates {
    pub repurchase: Wad,
    pub early_redemption: Wad,
    pub base_redemption: Wad,
}

impl FeeRates {
    pub fn get(&self, kind: FeeKind) -> Wad {
        match kind {
            FeeKind::Repurchase => self.repurchase,
            FeeKind::EarlyRedemption => self.early_redemption,
            FeeKind::BaseRedemption => self.base_redemption,
        }
    }

    pub fn set(&mut self, kind: FeeKind, rate: Wad) {
        match kind {
            FeeKind::Repurchase => self.repurchase = rate,
            FeeKind::EarlyRedemption => self.early_redemption = rate,
            FeeKind::BaseRedemption => self.base_redemption = rate,
        }
    }
}

/// Supplied once at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
    /// RA per CT used to seed a fresh pool
    pub initial_ct_price: Wad,
    pub base_redemption_fee_rate: Wad,
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            // 0.1 RA per CT
            initial_ct_price: Wad::from_raw(WAD / 10),
            base_redemption_fee_rate: Wad::ZERO,
        }
    }
}

/// Lightweight row returned by market pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub id: MarketId,
    pub pa: TokenRef,
    pub ra: TokenRef,
    pub lv: TokenRef,
    pub latest_epoch: EpochId,
}

/// Runtime state of one market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub pa: TokenRef,
    pub ra: TokenRef,
    pub lv: TokenRef,
    pub params: MarketParams,
    pub fees: FeeRates,
    pub ledger: IssuanceLedger,
    pub books: BTreeMap<EpochId, EpochBook>,
    pub vault: VaultState,
    pub created_at: Timestamp,
}

impl Market {
    pub fn new(pa: TokenRef, ra: TokenRef, lv: TokenRef, params: MarketParams, now: Timestamp) -> Self {
        Self {
            id: MarketId::derive(pa, ra),
            pa,
            ra,
            lv,
            params,
            fees: FeeRates {
                base_redemption: params.base_redemption_fee_rate,
                ..FeeRates::default()
            },
            ledger: IssuanceLedger::new(),
            books: BTreeMap::new(),
            vault: VaultState::new(),
            created_at: now,
        }
    }

    pub fn summary(&self) -> MarketSummary {
        MarketSummary {
            id: self.id,
            pa: self.pa,
            ra: self.ra,
            lv: self.lv,
            latest_epoch: self.ledger.latest_id(),
        }
    }

    pub fn latest_epoch(&self) -> Result<&Epoch, StateError> {
        self.ledger.latest().ok_or(StateError::NoActiveEpoch(self.id))
    }

    pub fn epoch(&self, id: EpochId) -> Result<&Epoch, StateError> {
        self.ledger.get(id).ok_or(StateError::EpochNotFound(id))
    }

    /// Latest epoch, required to still be running at `now`.
    pub fn active_epoch(&self, now: Timestamp) -> Result<&Epoch, StateError> {
        let epoch = self.latest_epoch()?;
        epoch.require_active(now)?;
        Ok(epoch)
    }

    pub fn book(&self, id: EpochId) -> Result<&EpochBook, StateError> {
        self.books.get(&id).ok_or(StateError::EpochNotFound(id))
    }

    pub fn book_mut(&mut self, id: EpochId) -> Result<&mut EpochBook, StateError> {
        self.books.get_mut(&id).ok_or(StateError::EpochNotFound(id))
    }

    /// Early LV exits are open while the latest epoch runs, or before the first issuance.
    pub fn early_exit_open(&self, now: Timestamp) -> bool {
        self.ledger.latest().map_or(true, |e| !e.is_expired(now))
    }

    /// The latest generation of locked LV may draw on current reserves once its epoch
    /// is over, or when nothing has been issued yet.
    pub fn uncovered_redemption_open(&self, now: Timestamp) -> bool {
        self.ledger.latest().map_or(true, |e| e.is_expired(now))
    }
}
