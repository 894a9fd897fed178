// 6.0 vault.rs: liquidity vault state. idle reserves, locked redemption claims and the
// snapshot arena written at every issuance.
//
// claims are tranches keyed by the epoch that was active when they were locked (0 if none).
// tranche g is covered by snapshots[g], which is written when epoch g + 1 is issued. the
// latest generation has no snapshot yet and draws on current reserves instead.

use crate::engine::{ProtocolError, StateError, ValidationError};
use crate::math::{
    apply_exchange_rate_backward, mul_div, pro_rata, split_by_weight, value_per_share_from_lp,
    MathError,
};
use crate::types::{Address, EpochId, Wad, WAD};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPair {
    pub ra: Wad,
    pub pa: Wad,
}

/** 6.1: one holder's locked LV, oldest generation first */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionClaim {
    pub tranches: BTreeMap<EpochId, Wad>,
}

impl RedemptionClaim {
    pub fn total(&self) -> Wad {
        self.tranches.values().sum()
    }

    pub fn amount_in(&self, generation: EpochId) -> Wad {
        self.tranches.get(&generation).copied().unwrap_or_default()
    }

    fn add(&mut self, generation: EpochId, amount: Wad) -> Result<(), MathError> {
        let slot = self.tranches.entry(generation).or_default();
        *slot = slot.checked_add(amount).ok_or(MathError::Overflow)?;
        Ok(())
    }

    // takes `amount` from the oldest tranches. caller has checked the total.
    fn take_oldest(&mut self, amount: Wad) -> Vec<(EpochId, Wad)> {
        let mut left = amount;
        let mut taken = Vec::new();
        for (generation, slot) in self.tranches.iter_mut() {
            if left.is_zero() {
                break;
            }
            let part = (*slot).min(left);
            *slot = slot.saturating_sub(part);
            left = left.saturating_sub(part);
            if !part.is_zero() {
                taken.push((*generation, part));
            }
        }
        self.tranches.retain(|_, slot| !slot.is_zero());
        taken
    }

    fn split_oldest(&self, amount: Wad) -> Vec<(EpochId, Wad)> {
        let mut copy = self.clone();
        copy.take_oldest(amount)
    }
}

/** 6.2: liquidity split taken when a new epoch is issued. never rewritten afterwards,
only drawn down through `remaining` */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquiditySnapshot {
    pub issued_epoch: EpochId,
    pub generation: EpochId,
    pub locked: Wad,
    pub total_weight: Wad,
    pub reserved: AssetPair,
    pub amm_exposed: AssetPair,
    pub remaining: AssetPair,
    pub remaining_locked: Wad,
}

impl LiquiditySnapshot {
    // the last redeemer of a snapshot takes the rounding dust
    pub fn payout(&self, amount: Wad) -> Result<AssetPair, ProtocolError> {
        if amount > self.remaining_locked {
            return Err(StateError::RedemptionCapExceeded {
                requested: amount,
                cap: self.remaining_locked,
            }
            .into());
        }
        if amount == self.remaining_locked {
            return Ok(self.remaining);
        }
        Ok(AssetPair {
            ra: pro_rata(self.reserved.ra, amount, self.locked)?.min(self.remaining.ra),
            pa: pro_rata(self.reserved.pa, amount, self.locked)?.min(self.remaining.pa),
        })
    }
}

/// One slice of an expired redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionLeg {
    Covered { generation: EpochId, amount: Wad },
    Uncovered { amount: Wad },
}

/** 6.3: per-market vault bookkeeping */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    pub idle_ra: Wad,
    pub idle_pa: Wad,
    // locked LV already backed by a snapshot
    pub covered_locked: Wad,
    // locked LV of the latest generation, still exposed to the AMM
    pub uncovered_locked: Wad,
    pub claims: HashMap<Address, RedemptionClaim>,
    pub snapshots: Vec<LiquiditySnapshot>,
    pub fees_retained: Wad,
}

impl VaultState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, owner: Address) -> Wad {
        self.claims.get(&owner).map(RedemptionClaim::total).unwrap_or_default()
    }

    pub fn snapshot(&self, generation: EpochId) -> Option<&LiquiditySnapshot> {
        self.snapshots.get(generation.0 as usize)
    }

    pub fn is_covered(&self, generation: EpochId) -> bool {
        (generation.0 as usize) < self.snapshots.len()
    }

    /// LV supply still valued against idle reserves and the AMM position.
    pub fn exposed_supply(&self, lv_supply: Wad) -> Wad {
        lv_supply.saturating_sub(self.covered_locked)
    }

    // 6.4: request redemption. locked LV joins the current generation.
    pub fn lock(&mut self, owner: Address, generation: EpochId, amount: Wad) -> Result<(), MathError> {
        self.claims.entry(owner).or_default().add(generation, amount)?;
        if self.is_covered(generation) {
            self.covered_locked = self.covered_locked.checked_add(amount).ok_or(MathError::Overflow)?;
        } else {
            self.uncovered_locked = self.uncovered_locked.checked_add(amount).ok_or(MathError::Overflow)?;
        }
        Ok(())
    }

    // 6.5: move locked claims to another holder, oldest first, tranche generations kept
    pub fn transfer_claim(
        &mut self,
        from: Address,
        to: Address,
        amount: Wad,
    ) -> Result<(), ProtocolError> {
        if amount.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        let available = self.claim(from);
        if amount > available {
            return Err(StateError::InsufficientLockedBalance {
                needed: amount,
                available,
            }
            .into());
        }
        let moved = match self.claims.get_mut(&from) {
            Some(claim) => claim.take_oldest(amount),
            None => Vec::new(),
        };
        let target = self.claims.entry(to).or_default();
        for (generation, part) in moved {
            target.add(generation, part)?;
        }
        self.claims.retain(|_, claim| !claim.tranches.is_empty());
        Ok(())
    }

    /// Splits an expired redemption across the owner's tranches. covered tranches are
    /// capped by their snapshot; the latest generation only opens once it may draw on
    /// current reserves.
    pub fn plan_expired_redemption(
        &self,
        owner: Address,
        amount: Wad,
        uncovered_open: bool,
    ) -> Result<Vec<RedemptionLeg>, ProtocolError> {
        if amount.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        let claim = self.claims.get(&owner).cloned().unwrap_or_default();
        let total = claim.total();
        if amount > total {
            return Err(StateError::InsufficientLockedBalance {
                needed: amount,
                available: total,
            }
            .into());
        }

        let covered: Wad = claim
            .tranches
            .iter()
            .filter(|(generation, _)| self.is_covered(**generation))
            .map(|(_, amount)| *amount)
            .sum();
        if !uncovered_open && amount > covered {
            return Err(StateError::RedemptionCapExceeded {
                requested: amount,
                cap: covered,
            }
            .into());
        }

        Ok(claim
            .split_oldest(amount)
            .into_iter()
            .map(|(generation, part)| {
                if self.is_covered(generation) {
                    RedemptionLeg::Covered {
                        generation,
                        amount: part,
                    }
                } else {
                    RedemptionLeg::Uncovered { amount: part }
                }
            })
            .collect())
    }

    pub fn covered_payout(&self, generation: EpochId, amount: Wad) -> Result<AssetPair, ProtocolError> {
        let snapshot = self.snapshot(generation).ok_or(StateError::EpochNotFound(generation))?;
        snapshot.payout(amount)
    }

    pub fn uncovered_payout(&self, amount: Wad, exposed: Wad) -> Result<AssetPair, MathError> {
        Ok(AssetPair {
            ra: pro_rata(self.idle_ra, amount, exposed)?,
            pa: pro_rata(self.idle_pa, amount, exposed)?,
        })
    }

    pub fn consume_claim(&mut self, owner: Address, amount: Wad) {
        if let Some(claim) = self.claims.get_mut(&owner) {
            claim.take_oldest(amount);
            if claim.tranches.is_empty() {
                self.claims.remove(&owner);
            }
        }
    }

    pub fn settle_covered(
        &mut self,
        generation: EpochId,
        amount: Wad,
        paid: AssetPair,
    ) -> Result<(), MathError> {
        let snapshot = self
            .snapshots
            .get_mut(generation.0 as usize)
            .ok_or(MathError::Underflow)?;
        snapshot.remaining.ra = snapshot.remaining.ra.checked_sub(paid.ra).ok_or(MathError::Underflow)?;
        snapshot.remaining.pa = snapshot.remaining.pa.checked_sub(paid.pa).ok_or(MathError::Underflow)?;
        snapshot.remaining_locked = snapshot
            .remaining_locked
            .checked_sub(amount)
            .ok_or(MathError::Underflow)?;
        self.covered_locked = self.covered_locked.saturating_sub(amount);
        Ok(())
    }

    pub fn settle_uncovered(&mut self, amount: Wad, paid: AssetPair) -> Result<(), MathError> {
        self.idle_ra = self.idle_ra.checked_sub(paid.ra).ok_or(MathError::Underflow)?;
        self.idle_pa = self.idle_pa.checked_sub(paid.pa).ok_or(MathError::Underflow)?;
        self.uncovered_locked = self.uncovered_locked.saturating_sub(amount);
        Ok(())
    }

    // 6.6: liquidity separation. the latest generation's locked LV reserves its share of
    // idle reserves, weighted against every LV not already covered.
    pub fn separate(&mut self, issued_epoch: EpochId, lv_supply: Wad) -> Result<LiquiditySnapshot, MathError> {
        let generation = EpochId(self.snapshots.len() as u32);
        let weight = self.uncovered_locked;
        let total_weight = self.exposed_supply(lv_supply);

        let (reserved_ra, exposed_ra) = split_by_weight(self.idle_ra, weight, total_weight)?;
        let (reserved_pa, exposed_pa) = split_by_weight(self.idle_pa, weight, total_weight)?;
        let reserved = AssetPair {
            ra: reserved_ra,
            pa: reserved_pa,
        };

        let snapshot = LiquiditySnapshot {
            issued_epoch,
            generation,
            locked: weight,
            total_weight,
            reserved,
            amm_exposed: AssetPair {
                ra: exposed_ra,
                pa: exposed_pa,
            },
            remaining: reserved,
            remaining_locked: weight,
        };

        self.idle_ra = exposed_ra;
        self.idle_pa = exposed_pa;
        self.covered_locked = self.covered_locked.checked_add(weight).ok_or(MathError::Overflow)?;
        self.uncovered_locked = Wad::ZERO;
        self.snapshots.push(snapshot);
        Ok(snapshot)
    }
}

/// What one exposed LV share is worth in RA: idle RA plus the vault's slice of the pool,
/// CT valued at the epoch rate. PA is left out of the price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultValuation {
    pub exposed_supply: Wad,
    pub idle_ra: Wad,
    pub lp_total: Wad,
    pub lp_owned: Wad,
    pub pool_ra: Wad,
    pub pool_ct: Wad,
    pub exchange_rate: Wad,
}

impl VaultValuation {
    pub fn nav_per_share(&self) -> Result<Wad, MathError> {
        if self.exposed_supply.is_zero() {
            return Ok(Wad::ZERO);
        }
        let idle = mul_div(self.idle_ra.raw(), WAD, self.exposed_supply.raw())?;
        let (ra_ps, ct_ps) = if self.lp_total.is_zero() || self.lp_owned.is_zero() {
            (Wad::ZERO, Wad::ZERO)
        } else {
            value_per_share_from_lp(
                self.lp_total,
                self.lp_owned,
                self.pool_ra,
                self.pool_ct,
                self.exposed_supply,
            )?
        };
        let ct_value = apply_exchange_rate_backward(ct_ps, self.exchange_rate)?;
        Wad::from_raw(idle)
            .checked_add(ra_ps)
            .and_then(|v| v.checked_add(ct_value))
            .ok_or(MathError::Overflow)
    }

    /// 1:1 while there is nothing to value, otherwise amount / NAV per share.
    pub fn shares_for_deposit(&self, amount: Wad) -> Result<Wad, MathError> {
        let nav = self.nav_per_share()?;
        if nav.is_zero() {
            return Ok(amount);
        }
        Ok(Wad::from_raw(mul_div(amount.raw(), WAD, nav.raw())?))
    }
}
