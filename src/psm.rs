// 5.0 psm.rs: per-epoch PSM book and the pure quote math behind every PSM entry point.
// the engine runs a preview, checks balances and permissions, then applies the same
// numbers with the apply_* methods. previews and mutations can never disagree.
//
// backing per epoch: locked RA + PA held always covers the outstanding CT, and before
// expiry locked RA also covers every outstanding DS at the frozen rate.

use crate::engine::{
    CtRedemption, DsRedemption, ProtocolError, RepurchaseReceipt, StateError, ValidationError,
};
use crate::math::{
    apply_exchange_rate_backward, apply_exchange_rate_forward, percentage_fee, pro_rata, MathError,
};
use crate::types::Wad;
use serde::{Deserialize, Serialize};

/// Unmatched PA and DS left behind by redeem-with-DS, waiting for a repurchase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepurchaseAccumulator {
    pub pa: Wad,
    pub ds: Wad,
}

/** 5.1: what the PSM holds for one epoch */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochBook {
    pub locked_ra: Wad,
    pub pa_held: Wad,
    pub ct_issued: Wad,
    // burned by CT redemption and pair cancellation
    pub ct_retired: Wad,
    pub available_for_repurchase: RepurchaseAccumulator,
}

fn sub(a: Wad, b: Wad) -> Result<Wad, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

fn add(a: Wad, b: Wad) -> Result<Wad, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

impl EpochBook {
    pub fn ct_outstanding(&self) -> Wad {
        self.ct_issued.saturating_sub(self.ct_retired)
    }

    // 5.2: deposit. claims minted at the frozen rate.
    pub fn preview_deposit(ra: Wad, exchange_rate: Wad) -> Result<Wad, ProtocolError> {
        if ra.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        Ok(apply_exchange_rate_forward(ra, exchange_rate)?)
    }

    pub fn apply_deposit(&mut self, ra: Wad, minted: Wad) -> Result<(), MathError> {
        self.locked_ra = add(self.locked_ra, ra)?;
        self.ct_issued = add(self.ct_issued, minted)?;
        Ok(())
    }

    // 5.3: redeem with DS before expiry. one PA comes in per DS burned.
    pub fn preview_redeem_with_ds(
        &self,
        ds: Wad,
        exchange_rate: Wad,
        fee_rate: Wad,
    ) -> Result<DsRedemption, ProtocolError> {
        if ds.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        let ra_gross = apply_exchange_rate_backward(ds, exchange_rate)?;
        let fee = percentage_fee(fee_rate, ra_gross)?;
        let ra_out = sub(ra_gross, fee)?;
        if ra_out > self.locked_ra {
            return Err(StateError::InsufficientLockedBalance {
                needed: ra_out,
                available: self.locked_ra,
            }
            .into());
        }
        Ok(DsRedemption {
            ra_gross,
            fee,
            ra_out,
            pa_in: ds,
        })
    }

    pub fn apply_redeem_with_ds(&mut self, quote: &DsRedemption) -> Result<(), MathError> {
        // the fee stays locked behind CT
        self.locked_ra = sub(self.locked_ra, quote.ra_out)?;
        self.pa_held = add(self.pa_held, quote.pa_in)?;
        self.available_for_repurchase.pa = add(self.available_for_repurchase.pa, quote.pa_in)?;
        self.available_for_repurchase.ds = add(self.available_for_repurchase.ds, quote.pa_in)?;
        Ok(())
    }

    // 5.4: redeem with CT after expiry. pro-rata over what is still outstanding.
    pub fn preview_redeem_with_ct(&self, ct: Wad) -> Result<CtRedemption, ProtocolError> {
        if ct.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        let outstanding = self.ct_outstanding();
        if ct > outstanding {
            return Err(StateError::InsufficientLockedBalance {
                needed: ct,
                available: outstanding,
            }
            .into());
        }
        Ok(CtRedemption {
            ra_out: pro_rata(self.locked_ra, ct, outstanding)?,
            pa_out: pro_rata(self.pa_held, ct, outstanding)?,
        })
    }

    pub fn apply_redeem_with_ct(&mut self, ct: Wad, quote: &CtRedemption) -> Result<(), MathError> {
        self.locked_ra = sub(self.locked_ra, quote.ra_out)?;
        self.pa_held = sub(self.pa_held, quote.pa_out)?;
        self.ct_retired = add(self.ct_retired, ct)?;
        Ok(())
    }

    // 5.5: repurchase before expiry. fee is charged on the PA leg and stays in the book.
    pub fn preview_repurchase(
        &self,
        ra: Wad,
        exchange_rate: Wad,
        fee_rate: Wad,
    ) -> Result<RepurchaseReceipt, ProtocolError> {
        if ra.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        let pa_gross = apply_exchange_rate_forward(ra, exchange_rate)?;
        let available = self.available_for_repurchase.pa;
        if pa_gross > available {
            return Err(StateError::RepurchaseExceedsAvailable {
                requested: pa_gross,
                available,
            }
            .into());
        }
        let fee = percentage_fee(fee_rate, pa_gross)?;
        Ok(RepurchaseReceipt {
            pa_gross,
            fee,
            pa_out: sub(pa_gross, fee)?,
            ds_retired: pa_gross,
        })
    }

    pub fn apply_repurchase(&mut self, ra: Wad, quote: &RepurchaseReceipt) -> Result<(), MathError> {
        self.locked_ra = add(self.locked_ra, ra)?;
        self.pa_held = sub(self.pa_held, quote.pa_out)?;
        self.available_for_repurchase.pa = sub(self.available_for_repurchase.pa, quote.pa_gross)?;
        self.available_for_repurchase.ds = self
            .available_for_repurchase
            .ds
            .saturating_sub(quote.ds_retired);
        Ok(())
    }

    // 5.6: cancel a CT+DS pair back into RA. valid on either side of expiry.
    pub fn preview_cancel(&self, pairs: Wad, exchange_rate: Wad) -> Result<Wad, ProtocolError> {
        if pairs.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        let ra_out = apply_exchange_rate_backward(pairs, exchange_rate)?;
        if ra_out > self.locked_ra || pairs > self.ct_outstanding() {
            return Err(StateError::InsufficientLockedBalance {
                needed: ra_out,
                available: self.locked_ra,
            }
            .into());
        }
        Ok(ra_out)
    }

    pub fn apply_cancel(&mut self, pairs: Wad, ra_out: Wad) -> Result<(), MathError> {
        self.locked_ra = sub(self.locked_ra, ra_out)?;
        self.ct_retired = add(self.ct_retired, pairs)?;
        Ok(())
    }
}
