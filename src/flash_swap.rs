// 3.0 flash_swap.rs: closed-form DS pricing against a constant-product RA/CT reserve.
//
// selling DS to a caller: the caller brings a small RA premium p, the protocol virtually
// borrows b RA out of the pool, mints (b + p) worth of CT+DS, sells the CT back into the
// pool to close the loan and hands the DS over. b is the positive root of
//     (R - b) * (C + b + p) = R * C
// i.e. b^2 - (R - C - p) b - R p = 0. the root is floored so the pool never pays out more
// than the exact solution.
//
// buying DS back is the inverse: buy d CT out of the pool, pair it with the caller's d DS,
// unlock the pair's RA and return what is left after paying the pool.

use crate::math::{
    apply_exchange_rate_backward, apply_exchange_rate_forward, mul_div_up, narrow_wide, MathError,
    U512,
};
use crate::types::Wad;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("reserves must be non-zero (ra {ra_reserve}, ct {ct_reserve})")]
    ZeroReserve { ra_reserve: Wad, ct_reserve: Wad },

    #[error("provided amount must be non-zero")]
    ZeroAmount,

    #[error("quadratic has no real root")]
    NegativeDiscriminant,

    #[error("output {output} below minimum {minimum}")]
    InsufficientOutput { output: Wad, minimum: Wad },

    #[error("requested {requested} exceeds pool reserve {available}")]
    InsufficientLiquidity { requested: Wad, available: Wad },

    #[error("pool cost {cost} exceeds unlocked proceeds {proceeds}")]
    CostExceedsProceeds { cost: Wad, proceeds: Wad },

    #[error("math error: {0}")]
    Math(#[from] MathError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellDsQuote {
    pub ra_borrowed: Wad,
    pub ds_returned: Wad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyDsQuote {
    // RA paid into the pool for the CT leg
    pub ra_cost: Wad,
    // RA unlocked by the CT+DS pair
    pub ra_released: Wad,
    pub ra_returned: Wad,
}

// 3.1: protocol sells DS. CT and DS are minted 1:1 against RA.
pub fn quote_sell_ds(
    ra_reserve: Wad,
    ct_reserve: Wad,
    ra_provided: Wad,
) -> Result<SellDsQuote, PricingError> {
    quote_sell_ds_at_rate(ra_reserve, ct_reserve, ra_provided, Wad::ONE)
}

/// Same as `quote_sell_ds` with CT+DS minted at `exchange_rate` RA per claim.
/// the CT reserve is valued in RA at that rate, which keeps the invariant in RA terms.
pub fn quote_sell_ds_at_rate(
    ra_reserve: Wad,
    ct_reserve: Wad,
    ra_provided: Wad,
    exchange_rate: Wad,
) -> Result<SellDsQuote, PricingError> {
    if ra_reserve.is_zero() || ct_reserve.is_zero() {
        return Err(PricingError::ZeroReserve { ra_reserve, ct_reserve });
    }
    if ra_provided.is_zero() {
        return Err(PricingError::ZeroAmount);
    }

    let ct_value = apply_exchange_rate_backward(ct_reserve, exchange_rate)?;
    if ct_value.is_zero() {
        return Err(PricingError::ZeroReserve { ra_reserve, ct_reserve });
    }

    let borrowed = Wad::from_raw(solve_borrow(
        ra_reserve.raw(),
        ct_value.raw(),
        ra_provided.raw(),
    )?);
    if borrowed >= ra_reserve {
        return Err(PricingError::InsufficientLiquidity {
            requested: borrowed,
            available: ra_reserve,
        });
    }

    let minted_ra = borrowed.checked_add(ra_provided).ok_or(MathError::Overflow)?;
    let ds_returned = apply_exchange_rate_forward(minted_ra, exchange_rate)?;

    Ok(SellDsQuote {
        ra_borrowed: borrowed,
        ds_returned,
    })
}

// floor of the positive root of b^2 - (r - c - p) b - r p = 0
fn solve_borrow(r: u128, c: u128, p: u128) -> Result<u128, PricingError> {
    let r = U512::from(r);
    let cp = U512::from(c) + U512::from(p);
    let (k, k_negative) = if r >= cp { (r - cp, false) } else { (cp - r, true) };

    let discriminant = k * k + U512::from(4u64) * r * U512::from(p);
    let root = discriminant.integer_sqrt();

    let numerator = if k_negative {
        if root < k {
            return Err(PricingError::NegativeDiscriminant);
        }
        root - k
    } else {
        root + k
    };
    Ok(narrow_wide(numerator / U512::from(2u64))?)
}

// 3.2: protocol buys DS back. exact CT output, input rounded up against the caller.
pub fn quote_buy_ds(
    ra_reserve: Wad,
    ct_reserve: Wad,
    ds_amount: Wad,
) -> Result<BuyDsQuote, PricingError> {
    quote_buy_ds_at_rate(ra_reserve, ct_reserve, ds_amount, Wad::ONE)
}

pub fn quote_buy_ds_at_rate(
    ra_reserve: Wad,
    ct_reserve: Wad,
    ds_amount: Wad,
    exchange_rate: Wad,
) -> Result<BuyDsQuote, PricingError> {
    if ra_reserve.is_zero() || ct_reserve.is_zero() {
        return Err(PricingError::ZeroReserve { ra_reserve, ct_reserve });
    }
    if ds_amount.is_zero() {
        return Err(PricingError::ZeroAmount);
    }
    if ds_amount >= ct_reserve {
        return Err(PricingError::InsufficientLiquidity {
            requested: ds_amount,
            available: ct_reserve,
        });
    }

    let ct_left = ct_reserve.raw() - ds_amount.raw();
    let ra_cost = Wad::from_raw(mul_div_up(ra_reserve.raw(), ds_amount.raw(), ct_left)?);
    let ra_released = apply_exchange_rate_backward(ds_amount, exchange_rate)?;

    let ra_returned = ra_released
        .checked_sub(ra_cost)
        .filter(|returned| !returned.is_zero())
        .ok_or(PricingError::CostExceedsProceeds {
            cost: ra_cost,
            proceeds: ra_released,
        })?;

    Ok(BuyDsQuote {
        ra_cost,
        ra_released,
        ra_returned,
    })
}

pub fn enforce_min_output(output: Wad, minimum: Wad) -> Result<(), PricingError> {
    if output < minimum {
        return Err(PricingError::InsufficientOutput { output, minimum });
    }
    Ok(())
}
