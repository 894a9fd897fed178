// 2.0 math.rs: fixed-point library. every division truncates toward zero and every split
// hands its remainder to a named leg, so legs always sum back to the input exactly.
// products are formed in U256 (U512 for Q64.96 squares and discriminants) so nothing
// overflows before the final division.

#![allow(clippy::assign_op_pattern, clippy::manual_range_contains)]

use crate::types::{Wad, WAD};
use serde::{Deserialize, Serialize};
use uint::construct_uint;

construct_uint! {
    pub struct U256(4);
}

construct_uint! {
    pub struct U512(8);
}

/// 100% for percentage rates. 5% is `5 * WAD`.
pub const PERCENT_SCALE: u128 = 100 * WAD;

/// Q64.96 prices carry 96 fractional bits; squaring doubles that.
const Q192_SHIFT: usize = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum MathError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("arithmetic underflow")]
    Underflow,
}

// 2.1: raw integer helpers

pub fn mul_div(a: u128, b: u128, denominator: u128) -> Result<u128, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    narrow(product / U256::from(denominator))
}

pub fn mul_div_up(a: u128, b: u128, denominator: u128) -> Result<u128, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    let denominator = U256::from(denominator);
    let quotient = product / denominator;
    if (product % denominator).is_zero() {
        narrow(quotient)
    } else {
        narrow(quotient + U256::one())
    }
}

pub fn narrow(value: U256) -> Result<u128, MathError> {
    if value > U256::from(u128::MAX) {
        return Err(MathError::Overflow);
    }
    Ok(value.low_u128())
}

pub fn narrow_wide(value: U512) -> Result<u128, MathError> {
    if value > U512::from(u128::MAX) {
        return Err(MathError::Overflow);
    }
    Ok(value.low_u128())
}

pub fn widen(value: U256) -> U512 {
    let mut bytes = [0u8; 32];
    value.to_little_endian(&mut bytes);
    U512::from_little_endian(&bytes)
}

// 2.2: splits. the second leg always absorbs the remainder.

/// Splits a deposit into two AMM legs at `ratio` (second-leg units per first-leg unit).
/// leg1 = amount / (1 + ratio), leg2 = amount - leg1.
pub fn split_by_ratio(amount: Wad, ratio: Wad) -> Result<(Wad, Wad), MathError> {
    let denominator = WAD.checked_add(ratio.raw()).ok_or(MathError::Overflow)?;
    let leg1 = mul_div(amount.raw(), WAD, denominator)?;
    Ok((Wad::from_raw(leg1), Wad::from_raw(amount.raw() - leg1)))
}

/// a = amount * issued / total, b = amount - a. zero weight never divides.
pub fn split_by_weight(
    amount: Wad,
    issued_weight: Wad,
    total_weight: Wad,
) -> Result<(Wad, Wad), MathError> {
    if issued_weight.is_zero() {
        return Ok((Wad::ZERO, amount));
    }
    if issued_weight > total_weight {
        return Err(MathError::Underflow);
    }
    let a = mul_div(amount.raw(), issued_weight.raw(), total_weight.raw())?;
    Ok((Wad::from_raw(a), Wad::from_raw(amount.raw() - a)))
}

// 2.3: proportional shares and fees

pub fn pro_rata(total: Wad, numerator: Wad, denominator: Wad) -> Result<Wad, MathError> {
    mul_div(total.raw(), numerator.raw(), denominator.raw()).map(Wad::from_raw)
}

/// amount * rate / (100 * WAD). never exceeds amount for rates up to 100%.
pub fn percentage_fee(rate: Wad, amount: Wad) -> Result<Wad, MathError> {
    mul_div(amount.raw(), rate.raw(), PERCENT_SCALE).map(Wad::from_raw)
}

// 2.4: exchange rate. forward converts principal into claims, backward converts back.

pub fn apply_exchange_rate_forward(amount: Wad, rate: Wad) -> Result<Wad, MathError> {
    mul_div(amount.raw(), WAD, rate.raw()).map(Wad::from_raw)
}

pub fn apply_exchange_rate_backward(amount: Wad, rate: Wad) -> Result<Wad, MathError> {
    mul_div(amount.raw(), rate.raw(), WAD).map(Wad::from_raw)
}

/// Backward conversion rounded up. used where the protocol must never under-collateralize.
pub fn apply_exchange_rate_backward_up(amount: Wad, rate: Wad) -> Result<Wad, MathError> {
    mul_div_up(amount.raw(), rate.raw(), WAD).map(Wad::from_raw)
}

// 2.5: AMM price decoding and LP valuation

/// sqrtPriceX96^2 * 10^decimals / 2^192. the sqrt price must fit 160 bits.
pub fn decode_sqrt_price_ratio(sqrt_price_x96: U256, token_decimals: u8) -> Result<Wad, MathError> {
    if sqrt_price_x96.bits() > 160 {
        return Err(MathError::Overflow);
    }
    let decimals_factor = 10u128
        .checked_pow(u32::from(token_decimals))
        .ok_or(MathError::Overflow)?;
    let sqrt_price = widen(sqrt_price_x96);
    let scaled = sqrt_price * sqrt_price * U512::from(decimals_factor);
    narrow_wide(scaled >> Q192_SHIFT).map(Wad::from_raw)
}

/// underlying reserves behind one whole LP token.
pub fn lp_underlying_value(
    total_lp_supply: Wad,
    reserve_x: Wad,
    reserve_y: Wad,
) -> Result<(Wad, Wad), MathError> {
    let x = mul_div(reserve_x.raw(), WAD, total_lp_supply.raw())?;
    let y = mul_div(reserve_y.raw(), WAD, total_lp_supply.raw())?;
    Ok((Wad::from_raw(x), Wad::from_raw(y)))
}

/// owned slice of the reserves spread over the outstanding vault shares.
/// results are per whole share, scaled like every other Wad.
pub fn value_per_share_from_lp(
    total_lp_supply: Wad,
    lp_owned: Wad,
    reserve_x: Wad,
    reserve_y: Wad,
    share_supply: Wad,
) -> Result<(Wad, Wad), MathError> {
    let owned_share = mul_div(lp_owned.raw(), WAD, total_lp_supply.raw())?;
    let x = mul_div(reserve_x.raw(), owned_share, share_supply.raw())?;
    let y = mul_div(reserve_y.raw(), owned_share, share_supply.raw())?;
    Ok((Wad::from_raw(x), Wad::from_raw(y)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn w(value: Decimal) -> Wad {
        Wad::from_decimal(value).unwrap()
    }

    #[test]
    fn split_by_ratio_gives_remainder_to_second_leg() {
        let (leg1, leg2) = split_by_ratio(w(dec!(10)), w(dec!(0.5))).unwrap();
        assert_eq!(leg1.raw(), 6_666_666_666_666_666_666);
        assert_eq!(leg2.raw(), 3_333_333_333_333_333_334);
        assert_eq!(leg1 + leg2, w(dec!(10)));
    }

    #[test]
    fn split_by_ratio_zero_ratio_keeps_everything_in_first_leg() {
        let (leg1, leg2) = split_by_ratio(w(dec!(7)), Wad::ZERO).unwrap();
        assert_eq!(leg1, w(dec!(7)));
        assert!(leg2.is_zero());
    }

    #[test]
    fn split_by_weight_edges() {
        let amount = w(dec!(100));
        assert_eq!(split_by_weight(amount, Wad::ZERO, w(dec!(5))).unwrap(), (Wad::ZERO, amount));
        assert_eq!(split_by_weight(amount, Wad::ZERO, Wad::ZERO).unwrap(), (Wad::ZERO, amount));
        assert_eq!(split_by_weight(amount, w(dec!(5)), w(dec!(5))).unwrap(), (amount, Wad::ZERO));
        assert_eq!(
            split_by_weight(amount, w(dec!(1)), w(dec!(4))).unwrap(),
            (w(dec!(25)), w(dec!(75)))
        );
        assert_eq!(
            split_by_weight(amount, w(dec!(6)), w(dec!(5))),
            Err(MathError::Underflow)
        );
    }

    #[test]
    fn early_fee_example() {
        let fee = percentage_fee(w(dec!(5)), Wad::ONE).unwrap();
        assert_eq!(fee, w(dec!(0.05)));
        assert_eq!(Wad::ONE.checked_sub(fee).unwrap(), w(dec!(0.95)));
    }

    #[test]
    fn exchange_rate_conversions() {
        let two = w(dec!(2));
        assert_eq!(apply_exchange_rate_forward(w(dec!(10)), two).unwrap(), w(dec!(5)));
        assert_eq!(apply_exchange_rate_backward(w(dec!(5)), two).unwrap(), w(dec!(10)));
        assert_eq!(
            apply_exchange_rate_forward(w(dec!(10)), Wad::ZERO),
            Err(MathError::DivisionByZero)
        );
    }

    #[test]
    fn backward_up_rounds_toward_collateral() {
        let third = Wad::from_raw(WAD / 3);
        let down = apply_exchange_rate_backward(Wad::from_raw(10), third).unwrap();
        let up = apply_exchange_rate_backward_up(Wad::from_raw(10), third).unwrap();
        assert_eq!(down.raw() + 1, up.raw());
    }

    #[test]
    fn decode_unit_and_quadruple_price() {
        let q96 = U256::one() << 96usize;
        assert_eq!(decode_sqrt_price_ratio(q96, 18).unwrap(), Wad::ONE);

        let q97 = U256::one() << 97usize;
        assert_eq!(decode_sqrt_price_ratio(q97, 18).unwrap(), w(dec!(4)));

        // 6-decimal token: same price, smaller factor
        assert_eq!(decode_sqrt_price_ratio(q96, 6).unwrap().raw(), 1_000_000);
    }

    #[test]
    fn decode_rejects_oversized_sqrt_price() {
        let too_big = U256::one() << 161usize;
        assert_eq!(decode_sqrt_price_ratio(too_big, 18), Err(MathError::Overflow));
    }

    #[test]
    fn lp_valuation() {
        let (x, y) = lp_underlying_value(w(dec!(100)), w(dec!(200)), w(dec!(50))).unwrap();
        assert_eq!(x, w(dec!(2)));
        assert_eq!(y, w(dec!(0.5)));

        // own half the pool, 50 shares outstanding
        let (xs, ys) =
            value_per_share_from_lp(w(dec!(100)), w(dec!(50)), w(dec!(200)), w(dec!(50)), w(dec!(50)))
                .unwrap();
        assert_eq!(xs, w(dec!(2)));
        assert_eq!(ys, w(dec!(0.5)));
    }

    #[test]
    fn pro_rata_truncates() {
        let share = pro_rata(w(dec!(10)), Wad::ONE, w(dec!(3))).unwrap();
        assert_eq!(share.raw(), 3_333_333_333_333_333_333);
        assert_eq!(pro_rata(Wad::ONE, Wad::ONE, Wad::ZERO), Err(MathError::DivisionByZero));
    }

    #[test]
    fn mul_div_overflow_is_reported() {
        assert_eq!(mul_div(u128::MAX, u128::MAX, 1), Err(MathError::Overflow));
        assert_eq!(mul_div(u128::MAX, u128::MAX, u128::MAX).unwrap(), u128::MAX);
    }
}
