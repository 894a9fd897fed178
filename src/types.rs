// 1.0: all the primitives live here. nothing in the engine works without these types.
// identities, fixed-point amounts, epochs, timestamps. each is a newtype so the compiler catches mixups.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// 1.0 in fixed point. amounts, rates and ratios all share this scale.
pub const WAD: u128 = 1_000_000_000_000_000_000;
pub const WAD_DECIMALS: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub u64);

impl Address {
    pub const ZERO: Address = Address(0);
    /// spender named in allowances and permits handed to the protocol
    pub const PROTOCOL: Address = Address(u64::MAX);
    /// custody of RA/PA backing issued CT/DS
    pub const PSM: Address = Address(u64::MAX - 1);
    /// custody of vault reserves, vault-held CT/DS and locked LV
    pub const VAULT: Address = Address(u64::MAX - 2);
    /// custody of AMM pool reserves
    pub const AMM: Address = Address(u64::MAX - 3);

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenRef(pub u64);

impl TokenRef {
    pub const ZERO: TokenRef = TokenRef(0);

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolRef(pub u64);

// 1.1: market key. deterministic in (PA, RA) so the same pair always lands on the same market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketId(pub [u8; 32]);

impl MarketId {
    pub fn derive(pa: TokenRef, ra: TokenRef) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"depeg-core/market");
        hasher.update(pa.0.to_be_bytes());
        hasher.update(ra.0.to_be_bytes());
        let digest = hasher.finalize();
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        Self(id)
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

// 1.2: epochs are 1-indexed. zero means "nothing issued yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EpochId(pub u32);

impl EpochId {
    pub const ZERO: EpochId = EpochId(0);

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// 1.3: unsigned 18-decimal fixed point. token amounts, exchange rates, price ratios and
// percentage rates (100% == 100 * WAD) are all Wads. math never goes through Decimal,
// Decimal is only the human-facing literal/display format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Wad(u128);

impl Wad {
    pub const ZERO: Wad = Wad(0);
    pub const ONE: Wad = Wad(WAD);

    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u128 {
        self.0
    }

    pub fn from_int(units: u64) -> Self {
        Self(units as u128 * WAD)
    }

    /// Exact for up to 18 decimal places, truncates beyond. None for negatives or overflow.
    #[must_use]
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        if value < Decimal::ZERO {
            return None;
        }
        let mantissa = u128::try_from(value.mantissa()).ok()?;
        let scale = value.scale();
        if scale <= WAD_DECIMALS {
            mantissa
                .checked_mul(10u128.pow(WAD_DECIMALS - scale))
                .map(Self)
        } else {
            Some(Self(mantissa / 10u128.pow(scale - WAD_DECIMALS)))
        }
    }

    /// None when the value does not fit Decimal's 96-bit mantissa.
    pub fn to_decimal(&self) -> Option<Decimal> {
        let raw = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(raw, WAD_DECIMALS)
            .ok()
            .map(|d| d.normalize())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Wad) -> Option<Wad> {
        self.0.checked_add(other.0).map(Wad)
    }

    pub fn checked_sub(&self, other: Wad) -> Option<Wad> {
        self.0.checked_sub(other.0).map(Wad)
    }

    pub fn saturating_sub(&self, other: Wad) -> Wad {
        Wad(self.0.saturating_sub(other.0))
    }
}

impl Add for Wad {
    type Output = Wad;

    fn add(self, other: Wad) -> Wad {
        Wad(self.0 + other.0)
    }
}

impl AddAssign for Wad {
    fn add_assign(&mut self, other: Wad) {
        self.0 += other.0;
    }
}

impl Sum for Wad {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Wad::ZERO, |acc, w| acc + w)
    }
}

impl<'a> Sum<&'a Wad> for Wad {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Wad::ZERO, |acc, w| acc + *w)
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / WAD;
        let frac = self.0 % WAD;
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            let digits = format!("{frac:018}");
            write!(f, "{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

// 1.4: unix timestamp in seconds. the engine's clock is supplied from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp())
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0 + secs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp(self.0, 0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%SZ")),
            None => write!(f, "{}s", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn wad_from_decimal_is_exact() {
        assert_eq!(Wad::from_decimal(dec!(1)).unwrap(), Wad::ONE);
        assert_eq!(Wad::from_decimal(dec!(0.5)).unwrap().raw(), WAD / 2);
        assert_eq!(
            Wad::from_decimal(dec!(6.666666666666666666)).unwrap().raw(),
            6_666_666_666_666_666_666
        );
        assert!(Wad::from_decimal(dec!(-1)).is_none());
    }

    #[test]
    fn wad_display_trims_fraction() {
        assert_eq!(Wad::from_int(10).to_string(), "10");
        assert_eq!(Wad::from_raw(3_333_333_333_333_333_334).to_string(), "3.333333333333333334");
        assert_eq!(Wad::from_decimal(dec!(0.95)).unwrap().to_string(), "0.95");
    }

    #[test]
    fn wad_decimal_roundtrip() {
        let w = Wad::from_decimal(dec!(1234.5678)).unwrap();
        assert_eq!(w.to_decimal().unwrap(), dec!(1234.5678));
    }

    #[test]
    fn market_id_is_deterministic_and_ordered() {
        let a = MarketId::derive(TokenRef(1), TokenRef(2));
        let b = MarketId::derive(TokenRef(1), TokenRef(2));
        let swapped = MarketId::derive(TokenRef(2), TokenRef(1));
        assert_eq!(a, b);
        assert_ne!(a, swapped);
        assert_eq!(a.to_string().len(), 16);
    }

    #[test]
    fn epoch_ids_count_up() {
        assert!(EpochId::ZERO.is_zero());
        assert_eq!(EpochId::ZERO.next(), EpochId(1));
    }
}
