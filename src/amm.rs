// 9.5 amm.rs: AMM collaborator. one RA/CT pool per epoch.
// the gateway only does pool accounting (reserves, LP supply, swap math). token movements
// in and out of the pool are mirrored on the token ledger by the engine under Address::AMM.

use crate::math::{mul_div, narrow, MathError, U256, U512};
use crate::types::{Address, PoolRef, TokenRef, Wad};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw LP units locked forever at the first provision of every pool.
pub const MINIMUM_LIQUIDITY: u128 = 1000;

const Q192_SHIFT: usize = 192;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolReserves {
    pub ra: Wad,
    pub ct: Wad,
}

impl PoolReserves {
    pub fn is_empty(&self) -> bool {
        self.ra.is_zero() || self.ct.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDirection {
    RaForCt,
    CtForRa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityQuote {
    pub ra_used: Wad,
    pub ct_used: Wad,
    pub lp_minted: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmmError {
    #[error("unknown pool {0:?}")]
    UnknownPool(PoolRef),

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("first provision of {liquidity} raw LP does not clear the locked minimum")]
    InsufficientInitialLiquidity { liquidity: u128 },

    #[error("provision would mint zero LP")]
    ZeroLiquidityMinted,

    #[error("pool has no liquidity")]
    EmptyPool,

    #[error("LP balance {available} below {requested}")]
    InsufficientLpBalance { requested: Wad, available: Wad },

    #[error("math error: {0}")]
    Math(#[from] MathError),
}

pub trait AmmGateway {
    fn open_pool(&mut self, ra: TokenRef, ct: TokenRef) -> PoolRef;

    fn current_reserves(&self, pool: PoolRef) -> Result<PoolReserves, AmmError>;

    fn total_supply(&self, pool: PoolRef) -> Result<Wad, AmmError>;

    fn lp_balance(&self, pool: PoolRef, who: Address) -> Result<Wad, AmmError>;

    // RA per CT, Q64.96
    fn sqrt_price_x96(&self, pool: PoolRef) -> Result<U256, AmmError>;

    fn quote_add_liquidity(&self, pool: PoolRef, ra: Wad, ct: Wad)
        -> Result<LiquidityQuote, AmmError>;

    fn add_liquidity(
        &mut self,
        pool: PoolRef,
        provider: Address,
        ra: Wad,
        ct: Wad,
    ) -> Result<LiquidityQuote, AmmError>;

    fn quote_remove_liquidity(&self, pool: PoolRef, lp: Wad) -> Result<PoolReserves, AmmError>;

    fn remove_liquidity(
        &mut self,
        pool: PoolRef,
        provider: Address,
        lp: Wad,
    ) -> Result<PoolReserves, AmmError>;

    fn quote_swap(
        &self,
        pool: PoolRef,
        amount_in: Wad,
        direction: SwapDirection,
    ) -> Result<Wad, AmmError>;

    fn swap(
        &mut self,
        pool: PoolRef,
        amount_in: Wad,
        direction: SwapDirection,
    ) -> Result<Wad, AmmError>;
}

#[derive(Debug, Clone)]
struct PoolState {
    ra_token: TokenRef,
    ct_token: TokenRef,
    reserves: PoolReserves,
    // includes the locked minimum
    total_supply: Wad,
    lp: HashMap<Address, Wad>,
}

/** 9.6: fee-less x*y=k pools */
#[derive(Debug, Clone, Default)]
pub struct ConstantProductAmm {
    pools: HashMap<PoolRef, PoolState>,
    next_id: u64,
}

impl ConstantProductAmm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool_tokens(&self, pool: PoolRef) -> Option<(TokenRef, TokenRef)> {
        self.pools.get(&pool).map(|p| (p.ra_token, p.ct_token))
    }

    fn pool(&self, pool: PoolRef) -> Result<&PoolState, AmmError> {
        self.pools.get(&pool).ok_or(AmmError::UnknownPool(pool))
    }

    fn pool_mut(&mut self, pool: PoolRef) -> Result<&mut PoolState, AmmError> {
        self.pools.get_mut(&pool).ok_or(AmmError::UnknownPool(pool))
    }
}

fn quote_provision(state: &PoolState, ra: Wad, ct: Wad) -> Result<LiquidityQuote, AmmError> {
    if ra.is_zero() || ct.is_zero() {
        return Err(AmmError::ZeroAmount);
    }

    if state.total_supply.is_zero() {
        let liquidity = narrow((U256::from(ra.raw()) * U256::from(ct.raw())).integer_sqrt())?;
        if liquidity <= MINIMUM_LIQUIDITY {
            return Err(AmmError::InsufficientInitialLiquidity { liquidity });
        }
        return Ok(LiquidityQuote {
            ra_used: ra,
            ct_used: ct,
            lp_minted: Wad::from_raw(liquidity - MINIMUM_LIQUIDITY),
        });
    }

    let PoolReserves { ra: r, ct: c } = state.reserves;
    if r.is_zero() || c.is_zero() {
        return Err(AmmError::EmptyPool);
    }

    // deposit at the pool ratio, leftovers stay with the provider
    let ct_optimal = mul_div(ra.raw(), c.raw(), r.raw())?;
    let (ra_used, ct_used) = if ct_optimal <= ct.raw() {
        (ra.raw(), ct_optimal)
    } else {
        (mul_div(ct.raw(), r.raw(), c.raw())?, ct.raw())
    };

    let supply = state.total_supply.raw();
    let lp_minted = mul_div(ra_used, supply, r.raw())?.min(mul_div(ct_used, supply, c.raw())?);
    if lp_minted == 0 {
        return Err(AmmError::ZeroLiquidityMinted);
    }

    Ok(LiquidityQuote {
        ra_used: Wad::from_raw(ra_used),
        ct_used: Wad::from_raw(ct_used),
        lp_minted: Wad::from_raw(lp_minted),
    })
}

fn quote_withdrawal(state: &PoolState, lp: Wad) -> Result<PoolReserves, AmmError> {
    if lp.is_zero() {
        return Err(AmmError::ZeroAmount);
    }
    let supply = state.total_supply.raw();
    Ok(PoolReserves {
        ra: Wad::from_raw(mul_div(state.reserves.ra.raw(), lp.raw(), supply)?),
        ct: Wad::from_raw(mul_div(state.reserves.ct.raw(), lp.raw(), supply)?),
    })
}

fn quote_exact_in(
    state: &PoolState,
    amount_in: Wad,
    direction: SwapDirection,
) -> Result<Wad, AmmError> {
    if amount_in.is_zero() {
        return Err(AmmError::ZeroAmount);
    }
    if state.reserves.is_empty() {
        return Err(AmmError::EmptyPool);
    }
    let (reserve_in, reserve_out) = match direction {
        SwapDirection::RaForCt => (state.reserves.ra, state.reserves.ct),
        SwapDirection::CtForRa => (state.reserves.ct, state.reserves.ra),
    };
    let denominator = reserve_in
        .checked_add(amount_in)
        .ok_or(MathError::Overflow)?;
    let out = mul_div(amount_in.raw(), reserve_out.raw(), denominator.raw())?;
    Ok(Wad::from_raw(out))
}

impl AmmGateway for ConstantProductAmm {
    fn open_pool(&mut self, ra: TokenRef, ct: TokenRef) -> PoolRef {
        self.next_id += 1;
        let id = PoolRef(self.next_id);
        self.pools.insert(
            id,
            PoolState {
                ra_token: ra,
                ct_token: ct,
                reserves: PoolReserves::default(),
                total_supply: Wad::ZERO,
                lp: HashMap::new(),
            },
        );
        id
    }

    fn current_reserves(&self, pool: PoolRef) -> Result<PoolReserves, AmmError> {
        Ok(self.pool(pool)?.reserves)
    }

    fn total_supply(&self, pool: PoolRef) -> Result<Wad, AmmError> {
        Ok(self.pool(pool)?.total_supply)
    }

    fn lp_balance(&self, pool: PoolRef, who: Address) -> Result<Wad, AmmError> {
        Ok(self.pool(pool)?.lp.get(&who).copied().unwrap_or_default())
    }

    fn sqrt_price_x96(&self, pool: PoolRef) -> Result<U256, AmmError> {
        let reserves = self.pool(pool)?.reserves;
        if reserves.is_empty() {
            return Ok(U256::zero());
        }
        let ratio_x192 = (U512::from(reserves.ra.raw()) << Q192_SHIFT) / U512::from(reserves.ct.raw());
        let root = ratio_x192.integer_sqrt();
        // ra < 2^128 keeps the root under 2^160
        let mut bytes = [0u8; 64];
        root.to_little_endian(&mut bytes);
        if bytes[32..].iter().any(|b| *b != 0) {
            return Err(AmmError::Math(MathError::Overflow));
        }
        Ok(U256::from_little_endian(&bytes[..32]))
    }

    fn quote_add_liquidity(
        &self,
        pool: PoolRef,
        ra: Wad,
        ct: Wad,
    ) -> Result<LiquidityQuote, AmmError> {
        quote_provision(self.pool(pool)?, ra, ct)
    }

    fn add_liquidity(
        &mut self,
        pool: PoolRef,
        provider: Address,
        ra: Wad,
        ct: Wad,
    ) -> Result<LiquidityQuote, AmmError> {
        let state = self.pool_mut(pool)?;
        let quote = quote_provision(state, ra, ct)?;

        if state.total_supply.is_zero() {
            state.total_supply = Wad::from_raw(MINIMUM_LIQUIDITY);
        }
        state.total_supply += quote.lp_minted;
        state.reserves.ra += quote.ra_used;
        state.reserves.ct += quote.ct_used;
        *state.lp.entry(provider).or_default() += quote.lp_minted;
        Ok(quote)
    }

    fn quote_remove_liquidity(&self, pool: PoolRef, lp: Wad) -> Result<PoolReserves, AmmError> {
        quote_withdrawal(self.pool(pool)?, lp)
    }

    fn remove_liquidity(
        &mut self,
        pool: PoolRef,
        provider: Address,
        lp: Wad,
    ) -> Result<PoolReserves, AmmError> {
        let state = self.pool_mut(pool)?;
        let available = state.lp.get(&provider).copied().unwrap_or_default();
        let remaining = available
            .checked_sub(lp)
            .ok_or(AmmError::InsufficientLpBalance {
                requested: lp,
                available,
            })?;
        let out = quote_withdrawal(state, lp)?;

        state.lp.insert(provider, remaining);
        state.total_supply = state.total_supply.saturating_sub(lp);
        state.reserves.ra = state.reserves.ra.saturating_sub(out.ra);
        state.reserves.ct = state.reserves.ct.saturating_sub(out.ct);
        Ok(out)
    }

    fn quote_swap(
        &self,
        pool: PoolRef,
        amount_in: Wad,
        direction: SwapDirection,
    ) -> Result<Wad, AmmError> {
        quote_exact_in(self.pool(pool)?, amount_in, direction)
    }

    fn swap(
        &mut self,
        pool: PoolRef,
        amount_in: Wad,
        direction: SwapDirection,
    ) -> Result<Wad, AmmError> {
        let state = self.pool_mut(pool)?;
        let out = quote_exact_in(state, amount_in, direction)?;
        match direction {
            SwapDirection::RaForCt => {
                state.reserves.ra += amount_in;
                state.reserves.ct = state.reserves.ct.saturating_sub(out);
            }
            SwapDirection::CtForRa => {
                state.reserves.ct += amount_in;
                state.reserves.ra = state.reserves.ra.saturating_sub(out);
            }
        }
        Ok(out)
    }
}
