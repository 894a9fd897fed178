//! Liquidity vault entry points, AMM provisioning and liquidation of expired positions.
//!
//! Every entry point builds a plan from immutable state first. The mutating call applies
//! that plan and the matching preview returns its receipt, so the two cannot disagree.

use super::core::{market_slot, Engine};
use super::results::{
    authorization_error, ConfigurationError, CtRedemption, LiquidationOutcome, LvRedemption,
    ProtocolError, StateError, ValidationError,
};
use crate::access::{AccessControl, Operation};
use crate::amm::{AmmError, AmmGateway, LiquidityQuote, PoolReserves};
use crate::events::{
    EventPayload, LvDepositedEvent, LvRedeemedEvent, RedemptionRequestedEvent,
    RedemptionRightsTransferredEvent, VaultLiquidatedEvent,
};
use crate::market::Market;
use crate::math::{
    apply_exchange_rate_forward, decode_sqrt_price_ratio, percentage_fee, pro_rata,
    split_by_ratio, MathError,
};
use crate::token::{Authorization, TokenLedger};
use crate::types::{Address, EpochId, MarketId, Timestamp, Wad};
use crate::vault::{AssetPair, RedemptionLeg, VaultValuation};

// 8.5.1: liquidation of the vault's position in an expired epoch

/// What unwinding the vault's position in an expired epoch will move.
#[derive(Debug, Clone, Copy)]
pub(super) struct LiquidationPlan {
    epoch: EpochId,
    lp: Wad,
    lp_out: PoolReserves,
    ct: Wad,
    ct_redemption: Option<CtRedemption>,
    ds_dropped: Wad,
}

impl LiquidationPlan {
    pub(super) fn epoch(&self) -> EpochId {
        self.epoch
    }

    pub(super) fn outcome(&self) -> LiquidationOutcome {
        let (redeemed_ra, redeemed_pa) = self
            .ct_redemption
            .map_or((Wad::ZERO, Wad::ZERO), |r| (r.ra_out, r.pa_out));
        LiquidationOutcome {
            lp_removed: self.lp,
            ct_redeemed: self.ct,
            ds_dropped: self.ds_dropped,
            ra_recovered: self.lp_out.ra + redeemed_ra,
            pa_recovered: redeemed_pa,
        }
    }
}

/// None when the latest epoch left nothing in the vault to unwind.
///
/// Only runs once the epoch is over. DS is worthless by then, so every CT the vault
/// holds is redeemed pro rata next to the other CT holders and its DS is burned.
pub(super) fn plan_liquidation<T: TokenLedger, A: AmmGateway>(
    tokens: &T,
    amm: &A,
    market: &Market,
) -> Result<Option<LiquidationPlan>, ProtocolError> {
    let Some(epoch) = market.ledger.latest() else {
        return Ok(None);
    };

    let lp = amm.lp_balance(epoch.pool, Address::VAULT)?;
    let lp_out = if lp.is_zero() {
        PoolReserves::default()
    } else {
        amm.quote_remove_liquidity(epoch.pool, lp)?
    };
    let ct = tokens.balance_of(epoch.ct, Address::VAULT) + lp_out.ct;
    let ds = tokens.balance_of(epoch.ds, Address::VAULT);
    if lp.is_zero() && ct.is_zero() && ds.is_zero() {
        return Ok(None);
    }

    let ct_redemption = if ct.is_zero() {
        None
    } else {
        Some(market.book(epoch.id)?.preview_redeem_with_ct(ct)?)
    };

    Ok(Some(LiquidationPlan {
        epoch: epoch.id,
        lp,
        lp_out,
        ct,
        ct_redemption,
        ds_dropped: ds,
    }))
}

pub(super) fn apply_liquidation<T: TokenLedger, A: AmmGateway>(
    tokens: &mut T,
    amm: &mut A,
    market: &mut Market,
    plan: &LiquidationPlan,
) -> Result<LiquidationOutcome, ProtocolError> {
    let epoch = market.epoch(plan.epoch)?.clone();
    let (ra, pa) = (market.ra, market.pa);

    if !plan.lp.is_zero() {
        amm.remove_liquidity(epoch.pool, Address::VAULT, plan.lp)?;
        tokens.transfer(ra, Address::AMM, Address::VAULT, plan.lp_out.ra)?;
        tokens.transfer(epoch.ct, Address::AMM, Address::VAULT, plan.lp_out.ct)?;
    }
    if let Some(redemption) = plan.ct_redemption {
        market
            .book_mut(plan.epoch)?
            .apply_redeem_with_ct(plan.ct, &redemption)?;
        tokens.burn(epoch.ct, Address::VAULT, plan.ct)?;
        tokens.transfer(ra, Address::PSM, Address::VAULT, redemption.ra_out)?;
        tokens.transfer(pa, Address::PSM, Address::VAULT, redemption.pa_out)?;
    }
    if !plan.ds_dropped.is_zero() {
        tokens.burn(epoch.ds, Address::VAULT, plan.ds_dropped)?;
    }

    let outcome = plan.outcome();
    let vault = &mut market.vault;
    vault.idle_ra = vault
        .idle_ra
        .checked_add(outcome.ra_recovered)
        .ok_or(MathError::Overflow)?;
    vault.idle_pa = vault
        .idle_pa
        .checked_add(outcome.pa_recovered)
        .ok_or(MathError::Overflow)?;
    Ok(outcome)
}

pub(super) fn liquidated_event(market_id: MarketId, epoch: EpochId, outcome: &LiquidationOutcome) -> EventPayload {
    EventPayload::VaultLiquidated(VaultLiquidatedEvent {
        market_id,
        epoch,
        lp_removed: outcome.lp_removed,
        ct_redeemed: outcome.ct_redeemed,
        ds_dropped: outcome.ds_dropped,
        ra_recovered: outcome.ra_recovered,
        pa_recovered: outcome.pa_recovered,
    })
}

// 8.5.2: provisioning idle RA into the running epoch's pool

#[derive(Debug, Clone, Copy)]
pub(super) struct ProvisionPlan {
    epoch: EpochId,
    mint_leg: Wad,
    ct: Wad,
    ra_leg: Wad,
    quote: LiquidityQuote,
}

/// Splits `amount` into RA minted into CT+DS and RA paired with that CT in the pool.
/// None when there is no running epoch or the amount is too small to provision.
pub(super) fn plan_provision<A: AmmGateway>(
    amm: &A,
    market: &Market,
    price_decimals: u8,
    amount: Wad,
    now: Timestamp,
) -> Result<Option<ProvisionPlan>, ProtocolError> {
    let Some(epoch) = market.ledger.latest() else {
        return Ok(None);
    };
    if epoch.is_expired(now) || amount.is_zero() {
        return Ok(None);
    }

    let reserves = amm.current_reserves(epoch.pool)?;
    let price = if reserves.is_empty() {
        market.params.initial_ct_price
    } else {
        decode_sqrt_price_ratio(amm.sqrt_price_x96(epoch.pool)?, price_decimals)?
    };
    let ratio = apply_exchange_rate_forward(price, epoch.exchange_rate)?;
    let (mint_leg, ra_leg) = split_by_ratio(amount, ratio)?;
    let ct = apply_exchange_rate_forward(mint_leg, epoch.exchange_rate)?;
    if ct.is_zero() || ra_leg.is_zero() {
        return Ok(None);
    }

    let quote = match amm.quote_add_liquidity(epoch.pool, ra_leg, ct) {
        Ok(quote) => quote,
        Err(AmmError::InsufficientInitialLiquidity { .. }) | Err(AmmError::ZeroLiquidityMinted) => {
            tracing::debug!(market = %market.id, amount = %amount, "provision below pool minimum, kept idle");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };

    Ok(Some(ProvisionPlan {
        epoch: epoch.id,
        mint_leg,
        ct,
        ra_leg,
        quote,
    }))
}

/// Returns the RA that left the idle balance.
pub(super) fn apply_provision<T: TokenLedger, A: AmmGateway>(
    tokens: &mut T,
    amm: &mut A,
    market: &mut Market,
    plan: &ProvisionPlan,
) -> Result<Wad, ProtocolError> {
    let epoch = market.epoch(plan.epoch)?.clone();
    let ra = market.ra;

    tokens.transfer(ra, Address::VAULT, Address::PSM, plan.mint_leg)?;
    market.book_mut(plan.epoch)?.apply_deposit(plan.mint_leg, plan.ct)?;
    tokens.mint(epoch.ct, Address::VAULT, plan.ct)?;
    tokens.mint(epoch.ds, Address::VAULT, plan.ct)?;

    let added = amm.add_liquidity(epoch.pool, Address::VAULT, plan.ra_leg, plan.ct)?;
    debug_assert_eq!(added, plan.quote);
    tokens.transfer(ra, Address::VAULT, Address::AMM, added.ra_used)?;
    tokens.transfer(epoch.ct, Address::VAULT, Address::AMM, added.ct_used)?;

    let spent = plan.mint_leg + added.ra_used;
    market.vault.idle_ra = market
        .vault
        .idle_ra
        .checked_sub(spent)
        .ok_or(MathError::Underflow)?;
    Ok(spent)
}

/// NAV inputs for the exposed share supply.
fn valuation<T: TokenLedger, A: AmmGateway>(
    tokens: &T,
    amm: &A,
    market: &Market,
) -> Result<VaultValuation, ProtocolError> {
    let exposed_supply = market.vault.exposed_supply(tokens.total_supply(market.lv));
    let mut valuation = VaultValuation {
        exposed_supply,
        idle_ra: market.vault.idle_ra,
        lp_total: Wad::ZERO,
        lp_owned: Wad::ZERO,
        pool_ra: Wad::ZERO,
        pool_ct: Wad::ZERO,
        exchange_rate: Wad::ONE,
    };
    if let Some(epoch) = market.ledger.latest() {
        let reserves = amm.current_reserves(epoch.pool)?;
        valuation.lp_total = amm.total_supply(epoch.pool)?;
        valuation.lp_owned = amm.lp_balance(epoch.pool, Address::VAULT)?;
        valuation.pool_ra = reserves.ra;
        valuation.pool_ct = reserves.ct;
        valuation.exchange_rate = epoch.exchange_rate;
    }
    Ok(valuation)
}

fn require_receiver(receiver: Address) -> Result<(), ProtocolError> {
    if receiver.is_zero() {
        return Err(ConfigurationError::ZeroAddress.into());
    }
    Ok(())
}

fn require_free_balance<T: TokenLedger>(
    tokens: &T,
    market: &Market,
    owner: Address,
    amount: Wad,
) -> Result<(), ProtocolError> {
    let available = tokens.balance_of(market.lv, owner);
    if amount > available {
        return Err(StateError::InsufficientBalance {
            needed: amount,
            available,
        }
        .into());
    }
    Ok(())
}

// 8.5.3: expired redemption

struct ExpiredExitPlan {
    legs: Vec<(RedemptionLeg, AssetPair)>,
    liquidation: Option<LiquidationPlan>,
    receipt: LvRedemption,
}

fn plan_expired_exit<T: TokenLedger, A: AmmGateway>(
    tokens: &T,
    amm: &A,
    market: &Market,
    owner: Address,
    amount: Wad,
    now: Timestamp,
) -> Result<ExpiredExitPlan, ProtocolError> {
    let vault = &market.vault;
    let legs = vault.plan_expired_redemption(owner, amount, market.uncovered_redemption_open(now))?;

    let draws_on_reserves = legs
        .iter()
        .any(|leg| matches!(leg, RedemptionLeg::Uncovered { .. }));
    let expired = market.ledger.latest().is_some_and(|e| e.is_expired(now));
    let liquidation = if draws_on_reserves && expired {
        plan_liquidation(tokens, amm, market)?
    } else {
        None
    };
    let recovered = liquidation.map(|plan| plan.outcome()).unwrap_or_default();

    // current reserves as they will be once the expired position is unwound
    let idle_ra = vault.idle_ra + recovered.ra_recovered;
    let idle_pa = vault.idle_pa + recovered.pa_recovered;
    let exposed = vault.exposed_supply(tokens.total_supply(market.lv));

    let mut receipt = LvRedemption {
        ra_out: Wad::ZERO,
        pa_out: Wad::ZERO,
        fee: Wad::ZERO,
    };
    let mut priced = Vec::with_capacity(legs.len());
    for leg in legs {
        let paid = match leg {
            RedemptionLeg::Covered { generation, amount } => vault.covered_payout(generation, amount)?,
            RedemptionLeg::Uncovered { amount } => AssetPair {
                ra: pro_rata(idle_ra, amount, exposed)?,
                pa: pro_rata(idle_pa, amount, exposed)?,
            },
        };
        receipt.ra_out += paid.ra;
        receipt.pa_out += paid.pa;
        priced.push((leg, paid));
    }

    Ok(ExpiredExitPlan {
        legs: priced,
        liquidation,
        receipt,
    })
}

// 8.5.4: early redemption

struct EarlyExitPlan {
    idle: AssetPair,
    epoch: Option<EpochId>,
    lp: Wad,
    lp_out: PoolReserves,
    pairs: Wad,
    cancel_ra: Wad,
    receipt: LvRedemption,
}

fn plan_early_exit<T: TokenLedger, A: AmmGateway>(
    tokens: &T,
    amm: &A,
    market: &Market,
    amount: Wad,
    now: Timestamp,
) -> Result<EarlyExitPlan, ProtocolError> {
    if amount.is_zero() {
        return Err(ValidationError::ZeroAmount.into());
    }
    if !market.early_exit_open(now) {
        let epoch = market.latest_epoch()?;
        return Err(StateError::EpochExpired {
            epoch: epoch.id,
            expiry: epoch.expiry,
        }
        .into());
    }

    let vault = &market.vault;
    let exposed = vault.exposed_supply(tokens.total_supply(market.lv));
    if amount > exposed {
        return Err(StateError::InsufficientBalance {
            needed: amount,
            available: exposed,
        }
        .into());
    }
    let idle = AssetPair {
        ra: pro_rata(vault.idle_ra, amount, exposed)?,
        pa: pro_rata(vault.idle_pa, amount, exposed)?,
    };

    let mut plan = EarlyExitPlan {
        idle,
        epoch: None,
        lp: Wad::ZERO,
        lp_out: PoolReserves::default(),
        pairs: Wad::ZERO,
        cancel_ra: Wad::ZERO,
        receipt: LvRedemption {
            ra_out: Wad::ZERO,
            pa_out: idle.pa,
            fee: Wad::ZERO,
        },
    };

    if let Some(epoch) = market.ledger.latest() {
        plan.epoch = Some(epoch.id);
        let lp_owned = amm.lp_balance(epoch.pool, Address::VAULT)?;
        plan.lp = pro_rata(lp_owned, amount, exposed)?;
        if !plan.lp.is_zero() {
            plan.lp_out = amm.quote_remove_liquidity(epoch.pool, plan.lp)?;
        }
        // CT out of the pool is paired with DS the vault holds and unlocked through the PSM
        plan.pairs = plan.lp_out.ct.min(tokens.balance_of(epoch.ds, Address::VAULT));
        if !plan.pairs.is_zero() {
            plan.cancel_ra = market
                .book(epoch.id)?
                .preview_cancel(plan.pairs, epoch.exchange_rate)?;
        }
    }

    let gross = idle.ra + plan.lp_out.ra + plan.cancel_ra;
    let fee = percentage_fee(market.fees.early_redemption, gross)?;
    plan.receipt.fee = fee;
    plan.receipt.ra_out = gross.checked_sub(fee).ok_or(MathError::Underflow)?;
    Ok(plan)
}

impl<T: TokenLedger, A: AmmGateway, G: AccessControl> Engine<T, A, G> {
    /// LV shares `ra` would mint right now.
    pub fn preview_lv_deposit(&self, market_id: MarketId, ra: Wad) -> Result<Wad, ProtocolError> {
        let market = self.market(market_id)?;
        if ra.is_zero() {
            return Err(ValidationError::ZeroDeposit.into());
        }
        let shares = valuation(&self.tokens, &self.amm, market)?.shares_for_deposit(ra)?;
        if shares.is_zero() {
            return Err(ValidationError::ZeroDeposit.into());
        }
        Ok(shares)
    }

    pub fn lv_deposit(
        &mut self,
        caller: Address,
        market_id: MarketId,
        ra: Wad,
    ) -> Result<Wad, ProtocolError> {
        self.require_unpaused(market_id, Operation::LvDeposit)?;
        let shares = self.preview_lv_deposit(market_id, ra)?;
        let market = self.market(market_id)?;
        let available = self.tokens.balance_of(market.ra, caller);
        if ra > available {
            return Err(StateError::InsufficientBalance {
                needed: ra,
                available,
            }
            .into());
        }
        let provision = plan_provision(
            &self.amm,
            market,
            self.config.protocol.price_decimals,
            ra,
            self.current_time,
        )?;

        let market = market_slot(&mut self.markets, market_id)?;
        self.tokens.transfer(market.ra, caller, Address::VAULT, ra)?;
        market.vault.idle_ra = market.vault.idle_ra.checked_add(ra).ok_or(MathError::Overflow)?;
        self.tokens.mint(market.lv, caller, shares)?;
        let provisioned = match provision {
            Some(plan) => apply_provision(&mut self.tokens, &mut self.amm, market, &plan)?,
            None => Wad::ZERO,
        };

        tracing::debug!(
            market = %market_id,
            caller = caller.0,
            ra = %ra,
            shares = %shares,
            provisioned = %provisioned,
            "lv deposit"
        );
        self.emit_event(EventPayload::LvDeposited(LvDepositedEvent {
            market_id,
            depositor: caller,
            ra_in: ra,
            shares,
            ra_provisioned: provisioned,
        }));
        Ok(shares)
    }

    /// Locks `amount` of the caller's free LV into the current generation.
    pub fn request_redemption(
        &mut self,
        caller: Address,
        market_id: MarketId,
        amount: Wad,
        authorization: &Authorization,
    ) -> Result<(), ProtocolError> {
        self.require_unpaused(market_id, Operation::LvWithdrawal)?;
        let market = self.market(market_id)?;
        if amount.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        require_free_balance(&self.tokens, market, caller, amount)?;
        let now = self.current_time;
        self.tokens
            .verify_authorization(market.lv, caller, Address::PROTOCOL, amount, authorization, now)
            .map_err(authorization_error)?;
        let generation = market.ledger.latest_id();

        let market = market_slot(&mut self.markets, market_id)?;
        self.tokens
            .consume_authorization(market.lv, caller, Address::PROTOCOL, amount, authorization, now)
            .map_err(authorization_error)?;
        self.tokens.transfer(market.lv, caller, Address::VAULT, amount)?;
        market.vault.lock(caller, generation, amount)?;
        let total_locked = market.vault.claim(caller);

        tracing::debug!(
            market = %market_id,
            caller = caller.0,
            amount = %amount,
            generation = %generation,
            "redemption requested"
        );
        self.emit_event(EventPayload::RedemptionRequested(RedemptionRequestedEvent {
            market_id,
            owner: caller,
            generation,
            amount,
            total_locked,
        }));
        Ok(())
    }

    pub fn transfer_redemption_rights(
        &mut self,
        caller: Address,
        market_id: MarketId,
        to: Address,
        amount: Wad,
    ) -> Result<(), ProtocolError> {
        require_receiver(to)?;
        let market = market_slot(&mut self.markets, market_id)?;
        market.vault.transfer_claim(caller, to, amount)?;

        tracing::debug!(market = %market_id, from = caller.0, to = to.0, amount = %amount, "redemption rights transferred");
        self.emit_event(EventPayload::RedemptionRightsTransferred(
            RedemptionRightsTransferredEvent {
                market_id,
                from: caller,
                to,
                amount,
            },
        ));
        Ok(())
    }

    /// Locked LV held by `owner`.
    pub fn locked_balance(&self, market_id: MarketId, owner: Address) -> Result<Wad, ProtocolError> {
        Ok(self.market(market_id)?.vault.claim(owner))
    }

    pub fn preview_redeem_expired_lv(
        &self,
        owner: Address,
        market_id: MarketId,
        amount: Wad,
    ) -> Result<LvRedemption, ProtocolError> {
        let market = self.market(market_id)?;
        let plan = plan_expired_exit(&self.tokens, &self.amm, market, owner, amount, self.current_time)?;
        Ok(plan.receipt)
    }

    /// Redeems the caller's locked LV. covered tranches pay from their snapshot, the
    /// latest generation draws on current reserves once its epoch is over.
    pub fn redeem_expired_lv(
        &mut self,
        caller: Address,
        market_id: MarketId,
        receiver: Address,
        amount: Wad,
        authorization: Option<&Authorization>,
    ) -> Result<LvRedemption, ProtocolError> {
        self.require_unpaused(market_id, Operation::LvWithdrawal)?;
        require_receiver(receiver)?;
        let now = self.current_time;
        let market = self.market(market_id)?;
        let plan = match plan_expired_exit(&self.tokens, &self.amm, market, caller, amount, now) {
            Ok(plan) => plan,
            Err(err) => {
                if let ProtocolError::State(StateError::RedemptionCapExceeded { requested, cap }) = &err {
                    tracing::warn!(market = %market_id, caller = caller.0, requested = %requested, cap = %cap, "redemption cap exceeded");
                }
                return Err(err);
            }
        };
        if let Some(auth) = authorization {
            self.tokens
                .verify_authorization(market.lv, caller, Address::PROTOCOL, amount, auth, now)
                .map_err(authorization_error)?;
        }

        let market = market_slot(&mut self.markets, market_id)?;
        let (lv, ra, pa) = (market.lv, market.ra, market.pa);
        let liquidated = match &plan.liquidation {
            Some(liquidation) => Some((
                liquidation.epoch,
                apply_liquidation(&mut self.tokens, &mut self.amm, market, liquidation)?,
            )),
            None => None,
        };
        if let Some(auth) = authorization {
            self.tokens
                .consume_authorization(lv, caller, Address::PROTOCOL, amount, auth, now)
                .map_err(authorization_error)?;
        }
        for (leg, paid) in &plan.legs {
            match *leg {
                RedemptionLeg::Covered { generation, amount } => {
                    market.vault.settle_covered(generation, amount, *paid)?
                }
                RedemptionLeg::Uncovered { amount } => market.vault.settle_uncovered(amount, *paid)?,
            }
        }
        market.vault.consume_claim(caller, amount);
        self.tokens.burn(lv, Address::VAULT, amount)?;
        let receipt = plan.receipt;
        self.tokens.transfer(ra, Address::VAULT, receiver, receipt.ra_out)?;
        self.tokens.transfer(pa, Address::VAULT, receiver, receipt.pa_out)?;

        if let Some((epoch, outcome)) = liquidated {
            self.emit_event(liquidated_event(market_id, epoch, &outcome));
        }
        tracing::debug!(
            market = %market_id,
            caller = caller.0,
            receiver = receiver.0,
            shares = %amount,
            ra_out = %receipt.ra_out,
            pa_out = %receipt.pa_out,
            "expired lv redemption"
        );
        self.emit_event(EventPayload::LvRedeemedExpired(LvRedeemedEvent {
            market_id,
            owner: caller,
            receiver,
            shares: amount,
            ra_out: receipt.ra_out,
            pa_out: receipt.pa_out,
            fee: receipt.fee,
        }));
        Ok(receipt)
    }

    pub fn preview_redeem_early_lv(
        &self,
        market_id: MarketId,
        amount: Wad,
    ) -> Result<LvRedemption, ProtocolError> {
        let market = self.market(market_id)?;
        Ok(plan_early_exit(&self.tokens, &self.amm, market, amount, self.current_time)?.receipt)
    }

    /// Burns free LV while the epoch runs and pays its share of the AMM-exposed reserves,
    /// less the early redemption fee which stays in the vault.
    pub fn redeem_early_lv(
        &mut self,
        caller: Address,
        market_id: MarketId,
        receiver: Address,
        amount: Wad,
        authorization: Option<&Authorization>,
    ) -> Result<LvRedemption, ProtocolError> {
        self.require_unpaused(market_id, Operation::LvWithdrawal)?;
        require_receiver(receiver)?;
        let now = self.current_time;
        let market = self.market(market_id)?;
        let plan = plan_early_exit(&self.tokens, &self.amm, market, amount, now)?;
        require_free_balance(&self.tokens, market, caller, amount)?;
        if let Some(auth) = authorization {
            self.tokens
                .verify_authorization(market.lv, caller, Address::PROTOCOL, amount, auth, now)
                .map_err(authorization_error)?;
        }

        let market = market_slot(&mut self.markets, market_id)?;
        let (lv, ra, pa) = (market.lv, market.ra, market.pa);
        if let Some(auth) = authorization {
            self.tokens
                .consume_authorization(lv, caller, Address::PROTOCOL, amount, auth, now)
                .map_err(authorization_error)?;
        }
        self.tokens.burn(lv, caller, amount)?;

        if let Some(epoch_id) = plan.epoch {
            let epoch = market.epoch(epoch_id)?.clone();
            if !plan.lp.is_zero() {
                self.amm.remove_liquidity(epoch.pool, Address::VAULT, plan.lp)?;
                self.tokens.transfer(ra, Address::AMM, Address::VAULT, plan.lp_out.ra)?;
                self.tokens.transfer(epoch.ct, Address::AMM, Address::VAULT, plan.lp_out.ct)?;
            }
            if !plan.pairs.is_zero() {
                market.book_mut(epoch_id)?.apply_cancel(plan.pairs, plan.cancel_ra)?;
                self.tokens.burn(epoch.ct, Address::VAULT, plan.pairs)?;
                self.tokens.burn(epoch.ds, Address::VAULT, plan.pairs)?;
                self.tokens.transfer(ra, Address::PSM, Address::VAULT, plan.cancel_ra)?;
            }
        }

        let receipt = plan.receipt;
        let vault = &mut market.vault;
        vault.idle_ra = vault
            .idle_ra
            .checked_sub(plan.idle.ra)
            .and_then(|v| v.checked_add(receipt.fee))
            .ok_or(MathError::Underflow)?;
        vault.idle_pa = vault.idle_pa.checked_sub(plan.idle.pa).ok_or(MathError::Underflow)?;
        vault.fees_retained += receipt.fee;
        self.tokens.transfer(ra, Address::VAULT, receiver, receipt.ra_out)?;
        self.tokens.transfer(pa, Address::VAULT, receiver, receipt.pa_out)?;

        tracing::debug!(
            market = %market_id,
            caller = caller.0,
            receiver = receiver.0,
            shares = %amount,
            ra_out = %receipt.ra_out,
            fee = %receipt.fee,
            "early lv redemption"
        );
        self.emit_event(EventPayload::LvRedeemedEarly(LvRedeemedEvent {
            market_id,
            owner: caller,
            receiver,
            shares: amount,
            ra_out: receipt.ra_out,
            pa_out: receipt.pa_out,
            fee: receipt.fee,
        }));
        Ok(receipt)
    }

    /// Current NAV of one exposed LV share in RA.
    pub fn lv_nav_per_share(&self, market_id: MarketId) -> Result<Wad, ProtocolError> {
        let market = self.market(market_id)?;
        Ok(valuation(&self.tokens, &self.amm, market)?.nav_per_share()?)
    }
}
