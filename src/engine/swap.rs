//! Flash swaps between RA and DS, settled against the running epoch's pool.

use super::core::{market_slot, Engine};
use super::results::{DsPurchase, DsSale, ProtocolError, StateError};
use crate::access::{AccessControl, Operation};
use crate::amm::{AmmGateway, SwapDirection};
use crate::events::{DsBoughtEvent, DsSoldEvent, EventPayload};
use crate::flash_swap::{
    enforce_min_output, quote_buy_ds_at_rate, quote_sell_ds_at_rate, PricingError,
};
use crate::issuance::Epoch;
use crate::market::Market;
use crate::token::TokenLedger;
use crate::types::{Address, MarketId, Timestamp, Wad};

fn running_epoch(market: &Market, now: Timestamp) -> Result<Epoch, ProtocolError> {
    Ok(market.active_epoch(now)?.clone())
}

fn log_slippage(market_id: MarketId, caller: Address, err: &PricingError) {
    if let PricingError::InsufficientOutput { output, minimum } = err {
        tracing::warn!(market = %market_id, caller = caller.0, output = %output, minimum = %minimum, "flash swap below minimum output");
    }
}

impl<T: TokenLedger, A: AmmGateway, G: AccessControl> Engine<T, A, G> {
    /// DS the caller receives for `ra_provided`. the pool has to return at least the
    /// borrowed RA for the minted CT.
    pub fn preview_swap_ra_for_ds(
        &self,
        market_id: MarketId,
        ra_provided: Wad,
    ) -> Result<DsSale, ProtocolError> {
        let market = self.market(market_id)?;
        let epoch = running_epoch(market, self.current_time)?;
        let reserves = self.amm.current_reserves(epoch.pool)?;
        let quote = quote_sell_ds_at_rate(reserves.ra, reserves.ct, ra_provided, epoch.exchange_rate)?;

        let pool_out = self
            .amm
            .quote_swap(epoch.pool, quote.ds_returned, SwapDirection::CtForRa)?;
        if pool_out < quote.ra_borrowed {
            return Err(PricingError::InsufficientLiquidity {
                requested: quote.ra_borrowed,
                available: pool_out,
            }
            .into());
        }
        Ok(DsSale {
            ra_borrowed: quote.ra_borrowed,
            ds_out: quote.ds_returned,
            ra_refund: pool_out.saturating_sub(quote.ra_borrowed),
        })
    }

    /// Sells DS for a small RA premium. the protocol borrows the rest of the backing from
    /// the pool and repays it by selling the CT leg.
    pub fn swap_ra_for_ds(
        &mut self,
        caller: Address,
        market_id: MarketId,
        ra_provided: Wad,
        min_ds_out: Wad,
    ) -> Result<DsSale, ProtocolError> {
        self.require_unpaused(market_id, Operation::PsmDeposit)?;
        let sale = self.preview_swap_ra_for_ds(market_id, ra_provided)?;
        if let Err(err) = enforce_min_output(sale.ds_out, min_ds_out) {
            log_slippage(market_id, caller, &err);
            return Err(err.into());
        }
        let market = self.market(market_id)?;
        let epoch = running_epoch(market, self.current_time)?;
        let available = self.tokens.balance_of(market.ra, caller);
        if ra_provided > available {
            return Err(StateError::InsufficientBalance {
                needed: ra_provided,
                available,
            }
            .into());
        }
        let backing = sale.ra_borrowed + ra_provided;

        let market = market_slot(&mut self.markets, market_id)?;
        let ra = market.ra;
        self.tokens.transfer(ra, caller, Address::PSM, ra_provided)?;
        // the CT leg goes straight into the pool
        self.tokens.mint(epoch.ct, Address::AMM, sale.ds_out)?;
        let pool_out = self.amm.swap(epoch.pool, sale.ds_out, SwapDirection::CtForRa)?;
        self.tokens.transfer(ra, Address::AMM, Address::PSM, pool_out)?;
        market.book_mut(epoch.id)?.apply_deposit(backing, sale.ds_out)?;
        self.tokens.mint(epoch.ds, caller, sale.ds_out)?;
        if !sale.ra_refund.is_zero() {
            self.tokens.transfer(ra, Address::PSM, caller, sale.ra_refund)?;
        }

        tracing::debug!(
            market = %market_id,
            epoch = %epoch.id,
            caller = caller.0,
            ra_provided = %ra_provided,
            borrowed = %sale.ra_borrowed,
            ds_out = %sale.ds_out,
            "ds sold"
        );
        self.emit_event(EventPayload::DsSold(DsSoldEvent {
            market_id,
            epoch: epoch.id,
            buyer: caller,
            ra_provided,
            ra_borrowed: sale.ra_borrowed,
            ds_out: sale.ds_out,
        }));
        Ok(sale)
    }

    pub fn preview_swap_ds_for_ra(
        &self,
        market_id: MarketId,
        ds: Wad,
    ) -> Result<DsPurchase, ProtocolError> {
        let market = self.market(market_id)?;
        let epoch = running_epoch(market, self.current_time)?;
        let reserves = self.amm.current_reserves(epoch.pool)?;
        let quote = quote_buy_ds_at_rate(reserves.ra, reserves.ct, ds, epoch.exchange_rate)?;

        // the pair has to be unlockable through the PSM
        let released = market.book(epoch.id)?.preview_cancel(ds, epoch.exchange_rate)?;
        debug_assert_eq!(released, quote.ra_released);
        let ct_out = self
            .amm
            .quote_swap(epoch.pool, quote.ra_cost, SwapDirection::RaForCt)?;
        if ct_out < ds {
            return Err(PricingError::InsufficientLiquidity {
                requested: ds,
                available: ct_out,
            }
            .into());
        }
        Ok(DsPurchase {
            ra_cost: quote.ra_cost,
            ra_out: quote.ra_returned,
            ct_refund: ct_out.saturating_sub(ds),
        })
    }

    /// Buys DS back: the pool supplies the matching CT, the pair is cancelled and the
    /// caller receives the unlocked RA less what the CT cost.
    pub fn swap_ds_for_ra(
        &mut self,
        caller: Address,
        market_id: MarketId,
        ds: Wad,
        min_ra_out: Wad,
    ) -> Result<DsPurchase, ProtocolError> {
        self.require_unpaused(market_id, Operation::PsmWithdrawal)?;
        let purchase = self.preview_swap_ds_for_ra(market_id, ds)?;
        if let Err(err) = enforce_min_output(purchase.ra_out, min_ra_out) {
            log_slippage(market_id, caller, &err);
            return Err(err.into());
        }
        let market = self.market(market_id)?;
        let epoch = running_epoch(market, self.current_time)?;
        let available = self.tokens.balance_of(epoch.ds, caller);
        if ds > available {
            return Err(StateError::InsufficientBalance {
                needed: ds,
                available,
            }
            .into());
        }
        let released = purchase.ra_cost + purchase.ra_out;

        let market = market_slot(&mut self.markets, market_id)?;
        let ra = market.ra;
        self.tokens.burn(epoch.ds, caller, ds)?;
        self.tokens.transfer(ra, Address::PSM, Address::AMM, purchase.ra_cost)?;
        let ct_out = self.amm.swap(epoch.pool, purchase.ra_cost, SwapDirection::RaForCt)?;
        self.tokens.burn(epoch.ct, Address::AMM, ds)?;
        if !purchase.ct_refund.is_zero() {
            self.tokens.transfer(epoch.ct, Address::AMM, caller, purchase.ct_refund)?;
        }
        debug_assert_eq!(ct_out, ds + purchase.ct_refund);
        market.book_mut(epoch.id)?.apply_cancel(ds, released)?;
        self.tokens.transfer(ra, Address::PSM, caller, purchase.ra_out)?;

        tracing::debug!(
            market = %market_id,
            epoch = %epoch.id,
            caller = caller.0,
            ds = %ds,
            cost = %purchase.ra_cost,
            ra_out = %purchase.ra_out,
            "ds bought back"
        );
        self.emit_event(EventPayload::DsBought(DsBoughtEvent {
            market_id,
            epoch: epoch.id,
            seller: caller,
            ds_in: ds,
            ra_cost: purchase.ra_cost,
            ra_out: purchase.ra_out,
        }));
        Ok(purchase)
    }
}
