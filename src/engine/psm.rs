//! PSM entry points: deposit, redeem with DS or CT, repurchase and position cancel.

use super::core::{market_slot, Engine};
use super::results::{
    authorization_error, CtRedemption, DsRedemption, ProtocolError, RepurchaseReceipt, StateError,
};
use crate::access::{AccessControl, Operation};
use crate::amm::AmmGateway;
use crate::events::{
    CtRedeemedEvent, DsRedeemedEvent, EventPayload, PositionCancelledEvent, PsmDepositedEvent,
    RepurchasedEvent,
};
use crate::psm::EpochBook;
use crate::token::{Authorization, TokenLedger};
use crate::types::{Address, EpochId, MarketId, TokenRef, Wad};

fn require_balance<T: TokenLedger>(
    tokens: &T,
    token: TokenRef,
    owner: Address,
    needed: Wad,
) -> Result<(), ProtocolError> {
    let available = tokens.balance_of(token, owner);
    if needed > available {
        return Err(StateError::InsufficientBalance { needed, available }.into());
    }
    Ok(())
}

impl<T: TokenLedger, A: AmmGateway, G: AccessControl> Engine<T, A, G> {
    /// CT (and DS) minted for `ra` in the running epoch.
    pub fn preview_psm_deposit(&self, market_id: MarketId, ra: Wad) -> Result<Wad, ProtocolError> {
        let epoch = self.market(market_id)?.active_epoch(self.current_time)?;
        EpochBook::preview_deposit(ra, epoch.exchange_rate)
    }

    pub fn deposit(
        &mut self,
        caller: Address,
        market_id: MarketId,
        ra: Wad,
    ) -> Result<Wad, ProtocolError> {
        self.require_unpaused(market_id, Operation::PsmDeposit)?;
        let minted = self.preview_psm_deposit(market_id, ra)?;
        let market = self.market(market_id)?;
        require_balance(&self.tokens, market.ra, caller, ra)?;
        let epoch = market.latest_epoch()?.clone();

        let market = market_slot(&mut self.markets, market_id)?;
        self.tokens.transfer(market.ra, caller, Address::PSM, ra)?;
        market.book_mut(epoch.id)?.apply_deposit(ra, minted)?;
        self.tokens.mint(epoch.ct, caller, minted)?;
        self.tokens.mint(epoch.ds, caller, minted)?;

        tracing::debug!(market = %market_id, epoch = %epoch.id, caller = caller.0, ra = %ra, minted = %minted, "psm deposit");
        self.emit_event(EventPayload::PsmDeposited(PsmDepositedEvent {
            market_id,
            epoch: epoch.id,
            depositor: caller,
            ra_in: ra,
            minted,
        }));
        Ok(minted)
    }

    pub fn preview_redeem_with_ds(
        &self,
        market_id: MarketId,
        epoch_id: EpochId,
        ds: Wad,
    ) -> Result<DsRedemption, ProtocolError> {
        let market = self.market(market_id)?;
        let epoch = market.epoch(epoch_id)?;
        epoch.require_active(self.current_time)?;
        market
            .book(epoch_id)?
            .preview_redeem_with_ds(ds, epoch.exchange_rate, market.fees.base_redemption)
    }

    /// Before expiry: hand in DS plus one PA per DS, get the RA the DS protects.
    pub fn redeem_with_ds(
        &mut self,
        caller: Address,
        market_id: MarketId,
        epoch_id: EpochId,
        ds: Wad,
        authorization: &Authorization,
    ) -> Result<DsRedemption, ProtocolError> {
        self.require_unpaused(market_id, Operation::PsmWithdrawal)?;
        let receipt = self.preview_redeem_with_ds(market_id, epoch_id, ds)?;
        let market = self.market(market_id)?;
        let epoch = market.epoch(epoch_id)?.clone();
        let now = self.current_time;
        require_balance(&self.tokens, epoch.ds, caller, ds)?;
        require_balance(&self.tokens, market.pa, caller, receipt.pa_in)?;
        self.tokens
            .verify_authorization(epoch.ds, caller, Address::PROTOCOL, ds, authorization, now)
            .map_err(authorization_error)?;

        let market = market_slot(&mut self.markets, market_id)?;
        self.tokens
            .consume_authorization(epoch.ds, caller, Address::PROTOCOL, ds, authorization, now)
            .map_err(authorization_error)?;
        self.tokens.burn(epoch.ds, caller, ds)?;
        self.tokens.transfer(market.pa, caller, Address::PSM, receipt.pa_in)?;
        market.book_mut(epoch_id)?.apply_redeem_with_ds(&receipt)?;
        self.tokens.transfer(market.ra, Address::PSM, caller, receipt.ra_out)?;

        tracing::debug!(
            market = %market_id,
            epoch = %epoch_id,
            caller = caller.0,
            ds = %ds,
            ra_out = %receipt.ra_out,
            fee = %receipt.fee,
            "redeemed with ds"
        );
        self.emit_event(EventPayload::DsRedeemed(DsRedeemedEvent {
            market_id,
            epoch: epoch_id,
            redeemer: caller,
            ds_burned: ds,
            pa_in: receipt.pa_in,
            ra_out: receipt.ra_out,
            fee: receipt.fee,
        }));
        Ok(receipt)
    }

    pub fn preview_redeem_with_ct(
        &self,
        market_id: MarketId,
        epoch_id: EpochId,
        ct: Wad,
    ) -> Result<CtRedemption, ProtocolError> {
        let market = self.market(market_id)?;
        market.epoch(epoch_id)?.require_expired(self.current_time)?;
        market.book(epoch_id)?.preview_redeem_with_ct(ct)
    }

    /// After expiry: CT takes its share of whatever RA and PA the epoch still holds.
    pub fn redeem_with_ct(
        &mut self,
        caller: Address,
        market_id: MarketId,
        epoch_id: EpochId,
        ct: Wad,
        authorization: &Authorization,
    ) -> Result<CtRedemption, ProtocolError> {
        self.require_unpaused(market_id, Operation::PsmWithdrawal)?;
        let receipt = self.preview_redeem_with_ct(market_id, epoch_id, ct)?;
        let epoch = self.market(market_id)?.epoch(epoch_id)?.clone();
        let now = self.current_time;
        require_balance(&self.tokens, epoch.ct, caller, ct)?;
        self.tokens
            .verify_authorization(epoch.ct, caller, Address::PROTOCOL, ct, authorization, now)
            .map_err(authorization_error)?;

        let market = market_slot(&mut self.markets, market_id)?;
        self.tokens
            .consume_authorization(epoch.ct, caller, Address::PROTOCOL, ct, authorization, now)
            .map_err(authorization_error)?;
        self.tokens.burn(epoch.ct, caller, ct)?;
        market.book_mut(epoch_id)?.apply_redeem_with_ct(ct, &receipt)?;
        self.tokens.transfer(market.ra, Address::PSM, caller, receipt.ra_out)?;
        self.tokens.transfer(market.pa, Address::PSM, caller, receipt.pa_out)?;

        tracing::debug!(
            market = %market_id,
            epoch = %epoch_id,
            caller = caller.0,
            ct = %ct,
            ra_out = %receipt.ra_out,
            pa_out = %receipt.pa_out,
            "redeemed with ct"
        );
        self.emit_event(EventPayload::CtRedeemed(CtRedeemedEvent {
            market_id,
            epoch: epoch_id,
            redeemer: caller,
            ct_burned: ct,
            ra_out: receipt.ra_out,
            pa_out: receipt.pa_out,
        }));
        Ok(receipt)
    }

    pub fn preview_repurchase(
        &self,
        market_id: MarketId,
        ra: Wad,
    ) -> Result<RepurchaseReceipt, ProtocolError> {
        let market = self.market(market_id)?;
        let epoch = market.active_epoch(self.current_time)?;
        market
            .book(epoch.id)?
            .preview_repurchase(ra, epoch.exchange_rate, market.fees.repurchase)
    }

    /// Buys PA left behind by DS redemptions in the running epoch.
    pub fn repurchase(
        &mut self,
        caller: Address,
        market_id: MarketId,
        ra: Wad,
    ) -> Result<RepurchaseReceipt, ProtocolError> {
        self.require_unpaused(market_id, Operation::PsmRepurchase)?;
        let receipt = match self.preview_repurchase(market_id, ra) {
            Ok(receipt) => receipt,
            Err(err) => {
                if let ProtocolError::State(StateError::RepurchaseExceedsAvailable { requested, available }) = &err {
                    tracing::warn!(market = %market_id, caller = caller.0, requested = %requested, available = %available, "repurchase exceeds available");
                }
                return Err(err);
            }
        };
        let market = self.market(market_id)?;
        require_balance(&self.tokens, market.ra, caller, ra)?;
        let epoch_id = market.latest_epoch()?.id;

        let market = market_slot(&mut self.markets, market_id)?;
        self.tokens.transfer(market.ra, caller, Address::PSM, ra)?;
        market.book_mut(epoch_id)?.apply_repurchase(ra, &receipt)?;
        self.tokens.transfer(market.pa, Address::PSM, caller, receipt.pa_out)?;

        tracing::debug!(
            market = %market_id,
            epoch = %epoch_id,
            caller = caller.0,
            ra = %ra,
            pa_out = %receipt.pa_out,
            fee = %receipt.fee,
            "repurchase"
        );
        self.emit_event(EventPayload::Repurchased(RepurchasedEvent {
            market_id,
            epoch: epoch_id,
            buyer: caller,
            ra_in: ra,
            pa_out: receipt.pa_out,
            fee: receipt.fee,
            ds_retired: receipt.ds_retired,
        }));
        Ok(receipt)
    }

    pub fn preview_cancel_position(
        &self,
        market_id: MarketId,
        epoch_id: EpochId,
        amount: Wad,
    ) -> Result<Wad, ProtocolError> {
        let market = self.market(market_id)?;
        let epoch = market.epoch(epoch_id)?;
        market.book(epoch_id)?.preview_cancel(amount, epoch.exchange_rate)
    }

    /// Burns equal CT and DS and returns the RA behind them. valid on either side of expiry.
    pub fn cancel_position(
        &mut self,
        caller: Address,
        market_id: MarketId,
        epoch_id: EpochId,
        amount: Wad,
    ) -> Result<Wad, ProtocolError> {
        self.require_unpaused(market_id, Operation::PsmWithdrawal)?;
        let ra_out = self.preview_cancel_position(market_id, epoch_id, amount)?;
        let epoch = self.market(market_id)?.epoch(epoch_id)?.clone();
        require_balance(&self.tokens, epoch.ct, caller, amount)?;
        require_balance(&self.tokens, epoch.ds, caller, amount)?;

        let market = market_slot(&mut self.markets, market_id)?;
        self.tokens.burn(epoch.ct, caller, amount)?;
        self.tokens.burn(epoch.ds, caller, amount)?;
        market.book_mut(epoch_id)?.apply_cancel(amount, ra_out)?;
        self.tokens.transfer(market.ra, Address::PSM, caller, ra_out)?;

        tracing::debug!(market = %market_id, epoch = %epoch_id, caller = caller.0, pairs = %amount, ra_out = %ra_out, "position cancelled");
        self.emit_event(EventPayload::PositionCancelled(PositionCancelledEvent {
            market_id,
            epoch: epoch_id,
            owner: caller,
            pairs: amount,
            ra_out,
        }));
        Ok(ra_out)
    }

    /// RA and PA the PSM holds for one epoch.
    pub fn epoch_book(&self, market_id: MarketId, epoch_id: EpochId) -> Result<&EpochBook, ProtocolError> {
        Ok(self.market(market_id)?.book(epoch_id)?)
    }
}
