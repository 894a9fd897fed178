//! Market lifecycle: initialization, fee rates, epoch issuance and paginated reads.

use super::core::{market_slot, Engine};
use super::results::{ConfigurationError, ProtocolError, StateError, ValidationError};
use super::vault::{apply_liquidation, apply_provision, liquidated_event, plan_liquidation, plan_provision};
use crate::access::AccessControl;
use crate::amm::AmmGateway;
use crate::events::{
    EpochIssuedEvent, EventPayload, FeeRateUpdatedEvent, LiquiditySeparatedEvent,
    MarketInitializedEvent,
};
use crate::issuance::{check_fee, Epoch, EpochParams};
use crate::market::{FeeKind, Market, MarketParams, MarketSummary};
use crate::psm::EpochBook;
use crate::token::TokenLedger;
use crate::types::{Address, EpochId, MarketId, TokenRef, Wad};

impl<T: TokenLedger, A: AmmGateway, G: AccessControl> Engine<T, A, G> {
    /// One-time setup of the (PA, RA) market. creates the LV token.
    pub fn initialize_market(
        &mut self,
        caller: Address,
        pa: TokenRef,
        ra: TokenRef,
        params: MarketParams,
    ) -> Result<MarketId, ProtocolError> {
        self.require_manager(caller)?;
        if pa.is_zero() || ra.is_zero() {
            return Err(ConfigurationError::ZeroAddress.into());
        }
        let market_id = MarketId::derive(pa, ra);
        if self.markets.contains_key(&market_id) {
            return Err(ConfigurationError::AlreadyInitialized(market_id).into());
        }
        if params.initial_ct_price.is_zero() {
            return Err(ConfigurationError::Invalid {
                reason: "initial CT price must be positive".to_string(),
            }
            .into());
        }
        check_fee(
            FeeKind::BaseRedemption,
            params.base_redemption_fee_rate,
            self.config.protocol.fee_ceiling,
        )?;

        let lv = self.tokens.create_token(&format!("LV-{market_id}"));
        let market = Market::new(pa, ra, lv, params, self.current_time);
        self.markets.insert(market_id, market);
        self.market_order.push(market_id);

        tracing::info!(market = %market_id, pa = pa.0, ra = ra.0, lv = lv.0, "market initialized");
        self.emit_event(EventPayload::MarketInitialized(MarketInitializedEvent {
            market_id,
            pa,
            ra,
            lv,
        }));
        Ok(market_id)
    }

    pub fn set_fee_rate(
        &mut self,
        caller: Address,
        market_id: MarketId,
        kind: FeeKind,
        rate: Wad,
    ) -> Result<(), ProtocolError> {
        self.require_manager(caller)?;
        check_fee(kind, rate, self.config.protocol.fee_ceiling)?;
        let market = market_slot(&mut self.markets, market_id)?;
        let old_rate = market.fees.get(kind);
        market.fees.set(kind, rate);

        tracing::info!(market = %market_id, ?kind, old = %old_rate, new = %rate, "fee rate updated");
        self.emit_event(EventPayload::FeeRateUpdated(FeeRateUpdatedEvent {
            market_id,
            kind,
            old_rate,
            new_rate: rate,
        }));
        Ok(())
    }

    /// Starts the next epoch. the previous one must be over: its vault position is unwound,
    /// locked LV is separated from the exposed reserves and what stays exposed is
    /// provisioned into the new pool.
    pub fn issue_new_epoch(
        &mut self,
        caller: Address,
        market_id: MarketId,
        params: EpochParams,
    ) -> Result<EpochId, ProtocolError> {
        self.require_manager(caller)?;
        let now = self.current_time;
        let market = self.market(market_id)?;
        params.validate(now, self.config.protocol.fee_ceiling)?;
        if let Some(previous) = market.ledger.latest() {
            if !previous.is_expired(now) {
                return Err(StateError::PreviousEpochActive(previous.id).into());
            }
        }
        let liquidation = plan_liquidation(&self.tokens, &self.amm, market)?;
        let epoch_id = market.ledger.next_id();

        // 1. unwind the expired position
        let market = market_slot(&mut self.markets, market_id)?;
        let liquidated = match &liquidation {
            Some(plan) => Some((
                plan.epoch(),
                apply_liquidation(&mut self.tokens, &mut self.amm, market, plan)?,
            )),
            None => None,
        };

        // 2. new claim tokens and pool
        let ct = self.tokens.create_token(&format!("CT-{market_id}-{}", epoch_id.0));
        let ds = self.tokens.create_token(&format!("DS-{market_id}-{}", epoch_id.0));
        let pool = self.amm.open_pool(market.ra, ct);
        market.ledger.push(Epoch {
            id: epoch_id,
            ct,
            ds,
            pool,
            issued_at: now,
            expiry: params.expiry,
            exchange_rate: params.exchange_rate,
        });
        market.books.insert(epoch_id, EpochBook::default());
        market.fees.set(FeeKind::Repurchase, params.repurchase_fee_rate);
        market.fees.set(FeeKind::EarlyRedemption, params.early_redemption_fee_rate);

        // 3. liquidity separation
        let lv_supply = self.tokens.total_supply(market.lv);
        let snapshot = market.vault.separate(epoch_id, lv_supply)?;

        // 4. provision what stays exposed
        let idle = market.vault.idle_ra;
        let provisioned = match plan_provision(
            &self.amm,
            market,
            self.config.protocol.price_decimals,
            idle,
            now,
        )? {
            Some(plan) => apply_provision(&mut self.tokens, &mut self.amm, market, &plan)?,
            None => Wad::ZERO,
        };

        if let Some((expired, outcome)) = liquidated {
            self.emit_event(liquidated_event(market_id, expired, &outcome));
        }
        tracing::info!(
            market = %market_id,
            generation = %snapshot.generation,
            locked = %snapshot.locked,
            reserved_ra = %snapshot.reserved.ra,
            exposed_ra = %snapshot.amm_exposed.ra,
            "liquidity separated"
        );
        self.emit_event(EventPayload::LiquiditySeparated(LiquiditySeparatedEvent {
            market_id,
            epoch: epoch_id,
            locked: snapshot.locked,
            total_weight: snapshot.total_weight,
            reserved: snapshot.reserved,
            amm_exposed: snapshot.amm_exposed,
        }));
        tracing::info!(
            market = %market_id,
            epoch = %epoch_id,
            expiry = %params.expiry,
            rate = %params.exchange_rate,
            provisioned = %provisioned,
            "epoch issued"
        );
        self.emit_event(EventPayload::EpochIssued(EpochIssuedEvent {
            market_id,
            epoch: epoch_id,
            ct,
            ds,
            pool,
            expiry: params.expiry,
            exchange_rate: params.exchange_rate,
            ra_provisioned: provisioned,
        }));
        Ok(epoch_id)
    }

    fn check_window(&self, count: usize) -> Result<(), ProtocolError> {
        let max = self.config.protocol.max_page_size;
        if count > max {
            return Err(ValidationError::WindowTooLarge {
                requested: count,
                max,
            }
            .into());
        }
        Ok(())
    }

    /// Markets in initialization order. slots past the end are None.
    pub fn list_markets(
        &self,
        start: usize,
        count: usize,
    ) -> Result<Vec<Option<MarketSummary>>, ProtocolError> {
        self.check_window(count)?;
        Ok((start..start.saturating_add(count))
            .map(|i| {
                self.market_order
                    .get(i)
                    .and_then(|id| self.markets.get(id))
                    .map(Market::summary)
            })
            .collect())
    }

    /// Epochs of one market, index 0 is epoch 1.
    pub fn list_epochs(
        &self,
        market_id: MarketId,
        start: usize,
        count: usize,
    ) -> Result<Vec<Option<Epoch>>, ProtocolError> {
        self.check_window(count)?;
        Ok(self.market(market_id)?.ledger.page(start, count))
    }

    pub fn latest_epoch(&self, market_id: MarketId) -> Result<&Epoch, ProtocolError> {
        Ok(self.market(market_id)?.latest_epoch()?)
    }
}
