// 8.0 engine/core.rs: main engine. holds the collaborators, every market and the audit log.

use super::config::EngineConfig;
use super::results::{PausedError, PermissionError, ProtocolError, StateError};
use crate::access::{AccessControl, InMemoryAccess, Operation};
use crate::amm::{AmmGateway, ConstantProductAmm};
use crate::events::{Event, EventId, EventPayload};
use crate::market::Market;
use crate::token::{InMemoryTokens, TokenLedger};
use crate::types::{Address, MarketId, Timestamp};
use std::collections::HashMap;

// disjoint from the collaborator fields, so entry points can hold it next to `&mut self.tokens`
pub(super) fn market_slot(
    markets: &mut HashMap<MarketId, Market>,
    market_id: MarketId,
) -> Result<&mut Market, ProtocolError> {
    markets
        .get_mut(&market_id)
        .ok_or_else(|| StateError::MarketNotInitialized(market_id).into())
}

/** 8.1: main engine struct. all protocol state lives here, collaborators are owned */
#[derive(Debug)]
pub struct Engine<T = InMemoryTokens, A = ConstantProductAmm, G = InMemoryAccess> {
    pub(super) config: EngineConfig,
    pub(super) tokens: T,
    pub(super) amm: A,
    pub(super) access: G,
    pub(super) markets: HashMap<MarketId, Market>,
    // initialization order, backs pagination
    pub(super) market_order: Vec<MarketId>,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_time: Timestamp,
}

impl Engine {
    /// Engine over the in-memory collaborators with `admin` as the first manager.
    pub fn in_memory(config: EngineConfig, admin: Address) -> Self {
        Self::new(
            config,
            InMemoryTokens::new(),
            ConstantProductAmm::new(),
            InMemoryAccess::new(admin),
        )
    }
}

impl<T: TokenLedger, A: AmmGateway, G: AccessControl> Engine<T, A, G> {
    pub fn new(config: EngineConfig, tokens: T, amm: A, access: G) -> Self {
        Self {
            config,
            tokens,
            amm,
            access,
            markets: HashMap::new(),
            market_order: Vec::new(),
            events: Vec::new(),
            next_event_id: 1,
            current_time: Timestamp::from_secs(0),
        }
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: i64) {
        self.current_time = self.current_time.plus_secs(secs);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    // host-side access for minting balances and granting allowances
    pub fn tokens_mut(&mut self) -> &mut T {
        &mut self.tokens
    }

    pub fn amm(&self) -> &A {
        &self.amm
    }

    pub fn access(&self) -> &G {
        &self.access
    }

    pub fn access_mut(&mut self) -> &mut G {
        &mut self.access
    }

    pub fn market(&self, market_id: MarketId) -> Result<&Market, ProtocolError> {
        self.markets
            .get(&market_id)
            .ok_or_else(|| StateError::MarketNotInitialized(market_id).into())
    }

    pub fn market_count(&self) -> usize {
        self.market_order.len()
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(super) fn require_manager(&self, caller: Address) -> Result<(), ProtocolError> {
        if !self.access.is_manager(caller) {
            tracing::warn!(caller = caller.0, "manager check failed");
            return Err(PermissionError::NotManager(caller).into());
        }
        Ok(())
    }

    // flags are read fresh on every call
    pub(super) fn require_unpaused(
        &self,
        market_id: MarketId,
        op: Operation,
    ) -> Result<(), ProtocolError> {
        if !self.access.pause_flags(&market_id).is_paused(op) {
            return Ok(());
        }
        tracing::warn!(market = %market_id, ?op, "operation paused");
        let err = match op {
            Operation::PsmDeposit => PausedError::PsmDepositPaused,
            Operation::PsmWithdrawal => PausedError::PsmWithdrawalPaused,
            Operation::PsmRepurchase => PausedError::RepurchasePaused,
            Operation::LvDeposit => PausedError::LvDepositPaused,
            Operation::LvWithdrawal => PausedError::LvWithdrawalPaused,
        };
        Err(err.into())
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        tracing::trace!(event_id = event.id.0, payload = ?event.payload, "event");

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
