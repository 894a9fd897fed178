// 9.0 access.rs: pause flags and the manager role.
// the engine only reads this. it asks for a fresh PauseFlags value at the start of every
// entry point and never mutates permission state itself.

use crate::types::{Address, MarketId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    PsmDeposit,
    PsmWithdrawal,
    PsmRepurchase,
    LvDeposit,
    LvWithdrawal,
}

/** 9.1: immutable snapshot of what is switched off for one market */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseFlags {
    pub psm_deposit: bool,
    pub psm_withdrawal: bool,
    pub psm_repurchase: bool,
    pub lv_deposit: bool,
    pub lv_withdrawal: bool,
}

impl PauseFlags {
    pub fn is_paused(&self, op: Operation) -> bool {
        match op {
            Operation::PsmDeposit => self.psm_deposit,
            Operation::PsmWithdrawal => self.psm_withdrawal,
            Operation::PsmRepurchase => self.psm_repurchase,
            Operation::LvDeposit => self.lv_deposit,
            Operation::LvWithdrawal => self.lv_withdrawal,
        }
    }

    #[must_use]
    pub fn with(mut self, op: Operation, paused: bool) -> Self {
        match op {
            Operation::PsmDeposit => self.psm_deposit = paused,
            Operation::PsmWithdrawal => self.psm_withdrawal = paused,
            Operation::PsmRepurchase => self.psm_repurchase = paused,
            Operation::LvDeposit => self.lv_deposit = paused,
            Operation::LvWithdrawal => self.lv_withdrawal = paused,
        }
        self
    }
}

// Read side of the configuration collaborator
pub trait AccessControl {
    fn pause_flags(&self, market: &MarketId) -> PauseFlags;
    fn is_manager(&self, who: Address) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("{0:?} does not hold the manager role")]
    NotManager(Address),

    #[error("manager address cannot be zero")]
    ZeroAddress,
}

/** 9.2: in-memory role and pause registry. writes are manager-gated */
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccess {
    managers: HashSet<Address>,
    flags: HashMap<MarketId, PauseFlags>,
}

impl InMemoryAccess {
    pub fn new(admin: Address) -> Self {
        let mut managers = HashSet::new();
        if !admin.is_zero() {
            managers.insert(admin);
        }
        Self {
            managers,
            flags: HashMap::new(),
        }
    }

    pub fn grant_manager(&mut self, caller: Address, who: Address) -> Result<(), AccessError> {
        self.require_manager(caller)?;
        if who.is_zero() {
            return Err(AccessError::ZeroAddress);
        }
        self.managers.insert(who);
        Ok(())
    }

    pub fn revoke_manager(&mut self, caller: Address, who: Address) -> Result<(), AccessError> {
        self.require_manager(caller)?;
        self.managers.remove(&who);
        Ok(())
    }

    pub fn set_paused(
        &mut self,
        caller: Address,
        market: MarketId,
        op: Operation,
        paused: bool,
    ) -> Result<(), AccessError> {
        self.require_manager(caller)?;
        let current = self.pause_flags(&market);
        self.flags.insert(market, current.with(op, paused));
        tracing::info!(market = %market, ?op, paused, "pause flag updated");
        Ok(())
    }

    pub fn set_flags(
        &mut self,
        caller: Address,
        market: MarketId,
        flags: PauseFlags,
    ) -> Result<(), AccessError> {
        self.require_manager(caller)?;
        self.flags.insert(market, flags);
        Ok(())
    }

    fn require_manager(&self, caller: Address) -> Result<(), AccessError> {
        if !self.managers.contains(&caller) {
            return Err(AccessError::NotManager(caller));
        }
        Ok(())
    }
}

impl AccessControl for InMemoryAccess {
    fn pause_flags(&self, market: &MarketId) -> PauseFlags {
        self.flags.get(market).copied().unwrap_or_default()
    }

    fn is_manager(&self, who: Address) -> bool {
        self.managers.contains(&who)
    }
}
