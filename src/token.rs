// 9.3 token.rs: token collaborator. balances, supply, allowances and single-use permits.
// RA and PA are external tokens, CT/DS/LV are created per market and epoch through
// `create_token`. InMemoryTokens is the ledger the engine and the simulator run against.

use crate::types::{Address, Timestamp, TokenRef, Wad};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(pub [u8; 32]);

/// How the owner lets the protocol move or burn their tokens.
/// either an allowance granted earlier, or a signed permit consumed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Authorization {
    PreApproved,
    SignedPermit {
        amount: Wad,
        deadline: Timestamp,
        signature: Signature,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("unknown token {0:?}")]
    UnknownToken(TokenRef),

    #[error("insufficient balance of {token:?} for {owner:?}: needed {needed}, available {available}")]
    InsufficientBalance {
        token: TokenRef,
        owner: Address,
        needed: Wad,
        available: Wad,
    },

    #[error("insufficient allowance: needed {needed}, available {available}")]
    InsufficientAllowance { needed: Wad, available: Wad },

    #[error("permit expired at {deadline}, now {now}")]
    PermitExpired { deadline: Timestamp, now: Timestamp },

    #[error("permit covers {permitted}, needed {needed}")]
    PermitAmountTooLow { permitted: Wad, needed: Wad },

    #[error("permit signature does not match")]
    InvalidSignature,

    #[error("supply overflow")]
    Overflow,
}

// Token collaborator plus the factory that hands out CT/DS/LV instances
pub trait TokenLedger {
    fn create_token(&mut self, symbol: &str) -> TokenRef;

    fn mint(&mut self, token: TokenRef, to: Address, amount: Wad) -> Result<(), TokenError>;

    fn burn(&mut self, token: TokenRef, from: Address, amount: Wad) -> Result<(), TokenError>;

    fn transfer(
        &mut self,
        token: TokenRef,
        from: Address,
        to: Address,
        amount: Wad,
    ) -> Result<(), TokenError>;

    fn balance_of(&self, token: TokenRef, who: Address) -> Wad;

    fn total_supply(&self, token: TokenRef) -> Wad;

    fn allowance(&self, token: TokenRef, owner: Address, spender: Address) -> Wad;

    fn approve(
        &mut self,
        token: TokenRef,
        owner: Address,
        spender: Address,
        amount: Wad,
    ) -> Result<(), TokenError>;

    fn spend_allowance(
        &mut self,
        token: TokenRef,
        owner: Address,
        spender: Address,
        amount: Wad,
    ) -> Result<(), TokenError>;

    // Non-mutating check. run this during validation, before any state changes.
    fn verify_authorization(
        &self,
        token: TokenRef,
        owner: Address,
        spender: Address,
        amount: Wad,
        authorization: &Authorization,
        now: Timestamp,
    ) -> Result<(), TokenError>;

    // Spends the allowance or burns the permit nonce. a permit is single-use even when
    // `amount` is less than what it covers.
    fn consume_authorization(
        &mut self,
        token: TokenRef,
        owner: Address,
        spender: Address,
        amount: Wad,
        authorization: &Authorization,
        now: Timestamp,
    ) -> Result<(), TokenError>;
}

#[derive(Debug, Clone, Default)]
struct TokenState {
    symbol: String,
    supply: Wad,
    balances: HashMap<Address, Wad>,
    allowances: HashMap<(Address, Address), Wad>,
}

/** 9.4: in-memory ledger. token refs start at 1 so TokenRef::ZERO is never valid */
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokens {
    tokens: HashMap<TokenRef, TokenState>,
    nonces: HashMap<(TokenRef, Address), u64>,
    next_id: u64,
}

impl InMemoryTokens {
    pub fn new() -> Self {
        Self {
            tokens: HashMap::new(),
            nonces: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn symbol(&self, token: TokenRef) -> Option<&str> {
        self.tokens.get(&token).map(|t| t.symbol.as_str())
    }

    pub fn nonce(&self, token: TokenRef, owner: Address) -> u64 {
        self.nonces.get(&(token, owner)).copied().unwrap_or(0)
    }

    /// Digest the owner would sign for a permit at their current nonce.
    pub fn sign_permit(
        &self,
        token: TokenRef,
        owner: Address,
        spender: Address,
        amount: Wad,
        deadline: Timestamp,
    ) -> Signature {
        permit_digest(token, owner, spender, amount, deadline, self.nonce(token, owner))
    }

    fn state(&self, token: TokenRef) -> Result<&TokenState, TokenError> {
        self.tokens.get(&token).ok_or(TokenError::UnknownToken(token))
    }

    fn state_mut(&mut self, token: TokenRef) -> Result<&mut TokenState, TokenError> {
        self.tokens.get_mut(&token).ok_or(TokenError::UnknownToken(token))
    }
}

fn permit_digest(
    token: TokenRef,
    owner: Address,
    spender: Address,
    amount: Wad,
    deadline: Timestamp,
    nonce: u64,
) -> Signature {
    let mut hasher = Sha256::new();
    hasher.update(b"depeg-core/permit");
    hasher.update(token.0.to_be_bytes());
    hasher.update(owner.0.to_be_bytes());
    hasher.update(spender.0.to_be_bytes());
    hasher.update(amount.raw().to_be_bytes());
    hasher.update(deadline.as_secs().to_be_bytes());
    hasher.update(nonce.to_be_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Signature(out)
}

impl TokenLedger for InMemoryTokens {
    fn create_token(&mut self, symbol: &str) -> TokenRef {
        let id = TokenRef(self.next_id.max(1));
        self.next_id = id.0 + 1;
        self.tokens.insert(
            id,
            TokenState {
                symbol: symbol.to_string(),
                ..TokenState::default()
            },
        );
        id
    }

    fn mint(&mut self, token: TokenRef, to: Address, amount: Wad) -> Result<(), TokenError> {
        let state = self.state_mut(token)?;
        state.supply = state.supply.checked_add(amount).ok_or(TokenError::Overflow)?;
        let balance = state.balances.entry(to).or_default();
        *balance = balance.checked_add(amount).ok_or(TokenError::Overflow)?;
        Ok(())
    }

    fn burn(&mut self, token: TokenRef, from: Address, amount: Wad) -> Result<(), TokenError> {
        let state = self.state_mut(token)?;
        let available = state.balances.get(&from).copied().unwrap_or_default();
        let remaining = available.checked_sub(amount).ok_or(TokenError::InsufficientBalance {
            token,
            owner: from,
            needed: amount,
            available,
        })?;
        state.balances.insert(from, remaining);
        state.supply = state.supply.saturating_sub(amount);
        Ok(())
    }

    fn transfer(
        &mut self,
        token: TokenRef,
        from: Address,
        to: Address,
        amount: Wad,
    ) -> Result<(), TokenError> {
        let state = self.state_mut(token)?;
        let available = state.balances.get(&from).copied().unwrap_or_default();
        let remaining = available.checked_sub(amount).ok_or(TokenError::InsufficientBalance {
            token,
            owner: from,
            needed: amount,
            available,
        })?;
        state.balances.insert(from, remaining);
        let balance = state.balances.entry(to).or_default();
        *balance = balance.checked_add(amount).ok_or(TokenError::Overflow)?;
        Ok(())
    }

    fn balance_of(&self, token: TokenRef, who: Address) -> Wad {
        self.tokens
            .get(&token)
            .and_then(|t| t.balances.get(&who).copied())
            .unwrap_or_default()
    }

    fn total_supply(&self, token: TokenRef) -> Wad {
        self.tokens.get(&token).map(|t| t.supply).unwrap_or_default()
    }

    fn allowance(&self, token: TokenRef, owner: Address, spender: Address) -> Wad {
        self.tokens
            .get(&token)
            .and_then(|t| t.allowances.get(&(owner, spender)).copied())
            .unwrap_or_default()
    }

    fn approve(
        &mut self,
        token: TokenRef,
        owner: Address,
        spender: Address,
        amount: Wad,
    ) -> Result<(), TokenError> {
        let state = self.state_mut(token)?;
        state.allowances.insert((owner, spender), amount);
        Ok(())
    }

    fn spend_allowance(
        &mut self,
        token: TokenRef,
        owner: Address,
        spender: Address,
        amount: Wad,
    ) -> Result<(), TokenError> {
        let state = self.state_mut(token)?;
        let available = state
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default();
        let remaining = available
            .checked_sub(amount)
            .ok_or(TokenError::InsufficientAllowance {
                needed: amount,
                available,
            })?;
        state.allowances.insert((owner, spender), remaining);
        Ok(())
    }

    fn verify_authorization(
        &self,
        token: TokenRef,
        owner: Address,
        spender: Address,
        amount: Wad,
        authorization: &Authorization,
        now: Timestamp,
    ) -> Result<(), TokenError> {
        self.state(token)?;
        match *authorization {
            Authorization::PreApproved => {
                let available = self.allowance(token, owner, spender);
                if available < amount {
                    return Err(TokenError::InsufficientAllowance {
                        needed: amount,
                        available,
                    });
                }
            }
            Authorization::SignedPermit {
                amount: permitted,
                deadline,
                signature,
            } => {
                if now > deadline {
                    return Err(TokenError::PermitExpired { deadline, now });
                }
                if permitted < amount {
                    return Err(TokenError::PermitAmountTooLow {
                        permitted,
                        needed: amount,
                    });
                }
                let expected = self.sign_permit(token, owner, spender, permitted, deadline);
                if expected != signature {
                    return Err(TokenError::InvalidSignature);
                }
            }
        }
        Ok(())
    }

    fn consume_authorization(
        &mut self,
        token: TokenRef,
        owner: Address,
        spender: Address,
        amount: Wad,
        authorization: &Authorization,
        now: Timestamp,
    ) -> Result<(), TokenError> {
        self.verify_authorization(token, owner, spender, amount, authorization, now)?;
        match authorization {
            Authorization::PreApproved => self.spend_allowance(token, owner, spender, amount),
            Authorization::SignedPermit { .. } => {
                *self.nonces.entry((token, owner)).or_insert(0) += 1;
                Ok(())
            }
        }
    }
}
