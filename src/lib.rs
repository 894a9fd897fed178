// depeg-core: depeg protection protocol core.
// PSM issuance of CT/DS claims, a liquidity vault over an RA/CT pool, fixed-point pricing.
// all computation is deterministic with no external I/O. time is supplied by the host.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Address, TokenRef, MarketId, EpochId, Wad, Timestamp
//   2.x  math.rs: fixed-point library, splits, fees, exchange rate, LP valuation
//   3.x  flash_swap.rs: closed-form DS buy/sell quotes against a constant-product pool
//   4.x  issuance.rs: epoch records and the append-only issuance ledger
//   5.x  psm.rs: per-epoch PSM book, deposit/redeem/repurchase/cancel math
//   6.x  vault.rs: vault reserves, redemption claims, liquidity snapshots, NAV
//   7.x  config.rs: fee ceiling, page cap, price decimals, env presets
//   8.x  engine/: core engine: lifecycle, psm, swaps, vault
//   9.x  access.rs: pause flags and manager role (collaborator)
//   9.3  token.rs: token ledger, allowances and permits (collaborator)
//   9.5  amm.rs: RA/CT pool gateway (collaborator)
//   11.x events.rs: state transition events for audit
//   12.x market.rs: market params, fee rates, runtime state

// core protocol modules
pub mod engine;
pub mod events;
pub mod flash_swap;
pub mod issuance;
pub mod market;
pub mod math;
pub mod psm;
pub mod types;
pub mod vault;

// collaborator modules
pub mod access;
pub mod amm;
pub mod config;
pub mod token;

// re exports for convenience
pub use access::*;
pub use amm::*;
pub use config::*;
pub use engine::*;
pub use events::*;
pub use flash_swap::*;
pub use issuance::*;
pub use market::*;
pub use math::*;
pub use psm::*;
pub use token::*;
pub use types::*;
pub use vault::*;
