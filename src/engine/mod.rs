// 8.0: protocol engine. coordinates markets, epoch issuance, the PSM, flash swaps and the
// liquidity vault against the token, AMM and access collaborators.
// deterministic, no external I/O, time supplied by the host.

mod config;
mod core;
mod issuance;
mod psm;
mod results;
mod swap;
mod vault;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{
    ConfigurationError, CtRedemption, DsPurchase, DsRedemption, DsSale, LiquidationOutcome,
    LvRedemption, PausedError, PermissionError, ProtocolError, RepurchaseReceipt, StateError,
    ValidationError,
};
pub(crate) use results::authorization_error;
