//! Stakehouse - pooled-stake wagering engines with escrowed payouts.
//!
//! Three game engines (raffle, card duel, number match) hold stakes in a
//! shared escrow ledger, resolve outcomes with randomness delivered through
//! an asynchronous request/fulfill oracle protocol, and release funds via
//! pull-based withdrawals. The [`service::Casino`] façade wires the engines
//! to an oracle adapter and exposes the full operation surface.

pub mod clock;
pub mod config;
pub mod errors;
pub mod escrow;
pub mod games;
pub mod oracle;
pub mod service;

pub use errors::{GameError, GameResult};
pub use service::{Casino, ReconciliationReport};
