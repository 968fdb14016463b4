pub mod bingo;
pub mod duel;
pub mod raffle;
pub mod types;

pub use bingo::BingoEngine;
pub use duel::DuelEngine;
pub use raffle::RaffleEngine;
pub use types::*;
