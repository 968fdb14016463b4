//! Error types for the Stakehouse wagering engines.
//!
//! Every variant is a synchronous rejection: the operation either fully
//! applies or has no effect. There is no automatic retry; callers resubmit.

use uuid::Uuid;

/// Rejections produced by the game engines and the escrow ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("payment of {actual} does not match the required {expected}")]
    WrongPayment { expected: u64, actual: u64 },

    #[error("purchase would exceed the per-player limit of {limit}")]
    LimitExceeded { limit: u64 },

    #[error("the round has already ended")]
    RoundEnded,

    #[error("the round has not ended yet")]
    NotYetEnded,

    #[error("a round is already running")]
    AlreadyRunning,

    #[error("operation is not valid in the current state")]
    WrongState,

    #[error("no players have entered the round")]
    NoPlayers,

    #[error("nothing to withdraw")]
    NothingToWithdraw,

    #[error("combined fees of {total_bps} bps exceed the cap of {cap_bps} bps")]
    FeeCapExceeded { total_bps: u32, cap_bps: u32 },

    #[error("caller is not authorized for this operation")]
    Unauthorized,

    #[error("bet of {bet} is outside the allowed range {min}..={max}")]
    BetOutOfRange { bet: u64, min: u64, max: u64 },

    #[error("card does not hold a completed row, column, or diagonal")]
    NoWinningPattern,

    #[error("no outstanding randomness request with id {0}")]
    UnknownOracleRequest(Uuid),

    #[error("settings cannot change while a round is active")]
    CannotChangeWhileActive,

    #[error("no fulfilled randomness is available yet")]
    RandomnessUnavailable,

    #[error("number {0} is not on this card")]
    NumberNotOnCard(u8),

    #[error("number {0} has not been drawn")]
    NumberNotDrawn(u8),

    #[error("house bankroll cannot cover the potential payout")]
    InsufficientHouseFunds,
}

/// Convenience alias used across the crate.
pub type GameResult<T> = Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GameError::WrongPayment {
            expected: 100,
            actual: 40,
        };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("40"));

        let err = GameError::FeeCapExceeded {
            total_bps: 1100,
            cap_bps: 1000,
        };
        assert!(err.to_string().contains("1100"));
    }

    #[test]
    fn test_errors_are_comparable() {
        assert_eq!(GameError::NoPlayers, GameError::NoPlayers);
        assert_ne!(GameError::NoPlayers, GameError::RoundEnded);
    }
}
