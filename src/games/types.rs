//! Shared vocabulary for the wagering engines.

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use uuid::Uuid;

/// Player or payout destination identity.
///
/// Opaque to the engines: equality is the only operation ever performed on
/// it, which is exactly what the identity checks in the withdrawal and admin
/// paths need.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle of a raffle round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotteryState {
    Closed,
    Open,
    Calculating,
}

/// Lifecycle of a single duel, per player address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuelState {
    Waiting,
    PlayerTurn,
    HouseTurn,
    Ended,
}

/// Lifecycle of a number-match game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BingoState {
    Waiting,
    Active,
    Drawing,
    Ended,
}

impl From<LotteryState> for u8 {
    fn from(state: LotteryState) -> u8 {
        match state {
            LotteryState::Closed => 0,
            LotteryState::Open => 1,
            LotteryState::Calculating => 2,
        }
    }
}

impl TryFrom<u8> for LotteryState {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LotteryState::Closed),
            1 => Ok(LotteryState::Open),
            2 => Ok(LotteryState::Calculating),
            _ => Err("invalid lottery state"),
        }
    }
}

impl From<DuelState> for u8 {
    fn from(state: DuelState) -> u8 {
        match state {
            DuelState::Waiting => 0,
            DuelState::PlayerTurn => 1,
            DuelState::HouseTurn => 2,
            DuelState::Ended => 3,
        }
    }
}

impl TryFrom<u8> for DuelState {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DuelState::Waiting),
            1 => Ok(DuelState::PlayerTurn),
            2 => Ok(DuelState::HouseTurn),
            3 => Ok(DuelState::Ended),
            _ => Err("invalid duel state"),
        }
    }
}

impl From<BingoState> for u8 {
    fn from(state: BingoState) -> u8 {
        match state {
            BingoState::Waiting => 0,
            BingoState::Active => 1,
            BingoState::Drawing => 2,
            BingoState::Ended => 3,
        }
    }
}

impl TryFrom<u8> for BingoState {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BingoState::Waiting),
            1 => Ok(BingoState::Active),
            2 => Ok(BingoState::Drawing),
            3 => Ok(BingoState::Ended),
            _ => Err("invalid bingo state"),
        }
    }
}

/// Playing card. Suits 0..=3 (hearts, diamonds, clubs, spades), ranks 1..=13
/// with 1 as the ace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub suit: u8,
    pub rank: u8,
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SUITS: [&str; 4] = ["♥", "♦", "♣", "♠"];
        const RANKS: [&str; 14] = [
            "?", "A", "2", "3", "4", "5", "6", "7", "8", "9", "10", "J", "Q", "K",
        ];
        let suit = SUITS.get(self.suit as usize).copied().unwrap_or("?");
        let rank = RANKS.get(self.rank as usize).copied().unwrap_or("?");
        write!(f, "{}{}", rank, suit)
    }
}

/// How a duel finished, from the player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuelOutcome {
    Blackjack,
    Win,
    Push,
    Bust,
    Lose,
}

impl fmt::Display for DuelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuelOutcome::Blackjack => write!(f, "blackjack"),
            DuelOutcome::Win => write!(f, "win"),
            DuelOutcome::Push => write!(f, "push"),
            DuelOutcome::Bust => write!(f, "bust"),
            DuelOutcome::Lose => write!(f, "lose"),
        }
    }
}

/// Snapshot of the raffle round, served by `lottery_info()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryInfo {
    pub lottery_id: u64,
    pub state: LotteryState,
    pub prize_pool: u64,
    pub ticket_price: u64,
    pub total_tickets: u64,
    pub start_time: u64,
    pub end_time: u64,
}

/// Snapshot of one player's duel, served by `game_state(addr)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuelView {
    pub bet: u64,
    pub player_total: u32,
    pub house_total: u32,
    pub state: DuelState,
    pub player_cards: Vec<Card>,
    pub house_cards: Vec<Card>,
}

impl DuelView {
    /// View served for an address with no duel on record.
    pub fn empty() -> Self {
        Self {
            bet: 0,
            player_total: 0,
            house_total: 0,
            state: DuelState::Waiting,
            player_cards: Vec::new(),
            house_cards: Vec::new(),
        }
    }
}

/// Snapshot of a number-match game, served by `game_info(game_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BingoGameInfo {
    pub state: BingoState,
    pub start_time: u64,
    pub pool: u64,
    pub total_players: u64,
    pub numbers_drawn: u64,
}

/// Full contents of one bingo card, served by `card_details(game_id, card_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub numbers: [u8; 25],
    pub marked: [bool; 25],
    pub owner: Address,
}

/// Events broadcast by the engines as state transitions commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    LotteryStarted {
        lottery_id: u64,
        start_time: u64,
        end_time: u64,
    },
    LotteryEntered {
        player: Address,
        tickets_bought: u64,
        total_tickets: u64,
    },
    WinnerRequested {
        lottery_id: u64,
        request_id: Uuid,
    },
    WinnerPicked {
        winner: Address,
        amount: u64,
        lottery_id: u64,
    },
    GameStarted {
        player: Address,
        bet: u64,
    },
    GameEnded {
        player: Address,
        result: DuelOutcome,
        payout: u64,
    },
    BingoNewGame {
        game_id: u64,
    },
    BingoStarted {
        game_id: u64,
        start_time: u64,
    },
    NumberDrawn {
        game_id: u64,
        number: u8,
    },
    BingoClaimed {
        winner: Address,
        game_id: u64,
        prize: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        assert_eq!(u8::from(LotteryState::Closed), 0);
        assert_eq!(u8::from(LotteryState::Open), 1);
        assert_eq!(u8::from(LotteryState::Calculating), 2);
        assert_eq!(LotteryState::try_from(2), Ok(LotteryState::Calculating));
        assert!(LotteryState::try_from(3).is_err());

        assert_eq!(u8::from(DuelState::Ended), 3);
        assert_eq!(DuelState::try_from(1), Ok(DuelState::PlayerTurn));

        assert_eq!(u8::from(BingoState::Drawing), 2);
        assert!(BingoState::try_from(9).is_err());
    }

    #[test]
    fn test_card_display() {
        let ace_of_hearts = Card { suit: 0, rank: 1 };
        assert_eq!(ace_of_hearts.to_string(), "A♥");

        let king_of_spades = Card { suit: 3, rank: 13 };
        assert_eq!(king_of_spades.to_string(), "K♠");
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = GameEvent::NumberDrawn {
            game_id: 7,
            number: 42,
        };
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"event\":\"number_drawn\""));
        assert!(json.contains("42"));
    }
}
