//! Number-match engine: 5×5 cards, oracle-drawn numbers, winner takes the
//! pool on a verified line claim.
//!
//! Card numbers come from a per-game oracle seed consumed at purchase time;
//! each number draw is its own request/fulfill exchange, and the `Drawing`
//! state gates marks and claims until the fulfillment lands.

use crate::clock::Clock;
use crate::config::BingoConfig;
use crate::errors::{GameError, GameResult};
use crate::escrow::EscrowLedger;
use crate::games::types::{Address, BingoGameInfo, BingoState, CardDetails, GameEvent};
use crate::oracle::{expand_randomness, randomness_to_u64, OracleRequest, Purpose, Randomness};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Numbers are drawn from 1..=MAX_NUMBER.
const MAX_NUMBER: u8 = 75;
/// Hash-expansion attempts before the deterministic fallback kicks in.
const DRAW_RESAMPLE_LIMIT: u64 = 64;

#[derive(Debug, Clone)]
pub struct BingoCard {
    pub id: u64,
    pub owner: Address,
    pub numbers: [u8; 25],
    pub marked: [bool; 25],
}

struct MatchGame {
    id: u64,
    state: BingoState,
    pool: u64,
    start_time: u64,
    drawn: Vec<u8>,
    cards: Vec<BingoCard>,
    seed: Option<Randomness>,
    outstanding: Option<Uuid>,
    next_card_id: u64,
}

impl MatchGame {
    fn fresh(id: u64) -> Self {
        Self {
            id,
            state: BingoState::Waiting,
            pool: 0,
            start_time: 0,
            drawn: Vec::new(),
            cards: Vec::new(),
            seed: None,
            outstanding: None,
            next_card_id: 1,
        }
    }
}

/// A full row, column, or diagonal of marks wins.
fn has_winning_pattern(marked: &[bool; 25]) -> bool {
    for row in 0..5 {
        if (0..5).all(|col| marked[row * 5 + col]) {
            return true;
        }
    }
    for col in 0..5 {
        if (0..5).all(|row| marked[row * 5 + col]) {
            return true;
        }
    }
    if (0..5).all(|i| marked[i * 5 + i]) {
        return true;
    }
    (0..5).all(|i| marked[i * 5 + (4 - i)])
}

/// 25 distinct numbers, column-ranged: column `c` holds five values from
/// `15c+1 ..= 15c+15`, laid out row-major.
fn generate_card_numbers(seed: &Randomness, card_id: u64) -> [u8; 25] {
    let mut rng = StdRng::from_seed(expand_randomness(seed, b"bingo-card", card_id));
    let mut numbers = [0u8; 25];
    for col in 0..5usize {
        let low = col as u8 * 15 + 1;
        let mut range: Vec<u8> = (low..low + 15).collect();
        range.shuffle(&mut rng);
        for row in 0..5usize {
            numbers[row * 5 + col] = range[row];
        }
    }
    numbers
}

/// Derive the next drawn number from a fulfillment: up to
/// [`DRAW_RESAMPLE_LIMIT`] hash-expansion candidates, then the smallest
/// undrawn number. Bounded, and deterministic for a given value.
fn derive_draw(randomness: &Randomness, drawn: &[u8]) -> u8 {
    for attempt in 0..DRAW_RESAMPLE_LIMIT {
        let expanded = expand_randomness(randomness, b"bingo-draw", attempt);
        let candidate = (randomness_to_u64(&expanded) % MAX_NUMBER as u64) as u8 + 1;
        if !drawn.contains(&candidate) {
            return candidate;
        }
    }
    (1..=MAX_NUMBER)
        .find(|n| !drawn.contains(n))
        .unwrap_or(MAX_NUMBER)
}

pub struct BingoEngine {
    admin: Address,
    card_price: u64,
    game: MatchGame,
    escrow: Arc<EscrowLedger>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<GameEvent>,
}

impl BingoEngine {
    pub fn new(
        admin: Address,
        config: &BingoConfig,
        escrow: Arc<EscrowLedger>,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<GameEvent>,
    ) -> Self {
        // Game 0 is a placeholder that has already ended; play begins with
        // the first start_new_game.
        let mut game = MatchGame::fresh(0);
        game.state = BingoState::Ended;
        Self {
            admin,
            card_price: config.card_price,
            game,
            escrow,
            clock,
            events,
        }
    }

    fn ensure_admin(&self, caller: &Address) -> GameResult<()> {
        if caller != &self.admin {
            return Err(GameError::Unauthorized);
        }
        Ok(())
    }

    /// Open card sales for a fresh game. Returns the stale seed request id
    /// (if the previous game was still waiting on one) and the new game's
    /// seed request.
    pub fn start_new_game(
        &mut self,
        caller: &Address,
    ) -> GameResult<(Option<Uuid>, OracleRequest)> {
        self.ensure_admin(caller)?;
        if self.game.state != BingoState::Waiting && self.game.state != BingoState::Ended {
            return Err(GameError::WrongState);
        }

        // Resetting a game that never started refunds its card sales, so no
        // pooled value is ever discarded.
        if self.game.state == BingoState::Waiting && self.game.pool > 0 {
            for card in &self.game.cards {
                self.escrow.credit(&card.owner, self.card_price);
            }
            tracing::info!(
                game_id = self.game.id,
                refunded = self.game.pool,
                "unstarted game reset, card sales refunded"
            );
            self.game.pool = 0;
        }

        let stale = self.game.outstanding.take();
        let mut game = MatchGame::fresh(self.game.id + 1);
        let request = OracleRequest::new(Purpose::BingoSeed { game_id: game.id });
        game.outstanding = Some(request.id);
        self.game = game;

        tracing::info!(game_id = self.game.id, "bingo game opened for card sales");
        let _ = self.events.send(GameEvent::BingoNewGame {
            game_id: self.game.id,
        });
        Ok((stale, request))
    }

    /// Deliver the card-generation seed.
    pub fn fulfill_seed(&mut self, request_id: Uuid, randomness: Randomness) -> GameResult<()> {
        if self.game.outstanding != Some(request_id) || self.game.state != BingoState::Waiting {
            return Err(GameError::UnknownOracleRequest(request_id));
        }
        self.game.outstanding = None;
        self.game.seed = Some(randomness);
        Ok(())
    }

    /// Buy one card for exactly `card_price`. Returns the card id.
    pub fn buy_card(&mut self, caller: &Address, payment: u64) -> GameResult<u64> {
        if self.game.state != BingoState::Waiting {
            return Err(GameError::WrongState);
        }
        if payment != self.card_price {
            return Err(GameError::WrongPayment {
                expected: self.card_price,
                actual: payment,
            });
        }
        let seed = match self.game.seed {
            Some(seed) => seed,
            None => return Err(GameError::RandomnessUnavailable),
        };

        let card_id = self.game.next_card_id;
        self.game.next_card_id += 1;
        self.game.cards.push(BingoCard {
            id: card_id,
            owner: caller.clone(),
            numbers: generate_card_numbers(&seed, card_id),
            marked: [false; 25],
        });
        self.game.pool += payment;

        tracing::debug!(game_id = self.game.id, card_id, owner = %caller, "card sold");
        Ok(card_id)
    }

    /// Close sales and begin play. Admin only.
    pub fn start_game(&mut self, caller: &Address) -> GameResult<()> {
        self.ensure_admin(caller)?;
        if self.game.state != BingoState::Waiting {
            return Err(GameError::WrongState);
        }
        if self.game.cards.is_empty() {
            return Err(GameError::NoPlayers);
        }

        self.game.state = BingoState::Active;
        self.game.start_time = self.clock.now();

        tracing::info!(game_id = self.game.id, cards = self.game.cards.len(), "bingo game started");
        let _ = self.events.send(GameEvent::BingoStarted {
            game_id: self.game.id,
            start_time: self.game.start_time,
        });
        Ok(())
    }

    /// Request the next number. The game sits in `Drawing`, refusing marks
    /// and claims, until the fulfillment arrives.
    pub fn draw_number(&mut self, caller: &Address) -> GameResult<OracleRequest> {
        self.ensure_admin(caller)?;
        if self.game.state != BingoState::Active {
            return Err(GameError::WrongState);
        }
        if self.game.drawn.len() as u8 >= MAX_NUMBER {
            return Err(GameError::WrongState);
        }

        let request = OracleRequest::new(Purpose::BingoDraw {
            game_id: self.game.id,
        });
        self.game.outstanding = Some(request.id);
        self.game.state = BingoState::Drawing;
        Ok(request)
    }

    /// Invalidate an undelivered draw request and issue a fresh one.
    pub fn retry_draw(&mut self, caller: &Address) -> GameResult<(Uuid, OracleRequest)> {
        self.ensure_admin(caller)?;
        if self.game.state != BingoState::Drawing {
            return Err(GameError::WrongState);
        }
        let stale = self.game.outstanding.take().ok_or(GameError::WrongState)?;

        let request = OracleRequest::new(Purpose::BingoDraw {
            game_id: self.game.id,
        });
        self.game.outstanding = Some(request.id);

        tracing::warn!(
            game_id = self.game.id,
            stale_request = %stale,
            request_id = %request.id,
            "draw randomness re-requested"
        );
        Ok((stale, request))
    }

    /// Deliver a draw fulfillment: derive the number and reopen marking.
    pub fn fulfill_draw(&mut self, request_id: Uuid, randomness: Randomness) -> GameResult<u8> {
        if self.game.state != BingoState::Drawing || self.game.outstanding != Some(request_id) {
            return Err(GameError::UnknownOracleRequest(request_id));
        }

        let number = derive_draw(&randomness, &self.game.drawn);
        self.game.drawn.push(number);
        self.game.outstanding = None;
        self.game.state = BingoState::Active;

        tracing::info!(game_id = self.game.id, number, "number drawn");
        let _ = self.events.send(GameEvent::NumberDrawn {
            game_id: self.game.id,
            number,
        });
        Ok(number)
    }

    /// Mark a drawn number on the caller's card. Idempotent once marked.
    pub fn mark_number(&mut self, caller: &Address, card_id: u64, number: u8) -> GameResult<()> {
        if self.game.state != BingoState::Active {
            return Err(GameError::WrongState);
        }
        let drawn = self.game.drawn.contains(&number);
        let card = self
            .game
            .cards
            .iter_mut()
            .find(|card| card.id == card_id && card.owner == *caller)
            .ok_or(GameError::Unauthorized)?;
        let position = card
            .numbers
            .iter()
            .position(|n| *n == number)
            .ok_or(GameError::NumberNotOnCard(number))?;
        if !drawn {
            return Err(GameError::NumberNotDrawn(number));
        }

        card.marked[position] = true;
        Ok(())
    }

    /// Verify a win claim. A valid claim ends the game and credits the whole
    /// pool; an invalid one changes nothing.
    pub fn claim_bingo(&mut self, caller: &Address, card_id: u64) -> GameResult<u64> {
        if self.game.state != BingoState::Active {
            return Err(GameError::WrongState);
        }
        let card = self
            .game
            .cards
            .iter()
            .find(|card| card.id == card_id && card.owner == *caller)
            .ok_or(GameError::Unauthorized)?;
        if !has_winning_pattern(&card.marked) {
            return Err(GameError::NoWinningPattern);
        }

        let prize = self.game.pool;
        self.game.pool = 0;
        self.game.state = BingoState::Ended;
        self.escrow.credit(caller, prize);

        tracing::info!(game_id = self.game.id, winner = %caller, prize, "bingo claimed");
        let _ = self.events.send(GameEvent::BingoClaimed {
            winner: caller.clone(),
            game_id: self.game.id,
            prize,
        });
        Ok(prize)
    }

    pub fn game_info(&self, game_id: u64) -> Option<BingoGameInfo> {
        if game_id != self.game.id {
            return None;
        }
        let owners: HashSet<&Address> = self.game.cards.iter().map(|card| &card.owner).collect();
        Some(BingoGameInfo {
            state: self.game.state,
            start_time: self.game.start_time,
            pool: self.game.pool,
            total_players: owners.len() as u64,
            numbers_drawn: self.game.drawn.len() as u64,
        })
    }

    pub fn player_cards(&self, player: &Address, game_id: u64) -> Vec<u64> {
        if game_id != self.game.id {
            return Vec::new();
        }
        self.game
            .cards
            .iter()
            .filter(|card| card.owner == *player)
            .map(|card| card.id)
            .collect()
    }

    pub fn card_details(&self, game_id: u64, card_id: u64) -> Option<CardDetails> {
        if game_id != self.game.id {
            return None;
        }
        self.game
            .cards
            .iter()
            .find(|card| card.id == card_id)
            .map(|card| CardDetails {
                numbers: card.numbers,
                marked: card.marked,
                owner: card.owner.clone(),
            })
    }

    pub fn drawn_numbers(&self, game_id: u64) -> Vec<u8> {
        if game_id != self.game.id {
            return Vec::new();
        }
        self.game.drawn.clone()
    }

    pub fn card_price(&self) -> u64 {
        self.card_price
    }

    pub fn current_game_id(&self) -> u64 {
        self.game.id
    }

    pub fn pool(&self) -> u64 {
        self.game.pool
    }

    #[cfg(test)]
    fn force_draw(&mut self, number: u8) {
        self.game.drawn.push(number);
    }
}
