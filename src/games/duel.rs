//! Card duel engine: player versus house, one live duel per address.
//!
//! Draws come from a 52-card shuffle seeded by one oracle value per game
//! start (never per card, to bound oracle traffic). The seed slot is
//! refilled through the usual request/fulfill protocol; a start attempt with
//! an empty slot is rejected rather than blocked, so the duel state machine
//! stays exactly `Waiting / PlayerTurn / HouseTurn / Ended`.

use crate::config::DuelConfig;
use crate::errors::{GameError, GameResult};
use crate::escrow::EscrowLedger;
use crate::games::types::{Address, Card, DuelOutcome, DuelState, DuelView, GameEvent};
use crate::oracle::{expand_randomness, OracleRequest, Purpose, Randomness};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// House stops drawing at this total.
const HOUSE_STAND_TOTAL: u32 = 17;

struct Duel {
    bet: u64,
    player_hand: Vec<Card>,
    house_hand: Vec<Card>,
    deck: Vec<Card>,
    state: DuelState,
}

/// Best blackjack total for a hand: aces are 11, downgraded to 1 while the
/// hand would bust; face cards count 10.
pub fn hand_total(cards: &[Card]) -> u32 {
    let mut total = 0;
    let mut aces = 0;
    for card in cards {
        match card.rank {
            1 => {
                aces += 1;
                total += 11;
            }
            rank if rank >= 10 => total += 10,
            rank => total += rank as u32,
        }
    }
    while total > 21 && aces > 0 {
        total -= 10;
        aces -= 1;
    }
    total
}

fn shuffled_deck(seed: Randomness) -> Vec<Card> {
    let mut deck = Vec::with_capacity(52);
    for suit in 0..4u8 {
        for rank in 1..=13u8 {
            deck.push(Card { suit, rank });
        }
    }
    let mut rng = StdRng::from_seed(seed);
    deck.shuffle(&mut rng);
    deck
}

fn natural_outcome(player_total: u32, house_total: u32) -> Option<DuelOutcome> {
    if player_total != 21 {
        return None;
    }
    if house_total == 21 {
        Some(DuelOutcome::Push)
    } else {
        Some(DuelOutcome::Blackjack)
    }
}

pub struct DuelEngine {
    admin: Address,
    min_bet: u64,
    max_bet: u64,
    /// Bankroll backing payouts: stakes flow in, winnings flow out.
    house_balance: u64,
    duels: HashMap<Address, Duel>,
    seed: Option<Randomness>,
    outstanding: Option<Uuid>,
    games_dealt: u64,
    escrow: Arc<EscrowLedger>,
    events: broadcast::Sender<GameEvent>,
}

impl DuelEngine {
    pub fn new(
        admin: Address,
        config: &DuelConfig,
        escrow: Arc<EscrowLedger>,
        events: broadcast::Sender<GameEvent>,
    ) -> Self {
        Self {
            admin,
            min_bet: config.min_bet,
            max_bet: config.max_bet,
            house_balance: config.initial_house_funding,
            duels: HashMap::new(),
            seed: None,
            outstanding: None,
            games_dealt: 0,
            escrow,
            events,
        }
    }

    /// Issue a seed request if the slot is empty and none is outstanding.
    pub fn seed_request(&mut self) -> Option<OracleRequest> {
        if self.seed.is_some() || self.outstanding.is_some() {
            return None;
        }
        let request = OracleRequest::new(Purpose::DuelSeed);
        self.outstanding = Some(request.id);
        tracing::debug!(request_id = %request.id, "duel seed requested");
        Some(request)
    }

    /// Refill the seed slot from a fulfillment.
    pub fn fulfill_seed(&mut self, request_id: Uuid, randomness: Randomness) -> GameResult<()> {
        if self.outstanding != Some(request_id) {
            return Err(GameError::UnknownOracleRequest(request_id));
        }
        self.outstanding = None;
        self.seed = Some(randomness);
        Ok(())
    }

    /// Place a stake and deal. Ends immediately on a natural 21.
    pub fn start_game(&mut self, caller: &Address, payment: u64) -> GameResult<DuelView> {
        let stake = payment;
        if stake < self.min_bet || stake > self.max_bet {
            return Err(GameError::BetOutOfRange {
                bet: stake,
                min: self.min_bet,
                max: self.max_bet,
            });
        }
        if let Some(duel) = self.duels.get(caller) {
            if duel.state != DuelState::Ended {
                return Err(GameError::WrongState);
            }
        }
        // Worst case the player doubles down: the wager reaches 2x the stake
        // and a win pays 4x, of which 2x came in as payments. The bankroll
        // must hold the other 2x before the bet is accepted.
        if self.house_balance < 2 * stake {
            return Err(GameError::InsufficientHouseFunds);
        }
        if self.seed.is_none() {
            return Err(GameError::RandomnessUnavailable);
        }

        let seed = self.seed.take().unwrap_or_default();
        self.games_dealt += 1;
        let mut deck = shuffled_deck(expand_randomness(&seed, b"duel-deal", self.games_dealt));

        let mut duel = Duel {
            bet: stake,
            player_hand: Vec::with_capacity(8),
            house_hand: Vec::with_capacity(8),
            deck: Vec::new(),
            state: DuelState::PlayerTurn,
        };
        for _ in 0..2 {
            if let Some(card) = deck.pop() {
                duel.player_hand.push(card);
            }
            if let Some(card) = deck.pop() {
                duel.house_hand.push(card);
            }
        }
        duel.deck = deck;

        self.house_balance = self.house_balance.saturating_add(stake);

        tracing::info!(player = %caller, bet = stake, "duel started");
        let _ = self.events.send(GameEvent::GameStarted {
            player: caller.clone(),
            bet: stake,
        });

        let player_total = hand_total(&duel.player_hand);
        let house_total = hand_total(&duel.house_hand);
        if let Some(outcome) = natural_outcome(player_total, house_total) {
            return self.finish(caller, duel, outcome);
        }

        let view = Self::view_of(&duel);
        self.duels.insert(caller.clone(), duel);
        Ok(view)
    }

    /// Draw one card; bust ends the duel with no payout.
    pub fn hit(&mut self, caller: &Address) -> GameResult<DuelView> {
        let mut duel = self.take_active(caller)?;
        Self::deal_to_player(&mut duel);

        if hand_total(&duel.player_hand) > 21 {
            return self.finish(caller, duel, DuelOutcome::Bust);
        }

        let view = Self::view_of(&duel);
        self.duels.insert(caller.clone(), duel);
        Ok(view)
    }

    /// Stop drawing; the house plays out its hand and the duel resolves.
    pub fn stand(&mut self, caller: &Address) -> GameResult<DuelView> {
        let mut duel = self.take_active(caller)?;
        duel.state = DuelState::HouseTurn;
        Self::play_house(&mut duel);
        let outcome = Self::compare(&duel);
        self.finish(caller, duel, outcome)
    }

    /// Double the wager with a matching payment, draw exactly one card, then
    /// resolve as a stand.
    pub fn double_down(&mut self, caller: &Address, payment: u64) -> GameResult<DuelView> {
        match self.duels.get(caller) {
            Some(duel) if duel.state == DuelState::PlayerTurn => {
                if duel.player_hand.len() != 2 {
                    return Err(GameError::WrongState);
                }
                if payment != duel.bet {
                    return Err(GameError::WrongPayment {
                        expected: duel.bet,
                        actual: payment,
                    });
                }
            }
            _ => return Err(GameError::WrongState),
        }

        let mut duel = self.take_active(caller)?;
        self.house_balance = self.house_balance.saturating_add(payment);
        duel.bet *= 2;
        Self::deal_to_player(&mut duel);

        if hand_total(&duel.player_hand) > 21 {
            return self.finish(caller, duel, DuelOutcome::Bust);
        }

        duel.state = DuelState::HouseTurn;
        Self::play_house(&mut duel);
        let outcome = Self::compare(&duel);
        self.finish(caller, duel, outcome)
    }

    /// Top up the bankroll that backs payouts. Admin only.
    pub fn fund_house(&mut self, caller: &Address, amount: u64) -> GameResult<()> {
        if caller != &self.admin {
            return Err(GameError::Unauthorized);
        }
        self.house_balance = self.house_balance.saturating_add(amount);
        Ok(())
    }

    pub fn game_state(&self, player: &Address) -> DuelView {
        self.duels
            .get(player)
            .map(Self::view_of)
            .unwrap_or_else(DuelView::empty)
    }

    pub fn min_bet(&self) -> u64 {
        self.min_bet
    }

    pub fn max_bet(&self) -> u64 {
        self.max_bet
    }

    pub fn house_balance(&self) -> u64 {
        self.house_balance
    }

    fn take_active(&mut self, caller: &Address) -> GameResult<Duel> {
        let active = matches!(
            self.duels.get(caller),
            Some(duel) if duel.state == DuelState::PlayerTurn
        );
        if !active {
            return Err(GameError::WrongState);
        }
        self.duels.remove(caller).ok_or(GameError::WrongState)
    }

    fn deal_to_player(duel: &mut Duel) {
        if let Some(card) = duel.deck.pop() {
            duel.player_hand.push(card);
        }
    }

    fn play_house(duel: &mut Duel) {
        while hand_total(&duel.house_hand) < HOUSE_STAND_TOTAL {
            match duel.deck.pop() {
                Some(card) => duel.house_hand.push(card),
                None => break,
            }
        }
    }

    fn compare(duel: &Duel) -> DuelOutcome {
        let player = hand_total(&duel.player_hand);
        let house = hand_total(&duel.house_hand);
        if house > 21 || player > house {
            DuelOutcome::Win
        } else if player == house {
            DuelOutcome::Push
        } else {
            DuelOutcome::Lose
        }
    }

    /// Credit the payout (if any), record the ended duel, and emit the
    /// result. Stakes already live in the bankroll, so a loss moves nothing.
    fn finish(
        &mut self,
        caller: &Address,
        mut duel: Duel,
        outcome: DuelOutcome,
    ) -> GameResult<DuelView> {
        let payout = match outcome {
            DuelOutcome::Blackjack | DuelOutcome::Win => 2 * duel.bet,
            DuelOutcome::Push => duel.bet,
            DuelOutcome::Bust | DuelOutcome::Lose => 0,
        };
        if payout > 0 {
            self.escrow.credit(caller, payout);
            self.house_balance = self.house_balance.saturating_sub(payout);
        }

        duel.state = DuelState::Ended;
        let view = Self::view_of(&duel);
        self.duels.insert(caller.clone(), duel);

        tracing::info!(player = %caller, result = %outcome, payout, "duel ended");
        let _ = self.events.send(GameEvent::GameEnded {
            player: caller.clone(),
            result: outcome,
            payout,
        });
        Ok(view)
    }

    fn view_of(duel: &Duel) -> DuelView {
        DuelView {
            bet: duel.bet,
            player_total: hand_total(&duel.player_hand),
            house_total: hand_total(&duel.house_hand),
            state: duel.state,
            player_cards: duel.player_hand.clone(),
            house_cards: duel.house_hand.clone(),
        }
    }

    #[cfg(test)]
    fn inject_duel(
        &mut self,
        player: &Address,
        bet: u64,
        player_hand: Vec<Card>,
        house_hand: Vec<Card>,
        deck: Vec<Card>,
    ) {
        self.duels.insert(
            player.clone(),
            Duel {
                bet,
                player_hand,
                house_hand,
                deck,
                state: DuelState::PlayerTurn,
            },
        );
    }
}
