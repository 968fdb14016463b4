//! Raffle engine: numbered entries into a pooled round, winner picked by
//! oracle randomness, payouts released through the escrow ledger.
//!
//! Round lifecycle: `Closed --start--> Open --end--> Calculating
//! --fulfill--> Closed`. Ending the round issues exactly one oracle request
//! correlated to the round id; the round stays in `Calculating`, refusing
//! entries and admin changes, until the matching fulfillment arrives.

use crate::clock::Clock;
use crate::config::RaffleConfig;
use crate::errors::{GameError, GameResult};
use crate::escrow::{split_fee, validate_fee_config, EscrowLedger};
use crate::games::types::{Address, GameEvent, LotteryInfo, LotteryState};
use crate::oracle::{randomness_to_u64, OracleRequest, Purpose, Randomness};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct RaffleEngine {
    admin: Address,
    platform_address: Address,
    charity_address: Address,
    platform_fee_bps: u16,
    charity_fee_bps: u16,
    ticket_price: u64,
    max_tickets_per_player: u64,
    lottery_id: u64,
    state: LotteryState,
    pool: u64,
    /// One slot per ticket bought; duplicates give proportional odds.
    players: Vec<Address>,
    start_time: u64,
    end_time: u64,
    recent_winner: Option<Address>,
    outstanding: Option<Uuid>,
    escrow: Arc<EscrowLedger>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<GameEvent>,
}

impl RaffleEngine {
    pub fn new(
        admin: Address,
        config: &RaffleConfig,
        escrow: Arc<EscrowLedger>,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<GameEvent>,
    ) -> Self {
        Self {
            admin,
            platform_address: Address::new(config.platform_address.clone()),
            charity_address: Address::new(config.charity_address.clone()),
            platform_fee_bps: config.platform_fee_bps,
            charity_fee_bps: config.charity_fee_bps,
            ticket_price: config.ticket_price,
            max_tickets_per_player: config.max_tickets_per_player,
            lottery_id: 1,
            state: LotteryState::Closed,
            pool: 0,
            players: Vec::new(),
            start_time: 0,
            end_time: 0,
            recent_winner: None,
            outstanding: None,
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

    /// Open a new round for `duration_secs`. Admin only.
    pub fn start_lottery(&mut self, caller: &Address, duration_secs: u64) -> GameResult<()> {
        self.ensure_admin(caller)?;
        if self.state != LotteryState::Closed {
            return Err(GameError::AlreadyRunning);
        }

        let now = self.clock.now();
        self.start_time = now;
        self.end_time = now.saturating_add(duration_secs);
        self.state = LotteryState::Open;

        tracing::info!(
            lottery_id = self.lottery_id,
            end_time = self.end_time,
            "lottery opened"
        );
        let _ = self.events.send(GameEvent::LotteryStarted {
            lottery_id: self.lottery_id,
            start_time: self.start_time,
            end_time: self.end_time,
        });
        Ok(())
    }

    /// Buy `count` tickets with exact payment `count * ticket_price`.
    pub fn buy_tickets(&mut self, caller: &Address, count: u64, payment: u64) -> GameResult<()> {
        if self.state != LotteryState::Open {
            return Err(GameError::WrongState);
        }
        if self.clock.now() >= self.end_time {
            return Err(GameError::RoundEnded);
        }

        let required = count
            .checked_mul(self.ticket_price)
            .ok_or(GameError::LimitExceeded {
                limit: self.max_tickets_per_player,
            })?;
        if count == 0 || payment != required {
            return Err(GameError::WrongPayment {
                expected: required.max(self.ticket_price),
                actual: payment,
            });
        }

        let held = self.player_ticket_count(caller);
        if held + count > self.max_tickets_per_player {
            return Err(GameError::LimitExceeded {
                limit: self.max_tickets_per_player,
            });
        }

        for _ in 0..count {
            self.players.push(caller.clone());
        }
        self.pool += payment;

        tracing::debug!(
            player = %caller,
            count,
            total = self.players.len(),
            "tickets bought"
        );
        let _ = self.events.send(GameEvent::LotteryEntered {
            player: caller.clone(),
            tickets_bought: count,
            total_tickets: self.players.len() as u64,
        });
        Ok(())
    }

    /// Close the round and request the winning randomness.
    ///
    /// Anyone may close once the window has elapsed; the admin may close
    /// early. Returns the oracle request the caller must forward.
    pub fn end_lottery(&mut self, caller: &Address) -> GameResult<OracleRequest> {
        if self.state != LotteryState::Open {
            return Err(GameError::WrongState);
        }
        if self.clock.now() < self.end_time && caller != &self.admin {
            return Err(GameError::NotYetEnded);
        }
        if self.players.is_empty() {
            return Err(GameError::NoPlayers);
        }

        let request = OracleRequest::new(Purpose::RaffleWinner {
            round_id: self.lottery_id,
        });
        self.outstanding = Some(request.id);
        self.state = LotteryState::Calculating;

        tracing::info!(
            lottery_id = self.lottery_id,
            request_id = %request.id,
            tickets = self.players.len(),
            "lottery closed, winner requested"
        );
        let _ = self.events.send(GameEvent::WinnerRequested {
            lottery_id: self.lottery_id,
            request_id: request.id,
        });
        Ok(request)
    }

    /// Invalidate the outstanding request and issue a fresh one. Admin-only
    /// recovery path for a fulfillment that never arrives; a late delivery
    /// for the old id is rejected as `UnknownOracleRequest`.
    pub fn retry_randomness(&mut self, caller: &Address) -> GameResult<(Uuid, OracleRequest)> {
        self.ensure_admin(caller)?;
        if self.state != LotteryState::Calculating {
            return Err(GameError::WrongState);
        }
        let stale = self.outstanding.take().ok_or(GameError::WrongState)?;

        let request = OracleRequest::new(Purpose::RaffleWinner {
            round_id: self.lottery_id,
        });
        self.outstanding = Some(request.id);

        tracing::warn!(
            lottery_id = self.lottery_id,
            stale_request = %stale,
            request_id = %request.id,
            "winner randomness re-requested"
        );
        let _ = self.events.send(GameEvent::WinnerRequested {
            lottery_id: self.lottery_id,
            request_id: request.id,
        });
        Ok((stale, request))
    }

    /// Consume the fulfillment for this round: pick the winner, split the
    /// pool, credit payouts, and reset for the next round.
    pub fn fulfill(&mut self, request_id: Uuid, randomness: Randomness) -> GameResult<Address> {
        if self.state != LotteryState::Calculating || self.outstanding != Some(request_id) {
            return Err(GameError::UnknownOracleRequest(request_id));
        }

        let total = self.players.len() as u64;
        let index = (randomness_to_u64(&randomness) % total) as usize;
        let winner = self.players[index].clone();

        let split = split_fee(self.pool, self.platform_fee_bps, self.charity_fee_bps);
        self.escrow.credit(&self.platform_address, split.platform);
        self.escrow.credit(&self.charity_address, split.charity);
        self.escrow.credit(&winner, split.remainder);

        let finished_id = self.lottery_id;
        self.recent_winner = Some(winner.clone());
        self.pool = 0;
        self.players.clear();
        self.outstanding = None;
        self.state = LotteryState::Closed;
        self.lottery_id += 1;

        tracing::info!(
            lottery_id = finished_id,
            winner = %winner,
            prize = split.remainder,
            "winner picked"
        );
        let _ = self.events.send(GameEvent::WinnerPicked {
            winner: winner.clone(),
            amount: split.remainder,
            lottery_id: finished_id,
        });
        Ok(winner)
    }

    pub fn set_ticket_price(&mut self, caller: &Address, price: u64) -> GameResult<()> {
        self.ensure_admin(caller)?;
        if self.state != LotteryState::Closed {
            return Err(GameError::CannotChangeWhileActive);
        }
        self.ticket_price = price;
        Ok(())
    }

    pub fn set_addresses(
        &mut self,
        caller: &Address,
        charity: Address,
        platform: Address,
    ) -> GameResult<()> {
        self.ensure_admin(caller)?;
        if self.state != LotteryState::Closed {
            return Err(GameError::CannotChangeWhileActive);
        }
        self.charity_address = charity;
        self.platform_address = platform;
        Ok(())
    }

    pub fn set_fees(
        &mut self,
        caller: &Address,
        platform_bps: u16,
        charity_bps: u16,
    ) -> GameResult<()> {
        self.ensure_admin(caller)?;
        if self.state != LotteryState::Closed {
            return Err(GameError::CannotChangeWhileActive);
        }
        validate_fee_config(platform_bps, charity_bps)?;
        self.platform_fee_bps = platform_bps;
        self.charity_fee_bps = charity_bps;
        Ok(())
    }

    pub fn lottery_info(&self) -> LotteryInfo {
        LotteryInfo {
            lottery_id: self.lottery_id,
            state: self.state,
            prize_pool: self.pool,
            ticket_price: self.ticket_price,
            total_tickets: self.players.len() as u64,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }

    pub fn player_ticket_count(&self, player: &Address) -> u64 {
        self.players.iter().filter(|p| *p == player).count() as u64
    }

    pub fn players(&self) -> &[Address] {
        &self.players
    }

    pub fn recent_winner(&self) -> Option<&Address> {
        self.recent_winner.as_ref()
    }

    pub fn ticket_price(&self) -> u64 {
        self.ticket_price
    }

    pub fn pool(&self) -> u64 {
        self.pool
    }

    pub fn platform_fee_bps(&self) -> u16 {
        self.platform_fee_bps
    }

    pub fn charity_fee_bps(&self) -> u16 {
        self.charity_fee_bps
    }

    /// Seconds until entries close; zero once elapsed or while not open.
    pub fn time_remaining(&self) -> u64 {
        if self.state != LotteryState::Open {
            return 0;
        }
        self.end_time.saturating_sub(self.clock.now())
    }
}
