//! Casino service: owns the engines, the escrow ledger, and the oracle seam.
//!
//! Every state-mutating operation takes one engine write lock, so operations
//! on a given game are indivisible and serially ordered. Oracle requests
//! issued by the engines are registered here and forwarded to the adapter;
//! fulfillments come back through [`Casino::pump_oracle`] as their own atomic
//! steps, never inside the operation that requested them.

use crate::clock::Clock;
use crate::config::CasinoConfig;
use crate::errors::GameResult;
use crate::escrow::EscrowLedger;
use crate::games::types::{
    Address, BingoGameInfo, CardDetails, DuelView, GameEvent, LotteryInfo,
};
use crate::games::{BingoEngine, DuelEngine, RaffleEngine};
use crate::oracle::{Fulfillment, OracleRequest, PendingRequests, Purpose, RandomnessOracle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};

/// Balance snapshot used by reconciliation checks: every base unit the
/// system has accepted is either pooled, pending withdrawal, or bankroll.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub raffle_pool: u64,
    pub bingo_pool: u64,
    pub house_balance: u64,
    pub pending_withdrawals: u64,
}

impl ReconciliationReport {
    pub fn total_held(&self) -> u64 {
        self.raffle_pool + self.bingo_pool + self.house_balance + self.pending_withdrawals
    }
}

pub struct Casino {
    escrow: Arc<EscrowLedger>,
    raffle: RwLock<RaffleEngine>,
    duel: RwLock<DuelEngine>,
    bingo: RwLock<BingoEngine>,
    pending: PendingRequests,
    oracle: Arc<dyn RandomnessOracle>,
    fulfillments: Mutex<mpsc::UnboundedReceiver<Fulfillment>>,
    events: broadcast::Sender<GameEvent>,
}

impl Casino {
    pub fn new(
        config: &CasinoConfig,
        oracle: Arc<dyn RandomnessOracle>,
        fulfillments: mpsc::UnboundedReceiver<Fulfillment>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let escrow = Arc::new(EscrowLedger::new());
        let (events, _) = broadcast::channel(1_024);
        let admin = Address::new(config.admin.clone());

        Self {
            raffle: RwLock::new(RaffleEngine::new(
                admin.clone(),
                &config.raffle,
                escrow.clone(),
                clock.clone(),
                events.clone(),
            )),
            duel: RwLock::new(DuelEngine::new(
                admin.clone(),
                &config.duel,
                escrow.clone(),
                events.clone(),
            )),
            bingo: RwLock::new(BingoEngine::new(
                admin,
                &config.bingo,
                escrow.clone(),
                clock,
                events.clone(),
            )),
            escrow,
            pending: PendingRequests::new(),
            oracle,
            fulfillments: Mutex::new(fulfillments),
            events,
        }
    }

    /// Prime the duel seed pipeline. Call once after construction.
    pub async fn initialize(&self) -> GameResult<()> {
        self.refill_duel_seed().await
    }

    /// Subscribe to the engines' event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    pub fn escrow(&self) -> &Arc<EscrowLedger> {
        &self.escrow
    }

    async fn dispatch(&self, request: OracleRequest) -> GameResult<()> {
        self.pending.register(&request);
        self.oracle.submit(&request).await
    }

    // ---- randomness delivery -------------------------------------------

    /// Drain queued fulfillments and deliver each as its own atomic step.
    /// Returns the number delivered; rejected deliveries are logged and
    /// skipped.
    pub async fn pump_oracle(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = { self.fulfillments.lock().await.try_recv() };
            let fulfillment = match next {
                Ok(f) => f,
                Err(_) => break,
            };
            match self.deliver(fulfillment).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(error = %e, "fulfillment rejected"),
            }
        }
        delivered
    }

    /// Route one fulfillment to the engine that requested it. The pending
    /// registry entry is consumed here, so a second delivery for the same
    /// id cannot reach an engine.
    pub async fn deliver(&self, fulfillment: Fulfillment) -> GameResult<()> {
        let purpose = self.pending.consume(fulfillment.request_id)?;
        match purpose {
            Purpose::RaffleWinner { .. } => {
                self.raffle
                    .write()
                    .await
                    .fulfill(fulfillment.request_id, fulfillment.randomness)?;
            }
            Purpose::DuelSeed => {
                self.duel
                    .write()
                    .await
                    .fulfill_seed(fulfillment.request_id, fulfillment.randomness)?;
            }
            Purpose::BingoSeed { .. } => {
                self.bingo
                    .write()
                    .await
                    .fulfill_seed(fulfillment.request_id, fulfillment.randomness)?;
            }
            Purpose::BingoDraw { .. } => {
                self.bingo
                    .write()
                    .await
                    .fulfill_draw(fulfillment.request_id, fulfillment.randomness)?;
            }
        }
        Ok(())
    }

    // ---- raffle ---------------------------------------------------------

    pub async fn start_lottery(&self, caller: &Address, duration_secs: u64) -> GameResult<()> {
        self.raffle
            .write()
            .await
            .start_lottery(caller, duration_secs)
    }

    pub async fn buy_tickets(&self, caller: &Address, count: u64, payment: u64) -> GameResult<()> {
        self.raffle.write().await.buy_tickets(caller, count, payment)
    }

    pub async fn end_lottery(&self, caller: &Address) -> GameResult<()> {
        let request = self.raffle.write().await.end_lottery(caller)?;
        self.dispatch(request).await
    }

    /// Admin recovery for a winner fulfillment that never arrived.
    pub async fn retry_lottery_randomness(&self, caller: &Address) -> GameResult<()> {
        let (stale, request) = self.raffle.write().await.retry_randomness(caller)?;
        self.pending.invalidate(stale);
        self.dispatch(request).await
    }

    pub async fn withdraw_winnings(&self, caller: &Address) -> GameResult<u64> {
        self.withdraw(caller).await
    }

    pub async fn set_ticket_price(&self, caller: &Address, price: u64) -> GameResult<()> {
        self.raffle.write().await.set_ticket_price(caller, price)
    }

    pub async fn set_addresses(
        &self,
        caller: &Address,
        charity: Address,
        platform: Address,
    ) -> GameResult<()> {
        self.raffle
            .write()
            .await
            .set_addresses(caller, charity, platform)
    }

    pub async fn set_fees(
        &self,
        caller: &Address,
        platform_bps: u16,
        charity_bps: u16,
    ) -> GameResult<()> {
        self.raffle
            .write()
            .await
            .set_fees(caller, platform_bps, charity_bps)
    }

    pub async fn lottery_info(&self) -> LotteryInfo {
        self.raffle.read().await.lottery_info()
    }

    pub async fn player_ticket_count(&self, player: &Address) -> u64 {
        self.raffle.read().await.player_ticket_count(player)
    }

    pub async fn recent_winner(&self) -> Option<Address> {
        self.raffle.read().await.recent_winner().cloned()
    }

    pub async fn ticket_price(&self) -> u64 {
        self.raffle.read().await.ticket_price()
    }

    pub async fn time_remaining(&self) -> u64 {
        self.raffle.read().await.time_remaining()
    }

    // ---- card duel ------------------------------------------------------

    pub async fn start_duel(&self, caller: &Address, payment: u64) -> GameResult<DuelView> {
        let (result, refill) = {
            let mut duel = self.duel.write().await;
            let result = duel.start_game(caller, payment);
            (result, duel.seed_request())
        };
        if let Some(request) = refill {
            self.dispatch(request).await?;
        }
        result
    }

    pub async fn hit(&self, caller: &Address) -> GameResult<DuelView> {
        self.duel.write().await.hit(caller)
    }

    pub async fn stand(&self, caller: &Address) -> GameResult<DuelView> {
        self.duel.write().await.stand(caller)
    }

    pub async fn double_down(&self, caller: &Address, payment: u64) -> GameResult<DuelView> {
        self.duel.write().await.double_down(caller, payment)
    }

    pub async fn fund_house(&self, caller: &Address, amount: u64) -> GameResult<()> {
        self.duel.write().await.fund_house(caller, amount)
    }

    pub async fn withdraw(&self, caller: &Address) -> GameResult<u64> {
        // The ledger zeroes the balance before this amount is released to
        // the caller.
        let amount = self.escrow.withdraw(caller)?;
        tracing::info!(player = %caller, amount, "withdrawal paid out");
        Ok(amount)
    }

    pub async fn game_state(&self, player: &Address) -> DuelView {
        self.duel.read().await.game_state(player)
    }

    pub async fn min_bet(&self) -> u64 {
        self.duel.read().await.min_bet()
    }

    pub async fn max_bet(&self) -> u64 {
        self.duel.read().await.max_bet()
    }

    pub async fn house_balance(&self) -> u64 {
        self.duel.read().await.house_balance()
    }

    async fn refill_duel_seed(&self) -> GameResult<()> {
        let refill = self.duel.write().await.seed_request();
        if let Some(request) = refill {
            self.dispatch(request).await?;
        }
        Ok(())
    }

    // ---- number match ---------------------------------------------------

    /// Open a fresh bingo game for card sales; returns its id.
    pub async fn start_new_bingo_game(&self, caller: &Address) -> GameResult<u64> {
        let (stale, request) = self.bingo.write().await.start_new_game(caller)?;
        if let Some(stale) = stale {
            self.pending.invalidate(stale);
        }
        self.dispatch(request).await?;
        Ok(self.bingo.read().await.current_game_id())
    }

    pub async fn buy_card(&self, caller: &Address, payment: u64) -> GameResult<u64> {
        self.bingo.write().await.buy_card(caller, payment)
    }

    pub async fn start_bingo(&self, caller: &Address) -> GameResult<()> {
        self.bingo.write().await.start_game(caller)
    }

    pub async fn draw_number(&self, caller: &Address) -> GameResult<()> {
        let request = self.bingo.write().await.draw_number(caller)?;
        self.dispatch(request).await
    }

    /// Admin recovery for a draw fulfillment that never arrived.
    pub async fn retry_bingo_draw(&self, caller: &Address) -> GameResult<()> {
        let (stale, request) = self.bingo.write().await.retry_draw(caller)?;
        self.pending.invalidate(stale);
        self.dispatch(request).await
    }

    pub async fn mark_number(
        &self,
        caller: &Address,
        card_id: u64,
        number: u8,
    ) -> GameResult<()> {
        self.bingo.write().await.mark_number(caller, card_id, number)
    }

    pub async fn claim_bingo(&self, caller: &Address, card_id: u64) -> GameResult<u64> {
        self.bingo.write().await.claim_bingo(caller, card_id)
    }

    pub async fn bingo_game_info(&self, game_id: u64) -> Option<BingoGameInfo> {
        self.bingo.read().await.game_info(game_id)
    }

    pub async fn player_cards(&self, player: &Address, game_id: u64) -> Vec<u64> {
        self.bingo.read().await.player_cards(player, game_id)
    }

    pub async fn card_details(&self, game_id: u64, card_id: u64) -> Option<CardDetails> {
        self.bingo.read().await.card_details(game_id, card_id)
    }

    pub async fn drawn_numbers(&self, game_id: u64) -> Vec<u8> {
        self.bingo.read().await.drawn_numbers(game_id)
    }

    pub async fn card_price(&self) -> u64 {
        self.bingo.read().await.card_price()
    }

    pub async fn current_bingo_game_id(&self) -> u64 {
        self.bingo.read().await.current_game_id()
    }

    // ---- accounting -----------------------------------------------------

    pub async fn reconciliation(&self) -> ReconciliationReport {
        ReconciliationReport {
            raffle_pool: self.raffle.read().await.pool(),
            bingo_pool: self.bingo.read().await.pool(),
            house_balance: self.duel.read().await.house_balance(),
            pending_withdrawals: self.escrow.pending_total(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::GameError;
    use crate::games::types::LotteryState;
    use crate::oracle::VrfOracle;
    use uuid::Uuid;

    fn addr(id: &str) -> Address {
        Address::from(id)
    }

    fn build_casino() -> (Casino, Arc<ManualClock>) {
        let config = CasinoConfig::default();
        let (oracle, inbox) = VrfOracle::from_seed([23u8; 32]);
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let casino = Casino::new(&config, oracle, inbox, clock.clone());
        (casino, clock)
    }

    #[tokio::test]
    async fn test_lottery_round_through_the_oracle() {
        let (casino, clock) = build_casino();
        let admin = addr("operator");
        let price = casino.ticket_price().await;

        casino.start_lottery(&admin, 3_600).await.expect("open");
        casino
            .buy_tickets(&addr("alice"), 2, 2 * price)
            .await
            .expect("alice");
        casino
            .buy_tickets(&addr("bob"), 1, price)
            .await
            .expect("bob");

        clock.advance(3_601);
        casino.end_lottery(&addr("anyone")).await.expect("close");
        assert_eq!(
            casino.lottery_info().await.state,
            LotteryState::Calculating
        );

        // The fulfillment is queued, not applied: delivery is its own step.
        assert_eq!(casino.recent_winner().await, None);
        assert_eq!(casino.pump_oracle().await, 1);

        let winner = casino.recent_winner().await.expect("winner recorded");
        assert!(winner == addr("alice") || winner == addr("bob"));
        assert_eq!(casino.lottery_info().await.state, LotteryState::Closed);

        // Pool fully redistributed.
        assert_eq!(casino.escrow().pending_total(), 3 * price);

        let amount = casino.withdraw_winnings(&winner).await.expect("withdraw");
        assert!(amount > 0);
        assert_eq!(
            casino.withdraw_winnings(&winner).await,
            Err(GameError::NothingToWithdraw)
        );
    }

    #[tokio::test]
    async fn test_duel_seed_pipeline() {
        let (casino, _) = build_casino();
        let min = casino.min_bet().await;

        // Before initialization there is no seed and no outstanding request.
        assert_eq!(
            casino.start_duel(&addr("dave"), min).await,
            Err(GameError::RandomnessUnavailable)
        );

        // The failed start issued a request; deliver it and play.
        assert_eq!(casino.pump_oracle().await, 1);
        let view = casino.start_duel(&addr("dave"), min).await.expect("deal");
        assert_eq!(view.player_cards.len(), 2);
    }

    #[tokio::test]
    async fn test_initialize_primes_the_seed() {
        let (casino, _) = build_casino();
        casino.initialize().await.expect("initialize");
        assert_eq!(casino.pump_oracle().await, 1);
        assert!(casino
            .start_duel(&addr("dave"), casino.min_bet().await)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_fulfillment_is_rejected() {
        let (casino, _) = build_casino();
        let bogus = Fulfillment {
            request_id: Uuid::new_v4(),
            randomness: [0u8; 32],
            proof: None,
        };
        assert_eq!(
            casino.deliver(bogus.clone()).await,
            Err(GameError::UnknownOracleRequest(bogus.request_id))
        );
    }

    #[tokio::test]
    async fn test_bingo_session() {
        let (casino, _) = build_casino();
        let admin = addr("operator");
        let price = casino.card_price().await;

        let game_id = casino.start_new_bingo_game(&admin).await.expect("new game");
        assert_eq!(casino.pump_oracle().await, 1, "seed delivered");

        let card_id = casino.buy_card(&addr("erin"), price).await.expect("card");
        casino.start_bingo(&admin).await.expect("start");

        casino.draw_number(&admin).await.expect("draw");
        assert_eq!(casino.pump_oracle().await, 1, "draw delivered");

        let drawn = casino.drawn_numbers(game_id).await;
        assert_eq!(drawn.len(), 1);

        let details = casino.card_details(game_id, card_id).await.expect("details");
        if details.numbers.contains(&drawn[0]) {
            casino
                .mark_number(&addr("erin"), card_id, drawn[0])
                .await
                .expect("mark");
        }

        let report = casino.reconciliation().await;
        assert_eq!(report.bingo_pool, price);
    }

    #[tokio::test]
    async fn test_reconciliation_totals() {
        let (casino, clock) = build_casino();
        let admin = addr("operator");
        let price = casino.ticket_price().await;
        let funding = casino.house_balance().await;

        casino.start_lottery(&admin, 60).await.expect("open");
        casino
            .buy_tickets(&addr("alice"), 3, 3 * price)
            .await
            .expect("buy");

        let report = casino.reconciliation().await;
        assert_eq!(report.total_held(), funding + 3 * price);

        clock.advance(61);
        casino.end_lottery(&admin).await.expect("close");
        casino.pump_oracle().await;

        // Resolution moved the pool into pending withdrawals, total intact.
        let report = casino.reconciliation().await;
        assert_eq!(report.raffle_pool, 0);
        assert_eq!(report.total_held(), funding + 3 * price);
    }
}
