//! End-to-end sessions across all three engines, driven through the casino
//! service and the bundled VRF oracle adapter.

use stakehouse::clock::ManualClock;
use stakehouse::config::CasinoConfig;
use stakehouse::escrow::split_fee;
use stakehouse::games::types::{Address, BingoState, DuelState, GameEvent, LotteryState};
use stakehouse::oracle::VrfOracle;
use stakehouse::{Casino, GameError};
use std::sync::Arc;

const DURATION: u64 = 86_400;

fn addr(id: &str) -> Address {
    Address::from(id)
}

fn build_casino(oracle_seed: u8) -> (Casino, Arc<ManualClock>, CasinoConfig) {
    let config = CasinoConfig::default();
    let (oracle, inbox) = VrfOracle::from_seed([oracle_seed; 32]);
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let casino = Casino::new(&config, oracle, inbox, clock.clone());
    (casino, clock, config)
}

#[tokio::test]
async fn test_full_raffle_round_reconciles_exactly() {
    let (casino, clock, config) = build_casino(42);
    let admin = addr(&config.admin);
    let price = casino.ticket_price().await;

    casino.start_lottery(&admin, DURATION).await.expect("open");
    casino
        .buy_tickets(&addr("alice"), 2, 2 * price)
        .await
        .expect("alice");
    casino
        .buy_tickets(&addr("bob"), 1, price)
        .await
        .expect("bob");
    casino
        .buy_tickets(&addr("carol"), 3, 3 * price)
        .await
        .expect("carol");

    let info = casino.lottery_info().await;
    assert_eq!(info.prize_pool, 6 * price);
    assert_eq!(info.total_tickets, 6);

    // A regular player cannot close before the window elapses.
    assert_eq!(
        casino.end_lottery(&addr("alice")).await,
        Err(GameError::NotYetEnded)
    );

    clock.advance(DURATION + 1);
    casino.end_lottery(&addr("alice")).await.expect("close");
    assert_eq!(casino.lottery_info().await.state, LotteryState::Calculating);

    // Calculating blocks further entries until the fulfillment lands.
    assert_eq!(
        casino.buy_tickets(&addr("alice"), 1, price).await,
        Err(GameError::WrongState)
    );

    // Exactly one request was issued for the round.
    assert_eq!(casino.pump_oracle().await, 1);

    let winner = casino.recent_winner().await.expect("winner recorded");
    assert!(
        [addr("alice"), addr("bob"), addr("carol")].contains(&winner),
        "winner {} must hold one of the six entries",
        winner
    );
    assert_eq!(casino.lottery_info().await.state, LotteryState::Closed);

    // The pool was redistributed without loss.
    let split = split_fee(6 * price, 250, 250);
    assert_eq!(casino.escrow().pending_total(), 6 * price);
    assert_eq!(
        casino.withdraw_winnings(&winner).await.expect("winner payout"),
        split.remainder
    );
    assert_eq!(
        casino
            .withdraw(&addr("platform-treasury"))
            .await
            .expect("platform fee"),
        split.platform
    );
    assert_eq!(
        casino
            .withdraw(&addr("charity-treasury"))
            .await
            .expect("charity fee"),
        split.charity
    );
    assert_eq!(casino.escrow().pending_total(), 0);

    // Pull payments drain exactly once.
    assert_eq!(
        casino.withdraw_winnings(&winner).await,
        Err(GameError::NothingToWithdraw)
    );

    // The engine is ready for the next round.
    casino.start_lottery(&admin, DURATION).await.expect("reopen");
    assert_eq!(casino.lottery_info().await.lottery_id, 2);
}

#[tokio::test]
async fn test_duel_session_reconciles() {
    let (casino, _, config) = build_casino(7);
    casino.initialize().await.expect("initialize");
    assert_eq!(casino.pump_oracle().await, 1, "duel seed delivered");

    let funding = config.duel.initial_house_funding;
    let dave = addr("dave");
    let stake = casino.min_bet().await * 20;
    let mut events = casino.subscribe();

    let mut view = casino.start_duel(&dave, stake).await.expect("deal");
    while view.state == DuelState::PlayerTurn {
        view = if view.player_total < 17 {
            casino.hit(&dave).await.expect("hit")
        } else {
            casino.stand(&dave).await.expect("stand")
        };
    }
    assert_eq!(view.state, DuelState::Ended);

    let mut payout = None;
    while let Ok(event) = events.try_recv() {
        if let GameEvent::GameEnded { player, payout: p, .. } = event {
            assert_eq!(player, dave);
            payout = Some(p);
        }
    }
    let payout = payout.expect("GameEnded event");

    // Every base unit the duel touched is still accounted for.
    assert_eq!(casino.house_balance().await, funding + stake - payout);
    assert_eq!(casino.escrow().balance(&dave), payout);

    let report = casino.reconciliation().await;
    assert_eq!(report.total_held(), funding + stake);
}

#[tokio::test]
async fn test_bingo_game_to_claim() {
    let (casino, _, config) = build_casino(99);
    let admin = addr(&config.admin);
    let price = casino.card_price().await;
    let erin = addr("erin");
    let frank = addr("frank");

    let game_id = casino.start_new_bingo_game(&admin).await.expect("new game");
    assert_eq!(casino.pump_oracle().await, 1, "card seed delivered");

    let erin_card = casino.buy_card(&erin, price).await.expect("erin card");
    let frank_card = casino.buy_card(&frank, price).await.expect("frank card");
    casino.start_bingo(&admin).await.expect("start");

    let info = casino.bingo_game_info(game_id).await.expect("info");
    assert_eq!(info.state, BingoState::Active);
    assert_eq!(info.pool, 2 * price);
    assert_eq!(info.total_players, 2);

    let mut winner = None;
    'game: for _ in 0..75 {
        casino.draw_number(&admin).await.expect("draw");
        assert_eq!(casino.pump_oracle().await, 1, "draw delivered");

        let drawn = casino.drawn_numbers(game_id).await;
        let latest = *drawn.last().expect("at least one number");

        for (player, card_id) in [(&erin, erin_card), (&frank, frank_card)] {
            let details = casino
                .card_details(game_id, card_id)
                .await
                .expect("card details");
            if details.numbers.contains(&latest) {
                casino
                    .mark_number(player, card_id, latest)
                    .await
                    .expect("mark");
            }
            match casino.claim_bingo(player, card_id).await {
                Ok(prize) => {
                    assert_eq!(prize, 2 * price, "whole pool goes to the claimant");
                    winner = Some(player.clone());
                    break 'game;
                }
                Err(GameError::NoWinningPattern) => {}
                Err(e) => panic!("unexpected claim failure: {}", e),
            }
        }
    }

    let winner = winner.expect("a full board always completes a line");
    assert_eq!(casino.escrow().balance(&winner), 2 * price);

    let info = casino.bingo_game_info(game_id).await.expect("info");
    assert_eq!(info.state, BingoState::Ended);
    assert_eq!(info.pool, 0);

    // No repeats among the drawn numbers.
    let drawn = casino.drawn_numbers(game_id).await;
    let mut deduped = drawn.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), drawn.len());
}

#[tokio::test]
async fn test_mixed_session_conserves_value() {
    let (casino, clock, config) = build_casino(17);
    casino.initialize().await.expect("initialize");
    let admin = addr(&config.admin);

    let ticket_price = casino.ticket_price().await;
    let card_price = casino.card_price().await;
    let stake = casino.min_bet().await * 5;
    let funding = config.duel.initial_house_funding;
    let mut total_in = funding;

    // Raffle: six tickets.
    casino.start_lottery(&admin, DURATION).await.expect("open");
    for (name, count) in [("alice", 2u64), ("bob", 1), ("carol", 3)] {
        casino
            .buy_tickets(&addr(name), count, count * ticket_price)
            .await
            .expect("buy");
        total_in += count * ticket_price;
    }
    clock.advance(DURATION + 1);
    casino.end_lottery(&admin).await.expect("close");

    // Duel: one stake, played to the end.
    casino.pump_oracle().await;
    let dave = addr("dave");
    let mut view = casino.start_duel(&dave, stake).await.expect("deal");
    total_in += stake;
    while view.state == DuelState::PlayerTurn {
        view = casino.stand(&dave).await.expect("stand");
    }

    // Bingo: two cards, played until claimed.
    let game_id = casino.start_new_bingo_game(&admin).await.expect("new game");
    casino.pump_oracle().await;
    let erin = addr("erin");
    let erin_card = casino.buy_card(&erin, card_price).await.expect("card");
    total_in += card_price;
    casino.start_bingo(&admin).await.expect("start");
    'bingo: for _ in 0..75 {
        casino.draw_number(&admin).await.expect("draw");
        casino.pump_oracle().await;
        let drawn = casino.drawn_numbers(game_id).await;
        let latest = *drawn.last().expect("number drawn");
        let details = casino
            .card_details(game_id, erin_card)
            .await
            .expect("details");
        if details.numbers.contains(&latest) {
            casino
                .mark_number(&erin, erin_card, latest)
                .await
                .expect("mark");
        }
        match casino.claim_bingo(&erin, erin_card).await {
            Ok(_) => break 'bingo,
            Err(GameError::NoWinningPattern) => {}
            Err(e) => panic!("unexpected claim failure: {}", e),
        }
    }

    // Everything resolved: pools drained into pending balances and the
    // bankroll, nothing created or destroyed.
    let report = casino.reconciliation().await;
    assert_eq!(report.raffle_pool, 0);
    assert_eq!(report.bingo_pool, 0);
    assert_eq!(report.total_held(), total_in);

    // Draining every pending balance pays out exactly what was pending.
    let pending_before = report.pending_withdrawals;
    let mut withdrawn = 0;
    for name in [
        "alice",
        "bob",
        "carol",
        "dave",
        "erin",
        "platform-treasury",
        "charity-treasury",
    ] {
        match casino.withdraw(&addr(name)).await {
            Ok(amount) => withdrawn += amount,
            Err(GameError::NothingToWithdraw) => {}
            Err(e) => panic!("unexpected withdraw failure: {}", e),
        }
    }
    assert_eq!(withdrawn, pending_before);
    assert_eq!(casino.escrow().pending_total(), 0);
}
