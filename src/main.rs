//! Demo driver: runs one scripted session across all three engines against
//! the bundled VRF oracle adapter.

use clap::Parser;
use stakehouse::clock::SystemClock;
use stakehouse::config::ConfigLoader;
use stakehouse::games::types::{Address, DuelState};
use stakehouse::oracle::{Randomness, VrfOracle};
use stakehouse::{Casino, GameError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "stakehouse", about = "Pooled-stake wagering engines demo")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// 64-hex-char oracle key seed for a reproducible run.
    #[arg(long)]
    oracle_seed: Option<String>,
}

fn parse_seed(hex_seed: &str) -> Result<Randomness, String> {
    let bytes = hex::decode(hex_seed).map_err(|e| format!("invalid seed hex: {}", e))?;
    bytes
        .try_into()
        .map_err(|_| "oracle seed must be exactly 32 bytes".to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let config = loader.load()?;

    let (oracle, inbox) = match &args.oracle_seed {
        Some(hex_seed) => VrfOracle::from_seed(parse_seed(hex_seed)?),
        None => VrfOracle::new_random(),
    };
    info!(public_key = %oracle.public_key_hex(), "oracle adapter ready");

    let casino = Casino::new(&config, oracle, inbox, Arc::new(SystemClock));
    casino.initialize().await?;
    let mut events = casino.subscribe();

    let admin = Address::new(config.admin.clone());

    // --- raffle round ---------------------------------------------------
    let price = casino.ticket_price().await;
    casino.start_lottery(&admin, 3_600).await?;
    for (name, count) in [("alice", 2u64), ("bob", 1), ("carol", 3)] {
        casino
            .buy_tickets(&Address::from(name), count, count * price)
            .await?;
    }
    let pool = casino.lottery_info().await.prize_pool;
    info!(pool, "raffle entries recorded");

    casino.end_lottery(&admin).await?;
    casino.pump_oracle().await;

    if let Some(winner) = casino.recent_winner().await {
        let prize = casino.withdraw_winnings(&winner).await?;
        info!(winner = %winner, prize, "raffle settled");
    }

    // --- card duel ------------------------------------------------------
    let dave = Address::from("dave");
    let stake = casino.min_bet().await * 10;
    let mut view = casino.start_duel(&dave, stake).await?;
    while view.state == DuelState::PlayerTurn {
        view = if view.player_total < 17 {
            casino.hit(&dave).await?
        } else {
            casino.stand(&dave).await?
        };
    }
    info!(
        player_total = view.player_total,
        house_total = view.house_total,
        "duel finished"
    );
    match casino.withdraw(&dave).await {
        Ok(amount) => info!(player = %dave, amount, "duel winnings withdrawn"),
        Err(GameError::NothingToWithdraw) => info!("house keeps the stake"),
        Err(e) => return Err(e.into()),
    }

    // --- number match ---------------------------------------------------
    let erin = Address::from("erin");
    let frank = Address::from("frank");
    let card_price = casino.card_price().await;

    let game_id = casino.start_new_bingo_game(&admin).await?;
    casino.pump_oracle().await;

    let erin_card = casino.buy_card(&erin, card_price).await?;
    let frank_card = casino.buy_card(&frank, card_price).await?;
    casino.start_bingo(&admin).await?;

    let mut bingo_winner = None;
    'game: for _ in 0..75 {
        casino.draw_number(&admin).await?;
        casino.pump_oracle().await;

        let drawn = casino.drawn_numbers(game_id).await;
        let latest = match drawn.last() {
            Some(n) => *n,
            None => continue,
        };

        for (player, card_id) in [(&erin, erin_card), (&frank, frank_card)] {
            let details = match casino.card_details(game_id, card_id).await {
                Some(d) => d,
                None => continue,
            };
            if details.numbers.contains(&latest) {
                casino.mark_number(player, card_id, latest).await?;
            }
            match casino.claim_bingo(player, card_id).await {
                Ok(prize) => {
                    info!(winner = %player, prize, draws = drawn.len(), "bingo claimed");
                    bingo_winner = Some(player.clone());
                    break 'game;
                }
                Err(GameError::NoWinningPattern) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
    if let Some(winner) = bingo_winner {
        let amount = casino.withdraw(&winner).await?;
        info!(winner = %winner, amount, "bingo prize withdrawn");
    }

    // --- wrap-up --------------------------------------------------------
    let mut event_count = 0usize;
    while let Ok(event) = events.try_recv() {
        let json = serde_json::to_string(&event)?;
        tracing::debug!(event = %json, "event");
        event_count += 1;
    }

    let report = casino.reconciliation().await;
    info!(
        events = event_count,
        raffle_pool = report.raffle_pool,
        bingo_pool = report.bingo_pool,
        house_balance = report.house_balance,
        pending_withdrawals = report.pending_withdrawals,
        "session complete"
    );

    Ok(())
}
