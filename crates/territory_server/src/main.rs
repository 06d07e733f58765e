//! Territory - headless game host.
//!
//! Hosts one or more demo games and ticks each of them at a fixed rate.
//!
//! # Usage
//!
//! ```bash
//! # One demo game until it ends
//! cargo run -p territory_server
//!
//! # Four games, 600 ticks each, as fast as possible, final state as JSON
//! cargo run -p territory_server -- --games 4 --ticks 600 --interval-ms 0 --snapshot
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides the default level.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use territory_core::components::{GameId, PlayerId};
use territory_core::simulation::TickEngine;
use territory_core::store::MemoryStore;
use territory_server::demo::{assault_orders, create_game, DEMO_PLAYERS};
use territory_server::{Result, ServerConfig, TickScheduler};

#[derive(Parser)]
#[command(name = "territory_server")]
#[command(about = "Headless territory-control game host")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// RON server configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RON simulation rules; overrides the server configuration
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Number of demo games
    #[arg(short, long)]
    games: Option<usize>,

    /// Seed of the first game
    #[arg(short, long)]
    seed: Option<u64>,

    /// Stop each game after this many ticks
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Milliseconds between ticks
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Send every troop at the enemy base after this many ticks
    #[arg(long)]
    assault_after: Option<u64>,

    /// Print each game's final state as JSON on stdout
    #[arg(long)]
    snapshot: bool,

    /// Player whose view is printed; everything when absent
    #[arg(long, requires = "snapshot")]
    viewer: Option<u64>,
}

impl Cli {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(rules) = &self.rules {
            config.sim_config = Some(rules.clone());
        }
        if let Some(games) = self.games {
            config.demo_games = games;
        }
        if let Some(seed) = self.seed {
            config.demo_seed = seed;
        }
        if self.ticks.is_some() {
            config.max_ticks = self.ticks;
        }
        if let Some(interval) = self.interval_ms {
            config.tick_interval_ms = interval;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = cli.server_config()?;
    let rules = config.load_sim_config()?;
    tracing::info!(
        games = config.demo_games,
        interval_ms = config.tick_interval_ms,
        max_ticks = ?config.max_ticks,
        "Starting territory server"
    );

    let mut engine = TickEngine::new(MemoryStore::new(), rules);
    let mut games = Vec::with_capacity(config.demo_games);
    for (seed, index) in (config.demo_seed..).zip(1..=config.demo_games as u64) {
        let id = GameId(index);
        create_game(&mut engine, id, seed)?;
        games.push(id);
    }

    let interval = Duration::from_millis(config.tick_interval_ms.max(1));
    let scheduler = TickScheduler::new(engine, interval).with_max_ticks(config.max_ticks);

    if let Some(after) = cli.assault_after {
        let orders = scheduler.clone();
        let games = games.clone();
        tokio::spawn(async move {
            tokio::time::sleep(interval * after as u32).await;
            for &game in &games {
                order_assault(&orders, game).await;
            }
        });
    }

    let summaries = scheduler.run_all(&games).await?;
    for summary in &summaries {
        tracing::info!(
            game = %summary.game_id,
            ticks = summary.ticks,
            halt = ?summary.halt,
            shots = summary.shots,
            hits = summary.hits,
            kills = summary.kills,
            spawned = summary.spawned,
            captures = summary.captures,
            destroyed = summary.destroyed,
            income = summary.income,
            "Game finished"
        );
    }

    if cli.snapshot {
        let viewer = cli.viewer.map(PlayerId);
        for &game in &games {
            let snapshot = scheduler.snapshot(game, viewer).await?;
            println!("{}", serde_json::to_string(&snapshot)?);
        }
    }

    Ok(())
}

async fn order_assault(scheduler: &TickScheduler, game: GameId) {
    for player in DEMO_PLAYERS {
        let snapshot = match scheduler.snapshot(game, Some(player)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(game = %game, error = %e, "No snapshot for assault");
                return;
            }
        };
        for order in assault_orders(&snapshot, player) {
            if let Err(e) = scheduler.submit(game, &order).await {
                tracing::warn!(game = %game, %player, error = %e, "Assault order rejected");
            }
        }
    }
}
