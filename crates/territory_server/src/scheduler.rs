//! Fixed-rate tick loops.
//!
//! Every scheduled game gets its own tokio task that ticks it once per
//! interval. All tasks share one engine behind an async mutex, so ticks of
//! different games and incoming commands never overlap.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use territory_core::commands::{Command, CommandOutcome};
use territory_core::components::{GameId, PlayerId};
use territory_core::context::TickReport;
use territory_core::error::GameError;
use territory_core::simulation::{HaltReason, TickEngine, TickOutcome};
use territory_core::store::{GameStore, MemoryStore};
use territory_core::visibility::StateSnapshot;

use crate::Result;

/// Engine shared between game tasks.
pub type SharedEngine = Arc<Mutex<TickEngine<MemoryStore>>>;

/// What happened to one game while it was scheduled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameSummary {
    /// The game.
    pub game_id: GameId,
    /// Ticks that ran to completion.
    pub ticks: u64,
    /// Why the loop stopped; `None` when it hit the tick limit.
    pub halt: Option<HaltReason>,
    /// Shots fired.
    pub shots: u64,
    /// Shots that hit.
    pub hits: u64,
    /// Units killed.
    pub kills: usize,
    /// Units created.
    pub spawned: usize,
    /// Completed captures.
    pub captures: usize,
    /// Buildings destroyed.
    pub destroyed: usize,
    /// Credits paid out.
    pub income: i64,
}

impl GameSummary {
    fn new(game_id: GameId) -> Self {
        Self {
            game_id,
            ..Self::default()
        }
    }

    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.shots += u64::from(report.shots);
        self.hits += u64::from(report.hits);
        self.kills += report.kills.len();
        self.spawned += report.spawned.len();
        self.captures += report.captures.len();
        self.destroyed += report.destroyed_buildings.len();
        self.income += report.income;
    }
}

/// Drives the tick loops of every hosted game.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    engine: SharedEngine,
    interval: Duration,
    max_ticks: Option<u64>,
}

impl TickScheduler {
    /// Scheduler ticking every game once per `interval`.
    #[must_use]
    pub fn new(engine: TickEngine<MemoryStore>, interval: Duration) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            interval,
            max_ticks: None,
        }
    }

    /// Stop each loop after `max_ticks` completed ticks.
    #[must_use]
    pub const fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Handle to the shared engine.
    #[must_use]
    pub fn engine(&self) -> SharedEngine {
        Arc::clone(&self.engine)
    }

    /// Start the tick loop of `game_id`.
    ///
    /// The loop ends when the engine halts the game or the tick limit is
    /// reached.
    pub fn spawn(&self, game_id: GameId) -> JoinHandle<Result<GameSummary>> {
        let engine = self.engine();
        let period = self.interval;
        let max_ticks = self.max_ticks;
        tokio::spawn(async move { run_game(engine, game_id, period, max_ticks).await })
    }

    /// Run the loops of all `games` to completion.
    ///
    /// # Errors
    ///
    /// The first failed loop, in the order given.
    pub async fn run_all(&self, games: &[GameId]) -> Result<Vec<GameSummary>> {
        let handles: Vec<_> = games.iter().map(|&id| self.spawn(id)).collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(handle.await??);
        }
        Ok(summaries)
    }

    /// Apply a player command at the game's current time.
    ///
    /// # Errors
    ///
    /// The command's rejection or a missing game.
    pub async fn submit(&self, game_id: GameId, command: &Command) -> Result<CommandOutcome> {
        let mut engine = self.engine.lock().await;
        let now = game_clock(&engine, game_id).ok_or(GameError::GameNotFound(game_id.0))?;
        Ok(engine.submit(game_id, now, command)?)
    }

    /// The game as seen by `viewer`.
    ///
    /// # Errors
    ///
    /// A missing game or map.
    pub async fn snapshot(&self, game_id: GameId, viewer: Option<PlayerId>) -> Result<StateSnapshot> {
        let engine = self.engine.lock().await;
        let state = engine.store().load_game(game_id)?;
        let map = engine.store().load_map(&state.game().map_id)?;
        Ok(StateSnapshot::for_viewer(&state, &map, viewer, engine.config()))
    }
}

/// Time of the next tick of a game. Tick `n` runs at `n * tick_ms`.
fn game_clock(engine: &TickEngine<MemoryStore>, game_id: GameId) -> Option<u64> {
    let state = engine.store().game(game_id)?;
    Some(state.game().tick_count * engine.config().tick_ms)
}

async fn run_game(
    engine: SharedEngine,
    game_id: GameId,
    period: Duration,
    max_ticks: Option<u64>,
) -> Result<GameSummary> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut summary = GameSummary::new(game_id);
    tracing::info!(game = %game_id, period_ms = period.as_millis(), "Game scheduled");

    while max_ticks.map_or(true, |max| summary.ticks < max) {
        interval.tick().await;

        let outcome = {
            let mut engine = engine.lock().await;
            match game_clock(&engine, game_id) {
                Some(now) => engine.run_tick(game_id, now)?,
                None => TickOutcome::Halt(HaltReason::GameNotFound(game_id)),
            }
        };

        match outcome {
            TickOutcome::Continue(report) => {
                if let Some(phase) = report.phase_change {
                    tracing::info!(game = %game_id, ?phase, "Phase changed");
                }
                for capture in &report.captures {
                    tracing::info!(game = %game_id, ?capture, "Building captured");
                }
                summary.record(&report);
            }
            TickOutcome::Halt(reason) => {
                tracing::info!(game = %game_id, ?reason, ticks = summary.ticks, "Game halted");
                summary.halt = Some(reason);
                break;
            }
        }
    }

    Ok(summary)
}
