//! The tick pipeline.
//!
//! [`Simulation`] owns one game's state, map and rules and advances them one
//! fixed-rate tick at a time. Stages run in this order, and changed records
//! are flushed at the checkpoints in brackets:
//!
//! 1. lifecycle (phase transitions, game end)
//! 2. alliance expiry, construction completion
//! 3. collision grid, power grid, spatial index
//! 4. capture resolution `[AfterCapture]`
//! 5. per-unit combat and behavior `[AfterBehavior]`
//! 6. destruction sweep `[AfterCleanup]`
//! 7. spawning, then the economy on round ticks `[Final]`
//!
//! [`TickEngine`] wraps the same pipeline around a [`GameStore`]: it loads a
//! snapshot, runs one tick and tells the scheduler whether to keep going.

use crate::behavior::{self, WorkshopLedger};
use crate::capture::resolve_captures;
use crate::combat::{clear_stale_attack, resolve_attack, sweep_destroyed};
use crate::commands::{self, Command, CommandOutcome};
use crate::components::{GameId, GamePhase, GameStatus, PlayerId, PlayerStatus};
use crate::config::SimConfig;
use crate::context::{TickContext, TickReport};
use crate::diplomacy::expire_alliances;
use crate::economy::run_round;
use crate::error::{GameError, Result};
use crate::grid::CollisionGrid;
use crate::map::MapDocument;
use crate::power::PowerGrid;
use crate::spatial::SpatialIndex;
use crate::spawning::run_spawning;
use crate::state::GameState;
use crate::store::{Checkpoint, FlushSink, GameStore};

/// What the lifecycle check decided for this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Nothing to do, not even counting the tick.
    Dormant,
    /// Count the tick but skip the simulation stages.
    Placement,
    /// Run the full pipeline.
    Running,
    /// The game is over.
    Ended,
}

/// One game's simulation.
#[derive(Debug, Clone)]
pub struct Simulation {
    state: GameState,
    map: MapDocument,
    grid: CollisionGrid,
    config: SimConfig,
}

impl Simulation {
    /// Wrap a loaded state.
    #[must_use]
    pub fn new(state: GameState, map: MapDocument, config: SimConfig) -> Self {
        let grid = CollisionGrid::build(&map, state.buildings.values());
        Self {
            state,
            map,
            grid,
            config,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &GameState {
        &self.state
    }

    /// Current state, for fixtures and tools.
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    /// Static map.
    #[must_use]
    pub const fn map(&self) -> &MapDocument {
        &self.map
    }

    /// Rules.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Give up the state.
    #[must_use]
    pub fn into_state(self) -> GameState {
        self.state
    }

    /// Validate and apply a player command, flushing what it changed.
    ///
    /// # Errors
    ///
    /// The command's rejection, or a persistence failure.
    pub fn apply_command(
        &mut self,
        now: u64,
        command: &Command,
        sink: &mut dyn FlushSink,
    ) -> Result<CommandOutcome> {
        let outcome = commands::apply(&mut self.state, &self.map, &self.config, now, command)?;
        flush(&mut self.state, sink, Checkpoint::Command)?;
        Ok(outcome)
    }

    /// Advance the game by one tick at time `now`.
    ///
    /// # Errors
    ///
    /// Only persistence failures; faults inside the pipeline degrade the
    /// affected unit instead.
    pub fn tick(&mut self, now: u64, sink: &mut dyn FlushSink) -> Result<TickReport> {
        let game = self.state.game();
        let span = tracing::debug_span!("tick", game = %game.id, tick = game.tick_count);
        let _enter = span.enter();

        let mut report = TickReport {
            tick: game.tick_count,
            ..TickReport::default()
        };

        match self.lifecycle(now, &mut report) {
            Stage::Dormant => return Ok(report),
            Stage::Ended => {
                flush(&mut self.state, sink, Checkpoint::Final)?;
                return Ok(report);
            }
            Stage::Placement => {
                self.state.game_mut().tick_count += 1;
                flush(&mut self.state, sink, Checkpoint::Final)?;
                return Ok(report);
            }
            Stage::Running => {}
        }

        let phase_change = report.phase_change;
        let mut report = self.run_pipeline(now, sink)?;
        report.phase_change = phase_change;

        self.state.game_mut().tick_count += 1;
        flush(&mut self.state, sink, Checkpoint::Final)?;

        #[cfg(feature = "debug-validation")]
        self.validate();

        #[cfg(debug_assertions)]
        tracing::debug!(
            hash = self.state.state_hash(),
            shots = report.shots,
            kills = report.kills.len(),
            "Tick complete"
        );

        Ok(report)
    }

    /// Panics on dangling references between records.
    #[cfg(feature = "debug-validation")]
    fn validate(&self) {
        let state = &self.state;
        for entity in state.entities.values() {
            assert!(
                state.players.contains(entity.owner_id),
                "entity {} owned by unknown player {}",
                entity.id,
                entity.owner_id
            );
            if let Some(mount) = entity.building_id {
                assert!(state.buildings.contains(mount), "gun {} lost its turret", entity.id);
            }
        }
        for building in state.buildings.values() {
            assert!(
                self.map.contains_rect(&building.rect),
                "building {} outside the map",
                building.id
            );
        }
    }

    fn lifecycle(&mut self, now: u64, report: &mut TickReport) -> Stage {
        let game = self.state.game();
        match (game.status, game.phase) {
            (GameStatus::Ended, _) => {
                report.game_ended = true;
                return Stage::Ended;
            }
            (GameStatus::Waiting, _) | (_, GamePhase::Lobby) => return Stage::Dormant,
            (GameStatus::Active, GamePhase::Placement) => {
                if !game.phase_end.is_some_and(|end| now >= end) {
                    return Stage::Placement;
                }
                self.begin_simulation(now);
                report.phase_change = Some(GamePhase::Simulation);
            }
            (GameStatus::Active, GamePhase::Simulation) => {}
        }

        let timed_out = self.state.game().phase_end.is_some_and(|end| now >= end);
        if timed_out || self.at_peace() {
            self.end_game(timed_out);
            report.game_ended = true;
            return Stage::Ended;
        }
        Stage::Running
    }

    fn begin_simulation(&mut self, now: u64) {
        let duration = self.config.simulation_duration_ms;
        let game = self.state.game_mut();
        game.phase = GamePhase::Simulation;
        game.phase_start = now;
        game.phase_end = Some(now + duration);

        for id in self.state.players.sorted_ids() {
            let homeless = self.state.players.get(id).is_some_and(|p| p.is_active())
                && self.state.base_of(id).is_none();
            if homeless {
                if let Some(player) = self.state.players.get_mut(id) {
                    player.status = PlayerStatus::Spectator;
                }
                tracing::info!(player = %id, "No base placed, now spectating");
            }
        }
        tracing::info!(game = %self.state.id(), "Simulation phase started");
    }

    /// Whether at most one faction is left: every pair of active players is
    /// friendly.
    fn at_peace(&self) -> bool {
        let active: Vec<PlayerId> = self
            .state
            .players
            .values()
            .filter(|p| p.is_active())
            .map(|p| p.id)
            .collect();
        active.iter().enumerate().all(|(i, &a)| {
            active[i + 1..]
                .iter()
                .all(|&b| self.state.are_friendly(a, b))
        })
    }

    fn end_game(&mut self, timed_out: bool) {
        let winner = {
            let mut active = self.state.players.values().filter(|p| p.is_active());
            match (active.next(), active.next()) {
                (Some(only), None) => Some(only.id),
                _ => None,
            }
        };
        let game = self.state.game_mut();
        game.status = GameStatus::Ended;
        game.winner = winner;
        tracing::info!(game = %game.id, ?winner, timed_out, "Game ended");
    }

    fn run_pipeline(&mut self, now: u64, sink: &mut dyn FlushSink) -> Result<TickReport> {
        let Self {
            state,
            grid,
            config,
            ..
        } = self;

        expire_alliances(state, now);
        complete_construction(state, now);

        grid.rebuild_buildings(state.buildings.values());
        let power = PowerGrid::compute(state.buildings.values(), config.energy_field_gap);
        let spatial = SpatialIndex::build(
            config.spatial_cell_size,
            state.entities.values(),
            state.buildings.values(),
        );
        let game = state.game();
        let mut ctx = TickContext::new(now, game.tick_count, game.seed, config, grid, power, spatial);

        resolve_captures(state, &mut ctx);
        flush(state, sink, Checkpoint::AfterCapture)?;

        let mut ledger = WorkshopLedger::from_state(state);
        for id in state.entities.sorted_ids() {
            clear_stale_attack(state, now, id);
            resolve_attack(state, &mut ctx, id);
            behavior::step(state, &mut ctx, &mut ledger, id);
        }
        flush(state, sink, Checkpoint::AfterBehavior)?;

        sweep_destroyed(state, &mut ctx);
        flush(state, sink, Checkpoint::AfterCleanup)?;

        run_spawning(state, &mut ctx);
        if state.game().is_round_tick(config.round_ticks) {
            run_round(state, &mut ctx);
        }

        Ok(ctx.report)
    }
}

fn complete_construction(state: &mut GameState, now: u64) {
    let finished: Vec<_> = state
        .buildings
        .values()
        .filter(|b| b.construction_end.is_some_and(|end| now >= end))
        .map(|b| b.id)
        .collect();
    for id in finished {
        if let Some(building) = state.buildings.get_mut(id) {
            building.construction_end = None;
            tracing::debug!(building = %id, kind = %building.kind, "Construction finished");
        }
    }
}

fn flush(state: &mut GameState, sink: &mut dyn FlushSink, checkpoint: Checkpoint) -> Result<()> {
    let changes = state.take_changes();
    if changes.is_empty() {
        return Ok(());
    }
    tracing::trace!(?checkpoint, records = changes.len(), "Flushing changes");
    sink.flush(checkpoint, &changes)
}

// ============================================================================
// Engine
// ============================================================================

/// Why the scheduler should stop ticking a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// The game is over.
    GameEnded {
        /// Last player standing, if any.
        winner: Option<PlayerId>,
    },
    /// The game record is gone.
    GameNotFound(GameId),
    /// The game's map document is gone.
    MapNotFound(String),
}

/// Result of one scheduled tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep the game scheduled.
    Continue(TickReport),
    /// Stop scheduling the game.
    Halt(HaltReason),
}

/// Runs ticks against a persistence collaborator.
#[derive(Debug)]
pub struct TickEngine<S: GameStore> {
    store: S,
    config: SimConfig,
}

impl<S: GameStore> TickEngine<S> {
    /// Engine over a store.
    #[must_use]
    pub const fn new(store: S, config: SimConfig) -> Self {
        Self { store, config }
    }

    /// The store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The store, for inserting games and maps.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Rules applied to every game.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    fn load(&self, game_id: GameId) -> Result<std::result::Result<Simulation, HaltReason>> {
        let state = match self.store.load_game(game_id) {
            Ok(state) => state,
            Err(GameError::GameNotFound(_)) => return Ok(Err(HaltReason::GameNotFound(game_id))),
            Err(e) => return Err(e),
        };
        let map_id = state.game().map_id.clone();
        let map = match self.store.load_map(&map_id) {
            Ok(map) => map,
            Err(GameError::MapNotFound(_)) => return Ok(Err(HaltReason::MapNotFound(map_id))),
            Err(e) => return Err(e),
        };
        Ok(Ok(Simulation::new(state, map, self.config.clone())))
    }

    /// Load the game, run one tick at `now` and flush its changes.
    ///
    /// A missing game or map halts the game without touching anything.
    ///
    /// # Errors
    ///
    /// Store failures other than a missing game or map.
    pub fn run_tick(&mut self, game_id: GameId, now: u64) -> Result<TickOutcome> {
        let mut simulation = match self.load(game_id)? {
            Ok(simulation) => simulation,
            Err(reason) => {
                tracing::warn!(game = %game_id, ?reason, "Tick skipped");
                return Ok(TickOutcome::Halt(reason));
            }
        };

        let report = simulation.tick(now, &mut self.store)?;
        if report.game_ended {
            let winner = simulation.state().game().winner;
            return Ok(TickOutcome::Halt(HaltReason::GameEnded { winner }));
        }
        Ok(TickOutcome::Continue(report))
    }

    /// Load the game and apply one player command.
    ///
    /// # Errors
    ///
    /// The command's rejection, a missing game or map, or a store failure.
    pub fn submit(&mut self, game_id: GameId, now: u64, command: &Command) -> Result<CommandOutcome> {
        let mut simulation = match self.load(game_id)? {
            Ok(simulation) => simulation,
            Err(HaltReason::MapNotFound(map)) => return Err(GameError::MapNotFound(map)),
            Err(_) => return Err(GameError::GameNotFound(game_id.0)),
        };
        simulation.apply_command(now, command, &mut self.store)
    }
}
