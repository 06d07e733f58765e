//! Persistence contract.
//!
//! The tick engine never talks to a database. It drains the records it
//! touched into a [`ChangeSet`] at fixed checkpoints and hands them to a
//! [`FlushSink`]. A [`GameStore`] additionally loads game snapshots and map
//! documents. [`MemoryStore`] is the in-process implementation used by the
//! headless server and the tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{
    Alliance, Building, BuildingId, Entity, EntityId, Family, FamilyId, Game, GameId, Player,
    PlayerPair, Troop, TroopId,
};
use crate::error::{GameError, Result};
use crate::map::MapDocument;
use crate::state::GameState;

/// Point in the tick pipeline at which changes are flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Checkpoint {
    /// After a player command was applied.
    Command,
    /// After capture resolution.
    AfterCapture,
    /// After the per-entity behavior and combat pass.
    AfterBehavior,
    /// After destroyed buildings were swept.
    AfterCleanup,
    /// End of tick: spawning, economy and the game record.
    Final,
}

/// Records written or removed since the previous checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Game the changes belong to.
    pub game_id: GameId,
    /// The game record, if it changed.
    pub game: Option<Game>,
    /// Id allocator high-water mark.
    pub next_id: u64,
    /// Written players.
    pub players: Vec<Player>,
    /// Written buildings.
    pub buildings: Vec<Building>,
    /// Removed buildings.
    pub removed_buildings: Vec<BuildingId>,
    /// Written entities.
    pub entities: Vec<Entity>,
    /// Removed entities.
    pub removed_entities: Vec<EntityId>,
    /// Written families.
    pub families: Vec<Family>,
    /// Removed families.
    pub removed_families: Vec<FamilyId>,
    /// Written troops.
    pub troops: Vec<Troop>,
    /// Removed troops.
    pub removed_troops: Vec<TroopId>,
    /// Written alliances.
    pub alliances: Vec<Alliance>,
    /// Removed alliances.
    pub removed_alliances: Vec<PlayerPair>,
}

impl ChangeSet {
    /// Whether there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.game.is_none()
            && self.players.is_empty()
            && self.buildings.is_empty()
            && self.removed_buildings.is_empty()
            && self.entities.is_empty()
            && self.removed_entities.is_empty()
            && self.families.is_empty()
            && self.removed_families.is_empty()
            && self.troops.is_empty()
            && self.removed_troops.is_empty()
            && self.alliances.is_empty()
            && self.removed_alliances.is_empty()
    }

    /// Number of written and removed records.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.game.is_some())
            + self.players.len()
            + self.buildings.len()
            + self.removed_buildings.len()
            + self.entities.len()
            + self.removed_entities.len()
            + self.families.len()
            + self.removed_families.len()
            + self.troops.len()
            + self.removed_troops.len()
            + self.alliances.len()
            + self.removed_alliances.len()
    }
}

/// Receives the changes of a tick at each checkpoint.
pub trait FlushSink {
    /// Persist one batch of changes.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Persistence`] if the batch cannot be written.
    fn flush(&mut self, checkpoint: Checkpoint, changes: &ChangeSet) -> Result<()>;
}

/// Full persistence collaborator: loads state and accepts flushes.
pub trait GameStore: FlushSink {
    /// Load the current snapshot of a game.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::GameNotFound`] if the game is unknown.
    fn load_game(&self, id: GameId) -> Result<GameState>;

    /// Load a map document.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::MapNotFound`] if the map is unknown.
    fn load_map(&self, map_id: &str) -> Result<MapDocument>;
}

/// Sink that drops every batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl FlushSink for NullSink {
    fn flush(&mut self, _checkpoint: Checkpoint, _changes: &ChangeSet) -> Result<()> {
        Ok(())
    }
}

/// In-process store keeping one state per game.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    games: BTreeMap<GameId, GameState>,
    maps: BTreeMap<String, MapDocument>,
    flushes: Vec<(Checkpoint, usize)>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a map document.
    pub fn insert_map(&mut self, map: MapDocument) {
        self.maps.insert(map.id.clone(), map);
    }

    /// Add or replace a game.
    pub fn insert_game(&mut self, mut state: GameState) {
        state.clear_changes();
        self.games.insert(state.id(), state);
    }

    /// Remove a game.
    pub fn remove_game(&mut self, id: GameId) -> Option<GameState> {
        self.games.remove(&id)
    }

    /// Ids of all stored games.
    #[must_use]
    pub fn game_ids(&self) -> Vec<GameId> {
        self.games.keys().copied().collect()
    }

    /// Borrow a stored game.
    #[must_use]
    pub fn game(&self, id: GameId) -> Option<&GameState> {
        self.games.get(&id)
    }

    /// Checkpoint and size of every batch received so far.
    #[must_use]
    pub fn flush_log(&self) -> &[(Checkpoint, usize)] {
        &self.flushes
    }

    /// Forget the flush log.
    pub fn clear_flush_log(&mut self) {
        self.flushes.clear();
    }
}

impl FlushSink for MemoryStore {
    fn flush(&mut self, checkpoint: Checkpoint, changes: &ChangeSet) -> Result<()> {
        let state = self.games.get_mut(&changes.game_id).ok_or_else(|| {
            GameError::Persistence(format!("flush for unknown game {}", changes.game_id))
        })?;
        state.apply_changes(changes);
        self.flushes.push((checkpoint, changes.len()));
        Ok(())
    }
}

impl GameStore for MemoryStore {
    fn load_game(&self, id: GameId) -> Result<GameState> {
        let mut state = self
            .games
            .get(&id)
            .cloned()
            .ok_or(GameError::GameNotFound(id.0))?;
        state.clear_changes();
        Ok(state)
    }

    fn load_map(&self, map_id: &str) -> Result<MapDocument> {
        self.maps
            .get(map_id)
            .cloned()
            .ok_or_else(|| GameError::MapNotFound(map_id.to_string()))
    }
}
