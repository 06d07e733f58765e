//! Dynamic state of one game.
//!
//! [`GameState`] owns every mutable record of a game instance. Records live
//! in [`Table`]s keyed by id; tables iterate in ascending id order and keep
//! track of which rows were written or removed since the last checkpoint so
//! that a tick can flush only what it touched.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::components::{
    Alliance, AllianceStatus, Building, BuildingId, BuildingKind, Entity, EntityId, EntityKind,
    Family, FamilyId, Game, GameId, Player, PlayerId, PlayerPair, Troop, TroopId,
};
use crate::error::{GameError, Result};
use crate::store::ChangeSet;

/// A record with a stable key.
pub trait Record: Clone + std::fmt::Debug {
    /// Key type.
    type Key: Copy + Ord + Hash + std::fmt::Debug;

    /// The record's key.
    fn key(&self) -> Self::Key;
}

macro_rules! impl_record {
    ($record:ty, $key:ty, $field:ident) => {
        impl Record for $record {
            type Key = $key;

            fn key(&self) -> $key {
                self.$field
            }
        }
    };
}

impl_record!(Player, PlayerId, id);
impl_record!(Building, BuildingId, id);
impl_record!(Entity, EntityId, id);
impl_record!(Family, FamilyId, id);
impl_record!(Troop, TroopId, id);
impl_record!(Alliance, PlayerPair, pair);

/// Keys written and removed since the last checkpoint.
#[derive(Debug, Clone)]
struct Changes<K> {
    upserted: BTreeSet<K>,
    removed: BTreeSet<K>,
}

impl<K> Default for Changes<K> {
    fn default() -> Self {
        Self {
            upserted: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }
}

/// Id-keyed record storage with change tracking.
///
/// Any mutable access marks the row as written. Iteration is always in
/// ascending key order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "R: Serialize, R::Key: Serialize",
    deserialize = "R: Deserialize<'de>, R::Key: Deserialize<'de>"
))]
pub struct Table<R: Record> {
    rows: BTreeMap<R::Key, R>,
    #[serde(skip)]
    changes: Changes<R::Key>,
}

impl<R: Record> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            changes: Changes::default(),
        }
    }
}

impl<R: Record> Table<R> {
    /// Insert or replace a row.
    pub fn insert(&mut self, row: R) {
        let key = row.key();
        self.changes.removed.remove(&key);
        self.changes.upserted.insert(key);
        self.rows.insert(key, row);
    }

    /// Remove a row.
    pub fn remove(&mut self, key: R::Key) -> Option<R> {
        let row = self.rows.remove(&key)?;
        self.changes.upserted.remove(&key);
        self.changes.removed.insert(key);
        Some(row)
    }

    /// Get a row.
    #[must_use]
    pub fn get(&self, key: R::Key) -> Option<&R> {
        self.rows.get(&key)
    }

    /// Get a row for writing; marks it changed.
    pub fn get_mut(&mut self, key: R::Key) -> Option<&mut R> {
        let row = self.rows.get_mut(&key)?;
        self.changes.upserted.insert(key);
        Some(row)
    }

    /// Check if a row exists.
    #[must_use]
    pub fn contains(&self, key: R::Key) -> bool {
        self.rows.contains_key(&key)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keys in ascending order, detached from the table so rows can be
    /// mutated while walking them.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<R::Key> {
        self.rows.keys().copied().collect()
    }

    /// Rows in ascending key order.
    pub fn values(&self) -> impl Iterator<Item = &R> {
        self.rows.values()
    }

    /// Drain the change log into (written rows, removed keys).
    fn take_changes(&mut self) -> (Vec<R>, Vec<R::Key>) {
        let changes = std::mem::take(&mut self.changes);
        let upserted = changes
            .upserted
            .into_iter()
            .filter_map(|key| self.rows.get(&key).cloned())
            .collect();
        (upserted, changes.removed.into_iter().collect())
    }

    fn clear_changes(&mut self) {
        self.changes = Changes::default();
    }

    fn apply(&mut self, upserted: &[R], removed: &[R::Key]) {
        for key in removed {
            self.rows.remove(key);
        }
        for row in upserted {
            self.rows.insert(row.key(), row.clone());
        }
    }
}

/// Every mutable record of one game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    game: Game,
    /// Participants.
    pub players: Table<Player>,
    /// Placed structures.
    pub buildings: Table<Building>,
    /// Units.
    pub entities: Table<Entity>,
    /// Population groups.
    pub families: Table<Family>,
    /// Military groups.
    pub troops: Table<Troop>,
    /// Diplomatic relations.
    pub alliances: Table<Alliance>,
    /// Next id handed out for any new record.
    next_id: u64,
    #[serde(skip)]
    game_dirty: bool,
}

impl GameState {
    /// Empty state around a game record.
    #[must_use]
    pub fn new(game: Game) -> Self {
        Self {
            game,
            players: Table::default(),
            buildings: Table::default(),
            entities: Table::default(),
            families: Table::default(),
            troops: Table::default(),
            alliances: Table::default(),
            next_id: 1,
            game_dirty: false,
        }
    }

    /// The game record.
    #[must_use]
    pub const fn game(&self) -> &Game {
        &self.game
    }

    /// The game record, for writing.
    pub fn game_mut(&mut self) -> &mut Game {
        self.game_dirty = true;
        &mut self.game
    }

    /// Game identifier.
    #[must_use]
    pub const fn id(&self) -> GameId {
        self.game.id
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Reserve a fresh building id.
    pub fn allocate_building_id(&mut self) -> BuildingId {
        BuildingId(self.allocate())
    }

    /// Reserve a fresh entity id.
    pub fn allocate_entity_id(&mut self) -> EntityId {
        EntityId(self.allocate())
    }

    /// Reserve a fresh family id.
    pub fn allocate_family_id(&mut self) -> FamilyId {
        FamilyId(self.allocate())
    }

    /// Reserve a fresh troop id.
    pub fn allocate_troop_id(&mut self) -> TroopId {
        TroopId(self.allocate())
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    /// The allied relation between two players, if any.
    #[must_use]
    pub fn alliance(&self, a: PlayerId, b: PlayerId) -> Option<&Alliance> {
        self.alliances.get(PlayerPair::new(a, b))
    }

    /// Whether two players are in force as allies.
    #[must_use]
    pub fn are_allied(&self, a: PlayerId, b: PlayerId) -> bool {
        self.alliance(a, b)
            .is_some_and(|alliance| alliance.status == AllianceStatus::Allied)
    }

    /// Whether two owners never fight each other: same owner, same team or
    /// allied pair.
    #[must_use]
    pub fn are_friendly(&self, a: PlayerId, b: PlayerId) -> bool {
        if a == b {
            return true;
        }
        let same_team = match (
            self.players.get(a).and_then(|p| p.team_id),
            self.players.get(b).and_then(|p| p.team_id),
        ) {
            (Some(ta), Some(tb)) => ta == tb,
            _ => false,
        };
        same_team || self.are_allied(a, b)
    }

    /// Whether a player's units are confused at `now`.
    #[must_use]
    pub fn is_confused(&self, player: PlayerId, now: u64, window_ms: u64) -> bool {
        self.players
            .get(player)
            .is_some_and(|p| p.is_confused(now, window_ms))
    }

    /// The player's central base.
    #[must_use]
    pub fn base_of(&self, player: PlayerId) -> Option<&Building> {
        self.buildings
            .values()
            .find(|b| b.owner_id == player && b.kind == BuildingKind::BaseCentral)
    }

    /// Number of buildings of a kind the player currently owns.
    #[must_use]
    pub fn owned_count(&self, player: PlayerId, kind: BuildingKind) -> usize {
        self.buildings
            .values()
            .filter(|b| b.owner_id == player && b.kind == kind)
            .count()
    }

    /// The family living in a house.
    #[must_use]
    pub fn family_of_house(&self, house: BuildingId) -> Option<&Family> {
        self.families.values().find(|f| f.house_id == house)
    }

    /// The troop quartered in a barracks.
    #[must_use]
    pub fn troop_of_barracks(&self, barracks: BuildingId) -> Option<&Troop> {
        self.troops.values().find(|t| t.barracks_id == barracks)
    }

    /// The gun mounted on a turret building.
    #[must_use]
    pub fn gun_of(&self, building: BuildingId) -> Option<&Entity> {
        self.entities
            .values()
            .find(|e| e.kind == EntityKind::TurretGun && e.building_id == Some(building))
    }

    /// Members of a family, ascending id.
    #[must_use]
    pub fn family_members(&self, family: FamilyId) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.family_id == Some(family))
            .map(|e| e.id)
            .collect()
    }

    /// Members of a troop, ascending id.
    #[must_use]
    pub fn troop_members(&self, troop: TroopId) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.troop_id == Some(troop))
            .map(|e| e.id)
            .collect()
    }

    // ------------------------------------------------------------------
    // Checkpoints
    // ------------------------------------------------------------------

    /// Drain every record written or removed since the last call.
    pub fn take_changes(&mut self) -> ChangeSet {
        let (players, _) = self.players.take_changes();
        let (buildings, removed_buildings) = self.buildings.take_changes();
        let (entities, removed_entities) = self.entities.take_changes();
        let (families, removed_families) = self.families.take_changes();
        let (troops, removed_troops) = self.troops.take_changes();
        let (alliances, removed_alliances) = self.alliances.take_changes();
        let game = std::mem::take(&mut self.game_dirty).then(|| self.game.clone());

        ChangeSet {
            game_id: self.game.id,
            game,
            next_id: self.next_id,
            players,
            buildings,
            removed_buildings,
            entities,
            removed_entities,
            families,
            removed_families,
            troops,
            removed_troops,
            alliances,
            removed_alliances,
        }
    }

    /// Forget pending changes, e.g. after loading a fresh snapshot.
    pub fn clear_changes(&mut self) {
        self.players.clear_changes();
        self.buildings.clear_changes();
        self.entities.clear_changes();
        self.families.clear_changes();
        self.troops.clear_changes();
        self.alliances.clear_changes();
        self.game_dirty = false;
    }

    /// Apply a flushed change set to this copy.
    pub fn apply_changes(&mut self, changes: &ChangeSet) {
        if let Some(game) = &changes.game {
            self.game = game.clone();
        }
        self.next_id = self.next_id.max(changes.next_id);
        self.players.apply(&changes.players, &[]);
        self.buildings
            .apply(&changes.buildings, &changes.removed_buildings);
        self.entities.apply(&changes.entities, &changes.removed_entities);
        self.families.apply(&changes.families, &changes.removed_families);
        self.troops.apply(&changes.troops, &changes.removed_troops);
        self.alliances
            .apply(&changes.alliances, &changes.removed_alliances);
    }

    // ------------------------------------------------------------------
    // Determinism
    // ------------------------------------------------------------------

    /// Hash of the full state.
    ///
    /// Two states built from identical inputs produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        fn hash_table<R: Record + Hash>(table: &Table<R>, hasher: &mut DefaultHasher) {
            table.len().hash(hasher);
            for row in table.values() {
                row.hash(hasher);
            }
        }

        let mut hasher = DefaultHasher::new();
        self.game.hash(&mut hasher);
        self.next_id.hash(&mut hasher);
        hash_table(&self.players, &mut hasher);
        hash_table(&self.buildings, &mut hasher);
        hash_table(&self.entities, &mut hasher);
        hash_table(&self.families, &mut hasher);
        hash_table(&self.troops, &mut hasher);
        hash_table(&self.alliances, &mut hasher);
        hasher.finish()
    }

    /// Serialize the state for snapshots.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::Serialization(format!("Failed to serialize game state: {e}")))
    }

    /// Deserialize state from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| {
            GameError::Serialization(format!("Failed to deserialize game state: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{GamePhase, GameStatus, Rect};
    use crate::math::Vec2Fixed;

    fn game() -> Game {
        Game {
            id: GameId(1),
            map_id: "test".into(),
            seed: 7,
            status: GameStatus::Active,
            phase: GamePhase::Simulation,
            phase_start: 0,
            phase_end: None,
            tick_count: 0,
            winner: None,
        }
    }

    fn house(id: BuildingId, owner: PlayerId) -> Building {
        Building {
            id,
            owner_id: owner,
            kind: BuildingKind::House,
            rect: Rect::new(0, 0, 3, 3),
            health: 300,
            construction_end: None,
            capture_start: None,
            capturing_owner_id: None,
        }
    }

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let mut state = GameState::new(game());
        let b = state.allocate_building_id();
        let e = state.allocate_entity_id();
        let f = state.allocate_family_id();
        assert_eq!((b.0, e.0, f.0), (1, 2, 3));
    }

    #[test]
    fn test_change_tracking() {
        let mut state = GameState::new(game());
        state.players.insert(Player::new(PlayerId(1), 0));
        let id = state.allocate_building_id();
        state.buildings.insert(house(id, PlayerId(1)));

        let changes = state.take_changes();
        assert_eq!(changes.players.len(), 1);
        assert_eq!(changes.buildings.len(), 1);
        assert!(changes.game.is_none());

        // Nothing pending after a drain
        assert!(state.take_changes().is_empty());

        state.buildings.remove(id);
        state.game_mut().tick_count += 1;
        let changes = state.take_changes();
        assert!(changes.buildings.is_empty());
        assert_eq!(changes.removed_buildings, vec![id]);
        assert_eq!(changes.game.map(|g| g.tick_count), Some(1));
    }

    #[test]
    fn test_apply_changes_replays_onto_copy() {
        let mut state = GameState::new(game());
        let mut copy = state.clone();
        state.players.insert(Player::new(PlayerId(1), 100));
        let id = state.allocate_entity_id();
        state.entities.insert(Entity::new(
            id,
            PlayerId(1),
            EntityKind::Member,
            Vec2Fixed::ZERO,
            5,
        ));

        let changes = state.take_changes();
        copy.apply_changes(&changes);
        assert_eq!(copy.state_hash(), state.state_hash());
    }

    #[test]
    fn test_friendly_relations() {
        let mut state = GameState::new(game());
        let (a, b, c) = (PlayerId(1), PlayerId(2), PlayerId(3));
        state.players.insert(Player::new(a, 0));
        state.players.insert(Player::new(b, 0));
        let mut teamed = Player::new(c, 0);
        teamed.team_id = Some(9);
        state.players.insert(teamed);

        assert!(state.are_friendly(a, a));
        assert!(!state.are_friendly(a, b));

        state.alliances.insert(Alliance {
            pair: PlayerPair::new(b, a),
            status: AllianceStatus::Allied,
            requested_by: a,
            expires_at: Some(1),
        });
        assert!(state.are_friendly(a, b));

        if let Some(p) = state.players.get_mut(a) {
            p.team_id = Some(9);
        }
        assert!(state.are_friendly(a, c));
        assert!(!state.are_friendly(b, c));
    }

    #[test]
    fn test_pending_alliance_is_not_friendly() {
        let mut state = GameState::new(game());
        state.alliances.insert(Alliance {
            pair: PlayerPair::new(PlayerId(1), PlayerId(2)),
            status: AllianceStatus::Pending,
            requested_by: PlayerId(1),
            expires_at: None,
        });
        assert!(!state.are_friendly(PlayerId(1), PlayerId(2)));
    }

    #[test]
    fn test_serialization_roundtrip_preserves_hash() {
        let mut state = GameState::new(game());
        state.players.insert(Player::new(PlayerId(1), 250));
        let id = state.allocate_building_id();
        state.buildings.insert(house(id, PlayerId(1)));

        let bytes = state.serialize().unwrap();
        let mut restored = GameState::deserialize(&bytes).unwrap();
        assert_eq!(restored.state_hash(), state.state_hash());
        assert_eq!(restored.allocate_entity_id(), EntityId(2));
    }
}
