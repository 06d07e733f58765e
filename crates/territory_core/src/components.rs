//! Record definitions.
//!
//! Records are pure data with no behavior beyond small derived queries.
//! Every persisted game object is one of these structs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Cell, Fixed, Vec2Fixed};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a game instance.
    GameId
);
id_type!(
    /// Identifier of a player within a game.
    PlayerId
);
id_type!(
    /// Identifier of a building.
    BuildingId
);
id_type!(
    /// Identifier of a unit entity.
    EntityId
);
id_type!(
    /// Identifier of a family group.
    FamilyId
);
id_type!(
    /// Identifier of a troop group.
    TroopId
);

// ============================================================================
// Game
// ============================================================================

/// Lifecycle status of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GameStatus {
    /// Lobby still forming.
    #[default]
    Waiting,
    /// Game is running.
    Active,
    /// Game is over.
    Ended,
}

/// Phase within an active game. Phases only ever advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GamePhase {
    /// Players are gathering.
    #[default]
    Lobby,
    /// Players place their central bases.
    Placement,
    /// The full simulation runs.
    Simulation,
}

/// The game record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Game {
    /// Game identifier.
    pub id: GameId,
    /// Map document this game is played on.
    pub map_id: String,
    /// Seed for every random roll in this game.
    pub seed: u64,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Current phase.
    pub phase: GamePhase,
    /// When the current phase started (ms).
    pub phase_start: u64,
    /// When the current phase ends (ms), if it is timed.
    pub phase_end: Option<u64>,
    /// Number of processed ticks.
    pub tick_count: u64,
    /// Last player standing, once decided.
    pub winner: Option<PlayerId>,
}

impl Game {
    /// Whether the current tick closes a round.
    #[must_use]
    pub const fn is_round_tick(&self, round_ticks: u64) -> bool {
        round_ticks > 0 && self.tick_count > 0 && self.tick_count % round_ticks == 0
    }
}

// ============================================================================
// Player
// ============================================================================

/// Participation status of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlayerStatus {
    /// Still playing.
    #[default]
    Active,
    /// Lost their base.
    Eliminated,
    /// Watching only.
    Spectator,
}

/// A participant in a game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    /// Player identifier.
    pub id: PlayerId,
    /// Owning account; `None` for bots.
    pub user_id: Option<String>,
    /// Economy accumulator.
    pub credits: i64,
    /// Cost multiplier for paid builds. Never below 1.
    #[serde(with = "fixed_serde")]
    pub inflation: Fixed,
    /// Participation status.
    pub status: PlayerStatus,
    /// Conqueror, once eliminated.
    pub eliminated_by: Option<PlayerId>,
    /// Optional team; team-mates never fight each other.
    pub team_id: Option<u32>,
    /// When this player last broke an alliance (ms).
    pub last_betrayal_time: Option<u64>,
}

impl Player {
    /// Create an active player with the given starting credits.
    #[must_use]
    pub fn new(id: PlayerId, credits: i64) -> Self {
        Self {
            id,
            user_id: None,
            credits,
            inflation: Fixed::ONE,
            status: PlayerStatus::Active,
            eliminated_by: None,
            team_id: None,
            last_betrayal_time: None,
        }
    }

    /// Whether the player still takes part in the game.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == PlayerStatus::Active
    }

    /// Whether the player's units are still confused by a recent betrayal.
    #[must_use]
    pub fn is_confused(&self, now: u64, window_ms: u64) -> bool {
        self.last_betrayal_time
            .is_some_and(|t| now.saturating_sub(t) < window_ms)
    }
}

// ============================================================================
// Buildings
// ============================================================================

/// Closed set of building kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BuildingKind {
    /// The player's headquarters and power source.
    BaseCentral,
    /// Houses a family.
    House,
    /// Employs family members.
    Workshop,
    /// Houses a troop.
    Barracks,
    /// Blocks movement.
    Wall,
    /// Hosts a turret gun.
    Turret,
}

impl BuildingKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::BaseCentral,
        Self::House,
        Self::Workshop,
        Self::Barracks,
        Self::Wall,
        Self::Turret,
    ];

    /// Stable snake_case name used in config files and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BaseCentral => "base_central",
            Self::House => "house",
            Self::Workshop => "workshop",
            Self::Barracks => "barracks",
            Self::Wall => "wall",
            Self::Turret => "turret",
        }
    }
}

impl fmt::Display for BuildingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Axis-aligned footprint in tile units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Left column.
    pub x: i32,
    /// Top row.
    pub y: i32,
    /// Width in tiles.
    pub width: i32,
    /// Height in tiles.
    pub height: i32,
}

impl Rect {
    /// Create a footprint.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Geometric centre.
    #[must_use]
    pub fn center(&self) -> Vec2Fixed {
        let two = Fixed::from_num(2);
        Vec2Fixed::new(
            Fixed::from_num(self.x) + Fixed::from_num(self.width) / two,
            Fixed::from_num(self.y) + Fixed::from_num(self.height) / two,
        )
    }

    /// Half of the longer side; used by the energy-field rule.
    #[must_use]
    pub fn radius(&self) -> Fixed {
        Fixed::from_num(self.width.max(self.height)) / Fixed::from_num(2)
    }

    /// The origin cell.
    #[must_use]
    pub const fn origin(&self) -> Cell {
        Cell::new(self.x, self.y)
    }

    /// Every cell covered by the footprint, row-major.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (self.y..self.y + self.height)
            .flat_map(move |y| (self.x..self.x + self.width).map(move |x| Cell::new(x, y)))
    }

    /// Whether the cell lies inside the footprint.
    #[must_use]
    pub const fn contains_cell(&self, cell: Cell) -> bool {
        cell.x >= self.x
            && cell.x < self.x + self.width
            && cell.y >= self.y
            && cell.y < self.y + self.height
    }

    /// Whether a point lies inside the footprint grown by `buffer` tiles on
    /// every side (edges inclusive).
    #[must_use]
    pub fn contains_point_with_buffer(&self, point: Vec2Fixed, buffer: i32) -> bool {
        let min_x = Fixed::from_num(self.x - buffer);
        let min_y = Fixed::from_num(self.y - buffer);
        let max_x = Fixed::from_num(self.x + self.width + buffer);
        let max_y = Fixed::from_num(self.y + self.height + buffer);
        point.x >= min_x && point.x <= max_x && point.y >= min_y && point.y <= max_y
    }

    /// Whether two footprints share at least one cell.
    #[must_use]
    pub const fn intersects(&self, other: &Self) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// A placed structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Building {
    /// Building identifier.
    pub id: BuildingId,
    /// Current owner.
    pub owner_id: PlayerId,
    /// Kind of building.
    pub kind: BuildingKind,
    /// Footprint.
    pub rect: Rect,
    /// Remaining health; destroyed at zero.
    pub health: i32,
    /// Under construction until this timestamp (ms).
    pub construction_end: Option<u64>,
    /// When the running capture attempt started (ms).
    pub capture_start: Option<u64>,
    /// Owner whose units are capturing this building.
    pub capturing_owner_id: Option<PlayerId>,
}

impl Building {
    /// Whether construction has finished at `now`.
    #[must_use]
    pub fn is_constructed(&self, now: u64) -> bool {
        self.construction_end.map_or(true, |end| now >= end)
    }

    /// Whether a capture attempt is running.
    #[must_use]
    pub const fn is_under_capture(&self) -> bool {
        self.capture_start.is_some()
    }

    /// Drop any capture progress.
    pub fn clear_capture(&mut self) {
        self.capture_start = None;
        self.capturing_owner_id = None;
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Closed set of unit kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Civilian family member.
    Member,
    /// Troop leader.
    Commander,
    /// Troop fighter.
    Soldier,
    /// Stationary gun mounted on a turret building.
    TurretGun,
}

impl EntityKind {
    /// Whether this kind fires at enemies.
    #[must_use]
    pub const fn is_combatant(self) -> bool {
        matches!(self, Self::Soldier | Self::TurretGun)
    }

    /// Whether this kind counts for capture and defence of buildings.
    #[must_use]
    pub const fn can_capture(self) -> bool {
        matches!(self, Self::Soldier | Self::Commander)
    }

    /// Whether this kind never moves.
    #[must_use]
    pub const fn is_static(self) -> bool {
        matches!(self, Self::TurretGun)
    }
}

/// Behavior state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntityState {
    /// Waiting for the next decision.
    #[default]
    Idle,
    /// Walking a path towards a purposeful goal.
    Moving,
    /// Inside a workshop.
    Working,
    /// Inside the home house.
    Sleeping,
    /// Walking a short random route.
    Patrol,
}

impl EntityState {
    /// Whether the unit is walking a path.
    #[must_use]
    pub const fn is_walking(self) -> bool {
        matches!(self, Self::Moving | Self::Patrol)
    }
}

/// What a walking unit does once it reaches the end of its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TravelGoal {
    /// Random patrol walk.
    Wander,
    /// Troop order target.
    Order,
    /// Reserved workshop.
    Workshop(BuildingId),
    /// Home house.
    Home(BuildingId),
}

/// Something an attacker can shoot at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// A unit.
    Entity(EntityId),
    /// A building.
    Building(BuildingId),
}

/// A unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Entity identifier.
    pub id: EntityId,
    /// Current owner.
    pub owner_id: PlayerId,
    /// Kind of unit.
    pub kind: EntityKind,
    /// Behavior state.
    pub state: EntityState,
    /// Interpolated world position.
    pub position: Vec2Fixed,
    /// Occupying a building; invisible to combat and spatial queries.
    pub is_inside: bool,
    /// House of a family member.
    pub home_id: Option<BuildingId>,
    /// Workshop currently worked in.
    pub workplace_id: Option<BuildingId>,
    /// Troop membership.
    pub troop_id: Option<TroopId>,
    /// Family membership.
    pub family_id: Option<FamilyId>,
    /// Mount building of a turret gun.
    pub building_id: Option<BuildingId>,
    /// Remaining health; removed at zero.
    pub health: i32,
    /// Last shot (ms).
    pub last_attack_time: Option<u64>,
    /// Target of the last shot, kept for the laser visual.
    pub attack_target_id: Option<Target>,
    /// End of the laser visual (ms).
    pub attack_end_time: Option<u64>,
    /// Cells of the current route, start to end.
    pub path: Vec<Cell>,
    /// Index of the cell the unit last reached.
    pub path_index: usize,
    /// Progress from `path[path_index]` towards the next cell, in `[0, 1)`.
    #[serde(with = "fixed_serde")]
    pub path_progress: Fixed,
    /// Purpose of the current walk.
    pub travel: Option<TravelGoal>,
    /// Workshop slot held by a family member.
    pub reserved_factory_id: Option<BuildingId>,
    /// Earliest time the pathfinder may be asked again (ms).
    pub next_path_attempt: Option<u64>,
    /// End of the current timed state or idle cooldown (ms).
    pub state_until: Option<u64>,
}

impl Entity {
    /// Create an idle unit at `position`.
    #[must_use]
    pub fn new(id: EntityId, owner_id: PlayerId, kind: EntityKind, position: Vec2Fixed, health: i32) -> Self {
        Self {
            id,
            owner_id,
            kind,
            state: EntityState::Idle,
            position,
            is_inside: false,
            home_id: None,
            workplace_id: None,
            troop_id: None,
            family_id: None,
            building_id: None,
            health,
            last_attack_time: None,
            attack_target_id: None,
            attack_end_time: None,
            path: Vec::new(),
            path_index: 0,
            path_progress: Fixed::ZERO,
            travel: None,
            reserved_factory_id: None,
            next_path_attempt: None,
            state_until: None,
        }
    }

    /// Whether the unit is visible to combat and spatial queries.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_inside
    }

    /// Forget the current route.
    pub fn clear_path(&mut self) {
        self.path.clear();
        self.path_index = 0;
        self.path_progress = Fixed::ZERO;
        self.travel = None;
    }

    /// Drop to idle outside any building, with an optional cooldown end.
    pub fn become_idle(&mut self, until: Option<u64>) {
        self.clear_path();
        self.state = EntityState::Idle;
        self.is_inside = false;
        self.workplace_id = None;
        self.state_until = until;
    }
}

// ============================================================================
// Groups
// ============================================================================

/// Population group of a house.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Family {
    /// Family identifier.
    pub id: FamilyId,
    /// Current owner.
    pub owner_id: PlayerId,
    /// The house this family lives in.
    pub house_id: BuildingId,
    /// Last member spawn (ms).
    pub last_spawn_time: u64,
}

/// Military group of a barracks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Troop {
    /// Troop identifier.
    pub id: TroopId,
    /// Current owner.
    pub owner_id: PlayerId,
    /// The barracks this troop belongs to.
    pub barracks_id: BuildingId,
    /// Movement order target.
    pub target_pos: Option<Vec2Fixed>,
    /// Attack order target.
    pub target_building_id: Option<BuildingId>,
    /// Last soldier spawn (ms).
    pub last_spawn_time: u64,
}

// ============================================================================
// Diplomacy
// ============================================================================

/// Unordered pair of players, stored with the smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerPair(PlayerId, PlayerId);

impl PlayerPair {
    /// Build the canonical pair.
    #[must_use]
    pub fn new(a: PlayerId, b: PlayerId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// Lower id.
    #[must_use]
    pub const fn first(&self) -> PlayerId {
        self.0
    }

    /// Higher id.
    #[must_use]
    pub const fn second(&self) -> PlayerId {
        self.1
    }

    /// Whether the player is one side of the pair.
    #[must_use]
    pub fn contains(&self, player: PlayerId) -> bool {
        self.0 == player || self.1 == player
    }
}

/// Alliance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllianceStatus {
    /// Requested, not yet answered.
    Pending,
    /// In force until `expires_at`.
    Allied,
}

/// Diplomatic relation between two players.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alliance {
    /// The two sides.
    pub pair: PlayerPair,
    /// Current state.
    pub status: AllianceStatus,
    /// Who sent the request.
    pub requested_by: PlayerId,
    /// Expiry of an allied pair (ms).
    pub expires_at: Option<u64>,
}
