//! Built-in demo scenario.
//!
//! Two players on a 64×64 map with a few obstacles in the middle. Both
//! place their base during a zero-length placement phase, then order the
//! same starter colony, mirrored across the map.

use territory_core::commands::Command;
use territory_core::components::{
    BuildingKind, Game, GameId, GamePhase, GameStatus, Player, PlayerId, Rect,
};
use territory_core::map::{MapDocument, Structure, StructureKind};
use territory_core::simulation::{TickEngine, TickOutcome};
use territory_core::state::GameState;
use territory_core::store::MemoryStore;
use territory_core::visibility::StateSnapshot;

use crate::{Result, ServerError};

/// Map id of the demo arena.
pub const DEMO_MAP_ID: &str = "demo";

/// The two demo players.
pub const DEMO_PLAYERS: [PlayerId; 2] = [PlayerId(1), PlayerId(2)];

const BASE_ORIGIN: (i32, i32) = (4, 4);

const COLONY: [(BuildingKind, i32, i32); 4] = [
    (BuildingKind::House, 11, 4),
    (BuildingKind::Workshop, 4, 11),
    (BuildingKind::Barracks, 11, 10),
    (BuildingKind::Turret, 16, 6),
];

/// The demo arena.
#[must_use]
pub fn demo_map() -> MapDocument {
    let mut map = MapDocument::open(DEMO_MAP_ID, 64, 64);
    map.structures = vec![
        Structure {
            kind: StructureKind::Boulder,
            rect: Rect::new(30, 30, 4, 4),
        },
        Structure {
            kind: StructureKind::Grove,
            rect: Rect::new(22, 40, 3, 2),
        },
        Structure {
            kind: StructureKind::Grove,
            rect: Rect::new(39, 22, 3, 2),
        },
        Structure {
            kind: StructureKind::Ruin,
            rect: Rect::new(26, 20, 2, 2),
        },
    ];
    map
}

/// Origin of a footprint reflected through the map centre.
const fn mirrored(map: &MapDocument, width: i32, height: i32, x: i32, y: i32) -> (i32, i32) {
    (map.width - x - width, map.height - y - height)
}

/// Register the demo game `id` and play its opening.
///
/// Bases go down during placement, one tick at time 0 starts the
/// simulation, then every player orders the starter colony. Returns the
/// time of the next tick.
///
/// # Errors
///
/// Fails if any opening command is rejected or the game halts.
pub fn create_game(engine: &mut TickEngine<MemoryStore>, id: GameId, seed: u64) -> Result<u64> {
    let config = engine.config().clone();
    let map = demo_map();

    let mut state = GameState::new(Game {
        id,
        map_id: map.id.clone(),
        seed,
        status: GameStatus::Active,
        phase: GamePhase::Placement,
        phase_start: 0,
        phase_end: Some(0),
        tick_count: 0,
        winner: None,
    });
    for player in DEMO_PLAYERS {
        state
            .players
            .insert(Player::new(player, config.starting_credits));
    }
    engine.store_mut().insert_map(map.clone());
    engine.store_mut().insert_game(state);

    let base = config.buildings.get(BuildingKind::BaseCentral);
    for (index, player) in DEMO_PLAYERS.into_iter().enumerate() {
        let (mut x, mut y) = BASE_ORIGIN;
        if index == 1 {
            (x, y) = mirrored(&map, base.width, base.height, x, y);
        }
        engine.submit(id, 0, &Command::PlaceBase { player, x, y })?;
    }

    match engine.run_tick(id, 0)? {
        TickOutcome::Continue(report) => {
            tracing::debug!(game = %id, phase = ?report.phase_change, "Opening tick");
        }
        TickOutcome::Halt(reason) => return Err(ServerError::Halted { game: id, reason }),
    }

    for (index, player) in DEMO_PLAYERS.into_iter().enumerate() {
        for (kind, mut x, mut y) in COLONY {
            if index == 1 {
                let spec = config.buildings.get(kind);
                (x, y) = mirrored(&map, spec.width, spec.height, x, y);
            }
            engine.submit(id, 0, &Command::PlaceBuilding { player, kind, x, y })?;
        }
    }

    tracing::info!(game = %id, seed, "Demo game ready");
    Ok(config.tick_ms)
}

/// Orders sending every troop `player` sees to the nearest visible enemy
/// base.
#[must_use]
pub fn assault_orders(snapshot: &StateSnapshot, player: PlayerId) -> Vec<Command> {
    let enemy_bases: Vec<_> = snapshot
        .buildings
        .iter()
        .filter(|b| b.kind == BuildingKind::BaseCentral && b.owner_id != player)
        .collect();

    snapshot
        .troops
        .iter()
        .filter(|t| t.owner_id == player)
        .filter_map(|troop| {
            let barracks = snapshot
                .buildings
                .iter()
                .find(|b| b.id == troop.barracks_id)?
                .rect
                .center();
            let target = enemy_bases
                .iter()
                .min_by_key(|b| (b.rect.center().distance_squared(barracks), b.id))?;
            Some(Command::AttackBuilding {
                player,
                troop: troop.id,
                building: target.id,
            })
        })
        .collect()
}
