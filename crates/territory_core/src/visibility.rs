//! Read-only state snapshots with fog of war.
//!
//! A viewer always sees its own and friendly records. Enemy buildings and
//! units show up only inside the vision radius of a friendly building
//! centre or an outdoor friendly unit, except enemy central bases, which
//! are always visible. Units inside buildings are hidden from enemies.

use serde::Serialize;

use crate::components::{
    Alliance, Building, BuildingKind, Entity, Family, Game, Player, PlayerId, PlayerStatus, Troop,
};
use crate::config::SimConfig;
use crate::map::MapDocument;
use crate::math::{Fixed, Vec2Fixed};
use crate::state::GameState;

/// Everything the presentation layer gets to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    /// Game record.
    pub game: Game,
    /// Static map.
    pub map: MapDocument,
    /// All players.
    pub players: Vec<Player>,
    /// Visible buildings.
    pub buildings: Vec<Building>,
    /// Visible units.
    pub entities: Vec<Entity>,
    /// Friendly families.
    pub families: Vec<Family>,
    /// Friendly troops.
    pub troops: Vec<Troop>,
    /// Diplomatic relations.
    pub alliances: Vec<Alliance>,
}

impl StateSnapshot {
    /// Snapshot as seen by `viewer`.
    ///
    /// `None`, spectators and eliminated players get the unfiltered state.
    #[must_use]
    pub fn for_viewer(
        state: &GameState,
        map: &MapDocument,
        viewer: Option<PlayerId>,
        config: &SimConfig,
    ) -> Self {
        let filtering = viewer.filter(|&id| {
            state
                .players
                .get(id)
                .is_some_and(|p| p.status == PlayerStatus::Active)
        });
        let Some(viewer) = filtering else {
            return Self::full(state, map);
        };

        let friendly = |owner: PlayerId| state.are_friendly(viewer, owner);
        let eyes: Vec<Vec2Fixed> = state
            .buildings
            .values()
            .filter(|b| friendly(b.owner_id))
            .map(|b| b.rect.center())
            .chain(
                state
                    .entities
                    .values()
                    .filter(|e| friendly(e.owner_id) && !e.is_inside)
                    .map(|e| e.position),
            )
            .collect();
        let radius = Fixed::from_num(config.vision_radius);
        let seen = |point: Vec2Fixed| eyes.iter().any(|eye| eye.within(point, radius));

        Self {
            game: state.game().clone(),
            map: map.clone(),
            players: state.players.values().cloned().collect(),
            buildings: state
                .buildings
                .values()
                .filter(|b| {
                    friendly(b.owner_id)
                        || b.kind == BuildingKind::BaseCentral
                        || seen(b.rect.center())
                })
                .cloned()
                .collect(),
            entities: state
                .entities
                .values()
                .filter(|e| friendly(e.owner_id) || (!e.is_inside && seen(e.position)))
                .cloned()
                .collect(),
            families: state
                .families
                .values()
                .filter(|f| friendly(f.owner_id))
                .cloned()
                .collect(),
            troops: state
                .troops
                .values()
                .filter(|t| friendly(t.owner_id))
                .cloned()
                .collect(),
            alliances: state.alliances.values().cloned().collect(),
        }
    }

    fn full(state: &GameState, map: &MapDocument) -> Self {
        Self {
            game: state.game().clone(),
            map: map.clone(),
            players: state.players.values().cloned().collect(),
            buildings: state.buildings.values().cloned().collect(),
            entities: state.entities.values().cloned().collect(),
            families: state.families.values().cloned().collect(),
            troops: state.troops.values().cloned().collect(),
            alliances: state.alliances.values().cloned().collect(),
        }
    }
}
