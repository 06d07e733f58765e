//! # Territory Core
//!
//! Deterministic tick engine for a grid territory-control game.
//!
//! This crate contains **only** simulation logic:
//! - No rendering
//! - No network transport
//! - No system randomness (every roll comes from a per-tick seeded stream)
//! - No floating-point math (uses fixed-point)
//!
//! Identical inputs produce bit-identical states, which is what the
//! determinism harness in `territory_test_utils` checks.
//!
//! ## Crate Structure
//!
//! - [`components`] - Persisted record types
//! - [`state`] - Record tables with change tracking
//! - [`grid`], [`pathfinding`], [`spatial`] - Movement and lookup
//! - [`behavior`], [`combat`], [`capture`] - Per-tick unit logic
//! - [`power`], [`economy`], [`spawning`] - Energy, credits and growth
//! - [`commands`], [`diplomacy`] - Player intents
//! - [`visibility`] - Fog-of-war snapshots
//! - [`simulation`] - The tick pipeline and engine
//! - [`store`] - Persistence contract

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod behavior;
pub mod capture;
pub mod combat;
pub mod commands;
pub mod components;
pub mod config;
pub mod context;
pub mod diplomacy;
pub mod economy;
pub mod error;
pub mod grid;
pub mod map;
pub mod math;
pub mod pathfinding;
pub mod power;
pub mod simulation;
pub mod spatial;
pub mod spawning;
pub mod state;
pub mod store;
pub mod visibility;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::commands::{Command, CommandOutcome};
    pub use crate::components::*;
    pub use crate::config::SimConfig;
    pub use crate::context::{CaptureEvent, EliminationEvent, TickReport};
    pub use crate::error::{GameError, Result};
    pub use crate::map::{MapDocument, Structure, StructureKind, Terrain, TerrainChunk};
    pub use crate::math::{Cell, Fixed, Vec2Fixed};
    pub use crate::simulation::{HaltReason, Simulation, TickEngine, TickOutcome};
    pub use crate::state::GameState;
    pub use crate::store::{ChangeSet, Checkpoint, FlushSink, GameStore, MemoryStore, NullSink};
    pub use crate::visibility::StateSnapshot;
}
