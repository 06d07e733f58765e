//! Error types for the game simulation.
//!
//! Command rejections are ordinary values returned to the caller; they never
//! leave partial mutations behind. Faults inside the tick pipeline do not use
//! this type at all - they degrade the affected entity to a safe state.

use thiserror::Error;

use crate::components::{BuildingId, GamePhase, PlayerId, TroopId};

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all game simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Command submitted in a phase that does not accept it.
    #[error("Wrong phase: expected {expected:?}, game is in {actual:?}")]
    WrongPhase {
        /// Phase the command requires.
        expected: GamePhase,
        /// Phase the game is currently in.
        actual: GamePhase,
    },

    /// Footprint leaves the map or covers impassable terrain.
    #[error("Out of bounds")]
    OutOfBounds,

    /// Footprint overlaps an existing building.
    #[error("Collides with another building")]
    Collision,

    /// Player cannot pay for the building.
    #[error("Not enough credits: need {required}, have {available}")]
    InsufficientCredits {
        /// Cost of the build.
        required: i64,
        /// Credits the player holds.
        available: i64,
    },

    /// No owned building is close enough to energize the new footprint.
    #[error("Must place within energy field")]
    OutsideEnergyField,

    /// The player already placed their central base.
    #[error("Player already has a base")]
    AlreadyHasBase,

    /// The central base is only placed through the placement-phase command.
    #[error("Building kind cannot be built here: {0}")]
    InvalidBuildingKind(String),

    /// Troop exists but belongs to someone else.
    #[error("Not your troop: {0}")]
    NotYourTroop(TroopId),

    /// The pair is already allied.
    #[error("Already allied")]
    AlreadyAllied,

    /// A pending request already exists for this pair.
    #[error("Request already sent")]
    RequestAlreadySent,

    /// No pending request from the given player.
    #[error("No pending alliance request")]
    NoPendingRequest,

    /// The pair is not allied.
    #[error("Not allied")]
    NotAllied,

    /// Renewal attempted outside the closing window.
    #[error("Can only renew in final 30 seconds")]
    RenewWindowClosed,

    /// Diplomacy or attack order aimed at the issuing player.
    #[error("Cannot target yourself")]
    CannotTargetSelf,

    /// Player is eliminated or spectating.
    #[error("Player is not active: {0}")]
    PlayerInactive(PlayerId),

    /// Player does not exist in this game.
    #[error("Unknown player: {0}")]
    UnknownPlayer(PlayerId),

    /// Building does not exist in this game.
    #[error("Unknown building: {0}")]
    UnknownBuilding(BuildingId),

    /// Troop does not exist in this game.
    #[error("Unknown troop: {0}")]
    UnknownTroop(TroopId),

    /// Game record is missing from the store.
    #[error("Game not found: {0}")]
    GameNotFound(u64),

    /// Map document is missing from the store.
    #[error("Map not found: {0}")]
    MapNotFound(String),

    /// Configuration could not be parsed or read.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Snapshot (de)serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The persistence collaborator rejected a flush.
    #[error("Persistence failed: {0}")]
    Persistence(String),
}

impl GameError {
    /// Whether this error is a caller-facing command rejection rather than an
    /// infrastructure fault.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::GameNotFound(_)
                | Self::MapNotFound(_)
                | Self::Config(_)
                | Self::Serialization(_)
                | Self::Persistence(_)
        )
    }
}
