//! # Territory Server
//!
//! Headless game host.
//!
//! Runs one fixed-rate tick loop per active game against an in-process
//! store. There is no network transport: commands enter through
//! [`TickScheduler::submit`] and state leaves through snapshots.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod demo;
pub mod scheduler;

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use territory_core::components::GameId;
use territory_core::config::SimConfig;
use territory_core::error::GameError;
use territory_core::simulation::HaltReason;

pub use scheduler::{GameSummary, TickScheduler};

/// Errors raised by the host.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The engine rejected something or a store call failed.
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// Reading a file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A server config file could not be parsed.
    #[error("Invalid server configuration: {0}")]
    Config(String),

    /// Writing JSON output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A game stopped while it was being set up.
    #[error("Game {game} halted: {reason:?}")]
    Halted {
        /// The game.
        game: GameId,
        /// Why the engine stopped it.
        reason: HaltReason,
    },

    /// A game task died.
    #[error("Game task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias using [`ServerError`].
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Wall-clock time between ticks of one game.
    pub tick_interval_ms: u64,
    /// RON file with simulation rules; defaults apply when absent.
    pub sim_config: Option<PathBuf>,
    /// Number of demo games to host.
    pub demo_games: usize,
    /// Seed of the first demo game; later games count up from it.
    pub demo_seed: u64,
    /// Stop each game after this many ticks.
    pub max_ticks: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: SimConfig::default().tick_ms,
            sim_config: None,
            demo_games: 1,
            demo_seed: 1,
            max_ticks: None,
        }
    }
}

impl ServerConfig {
    /// Read a RON server config; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// IO errors, or [`ServerError::Config`] if the file does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        ron::from_str(&source).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Simulation rules named by this config.
    ///
    /// # Errors
    ///
    /// Propagates config loading failures.
    pub fn load_sim_config(&self) -> Result<SimConfig> {
        match &self.sim_config {
            Some(path) => Ok(SimConfig::load(path)?),
            None => Ok(SimConfig::default()),
        }
    }
}
