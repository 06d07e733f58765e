//! Replay harness for the tick engine.
//!
//! Every run records the state hash before the first tick and after each
//! tick. Two runs fed the same game seed and the same tick times must
//! produce identical traces; the first index where traces differ is the
//! tick that introduced the divergence.
//!
//! Sources of divergence the engine guards against: float math (all
//! simulation values are [`territory_core::math::Fixed`]), hash map
//! iteration (tables iterate in ascending id order) and ambient
//! randomness (rolls come from a ChaCha stream keyed by seed and tick).

use std::thread;

use territory_core::error::Result;
use territory_core::simulation::Simulation;
use territory_core::state::GameState;

use crate::fixtures::step;

/// Per-tick state hashes of several runs of the same game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// One trace per run; index 0 is the state before the first tick.
    pub traces: Vec<Vec<u64>>,
}

impl ReplayReport {
    /// First tick at which any run disagrees with the first one.
    #[must_use]
    pub fn first_divergence(&self) -> Option<u64> {
        let (reference, rest) = self.traces.split_first()?;
        let tick = rest.iter().filter_map(|trace| divergence(reference, trace)).min()?;
        tracing::warn!(tick, runs = self.traces.len(), "Replay diverged");
        Some(tick as u64)
    }

    /// Whether every run produced the same trace.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.first_divergence().is_none()
    }

    /// Final state hash of the first run.
    #[must_use]
    pub fn final_hash(&self) -> Option<u64> {
        self.traces.first().and_then(|trace| trace.last().copied())
    }

    /// Panic with the divergent tick and each run's hash at that tick.
    ///
    /// # Panics
    ///
    /// Panics if the runs diverged.
    pub fn assert_deterministic(&self) {
        if let Some(tick) = self.first_divergence() {
            let at_tick: Vec<Option<u64>> = self
                .traces
                .iter()
                .map(|trace| trace.get(tick as usize).copied())
                .collect();
            panic!(
                "Replay diverged at tick {tick} across {} runs; hashes there: {at_tick:?}",
                self.traces.len()
            );
        }
    }
}

/// Index of the first differing hash; a shorter trace diverges where it ends.
fn divergence(a: &[u64], b: &[u64]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then_some(a.len().min(b.len())))
}

/// Step `sim` for `ticks` ticks, hashing before the first and after each.
pub fn trace(sim: &mut Simulation, ticks: u64) -> Vec<u64> {
    let mut hashes = Vec::with_capacity(ticks as usize + 1);
    hashes.push(sim.state().state_hash());
    for _ in 0..ticks {
        step(sim);
        hashes.push(sim.state().state_hash());
    }
    hashes
}

/// Replay the game built by `setup` `runs` times in sequence.
pub fn replay<F>(setup: F, runs: usize, ticks: u64) -> ReplayReport
where
    F: Fn() -> Simulation,
{
    ReplayReport {
        traces: (0..runs).map(|_| trace(&mut setup(), ticks)).collect(),
    }
}

/// Replay on scoped threads, one run per thread.
///
/// Catches divergence that only shows up under different thread
/// scheduling or memory layout.
pub fn replay_parallel<F>(setup: F, runs: usize, ticks: u64) -> ReplayReport
where
    F: Fn() -> Simulation + Sync,
{
    let traces = thread::scope(|s| {
        let handles: Vec<_> = (0..runs)
            .map(|_| s.spawn(|| trace(&mut setup(), ticks)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("replay thread panicked"))
            .collect()
    });
    ReplayReport { traces }
}

/// Run `before` ticks, restore a second simulation from a bincode
/// snapshot, then trace both for `after` more ticks.
pub fn replay_from_snapshot<F>(setup: F, before: u64, after: u64) -> Result<ReplayReport>
where
    F: Fn() -> Simulation,
{
    let mut original = setup();
    for _ in 0..before {
        step(&mut original);
    }

    let state = GameState::deserialize(&original.state().serialize()?)?;
    let mut restored = Simulation::new(state, original.map().clone(), original.config().clone());

    Ok(ReplayReport {
        traces: vec![trace(&mut original, after), trace(&mut restored, after)],
    })
}
