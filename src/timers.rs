//! Accumulated per-phase wall-clock timing for one benchmark run.

use std::time::{Duration, Instant};

/// Phases the driver times separately, matching the breakdown the report
/// emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Setup,
    Spmv,
    Symgs,
    WaxpbyDot,
    MgBuild,
    HaloExchange,
    Total,
}

const PHASE_COUNT: usize = 7;

fn phase_index(phase: Phase) -> usize {
    match phase {
        Phase::Setup => 0,
        Phase::Spmv => 1,
        Phase::Symgs => 2,
        Phase::WaxpbyDot => 3,
        Phase::MgBuild => 4,
        Phase::HaloExchange => 5,
        Phase::Total => 6,
    }
}

/// Accumulates elapsed time per [`Phase`] across an arbitrary number of
/// timed sections.
#[derive(Debug, Default, Clone)]
pub struct PhaseTimers {
    totals: [Duration; PHASE_COUNT],
}

impl PhaseTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing `phase`; the returned guard adds the elapsed time to
    /// this phase's total when it drops.
    pub fn scoped(&mut self, phase: Phase) -> ScopedTimer<'_> {
        ScopedTimer {
            timers: self,
            phase,
            started: Instant::now(),
        }
    }

    pub fn total(&self, phase: Phase) -> Duration {
        self.totals[phase_index(phase)]
    }

    fn add(&mut self, phase: Phase, elapsed: Duration) {
        self.totals[phase_index(phase)] += elapsed;
    }
}

/// RAII guard returned by [`PhaseTimers::scoped`].
pub struct ScopedTimer<'a> {
    timers: &'a mut PhaseTimers,
    phase: Phase,
    started: Instant,
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        self.timers.add(self.phase, self.started.elapsed());
    }
}
