//! Pluggable timing hooks around assembly phases.
//!
//! The assembler and the lifting operator invoke the active hook around their
//! accumulation and synchronization phases. Process-wide timers are an
//! observability concern, not core logic, so the hook is injected rather than
//! hard-wired; the default implementation reports through [`log`].

use std::fmt;
use std::time::{Duration, Instant};

/// The phases an [`Instrumentation`] hook is notified about.
///
/// `GhostReduction` and the local-view commit are the collective
/// synchronization points of the assembly protocol; the remaining phases are
/// process-local accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PatternConstruction,
    VectorAccumulation,
    MatrixAccumulation,
    GhostReduction,
    Lifting,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::PatternConstruction => "pattern construction",
            Phase::VectorAccumulation => "vector accumulation",
            Phase::MatrixAccumulation => "matrix accumulation",
            Phase::GhostReduction => "ghost reduction",
            Phase::Lifting => "lifting",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub trait Instrumentation {
    fn phase_begin(&self, phase: Phase);

    fn phase_end(&self, phase: Phase, elapsed: Duration);
}

/// RAII guard that reports `phase_end` with the elapsed time when dropped.
pub struct PhaseGuard<'a> {
    hook: &'a dyn Instrumentation,
    phase: Phase,
    start: Instant,
}

impl<'a> Drop for PhaseGuard<'a> {
    fn drop(&mut self) {
        self.hook.phase_end(self.phase, self.start.elapsed());
    }
}

/// Enter `phase` on the given hook, leaving it again when the returned guard
/// is dropped.
pub fn enter_phase<'a>(hook: &'a dyn Instrumentation, phase: Phase) -> PhaseGuard<'a> {
    hook.phase_begin(phase);
    PhaseGuard {
        hook,
        phase,
        start: Instant::now(),
    }
}

/// Default hook reporting phase timings at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogInstrumentation;

impl Instrumentation for LogInstrumentation {
    fn phase_begin(&self, phase: Phase) {
        log::debug!("MPC {} started", phase);
    }

    fn phase_end(&self, phase: Phase, elapsed: Duration) {
        log::debug!("MPC {} finished in {:?}", phase, elapsed);
    }
}

/// Hook that ignores all notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInstrumentation;

impl Instrumentation for NoInstrumentation {
    fn phase_begin(&self, _phase: Phase) {}

    fn phase_end(&self, _phase: Phase, _elapsed: Duration) {}
}
