use std::time::Duration;

/// Timing and counts of the last step, collected when
/// [`WorldParams::enable_diagnostics`][super::WorldParams::enable_diagnostics] is set.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepDiagnostics {
    pub broad_phase: Duration,
    pub narrow_phase: Duration,
    pub force_application: Duration,
    pub impulse_solving: Duration,
    pub position_integration: Duration,
    pub total: Duration,
    /// Bodies that took part in the step.
    pub awake_bodies: usize,
    pub contacts: usize,
    pub touching_contacts: usize,
    pub joints: usize,
    pub proxies: usize,
}

/// Measures the phases of a step, doing nothing when disabled.
pub(crate) struct PhaseTimer {
    enabled: bool,
    start: Option<instant::Instant>,
    phase: Option<instant::Instant>,
}

impl PhaseTimer {
    pub fn start(enabled: bool) -> Self {
        let now = enabled.then(instant::Instant::now);
        Self {
            enabled,
            start: now,
            phase: now,
        }
    }

    /// Time since the previous lap, or zero when disabled.
    pub fn lap(&mut self) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let now = instant::Instant::now();
        let elapsed = self.phase.map_or(Duration::ZERO, |p| now - p);
        self.phase = Some(now);
        elapsed
    }

    pub fn total(&self) -> Duration {
        self.start.map_or(Duration::ZERO, |s| s.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_timer_reports_nothing() {
        let mut timer = PhaseTimer::start(false);
        std::thread::sleep(Duration::from_millis(1));
        assert_eq!(timer.lap(), Duration::ZERO);
        assert_eq!(timer.total(), Duration::ZERO);

        let mut timer = PhaseTimer::start(true);
        std::thread::sleep(Duration::from_millis(1));
        assert!(timer.lap() >= Duration::from_millis(1));
        assert!(timer.total() >= Duration::from_millis(1));
    }
}
