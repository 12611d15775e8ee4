//! Build progress reporting.

use std::fmt;

use tracing::info;

/// Stage of a build being reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    /// Subdividing space and materializing leaves.
    Partitioning,
    /// Finalizing the optimized geometry cache.
    Optimizing,
    /// Running the potential-visibility hook.
    Pvs,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildPhase::Partitioning => "partitioning",
            BuildPhase::Optimizing => "optimizing",
            BuildPhase::Pvs => "pvs",
        };
        f.write_str(name)
    }
}

/// Receives `(phase, percent)` updates while a build runs. `percent` is in
/// `[0, 100]` and never decreases within a phase.
pub trait ProgressSink {
    fn on_progress(&mut self, phase: BuildPhase, percent: f32);
}

impl<F: FnMut(BuildPhase, f32)> ProgressSink for F {
    fn on_progress(&mut self, phase: BuildPhase, percent: f32) {
        self(phase, percent)
    }
}

/// Discards progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _phase: BuildPhase, _percent: f32) {}
}

/// Logs progress through `tracing` each time a phase crosses another
/// `step` percent.
#[derive(Clone, Debug)]
pub struct LogProgress {
    step: f32,
    last: Option<(BuildPhase, f32)>,
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl LogProgress {
    pub fn new(step: f32) -> Self {
        Self {
            step: step.max(f32::EPSILON),
            last: None,
        }
    }

    fn should_log(&self, phase: BuildPhase, percent: f32) -> bool {
        match self.last {
            Some((last_phase, last)) if last_phase == phase => {
                (percent >= 100.0 && last < 100.0) || percent - last >= self.step
            }
            _ => true,
        }
    }
}

impl ProgressSink for LogProgress {
    fn on_progress(&mut self, phase: BuildPhase, percent: f32) {
        if self.should_log(phase, percent) {
            info!("{phase}: {percent:.0}%");
            self.last = Some((phase, percent));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_a_sink() {
        let mut seen = Vec::new();
        let mut sink = |phase: BuildPhase, percent: f32| seen.push((phase, percent));
        sink.on_progress(BuildPhase::Partitioning, 50.0);
        sink.on_progress(BuildPhase::Optimizing, 100.0);
        assert_eq!(
            seen,
            vec![
                (BuildPhase::Partitioning, 50.0),
                (BuildPhase::Optimizing, 100.0)
            ]
        );
    }

    #[test]
    fn test_log_progress_throttles_by_step() {
        let mut log = LogProgress::new(10.0);
        let mut logged = Vec::new();
        for percent in [0.0, 3.0, 9.0, 10.0, 15.0, 21.0, 100.0] {
            if log.should_log(BuildPhase::Partitioning, percent) {
                logged.push(percent);
                log.last = Some((BuildPhase::Partitioning, percent));
            }
        }
        assert_eq!(logged, vec![0.0, 10.0, 21.0, 100.0]);
    }

    #[test]
    fn test_log_progress_restarts_on_new_phase() {
        let mut log = LogProgress::default();
        log.on_progress(BuildPhase::Partitioning, 95.0);
        assert!(log.should_log(BuildPhase::Optimizing, 0.0));
        assert!(log.should_log(BuildPhase::Partitioning, 100.0));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(BuildPhase::Pvs.to_string(), "pvs");
    }
}
