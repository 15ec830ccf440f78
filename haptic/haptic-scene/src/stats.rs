//! Running counters over a scene's lifetime.

use std::time::Duration;

use haptic_device::DeviceStatus;

use crate::scene::TickReport;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cumulative statistics of a scene.
///
/// Every anomaly a tick absorbs instead of failing is counted here.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationStats {
    /// Ticks run.
    pub ticks: u64,
    /// Ticks with at least one solved contact.
    pub contact_ticks: u64,
    /// Solves that stopped before reaching the tolerance.
    pub non_converged_solves: u64,
    /// Solves cut short by the tick budget.
    pub deadline_misses: u64,
    /// Normals taken from the fallback path.
    pub degenerate_normals: u64,
    /// Penetrations clamped directly.
    pub correction_events: u64,
    /// Jaw hinge clamps.
    pub soft_limit_events: u64,
    /// Ticks run on a replayed pose.
    pub disconnected_ticks: u64,
    /// Solver sweeps over all ticks.
    pub solver_iterations: u64,
    /// Deepest residual penetration seen.
    pub max_penetration: f64,
    /// Longest tick.
    pub max_tick_time: Duration,
    /// Sum of tick times.
    pub total_tick_time: Duration,
}

impl SimulationStats {
    /// Fold one tick into the counters.
    pub fn record(&mut self, report: &TickReport) {
        let step = &report.step;
        self.ticks += 1;
        if step.active_contacts() > 0 {
            self.contact_ticks += 1;
            if !step.solve.converged {
                self.non_converged_solves += 1;
            }
        }
        if step.solve.deadline_hit {
            self.deadline_misses += 1;
        }
        self.degenerate_normals += step.degenerate_normals as u64;
        self.correction_events += step.response.correction_events as u64;
        if step.soft_limit.is_some() {
            self.soft_limit_events += 1;
        }
        if report.device_status == DeviceStatus::Disconnected {
            self.disconnected_ticks += 1;
        }
        self.solver_iterations += step.solve.iterations as u64;
        self.max_penetration = self.max_penetration.max(step.response.max_penetration);
        self.max_tick_time = self.max_tick_time.max(step.elapsed);
        self.total_tick_time += step.elapsed;
    }

    /// Mean tick time.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_tick_time(&self) -> Duration {
        match u32::try_from(self.ticks) {
            Ok(0) => Duration::ZERO,
            Ok(ticks) => self.total_tick_time / ticks,
            Err(_) => self.total_tick_time.div_f64(self.ticks as f64),
        }
    }

    /// Mean solver sweeps per contact tick.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_iterations(&self) -> f64 {
        if self.contact_ticks == 0 {
            0.0
        } else {
            self.solver_iterations as f64 / self.contact_ticks as f64
        }
    }

    /// Whether the scene ran without any absorbed anomaly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.non_converged_solves == 0
            && self.deadline_misses == 0
            && self.degenerate_normals == 0
            && self.correction_events == 0
            && self.disconnected_ticks == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use haptic_device::FeedbackForce;
    use sim_core::{SoftLimitEvent, StepResult};

    fn report(configure: impl FnOnce(&mut StepResult)) -> TickReport {
        let mut step = StepResult::default();
        configure(&mut step);
        TickReport {
            tick: 0,
            time: 0.0,
            device_status: DeviceStatus::Connected,
            feedback: FeedbackForce::zero(),
            step,
        }
    }

    #[test]
    fn test_empty_ticks_are_clean() {
        let mut stats = SimulationStats::default();
        for _ in 0..3 {
            stats.record(&report(|_| {}));
        }
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.contact_ticks, 0);
        assert!(stats.is_clean());
        assert_eq!(stats.mean_iterations(), 0.0);
    }

    #[test]
    fn test_anomalies_are_counted() {
        let mut stats = SimulationStats::default();
        stats.record(&report(|step| {
            step.solve.deadline_hit = true;
            step.degenerate_normals = 2;
            step.response.correction_events = 1;
            step.response.max_penetration = 0.04;
            step.soft_limit = Some(SoftLimitEvent {
                requested: 2.0,
                clamped: 1.0,
            });
            step.elapsed = Duration::from_millis(3);
        }));
        stats.record(&report(|step| step.elapsed = Duration::from_millis(1)));

        assert_eq!(stats.deadline_misses, 1);
        assert_eq!(stats.degenerate_normals, 2);
        assert_eq!(stats.correction_events, 1);
        assert_eq!(stats.soft_limit_events, 1);
        assert_eq!(stats.max_penetration, 0.04);
        assert_eq!(stats.max_tick_time, Duration::from_millis(3));
        assert_eq!(stats.mean_tick_time(), Duration::from_millis(2));
        assert!(!stats.is_clean());
    }

    #[test]
    fn test_disconnected_ticks() {
        let mut stats = SimulationStats::default();
        let mut tick = report(|_| {});
        tick.device_status = DeviceStatus::Disconnected;
        stats.record(&tick);
        assert_eq!(stats.disconnected_ticks, 1);
    }
}
