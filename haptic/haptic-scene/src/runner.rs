//! Fixed-rate driver for a scene.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::scene::{HapticScene, TickReport};

/// What a run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks run.
    pub ticks: u64,
    /// Ticks that finished after their slot ended.
    pub overruns: u64,
    /// Wall-clock time of the run.
    pub wall_time: Duration,
}

/// Calls [`HapticScene::step`] once per period.
///
/// Each tick is scheduled against an absolute deadline; a tick that ends
/// late is counted as an overrun and the schedule restarts from now rather
/// than bursting to catch up. With pacing disabled the runner steps as fast
/// as it can, which is what tests and offline replays want.
#[derive(Debug, Clone)]
pub struct FixedStepRunner {
    period: Duration,
    paced: bool,
}

impl FixedStepRunner {
    /// Pace ticks `period` apart.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            paced: true,
        }
    }

    /// Pace ticks at the scene's own timestep.
    #[must_use]
    pub fn for_scene(scene: &HapticScene) -> Self {
        Self::new(scene.config().simulation.period())
    }

    /// Step without sleeping.
    #[must_use]
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Tick period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run `ticks` ticks, handing each report to `on_tick`.
    pub fn run_for(
        &self,
        scene: &mut HapticScene,
        ticks: u64,
        mut on_tick: impl FnMut(&TickReport),
    ) -> RunSummary {
        let mut remaining = ticks;
        self.drive(scene, || {
            let go = remaining > 0;
            remaining = remaining.saturating_sub(1);
            go
        }, &mut on_tick)
    }

    /// Run until `stop` is set.
    pub fn run_until(
        &self,
        scene: &mut HapticScene,
        stop: &AtomicBool,
        mut on_tick: impl FnMut(&TickReport),
    ) -> RunSummary {
        self.drive(scene, || !stop.load(Ordering::Acquire), &mut on_tick)
    }

    fn drive(
        &self,
        scene: &mut HapticScene,
        mut keep_going: impl FnMut() -> bool,
        on_tick: &mut dyn FnMut(&TickReport),
    ) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut next = started;

        while keep_going() {
            let report = scene.step();
            on_tick(&report);
            summary.ticks += 1;

            if !self.paced {
                continue;
            }
            next += self.period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                summary.overruns += 1;
                debug!(
                    tick = report.tick,
                    late_us = u64::try_from((now - next).as_micros()).unwrap_or(u64::MAX),
                    "tick overran its slot"
                );
                next = now;
            }
        }

        summary.wall_time = started.elapsed();
        if summary.overruns > 0 {
            warn!(
                ticks = summary.ticks,
                overruns = summary.overruns,
                "scene could not keep its rate"
            );
        }
        summary
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::config::SceneConfig;
    use crate::scene::SceneBuilder;
    use haptic_device::{EmulatedDevice, PolledDevice};
    use nalgebra::Point3;
    use sim_types::{DevicePose, Pose};

    fn scene() -> HapticScene {
        let device = EmulatedDevice::stationary(DevicePose::at(Pose::from_position(Point3::new(
            -200.0, 0.0, 150.0,
        ))));
        SceneBuilder::new(SceneConfig::reference_grasper_floor().offline())
            .with_device(PolledDevice::new(device))
            .build()
            .unwrap()
    }

    #[test]
    fn test_unpaced_runs_exact_count() {
        let mut scene = scene();
        let mut seen = Vec::new();
        let summary = FixedStepRunner::for_scene(&scene)
            .unpaced()
            .run_for(&mut scene, 5, |report| seen.push(report.tick));

        assert_eq!(summary.ticks, 5);
        assert_eq!(summary.overruns, 0);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(scene.ticks(), 5);
    }

    #[test]
    fn test_paced_run_takes_at_least_its_period() {
        let mut scene = scene();
        let runner = FixedStepRunner::new(Duration::from_millis(2));
        let summary = runner.run_for(&mut scene, 5, |_| {});
        assert_eq!(summary.ticks, 5);
        assert!(summary.wall_time >= Duration::from_millis(8));
    }

    #[test]
    fn test_run_until_stops() {
        let mut scene = scene();
        let stop = AtomicBool::new(false);
        let summary = FixedStepRunner::for_scene(&scene)
            .unpaced()
            .run_until(&mut scene, &stop, |report| {
                if report.tick == 9 {
                    stop.store(true, Ordering::Release);
                }
            });
        assert_eq!(summary.ticks, 10);
    }
}
