//! Property-based tests over device scripts.
//!
//! Run with: cargo test -p haptic-scene -- prop_

mod common;

use common::{device_at, min_floor_distance, offline_config, scene_with, sliding_device};
use haptic_device::EmulatedDevice;
use nalgebra::{Point3, Vector3};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_sliding_contacts_respect_the_cone(
        depth in 0.5..8.0f64,
        slide in -60.0..60.0f64,
    ) {
        let config = offline_config();
        let mu = config.proximity.friction_coefficient;
        let mut scene = scene_with(config.clone(), sliding_device(&config, depth, slide));

        for _ in 0..80 {
            let report = scene.step();
            for (_, impulse) in &report.step.solved {
                prop_assert!(impulse.normal >= 0.0);
                prop_assert!(impulse.tangential() <= mu * impulse.normal + 1e-9);
            }
        }
    }

    #[test]
    fn prop_descent_never_penetrates(
        start_gap in 1.0..30.0f64,
        depth in 0.0..15.0f64,
        speed in 5.0..100.0f64,
        grip in 0.0..1.0f64,
    ) {
        let config = offline_config();
        let limit = config.response.clamp_depth();
        let start: Point3<f64> = device_at(&config, start_gap, 0.0).position;
        let device = EmulatedDevice::linear(
            start,
            Vector3::new(0.0, 0.0, -speed),
            (start_gap + depth) / speed,
            grip,
        )
        .with_period(config.timestep());
        let mut scene = scene_with(config, device);

        for _ in 0..100 {
            scene.step();
            prop_assert!(min_floor_distance(&scene) >= -limit);
        }
        prop_assert!(scene.world().is_finite());
    }
}
