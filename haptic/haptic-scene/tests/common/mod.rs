//! Shared scene fixtures for the integration tests.

#![allow(dead_code)]

use haptic_device::{EmulatedDevice, PolledDevice};
use haptic_scene::{HapticScene, SceneBuilder, SceneConfig};
use nalgebra::{Point3, Vector3};
use sim_core::surface_distance;
use sim_types::{DevicePose, Pose};

/// Reference scene without a wall-clock deadline.
pub fn offline_config() -> SceneConfig {
    SceneConfig::reference_grasper_floor().offline()
}

/// Distance from the device origin to the closed jaw tips.
pub fn tip_offset(config: &SceneConfig) -> f64 {
    let jaws = config.tool.jaws;
    jaws.shaft_length / 2.0 + jaws.jaw_length
}

/// Device pose whose target puts the closed jaw tips `gap` above the floor
/// and `lateral` along world X.
pub fn device_at(config: &SceneConfig, gap: f64, lateral: f64) -> DevicePose {
    let height = config.obstacle.top() + tip_offset(config) + gap;
    DevicePose::at(Pose::from_position(Point3::new(-200.0, lateral, height)))
}

/// Lowers the tips from 5 above the floor to `depth` below it at `speed`,
/// then holds.
pub fn pressing_device(config: &SceneConfig, depth: f64, speed: f64) -> EmulatedDevice {
    let start = device_at(config, 5.0, 0.0).position;
    EmulatedDevice::linear(
        start,
        Vector3::new(0.0, 0.0, -speed),
        (5.0 + depth) / speed,
        0.0,
    )
    .with_period(config.timestep())
}

/// Presses to `depth`, then slides along world X at `slide_speed`.
pub fn sliding_device(config: &SceneConfig, depth: f64, slide_speed: f64) -> EmulatedDevice {
    let pressed = device_at(config, -depth, 0.0).position;
    let approach = 0.25;
    let start = device_at(config, 5.0, 0.0).position;
    EmulatedDevice::new(config.timestep(), move |t| {
        let position = if t < approach {
            start + (pressed - start) * (t / approach)
        } else {
            pressed + Vector3::new(0.0, slide_speed * (t - approach), 0.0)
        };
        DevicePose::at(Pose::from_position(position))
    })
}

/// Scene driven inline by `device`.
pub fn scene_with(config: SceneConfig, device: EmulatedDevice) -> HapticScene {
    SceneBuilder::new(config)
        .with_device(PolledDevice::new(device))
        .build()
        .unwrap()
}

/// Smallest signed distance between any tool body and the floor.
pub fn min_floor_distance(scene: &HapticScene) -> f64 {
    let world = scene.world();
    let floor = world.body(scene.obstacles()[0]).unwrap();
    world
        .bodies()
        .iter()
        .filter(|body| !body.is_static())
        .filter_map(|body| surface_distance(body, floor))
        .fold(f64::INFINITY, f64::min)
}
