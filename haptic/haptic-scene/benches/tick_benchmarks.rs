//! Benchmarks for a full scene tick.
//!
//! Run with: cargo bench -p haptic-scene
//!
//! Covers everything between two device samples: free motion, contact,
//! solve, response and feedback mapping.

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nalgebra::Point3;

use haptic_device::{EmulatedDevice, PolledDevice};
use haptic_scene::{HapticScene, SceneBuilder, SceneConfig};
use sim_types::{DevicePose, Pose};

/// Scene with the jaw tips held `gap` above the floor (negative presses in).
fn held_scene(gap: f64, grip: f64) -> HapticScene {
    let config = SceneConfig::reference_grasper_floor().offline();
    let jaws = config.tool.jaws;
    let height = jaws.shaft_length / 2.0 + jaws.jaw_length + gap;
    let pose =
        DevicePose::at(Pose::from_position(Point3::new(-200.0, 0.0, height))).with_grip(grip);
    SceneBuilder::new(config)
        .with_device(PolledDevice::new(EmulatedDevice::stationary(pose)))
        .build()
        .unwrap()
}

fn bench_tick_by_gap(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_tick");
    for (label, gap) in [("free", 20.0), ("alarm_band", 1.0), ("pressed", -3.0)] {
        group.bench_with_input(BenchmarkId::from_parameter(label), &gap, |b, &gap| {
            let mut scene = held_scene(gap, 0.0);
            b.iter(|| black_box(scene.step()));
        });
    }
    group.finish();
}

fn bench_open_jaws_pressed(c: &mut Criterion) {
    c.bench_function("scene_tick_open_jaws_pressed", |b| {
        let mut scene = held_scene(-3.0, 1.0);
        b.iter(|| black_box(scene.step()));
    });
}

criterion_group!(benches, bench_tick_by_gap, bench_open_jaws_pressed);
criterion_main!(benches);
