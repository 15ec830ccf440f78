//! Benchmarks for the contact pipeline stages.
//!
//! Run with: cargo bench -p sim-core
//!
//! A tick of the grasper scene must fit in its 10 ms period with room to
//! spare for the device thread.

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalgebra::{Point3, Vector3};

use sim_core::{
    ArticulatedTool, BroadPhase, BroadPhaseConfig, BroadPhaseDetector, Body, CollisionShape,
    DevicePose, MassProperties, NarrowPhase, PairQuery, Pose, ProximityParams, RigidBodyState,
    RigidObstacle, Stepper, StepperConfig, ToolConfig, World,
};

/// A floor with `count` spheres resting on it in a grid.
fn sphere_grid(count: usize) -> World {
    let mut world = World::new();
    RigidObstacle::reference_floor().spawn(&mut world).unwrap();
    let side = (count as f64).sqrt().ceil() as usize;
    for i in 0..count {
        let x = (i % side) as f64 * 3.0 - 90.0;
        let z = (i / side) as f64 * 3.0 - 90.0;
        let id = world.allocate_id();
        world
            .insert_body(
                Body::new(
                    id,
                    RigidBodyState::at_rest(Pose::from_position(Point3::new(x, 1.0, z))),
                    MassProperties::sphere(1.0, 1.0),
                )
                .with_collision_shape(CollisionShape::sphere(1.0)),
            )
            .unwrap();
    }
    world
}

fn bench_broad_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("broad_phase");
    for count in [8, 64, 512] {
        let world = sphere_grid(count);
        let mut detector = BroadPhaseDetector::new(BroadPhaseConfig::with_margin(2.0));
        let query = PairQuery::new(2.0, 0.01);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &world, |b, world| {
            b.iter(|| black_box(detector.find_potential_pairs(world.bodies(), query)));
        });
    }
    group.finish();
}

fn bench_narrow_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("narrow_phase");
    for count in [8, 64, 512] {
        let world = sphere_grid(count);
        let mut detector = BroadPhaseDetector::new(BroadPhaseConfig::with_margin(2.0));
        let pairs = detector.find_potential_pairs(world.bodies(), PairQuery::new(2.0, 0.01));
        let mut narrow = NarrowPhase::new(ProximityParams::reference_scene());
        group.throughput(Throughput::Elements(pairs.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &world, |b, world| {
            b.iter(|| black_box(narrow.generate(world, &pairs)));
        });
    }
    group.finish();
}

fn bench_resting_spheres(c: &mut Criterion) {
    let mut group = c.benchmark_group("resting_spheres_tick");
    for count in [8, 64] {
        group.bench_function(BenchmarkId::from_parameter(count), |b| {
            let mut world = sphere_grid(count);
            let mut stepper = Stepper::new(StepperConfig::reference_scene()).unwrap();
            b.iter(|| black_box(stepper.step(&mut world)));
        });
    }
    group.finish();
}

fn bench_grasper_on_floor(c: &mut Criterion) {
    c.bench_function("grasper_pressing_floor_tick", |b| {
        let mut world = World::new();
        RigidObstacle::reference_floor().spawn(&mut world).unwrap();
        let config = ToolConfig::default()
            .with_offset_degrees(Point3::new(0.0, 0.0, 200.0), Vector3::new(0.0, -90.0, -90.0));
        let height = config.jaws.shaft_length / 2.0 + config.jaws.jaw_length;
        let device = DevicePose::at(Pose::from_position(Point3::new(-200.0, 0.0, height - 3.0)))
            .with_grip(0.5);
        let mut tool = ArticulatedTool::spawn(&mut world, config, &device, 0.01).unwrap();
        let mut stepper = Stepper::new(StepperConfig::reference_scene()).unwrap();
        b.iter(|| black_box(stepper.step_tool(&mut world, &mut tool, &device)));
    });
}

criterion_group!(
    benches,
    bench_broad_phase,
    bench_narrow_phase,
    bench_resting_spheres,
    bench_grasper_on_floor,
);
criterion_main!(benches);
