//! Grasper against a rigid floor, driven by an emulated device.
//!
//! The emulated handle starts above `Floor_01`, lowers the grasper until its
//! jaw tips are `--depth` below the surface, and holds there. The summary
//! shows how many ticks touched the floor, what the solver did and the force
//! the device would have rendered.
//!
//! ```text
//! cargo run --bin grasper-floor -- --ticks 300 --depth 5
//! cargo run --bin grasper-floor -- --threaded --realtime
//! ```

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use haptic_device::{
    device_link, DeviceInterface, DeviceStatus, EmulatedDevice, ForceLog, LinkConfig, PolledDevice,
};
use haptic_scene::{FixedStepRunner, HapticScene, SceneBuilder, SceneConfig, SimulationStats};
use nalgebra::{Point3, Vector3};
use owo_colors::OwoColorize;

/// Run the grasper/floor scene headless.
#[derive(Parser, Debug)]
#[command(name = "grasper-floor")]
#[command(
    about = "Grasper against a rigid floor with an emulated haptic device",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Number of ticks to run
    #[arg(long, default_value_t = 300)]
    ticks: u64,

    /// How far below the floor surface the device pushes the jaw tips
    #[arg(long, default_value_t = 5.0)]
    depth: f64,

    /// Lowering speed of the device
    #[arg(long, default_value_t = 40.0)]
    speed: f64,

    /// Grip in [0, 1]
    #[arg(long, default_value_t = 0.0)]
    grip: f64,

    /// Unplug the device after this many samples
    #[arg(long)]
    disconnect_after: Option<usize>,

    /// Sample the device on its own 1 kHz thread
    #[arg(long)]
    threaded: bool,

    /// Pace ticks at the scene rate instead of running flat out
    #[arg(long)]
    realtime: bool,

    /// Print a line every this many ticks (0 to disable)
    #[arg(long, default_value_t = 25)]
    every: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if !(0.0..=1.0).contains(&cli.grip) {
        bail!("grip must be in [0, 1], got {}", cli.grip);
    }
    if cli.speed <= 0.0 {
        bail!("speed must be positive, got {}", cli.speed);
    }

    let config = SceneConfig::reference_grasper_floor();
    let jaws = config.tool.jaws;
    let tip_offset = jaws.shaft_length / 2.0 + jaws.jaw_length;
    let start = Point3::new(-200.0, 0.0, tip_offset + 10.0);
    let travel = 10.0 + cli.depth;
    let duration = travel / cli.speed;
    let velocity = Vector3::new(0.0, 0.0, -cli.speed);
    let emulator =
        EmulatedDevice::linear(start, velocity, duration, cli.grip).with_name("grasper-emulator");
    let emulator = match cli.disconnect_after {
        Some(n) => emulator.disconnect_after(n),
        None => emulator,
    };
    let log = emulator.force_log();

    print_header(&config, &cli);

    let runner = |scene: &mut HapticScene| {
        let runner = FixedStepRunner::for_scene(scene);
        let runner = if cli.realtime { runner } else { runner.unpaced() };
        runner.run_for(scene, cli.ticks, |report| {
            if cli.every > 0 && report.tick % cli.every == 0 {
                let status = match report.device_status {
                    DeviceStatus::Connected => "connected".green().to_string(),
                    DeviceStatus::Stale => "stale".yellow().to_string(),
                    DeviceStatus::Disconnected => "disconnected".red().to_string(),
                };
                println!(
                    "  {:>5}  {:>6.2}s  {:>2} contacts  force [{:>7.3} {:>7.3} {:>7.3}]  {}",
                    report.tick,
                    report.time,
                    report.contacts(),
                    report.feedback.force.x,
                    report.feedback.force.y,
                    report.feedback.force.z,
                    status,
                );
            }
        })
    };

    let (summary, stats) = if cli.threaded {
        let (mut link, pump) = device_link(LinkConfig::default()).context("invalid device link")?;
        let device_thread = pump
            .spawn(emulator.with_period(0.001))
            .context("failed to start the device thread")?;
        wait_for_first_sample(&mut link)?;

        let mut scene = SceneBuilder::new(config)
            .with_device(link)
            .build()
            .context("failed to build the scene")?;
        let summary = runner(&mut scene);
        let pump_stats = device_thread.stop().context("device thread failed")?;
        println!(
            "  device loop: {} iterations, {} samples, {} forces, {} overruns",
            pump_stats.loops, pump_stats.samples, pump_stats.forces_written, pump_stats.overruns
        );
        (summary, scene.stats().clone())
    } else {
        let mut scene = SceneBuilder::new(config)
            .with_device(PolledDevice::new(emulator))
            .build()
            .context("failed to build the scene")?;
        let summary = runner(&mut scene);
        (summary, scene.stats().clone())
    };

    print_summary(&stats, summary.overruns, summary.wall_time, &log);
    Ok(())
}

fn wait_for_first_sample(link: &mut impl DeviceInterface) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(2);
    while link.status() == DeviceStatus::Disconnected {
        if Instant::now() > deadline {
            bail!("device produced no sample within 2 s");
        }
        thread::sleep(Duration::from_millis(1));
    }
    link.sample();
    Ok(())
}

fn print_header(config: &SceneConfig, cli: &Cli) {
    println!();
    println!("{}", "Grasper / Floor_01".bold());
    println!("{}", "==================".bold());
    println!(
        "  dt {} s, alarm {}, contact {}, mu {:.3}, depth {}, grip {}",
        config.timestep(),
        config.proximity.alarm_distance,
        config.proximity.contact_distance,
        config.proximity.friction_coefficient,
        cli.depth,
        cli.grip,
    );
    println!();
}

fn print_summary(stats: &SimulationStats, overruns: u64, wall: Duration, log: &ForceLog) {
    let count = |n: u64| {
        if n == 0 {
            n.to_string().green().to_string()
        } else {
            n.to_string().yellow().to_string()
        }
    };

    println!();
    println!("{}", "Summary".bold());
    println!("  ticks                 {}", stats.ticks);
    println!("  ticks in contact      {}", stats.contact_ticks);
    println!("  mean solver sweeps    {:.1}", stats.mean_iterations());
    println!("  non-converged solves  {}", count(stats.non_converged_solves));
    println!("  deadline misses       {}", count(stats.deadline_misses));
    println!("  degenerate normals    {}", count(stats.degenerate_normals));
    println!("  correction events     {}", count(stats.correction_events));
    println!("  jaw limit clamps      {}", count(stats.soft_limit_events));
    println!("  disconnected ticks    {}", count(stats.disconnected_ticks));
    println!("  max penetration       {:.4}", stats.max_penetration);
    println!(
        "  tick time             mean {:?}, max {:?}",
        stats.mean_tick_time(),
        stats.max_tick_time
    );
    println!("  overruns              {}", count(overruns));
    println!("  wall time             {wall:?}");
    println!("  forces rendered       {} ({} releases)", log.len(), log.releases());
    if let Some(last) = log.last() {
        println!(
            "  last force            [{:.3} {:.3} {:.3}]",
            last.force.x, last.force.y, last.force.z
        );
    }
    println!();

    if stats.is_clean() {
        println!("{}", "✓ no anomalies".green());
    } else {
        println!("{}", "! anomalies were absorbed, see counters above".yellow());
    }
}
