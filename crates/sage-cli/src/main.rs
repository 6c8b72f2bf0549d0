//! Sage - latency-compensated pose estimation, run against a simulated
//! swerve drive cycle.

use anyhow::Result;
use clap::Parser;
use sage_sim::{
    generate_sensor_data, run_estimator, simulate, standard_module_layout, EstimatorConfig,
    RunResult, SensorConfig, SimParams,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sage-cli")]
#[command(about = "Pose-estimator simulation for the sage toolkit")]
#[command(version)]
struct Args {
    /// Output directory
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    // ── Drive cycle ───────────────────────────────────────────
    #[arg(long, default_value_t = 10.0)]
    duration: f64,

    #[arg(long, default_value_t = 0.02)]
    dt: f64,

    #[arg(long, default_value_t = 1.5)]
    cruise_speed: f64,

    #[arg(long, default_value_t = 0.5)]
    turn_rate: f64,

    // ── Sensor options ────────────────────────────────────────
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 1.0)]
    noise_scale: f64,

    #[arg(long, default_value_t = 0.25)]
    vision_period: f64,

    #[arg(long, default_value_t = 0.15)]
    vision_latency: f64,

    /// Disable vision fixes entirely (pure odometry)
    #[arg(long)]
    no_vision: bool,

    // ── Estimator tuning ──────────────────────────────────────
    #[arg(long, default_value_t = 0.1)]
    state_std: f64,

    #[arg(long, default_value_t = 0.05)]
    heading_state_std: f64,

    #[arg(long, default_value_t = 0.005)]
    gyro_std: f64,

    #[arg(long, default_value_t = 0.05)]
    vision_std: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let sim_params = SimParams {
        duration_seconds: args.duration,
        dt_seconds: args.dt,
        cruise_speed: args.cruise_speed,
        turn_rate: args.turn_rate,
    };
    info!(
        duration = sim_params.duration_seconds,
        dt = sim_params.dt_seconds,
        "simulating drive cycle"
    );
    let sim = simulate(&sim_params);

    let sensor_cfg = SensorConfig {
        noise_scale: args.noise_scale,
        vision_period_seconds: args.vision_period,
        vision_latency_seconds: args.vision_latency,
        seed: args.seed,
        ..Default::default()
    };
    let kinematics = sage_core::SwerveKinematics::new(standard_module_layout());
    let mut sensors = generate_sensor_data(&sim, &kinematics, &sensor_cfg);
    if args.no_vision {
        sensors.vision_fixes.clear();
    }
    info!(
        ticks = sensors.time.len(),
        vision_fixes = sensors.vision_fixes.len(),
        "generated sensor stream"
    );

    let estimator_cfg = EstimatorConfig {
        state_std_devs: [args.state_std, args.state_std, args.heading_state_std],
        local_measurement_std_dev: args.gyro_std,
        vision_measurement_std_devs: [args.vision_std, args.vision_std, args.vision_std],
        nominal_dt_seconds: args.dt,
    };
    let result = run_estimator(&sim, &sensors, &estimator_cfg);

    write_trace(&args.output_dir, &result)?;

    let summary = serde_json::to_string_pretty(&result.summary)?;
    std::fs::write(args.output_dir.join("summary.json"), &summary)?;

    info!(
        rms_position_error = result.summary.rms_position_error,
        rms_heading_error = result.summary.rms_heading_error,
        vision_fixes = result.summary.vision_fix_count,
        "run complete"
    );
    println!("{summary}");

    Ok(())
}

fn write_trace(output_dir: &Path, result: &RunResult) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join("trace.csv");

    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record([
        "time", "true_x", "true_y", "true_theta", "est_x", "est_y", "est_theta",
    ])?;
    for i in 0..result.time.len() {
        let truth = result.truth[i];
        let est = result.estimated[i];
        writer.write_record(&[
            format!("{:.4}", result.time[i]),
            format!("{:.6}", truth.translation().x()),
            format!("{:.6}", truth.translation().y()),
            format!("{:.6}", truth.rotation().radians()),
            format!("{:.6}", est.translation().x()),
            format!("{:.6}", est.translation().y()),
            format!("{:.6}", est.rotation().radians()),
        ])?;
    }
    writer.flush()?;

    info!(path = %path.display(), "wrote estimator trace");
    Ok(())
}
