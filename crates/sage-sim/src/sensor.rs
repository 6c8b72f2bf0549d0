//! Noisy sensor synthesis over a ground-truth trajectory: per-module
//! wheel measurements, gyro heading, and delayed vision fixes.

use crate::sim::SimResult;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use sage_core::geometry::{Pose2d, Rotation2d};
use sage_core::kinematics::{ModuleState, SwerveKinematics};
use sage_core::state_space;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub noise_scale: f64,
    /// Gyro heading noise, radians.
    pub gyro_noise_std: f64,
    /// Wheel speed noise, m/s.
    pub wheel_speed_noise_std: f64,
    /// Module steering angle noise, radians.
    pub wheel_angle_noise_std: f64,
    /// Vision translation noise, meters.
    pub vision_translation_noise_std: f64,
    /// Vision heading noise, radians.
    pub vision_heading_noise_std: f64,
    /// Seconds between vision captures.
    pub vision_period_seconds: f64,
    /// Processing delay between capture and arrival.
    pub vision_latency_seconds: f64,
    pub seed: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            noise_scale: 1.0,
            gyro_noise_std: 0.005,
            wheel_speed_noise_std: 0.05,
            wheel_angle_noise_std: 0.01,
            vision_translation_noise_std: 0.03,
            vision_heading_noise_std: 0.02,
            vision_period_seconds: 0.25,
            vision_latency_seconds: 0.15,
            seed: 42,
        }
    }
}

/// One delayed absolute-pose measurement: captured at one time, usable
/// only once it arrives at another.
#[derive(Debug, Clone, Copy)]
pub struct VisionFix {
    pub capture_time: f64,
    pub arrival_time: f64,
    pub pose: Pose2d,
}

pub struct SensorData {
    pub time: Vec<f64>,
    pub gyro_angles: Vec<Rotation2d>,
    pub module_states: Vec<[ModuleState; 4]>,
    /// Sorted by arrival time.
    pub vision_fixes: Vec<VisionFix>,
}

pub fn generate_sensor_data(
    sim: &SimResult,
    kinematics: &SwerveKinematics<4>,
    cfg: &SensorConfig,
) -> SensorData {
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let d_gyro = Normal::new(0.0, cfg.noise_scale * cfg.gyro_noise_std).unwrap();
    let d_speed = Normal::new(0.0, cfg.noise_scale * cfg.wheel_speed_noise_std).unwrap();
    let d_angle = Normal::new(0.0, cfg.noise_scale * cfg.wheel_angle_noise_std).unwrap();
    let vision_std = Vector3::new(
        cfg.noise_scale * cfg.vision_translation_noise_std,
        cfg.noise_scale * cfg.vision_translation_noise_std,
        cfg.noise_scale * cfg.vision_heading_noise_std,
    );

    let n = sim.time.len();
    let mut data = SensorData {
        time: sim.time.clone(),
        gyro_angles: Vec::with_capacity(n),
        module_states: Vec::with_capacity(n),
        vision_fixes: Vec::new(),
    };

    let mut next_vision_capture = cfg.vision_period_seconds;

    for i in 0..n {
        let t = sim.time[i];
        let truth = sim.poses[i];

        // Gyro heading.
        let heading = truth.rotation().radians() + d_gyro.sample(&mut rng);
        data.gyro_angles.push(Rotation2d::new(heading));

        // Wheel measurements from the true chassis motion.
        let mut modules = kinematics.to_module_states(&sim.chassis_speeds[i]);
        for module in modules.iter_mut() {
            module.speed += d_speed.sample(&mut rng);
            module.angle = module.angle + Rotation2d::new(d_angle.sample(&mut rng));
        }
        data.module_states.push(modules);

        // Vision sees the true pose but reports it late.
        if t >= next_vision_capture {
            next_vision_capture += cfg.vision_period_seconds;
            let noise = state_space::white_noise_vector(&vision_std, &mut rng);
            data.vision_fixes.push(VisionFix {
                capture_time: t,
                arrival_time: t + cfg.vision_latency_seconds,
                pose: Pose2d::from_xy_theta(
                    truth.translation().x() + noise[0],
                    truth.translation().y() + noise[1],
                    truth.rotation().radians() + noise[2],
                ),
            });
        }
    }

    data
}
