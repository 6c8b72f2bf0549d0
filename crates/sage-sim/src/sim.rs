//! Ground-truth trajectory generation for a planar swerve robot.

use sage_core::geometry::{Pose2d, Rotation2d, Translation2d};
use sage_core::kinematics::ChassisSpeeds;
use serde::{Deserialize, Serialize};

/// Drive-cycle parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    pub duration_seconds: f64,
    pub dt_seconds: f64,
    /// Cruise speed along the body x axis, m/s.
    pub cruise_speed: f64,
    /// Yaw rate held through the turning phase, rad/s.
    pub turn_rate: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            duration_seconds: 10.0,
            dt_seconds: 0.02,
            cruise_speed: 1.5,
            turn_rate: 0.5,
        }
    }
}

/// Ground truth produced by the simulator: the robot's pose and the
/// body-frame chassis velocity actually driven at each step.
#[derive(Debug, Clone)]
pub struct SimResult {
    pub time: Vec<f64>,
    pub poses: Vec<Pose2d>,
    pub chassis_speeds: Vec<ChassisSpeeds>,
}

/// The module layout shared by the simulator and the estimator run.
pub fn standard_module_layout() -> [Translation2d; 4] {
    [
        Translation2d::new(0.3, 0.3),
        Translation2d::new(0.3, -0.3),
        Translation2d::new(-0.3, 0.3),
        Translation2d::new(-0.3, -0.3),
    ]
}

/// Commanded body-frame chassis speeds at time `t` for a drive cycle of
/// the given length: ramp up, cruise, sweep a turn, straighten out, and
/// ramp back down.
fn drive_cycle(params: &SimParams, t: f64) -> ChassisSpeeds {
    let frac = t / params.duration_seconds;
    let v = params.cruise_speed;

    if frac < 0.2 {
        ChassisSpeeds::new(v * (frac / 0.2), 0.0, 0.0)
    } else if frac < 0.55 {
        ChassisSpeeds::new(v, 0.0, params.turn_rate)
    } else if frac < 0.9 {
        ChassisSpeeds::new(v, 0.0, -0.5 * params.turn_rate)
    } else {
        ChassisSpeeds::new(v * ((1.0 - frac) / 0.1), 0.0, 0.0)
    }
}

/// Integrates the drive cycle into a ground-truth trajectory.
pub fn simulate(params: &SimParams) -> SimResult {
    let steps = (params.duration_seconds / params.dt_seconds).round() as usize;

    let mut result = SimResult {
        time: Vec::with_capacity(steps),
        poses: Vec::with_capacity(steps),
        chassis_speeds: Vec::with_capacity(steps),
    };

    let mut x = 0.0;
    let mut y = 0.0;
    let mut heading = 0.0;

    for i in 0..steps {
        let t = i as f64 * params.dt_seconds;
        let speeds = drive_cycle(params, t);

        result.time.push(t);
        result
            .poses
            .push(Pose2d::from_xy_theta(x, y, heading));
        result.chassis_speeds.push(speeds);

        // Body-frame velocity rotated into the field frame.
        let field = Translation2d::new(speeds.vx, speeds.vy).rotate_by(&Rotation2d::new(heading));
        x += field.x() * params.dt_seconds;
        y += field.y() * params.dt_seconds;
        heading += speeds.omega * params.dt_seconds;
    }

    result
}
