//! Latency-compensated pose estimation for a swerve drivetrain.
//!
//! Wraps a Kalman filter to fuse wheel-odometry velocities and the gyro
//! heading every control tick, while delayed vision fixes are blended in
//! retroactively through the latency compensator. With no vision fixes
//! this behaves like plain encoder odometry, with smoothing.
//!
//! The state-space system is
//!
//! - `x = [x, y, theta]` in field coordinates,
//! - `u = [vx, vy, omega]` in field coordinates,
//! - `y = [theta]` from the gyro each tick, or `y = [x, y, theta]` from
//!   vision.

use crate::clock::MonotonicClock;
use crate::discretization;
use crate::geometry::{Pose2d, Rotation2d, Translation2d};
use crate::kinematics::{Kinematics, ModuleState, SwerveKinematics};
use crate::latency::LatencyCompensator;
use crate::observer::KalmanFilter;
use crate::state_space;
use crate::system::LinearSystem;
use nalgebra::{Matrix3, SMatrix, Vector1, Vector3};

/// Fuses swerve odometry, gyro heading, and delayed vision measurements
/// into a field-relative pose estimate.
///
/// [`SwervePoseEstimator::update`] should be called every loop;
/// [`SwervePoseEstimator::add_vision_measurement`] as often (or rarely)
/// as fixes arrive.
pub struct SwervePoseEstimator<const MODULES: usize> {
    observer: KalmanFilter<3, 3, 1>,
    kinematics: SwerveKinematics<MODULES>,
    latency_compensator: LatencyCompensator<3, 3, 1>,
    /// Discretized vision measurement covariance, used with an identity
    /// output matrix whenever a vision correction is applied.
    vision_disc_r: Matrix3<f64>,

    nominal_dt_seconds: f64,
    prev_time_seconds: Option<f64>,
    clock: MonotonicClock,

    gyro_offset: Rotation2d,
    previous_angle: Rotation2d,
}

impl<const MODULES: usize> SwervePoseEstimator<MODULES> {
    /// Constructs the estimator.
    ///
    /// `state_std_devs` tunes trust in the wheel/gyro velocity model,
    /// `local_measurement_std_devs` trust in the gyro heading, and
    /// `vision_measurement_std_devs` trust in vision poses; increase a
    /// vector to trust that source less.
    pub fn new(
        gyro_angle: Rotation2d,
        initial_pose: Pose2d,
        kinematics: SwerveKinematics<MODULES>,
        state_std_devs: &Vector3<f64>,
        local_measurement_std_devs: &Vector1<f64>,
        vision_measurement_std_devs: &Vector3<f64>,
        nominal_dt_seconds: f64,
    ) -> Self {
        // The pose plant is a pure integrator driven by field-relative
        // velocities; only the heading is directly measured each tick.
        let observer_system = LinearSystem::new(
            Matrix3::zeros(),
            Matrix3::identity(),
            SMatrix::<f64, 1, 3>::new(0.0, 0.0, 1.0),
            SMatrix::<f64, 1, 3>::zeros(),
            Box::new(|u| *u),
        );
        let mut observer = KalmanFilter::new(
            observer_system,
            state_std_devs,
            local_measurement_std_devs,
            nominal_dt_seconds,
        );
        observer.set_x_hat(state_space::pose_to_vector(&initial_pose));

        let vision_cont_r = state_space::make_covariance_matrix(vision_measurement_std_devs);
        let vision_disc_r = discretization::discretize_r(&vision_cont_r, nominal_dt_seconds);

        Self {
            observer,
            kinematics,
            latency_compensator: LatencyCompensator::new(),
            vision_disc_r,
            nominal_dt_seconds,
            prev_time_seconds: None,
            clock: MonotonicClock::new(),
            gyro_offset: initial_pose.rotation() - gyro_angle,
            previous_angle: initial_pose.rotation(),
        }
    }

    /// The current pose estimate.
    pub fn estimated_position(&self) -> Pose2d {
        let x_hat = self.observer.x_hat();
        Pose2d::from_xy_theta(x_hat[0], x_hat[1], x_hat[2])
    }

    /// Resets the robot's field position.
    ///
    /// Wheel encoders must be reset to zero alongside this call; the gyro
    /// does not need to be, its offset is recomputed here.
    pub fn reset_position(&mut self, pose: Pose2d, gyro_angle: Rotation2d) {
        self.observer.set_x_hat(state_space::pose_to_vector(&pose));
        self.latency_compensator.clear();
        self.previous_angle = pose.rotation();
        self.gyro_offset = pose.rotation() - gyro_angle;
    }

    /// Fuses a vision-measured robot pose captured at `timestamp_seconds`
    /// (same epoch as the update timestamps). The correction lands at the
    /// right point in history however stale the fix is.
    pub fn add_vision_measurement(&mut self, vision_pose: Pose2d, timestamp_seconds: f64) {
        let y = state_space::pose_to_vector(&vision_pose);
        let vision_r = self.vision_disc_r;
        self.latency_compensator.apply_past_global_measurement(
            &mut self.observer,
            self.nominal_dt_seconds,
            &y,
            |observer, u, y| {
                observer.correct_with(u, y, &Matrix3::identity(), &Matrix3::zeros(), &vision_r)
            },
            timestamp_seconds,
        );
    }

    /// Updates the estimate from this loop tick's measurements, stamped
    /// with the estimator's own monotonic clock.
    pub fn update(
        &mut self,
        gyro_angle: Rotation2d,
        module_states: &[ModuleState; MODULES],
    ) -> Pose2d {
        self.update_with_time(self.clock.now(), gyro_angle, module_states)
    }

    /// Updates the estimate from this loop tick's measurements at an
    /// explicit timestamp.
    pub fn update_with_time(
        &mut self,
        current_time_seconds: f64,
        gyro_angle: Rotation2d,
        module_states: &[ModuleState; MODULES],
    ) -> Pose2d {
        let dt = match self.prev_time_seconds {
            Some(prev) => current_time_seconds - prev,
            None => self.nominal_dt_seconds,
        };
        self.prev_time_seconds = Some(current_time_seconds);

        let angle = gyro_angle + self.gyro_offset;
        let omega = (angle - self.previous_angle).radians() / dt;

        let chassis_speeds = self.kinematics.to_chassis_speeds(module_states);
        let field_relative_velocity =
            Translation2d::new(chassis_speeds.vx, chassis_speeds.vy).rotate_by(&angle);

        let u = Vector3::new(
            field_relative_velocity.x(),
            field_relative_velocity.y(),
            omega,
        );
        self.previous_angle = angle;

        let local_y = Vector1::new(angle.radians());
        self.latency_compensator
            .add_observer_state(&self.observer, u, local_y, current_time_seconds);
        self.observer.predict(&u, dt);
        self.observer.correct(&u, &local_y);

        self.estimated_position()
    }
}
