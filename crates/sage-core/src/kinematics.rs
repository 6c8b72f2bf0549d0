//! Conversion between per-module wheel measurements and chassis-frame
//! velocity. The conversion is a pure function of the module layout.

use crate::geometry::{Rotation2d, Translation2d};
use nalgebra::{DMatrix, DVector, Vector3};

/// Robot-frame chassis velocity: linear x/y in meters per second and
/// angular rate in radians per second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChassisSpeeds {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl ChassisSpeeds {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }
}

/// One drive module's measured state: wheel speed along the module
/// direction and the module's steering angle in the robot frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModuleState {
    pub speed: f64,
    pub angle: Rotation2d,
}

impl ModuleState {
    pub fn new(speed: f64, angle: Rotation2d) -> Self {
        Self { speed, angle }
    }
}

/// Pure conversion from per-module readings to a chassis velocity.
pub trait Kinematics<const MODULES: usize> {
    fn to_chassis_speeds(&self, module_states: &[ModuleState; MODULES]) -> ChassisSpeeds;
}

/// Swerve-drive kinematics over a fixed module layout.
///
/// The inverse kinematics matrix maps `[vx, vy, omega]` to the stacked
/// per-module velocity components; its pseudoinverse (precomputed at
/// construction) solves the overdetermined forward problem in the
/// least-squares sense.
pub struct SwerveKinematics<const MODULES: usize> {
    inverse_kinematics: DMatrix<f64>,
    forward_kinematics: DMatrix<f64>,
    modules: [Translation2d; MODULES],
}

impl<const MODULES: usize> SwerveKinematics<MODULES> {
    /// Builds kinematics for modules at the given positions relative to
    /// the robot center.
    pub fn new(modules: [Translation2d; MODULES]) -> Self {
        let mut inverse_kinematics = DMatrix::zeros(MODULES * 2, 3);
        for (i, module) in modules.iter().enumerate() {
            inverse_kinematics[(i * 2, 0)] = 1.0;
            inverse_kinematics[(i * 2, 2)] = -module.y();
            inverse_kinematics[(i * 2 + 1, 1)] = 1.0;
            inverse_kinematics[(i * 2 + 1, 2)] = module.x();
        }
        let forward_kinematics = inverse_kinematics
            .clone()
            .pseudo_inverse(1e-9)
            .expect("pseudo-inverse with a non-negative epsilon cannot fail");
        Self {
            inverse_kinematics,
            forward_kinematics,
            modules,
        }
    }

    pub fn modules(&self) -> &[Translation2d; MODULES] {
        &self.modules
    }

    /// Computes the per-module states that realize the given chassis
    /// velocity.
    pub fn to_module_states(&self, speeds: &ChassisSpeeds) -> [ModuleState; MODULES] {
        let chassis = Vector3::new(speeds.vx, speeds.vy, speeds.omega);
        let module_velocities = &self.inverse_kinematics * chassis;

        let mut states = [ModuleState::default(); MODULES];
        for (i, state) in states.iter_mut().enumerate() {
            let vx = module_velocities[i * 2];
            let vy = module_velocities[i * 2 + 1];
            state.speed = vx.hypot(vy);
            state.angle = Rotation2d::new(vy.atan2(vx));
        }
        states
    }
}

impl<const MODULES: usize> Kinematics<MODULES> for SwerveKinematics<MODULES> {
    fn to_chassis_speeds(&self, module_states: &[ModuleState; MODULES]) -> ChassisSpeeds {
        let mut module_velocities = DVector::zeros(MODULES * 2);
        for (i, state) in module_states.iter().enumerate() {
            module_velocities[i * 2] = state.speed * state.angle.cos();
            module_velocities[i * 2 + 1] = state.speed * state.angle.sin();
        }
        let chassis = &self.forward_kinematics * module_velocities;
        ChassisSpeeds::new(chassis[0], chassis[1], chassis[2])
    }
}
