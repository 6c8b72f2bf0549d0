//! Plant-construction helpers: motor/gearbox algebra producing the
//! A/B/C/D matrices of common mechanisms.

use crate::state_space;
use crate::system::LinearSystem;
use nalgebra::{Matrix2, SMatrix};
use std::f64::consts::PI;

/// A DC motor (or gearbox of identical motors) reduced to its electrical
/// constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcMotor {
    pub nominal_voltage: f64,
    pub stall_torque_nm: f64,
    pub stall_current_amps: f64,
    pub free_current_amps: f64,
    /// Free speed in radians per second.
    pub free_speed: f64,
    /// Winding resistance in ohms.
    pub r_ohms: f64,
    /// Velocity constant in radians per second per volt.
    pub kv: f64,
    /// Torque constant in newton-meters per amp.
    pub kt: f64,
}

impl DcMotor {
    pub fn new(
        nominal_voltage: f64,
        stall_torque_nm: f64,
        stall_current_amps: f64,
        free_current_amps: f64,
        free_speed_rpm: f64,
    ) -> Self {
        let free_speed = free_speed_rpm * 2.0 * PI / 60.0;
        let r_ohms = nominal_voltage / stall_current_amps;
        Self {
            nominal_voltage,
            stall_torque_nm,
            stall_current_amps,
            free_current_amps,
            free_speed,
            r_ohms,
            kv: free_speed / (nominal_voltage - free_current_amps * r_ohms),
            kt: stall_torque_nm / stall_current_amps,
        }
    }

    pub fn cim(num_motors: f64) -> Self {
        Self::new(12.0, 2.42 * num_motors, 133.0 * num_motors, 2.7 * num_motors, 5310.0)
    }

    pub fn neo(num_motors: f64) -> Self {
        Self::new(12.0, 2.6 * num_motors, 105.0 * num_motors, 1.8 * num_motors, 5676.0)
    }
}

/// State-space model of an elevator: state `[position, velocity]`, input
/// voltage, output position.
pub fn elevator_system(
    motor: DcMotor,
    mass_kg: f64,
    drum_radius_m: f64,
    gearing: f64,
    max_voltage: f64,
) -> LinearSystem<2, 1, 1> {
    LinearSystem::new(
        Matrix2::new(
            0.0,
            1.0,
            0.0,
            -gearing.powi(2) * motor.kt
                / (motor.r_ohms * drum_radius_m * drum_radius_m * mass_kg * motor.kv),
        ),
        SMatrix::<f64, 2, 1>::new(
            0.0,
            gearing * motor.kt / (motor.r_ohms * drum_radius_m * mass_kg),
        ),
        SMatrix::<f64, 1, 2>::new(1.0, 0.0),
        SMatrix::<f64, 1, 1>::zeros(),
        Box::new(move |u| state_space::normalize_input_vector(u, max_voltage)),
    )
}

/// State-space model of a flywheel: state and output angular velocity,
/// input voltage.
pub fn flywheel_system(
    motor: DcMotor,
    moment_of_inertia: f64,
    gearing: f64,
    max_voltage: f64,
) -> LinearSystem<1, 1, 1> {
    LinearSystem::new(
        SMatrix::<f64, 1, 1>::new(
            -gearing * gearing * motor.kt / (motor.kv * motor.r_ohms * moment_of_inertia),
        ),
        SMatrix::<f64, 1, 1>::new(gearing * motor.kt / (motor.r_ohms * moment_of_inertia)),
        SMatrix::<f64, 1, 1>::identity(),
        SMatrix::<f64, 1, 1>::zeros(),
        Box::new(move |u| state_space::normalize_input_vector(u, max_voltage)),
    )
}

/// State-space model of a single-jointed arm: state `[angle, angular
/// velocity]`, input voltage, output angle.
pub fn single_jointed_arm_system(
    motor: DcMotor,
    moment_of_inertia: f64,
    gearing: f64,
    max_voltage: f64,
) -> LinearSystem<2, 1, 1> {
    LinearSystem::new(
        Matrix2::new(
            0.0,
            1.0,
            0.0,
            -gearing.powi(2) * motor.kt / (motor.kv * motor.r_ohms * moment_of_inertia),
        ),
        SMatrix::<f64, 2, 1>::new(0.0, gearing * motor.kt / (motor.r_ohms * moment_of_inertia)),
        SMatrix::<f64, 1, 2>::new(1.0, 0.0),
        SMatrix::<f64, 1, 1>::zeros(),
        Box::new(move |u| state_space::normalize_input_vector(u, max_voltage)),
    )
}

/// State-space model of a differential drivetrain's wheel velocities:
/// state, input, and output are `[left, right]`.
#[allow(clippy::too_many_arguments)]
pub fn drivetrain_velocity_system(
    motor: DcMotor,
    mass_kg: f64,
    wheel_radius_m: f64,
    track_radius_m: f64,
    moment_of_inertia: f64,
    gearing: f64,
    max_voltage: f64,
) -> LinearSystem<2, 2, 2> {
    let c1 = -gearing.powi(2) * motor.kt / (motor.kv * motor.r_ohms * wheel_radius_m.powi(2));
    let c2 = gearing * motor.kt / (motor.r_ohms * wheel_radius_m);
    let c3 = 1.0 / mass_kg + track_radius_m.powi(2) / moment_of_inertia;
    let c4 = 1.0 / mass_kg - track_radius_m.powi(2) / moment_of_inertia;

    LinearSystem::new(
        Matrix2::new(c3 * c1, c4 * c1, c4 * c1, c3 * c1),
        Matrix2::new(c3 * c2, c4 * c2, c4 * c2, c3 * c2),
        Matrix2::identity(),
        Matrix2::zeros(),
        Box::new(move |u| state_space::normalize_input_vector(u, max_voltage)),
    )
}

/// Velocity system from characterization constants kV
/// (volts per unit-per-second) and kA (volts per unit-per-second-squared).
pub fn identify_velocity_system(kv: f64, ka: f64, max_voltage: f64) -> LinearSystem<1, 1, 1> {
    LinearSystem::new(
        SMatrix::<f64, 1, 1>::new(-kv / ka),
        SMatrix::<f64, 1, 1>::new(1.0 / ka),
        SMatrix::<f64, 1, 1>::identity(),
        SMatrix::<f64, 1, 1>::zeros(),
        Box::new(move |u| state_space::normalize_input_vector(u, max_voltage)),
    )
}

/// Position system from characterization constants: state
/// `[position, velocity]`, output position.
pub fn identify_position_system(kv: f64, ka: f64, max_voltage: f64) -> LinearSystem<2, 1, 1> {
    LinearSystem::new(
        Matrix2::new(0.0, 1.0, 0.0, -kv / ka),
        SMatrix::<f64, 2, 1>::new(0.0, 1.0 / ka),
        SMatrix::<f64, 1, 2>::new(1.0, 0.0),
        SMatrix::<f64, 1, 1>::zeros(),
        Box::new(move |u| state_space::normalize_input_vector(u, max_voltage)),
    )
}

/// Differential drivetrain from linear and angular characterization
/// constants.
pub fn identify_drivetrain_system(
    kv_linear: f64,
    ka_linear: f64,
    kv_angular: f64,
    ka_angular: f64,
    max_voltage: f64,
) -> LinearSystem<2, 2, 2> {
    let c = 0.5 / (ka_linear * ka_angular);
    let a1 = c * (-ka_linear * kv_angular - kv_linear * ka_angular);
    let a2 = c * (ka_linear * kv_angular - kv_linear * ka_angular);
    let b1 = c * (ka_linear + ka_angular);
    let b2 = c * (ka_angular - ka_linear);

    LinearSystem::new(
        Matrix2::new(a1, a2, a2, a1),
        Matrix2::new(b1, b2, b2, b1),
        Matrix2::identity(),
        Matrix2::zeros(),
        Box::new(move |u| state_space::normalize_input_vector(u, max_voltage)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{SVector, Vector1};

    #[test]
    fn test_motor_constants() {
        let cim = DcMotor::cim(1.0);
        assert!((cim.r_ohms - 12.0 / 133.0).abs() < 1e-9);
        assert!((cim.kt - 2.42 / 133.0).abs() < 1e-9);
        assert!(cim.free_speed > 500.0 && cim.free_speed < 600.0);
    }

    #[test]
    fn test_flywheel_spins_up_toward_steady_state() {
        let mut plant = flywheel_system(DcMotor::neo(1.0), 0.00032, 1.0, 12.0);
        let u = Vector1::new(12.0);
        let mut x = SVector::<f64, 1>::zeros();
        for _ in 0..500 {
            x = plant.calculate_x(&x, &u, 0.02);
        }
        // At full voltage the wheel settles near the motor's free speed.
        assert!(x[0] > 0.8 * DcMotor::neo(1.0).free_speed);
        assert!(x[0] < 1.05 * DcMotor::neo(1.0).free_speed);

        plant.update(x, u, 0.02);
        assert!(plant.y()[0] > 0.0);
    }

    #[test]
    fn test_input_above_limit_is_normalized() {
        let plant = elevator_system(DcMotor::neo(2.0), 5.0, 0.02, 10.0, 12.0);
        let clamped = plant.clamp_input(&Vector1::new(30.0));
        assert!((clamped[0] - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_arm_angle_rises_under_positive_voltage() {
        let plant = single_jointed_arm_system(DcMotor::neo(1.0), 0.5, 50.0, 12.0);
        let u = Vector1::new(6.0);
        let mut x = SVector::<f64, 2>::zeros();
        for _ in 0..100 {
            x = plant.calculate_x(&x, &u, 0.02);
        }
        assert!(x[0] > 0.0);
        assert!(x[1] > 0.0);
    }

    #[test]
    fn test_drivetrain_symmetry() {
        let plant =
            drivetrain_velocity_system(DcMotor::cim(2.0), 60.0, 0.08, 0.6, 10.0, 8.0, 12.0);

        // Equal voltages drive both sides identically.
        let mut x = SVector::<f64, 2>::zeros();
        for _ in 0..200 {
            x = plant.calculate_x(&x, &nalgebra::Vector2::new(6.0, 6.0), 0.02);
        }
        assert!(x[0] > 0.1);
        assert!((x[0] - x[1]).abs() < 1e-9);

        // Opposite voltages spin the sides opposite ways.
        let mut x = SVector::<f64, 2>::zeros();
        for _ in 0..200 {
            x = plant.calculate_x(&x, &nalgebra::Vector2::new(6.0, -6.0), 0.02);
        }
        assert!((x[0] + x[1]).abs() < 1e-9);
    }

    #[test]
    fn test_identified_drivetrain_is_stable() {
        let plant = identify_drivetrain_system(1.98, 0.2, 1.5, 0.3, 12.0);
        // Both decoupled modes (sum and difference of wheel speeds) decay.
        let eigenvalues = plant.a().symmetric_eigenvalues();
        assert!(eigenvalues[0] < 0.0);
        assert!(eigenvalues[1] < 0.0);
    }

    #[test]
    fn test_identified_velocity_system_tracks_kv() {
        // In steady state at voltage V the velocity settles at V / kV.
        let plant = identify_velocity_system(2.0, 0.5, 12.0);
        let u = Vector1::new(6.0);
        let mut x = SVector::<f64, 1>::zeros();
        for _ in 0..1000 {
            x = plant.calculate_x(&x, &u, 0.02);
        }
        assert!((x[0] - 3.0).abs() < 1e-6);
    }
}
