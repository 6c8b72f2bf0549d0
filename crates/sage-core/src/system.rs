//! Continuous linear(ized) plant model with a pluggable input clamp and a
//! one-step actuation delay on the stored input.

use crate::discretization;
use nalgebra::{SMatrix, SVector};

/// Input-clamping policy applied to every input vector before it enters a
/// matrix product. Stored as a replaceable closure so callers can swap
/// policies at runtime without a type hierarchy.
pub type InputClamp<const INPUTS: usize> =
    Box<dyn Fn(&SVector<f64, INPUTS>) -> SVector<f64, INPUTS> + Send>;

/// A plant modeled as the continuous linear system
///
/// `x' = A x + B u`, `y = C x + D u`.
///
/// The model holds its own state and output vectors, plus the input that
/// was applied on the previous step: predict and update are computed as
/// "last input, current state" to model actuation delay in a real control
/// loop, where the previously issued command is what was physically in
/// effect during the step being integrated.
pub struct LinearSystem<const STATES: usize, const INPUTS: usize, const OUTPUTS: usize> {
    /// Continuous system matrix.
    a: SMatrix<f64, STATES, STATES>,
    /// Continuous input matrix.
    b: SMatrix<f64, STATES, INPUTS>,
    /// Output matrix.
    c: SMatrix<f64, OUTPUTS, STATES>,
    /// Feedthrough matrix.
    d: SMatrix<f64, OUTPUTS, INPUTS>,

    clamp: InputClamp<INPUTS>,

    /// State vector.
    x: SVector<f64, STATES>,
    /// Output vector.
    y: SVector<f64, OUTPUTS>,
    /// Input applied on the previous step.
    delayed_u: SVector<f64, INPUTS>,
}

impl<const STATES: usize, const INPUTS: usize, const OUTPUTS: usize>
    LinearSystem<STATES, INPUTS, OUTPUTS>
{
    /// Constructs a plant from the four system matrices and an input clamp.
    pub fn new(
        a: SMatrix<f64, STATES, STATES>,
        b: SMatrix<f64, STATES, INPUTS>,
        c: SMatrix<f64, OUTPUTS, STATES>,
        d: SMatrix<f64, OUTPUTS, INPUTS>,
        clamp: InputClamp<INPUTS>,
    ) -> Self {
        Self {
            a,
            b,
            c,
            d,
            clamp,
            x: SVector::zeros(),
            y: SVector::zeros(),
            delayed_u: SVector::zeros(),
        }
    }

    /// Zeroes the state, output, and delayed input.
    pub fn reset(&mut self) {
        self.x = SVector::zeros();
        self.y = SVector::zeros();
        self.delayed_u = SVector::zeros();
    }

    pub fn a(&self) -> &SMatrix<f64, STATES, STATES> {
        &self.a
    }

    pub fn b(&self) -> &SMatrix<f64, STATES, INPUTS> {
        &self.b
    }

    pub fn c(&self) -> &SMatrix<f64, OUTPUTS, STATES> {
        &self.c
    }

    pub fn d(&self) -> &SMatrix<f64, OUTPUTS, INPUTS> {
        &self.d
    }

    pub fn x(&self) -> &SVector<f64, STATES> {
        &self.x
    }

    pub fn set_x(&mut self, x: SVector<f64, STATES>) {
        self.x = x;
    }

    pub fn y(&self) -> &SVector<f64, OUTPUTS> {
        &self.y
    }

    pub fn set_y(&mut self, y: SVector<f64, OUTPUTS>) {
        self.y = y;
    }

    /// The clamped input applied on the previous step.
    pub fn u(&self) -> SVector<f64, INPUTS> {
        self.clamp_input(&self.delayed_u)
    }

    /// Replaces the input-clamping policy.
    pub fn set_clamp(&mut self, clamp: InputClamp<INPUTS>) {
        self.clamp = clamp;
    }

    /// Applies the clamping policy to an input vector.
    pub fn clamp_input(&self, u: &SVector<f64, INPUTS>) -> SVector<f64, INPUTS> {
        (self.clamp)(u)
    }

    /// Advances the internal state and output using the input stored from
    /// the previous step, then stores `u` for the next one.
    pub fn update(&mut self, x: SVector<f64, STATES>, u: SVector<f64, INPUTS>, dt_seconds: f64)
    where
        nalgebra::Const<STATES>:
            nalgebra::DimMin<nalgebra::Const<STATES>, Output = nalgebra::Const<STATES>>,
    {
        let delayed_u = self.delayed_u;
        self.x = self.calculate_x(&x, &delayed_u, dt_seconds);
        let x = self.x;
        self.y = self.calculate_y(&x, &delayed_u);
        self.delayed_u = u;
    }

    /// Computes the next state from the current state and control input.
    ///
    /// Used by state observers directly to run updates on the state
    /// estimate.
    pub fn calculate_x(
        &self,
        x: &SVector<f64, STATES>,
        u: &SVector<f64, INPUTS>,
        dt_seconds: f64,
    ) -> SVector<f64, STATES>
    where
        nalgebra::Const<STATES>:
            nalgebra::DimMin<nalgebra::Const<STATES>, Output = nalgebra::Const<STATES>>,
    {
        let (disc_a, disc_b) = discretization::discretize_ab_taylor(&self.a, &self.b, dt_seconds);
        disc_a * x + disc_b * self.clamp_input(u)
    }

    /// Computes the output for the given state and control input. The
    /// output equation is algebraic, so no discretization is involved.
    pub fn calculate_y(
        &self,
        x: &SVector<f64, STATES>,
        u: &SVector<f64, INPUTS>,
    ) -> SVector<f64, OUTPUTS> {
        self.c * x + self.d * self.clamp_input(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_space;
    use nalgebra::{Matrix3, Vector3};

    const DT: f64 = 0.02;

    fn integrator_plant() -> LinearSystem<3, 3, 3> {
        LinearSystem::new(
            Matrix3::zeros(),
            Matrix3::identity(),
            Matrix3::identity(),
            Matrix3::zeros(),
            Box::new(|u| *u),
        )
    }

    #[test]
    fn test_calculate_x_integrates_input() {
        let plant = integrator_plant();
        let x = plant.calculate_x(&Vector3::zeros(), &Vector3::new(1.0, 0.0, 0.0), DT);
        assert!((x - Vector3::new(DT, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_update_uses_delayed_input() {
        let mut plant = integrator_plant();
        let u = Vector3::new(1.0, 2.0, 3.0);

        // First update integrates the initial (zero) delayed input, so the
        // state must not move yet.
        plant.update(*plant.x(), u, DT);
        assert!(plant.x().norm() < 1e-12);

        // The second update integrates the input stored by the first.
        plant.update(*plant.x(), Vector3::zeros(), DT);
        assert!((plant.x() - u * DT).norm() < 1e-12);
    }

    #[test]
    fn test_reset_zeroes_delayed_input() {
        let mut plant = integrator_plant();
        plant.update(*plant.x(), Vector3::new(5.0, 0.0, 0.0), DT);
        plant.reset();
        plant.update(*plant.x(), Vector3::zeros(), DT);
        assert!(plant.x().norm() < 1e-12);
    }

    #[test]
    fn test_clamp_replaceable_at_runtime() {
        let mut plant = integrator_plant();
        plant.set_clamp(Box::new(|u| state_space::normalize_input_vector(u, 1.0)));

        // Direction is preserved when the whole vector is scaled down.
        let clamped = plant.clamp_input(&Vector3::new(3.0, 4.0, 0.0));
        assert!((clamped - Vector3::new(0.75, 1.0, 0.0)).norm() < 1e-12);

        plant.set_clamp(Box::new(|u| {
            state_space::clamp_input_max_magnitude(
                u,
                &Vector3::from_element(-1.0),
                &Vector3::from_element(1.0),
            )
        }));

        // Per-element clamping distorts the direction instead.
        let clamped = plant.clamp_input(&Vector3::new(3.0, 4.0, 0.0));
        assert!((clamped - Vector3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
    }
}
