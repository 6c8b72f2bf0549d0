//! Steady-state-seeded Kalman filter over a linear plant.
//!
//! The filter fuses noisy control inputs and measurements into a state
//! estimate. The Kalman gain weighs model against measurement so the sum
//! of squared estimation error is minimized; the gain is recomputed from
//! the evolving error covariance on every correction, and the covariance
//! is seeded from the steady-state Riccati solution so the filter starts
//! near its converged behavior instead of relearning it.

use crate::discretization;
use crate::numerics;
use crate::state_space;
use crate::system::LinearSystem;
use nalgebra::{SMatrix, SVector};

/// A Kalman filter owning its plant model.
///
/// Not internally synchronized; callers running a control loop and an
/// asynchronous measurement producer must serialize access externally.
pub struct KalmanFilter<const STATES: usize, const INPUTS: usize, const OUTPUTS: usize> {
    plant: LinearSystem<STATES, INPUTS, OUTPUTS>,

    /// Error covariance matrix.
    p: SMatrix<f64, STATES, STATES>,
    /// Continuous process noise covariance matrix.
    cont_q: SMatrix<f64, STATES, STATES>,
    /// Continuous measurement noise covariance matrix.
    cont_r: SMatrix<f64, OUTPUTS, OUTPUTS>,
    /// Discrete measurement noise covariance matrix, refreshed whenever
    /// the prediction timestep changes.
    disc_r: SMatrix<f64, OUTPUTS, OUTPUTS>,
}

impl<const STATES: usize, const INPUTS: usize, const OUTPUTS: usize>
    KalmanFilter<STATES, INPUTS, OUTPUTS>
{
    /// Constructs a state observer for the given plant.
    ///
    /// `state_std_devs` and `measurement_std_devs` are per-state and
    /// per-output standard deviations; both noise covariances are built
    /// diagonal from their squares. When the discretized `(A^T, C^T)`
    /// pair is stabilizable and there are no more outputs than states,
    /// the error covariance is seeded with the steady-state Riccati
    /// solution; otherwise it starts at zero, meaning "no informative
    /// prior" rather than a failure.
    pub fn new(
        plant: LinearSystem<STATES, INPUTS, OUTPUTS>,
        state_std_devs: &SVector<f64, STATES>,
        measurement_std_devs: &SVector<f64, OUTPUTS>,
        nominal_dt_seconds: f64,
    ) -> Self
    where
        nalgebra::Const<STATES>:
            nalgebra::DimMin<nalgebra::Const<STATES>, Output = nalgebra::Const<STATES>>,
    {
        let cont_q = state_space::make_covariance_matrix(state_std_devs);
        let cont_r = state_space::make_covariance_matrix(measurement_std_devs);

        let (disc_a, disc_q) =
            discretization::discretize_aq_taylor(plant.a(), &cont_q, nominal_dt_seconds);
        let disc_r = discretization::discretize_r(&cont_r, nominal_dt_seconds);

        let a_t = disc_a.transpose();
        let c_t = plant.c().transpose();
        let p = if OUTPUTS <= STATES && numerics::is_stabilizable(&a_t, &c_t) {
            numerics::solve_dare(&a_t, &c_t, &disc_q, &disc_r).unwrap_or_else(SMatrix::zeros)
        } else {
            SMatrix::zeros()
        };

        Self {
            plant,
            p,
            cont_q,
            cont_r,
            disc_r,
        }
    }

    pub fn plant(&self) -> &LinearSystem<STATES, INPUTS, OUTPUTS> {
        &self.plant
    }

    /// Returns the error covariance matrix P.
    pub fn p(&self) -> &SMatrix<f64, STATES, STATES> {
        &self.p
    }

    pub fn set_p(&mut self, p: SMatrix<f64, STATES, STATES>) {
        self.p = p;
    }

    /// Returns the state estimate x-hat.
    pub fn x_hat(&self) -> &SVector<f64, STATES> {
        self.plant.x()
    }

    /// Sets the state estimate x-hat.
    pub fn set_x_hat(&mut self, x_hat: SVector<f64, STATES>) {
        self.plant.set_x(x_hat);
    }

    /// Resets the observer's plant.
    pub fn reset(&mut self) {
        self.plant.reset();
    }

    /// Projects the model into the future with a new control input.
    ///
    /// The timestep may vary tick to tick; the system and noise matrices
    /// are re-discretized at the supplied dt.
    pub fn predict(&mut self, u: &SVector<f64, INPUTS>, dt_seconds: f64)
    where
        nalgebra::Const<STATES>:
            nalgebra::DimMin<nalgebra::Const<STATES>, Output = nalgebra::Const<STATES>>,
    {
        let x = self.plant.calculate_x(self.plant.x(), u, dt_seconds);
        self.plant.set_x(x);

        let (disc_a, disc_q) =
            discretization::discretize_aq_taylor(self.plant.a(), &self.cont_q, dt_seconds);

        self.p = disc_a * self.p * disc_a.transpose() + disc_q;
        self.disc_r = discretization::discretize_r(&self.cont_r, dt_seconds);
    }

    /// Corrects the state estimate using the plant's own output equation
    /// and the cached discretized measurement covariance.
    pub fn correct(&mut self, u: &SVector<f64, INPUTS>, y: &SVector<f64, OUTPUTS>)
    where
        nalgebra::Const<OUTPUTS>:
            nalgebra::DimMin<nalgebra::Const<OUTPUTS>, Output = nalgebra::Const<OUTPUTS>>,
    {
        let c = *self.plant.c();
        let d = *self.plant.d();
        let r = self.disc_r;
        self.correct_with(u, y, &c, &d, &r);
    }

    /// Corrects the state estimate using an arbitrary output equation and
    /// measurement noise covariance.
    ///
    /// This is what makes heterogeneous multi-sensor fusion possible: a
    /// sensor whose measurement dimension and output model differ from
    /// the plant's nominal ones (a full-pose vision fix against a
    /// heading-only plant, say) corrects through here.
    pub fn correct_with<const ROWS: usize>(
        &mut self,
        u: &SVector<f64, INPUTS>,
        y: &SVector<f64, ROWS>,
        c: &SMatrix<f64, ROWS, STATES>,
        d: &SMatrix<f64, ROWS, INPUTS>,
        r: &SMatrix<f64, ROWS, ROWS>,
    ) where
        nalgebra::Const<ROWS>: nalgebra::DimMin<nalgebra::Const<ROWS>, Output = nalgebra::Const<ROWS>>,
    {
        let x = *self.plant.x();
        let s = c * self.p * c.transpose() + r;

        // K = P C^T S^-1 rearranged into S^T K^T = C P^T so a linear
        // solve replaces the explicit inverse.
        let Some(k_t) = s.transpose().lu().solve(&(c * self.p.transpose())) else {
            // Singular innovation covariance; unreachable for positive
            // definite R. Skip the correction instead of corrupting x.
            return;
        };
        let k = k_t.transpose();

        self.plant.set_x(x + k * (y - (c * x + d * u)));
        self.p = (SMatrix::<f64, STATES, STATES>::identity() - k * c) * self.p;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant;
    use nalgebra::{Matrix3, Vector1, Vector2, Vector3};

    const DT: f64 = 0.02;

    /// Field-relative pose plant: x' = u, with only the heading measured.
    fn pose_plant() -> LinearSystem<3, 3, 1> {
        LinearSystem::new(
            Matrix3::zeros(),
            Matrix3::identity(),
            SMatrix::<f64, 1, 3>::new(0.0, 0.0, 1.0),
            SMatrix::<f64, 1, 3>::zeros(),
            Box::new(|u| *u),
        )
    }

    #[test]
    fn test_dare_seeded_covariance_is_symmetric_psd() {
        let plant = plant::identify_position_system(2.0, 0.5, 12.0);
        let observer = KalmanFilter::new(
            plant,
            &Vector2::new(0.05, 1.0),
            &Vector1::new(0.001),
            DT,
        );

        let p = observer.p();
        assert!(p.norm() > 0.0);
        assert!((p - p.transpose()).norm() < 1e-9);
        for eigenvalue in p.symmetric_eigenvalues().iter() {
            assert!(*eigenvalue >= -1e-9);
        }
    }

    #[test]
    fn test_non_stabilizable_pair_seeds_zero_covariance() {
        // The pose plant's (A^T, C^T) pair leaves x and y unobserved, so
        // the filter must start from a zero prior instead of failing.
        let observer = KalmanFilter::new(
            pose_plant(),
            &Vector3::new(0.1, 0.1, 0.1),
            &Vector1::new(0.01),
            DT,
        );
        assert!(observer.p().norm() == 0.0);
    }

    #[test]
    fn test_predict_integrates_input_ten_ticks() {
        let mut observer = KalmanFilter::new(
            pose_plant(),
            &Vector3::new(0.1, 0.1, 0.1),
            &Vector1::new(0.01),
            DT,
        );

        let u = Vector3::new(1.0, 0.0, 0.0);
        for _ in 0..10 {
            observer.predict(&u, DT);
        }

        assert!((observer.x_hat() - Vector3::new(0.2, 0.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_correct_converges_to_exact_measurement() {
        // Exact full-state measurements with zero measurement noise: the
        // estimate must snap to the truth and the covariance collapse.
        let truth = Vector3::new(1.0, -2.0, 0.5);
        let mut observer = KalmanFilter::new(
            pose_plant(),
            &Vector3::new(0.02, 0.02, 0.01),
            &Vector1::new(0.0),
            DT,
        );

        let c = Matrix3::identity();
        let d = Matrix3::zeros();
        let r = Matrix3::zeros();
        let u = Vector3::zeros();
        for _ in 0..20 {
            observer.predict(&u, DT);
            observer.correct_with(&u, &truth, &c, &d, &r);
        }

        assert!((observer.x_hat() - truth).norm() < 1e-6);
        // P is re-inflated by one discretized Q per cycle and collapsed by
        // each exact correction, so it stays on the order of Q * dt.
        assert!(observer.p().norm() < 1e-4);
    }

    #[test]
    fn test_generalized_correct_updates_unmeasured_states() {
        let mut observer = KalmanFilter::new(
            pose_plant(),
            &Vector3::new(0.1, 0.1, 0.1),
            &Vector1::new(0.01),
            DT,
        );

        let u = Vector3::zeros();
        observer.predict(&u, DT);

        // The plant's own heading measurement can never move x or y...
        observer.correct(&u, &Vector1::new(0.0));
        assert!(observer.x_hat()[0].abs() < 1e-12);

        // ...but a full-pose correction moves all three states.
        let vision_pose = Vector3::new(0.4, 0.2, 0.1);
        let r = state_space::make_covariance_matrix(&Vector3::new(0.01, 0.01, 0.01));
        observer.correct_with(&u, &vision_pose, &Matrix3::identity(), &Matrix3::zeros(), &r);

        let x_hat = observer.x_hat();
        assert!(x_hat[0] > 0.0 && x_hat[1] > 0.0 && x_hat[2] > 0.0);
    }
}
