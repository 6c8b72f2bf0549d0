//! Conversion of continuous-time system and noise matrices to their
//! discrete-time equivalents for a fixed control-loop timestep.

use crate::numerics;
use nalgebra::{DMatrix, SMatrix};

/// Number of terms kept by the truncated Taylor expansions below.
///
/// Five terms (orders 1..5, error O(dt^6)) is plenty for control-loop-scale
/// timesteps of tens of milliseconds.
const TAYLOR_TERMS: usize = 5;

/// Discretizes the given continuous A matrix as `exp(A * dt)`.
pub fn discretize_a<const STATES: usize>(
    cont_a: &SMatrix<f64, STATES, STATES>,
    dt_seconds: f64,
) -> SMatrix<f64, STATES, STATES>
where
    nalgebra::Const<STATES>:
        nalgebra::DimMin<nalgebra::Const<STATES>, Output = nalgebra::Const<STATES>>,
{
    numerics::exp(&(cont_a * dt_seconds))
}

/// Discretizes the given continuous A and B matrices exactly.
///
/// Exponentiates the augmented block matrix `[[A*dt, B*dt], [0, 0]]` once
/// and reads the discrete A and B out of its upper blocks. The augmented
/// matrix is (states + inputs) square, so this costs a larger exponential
/// than [`discretize_ab_taylor`].
pub fn discretize_ab<const STATES: usize, const INPUTS: usize>(
    cont_a: &SMatrix<f64, STATES, STATES>,
    cont_b: &SMatrix<f64, STATES, INPUTS>,
    dt_seconds: f64,
) -> (SMatrix<f64, STATES, STATES>, SMatrix<f64, STATES, INPUTS>) {
    let size = STATES + INPUTS;
    let mut m_cont = DMatrix::<f64>::zeros(size, size);
    m_cont
        .view_mut((0, 0), (STATES, STATES))
        .copy_from(&(cont_a * dt_seconds));
    m_cont
        .view_mut((0, STATES), (STATES, INPUTS))
        .copy_from(&(cont_b * dt_seconds));

    let m_disc = numerics::exp_dynamic(&m_cont);

    let disc_a = SMatrix::from_fn(|row, col| m_disc[(row, col)]);
    let disc_b = SMatrix::from_fn(|row, col| m_disc[(row, STATES + col)]);
    (disc_a, disc_b)
}

/// Discretizes the given continuous A and B matrices using a truncated
/// Taylor series for B.
///
/// Rather than exponentiating a (states + inputs) square augmented matrix
/// like [`discretize_ab`], only A is exponentiated exactly and the
/// upper-right block is approximated as
/// `phi12 = sum_{i=1..5} A^(i-1) * dt^i / i!`, with `discB = phi12 * B`.
pub fn discretize_ab_taylor<const STATES: usize, const INPUTS: usize>(
    cont_a: &SMatrix<f64, STATES, STATES>,
    cont_b: &SMatrix<f64, STATES, INPUTS>,
    dt_seconds: f64,
) -> (SMatrix<f64, STATES, STATES>, SMatrix<f64, STATES, INPUTS>)
where
    nalgebra::Const<STATES>:
        nalgebra::DimMin<nalgebra::Const<STATES>, Output = nalgebra::Const<STATES>>,
{
    let mut last_term = SMatrix::<f64, STATES, STATES>::identity();
    let mut last_coeff = dt_seconds;

    let mut phi12 = last_term * last_coeff;
    for i in 2..=TAYLOR_TERMS {
        last_term = cont_a * last_term;
        last_coeff *= dt_seconds / (i as f64);

        phi12 += last_term * last_coeff;
    }

    let disc_b = phi12 * cont_b;
    let disc_a = discretize_a(cont_a, dt_seconds);

    (disc_a, disc_b)
}

/// Discretizes the given continuous A and process-noise Q matrices.
///
/// Van Loan's method restricted to the Q block: instead of exponentiating
/// the 2N x 2N augmented matrix `[[-A, Q], [0, A^T]]`, the off-diagonal
/// block is built from a five-term Taylor recurrence and combined with the
/// exact `exp(A * dt)`. Q is symmetrized on the way in (callers may supply
/// asymmetric noise matrices) and the result is re-symmetrized to absorb
/// accumulated floating-point asymmetry.
pub fn discretize_aq_taylor<const STATES: usize>(
    cont_a: &SMatrix<f64, STATES, STATES>,
    cont_q: &SMatrix<f64, STATES, STATES>,
    dt_seconds: f64,
) -> (SMatrix<f64, STATES, STATES>, SMatrix<f64, STATES, STATES>)
where
    nalgebra::Const<STATES>:
        nalgebra::DimMin<nalgebra::Const<STATES>, Output = nalgebra::Const<STATES>>,
{
    let q = (cont_q + cont_q.transpose()) * 0.5;

    let mut last_term = q;
    let mut last_coeff = dt_seconds;

    // A^T^n
    let mut atn = cont_a.transpose();
    let mut phi12 = last_term * last_coeff;

    for i in 2..=TAYLOR_TERMS {
        last_term = -cont_a * last_term + q * atn;
        last_coeff *= dt_seconds / (i as f64);

        phi12 += last_term * last_coeff;

        atn *= cont_a.transpose();
    }

    let disc_a = discretize_a(cont_a, dt_seconds);
    let q_disc = disc_a * phi12;

    let disc_q = (q_disc + q_disc.transpose()) * 0.5;
    (disc_a, disc_q)
}

/// Converts a continuous measurement-noise spectral density to a
/// discrete-step covariance.
///
/// dt = 0 divides by zero; callers must pass dt > 0.
pub fn discretize_r<const OUTPUTS: usize>(
    cont_r: &SMatrix<f64, OUTPUTS, OUTPUTS>,
    dt_seconds: f64,
) -> SMatrix<f64, OUTPUTS, OUTPUTS> {
    cont_r / dt_seconds
}
