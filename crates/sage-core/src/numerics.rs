//! Numeric primitives the estimation components treat as opaque services:
//! matrix exponential, discrete algebraic Riccati equation solver, and the
//! stabilizability test for a matrix pair.
//!
//! Everything here is a thin boundary over nalgebra's dense linear algebra
//! so the component code never commits to a particular decomposition.

use nalgebra::{Complex, DMatrix, SMatrix};

/// Maximum structured-doubling iterations for the DARE solver. The
/// iteration converges quadratically; well-posed problems finish in well
/// under twenty rounds.
const DARE_MAX_ITERATIONS: usize = 100;

/// Relative convergence tolerance on the DARE solution iterate.
const DARE_TOLERANCE: f64 = 1e-10;

/// Singular values below this are treated as zero by the rank test.
const RANK_EPSILON: f64 = 1e-9;

/// Matrix exponential of a square matrix, exact to floating-point
/// precision for the sizes used here (at most a few dozen rows).
pub fn exp<const N: usize>(m: &SMatrix<f64, N, N>) -> SMatrix<f64, N, N>
where
    nalgebra::Const<N>: nalgebra::DimMin<nalgebra::Const<N>, Output = nalgebra::Const<N>>,
{
    m.exp()
}

/// Matrix exponential of a dynamically sized square matrix. Used where the
/// dimension is a sum of const generics, which stable Rust cannot express
/// as a static size.
pub fn exp_dynamic(m: &DMatrix<f64>) -> DMatrix<f64> {
    m.exp()
}

/// Solves the discrete algebraic Riccati equation
///
/// `P = A^T P A - A^T P B (R + B^T P B)^-1 B^T P A + Q`
///
/// for the stabilizing symmetric positive-semidefinite solution, by the
/// structured doubling iteration. Returns `None` when R is singular, in
/// which case no informative steady-state covariance exists and callers
/// fall back to a zero seed.
pub fn solve_dare<const STATES: usize, const INPUTS: usize>(
    a: &SMatrix<f64, STATES, STATES>,
    b: &SMatrix<f64, STATES, INPUTS>,
    q: &SMatrix<f64, STATES, STATES>,
    r: &SMatrix<f64, INPUTS, INPUTS>,
) -> Option<SMatrix<f64, STATES, STATES>> {
    let r_inv = r.try_inverse()?;

    let mut a_k = *a;
    let mut g_k = b * r_inv * b.transpose();
    let mut h_k = *q;

    for _ in 0..DARE_MAX_ITERATIONS {
        let w = SMatrix::<f64, STATES, STATES>::identity() + g_k * h_k;
        let w_inv = w.try_inverse()?;

        let a_next = a_k * w_inv * a_k;
        let g_next = g_k + a_k * w_inv * g_k * a_k.transpose();
        let h_next = h_k + a_k.transpose() * h_k * w_inv * a_k;

        let delta = (h_next - h_k).norm();
        a_k = a_next;
        g_k = g_next;
        h_k = h_next;

        if delta <= DARE_TOLERANCE * h_k.norm().max(1.0) {
            break;
        }
    }

    Some((h_k + h_k.transpose()) * 0.5)
}

/// Returns true if (A, B) is a stabilizable pair.
///
/// (A, B) is stabilizable if and only if every uncontrollable eigenvalue
/// of A has modulus less than one, where an eigenvalue `lambda` is
/// uncontrollable if `rank([lambda * I - A, B]) < states`.
pub fn is_stabilizable<const STATES: usize, const INPUTS: usize>(
    a: &SMatrix<f64, STATES, STATES>,
    b: &SMatrix<f64, STATES, INPUTS>,
) -> bool {
    let a_dyn = DMatrix::from_fn(STATES, STATES, |row, col| a[(row, col)]);
    let eigenvalues = a_dyn.complex_eigenvalues();

    for lambda in eigenvalues.iter() {
        if lambda.norm() < 1.0 {
            continue;
        }

        let pbh = DMatrix::from_fn(STATES, STATES + INPUTS, |row, col| {
            if col < STATES {
                let mut value = Complex::new(-a[(row, col)], 0.0);
                if row == col {
                    value += *lambda;
                }
                value
            } else {
                Complex::new(b[(row, col - STATES)], 0.0)
            }
        });

        if pbh.rank(RANK_EPSILON) < STATES {
            return false;
        }
    }

    true
}
