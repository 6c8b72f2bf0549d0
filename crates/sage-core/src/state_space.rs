//! Helpers shared by the state-space components: covariance construction,
//! white-noise synthesis, input clamping policies, and pose conversion.

use crate::geometry::Pose2d;
use nalgebra::{SMatrix, SVector, Vector3};
use rand::Rng;
use rand_distr::StandardNormal;

/// Builds a diagonal covariance matrix from per-element standard
/// deviations. Each element is squared and placed on the diagonal.
pub fn make_covariance_matrix<const N: usize>(
    std_devs: &SVector<f64, N>,
) -> SMatrix<f64, N, N> {
    SMatrix::from_diagonal(&std_devs.map(|s| s * s))
}

/// Creates a vector of normally distributed white noise with the given
/// per-element standard deviations.
///
/// The random source is caller-supplied so simulations stay deterministic
/// under a seeded generator.
pub fn white_noise_vector<const N: usize, R: Rng>(
    std_devs: &SVector<f64, N>,
    rng: &mut R,
) -> SVector<f64, N> {
    SVector::from_fn(|row, _| {
        let sample: f64 = rng.sample(StandardNormal);
        sample * std_devs[row]
    })
}

/// Clamps each element of the input independently to `[u_min, u_max]`.
pub fn clamp_input_max_magnitude<const INPUTS: usize>(
    u: &SVector<f64, INPUTS>,
    u_min: &SVector<f64, INPUTS>,
    u_max: &SVector<f64, INPUTS>,
) -> SVector<f64, INPUTS> {
    SVector::from_fn(|row, _| u[row].clamp(u_min[row], u_max[row]))
}

/// Scales the whole input vector down proportionally if any element
/// exceeds the maximum magnitude. Unlike per-element clamping this
/// preserves the input direction, which matters for drivetrains.
pub fn normalize_input_vector<const INPUTS: usize>(
    u: &SVector<f64, INPUTS>,
    max_magnitude: f64,
) -> SVector<f64, INPUTS> {
    let max_value = u.amax();
    if max_value > max_magnitude {
        u * (max_magnitude / max_value)
    } else {
        *u
    }
}

/// Converts a pose to a `[x, y, theta]` vector, theta in radians.
pub fn pose_to_vector(pose: &Pose2d) -> Vector3<f64> {
    Vector3::new(
        pose.translation().x(),
        pose.translation().y(),
        pose.rotation().radians(),
    )
}
