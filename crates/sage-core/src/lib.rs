//! # Sage Core
//!
//! State-space estimation toolkit for real-time robot controllers:
//! - Discretization of continuous system and noise matrices
//! - Linear plant models with pluggable input clamping
//! - A steady-state-seeded, generalized-measurement Kalman filter
//! - Latency compensation for delayed absolute measurements
//! - A latency-compensated swerve-drive pose estimator
//!
//! Everything runs to completion on the caller's thread; nothing here is
//! internally synchronized. Matrices are nalgebra statics with
//! const-generic dimensions, so shape mismatches fail at compile time.

pub mod clock;
pub mod discretization;
pub mod geometry;
pub mod kinematics;
pub mod latency;
pub mod numerics;
pub mod observer;
pub mod plant;
pub mod pose;
pub mod state_space;
pub mod system;

// Re-export core types
pub use clock::MonotonicClock;
pub use geometry::{Pose2d, Rotation2d, Translation2d};
pub use kinematics::{ChassisSpeeds, Kinematics, ModuleState, SwerveKinematics};
pub use latency::LatencyCompensator;
pub use observer::KalmanFilter;
pub use pose::SwervePoseEstimator;
pub use system::{InputClamp, LinearSystem};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
