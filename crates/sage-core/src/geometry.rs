//! Minimal 2D geometry value types used by the pose estimator.

use std::ops::{Add, Sub};

/// A rotation in the 2D plane, stored as radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotation2d {
    radians: f64,
}

impl Rotation2d {
    pub fn new(radians: f64) -> Self {
        Self { radians }
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self {
            radians: degrees.to_radians(),
        }
    }

    pub fn radians(&self) -> f64 {
        self.radians
    }

    pub fn degrees(&self) -> f64 {
        self.radians.to_degrees()
    }

    pub fn cos(&self) -> f64 {
        self.radians.cos()
    }

    pub fn sin(&self) -> f64 {
        self.radians.sin()
    }
}

impl Add for Rotation2d {
    type Output = Rotation2d;

    fn add(self, other: Rotation2d) -> Rotation2d {
        Rotation2d::new(self.radians + other.radians)
    }
}

impl Sub for Rotation2d {
    type Output = Rotation2d;

    fn sub(self, other: Rotation2d) -> Rotation2d {
        Rotation2d::new(self.radians - other.radians)
    }
}

/// A translation in the 2D plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Translation2d {
    x: f64,
    y: f64,
}

impl Translation2d {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Rotates this translation around the origin.
    pub fn rotate_by(&self, rotation: &Rotation2d) -> Translation2d {
        Translation2d::new(
            self.x * rotation.cos() - self.y * rotation.sin(),
            self.x * rotation.sin() + self.y * rotation.cos(),
        )
    }
}

impl Add for Translation2d {
    type Output = Translation2d;

    fn add(self, other: Translation2d) -> Translation2d {
        Translation2d::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Translation2d {
    type Output = Translation2d;

    fn sub(self, other: Translation2d) -> Translation2d {
        Translation2d::new(self.x - other.x, self.y - other.y)
    }
}

/// A 2D pose: translation plus heading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose2d {
    translation: Translation2d,
    rotation: Rotation2d,
}

impl Pose2d {
    pub fn new(translation: Translation2d, rotation: Rotation2d) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_xy_theta(x: f64, y: f64, theta_radians: f64) -> Self {
        Self::new(Translation2d::new(x, y), Rotation2d::new(theta_radians))
    }

    pub fn translation(&self) -> Translation2d {
        self.translation
    }

    pub fn rotation(&self) -> Rotation2d {
        self.rotation
    }
}
