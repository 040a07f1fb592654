//! Range observation model: predicted range, Jacobian, Gaussian likelihood.
//!
//! # Model
//! z = ‖p − b‖ + w,   w ~ N(0, σ²)
//!
//! where `p` is the vehicle position and `b` the surveyed beacon position.
//! The Jacobian ∂z/∂p = (p − b)ᵀ / ‖p − b‖ is the unit vector pointing from the
//! beacon to the vehicle; it is undefined when the two coincide.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Ranges at or below this are treated as a vehicle sitting on the beacon.
pub const MIN_RANGE: f64 = 1e-9;

/// Scalar range measurement to one beacon.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeObservation {
    /// Surveyed beacon position (meters)
    pub beacon: Vector3<f64>,
    /// Range noise std dev (meters)
    pub sigma: f64,
}

impl RangeObservation {
    pub fn new(beacon: Vector3<f64>, sigma: f64) -> Self {
        Self { beacon, sigma }
    }

    /// Expected range h(p).
    pub fn apply(&self, position: &Vector3<f64>) -> f64 {
        (position - self.beacon).norm()
    }

    /// Jacobian row ∂h/∂p evaluated at `position`.
    ///
    /// Returns `None` when the position coincides with the beacon.
    pub fn jacobian(&self, position: &Vector3<f64>) -> Option<Vector3<f64>> {
        let d = position - self.beacon;
        let r = d.norm();
        if !r.is_finite() || r <= MIN_RANGE {
            return None;
        }
        Some(d / r)
    }

    /// Measurement noise variance R = σ².
    pub fn variance(&self) -> f64 {
        self.sigma * self.sigma
    }

    /// Unnormalised Gaussian log-likelihood of range `z` seen from `position`.
    ///
    /// The normalising constant is dropped: it is identical for every
    /// hypothesis and cancels when weights are renormalised.
    pub fn log_likelihood(&self, z: f64, position: &Vector3<f64>) -> f64 {
        let e = (z - self.apply(position)) / self.sigma;
        -0.5 * e * e
    }
}
