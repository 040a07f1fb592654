//! Shared dead-reckoning motion model.
//!
//! Both estimators advance their belief through this one routine:
//!
//! q ← q · exp(ω·dt)            (body angular rate, right-multiplied)
//! p ← p + (q · x̂) · v · dt      (move along the forward body axis)
//!
//! The attitude held here is internal to the motion model. It is re-anchored
//! from the external attitude reference (or, without one, from the
//! detection-derived orientation) by the owning context.

use crate::types::Position;
use nalgebra::{UnitQuaternion, Vector3};

#[derive(Clone, Debug)]
pub struct MotionModel {
    attitude: UnitQuaternion<f64>,
}

impl Default for MotionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionModel {
    /// Starts with zero heading until re-anchored.
    pub fn new() -> Self {
        Self {
            attitude: UnitQuaternion::identity(),
        }
    }

    pub fn attitude(&self) -> &UnitQuaternion<f64> {
        &self.attitude
    }

    pub fn set_attitude(&mut self, q: UnitQuaternion<f64>) {
        self.attitude = q;
    }

    /// Integrate a body angular rate over `dt` seconds.
    pub fn integrate_rate(&mut self, rate: &Vector3<f64>, dt: f64) {
        let delta = rate * dt;
        if delta.iter().all(|c| *c == 0.0) {
            return;
        }
        self.attitude *= UnitQuaternion::from_scaled_axis(delta);
        self.attitude.renormalize_fast();
    }

    /// Unit forward axis in the tank frame.
    pub fn heading(&self) -> Vector3<f64> {
        self.attitude * Vector3::x()
    }

    /// Position change after moving `speed·dt` along the heading.
    pub fn displacement(&self, speed: f64, dt: f64) -> Position {
        self.heading() * (speed * dt)
    }
}
