//! Orientation tracker: fuses per-detection attitude samples.
//!
//! # Fusion rule
//! - yaw:         circular mean  atan2(Σ sin ψᵢ / n, Σ cos ψᵢ / n)
//! - pitch, roll: linear mean (the vehicle stays close to level)
//!
//! A cycle without detections keeps the last fused value, so heading survives
//! dropout. An external attitude reference is stored separately: it steers the
//! motion model's heading but never overwrites the detection-derived output.

use crate::types::YawPitchRoll;
use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Wrap an angle to (−π, π].
pub fn wrap_angle(a: f64) -> f64 {
    if a > -PI && a <= PI {
        return a;
    }
    let w = (a + PI).rem_euclid(TAU) - PI;
    if w <= -PI {
        w + TAU
    } else {
        w
    }
}

/// Signed smallest difference `a − b`, in (−π, π].
pub fn angle_diff(a: f64, b: f64) -> f64 {
    wrap_angle(a - b)
}

/// Circular mean of angles, or `None` for an empty slice.
///
/// When the samples cancel exactly (e.g. 0 and π) the result is 0.
pub fn circular_mean(angles: &[f64]) -> Option<f64> {
    if angles.is_empty() {
        return None;
    }
    let n = angles.len() as f64;
    let (s, c) = angles
        .iter()
        .fold((0.0, 0.0), |(s, c), a| (s + a.sin(), c + a.cos()));
    Some((s / n).atan2(c / n))
}

/// Whether any attitude sample has ever been recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixState {
    /// Startup only: yaw is the zero default
    #[default]
    NoFix,
    /// At least one sample recorded; never reverts
    HasFix,
}

#[derive(Clone, Debug, Default)]
pub struct OrientationTracker {
    current: YawPitchRoll,
    reference: Option<YawPitchRoll>,
    fix: FixState,
}

impl OrientationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fuse one cycle's attitude samples. Returns `true` if the stored
    /// orientation changed (i.e. the list was non-empty).
    pub fn record_detections(&mut self, samples: &[YawPitchRoll]) -> bool {
        let samples: Vec<YawPitchRoll> = samples.iter().copied().filter(|s| s.is_finite()).collect();
        let yaws: Vec<f64> = samples.iter().map(|s| s.yaw).collect();
        let Some(yaw) = circular_mean(&yaws) else {
            return false;
        };
        let n = samples.len() as f64;
        self.current = YawPitchRoll {
            yaw,
            pitch: samples.iter().map(|s| s.pitch).sum::<f64>() / n,
            roll: samples.iter().map(|s| s.roll).sum::<f64>() / n,
        };
        self.fix = FixState::HasFix;
        true
    }

    /// Store an attitude from an independent onboard estimator.
    pub fn record_external_reference(&mut self, q: &UnitQuaternion<f64>) {
        self.reference = Some(YawPitchRoll::from_quaternion(q));
    }

    /// Detection-derived orientation (zero default while in `NoFix`).
    pub fn current(&self) -> YawPitchRoll {
        self.current
    }

    pub fn current_quaternion(&self) -> UnitQuaternion<f64> {
        self.current.to_quaternion()
    }

    /// Latest external reference, if that channel has ever reported.
    pub fn reference(&self) -> Option<YawPitchRoll> {
        self.reference
    }

    pub fn fix_state(&self) -> FixState {
        self.fix
    }
}
