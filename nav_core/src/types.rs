//! Fundamental types used across the entire workspace.
//!
//! All positions are in the tank frame: North-East-Down axes with the origin
//! at a fixed tank reference point, meters.

use nalgebra::{DMatrix, DVector, Matrix4, UnitQuaternion, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Scalar type: f64 throughout for numerical precision in the filters.
// ---------------------------------------------------------------------------

/// EKF state vector: [px, py, pz, v_forward]
pub type StateVec = Vector4<f64>;

/// 4×4 state covariance matrix
pub type StateCov = Matrix4<f64>;

/// Position in the tank frame (meters)
pub type Position = Vector3<f64>;

/// Generic dynamic-size vector (stacked ranges, innovations)
pub type DVec = DVector<f64>;

/// Generic dynamic-size matrix (H, R, S)
pub type DMat = DMatrix<f64>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BeaconId(pub u32);

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("B{}", self.0))
    }
}

// ---------------------------------------------------------------------------
// Orientation
// ---------------------------------------------------------------------------

/// Euler attitude in radians. Yaw is about the vertical axis, then pitch,
/// then roll (Z-Y-X intrinsic).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct YawPitchRoll {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl YawPitchRoll {
    pub fn new(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self { yaw, pitch, roll }
    }

    pub fn from_yaw(yaw: f64) -> Self {
        Self::new(yaw, 0.0, 0.0)
    }

    /// q = q_z(yaw) · q_y(pitch) · q_x(roll)
    pub fn to_quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(self.roll, self.pitch, self.yaw)
    }

    pub fn from_quaternion(q: &UnitQuaternion<f64>) -> Self {
        let (roll, pitch, yaw) = q.euler_angles();
        Self { yaw, pitch, roll }
    }

    pub fn is_finite(&self) -> bool {
        self.yaw.is_finite() && self.pitch.is_finite() && self.roll.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Sensor inputs
// ---------------------------------------------------------------------------

/// One gyroscope sample: body angular rate (rad/s).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AngularRateSample {
    /// Sample time (seconds)
    pub timestamp: f64,
    pub rate: Vector3<f64>,
}

/// One raw beacon detection as reported by perception.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Detection {
    pub beacon_id: BeaconId,
    /// Measured distance camera → beacon (meters)
    pub range: f64,
    /// Vehicle attitude implied by this beacon's observed pose
    pub orientation: UnitQuaternion<f64>,
}

/// All detections from one perception cycle. An empty batch is meaningful:
/// it signals that the camera saw no beacon.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetectionBatch {
    pub timestamp: f64,
    pub detections: Vec<Detection>,
}

/// Attitude from an independent onboard estimator.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AttitudeReference {
    pub timestamp: f64,
    pub orientation: UnitQuaternion<f64>,
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// A detection that has been paired with its surveyed beacon.
///
/// Only [`BeaconMap::associate`](crate::beacon_map::BeaconMap::associate)
/// constructs these, so the estimators never see an unknown beacon or an
/// invalid range.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Measurement {
    beacon_id: BeaconId,
    range: f64,
    beacon_position: Position,
    orientation: YawPitchRoll,
}

impl Measurement {
    pub(crate) fn new(
        beacon_id: BeaconId,
        range: f64,
        beacon_position: Position,
        orientation: YawPitchRoll,
    ) -> Self {
        Self {
            beacon_id,
            range,
            beacon_position,
            orientation,
        }
    }

    pub fn beacon_id(&self) -> BeaconId {
        self.beacon_id
    }

    /// Measured range (meters, ≥ 0)
    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn beacon_position(&self) -> &Position {
        &self.beacon_position
    }

    pub fn orientation(&self) -> YawPitchRoll {
        self.orientation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn beacon_id_display_honours_width() {
        assert_eq!(BeaconId(7).to_string(), "B7");
        assert_eq!(format!("{:>4}|", BeaconId(7)), "  B7|");
        assert_eq!(format!("{:<5}|", BeaconId(12)), "B12  |");
    }

    #[test]
    fn ypr_quaternion_matches_closed_form() {
        let e = YawPitchRoll::new(0.7, -0.2, 0.1);
        let q = e.to_quaternion();

        let (cy, sy) = ((e.yaw * 0.5).cos(), (e.yaw * 0.5).sin());
        let (cp, sp) = ((e.pitch * 0.5).cos(), (e.pitch * 0.5).sin());
        let (cr, sr) = ((e.roll * 0.5).cos(), (e.roll * 0.5).sin());
        assert_abs_diff_eq!(q.w, cy * cp * cr + sy * sp * sr, epsilon = 1e-12);
        assert_abs_diff_eq!(q.i, cy * cp * sr - sy * sp * cr, epsilon = 1e-12);
        assert_abs_diff_eq!(q.j, sy * cp * sr + cy * sp * cr, epsilon = 1e-12);
        assert_abs_diff_eq!(q.k, sy * cp * cr - cy * sp * sr, epsilon = 1e-12);
    }

    #[test]
    fn ypr_roundtrip_through_quaternion() {
        let e = YawPitchRoll::new(-2.5, 0.3, -0.4);
        let back = YawPitchRoll::from_quaternion(&e.to_quaternion());
        assert_abs_diff_eq!(back.yaw, e.yaw, epsilon = 1e-9);
        assert_abs_diff_eq!(back.pitch, e.pitch, epsilon = 1e-9);
        assert_abs_diff_eq!(back.roll, e.roll, epsilon = 1e-9);
    }
}
