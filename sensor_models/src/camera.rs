//! Camera parameters for beacon detection.

use serde::{Deserialize, Serialize};

/// Per-axis scale applied to the camera-frame beacon offset before its norm is
/// taken as the reported range.
///
/// Compensates systematic per-axis error of the fiducial pose solver (e.g. a
/// mounting offset). Identity unless measured for the installed camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisCalibration {
    pub scale: [f64; 3],
}

impl Default for AxisCalibration {
    fn default() -> Self {
        Self::identity()
    }
}

impl AxisCalibration {
    pub fn identity() -> Self {
        Self { scale: [1.0; 3] }
    }

    /// Range from a camera-frame offset `[x, y, z]` (meters).
    pub fn range_from_offset(&self, offset: [f64; 3]) -> f64 {
        offset
            .iter()
            .zip(self.scale.iter())
            .map(|(o, s)| (o * s) * (o * s))
            .sum::<f64>()
            .sqrt()
    }
}

/// Physical configuration of the beacon-detecting camera.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    /// Maximum distance at which a beacon can be decoded (meters)
    pub max_range: f64,
    /// Field of view half-angle around the vehicle's forward axis (radians)
    pub fov_half: f64,
    /// Probability of decoding a visible beacon in one frame
    pub p_detection: f64,
    /// Frame rate (Hz)
    pub frame_rate: f64,
    /// Range noise std dev (meters)
    pub range_noise_std: f64,
    /// Yaw noise std dev of the per-beacon orientation sample (radians)
    pub yaw_noise_std: f64,
    /// Pitch/roll noise std dev of the per-beacon orientation sample (radians)
    pub tilt_noise_std: f64,
    /// Per-axis correction applied when converting a pose offset to a range
    pub calibration: AxisCalibration,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            max_range: 2.5,
            fov_half: 60f64.to_radians(),
            p_detection: 0.9,
            frame_rate: 10.0,
            range_noise_std: 0.03,
            yaw_noise_std: 0.05,
            tilt_noise_std: 0.02,
            calibration: AxisCalibration::identity(),
        }
    }
}
