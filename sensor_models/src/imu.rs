//! Inertial sensor parameters (gyroscope only: the filter consumes angular rate).

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuParams {
    /// Sample rate (Hz)
    pub rate_hz: f64,
    /// White noise std dev per axis (rad/s)
    pub gyro_noise_std: f64,
    /// Constant bias per axis (rad/s)
    pub gyro_bias: [f64; 3],
}

impl Default for ImuParams {
    fn default() -> Self {
        Self {
            rate_hz: 50.0,
            gyro_noise_std: 0.005,
            gyro_bias: [0.0; 3],
        }
    }
}

impl ImuParams {
    /// Nominal time between samples (s).
    pub fn period(&self) -> f64 {
        1.0 / self.rate_hz
    }
}
