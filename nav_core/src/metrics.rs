//! Localization metrics: position RMSE / max error, circular heading RMSE,
//! dropout counts.

use crate::{orientation::angle_diff, types::Position};
use serde::{Deserialize, Serialize};

/// Ground-truth pose of the vehicle at a given time.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GroundTruthPose {
    pub time: f64,
    pub position: [f64; 3],
    /// True yaw (radians)
    pub yaw: f64,
    /// True forward speed (m/s)
    pub speed: f64,
}

/// Accumulated metric statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LocalizationMetrics {
    /// Number of evaluated samples
    pub n_samples: u64,
    /// Sum of squared 3D position errors (for RMSE)
    pub sum_sq_pos_err: f64,
    /// Largest 3D position error seen
    pub max_pos_err: f64,
    /// Samples evaluated after the first heading fix
    pub n_heading: u64,
    /// Sum of squared wrapped yaw errors (for RMSE)
    pub sum_sq_yaw_err: f64,
    /// Detection cycles processed
    pub cycles: u64,
    /// Detection cycles that carried no usable measurement
    pub dropout_cycles: u64,
    /// Detections dropped during association
    pub dropped_detections: u64,
}

impl LocalizationMetrics {
    /// Root-mean-square position error (meters, 3D).
    pub fn rmse_position(&self) -> f64 {
        if self.n_samples == 0 {
            return 0.0;
        }
        (self.sum_sq_pos_err / self.n_samples as f64).sqrt()
    }

    /// Root-mean-square yaw error (radians), wrap-aware.
    pub fn rmse_yaw(&self) -> f64 {
        if self.n_heading == 0 {
            return 0.0;
        }
        (self.sum_sq_yaw_err / self.n_heading as f64).sqrt()
    }

    /// Accumulate one estimate against ground truth. `yaw` is `None` while
    /// the estimator has no heading fix.
    pub fn accumulate(&mut self, position: &Position, yaw: Option<f64>, truth: &GroundTruthPose) {
        let err = (position - Position::from(truth.position)).norm();
        self.n_samples += 1;
        self.sum_sq_pos_err += err * err;
        self.max_pos_err = self.max_pos_err.max(err);

        if let Some(yaw) = yaw {
            let e = angle_diff(yaw, truth.yaw);
            self.n_heading += 1;
            self.sum_sq_yaw_err += e * e;
        }
    }

    /// Record one detection cycle's bookkeeping.
    pub fn record_cycle(&mut self, dropout: bool, dropped: usize) {
        self.cycles += 1;
        if dropout {
            self.dropout_cycles += 1;
        }
        self.dropped_detections += dropped as u64;
    }

    /// Summary view for reports.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            rmse_position: self.rmse_position(),
            max_position_error: self.max_pos_err,
            rmse_yaw: self.rmse_yaw(),
            samples: self.n_samples,
            cycles: self.cycles,
            dropout_cycles: self.dropout_cycles,
            dropped_detections: self.dropped_detections,
        }
    }
}

/// Flattened metrics, as written to JSON reports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub rmse_position: f64,
    pub max_position_error: f64,
    pub rmse_yaw: f64,
    pub samples: u64,
    pub cycles: u64,
    pub dropout_cycles: u64,
    pub dropped_detections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn truth(x: f64, yaw: f64) -> GroundTruthPose {
        GroundTruthPose {
            time: 0.0,
            position: [x, 0.0, 0.0],
            yaw,
            speed: 0.0,
        }
    }

    #[test]
    fn position_rmse_and_max() {
        let mut m = LocalizationMetrics::default();
        m.accumulate(&Position::new(0.3, 0.0, 0.0), None, &truth(0.0, 0.0));
        m.accumulate(&Position::new(0.0, 0.4, 0.0), None, &truth(0.0, 0.0));
        assert_abs_diff_eq!(m.rmse_position(), (0.125f64).sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(m.max_pos_err, 0.4, epsilon = 1e-12);
        assert_eq!(m.rmse_yaw(), 0.0);
    }

    #[test]
    fn yaw_error_wraps() {
        let mut m = LocalizationMetrics::default();
        let one_deg = PI / 180.0;
        m.accumulate(&Position::zeros(), Some(PI - one_deg), &truth(0.0, -PI + one_deg));
        assert_abs_diff_eq!(m.rmse_yaw(), 2.0 * one_deg, epsilon = 1e-9);
    }

    #[test]
    fn cycle_counts() {
        let mut m = LocalizationMetrics::default();
        m.record_cycle(false, 1);
        m.record_cycle(true, 0);
        let s = m.summary();
        assert_eq!((s.cycles, s.dropout_cycles, s.dropped_detections), (2, 1, 1));
    }
}
