//! FilterContext: the single live estimate plus the orientation tracker.
//!
//! # Per-trigger processing
//! - Angular-rate sample: derive `dt` from the previous sample, predict.
//! - Detection batch: associate with the beacon table, update the estimator
//!   (an empty batch is a dropout cycle), fuse the orientation samples.
//! - External attitude reference: store it and re-anchor the motion model.
//!
//! The motion model's attitude follows the external reference whenever that
//! channel has reported at least once. Until then it is re-anchored from the
//! detection-derived orientation after every batch that carried a sample.

use crate::{
    beacon_map::{Association, BeaconMap},
    ekf::{EkfConfig, RangeEkf},
    error::{NavError, Result},
    estimator::{ActiveEstimator, Estimator, EstimatorChoice, UpdateReport},
    orientation::OrientationTracker,
    particle::{ParticleConfig, ParticleEstimator},
    types::{
        AngularRateSample, AttitudeReference, DetectionBatch, Position, StateVec, YawPitchRoll,
    },
};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Configuration for a [`FilterContext`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Which estimator variant to run
    pub estimator: EstimatorChoice,
    pub ekf: EkfConfig,
    pub particle: ParticleConfig,
    /// Prediction step used for the very first angular-rate sample (seconds)
    pub nominal_dt: f64,
    /// Upper bound on a single prediction step (seconds)
    pub max_prediction_dt: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            estimator: EstimatorChoice::Ekf,
            ekf: EkfConfig::default(),
            particle: ParticleConfig::default(),
            nominal_dt: 0.02, // 50 Hz gyro
            max_prediction_dt: 0.5,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.nominal_dt.is_finite() && self.nominal_dt > 0.0) {
            return Err(NavError::InvalidConfig("nominal_dt must be > 0".into()));
        }
        if !(self.max_prediction_dt.is_finite() && self.max_prediction_dt >= self.nominal_dt) {
            return Err(NavError::InvalidConfig(
                "max_prediction_dt must be finite and >= nominal_dt".into(),
            ));
        }
        match self.estimator {
            EstimatorChoice::Ekf => self.ekf.validate(),
            EstimatorChoice::Particle => self.particle.validate(),
        }
    }
}

/// Outputs of one detection cycle.
#[derive(Clone, Debug)]
pub struct CycleOutput {
    pub association: Association,
    pub report: UpdateReport,
    /// Whether the detection-derived orientation changed this cycle
    pub orientation_updated: bool,
    /// Wall-clock time of processing
    pub elapsed_us: u64,
}

/// Published pose: position, attitude and tank-frame velocity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    pub orientation: UnitQuaternion<f64>,
    pub velocity: Vector3<f64>,
}

/// Owns the estimator, the orientation tracker and the beacon table.
#[derive(Clone, Debug)]
pub struct FilterContext {
    config: FilterConfig,
    beacons: BeaconMap,
    estimator: ActiveEstimator,
    orientation: OrientationTracker,
    last_rate_time: Option<f64>,
    cycles: u64,
    dropout_cycles: u64,
}

impl FilterContext {
    pub fn new(config: FilterConfig, beacons: BeaconMap) -> Result<Self> {
        config.validate()?;
        let estimator = match config.estimator {
            EstimatorChoice::Ekf => ActiveEstimator::Ekf(RangeEkf::new(config.ekf.clone())?),
            EstimatorChoice::Particle => {
                ActiveEstimator::Particle(ParticleEstimator::new(config.particle.clone())?)
            }
        };
        if beacons.is_empty() {
            tracing::warn!("filter context created with an empty beacon table");
        }
        Ok(Self {
            config,
            beacons,
            estimator,
            orientation: OrientationTracker::new(),
            last_rate_time: None,
            cycles: 0,
            dropout_cycles: 0,
        })
    }

    /// Predict with one gyro sample. Returns the `dt` actually applied.
    pub fn on_angular_rate(&mut self, sample: &AngularRateSample) -> f64 {
        let dt = match self.last_rate_time {
            None => self.config.nominal_dt,
            Some(last) => {
                let dt = sample.timestamp - last;
                if dt.is_finite() {
                    dt.clamp(0.0, self.config.max_prediction_dt)
                } else {
                    0.0
                }
            }
        };
        if self.last_rate_time.map_or(true, |last| sample.timestamp >= last) {
            self.last_rate_time = Some(sample.timestamp);
        }

        let rate = if sample.rate.iter().all(|c| c.is_finite()) {
            sample.rate
        } else {
            tracing::warn!(t = sample.timestamp, "non-finite angular rate ignored");
            Vector3::zeros()
        };
        self.estimator.predict(&rate, dt);
        dt
    }

    /// Correct with one detection batch.
    pub fn on_detections(&mut self, batch: &DetectionBatch) -> CycleOutput {
        let start = Instant::now();
        let association = self.beacons.associate(&batch.detections);

        let report = self.estimator.update(&association.measurements);
        self.cycles += 1;
        if report.dropout {
            self.dropout_cycles += 1;
        }

        let samples: Vec<YawPitchRoll> = association
            .measurements
            .iter()
            .map(|m| m.orientation())
            .collect();
        let orientation_updated = self.orientation.record_detections(&samples);
        if orientation_updated && self.orientation.reference().is_none() {
            let q = self.orientation.current_quaternion();
            self.estimator.motion_mut().set_attitude(q);
        }

        let position = self.estimator.position_estimate();
        tracing::trace!(
            t = batch.timestamp,
            x = position.x,
            y = position.y,
            z = position.z,
            applied = report.applied,
            "detection cycle"
        );

        CycleOutput {
            association,
            report,
            orientation_updated,
            elapsed_us: start.elapsed().as_micros() as u64,
        }
    }

    /// Store an external attitude and re-anchor the motion model to it.
    pub fn on_external_reference(&mut self, reference: &AttitudeReference) {
        self.orientation.record_external_reference(&reference.orientation);
        if let Some(ypr) = self.orientation.reference() {
            self.estimator.motion_mut().set_attitude(ypr.to_quaternion());
        }
    }

    /// `[x, y, z, v]` in the internal tank frame.
    pub fn get_x_est(&self) -> StateVec {
        let p = self.estimator.position_estimate();
        StateVec::new(p.x, p.y, p.z, self.estimator.forward_speed())
    }

    pub fn position_estimate(&self) -> Position {
        self.estimator.position_estimate()
    }

    pub fn current_orientation(&self) -> YawPitchRoll {
        self.orientation.current()
    }

    pub fn current_quaternion(&self) -> UnitQuaternion<f64> {
        self.orientation.current_quaternion()
    }

    /// Forward speed rotated into the tank frame by the current orientation.
    pub fn velocity(&self) -> Vector3<f64> {
        self.current_quaternion() * Vector3::new(self.estimator.forward_speed(), 0.0, 0.0)
    }

    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position_estimate(),
            orientation: self.current_quaternion(),
            velocity: self.velocity(),
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn estimator(&self) -> &ActiveEstimator {
        &self.estimator
    }

    pub fn orientation_tracker(&self) -> &OrientationTracker {
        &self.orientation
    }

    pub fn beacons(&self) -> &BeaconMap {
        &self.beacons
    }

    /// Detection cycles processed so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn dropout_cycles(&self) -> u64 {
        self.dropout_cycles
    }
}
