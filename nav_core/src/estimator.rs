//! Estimator capability shared by the EKF and the particle filter.
//!
//! The dispatch layer drives whichever variant is active through
//! [`Estimator`] alone; both variants advance through the same
//! [`MotionModel`].

use crate::{
    ekf::RangeEkf,
    motion::MotionModel,
    particle::ParticleEstimator,
    types::{Measurement, Position},
};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Outcome of one update call, exposed for diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UpdateReport {
    /// Measurements that contributed to the correction
    pub applied: usize,
    /// Measurements skipped for numerical reasons (zero range, singular S)
    pub skipped: usize,
    /// True if the empty-cycle velocity decay ran instead of a correction
    pub dropout: bool,
    /// True if the particle population was resampled
    pub resampled: bool,
    /// Particle effective sample size after the update
    pub ess: Option<f64>,
}

/// Trait for a pose estimator (predict + update).
pub trait Estimator {
    /// Advance the belief by `dt` seconds of body angular `rate`.
    fn predict(&mut self, rate: &Vector3<f64>, dt: f64);

    /// Correct the belief with one detection cycle. An empty slice is a
    /// dropout cycle.
    fn update(&mut self, measurements: &[Measurement]) -> UpdateReport;

    fn position_estimate(&self) -> Position;

    /// Forward speed along the heading (m/s).
    fn forward_speed(&self) -> f64;

    fn motion(&self) -> &MotionModel;

    fn motion_mut(&mut self) -> &mut MotionModel;
}

/// Which estimator variant a context runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorChoice {
    #[default]
    Ekf,
    Particle,
}

/// The single live estimate owned by a context.
#[derive(Clone, Debug)]
pub enum ActiveEstimator {
    Ekf(RangeEkf),
    Particle(ParticleEstimator),
}

impl ActiveEstimator {
    pub fn as_ekf(&self) -> Option<&RangeEkf> {
        match self {
            Self::Ekf(ekf) => Some(ekf),
            Self::Particle(_) => None,
        }
    }

    pub fn as_particle(&self) -> Option<&ParticleEstimator> {
        match self {
            Self::Particle(pf) => Some(pf),
            Self::Ekf(_) => None,
        }
    }

    pub fn choice(&self) -> EstimatorChoice {
        match self {
            Self::Ekf(_) => EstimatorChoice::Ekf,
            Self::Particle(_) => EstimatorChoice::Particle,
        }
    }

    fn inner(&self) -> &dyn Estimator {
        match self {
            Self::Ekf(ekf) => ekf,
            Self::Particle(pf) => pf,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Estimator {
        match self {
            Self::Ekf(ekf) => ekf,
            Self::Particle(pf) => pf,
        }
    }
}

impl Estimator for ActiveEstimator {
    fn predict(&mut self, rate: &Vector3<f64>, dt: f64) {
        self.inner_mut().predict(rate, dt)
    }

    fn update(&mut self, measurements: &[Measurement]) -> UpdateReport {
        self.inner_mut().update(measurements)
    }

    fn position_estimate(&self) -> Position {
        self.inner().position_estimate()
    }

    fn forward_speed(&self) -> f64 {
        self.inner().forward_speed()
    }

    fn motion(&self) -> &MotionModel {
        self.inner().motion()
    }

    fn motion_mut(&mut self) -> &mut MotionModel {
        self.inner_mut().motion_mut()
    }
}
