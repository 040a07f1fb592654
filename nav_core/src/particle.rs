//! Particle filter over vehicle position.
//!
//! Non-Gaussian alternative to the range EKF. Each particle is a position
//! hypothesis; all particles share the motion model's attitude and a
//! configured cruise speed, and diversify through independently sampled
//! process noise.
//!
//! Weights are updated in log space (max-subtracted before exponentiation)
//! so that many sharp range likelihoods do not underflow to zero. Systematic
//! resampling runs whenever the effective sample size 1/Σw² drops below a
//! configured fraction of the population.

use crate::{
    error::{NavError, Result},
    estimator::{Estimator, UpdateReport},
    motion::MotionModel,
    types::{Measurement, Position},
};
use nalgebra::{Matrix3, Vector3};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use sensor_models::RangeObservation;
use serde::{Deserialize, Serialize};

/// A single position hypothesis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub position: Position,
    /// Normalised importance weight
    pub weight: f64,
}

/// Axis-aligned box particles are initialised in (meters).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatialBounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for SpatialBounds {
    fn default() -> Self {
        Self {
            min: [0.0, 0.0, 0.0],
            max: [3.0, 2.0, 1.5],
        }
    }
}

/// Configuration for the particle estimator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// Population size; fixed for the lifetime of the estimator
    pub num_particles: usize,
    /// Initialisation volume
    pub bounds: SpatialBounds,
    /// Per-axis position noise density (m/√s)
    pub process_noise_std: f64,
    /// Range noise std dev used by the likelihood (meters)
    pub range_noise_std: f64,
    /// Resample when ESS / num_particles falls below this
    pub resample_threshold: f64,
    /// Assumed forward speed along the heading (m/s)
    pub cruise_speed: f64,
    /// Seed for initialisation, process noise and resampling
    pub seed: u64,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            num_particles: 500,
            bounds: SpatialBounds::default(),
            process_noise_std: 0.05,
            range_noise_std: 0.1,
            resample_threshold: 0.5,
            cruise_speed: 0.0,
            seed: 42,
        }
    }
}

impl ParticleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(NavError::InvalidConfig("particle.num_particles must be > 0".into()));
        }
        for axis in 0..3 {
            let (lo, hi) = (self.bounds.min[axis], self.bounds.max[axis]);
            if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                return Err(NavError::InvalidConfig(format!(
                    "particle.bounds axis {axis}: [{lo}, {hi}] is not a valid interval"
                )));
            }
        }
        if !(self.range_noise_std.is_finite() && self.range_noise_std > 0.0) {
            return Err(NavError::InvalidConfig("particle.range_noise_std must be > 0".into()));
        }
        if !(self.process_noise_std.is_finite() && self.process_noise_std >= 0.0) {
            return Err(NavError::InvalidConfig("particle.process_noise_std must be >= 0".into()));
        }
        if !(0.0..=1.0).contains(&self.resample_threshold) {
            return Err(NavError::InvalidConfig(
                "particle.resample_threshold must be in [0, 1]".into(),
            ));
        }
        if !self.cruise_speed.is_finite() {
            return Err(NavError::InvalidConfig("particle.cruise_speed must be finite".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ParticleEstimator {
    config: ParticleConfig,
    particles: Vec<Particle>,
    motion: MotionModel,
    rng: ChaCha8Rng,
}

impl ParticleEstimator {
    /// Create and initialise the population.
    pub fn new(config: ParticleConfig) -> Result<Self> {
        config.validate()?;
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut pf = Self {
            particles: Vec::with_capacity(config.num_particles),
            config,
            motion: MotionModel::new(),
            rng,
        };
        pf.initialize();
        Ok(pf)
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// Draw the population uniformly inside the bounds with uniform weights.
    pub fn initialize(&mut self) {
        let n = self.config.num_particles;
        let SpatialBounds { min, max } = self.config.bounds;
        let weight = 1.0 / n as f64;
        let rng = &mut self.rng;
        self.particles = (0..n)
            .map(|_| Particle {
                position: Position::new(
                    rng.gen_range(min[0]..=max[0]),
                    rng.gen_range(min[1]..=max[1]),
                    rng.gen_range(min[2]..=max[2]),
                ),
                weight,
            })
            .collect();
    }

    /// 1 / Σ wᵢ²
    pub fn effective_sample_size(&self) -> f64 {
        let sum_sq: f64 = self.particles.iter().map(|p| p.weight * p.weight).sum();
        if sum_sq > 0.0 {
            1.0 / sum_sq
        } else {
            0.0
        }
    }

    /// Weighted position covariance of the population.
    pub fn position_covariance(&self) -> Matrix3<f64> {
        let mean = self.position_estimate();
        self.particles.iter().fold(Matrix3::zeros(), |acc, p| {
            let d = p.position - mean;
            acc + d * d.transpose() * p.weight
        })
    }

    /// Systematic resampling with replacement; weights reset to uniform.
    pub fn resample(&mut self) {
        let n = self.particles.len();
        let step = 1.0 / n as f64;
        let mut u = self.rng.gen::<f64>() * step;
        let mut idx = 0;
        let mut cumsum = self.particles[0].weight;
        let mut resampled = Vec::with_capacity(n);

        for _ in 0..n {
            while u > cumsum && idx < n - 1 {
                idx += 1;
                cumsum += self.particles[idx].weight;
            }
            resampled.push(Particle {
                position: self.particles[idx].position,
                weight: step,
            });
            u += step;
        }
        self.particles = resampled;
    }

    fn reset_uniform_weights(&mut self) {
        let w = 1.0 / self.particles.len() as f64;
        self.particles.iter_mut().for_each(|p| p.weight = w);
    }
}

impl Estimator for ParticleEstimator {
    fn predict(&mut self, rate: &Vector3<f64>, dt: f64) {
        self.motion.integrate_rate(rate, dt);
        if dt <= 0.0 {
            return;
        }
        let drift = self.motion.displacement(self.config.cruise_speed, dt);
        let sigma = self.config.process_noise_std * dt.sqrt();
        for p in &mut self.particles {
            let noise = Vector3::from_fn(|_, _| self.rng.sample::<f64, _>(StandardNormal) * sigma);
            p.position += drift + noise;
        }
    }

    fn update(&mut self, measurements: &[Measurement]) -> UpdateReport {
        if measurements.is_empty() {
            return UpdateReport {
                dropout: true,
                ess: Some(self.effective_sample_size()),
                ..Default::default()
            };
        }

        let sigma = self.config.range_noise_std;
        let observations: Vec<(f64, RangeObservation)> = measurements
            .iter()
            .map(|m| (m.range(), RangeObservation::new(*m.beacon_position(), sigma)))
            .collect();

        // log wᵢ + Σⱼ log p(zⱼ | xᵢ)
        let log_weights: Vec<f64> = self
            .particles
            .par_iter()
            .map(|p| {
                let ll: f64 = observations
                    .iter()
                    .map(|(z, obs)| obs.log_likelihood(*z, &p.position))
                    .sum();
                p.weight.ln() + ll
            })
            .collect();

        let max_log = log_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max_log.is_finite() {
            tracing::warn!("all particle weights vanished, resetting to uniform");
            self.reset_uniform_weights();
        } else {
            let total: f64 = log_weights.iter().map(|lw| (lw - max_log).exp()).sum();
            for (p, lw) in self.particles.iter_mut().zip(&log_weights) {
                p.weight = (lw - max_log).exp() / total;
            }
        }

        let mut report = UpdateReport {
            applied: measurements.len(),
            ..Default::default()
        };
        let ess = self.effective_sample_size();
        if ess < self.config.resample_threshold * self.particles.len() as f64 {
            tracing::debug!(ess, "resampling particle population");
            self.resample();
            report.resampled = true;
        }
        report.ess = Some(self.effective_sample_size());
        report
    }

    /// Weighted mean of particle positions.
    fn position_estimate(&self) -> Position {
        self.particles
            .iter()
            .fold(Position::zeros(), |acc, p| acc + p.position * p.weight)
    }

    fn forward_speed(&self) -> f64 {
        self.config.cruise_speed
    }

    fn motion(&self) -> &MotionModel {
        &self.motion
    }

    fn motion_mut(&mut self) -> &mut MotionModel {
        &mut self.motion
    }
}
