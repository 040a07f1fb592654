//! `nav_core`: Pose estimation for a beacon-instrumented tank.
//!
//! # Module layout
//! - [`types`]: Fundamental types (ids, attitudes, sensor samples, measurements)
//! - [`error`]: Configuration / load-time errors
//! - [`beacon_map`]: Surveyed beacon table and detection association
//! - [`orientation`]: Circular-mean orientation tracker
//! - [`motion`]: Shared dead-reckoning motion model
//! - [`estimator`]: Capability trait shared by both estimators
//! - [`ekf`]: Range-only EKF over position and forward speed
//! - [`particle`]: Particle filter over position
//! - [`context`]: The per-vehicle estimate (FilterContext) and its triggers
//! - [`shared`]: Mutex-guarded context for multi-threaded feeds
//! - [`metrics`]: Position / heading error against ground truth

pub mod beacon_map;
pub mod context;
pub mod ekf;
pub mod error;
pub mod estimator;
pub mod metrics;
pub mod motion;
pub mod orientation;
pub mod particle;
pub mod shared;
pub mod types;

pub use beacon_map::{Association, Beacon, BeaconMap, BeaconRow};
pub use context::{CycleOutput, FilterConfig, FilterContext, Pose};
pub use ekf::{EkfConfig, RangeEkf};
pub use error::{NavError, Result};
pub use estimator::{ActiveEstimator, Estimator, EstimatorChoice, UpdateReport};
pub use orientation::{FixState, OrientationTracker};
pub use particle::{ParticleConfig, ParticleEstimator};
pub use shared::SharedFilterContext;
pub use types::{
    AngularRateSample, AttitudeReference, BeaconId, Detection, DetectionBatch, Measurement,
    Position, StateCov, StateVec, YawPitchRoll,
};
