//! Thread-safe handle around a [`FilterContext`].
//!
//! Every call holds the lock for its whole duration, so a prediction and an
//! update never interleave and readers never see a half-written covariance or
//! particle array.

use crate::{
    context::{CycleOutput, FilterContext, Pose},
    types::{AngularRateSample, AttitudeReference, DetectionBatch, StateVec},
};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct SharedFilterContext {
    inner: Arc<Mutex<FilterContext>>,
}

impl SharedFilterContext {
    pub fn new(ctx: FilterContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ctx)),
        }
    }

    pub fn on_angular_rate(&self, sample: &AngularRateSample) -> f64 {
        self.inner.lock().on_angular_rate(sample)
    }

    pub fn on_detections(&self, batch: &DetectionBatch) -> CycleOutput {
        self.inner.lock().on_detections(batch)
    }

    pub fn on_external_reference(&self, reference: &AttitudeReference) {
        self.inner.lock().on_external_reference(reference)
    }

    pub fn get_x_est(&self) -> StateVec {
        self.inner.lock().get_x_est()
    }

    pub fn pose(&self) -> Pose {
        self.inner.lock().pose()
    }

    /// Exclusive access for compound reads.
    pub fn lock(&self) -> MutexGuard<'_, FilterContext> {
        self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        beacon_map::{BeaconMap, BeaconRow},
        context::FilterConfig,
        types::{BeaconId, Detection},
    };
    use nalgebra::{UnitQuaternion, Vector3};
    use std::thread;

    #[test]
    fn concurrent_producers_serialize() {
        let beacons = BeaconMap::load([
            BeaconRow::new(1, 0.0, 0.0, 0.0),
            BeaconRow::new(2, 3.0, 0.0, 0.0),
            BeaconRow::new(3, 0.0, 2.0, 0.0),
        ])
        .unwrap();
        let shared =
            SharedFilterContext::new(FilterContext::new(FilterConfig::default(), beacons).unwrap());

        let gyro = {
            let shared = shared.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    shared.on_angular_rate(&AngularRateSample {
                        timestamp: i as f64 * 0.02,
                        rate: Vector3::new(0.0, 0.0, 0.05),
                    });
                }
            })
        };
        let camera = {
            let shared = shared.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    let detections = (1..=3)
                        .map(|id| Detection {
                            beacon_id: BeaconId(id),
                            range: 1.5,
                            orientation: UnitQuaternion::identity(),
                        })
                        .collect();
                    shared.on_detections(&DetectionBatch {
                        timestamp: i as f64 * 0.1,
                        detections,
                    });
                }
            })
        };
        gyro.join().unwrap();
        camera.join().unwrap();

        let ctx = shared.lock();
        assert_eq!(ctx.cycles(), 100);
        assert!(ctx.get_x_est().iter().all(|v| v.is_finite()));
        let cov = ctx.estimator().as_ekf().unwrap().cov();
        assert_eq!(*cov, cov.transpose());
    }
}
