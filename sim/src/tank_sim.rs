//! Sensor simulator for the tank.
//!
//! Generates time-stamped sensor events from the vehicle's true state:
//! - Gyro samples with Gaussian white noise and a constant bias
//! - Camera frames: beacons within range and field of view, each decoded
//!   with probability `p_detection`, Gaussian range / attitude noise
//! - Dropout windows (frames with no detection at all)
//! - Spurious detections carrying ids that are not in the beacon table
//! - Optional external attitude reference

use crate::vehicle::Vehicle;
use nalgebra::{Rotation3, Vector3};
use nav_core::{
    AngularRateSample, AttitudeReference, BeaconId, BeaconMap, Detection, DetectionBatch,
    YawPitchRoll,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use sensor_models::{CameraParams, ImuParams};
use serde::{Deserialize, Serialize};

/// First id used for spurious detections.
pub const SPURIOUS_ID_BASE: u32 = 10_000;

/// One sensor event, in the order the filter should consume it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimEvent {
    AngularRate(AngularRateSample),
    Detections(DetectionBatch),
    Attitude(AttitudeReference),
}

impl SimEvent {
    pub fn timestamp(&self) -> f64 {
        match self {
            SimEvent::AngularRate(s) => s.timestamp,
            SimEvent::Detections(b) => b.timestamp,
            SimEvent::Attitude(a) => a.timestamp,
        }
    }
}

/// Fixed-rate firing schedule.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Schedule {
    period: f64,
    next_time: f64,
}

impl Schedule {
    fn new(period: f64) -> Self {
        Self {
            period,
            next_time: 0.0,
        }
    }

    /// Fire time if due at `t`, advancing the schedule.
    fn poll(&mut self, t: f64) -> Option<f64> {
        if t + 1e-9 < self.next_time {
            return None;
        }
        let fire = self.next_time;
        self.next_time += self.period;
        Some(fire)
    }
}

/// Camera as configured in a scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimCamera {
    pub params: CameraParams,
    /// True per-axis distortion of the pose solver (unknown to perception)
    pub axis_distortion: [f64; 3],
    /// [start, end) windows (seconds) in which nothing is detected
    pub dropout_windows: Vec<(f64, f64)>,
    /// Probability that a frame carries one spurious detection
    pub p_spurious: f64,
}

impl SimCamera {
    pub fn new(params: CameraParams) -> Self {
        Self {
            params,
            axis_distortion: [1.0; 3],
            dropout_windows: Vec::new(),
            p_spurious: 0.0,
        }
    }

    pub fn in_dropout(&self, t: f64) -> bool {
        self.dropout_windows
            .iter()
            .any(|&(start, end)| t >= start && t < end)
    }
}

/// External attitude source as configured in a scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimAttitudeSource {
    pub rate_hz: f64,
    pub yaw_noise_std: f64,
}

/// Generates sensor events from the vehicle's true state.
pub struct TankSimulator {
    camera: SimCamera,
    imu: ImuParams,
    attitude: Option<SimAttitudeSource>,
    imu_schedule: Schedule,
    camera_schedule: Schedule,
    attitude_schedule: Option<Schedule>,
    rng: ChaCha8Rng,
}

impl TankSimulator {
    pub fn new(
        camera: SimCamera,
        imu: ImuParams,
        attitude: Option<SimAttitudeSource>,
        seed: u64,
    ) -> Self {
        Self {
            imu_schedule: Schedule::new(imu.period()),
            camera_schedule: Schedule::new(1.0 / camera.params.frame_rate),
            attitude_schedule: attitude.as_ref().map(|a| Schedule::new(1.0 / a.rate_hz)),
            camera,
            imu,
            attitude,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn gaussian(&mut self, std: f64) -> f64 {
        self.rng.sample::<f64, _>(StandardNormal) * std
    }

    /// All events due at or before `sim_time`, given the vehicle state and the
    /// true body rate over the last step.
    pub fn generate_events(
        &mut self,
        vehicle: &Vehicle,
        true_rate: [f64; 3],
        beacons: &BeaconMap,
        sim_time: f64,
    ) -> Vec<SimEvent> {
        let mut events = Vec::new();

        while let Some(t) = self.imu_schedule.poll(sim_time) {
            let sigma = self.imu.gyro_noise_std;
            let bias = self.imu.gyro_bias;
            let rate = Vector3::from_fn(|i, _| true_rate[i] + bias[i] + self.gaussian(sigma));
            events.push(SimEvent::AngularRate(AngularRateSample { timestamp: t, rate }));
        }

        if let Some(schedule) = self.attitude_schedule.as_mut() {
            let due: Vec<f64> = std::iter::from_fn(|| schedule.poll(sim_time)).collect();
            let std = self.attitude.as_ref().map_or(0.0, |a| a.yaw_noise_std);
            for t in due {
                let yaw = vehicle.yaw + self.gaussian(std);
                events.push(SimEvent::Attitude(AttitudeReference {
                    timestamp: t,
                    orientation: YawPitchRoll::from_yaw(yaw).to_quaternion(),
                }));
            }
        }

        while let Some(t) = self.camera_schedule.poll(sim_time) {
            let detections = if self.camera.in_dropout(t) {
                Vec::new()
            } else {
                self.detect(vehicle, beacons)
            };
            events.push(SimEvent::Detections(DetectionBatch {
                timestamp: t,
                detections,
            }));
        }

        events.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
        events
    }

    fn detect(&mut self, vehicle: &Vehicle, beacons: &BeaconMap) -> Vec<Detection> {
        let p = &self.camera.params;
        let (max_range, fov_half, p_detection) = (p.max_range, p.fov_half, p.p_detection);
        let (range_std, yaw_std, tilt_std) = (p.range_noise_std, p.yaw_noise_std, p.tilt_noise_std);
        let calibration = p.calibration;

        let world_to_body = Rotation3::from_axis_angle(&Vector3::z_axis(), -vehicle.yaw);
        let position = Vector3::from(vehicle.position);
        let mut detections = Vec::new();

        for beacon in beacons.iter() {
            let offset = world_to_body * (beacon.position - position);
            let range = offset.norm();
            if range > max_range || range <= f64::EPSILON {
                continue;
            }
            // Angle off the forward (x) axis
            if (offset.x / range).acos() > fov_half {
                continue;
            }
            if self.rng.gen::<f64>() > p_detection {
                continue;
            }

            let d = self.camera.axis_distortion;
            let reported = calibration.range_from_offset([
                offset.x * d[0],
                offset.y * d[1],
                offset.z * d[2],
            ]);
            let sample = YawPitchRoll::new(
                vehicle.yaw + self.gaussian(yaw_std),
                self.gaussian(tilt_std),
                self.gaussian(tilt_std),
            );
            detections.push(Detection {
                beacon_id: beacon.id,
                range: (reported + self.gaussian(range_std)).max(0.0),
                orientation: sample.to_quaternion(),
            });
        }

        if self.camera.p_spurious > 0.0 && self.rng.gen::<f64>() < self.camera.p_spurious {
            let id = BeaconId(SPURIOUS_ID_BASE + self.rng.gen_range(0..100));
            detections.push(Detection {
                beacon_id: id,
                range: self.rng.gen_range(0.2..max_range.max(0.3)),
                orientation: YawPitchRoll::from_yaw(self.rng.gen_range(-3.0..3.0)).to_quaternion(),
            });
        }

        detections
    }
}
