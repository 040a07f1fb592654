//! `sensor_models`: Beacon range observation model, camera and inertial sensor parameters.

pub mod camera;
pub mod imu;
pub mod range;

pub use camera::{AxisCalibration, CameraParams};
pub use imu::ImuParams;
pub use range::RangeObservation;
