//! `sim`: tank simulator with vehicle trajectories, gyro and beacon detections, replay.

pub mod replay;
pub mod scenarios;
pub mod tank_sim;
pub mod vehicle;

pub use replay::{load_replay, save_replay, ReplayLog};
pub use scenarios::{Scenario, ScenarioKind};
pub use tank_sim::{SimEvent, TankSimulator};
pub use vehicle::{MotionSpec, Vehicle};
