//! Vehicle trajectory models and ground-truth propagation.
//!
//! The vehicle carries a true pose (position, yaw) and forward speed, and a
//! `MotionSpec` describing how it moves. Pitch and roll stay at zero, so the
//! true body angular rate is `[0, 0, yaw_rate]`.

use nav_core::metrics::GroundTruthPose;
use serde::{Deserialize, Serialize};

/// Describes vehicle motion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MotionSpec {
    /// Station keeping: zero speed, zero rate.
    Hold,
    /// Straight line at constant speed (m/s).
    Cruise { speed: f64 },
    /// Constant yaw-rate turn. `yaw_rate` in rad/s, positive counter-clockwise.
    Turn { speed: f64, yaw_rate: f64 },
    /// Switch motion model at given sim times.
    /// `segments` is sorted by time ascending: [(t_start, MotionSpec), ...].
    /// The active spec is the last one whose t_start <= current_t.
    Segmented { segments: Vec<(f64, Box<MotionSpec>)> },
}

impl MotionSpec {
    /// (speed, yaw_rate) commanded at time `t`.
    fn command(&self, t: f64) -> (f64, f64) {
        match self {
            MotionSpec::Hold => (0.0, 0.0),
            MotionSpec::Cruise { speed } => (*speed, 0.0),
            MotionSpec::Turn { speed, yaw_rate } => (*speed, *yaw_rate),
            MotionSpec::Segmented { segments } => segments
                .iter()
                .filter(|(t_start, _)| *t_start <= t)
                .last()
                .map_or((0.0, 0.0), |(_, spec)| spec.command(t)),
        }
    }
}

/// The simulated vehicle with ground-truth state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vehicle {
    /// True position in the tank frame (meters)
    pub position: [f64; 3],
    /// True yaw (radians)
    pub yaw: f64,
    /// True forward speed (m/s)
    pub speed: f64,
    pub motion: MotionSpec,
}

impl Vehicle {
    pub fn new(position: [f64; 3], yaw: f64, motion: MotionSpec) -> Self {
        Self {
            position,
            yaw,
            speed: 0.0,
            motion,
        }
    }

    /// Propagate true state by `dt` seconds. Returns the body angular rate
    /// (rad/s) applied over the step.
    pub fn step(&mut self, t: f64, dt: f64) -> [f64; 3] {
        let (speed, yaw_rate) = self.motion.command(t);
        self.speed = speed;
        self.position[0] += speed * self.yaw.cos() * dt;
        self.position[1] += speed * self.yaw.sin() * dt;
        self.yaw = nav_core::orientation::wrap_angle(self.yaw + yaw_rate * dt);
        [0.0, 0.0, yaw_rate]
    }

    pub fn truth(&self, time: f64) -> GroundTruthPose {
        GroundTruthPose {
            time,
            position: self.position,
            yaw: self.yaw,
            speed: self.speed,
        }
    }
}
