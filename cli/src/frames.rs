//! Frame relabeling for published poses.
//!
//! The filter works in a North-East-Down style tank frame. Downstream
//! consumers expect East-North-Up:
//!
//! x_enu = y_ned,  y_enu = x_ned,  z_enu = −z_ned
//! yaw_enu = −(yaw_ned − π/2)

use nalgebra::Vector3;
use nav_core::{orientation::wrap_angle, Pose, YawPitchRoll};
use serde::Serialize;
use std::f64::consts::FRAC_PI_2;

pub fn ned_to_enu(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.y, v.x, -v.z)
}

pub fn yaw_ned_to_enu(yaw: f64) -> f64 {
    wrap_angle(-(yaw - FRAC_PI_2))
}

/// A pose as published to consumers.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct EnuPose {
    pub time: f64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub yaw: f64,
}

impl EnuPose {
    pub fn from_ned(time: f64, pose: &Pose) -> Self {
        let yaw = YawPitchRoll::from_quaternion(&pose.orientation).yaw;
        let p = ned_to_enu(&pose.position);
        let v = ned_to_enu(&pose.velocity);
        Self {
            time,
            position: [p.x, p.y, p.z],
            velocity: [v.x, v.y, v.z],
            yaw: yaw_ned_to_enu(yaw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::UnitQuaternion;
    use std::f64::consts::PI;

    #[test]
    fn axes_swap_and_flip() {
        let enu = ned_to_enu(&Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(enu, Vector3::new(2.0, 1.0, -3.0));
    }

    #[test]
    fn north_is_ninety_degrees_enu() {
        assert_abs_diff_eq!(yaw_ned_to_enu(0.0), FRAC_PI_2, epsilon = 1e-12);
        assert_abs_diff_eq!(yaw_ned_to_enu(FRAC_PI_2), 0.0, epsilon = 1e-12);
        // West in NED is −π/2; in ENU it faces π
        assert_abs_diff_eq!(yaw_ned_to_enu(-FRAC_PI_2).abs(), PI, epsilon = 1e-12);
    }

    #[test]
    fn pose_conversion() {
        let pose = Pose {
            position: Vector3::new(1.0, 0.5, 0.2),
            orientation: UnitQuaternion::from_euler_angles(0.0, 0.0, FRAC_PI_2),
            velocity: Vector3::new(0.0, 0.1, 0.0),
        };
        let enu = EnuPose::from_ned(3.0, &pose);
        assert_eq!(enu.position, [0.5, 1.0, -0.2]);
        assert_abs_diff_eq!(enu.velocity[0], 0.1, epsilon = 1e-15);
        assert_abs_diff_eq!(enu.yaw, 0.0, epsilon = 1e-12);
    }
}
