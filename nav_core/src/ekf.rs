//! Range-only Extended Kalman Filter.
//!
//! ## State vector
//! x = [px, py, pz, v]ᵀ  (tank-frame position, forward speed)
//!
//! ## Transition
//! With heading h = q·x̂ from the shared motion model:
//! p ← p + h·v·dt,  v ← v
//! F = I₄ + dt · [[0₃ h]; [0 0]]
//!
//! ## Process noise
//! Q = diag(σp²·dt, σp²·dt, σp²·dt, σv²·dt)  (random walk densities)
//!
//! ## Observation
//! One row per beacon: zᵢ = ‖p − bᵢ‖, Hᵢ = [uᵢᵀ 0] with uᵢ the unit vector
//! from beacon to predicted position. All rows of a cycle are stacked into
//! a single linearised update; the covariance uses the Joseph form and is
//! re-symmetrised afterwards.
//!
//! ## Observability
//! Fewer than three independent beacon directions leave part of the position
//! unobserved. The correction is still well defined; it only shrinks the
//! covariance along the observed directions.

use crate::{
    error::{NavError, Result},
    estimator::{Estimator, UpdateReport},
    motion::MotionModel,
    types::{DMat, DVec, Measurement, Position, StateCov, StateVec},
};
use nalgebra::Vector3;
use sensor_models::RangeObservation;
use serde::{Deserialize, Serialize};

/// Result of a KF update step, exposed for diagnostics.
#[derive(Clone, Debug)]
pub struct KfUpdateResult {
    pub state: StateVec,
    pub cov: StateCov,
    /// Innovation ν = z − h(x)
    pub innovation: DVec,
    /// Innovation covariance S = H·P·Hᵀ + R
    pub innovation_cov: DMat,
    /// Kalman gain K
    pub kalman_gain: DMat,
}

/// Configuration for the range EKF.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EkfConfig {
    /// Initial position guess (tank frame, meters)
    pub initial_position: [f64; 3],
    /// Initial forward speed (m/s)
    pub initial_speed: f64,
    pub initial_position_std: f64,
    pub initial_speed_std: f64,
    /// Range measurement noise std dev (meters)
    pub range_noise_std: f64,
    /// Position random-walk density (m/√s)
    pub position_noise_density: f64,
    /// Speed random-walk density (m/s/√s)
    pub speed_noise_density: f64,
    /// Factor applied to the speed estimate on every empty detection cycle
    pub dropout_speed_decay: f64,
    /// Speed std dev added on every empty detection cycle (m/s)
    pub dropout_speed_std: f64,
    /// Floor applied to every variance after a correction
    pub min_variance: f64,
}

impl Default for EkfConfig {
    fn default() -> Self {
        Self {
            initial_position: [1.5, 1.0, 0.5], // middle of a 3 × 2 × 1.5 m tank
            initial_speed: 0.0,
            initial_position_std: 1.0,
            initial_speed_std: 0.2,
            range_noise_std: 0.1,
            position_noise_density: 0.02,
            speed_noise_density: 0.05,
            dropout_speed_decay: 0.8,
            dropout_speed_std: 0.02,
            min_variance: 1e-9,
        }
    }
}

impl EkfConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("initial_position_std", self.initial_position_std),
            ("initial_speed_std", self.initial_speed_std),
            ("range_noise_std", self.range_noise_std),
        ];
        for (name, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(NavError::InvalidConfig(format!("ekf.{name} must be > 0, got {v}")));
            }
        }
        let non_negative = [
            ("position_noise_density", self.position_noise_density),
            ("speed_noise_density", self.speed_noise_density),
            ("dropout_speed_std", self.dropout_speed_std),
            ("min_variance", self.min_variance),
        ];
        for (name, v) in non_negative {
            if !(v.is_finite() && v >= 0.0) {
                return Err(NavError::InvalidConfig(format!("ekf.{name} must be >= 0, got {v}")));
            }
        }
        if !(0.0..=1.0).contains(&self.dropout_speed_decay) {
            return Err(NavError::InvalidConfig(format!(
                "ekf.dropout_speed_decay must be in [0, 1], got {}",
                self.dropout_speed_decay
            )));
        }
        if !self.initial_position.iter().all(|c| c.is_finite()) || !self.initial_speed.is_finite() {
            return Err(NavError::InvalidConfig("ekf initial state must be finite".into()));
        }
        Ok(())
    }
}

/// One linearised range row.
#[derive(Clone, Copy, Debug)]
struct RangeRow {
    z: f64,
    hx: f64,
    jacobian: Vector3<f64>,
    variance: f64,
}

/// Range-only EKF over [position, forward speed].
#[derive(Clone, Debug)]
pub struct RangeEkf {
    config: EkfConfig,
    state: StateVec,
    cov: StateCov,
    motion: MotionModel,
}

impl RangeEkf {
    pub fn new(config: EkfConfig) -> Result<Self> {
        let [x, y, z] = config.initial_position;
        let state = StateVec::new(x, y, z, config.initial_speed);
        let sp = config.initial_position_std.powi(2);
        let sv = config.initial_speed_std.powi(2);
        let cov = StateCov::from_diagonal(&StateVec::new(sp, sp, sp, sv));
        Self::with_state(config, state, cov)
    }

    /// Start from an explicit mean and covariance.
    pub fn with_state(config: EkfConfig, state: StateVec, cov: StateCov) -> Result<Self> {
        config.validate()?;
        if !state.iter().chain(cov.iter()).all(|v| v.is_finite()) {
            return Err(NavError::InvalidConfig("ekf initial state must be finite".into()));
        }
        Ok(Self {
            config,
            state,
            cov: symmetrize(&cov),
            motion: MotionModel::new(),
        })
    }

    pub fn config(&self) -> &EkfConfig {
        &self.config
    }

    /// Mean [px, py, pz, v].
    pub fn state(&self) -> &StateVec {
        &self.state
    }

    pub fn cov(&self) -> &StateCov {
        &self.cov
    }

    pub fn position(&self) -> Position {
        self.state.fixed_rows::<3>(0).into_owned()
    }

    /// Build state transition matrix F for heading `h` and timestep `dt`.
    pub fn transition_matrix(heading: &Vector3<f64>, dt: f64) -> StateCov {
        let mut f = StateCov::identity();
        // position += heading * speed * dt
        f[(0, 3)] = heading.x * dt;
        f[(1, 3)] = heading.y * dt;
        f[(2, 3)] = heading.z * dt;
        f
    }

    fn process_noise(&self, dt: f64) -> StateCov {
        let qp = self.config.position_noise_density.powi(2) * dt;
        let qv = self.config.speed_noise_density.powi(2) * dt;
        StateCov::from_diagonal(&StateVec::new(qp, qp, qp, qv))
    }

    /// Empty-cycle pseudo-update: pull the speed toward zero and widen its
    /// variance. Position is untouched.
    pub fn decay_velocity(&mut self) {
        self.state[3] *= self.config.dropout_speed_decay;
        self.cov[(3, 3)] += self.config.dropout_speed_std.powi(2);
        tracing::debug!(speed = self.state[3], "no detections: speed decayed");
    }

    /// Batched range correction for one detection cycle.
    pub fn update_ranges(&mut self, measurements: &[Measurement]) -> UpdateReport {
        let mut report = UpdateReport::default();
        let (rows, skipped) = self.linearize(measurements);
        report.skipped = skipped;
        if rows.is_empty() {
            return report;
        }

        if self.apply_rows(&rows) {
            report.applied = rows.len();
            return report;
        }

        // Stacked update rejected (S not positive definite or a non-finite
        // result): retry one beacon at a time, relinearising after each
        // accepted row.
        for m in measurements {
            let (row, _) = self.linearize(std::slice::from_ref(m));
            if !row.is_empty() && self.apply_rows(&row) {
                report.applied += 1;
            } else if !row.is_empty() {
                report.skipped += 1;
            }
        }
        report
    }

    fn linearize(&self, measurements: &[Measurement]) -> (Vec<RangeRow>, usize) {
        let position = self.position();
        let mut rows = Vec::with_capacity(measurements.len());
        let mut skipped = 0;
        for m in measurements {
            let obs = RangeObservation::new(*m.beacon_position(), self.config.range_noise_std);
            match obs.jacobian(&position) {
                Some(jacobian) => rows.push(RangeRow {
                    z: m.range(),
                    hx: obs.apply(&position),
                    jacobian,
                    variance: obs.variance(),
                }),
                None => {
                    tracing::debug!(beacon = %m.beacon_id(), "predicted position on beacon, range skipped");
                    skipped += 1;
                }
            }
        }
        (rows, skipped)
    }

    /// Apply stacked rows. Returns false (state untouched) if the update is
    /// numerically unusable.
    fn apply_rows(&mut self, rows: &[RangeRow]) -> bool {
        let m = rows.len();
        let z = DVec::from_iterator(m, rows.iter().map(|r| r.z));
        let hx = DVec::from_iterator(m, rows.iter().map(|r| r.hx));
        let mut h = DMat::zeros(m, 4);
        for (i, row) in rows.iter().enumerate() {
            h[(i, 0)] = row.jacobian.x;
            h[(i, 1)] = row.jacobian.y;
            h[(i, 2)] = row.jacobian.z;
        }
        let r = DMat::from_diagonal(&DVec::from_iterator(m, rows.iter().map(|r| r.variance)));

        let Some(res) = Self::update_ekf(&self.state, &self.cov, &z, &hx, &h, &r) else {
            tracing::debug!(rows = m, "innovation covariance not positive definite");
            return false;
        };
        if !res.state.iter().chain(res.cov.iter()).all(|v| v.is_finite()) {
            tracing::warn!(rows = m, "non-finite EKF update discarded");
            return false;
        }
        self.state = res.state;
        self.cov = sanitize_covariance(&res.cov, self.config.min_variance);
        true
    }

    /// Update step for EKF.
    /// `z` is the measurement.
    /// `hx` is the predicted measurement h(x_pred).
    /// `h_jacobian` is the Jacobian matrix H evaluated at x_pred.
    /// `r` is the measurement noise covariance.
    ///
    /// Returns `None` if the innovation covariance is not positive definite.
    pub fn update_ekf(
        state: &StateVec,
        cov: &StateCov,
        z: &DVec,
        hx: &DVec,
        h_jacobian: &DMat,
        r: &DMat,
    ) -> Option<KfUpdateResult> {
        let p_dyn = DMat::from_column_slice(4, 4, cov.as_slice());

        // Innovation: ν = z − h(x)
        let innovation = z - hx;

        // Innovation covariance: S = H·P·Hᵀ + R
        let s = h_jacobian * &p_dyn * h_jacobian.transpose() + r;

        // Kalman gain: K = P·Hᵀ·S⁻¹
        let s_inv = s.clone().cholesky()?.inverse();
        let k = &p_dyn * h_jacobian.transpose() * &s_inv;

        // Updated state: x' = x + K·ν
        let state_update = &k * &innovation;
        let new_state = StateVec::from_fn(|r, _| state[r] + state_update[r]);

        // Updated covariance (Joseph form)
        let i_kh = DMat::identity(4, 4) - &k * h_jacobian;
        let new_p_dyn = &i_kh * &p_dyn * i_kh.transpose() + &k * r * k.transpose();
        let new_cov = StateCov::from_fn(|r, c| new_p_dyn[(r, c)]);

        Some(KfUpdateResult {
            state: new_state,
            cov: new_cov,
            innovation,
            innovation_cov: s,
            kalman_gain: k,
        })
    }
}

fn symmetrize(cov: &StateCov) -> StateCov {
    (cov + cov.transpose()) * 0.5
}

/// Symmetrise and floor the diagonal so the covariance stays a valid PSD
/// matrix under rounding.
fn sanitize_covariance(cov: &StateCov, min_variance: f64) -> StateCov {
    let mut c = symmetrize(cov);
    for i in 0..4 {
        if c[(i, i)] < min_variance {
            c[(i, i)] = min_variance;
        }
    }
    c
}

impl Estimator for RangeEkf {
    fn predict(&mut self, rate: &Vector3<f64>, dt: f64) {
        self.motion.integrate_rate(rate, dt);
        if dt <= 0.0 {
            return;
        }
        let f = Self::transition_matrix(&self.motion.heading(), dt);
        let q = self.process_noise(dt);
        self.state = f * self.state;
        self.cov = symmetrize(&(f * self.cov * f.transpose() + q));
    }

    fn update(&mut self, measurements: &[Measurement]) -> UpdateReport {
        if measurements.is_empty() {
            self.decay_velocity();
            return UpdateReport {
                dropout: true,
                ..Default::default()
            };
        }
        self.update_ranges(measurements)
    }

    fn position_estimate(&self) -> Position {
        self.position()
    }

    fn forward_speed(&self) -> f64 {
        self.state[3]
    }

    fn motion(&self) -> &MotionModel {
        &self.motion
    }

    fn motion_mut(&mut self) -> &mut MotionModel {
        &mut self.motion
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BeaconId, YawPitchRoll};
    use approx::assert_abs_diff_eq;
    use nalgebra::UnitQuaternion;
    use std::f64::consts::FRAC_PI_4;

    fn meas(id: u32, range: f64, beacon: [f64; 3]) -> Measurement {
        Measurement::new(
            BeaconId(id),
            range,
            Position::from(beacon),
            YawPitchRoll::default(),
        )
    }

    fn ekf_at(position: [f64; 3], pos_std: f64, speed_std: f64) -> RangeEkf {
        RangeEkf::new(EkfConfig {
            initial_position: position,
            initial_position_std: pos_std,
            initial_speed_std: speed_std,
            range_noise_std: 0.1,
            ..Default::default()
        })
        .unwrap()
    }

    fn trace(cov: &StateCov) -> f64 {
        (0..4).map(|i| cov[(i, i)]).sum()
    }

    #[test]
    fn predict_without_rotation_moves_along_heading() {
        let mut ekf = RangeEkf::with_state(
            EkfConfig::default(),
            StateVec::new(1.0, 1.0, 0.5, 0.4),
            StateCov::identity() * 0.1,
        )
        .unwrap();
        ekf.motion_mut()
            .set_attitude(UnitQuaternion::from_euler_angles(0.0, 0.0, FRAC_PI_4));
        let attitude = *ekf.motion().attitude();

        for _ in 0..10 {
            ekf.predict(&Vector3::zeros(), 0.05);
        }

        // 0.4 m/s × 0.5 s along 45°
        let step = 0.2 * FRAC_PI_4.cos();
        assert_abs_diff_eq!(ekf.state()[0], 1.0 + step, epsilon = 1e-12);
        assert_abs_diff_eq!(ekf.state()[1], 1.0 + step, epsilon = 1e-12);
        assert_abs_diff_eq!(ekf.state()[2], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(ekf.forward_speed(), 0.4, epsilon = 1e-12);
        assert_eq!(*ekf.motion().attitude(), attitude);
    }

    #[test]
    fn predict_grows_uncertainty() {
        let mut ekf = ekf_at([1.0, 1.0, 0.5], 0.1, 0.1);
        let before = trace(ekf.cov());
        ekf.predict(&Vector3::new(0.0, 0.0, 0.2), 0.02);
        assert!(trace(ekf.cov()) > before);
    }

    #[test]
    fn trilateration_regression_fixture() {
        // P₀ = I, R = 0.01, beacons at (0,0,0), (2,0,0), (0,2,0), all ranges 1.
        let mut ekf = ekf_at([1.0, 1.0, 0.0], 1.0, 1.0);
        let report = ekf.update(&[
            meas(1, 1.0, [0.0, 0.0, 0.0]),
            meas(2, 1.0, [2.0, 0.0, 0.0]),
            meas(3, 1.0, [0.0, 2.0, 0.0]),
        ]);

        assert_eq!(report.applied, 3);
        assert_eq!(report.skipped, 0);
        assert_abs_diff_eq!(ekf.state()[0], 0.7100067140460836, epsilon = 1e-9);
        assert_abs_diff_eq!(ekf.state()[1], 0.7100067140460836, epsilon = 1e-9);
        assert_abs_diff_eq!(ekf.state()[2], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ekf.cov()[(0, 0)], 0.007438057238559678, epsilon = 1e-9);
        // coplanar beacons: z stays unobserved
        assert_abs_diff_eq!(ekf.cov()[(2, 2)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn repeated_updates_converge_to_truth() {
        let beacons = [
            [0.0, 0.0, 0.0],
            [3.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [0.0, 0.0, 1.5],
        ];
        let truth = Position::new(1.2, 0.8, 0.6);
        let measurements: Vec<Measurement> = beacons
            .iter()
            .enumerate()
            .map(|(i, b)| meas(i as u32, (truth - Position::from(*b)).norm(), *b))
            .collect();

        let mut ekf = ekf_at([1.7, 0.3, 0.9], 0.5, 0.5);
        let mut prev_trace = trace(ekf.cov());
        for _ in 0..50 {
            let report = ekf.update(&measurements);
            assert_eq!(report.applied, 4);
            let t = trace(ekf.cov());
            assert!(t < prev_trace, "trace must strictly decrease: {t} !< {prev_trace}");
            prev_trace = t;
        }
        let err = (ekf.position() - truth).norm();
        assert!(err < 0.01, "position error {err}");
    }

    #[test]
    fn zero_range_measurement_skipped() {
        let mut ekf = ekf_at([1.0, 1.0, 0.0], 0.5, 0.5);
        let report = ekf.update(&[meas(1, 0.0, [1.0, 1.0, 0.0]), meas(2, 1.5, [0.0, 0.0, 0.0])]);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.applied, 1);
        assert!(ekf.state().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn dropout_decays_speed_and_holds_position() {
        let mut ekf = RangeEkf::with_state(
            EkfConfig::default(),
            StateVec::new(2.0, 1.0, 0.3, 0.5),
            StateCov::identity() * 0.05,
        )
        .unwrap();
        let var_before = ekf.cov()[(3, 3)];

        let report = ekf.update(&[]);

        assert!(report.dropout);
        assert_eq!(ekf.position(), Position::new(2.0, 1.0, 0.3));
        assert_abs_diff_eq!(ekf.forward_speed(), 0.4, epsilon = 1e-12);
        assert!(ekf.cov()[(3, 3)] > var_before);
    }

    #[test]
    fn covariance_stays_symmetric_psd() {
        let mut ekf = ekf_at([0.5, 1.5, 0.2], 1.0, 0.3);
        ekf.motion_mut()
            .set_attitude(UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3));
        let truth = Position::new(1.0, 1.0, 0.5);
        let beacons = [[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [0.0, 2.0, 1.5]];
        for k in 0..200 {
            ekf.predict(&Vector3::new(0.0, 0.0, 0.05), 0.02);
            if k % 5 == 0 {
                let ms: Vec<_> = beacons
                    .iter()
                    .enumerate()
                    .map(|(i, b)| meas(i as u32, (truth - Position::from(*b)).norm(), *b))
                    .collect();
                ekf.update(&ms);
            } else if k % 7 == 0 {
                ekf.update(&[]);
            }
        }
        let cov = ekf.cov();
        assert_abs_diff_eq!((cov - cov.transpose()).norm(), 0.0, epsilon = 1e-15);
        assert!(cov.symmetric_eigenvalues().iter().all(|e| *e >= 0.0));
    }

    fn indefinite_cov(p00: f64) -> StateCov {
        let mut cov = StateCov::identity();
        cov[(0, 0)] = p00;
        cov
    }

    #[test]
    fn stacked_rejection_falls_back_per_beacon() {
        // At (1,1,0) beacon 1 sees H = [1,0,0], beacon 2 sees H = [0,1,0].
        // P₀₀ < 0 makes the stacked S indefinite and row 1 alone unusable.
        let cfg = EkfConfig {
            range_noise_std: 0.1,
            ..Default::default()
        };
        let state = StateVec::new(1.0, 1.0, 0.0, 0.0);
        let mut ekf = RangeEkf::with_state(cfg, state, indefinite_cov(-1.0)).unwrap();
        let ms = [meas(1, 0.9, [0.0, 1.0, 0.0]), meas(2, 0.9, [1.0, 0.0, 0.0])];

        let (rows, _) = ekf.linearize(&ms);
        let z = DVec::from_iterator(2, rows.iter().map(|r| r.z));
        let hx = DVec::from_iterator(2, rows.iter().map(|r| r.hx));
        let mut h = DMat::zeros(2, 4);
        h[(0, 0)] = 1.0;
        h[(1, 1)] = 1.0;
        let r = DMat::identity(2, 2) * 0.01;
        assert!(RangeEkf::update_ekf(ekf.state(), ekf.cov(), &z, &hx, &h, &r).is_none());

        let report = ekf.update(&ms);
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(ekf.state()[0], 1.0);
        assert_abs_diff_eq!(ekf.state()[1], 1.0 - 0.1 / 1.01, epsilon = 1e-12);
        assert!(ekf.cov()[(0, 0)] > 0.0);
    }

    #[test]
    fn singular_innovation_covariance_is_rejected() {
        let h = DMat::from_row_slice(1, 4, &[1.0, 0.0, 0.0, 0.0]);
        let z = DVec::from_element(1, 1.0);
        let hx = DVec::from_element(1, 0.5);
        let r = DMat::zeros(1, 1);
        let res = RangeEkf::update_ekf(&StateVec::zeros(), &StateCov::zeros(), &z, &hx, &h, &r);
        assert!(res.is_none());
    }

    #[test]
    fn non_finite_update_leaves_state_untouched() {
        // Cross term P₀₃ turns a huge innovation into an infinite speed step.
        let mut cov = StateCov::identity();
        cov[(0, 3)] = 1000.0;
        cov[(3, 0)] = 1000.0;
        let state = StateVec::new(1.0, 1.0, 0.0, 0.2);
        let mut ekf = RangeEkf::with_state(EkfConfig::default(), state, cov).unwrap();
        let before_cov = *ekf.cov();

        let report = ekf.update(&[meas(1, f64::MAX, [0.0, 1.0, 0.0])]);

        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(*ekf.state(), state);
        assert_eq!(*ekf.cov(), before_cov);
    }

    #[test]
    fn invalid_config_rejected() {
        let cfg = EkfConfig {
            range_noise_std: 0.0,
            ..Default::default()
        };
        assert!(matches!(RangeEkf::new(cfg), Err(NavError::InvalidConfig(_))));
    }
}
