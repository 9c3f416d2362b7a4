//! Attitude estimation pipeline.
//!
//! Per raw sample: zero the Euler triple against the pad calibration,
//! unwrap each angle against the previous sample, differentiate, push the
//! six signals through their Kalman filters and derive body rates from the
//! filtered values. A faulted sample is dropped and counted; the caller
//! escalates after too many consecutive drops.

use gnc_math::attitude::Calibration;
use gnc_math::{
    euler_to_body_rates, unwrap_angle, zeroed_euler, AttitudeError, EulerAngles, EulerRates,
    KalmanError, KalmanNoise, ScalarKalman,
};
use thiserror::Error;

use crate::state::AttitudeSnapshot;

/// A dropped sample.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EstimatorFault {
    #[error("non-positive estimator time step: {0}")]
    NonPositiveDt(f64),
    #[error(transparent)]
    Attitude(#[from] AttitudeError),
    #[error("filter fault on {signal}: {source}")]
    Filter {
        signal: &'static str,
        source: KalmanError,
    },
}

struct AxisFilters {
    angle: ScalarKalman,
    rate: ScalarKalman,
}

impl AxisFilters {
    fn new(angle_noise: KalmanNoise, rate_noise: KalmanNoise) -> Self {
        Self {
            angle: ScalarKalman::new(angle_noise),
            rate: ScalarKalman::new(rate_noise),
        }
    }
}

/// Estimator state: calibration, unwrap history and the six filters.
pub struct AttitudePipeline {
    calibration: Calibration,
    previous: EulerAngles,
    yaw: AxisFilters,
    pitch: AxisFilters,
    roll: AxisFilters,
    consecutive_faults: u32,
}

impl AttitudePipeline {
    /// Build the pipeline from a completed calibration and a seed sample
    /// (the first raw reading after calibration, which primes the unwrap
    /// history).
    pub fn new(
        calibration: Calibration,
        angle_noise: KalmanNoise,
        rate_noise: KalmanNoise,
        seed: EulerAngles,
    ) -> Result<Self, AttitudeError> {
        let previous = zeroed_euler(&calibration.r0, seed)?;
        Ok(Self {
            calibration,
            previous,
            yaw: AxisFilters::new(angle_noise, rate_noise),
            pitch: AxisFilters::new(angle_noise, rate_noise),
            roll: AxisFilters::new(angle_noise, rate_noise),
            consecutive_faults: 0,
        })
    }

    /// Consecutive dropped samples since the last good one.
    pub fn consecutive_faults(&self) -> u32 {
        self.consecutive_faults
    }

    /// Process one raw sample into an attitude snapshot.
    pub fn process(
        &mut self,
        raw: EulerAngles,
        accel: [f64; 3],
        dt: f64,
        elapsed_us: u64,
    ) -> Result<AttitudeSnapshot, EstimatorFault> {
        match self.try_process(raw, accel, dt, elapsed_us) {
            Ok(snapshot) => {
                self.consecutive_faults = 0;
                Ok(snapshot)
            }
            Err(fault) => {
                self.consecutive_faults += 1;
                Err(fault)
            }
        }
    }

    fn try_process(
        &mut self,
        raw: EulerAngles,
        accel: [f64; 3],
        dt: f64,
        elapsed_us: u64,
    ) -> Result<AttitudeSnapshot, EstimatorFault> {
        if !(dt > 0.0) || !dt.is_finite() {
            return Err(EstimatorFault::NonPositiveDt(dt));
        }

        let zeroed = zeroed_euler(&self.calibration.r0, raw)?;
        let zeroed = EulerAngles {
            yaw: unwrap_angle(zeroed.yaw, self.previous.yaw),
            pitch: unwrap_angle(zeroed.pitch, self.previous.pitch),
            roll: unwrap_angle(zeroed.roll, self.previous.roll),
        };

        let raw_rates = EulerRates {
            yaw: (zeroed.yaw - self.previous.yaw) / dt,
            pitch: (zeroed.pitch - self.previous.pitch) / dt,
            roll: (zeroed.roll - self.previous.roll) / dt,
        };

        let filtered = EulerAngles {
            yaw: filter("yaw", &mut self.yaw.angle, zeroed.yaw, dt)?,
            pitch: filter("pitch", &mut self.pitch.angle, zeroed.pitch, dt)?,
            roll: filter("roll", &mut self.roll.angle, zeroed.roll, dt)?,
        };
        let filtered_rates = EulerRates {
            yaw: filter("yaw rate", &mut self.yaw.rate, raw_rates.yaw, dt)?,
            pitch: filter("pitch rate", &mut self.pitch.rate, raw_rates.pitch, dt)?,
            roll: filter("roll rate", &mut self.roll.rate, raw_rates.roll, dt)?,
        };

        self.previous = zeroed;

        let omega = euler_to_body_rates(filtered, filtered_rates);

        Ok(AttitudeSnapshot {
            elapsed_us,
            dt,
            zeroed,
            raw_rates,
            filtered,
            filtered_rates,
            body_rates: [omega.x, omega.y, omega.z],
            accel,
        })
    }
}

fn filter(
    signal: &'static str,
    kalman: &mut ScalarKalman,
    z: f64,
    dt: f64,
) -> Result<f64, EstimatorFault> {
    kalman
        .update(z, dt)
        .map_err(|source| EstimatorFault::Filter { signal, source })
}
