//! Calibrated valve thrust-versus-PWM characteristic.
//!
//! The proportional solenoid valves are driven open loop: a demanded thrust
//! is turned into a PWM duty value by linear interpolation on a curve
//! measured on the ground with a thrust balance. The curve must be strictly
//! monotone in both columns and start at zero thrust; its last point defines
//! the valve thrust ceiling.

use thiserror::Error;

/// Curve validation error
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CurveError {
    #[error("valve curve needs at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("valve curve is not strictly monotone at point {0}")]
    NonMonotone(usize),
    #[error("valve curve must start at zero thrust, starts at {0}")]
    NonZeroOrigin(f64),
    #[error("non-finite thrust value at point {0}")]
    NonFinite(usize),
}

/// Strictly monotone (thrust [N], pwm) characteristic of one valve.
#[derive(Debug, Clone, PartialEq)]
pub struct ValveCurve {
    points: Vec<(f64, u16)>,
}

impl ValveCurve {
    /// Build and validate a curve from (thrust, pwm) pairs.
    pub fn new(points: Vec<(f64, u16)>) -> Result<Self, CurveError> {
        if points.len() < 2 {
            return Err(CurveError::TooFewPoints(points.len()));
        }
        if let Some(i) = points.iter().position(|(t, _)| !t.is_finite()) {
            return Err(CurveError::NonFinite(i));
        }
        if points[0].0 != 0.0 {
            return Err(CurveError::NonZeroOrigin(points[0].0));
        }
        for i in 1..points.len() {
            if points[i].0 <= points[i - 1].0 || points[i].1 <= points[i - 1].1 {
                return Err(CurveError::NonMonotone(i));
            }
        }
        Ok(Self { points })
    }

    /// The balance-measured curve of the flight valves (10-bit PWM units;
    /// the valves only begin to open near half duty).
    pub fn default_flight_curve() -> Self {
        Self::new(vec![
            (0.0, 310),
            (0.17, 420),
            (0.25, 520),
            (0.29, 620),
            (0.32, 720),
            (0.34, 820),
            (0.35, 920),
            (0.36, 1020),
        ])
        .expect("default curve is valid")
    }

    /// The thrust ceiling (last calibrated point) [N].
    pub fn max_thrust(&self) -> f64 {
        self.points[self.points.len() - 1].0
    }

    /// The PWM value commanding maximum thrust.
    pub fn max_pwm(&self) -> u16 {
        self.points[self.points.len() - 1].1
    }

    /// Map a demanded thrust to a PWM value.
    ///
    /// Zero maps to PWM 0 directly (valve unpowered); demands at or above
    /// the ceiling map to the last calibrated PWM.
    pub fn pwm_for_thrust(&self, thrust: f64) -> u16 {
        if thrust <= 0.0 {
            return 0;
        }
        if thrust >= self.max_thrust() {
            return self.max_pwm();
        }
        // Find the segment [k-1, k] bracketing the demand.
        let k = self
            .points
            .iter()
            .position(|&(t, _)| thrust < t)
            .expect("thrust below ceiling is bracketed");
        let (t0, p0) = self.points[k - 1];
        let (t1, p1) = self.points[k];
        let fraction = (thrust - t0) / (t1 - t0);
        (f64::from(p0) + f64::from(p1 - p0) * fraction).round() as u16
    }
}
