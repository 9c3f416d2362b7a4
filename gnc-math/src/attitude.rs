//! Direction-cosine construction, zeroing and angle unwrapping.
//!
//! Angles follow the Tait-Bryan ZYX convention: yaw ψ about Z, pitch θ about
//! Y, roll φ about X, with the X axis along the nose. "Zeroing" pre-multiplies
//! the current body-to-world DCM by a calibration matrix R₀ so that the
//! launch-pad orientation maps to the identity.

use nalgebra::{Matrix3, Vector3};
use std::f64::consts::TAU;
use thiserror::Error;

/// A Tait-Bryan ZYX Euler triple in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EulerAngles {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Euler angular rates in rad/s.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EulerRates {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Per-sample attitude fault
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum AttitudeError {
    #[error("non-finite element in zeroed direction cosine matrix")]
    NonFiniteDcm,
}

/// Calibration failure
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CalibrationError {
    #[error("too few calibration samples: got {got}, need at least {need}")]
    TooFewSamples { got: usize, need: usize },
}

/// Build the body-to-world DCM for the given Euler triple.
pub fn body_to_world_dcm(angles: EulerAngles) -> Matrix3<f64> {
    let (sy, cy) = angles.yaw.sin_cos();
    let (sp, cp) = angles.pitch.sin_cos();
    let (sr, cr) = angles.roll.sin_cos();

    Matrix3::new(
        cp * cy,
        sr * sp * cy - cr * sy,
        cr * sp * cy + sr * sy,
        cp * sy,
        sr * sp * sy + cr * cy,
        cr * sp * sy - sr * cy,
        -sp,
        sr * cp,
        cr * cp,
    )
}

/// Build the zeroing matrix R₀ from the calibration-mean orientation.
///
/// R₀ is the inverse of the mean-orientation DCM, so that
/// `R₀ · body_to_world_dcm(mean)` is the identity.
pub fn zeroing_matrix(mean: EulerAngles) -> Matrix3<f64> {
    body_to_world_dcm(mean).transpose()
}

/// Zero the raw Euler triple against R₀ and recover the zeroed angles.
pub fn zeroed_euler(r0: &Matrix3<f64>, raw: EulerAngles) -> Result<EulerAngles, AttitudeError> {
    let dcm = r0 * body_to_world_dcm(raw);
    if dcm.iter().any(|v| !v.is_finite()) {
        return Err(AttitudeError::NonFiniteDcm);
    }
    let pitch = -dcm[(2, 0)].asin();
    let yaw = dcm[(1, 0)].atan2(dcm[(0, 0)]);
    let roll = dcm[(2, 1)].atan2(dcm[(2, 2)]);
    if !pitch.is_finite() || !yaw.is_finite() || !roll.is_finite() {
        return Err(AttitudeError::NonFiniteDcm);
    }
    Ok(EulerAngles { yaw, pitch, roll })
}

/// Shift `now` by the integer multiple of 2π that brings it within π of
/// `previous`, defeating the ±π wrap of atan2.
pub fn unwrap_angle(now: f64, previous: f64) -> f64 {
    now - TAU * ((now - previous) / TAU).round()
}

/// Convert filtered Euler rates to body rates (ω_x, ω_y, ω_z).
pub fn euler_to_body_rates(angles: EulerAngles, rates: EulerRates) -> Vector3<f64> {
    let (sp, cp) = angles.pitch.sin_cos();
    let (sr, cr) = angles.roll.sin_cos();
    Vector3::new(
        rates.roll - rates.yaw * sp,
        rates.pitch * cr + rates.yaw * cp * sr,
        rates.yaw * cp * cr - rates.pitch * sr,
    )
}

/// Accumulates raw Euler samples on the pad and produces the zeroing matrix.
#[derive(Debug, Default)]
pub struct CalibrationAccumulator {
    sum: EulerAngles,
    count: usize,
}

/// The result of a completed pad calibration.
#[derive(Debug, Clone)]
pub struct Calibration {
    /// Mean raw orientation over the calibration window
    pub mean: EulerAngles,
    /// Zeroing matrix R₀
    pub r0: Matrix3<f64>,
    /// Number of samples averaged
    pub samples: usize,
}

impl CalibrationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sample: EulerAngles) {
        self.sum.yaw += sample.yaw;
        self.sum.pitch += sample.pitch;
        self.sum.roll += sample.roll;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Finish the calibration, failing if fewer than `min_samples` samples
    /// were collected.
    pub fn finish(self, min_samples: usize) -> Result<Calibration, CalibrationError> {
        if self.count < min_samples {
            return Err(CalibrationError::TooFewSamples {
                got: self.count,
                need: min_samples,
            });
        }
        let n = self.count as f64;
        let mean = EulerAngles {
            yaw: self.sum.yaw / n,
            pitch: self.sum.pitch / n,
            roll: self.sum.roll / n,
        };
        Ok(Calibration {
            mean,
            r0: zeroing_matrix(mean),
            samples: self.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_dcm_is_a_rotation() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..50 {
            let angles = EulerAngles {
                yaw: rng.gen_range(-3.0..3.0),
                pitch: rng.gen_range(-1.4..1.4),
                roll: rng.gen_range(-3.0..3.0),
            };
            let dcm = body_to_world_dcm(angles);
            assert_relative_eq!(dcm.determinant(), 1.0, epsilon = 1e-10);
            assert_relative_eq!(dcm * dcm.transpose(), Matrix3::identity(), epsilon = 1e-10);
        }
    }

    #[test]
    fn test_zeroing_at_calibration_mean() {
        // Raw samples constant at the calibration mean must zero exactly.
        let mean = EulerAngles {
            yaw: 0.10,
            pitch: -0.05,
            roll: 0.02,
        };
        let r0 = zeroing_matrix(mean);
        let zeroed = zeroed_euler(&r0, mean).unwrap();
        assert_relative_eq!(zeroed.yaw, 0.0, epsilon = 1e-12);
        assert_relative_eq!(zeroed.pitch, 0.0, epsilon = 1e-12);
        assert_relative_eq!(zeroed.roll, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zeroed_euler_roundtrip() {
        // With an identity R₀ the recovered angles equal the inputs.
        let r0 = Matrix3::identity();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..50 {
            let angles = EulerAngles {
                yaw: rng.gen_range(-3.0..3.0),
                pitch: rng.gen_range(-1.4..1.4),
                roll: rng.gen_range(-3.0..3.0),
            };
            let recovered = zeroed_euler(&r0, angles).unwrap();
            assert_relative_eq!(recovered.yaw, angles.yaw, epsilon = 1e-10);
            assert_relative_eq!(recovered.pitch, angles.pitch, epsilon = 1e-10);
            assert_relative_eq!(recovered.roll, angles.roll, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_unwrap_across_pi_boundary() {
        // A wrap from +3.10 to -3.18 is a small forward step, not a jump of
        // nearly -2π.
        let unwrapped = unwrap_angle(-3.18, 3.10);
        assert_relative_eq!(unwrapped, -3.18 + std::f64::consts::TAU, epsilon = 1e-12);
        assert_relative_eq!(unwrapped, 3.1031853, epsilon = 1e-6);

        // Differentiating at 50 Hz gives a modest rate.
        let rate = (unwrapped - 3.10) / 0.02;
        assert_relative_eq!(rate, 0.159, epsilon = 1e-2);
    }

    #[test]
    fn test_unwrap_bound() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..200 {
            let previous = rng.gen_range(-20.0..20.0);
            let now = rng.gen_range(-3.2..3.2);
            let unwrapped = unwrap_angle(now, previous);
            assert!(
                (unwrapped - previous).abs() <= std::f64::consts::PI + 1e-12,
                "|{unwrapped} - {previous}| exceeds pi"
            );
        }
    }

    #[test]
    fn test_unwrap_idempotence() {
        // Feeding an already-unwrapped stream through the step changes nothing.
        let stream = [3.05, 3.10, 3.14, 3.20, 3.31];
        let mut previous = stream[0];
        for &angle in &stream[1..] {
            let unwrapped = unwrap_angle(angle, previous);
            assert_relative_eq!(unwrapped, angle, epsilon = 1e-12);
            previous = unwrapped;
        }
    }

    #[test]
    fn test_body_rates_at_level_attitude() {
        // At zero pitch and roll the body rates equal the Euler rates.
        let rates = EulerRates {
            yaw: 0.3,
            pitch: -0.2,
            roll: 0.1,
        };
        let omega = euler_to_body_rates(EulerAngles::default(), rates);
        assert_relative_eq!(omega.x, 0.1, epsilon = 1e-12);
        assert_relative_eq!(omega.y, -0.2, epsilon = 1e-12);
        assert_relative_eq!(omega.z, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_body_rates_rolled_ninety_degrees() {
        // At φ = π/2 pitch and yaw rates exchange body axes.
        let angles = EulerAngles {
            yaw: 0.0,
            pitch: 0.0,
            roll: std::f64::consts::FRAC_PI_2,
        };
        let rates = EulerRates {
            yaw: 0.3,
            pitch: -0.2,
            roll: 0.0,
        };
        let omega = euler_to_body_rates(angles, rates);
        assert_relative_eq!(omega.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(omega.y, 0.3, epsilon = 1e-12);
        assert_relative_eq!(omega.z, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_calibration_mean() {
        let mut acc = CalibrationAccumulator::new();
        for _ in 0..250 {
            acc.add(EulerAngles {
                yaw: 0.10,
                pitch: -0.05,
                roll: 0.02,
            });
        }
        let calibration = acc.finish(100).unwrap();
        assert_eq!(calibration.samples, 250);
        assert_relative_eq!(calibration.mean.yaw, 0.10, epsilon = 1e-12);
        assert_relative_eq!(calibration.mean.pitch, -0.05, epsilon = 1e-12);
        assert_relative_eq!(calibration.mean.roll, 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_calibration_too_few_samples() {
        let mut acc = CalibrationAccumulator::new();
        acc.add(EulerAngles::default());
        assert_eq!(
            acc.finish(100).unwrap_err(),
            CalibrationError::TooFewSamples { got: 1, need: 100 }
        );
    }
}
