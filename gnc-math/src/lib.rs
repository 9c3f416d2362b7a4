//! Estimation and allocation mathematics
//!
//! This crate provides the numeric core of the RCS flight software: the
//! scalar Kalman filters used for attitude smoothing, direction-cosine
//! construction and zeroing, angle unwrapping, the simplex-based thrust
//! allocator and the calibrated valve thrust-to-PWM curve.

pub mod allocator;
pub mod attitude;
pub mod kalman;
pub mod simplex;
pub mod valve_curve;

pub use allocator::{
    allocate, reconstruct_demand, AllocationError, ThrustAllocation, ThrustDemand,
};
pub use attitude::{
    body_to_world_dcm, euler_to_body_rates, unwrap_angle, zeroed_euler, zeroing_matrix,
    AttitudeError, Calibration, CalibrationAccumulator, CalibrationError, EulerAngles,
    EulerRates,
};
pub use kalman::{KalmanError, KalmanNoise, ScalarKalman};
pub use simplex::{maximize, SimplexOutcome, NUM_CONSTRAINTS, NUM_VARS};
pub use valve_curve::{CurveError, ValveCurve};
