//! RCS flight software
//!
//! The onboard GNC program for a small sounding rocket with a four-nozzle
//! cold-gas reaction control system. A serial reader ingests attitude
//! frames, six scalar Kalman filters smooth the zeroed Euler signals, a
//! PD/P law computes the demanded pitch/yaw forces and roll moment, a
//! simplex allocator distributes them over the four one-sided valves, and
//! the resulting PWM commands are dispatched to the valve controller over
//! an acknowledged UART link. The mission sequencer walks the flight from
//! pad calibration through the active-control window to shutdown.

pub mod cadence;
pub mod config;
pub mod console;
pub mod control_law;
pub mod estimator;
pub mod logs;
pub mod sequencer;
pub mod state;
pub mod tasks;
