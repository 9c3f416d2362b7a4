//! The long-lived pipeline threads.
//!
//! Each stage runs on its own thread behind a spawn function returning a
//! handle; handles raise a shared quit flag and join on shutdown. Fatal
//! faults are signalled through a [`crate::state::SharedFlag`] the mission
//! sequencer checks between phases.

pub mod control;
pub mod estimator;
pub mod imu_reader;
pub mod pressure;

pub use control::{spawn_control, ControlCycle, ControlFault, ControlTaskHandle, CONTROL_LOG_HEADER};
pub use estimator::{spawn_estimator, EstimatorTaskHandle, IMU_LOG_HEADER};
pub use imu_reader::{spawn_imu_reader, ImuReaderHandle};
pub use pressure::{spawn_pressure, PressureTaskHandle, PRESSURE_LOG_HEADER};
