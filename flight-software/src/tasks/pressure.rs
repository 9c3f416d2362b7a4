//! Pressure logging thread.
//!
//! Samples the radial and axial nose-cone sensors at a fixed cadence and
//! appends both readings to the pressure log. This is instrumentation only:
//! read failures are counted and, if persistent, end the thread without
//! touching the rest of the flight.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use hardware::pressure::{decode_frame, PressureBus, TransferFunction};

use crate::cadence::Cadence;
use crate::logs::{ErrorLog, TsvLogger};
use crate::state::{Latest, PressureReadings, SharedFlag};

pub const PRESSURE_LOG_HEADER: &str =
    "time_us\tradial_status\tradial_p\tradial_T\taxial_status\taxial_p\taxial_T";

/// Consecutive bus failures tolerated before the thread gives up.
const MAX_CONSECUTIVE_READ_FAULTS: u32 = 50;

pub struct PressureTaskHandle {
    quit: SharedFlag,
    join: Option<JoinHandle<()>>,
}

impl PressureTaskHandle {
    pub fn shutdown(mut self) {
        self.quit.raise();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for PressureTaskHandle {
    fn drop(&mut self) {
        self.quit.raise();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

pub fn spawn_pressure(
    mut radial: Box<dyn PressureBus>,
    mut axial: Box<dyn PressureBus>,
    cell: Latest<PressureReadings>,
    mut pressure_log: TsvLogger,
    errors: ErrorLog,
    epoch: Instant,
    period: Duration,
) -> PressureTaskHandle {
    let quit = SharedFlag::new();
    let thread_quit = quit.clone();
    let transfer = TransferFunction::default();

    let join = std::thread::spawn(move || {
        let mut cadence = Cadence::new(period);
        let mut consecutive_faults = 0u32;

        while !thread_quit.is_raised() {
            let tick = cadence.wait();
            if let Some(overrun) = tick.overrun {
                info!("pressure loop overran by {overrun:?}");
            }

            let frames = radial.transfer().and_then(|r| Ok((r, axial.transfer()?)));
            let (radial_frame, axial_frame) = match frames {
                Ok(frames) => frames,
                Err(e) => {
                    consecutive_faults += 1;
                    warn!("pressure read failed: {e}");
                    if consecutive_faults >= MAX_CONSECUTIVE_READ_FAULTS {
                        errors.record(format!(
                            "pressure: {consecutive_faults} consecutive read failures, stopping"
                        ));
                        break;
                    }
                    continue;
                }
            };
            consecutive_faults = 0;

            let radial_sample = decode_frame(radial_frame, transfer);
            let axial_sample = decode_frame(axial_frame, transfer);
            let elapsed_us = epoch.elapsed().as_micros() as u64;

            cell.publish(PressureReadings {
                elapsed_us,
                radial_mbar: radial_sample.pressure_mbar,
                radial_temp_c: radial_sample.temperature_c,
                axial_mbar: axial_sample.pressure_mbar,
                axial_temp_c: axial_sample.temperature_c,
            });

            let line = format!(
                "{}\t{}\t{:.5}\t{:.5}\t{}\t{:.5}\t{:.5}",
                elapsed_us,
                radial_sample.status.tag(),
                radial_sample.pressure_mbar,
                radial_sample.temperature_c,
                axial_sample.status.tag(),
                axial_sample.pressure_mbar,
                axial_sample.temperature_c,
            );
            if let Err(e) = pressure_log.write_line(&line) {
                errors.record(format!("pressure: log write failed: {e}"));
                break;
            }
        }
        info!("pressure thread exiting");
    });

    PressureTaskHandle {
        quit,
        join: Some(join),
    }
}
