//! Attitude estimator thread.
//!
//! Runs the estimation pipeline at its fixed cadence on whatever raw sample
//! is latest, publishes the attitude snapshot and appends every cycle to
//! the IMU log. Dropped samples leave the previous snapshot in place; too
//! many consecutive drops raise the fatal flag.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::cadence::Cadence;
use crate::estimator::AttitudePipeline;
use crate::logs::{ErrorLog, TsvLogger};
use crate::state::{AttitudeSnapshot, Latest, RawSample, SharedFlag};

pub const IMU_LOG_HEADER: &str = "time_us\tdt\tpsi\ttheta\tphi\tpsi_dot\ttheta_dot\tphi_dot\t\
psi_filt\ttheta_filt\tphi_filt\tpsi_dot_filt\ttheta_dot_filt\tphi_dot_filt\t\
wx\twy\twz\taccel_x\taccel_y\taccel_z";

pub struct EstimatorTaskHandle {
    quit: SharedFlag,
    join: Option<JoinHandle<()>>,
}

impl EstimatorTaskHandle {
    pub fn shutdown(mut self) {
        self.quit.raise();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for EstimatorTaskHandle {
    fn drop(&mut self) {
        self.quit.raise();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn spawn_estimator(
    mut pipeline: AttitudePipeline,
    raw_cell: Latest<RawSample>,
    attitude_cell: Latest<AttitudeSnapshot>,
    mut imu_log: TsvLogger,
    errors: ErrorLog,
    fatal: SharedFlag,
    epoch: Instant,
    period: Duration,
    max_consecutive_faults: u32,
) -> EstimatorTaskHandle {
    let quit = SharedFlag::new();
    let thread_quit = quit.clone();

    let join = std::thread::spawn(move || {
        let mut cadence = Cadence::new(period);
        while !thread_quit.is_raised() {
            let tick = cadence.wait();
            if let Some(overrun) = tick.overrun {
                info!("estimator loop overran by {overrun:?}");
            }

            let raw = raw_cell.snapshot();
            let elapsed_us = epoch.elapsed().as_micros() as u64;

            match pipeline.process(raw.euler, raw.accel, tick.dt, elapsed_us) {
                Ok(snapshot) => {
                    attitude_cell.publish(snapshot);
                    if let Err(e) = imu_log.write_line(&format_imu_record(&snapshot)) {
                        errors.record(format!("estimator: IMU log write failed: {e}"));
                        fatal.raise();
                        break;
                    }
                }
                Err(fault) => {
                    // Drop the sample; consumers keep the last snapshot.
                    warn!("estimator dropped a sample: {fault}");
                    errors.record(format!("estimator: sample dropped: {fault}"));
                    if pipeline.consecutive_faults() >= max_consecutive_faults {
                        errors.record(format!(
                            "estimator: {} consecutive drops, aborting",
                            pipeline.consecutive_faults()
                        ));
                        fatal.raise();
                        break;
                    }
                }
            }
        }
        info!("estimator thread exiting");
    });

    EstimatorTaskHandle {
        quit,
        join: Some(join),
    }
}

fn format_imu_record(s: &AttitudeSnapshot) -> String {
    format!(
        "{}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}",
        s.elapsed_us,
        s.dt,
        s.zeroed.yaw,
        s.zeroed.pitch,
        s.zeroed.roll,
        s.raw_rates.yaw,
        s.raw_rates.pitch,
        s.raw_rates.roll,
        s.filtered.yaw,
        s.filtered.pitch,
        s.filtered.roll,
        s.filtered_rates.yaw,
        s.filtered_rates.pitch,
        s.filtered_rates.roll,
        s.body_rates[0],
        s.body_rates[1],
        s.body_rates[2],
        s.accel[0],
        s.accel[1],
        s.accel[2],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imu_record_column_count() {
        let record = format_imu_record(&AttitudeSnapshot::default());
        assert_eq!(record.split('\t').count(), IMU_LOG_HEADER.split('\t').count());
    }
}
