//! Control thread: law, allocation, PWM linearisation and dispatch.
//!
//! One control cycle reads the latest attitude snapshot, computes the
//! demanded efforts, allocates them over the four valves, maps thrusts to
//! PWM through the calibrated curve and transmits the frame to the valve
//! controller. An infeasible demand commands zero thrust for the cycle; an
//! unbounded allocation or a dead controller link is fatal. On shutdown the
//! thread sends a final all-zeros frame so the valves are closed before the
//! controller watchdog would do it.

use std::io::{Read, Write};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use gnc_math::{allocate, AllocationError, ThrustDemand, ValveCurve};
use hardware::valves::{ValveController, ValveError};

use crate::cadence::Cadence;
use crate::control_law::ControlLaw;
use crate::logs::{ErrorLog, TsvLogger};
use crate::state::{AttitudeSnapshot, ControlDemand, Latest, SharedFlag, ThrustAssignment};

pub const CONTROL_LOG_HEADER: &str =
    "time_us\tloop_us\tFpitch\tFyaw\tMroll\tR1\tR2\tR3\tR4\tPWM1\tPWM2\tPWM3\tPWM4";

/// A fault that ends the control loop.
#[derive(Debug, Error)]
pub enum ControlFault {
    #[error("thrust allocation unbounded")]
    Unbounded,
    #[error("valve controller link failed: {0}")]
    Valve(#[from] ValveError),
}

/// One cycle's outputs.
#[derive(Debug, Clone, Copy)]
pub struct CycleOutput {
    pub demand: ControlDemand,
    pub assignment: ThrustAssignment,
}

/// The per-tick control computation, separated from the thread so it can be
/// exercised against the mock valve controller.
pub struct ControlCycle<P> {
    law: ControlLaw,
    curve: ValveCurve,
    controller: ValveController<P>,
    nozzle_offset: f64,
    max_valve_thrust: f64,
    infeasible_cycles: u64,
}

impl<P: Read + Write> ControlCycle<P> {
    pub fn new(
        law: ControlLaw,
        curve: ValveCurve,
        controller: ValveController<P>,
        nozzle_offset: f64,
        max_valve_thrust: f64,
    ) -> Self {
        Self {
            law,
            curve,
            controller,
            nozzle_offset,
            max_valve_thrust,
            infeasible_cycles: 0,
        }
    }

    /// Cycles that fell back to zero thrust on an infeasible demand.
    pub fn infeasible_cycles(&self) -> u64 {
        self.infeasible_cycles
    }

    /// Run one control cycle against `snapshot`.
    pub fn tick(
        &mut self,
        snapshot: &AttitudeSnapshot,
        elapsed_us: u64,
    ) -> Result<CycleOutput, ControlFault> {
        let mut demand = self.law.compute(snapshot);
        demand.elapsed_us = elapsed_us;

        let requested = ThrustDemand {
            pitch_force: demand.pitch_force,
            yaw_force: demand.yaw_force,
            roll_moment: demand.roll_moment,
        };

        let (thrust, zero_valve) = match allocate(
            requested,
            snapshot.filtered.roll,
            self.nozzle_offset,
            self.max_valve_thrust,
        ) {
            Ok(allocation) => (allocation.thrust, allocation.zero_valve),
            Err(AllocationError::Infeasible) => {
                // Fall back to closed valves for this cycle.
                self.infeasible_cycles += 1;
                ([0.0; 4], 0)
            }
            Err(AllocationError::Unbounded) => return Err(ControlFault::Unbounded),
        };

        let pwm = thrust.map(|r| self.curve.pwm_for_thrust(r));
        self.controller.send_pwm(pwm)?;

        Ok(CycleOutput {
            demand,
            assignment: ThrustAssignment {
                elapsed_us,
                thrust,
                pwm,
                zero_valve,
            },
        })
    }

    /// Close all valves (the final frame of the active window).
    pub fn close_valves(&mut self) -> Result<(), ValveError> {
        self.controller.close_valves()
    }

    pub fn into_controller(self) -> ValveController<P> {
        self.controller
    }
}

pub struct ControlTaskHandle<P> {
    quit: SharedFlag,
    join: JoinHandle<ControlCycle<P>>,
}

impl<P> ControlTaskHandle<P> {
    /// Stop the loop and get the cycle (and its controller port) back.
    pub fn shutdown(self) -> std::thread::Result<ControlCycle<P>> {
        self.quit.raise();
        self.join.join()
    }
}

/// Start the control thread. It owns the valve controller for the duration
/// of the active window and hands it back on shutdown, after commanding a
/// final all-zeros frame.
#[allow(clippy::too_many_arguments)]
pub fn spawn_control<P: Read + Write + Send + 'static>(
    mut cycle: ControlCycle<P>,
    attitude_cell: Latest<AttitudeSnapshot>,
    demand_cell: Latest<ControlDemand>,
    assignment_cell: Latest<ThrustAssignment>,
    mut control_log: TsvLogger,
    errors: ErrorLog,
    fatal: SharedFlag,
    epoch: Instant,
    period: Duration,
) -> ControlTaskHandle<P> {
    let quit = SharedFlag::new();
    let thread_quit = quit.clone();

    let join = std::thread::spawn(move || {
        let mut cadence = Cadence::new(period);
        while !thread_quit.is_raised() {
            let tick = cadence.wait();
            if let Some(overrun) = tick.overrun {
                info!("control loop overran by {overrun:?}");
            }

            let snapshot = attitude_cell.snapshot();
            let elapsed_us = epoch.elapsed().as_micros() as u64;

            match cycle.tick(&snapshot, elapsed_us) {
                Ok(output) => {
                    demand_cell.publish(output.demand);
                    assignment_cell.publish(output.assignment);
                    let line = format_control_record(&output, tick.dt);
                    if let Err(e) = control_log.write_line(&line) {
                        errors.record(format!("control: log write failed: {e}"));
                        fatal.raise();
                        break;
                    }
                }
                Err(fault) => {
                    errors.record(format!("control: {fault}"));
                    fatal.raise();
                    break;
                }
            }
        }

        // Final transmission: all valves shut.
        if let Err(e) = cycle.close_valves() {
            warn!("failed to send final zero frame: {e}");
            errors.record(format!("control: final zero frame failed: {e}"));
        }
        info!("control thread exiting");
        cycle
    });

    ControlTaskHandle { quit, join }
}

fn format_control_record(output: &CycleOutput, dt: f64) -> String {
    let d = &output.demand;
    let a = &output.assignment;
    format!(
        "{}\t{}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{:.5}\t{}\t{}\t{}\t{}",
        d.elapsed_us,
        (dt * 1e6) as u64,
        d.pitch_force,
        d.yaw_force,
        d.roll_moment,
        a.thrust[0],
        a.thrust[1],
        a.thrust[2],
        a.thrust[3],
        a.pwm[0],
        a.pwm[1],
        a.pwm[2],
        a.pwm[3],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_record_column_count() {
        let output = CycleOutput {
            demand: ControlDemand::default(),
            assignment: ThrustAssignment::default(),
        };
        let record = format_control_record(&output, 0.02);
        assert_eq!(
            record.split('\t').count(),
            CONTROL_LOG_HEADER.split('\t').count()
        );
    }
}
