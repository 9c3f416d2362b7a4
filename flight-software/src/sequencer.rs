//! Mission sequencer.
//!
//! Walks the flight through its phases on the main thread: boot and
//! pre-flight checks, pad calibration, filter warm-up, arming, launch
//! detection on the umbilical line, the engine-burn wait, the active
//! control window and shutdown. Operator prompts gate the pre-flight
//! transitions; timers and the launch edge drive the rest. Worker threads
//! signal unrecoverable trouble through a shared fatal flag that is checked
//! between steps.

use std::fmt;
use std::fs;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::info;

use gnc_math::CalibrationAccumulator;
use hardware::camera::CameraRecorder;
use hardware::launch_detect::LaunchDetect;
use hardware::pressure::{CharDevBus, PressureBus};
use hardware::serial;
use hardware::valves::ValveController;

use crate::cadence::Cadence;
use crate::config::FlightConfig;
use crate::console;
use crate::control_law::ControlLaw;
use crate::estimator::AttitudePipeline;
use crate::logs::{ErrorLogHandle, TsvLogger};
use crate::state::{
    AttitudeSnapshot, ControlDemand, Latest, PressureReadings, RawSample, SharedFlag,
    ThrustAssignment,
};
use crate::tasks::{
    self, ControlCycle, CONTROL_LOG_HEADER, IMU_LOG_HEADER, PRESSURE_LOG_HEADER,
};

/// Mission phases in flight order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightPhase {
    Boot,
    Calibrate,
    FilterWarmup,
    Armed,
    WaitLaunch,
    BurnWait,
    ActiveWindow,
    Descent,
    Shutdown,
}

impl fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boot => "boot",
            Self::Calibrate => "calibrate",
            Self::FilterWarmup => "filter-warmup",
            Self::Armed => "armed",
            Self::WaitLaunch => "wait-launch",
            Self::BurnWait => "burn-wait",
            Self::ActiveWindow => "active-window",
            Self::Descent => "descent",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Controlled or logging-only flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightMode {
    Active,
    Passive,
}

fn enter(phase: FlightPhase) {
    info!("entering phase: {phase}");
}

/// Sleep through `duration`, aborting early if a worker raised the fatal
/// flag.
fn wait_checking_fatal(duration: Duration, fatal: &SharedFlag, what: &str) -> Result<()> {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        if fatal.is_raised() {
            bail!("fatal fault raised during {what}");
        }
        std::thread::sleep(Duration::from_millis(50).min(deadline - Instant::now()));
    }
    Ok(())
}

/// Run the whole mission. Returns after shutdown or on a fatal fault.
pub fn run(config: FlightConfig) -> Result<()> {
    config.validate().context("flight configuration rejected")?;
    let epoch = Instant::now();
    enter(FlightPhase::Boot);

    fs::create_dir_all(&config.log_dir).with_context(|| {
        format!("Failed to create log directory {}", config.log_dir.display())
    })?;
    let error_log = ErrorLogHandle::create(config.log_dir.join("error_log.txt"), epoch)?;

    let camera = CameraRecorder::start(&config.video_file, &[])?;

    let result = fly(&config, epoch, &error_log);

    camera.stop();
    error_log.shutdown();
    match &result {
        Ok(()) => info!("All activities shut down. Good-bye!"),
        Err(e) => info!("Mission aborted: {e:#}"),
    }
    result
}

fn fly(config: &FlightConfig, epoch: Instant, error_log: &ErrorLogHandle) -> Result<()> {
    let fatal = SharedFlag::new();
    let errors = error_log.log();

    let launch_detect = LaunchDetect::new(&config.gpio_chip, config.launch_detect_line)?;

    // Pressure sensors come up first so the operator can eyeball the
    // readings before anything irreversible happens.
    let radial: Box<dyn PressureBus> = Box::new(
        CharDevBus::open(&config.pressure.radial_device)
            .with_context(|| format!("Failed to open {}", config.pressure.radial_device))?,
    );
    let axial: Box<dyn PressureBus> = Box::new(
        CharDevBus::open(&config.pressure.axial_device)
            .with_context(|| format!("Failed to open {}", config.pressure.axial_device))?,
    );

    console::prompt_exact("Type [TEST] to view pressure sensor readings: ", "TEST")?;

    let pressure_cell = Latest::<PressureReadings>::default();
    let pressure_log = TsvLogger::create(
        config.log_dir.join("pressure_log.txt"),
        PRESSURE_LOG_HEADER,
    )?;
    let pressure_task = tasks::spawn_pressure(
        radial,
        axial,
        pressure_cell.clone(),
        pressure_log,
        errors.clone(),
        epoch,
        Duration::from_micros(config.timing.pressure_period_us),
    );

    show_pressure_preview(&pressure_cell, config, &fatal)?;
    console::prompt_exact("\nIs this OK? Type [Calibrate] to continue: ", "Calibrate")?;

    // Attitude sensor link and reader thread.
    let imu_port = serial::open_8n1(
        &config.imu_port,
        serial::IMU_BAUD,
        Duration::from_millis(50),
    )?;
    let raw_cell = Latest::<RawSample>::default();
    let synced = SharedFlag::new();
    let reader_task = tasks::spawn_imu_reader(
        imu_port,
        raw_cell.clone(),
        synced.clone(),
        fatal.clone(),
        errors.clone(),
        epoch,
    );

    info!("waiting for IMU sync");
    while !synced.is_raised() {
        if fatal.is_raised() {
            bail!("fatal fault while syncing with the attitude sensor");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    // Let a first real frame land before calibration starts.
    std::thread::sleep(Duration::from_micros(config.timing.estimator_period_us));

    enter(FlightPhase::Calibrate);
    let calibration = calibrate(config, &raw_cell, &fatal)?;
    println!(
        "\nFinished calibrating over {} samples. Mean attitude: yaw {:.4}°, pitch {:.4}°, roll {:.4}°",
        calibration.samples,
        calibration.mean.yaw.to_degrees(),
        calibration.mean.pitch.to_degrees(),
        calibration.mean.roll.to_degrees(),
    );
    console::prompt_exact("Is this OK? Type [Filter] to continue: ", "Filter")?;

    enter(FlightPhase::FilterWarmup);
    let seed = raw_cell.snapshot().euler;
    let pipeline = AttitudePipeline::new(
        calibration,
        config.kalman.angle.into(),
        config.kalman.rate.into(),
        seed,
    )
    .context("calibration produced a degenerate attitude")?;

    let attitude_cell = Latest::<AttitudeSnapshot>::default();
    let imu_log = TsvLogger::create(config.log_dir.join("imu_log.txt"), IMU_LOG_HEADER)?;
    let estimator_task = tasks::spawn_estimator(
        pipeline,
        raw_cell.clone(),
        attitude_cell.clone(),
        imu_log,
        errors.clone(),
        fatal.clone(),
        epoch,
        Duration::from_micros(config.timing.estimator_period_us),
        config.max_consecutive_faults,
    );

    show_filter_preview(&attitude_cell, config, &fatal)?;
    console::prompt_exact("Is this OK? Type [Continue] to continue: ", "Continue")?;

    enter(FlightPhase::Armed);
    let choice = console::prompt_choice(
        "Is this a controlled (active) or uncontrolled (passive) flight? Type [ACTIVE] or [PASSIVE]: ",
        &["ACTIVE", "PASSIVE"],
    )?;
    let mode = if choice == 0 {
        FlightMode::Active
    } else {
        FlightMode::Passive
    };

    let mut controller = None;
    if mode == FlightMode::Active {
        let valve_port = serial::open_8n1(
            &config.valve_port,
            serial::VALVE_BAUD,
            Duration::from_millis(500),
        )?;
        let mut valves = ValveController::new(valve_port);

        // Reset first in case the controller is mid-program from an earlier
        // attempt, then arm and sit through its audible warning.
        info!("resetting valve controller");
        valves.reset()?;
        std::thread::sleep(Duration::from_millis(500));
        info!("arming valve controller");
        valves.arm()?;
        wait_checking_fatal(
            Duration::from_secs(config.arm_warning_secs),
            &fatal,
            "the arm warning",
        )?;
        controller = Some(valves);
    }

    console::prompt_exact(
        "Type [CONNECTED_CONNECTED_CONNECTED!] when you have connected the launchpad battery umbilical: ",
        "CONNECTED_CONNECTED_CONNECTED!",
    )?;

    enter(FlightPhase::WaitLaunch);
    println!("Awaiting launch umbilical cord disconnect...");
    while launch_detect.is_umbilical_connected()? {
        if fatal.is_raised() {
            bail!("fatal fault while waiting for launch");
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    info!("LAUNCH detected");

    match mode {
        FlightMode::Active => {
            enter(FlightPhase::BurnWait);
            wait_checking_fatal(
                Duration::from_micros(config.timing.engine_burn_us),
                &fatal,
                "the engine burn",
            )?;

            enter(FlightPhase::ActiveWindow);
            let curve = config.valve_curve().expect("config validated at load");
            let cycle = ControlCycle::new(
                ControlLaw::new(config.control.clone()),
                curve,
                controller.take().expect("active mode armed the controller"),
                config.control.nozzle_offset,
                config.control.max_valve_thrust,
            );
            let control_log =
                TsvLogger::create(config.log_dir.join("control_log.txt"), CONTROL_LOG_HEADER)?;
            let demand_cell = Latest::<ControlDemand>::default();
            let assignment_cell = Latest::<ThrustAssignment>::default();

            let control_task = tasks::spawn_control(
                cycle,
                attitude_cell.clone(),
                demand_cell,
                assignment_cell,
                control_log,
                errors.clone(),
                fatal.clone(),
                epoch,
                Duration::from_micros(config.timing.control_period_us),
            );

            let window = wait_checking_fatal(
                Duration::from_micros(config.timing.active_control_us),
                &fatal,
                "the active window",
            );

            // Shut the loop down in every case; the final zero frame and
            // the controller reset must happen even on a fatal abort.
            let cycle = control_task
                .shutdown()
                .map_err(|_| anyhow::anyhow!("control thread panicked"))?;
            info!(
                "control window closed ({} infeasible cycles)",
                cycle.infeasible_cycles()
            );
            let mut valves = cycle.into_controller();
            valves.reset()?;
            window?;

            enter(FlightPhase::Descent);
            wait_checking_fatal(
                Duration::from_micros(config.timing.descent_us),
                &fatal,
                "descent",
            )?;
        }
        FlightMode::Passive => {
            enter(FlightPhase::BurnWait);
            let total = config.timing.engine_burn_us
                + config.timing.active_control_us
                + config.timing.descent_us;
            wait_checking_fatal(Duration::from_micros(total), &fatal, "the passive flight")?;
        }
    }

    enter(FlightPhase::Shutdown);
    estimator_task.shutdown();
    reader_task.shutdown();
    pressure_task.shutdown();
    Ok(())
}

/// Average raw attitude over the calibration window.
fn calibrate(
    config: &FlightConfig,
    raw_cell: &Latest<RawSample>,
    fatal: &SharedFlag,
) -> Result<gnc_math::attitude::Calibration> {
    let mut accumulator = CalibrationAccumulator::new();
    let mut cadence = Cadence::new(Duration::from_micros(config.timing.estimator_period_us));
    let window = Duration::from_micros(config.timing.calibration_us);
    let started = Instant::now();

    while started.elapsed() <= window {
        if fatal.is_raised() {
            bail!("fatal fault during calibration");
        }
        cadence.wait();
        let sample = raw_cell.snapshot();
        accumulator.add(sample.euler);
        println!(
            "t: {} us\tpsi: {:.4}°\ttheta: {:.4}°\tphi: {:.4}°",
            sample.elapsed_us,
            sample.euler.yaw.to_degrees(),
            sample.euler.pitch.to_degrees(),
            sample.euler.roll.to_degrees(),
        );
    }

    accumulator
        .finish(config.min_calibration_samples)
        .context("pad calibration failed")
}

fn show_pressure_preview(
    cell: &Latest<PressureReadings>,
    config: &FlightConfig,
    fatal: &SharedFlag,
) -> Result<()> {
    let mut cadence = Cadence::new(Duration::from_micros(config.timing.pressure_period_us));
    let window = Duration::from_micros(config.timing.calibration_us);
    let started = Instant::now();
    while started.elapsed() <= window {
        if fatal.is_raised() {
            bail!("fatal fault during the pressure preview");
        }
        cadence.wait();
        let readings = cell.snapshot();
        println!(
            "radial p: {:.4} mbar\tradial T: {:.4} °C\taxial p: {:.4} mbar\taxial T: {:.4} °C",
            readings.radial_mbar,
            readings.radial_temp_c,
            readings.axial_mbar,
            readings.axial_temp_c,
        );
    }
    Ok(())
}

fn show_filter_preview(
    cell: &Latest<AttitudeSnapshot>,
    config: &FlightConfig,
    fatal: &SharedFlag,
) -> Result<()> {
    let mut cadence = Cadence::new(Duration::from_micros(config.timing.estimator_period_us));
    let window = Duration::from_micros(config.timing.calibration_us);
    let started = Instant::now();
    while started.elapsed() <= window {
        if fatal.is_raised() {
            bail!("fatal fault during filter warm-up");
        }
        cadence.wait();
        let s = cell.snapshot();
        println!(
            "dt: {:.4}\tpsi_f: {:.2}°\tpsi_dot_f: {:.2}°/s\ttheta_f: {:.2}°\ttheta_dot_f: {:.2}°/s\tphi_f: {:.2}°\tphi_dot_f: {:.2}°/s",
            s.dt,
            s.filtered.yaw.to_degrees(),
            s.filtered_rates.yaw.to_degrees(),
            s.filtered.pitch.to_degrees(),
            s.filtered_rates.pitch.to_degrees(),
            s.filtered.roll.to_degrees(),
            s.filtered_rates.roll.to_degrees(),
        );
    }
    Ok(())
}
