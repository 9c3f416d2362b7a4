//! Manual valve exerciser.
//!
//! Arms the valve controller, holds a commanded PWM quadruple for a while
//! (re-framing inside the controller's 150 ms watchdog) and resets it.
//! Used on the bench for valve checkout and thrust-curve calibration runs.

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use log::info;

use hardware::serial;
use hardware::valves::{ValveController, PWM_MAX};

#[derive(Parser, Debug)]
#[command(name = "valve_tool")]
#[command(about = "Manual RCS valve exerciser")]
struct Args {
    /// Serial port path of the valve controller (e.g., /dev/ttyAMA0)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(long, default_value_t = serial::VALVE_BAUD)]
    baud: u32,

    /// The four 10-bit PWM values to hold
    #[arg(long, num_args = 4, default_values_t = [0u16, 0, 0, 0])]
    pwm: Vec<u16>,

    /// How long to hold the command [s]
    #[arg(long, default_value = "5")]
    hold_secs: u64,

    /// Seconds the armed controller spends on its audible warning
    #[arg(long, default_value = "10")]
    arm_warning_secs: u64,

    /// Only send the reset handshake and exit
    #[arg(long)]
    reset_only: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let pwm: [u16; 4] = args.pwm.as_slice().try_into().expect("clap enforces 4 values");
    if let Some(bad) = pwm.iter().find(|&&p| p > PWM_MAX) {
        anyhow::bail!("PWM value {bad} exceeds the 10-bit range");
    }

    let port = serial::open_8n1(&args.port, args.baud, Duration::from_millis(500))?;
    let mut controller = ValveController::new(port);

    if args.reset_only {
        controller.reset()?;
        info!("Controller reset");
        return Ok(());
    }

    info!("Resetting controller");
    controller.reset()?;
    std::thread::sleep(Duration::from_millis(500));

    info!("Arming; stand clear of the nozzles for the warning tone");
    controller.arm()?;
    std::thread::sleep(Duration::from_secs(args.arm_warning_secs));

    info!("Holding PWM {pwm:?} for {} s", args.hold_secs);
    let deadline = Instant::now() + Duration::from_secs(args.hold_secs);
    while Instant::now() < deadline {
        controller.send_pwm(pwm)?;
        // Stay well inside the 150 ms watchdog.
        std::thread::sleep(Duration::from_millis(50));
    }

    controller.close_valves()?;
    controller.reset()?;
    info!("Valves closed, controller reset");
    Ok(())
}
