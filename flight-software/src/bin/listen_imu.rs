//! Listen to the attitude sensor's binary stream over a serial port.
//!
//! Configures the sensor into binary continuous mode, establishes sync and
//! reports frame rate and decode statistics. Useful on the bench for
//! checking wiring and baud setup before a flight.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};

use hardware::serial;
use razor::{commands, parse, SyncScanner, FRAME_LEN};

#[derive(Parser, Debug)]
#[command(name = "listen_imu")]
#[command(about = "Attitude sensor stream receiver and validator")]
struct Args {
    /// Serial port path (e.g., /dev/ttyUSB0)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(long, default_value_t = serial::IMU_BAUD)]
    baud: u32,

    /// Number of frames to receive (0 = infinite)
    #[arg(short, long, default_value = "0")]
    count: u64,

    /// Report statistics every this many frames
    #[arg(long, default_value = "250")]
    report_interval: u64,

    /// Skip mode configuration and sync (listen to an already-streaming sensor)
    #[arg(long)]
    raw: bool,
}

struct Statistics {
    frames: u64,
    start_time: Instant,
    last_report_time: Instant,
    last_report_count: u64,
}

impl Statistics {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            frames: 0,
            start_time: now,
            last_report_time: now,
            last_report_count: 0,
        }
    }

    fn report(&mut self) {
        let now = Instant::now();
        let total_rate = self.frames as f64 / self.start_time.elapsed().as_secs_f64();
        let interval_frames = self.frames - self.last_report_count;
        let interval_rate =
            interval_frames as f64 / now.duration_since(self.last_report_time).as_secs_f64();
        info!(
            "Frames: {} | Rate: {:.1} Hz (interval: {:.1} Hz)",
            self.frames, total_rate, interval_rate
        );
        self.last_report_time = now;
        self.last_report_count = self.frames;
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut port = serial::open_8n1(&args.port, args.baud, Duration::from_millis(100))?;

    if !args.raw {
        info!("Configuring sensor for binary continuous output");
        port.write_all(commands::BINARY_OUTPUT)?;
        port.write_all(commands::CONTINUOUS_OUTPUT)?;
        port.write_all(commands::SILENCE_ERRORS)?;
        std::thread::sleep(Duration::from_secs(2));
        serial::flush_input(port.as_mut())?;
        port.write_all(commands::SYNC_REQUEST)?;

        let mut scanner = SyncScanner::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut synced = false;
        while Instant::now() < deadline && !synced {
            let mut byte = [0u8; 1];
            match port.read(&mut byte) {
                Ok(1) => synced = scanner.feed(byte[0]),
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e).context("read failed during sync"),
            }
        }
        if !synced {
            bail!("no sync token within 10 s; check wiring and baud rate");
        }
        info!("Sync established");
    }

    let mut stats = Statistics::new();
    let mut frame = [0u8; FRAME_LEN];
    let mut filled = 0usize;

    loop {
        match port.read(&mut frame[filled..]) {
            Ok(0) => {}
            Ok(n) => {
                filled += n;
                if filled < FRAME_LEN {
                    continue;
                }
                filled = 0;
                let decoded = parse(&frame).expect("full frame");
                stats.frames += 1;

                log::debug!(
                    "yaw {:.4} pitch {:.4} roll {:.4} accel ({:.2}, {:.2}, {:.2})",
                    decoded.yaw,
                    decoded.pitch,
                    decoded.roll,
                    decoded.accel_x,
                    decoded.accel_y,
                    decoded.accel_z
                );

                if stats.frames % args.report_interval == 0 {
                    stats.report();
                }
                if args.count > 0 && stats.frames >= args.count {
                    stats.report();
                    return Ok(());
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                warn!("Read error: {e}");
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
}
