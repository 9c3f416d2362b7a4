//! Attitude sensor reader thread.
//!
//! Configures the sensor into binary continuous streaming, establishes sync
//! on the `#S` token, then blocks on the serial link publishing each
//! 24-byte frame as the latest raw sample. The port is opened with a finite
//! read timeout, so the thread notices the quit flag within one timeout
//! even while the sensor is silent.

use std::io::{Read, Write};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::{debug, info, warn};

use razor::{commands, parse, SyncScanner, FRAME_LEN};

use crate::logs::ErrorLog;
use crate::state::{Latest, RawSample, SharedFlag};

/// Byte reads between sync-request retries.
const SYNC_RETRY_READS: u32 = 2000;

/// Sync-request retries before the fault is fatal.
const MAX_SYNC_RETRIES: u32 = 10;

/// Settle time after switching the sensor's output mode.
const MODE_SWITCH_SETTLE: Duration = Duration::from_secs(2);

pub struct ImuReaderHandle {
    quit: SharedFlag,
    join: Option<JoinHandle<()>>,
}

impl ImuReaderHandle {
    pub fn shutdown(mut self) {
        self.quit.raise();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ImuReaderHandle {
    fn drop(&mut self) {
        self.quit.raise();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Start the reader. `synced` is raised once the sync token has been seen
/// and frames are flowing.
pub fn spawn_imu_reader(
    port: Box<dyn SerialPort>,
    raw_cell: Latest<RawSample>,
    synced: SharedFlag,
    fatal: SharedFlag,
    errors: ErrorLog,
    epoch: Instant,
) -> ImuReaderHandle {
    let quit = SharedFlag::new();
    let thread_quit = quit.clone();

    let join = std::thread::spawn(move || {
        run_reader(port, raw_cell, synced, fatal, errors, epoch, thread_quit);
        info!("IMU reader thread exiting");
    });

    ImuReaderHandle {
        quit,
        join: Some(join),
    }
}

fn run_reader(
    mut port: Box<dyn SerialPort>,
    raw_cell: Latest<RawSample>,
    synced: SharedFlag,
    fatal: SharedFlag,
    errors: ErrorLog,
    epoch: Instant,
    quit: SharedFlag,
) {
    if let Err(e) = configure_stream(port.as_mut()) {
        errors.record(format!("IMU reader: failed to configure sensor: {e}"));
        fatal.raise();
        return;
    }

    if !find_sync(port.as_mut(), &quit, &errors, &fatal) {
        return;
    }
    info!("IMU sync established");
    synced.raise();

    let mut frame = [0u8; FRAME_LEN];
    let mut filled = 0usize;
    let mut seq = 0u64;

    while !quit.is_raised() {
        match port.read(&mut frame[filled..]) {
            Ok(0) => {}
            Ok(n) => {
                filled += n;
                if filled == FRAME_LEN {
                    filled = 0;
                    // Length is exact by construction.
                    let decoded = parse(&frame).expect("full frame");
                    seq += 1;
                    raw_cell.publish(RawSample {
                        elapsed_us: epoch.elapsed().as_micros() as u64,
                        euler: gnc_math::EulerAngles {
                            yaw: f64::from(decoded.yaw),
                            pitch: f64::from(decoded.pitch),
                            roll: f64::from(decoded.roll),
                        },
                        accel: [
                            f64::from(decoded.accel_x),
                            f64::from(decoded.accel_y),
                            f64::from(decoded.accel_z),
                        ],
                        seq,
                    });
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                // Short read; keep accumulating the frame.
                debug!("IMU read timeout with {filled}/{FRAME_LEN} bytes buffered");
            }
            Err(e) => {
                if quit.is_raised() {
                    break;
                }
                errors.record(format!("IMU reader: serial read failed: {e}"));
                fatal.raise();
                return;
            }
        }
    }
}

/// Put the sensor into binary continuous streaming and request sync.
fn configure_stream(port: &mut dyn SerialPort) -> std::io::Result<()> {
    port.write_all(commands::BINARY_OUTPUT)?;
    port.write_all(commands::CONTINUOUS_OUTPUT)?;
    port.write_all(commands::SILENCE_ERRORS)?;
    std::thread::sleep(MODE_SWITCH_SETTLE);
    port.clear(serialport::ClearBuffer::Input)?;
    port.write_all(commands::SYNC_REQUEST)?;
    Ok(())
}

/// Scan the stream for the sync token, re-requesting sync after every
/// [`SYNC_RETRY_READS`] fruitless reads. Returns false on fatal failure.
fn find_sync(
    port: &mut dyn SerialPort,
    quit: &SharedFlag,
    errors: &ErrorLog,
    fatal: &SharedFlag,
) -> bool {
    let mut scanner = SyncScanner::new();
    let mut reads = 0u32;
    let mut retries = 0u32;

    while !quit.is_raised() {
        let mut byte = [0u8; 1];
        match port.read(&mut byte) {
            Ok(1) => {
                if scanner.feed(byte[0]) {
                    return true;
                }
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                errors.record(format!("IMU reader: read failed during sync: {e}"));
                fatal.raise();
                return false;
            }
        }

        reads += 1;
        if reads >= SYNC_RETRY_READS {
            reads = 0;
            retries += 1;
            if retries >= MAX_SYNC_RETRIES {
                errors.record(format!(
                    "IMU reader: no sync token after {retries} requests"
                ));
                fatal.raise();
                return false;
            }
            warn!("IMU sync token not seen yet, re-requesting (attempt {retries})");
            scanner.reset();
            let flushed = port
                .clear(serialport::ClearBuffer::Input)
                .and_then(|()| port.write_all(commands::SYNC_REQUEST).map_err(Into::into));
            if let Err(e) = flushed {
                errors.record(format!("IMU reader: sync retry failed: {e}"));
                fatal.raise();
                return false;
            }
        }
    }
    false
}
