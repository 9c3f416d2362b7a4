//! Serial port helpers for the two UART links.

use std::time::Duration;

use anyhow::{Context, Result};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

/// Baud rate of the attitude sensor link.
pub const IMU_BAUD: u32 = 57_600;

/// Baud rate of the valve controller link.
pub const VALVE_BAUD: u32 = 115_200;

/// Open a raw 8-N-1 serial port with the given read timeout.
///
/// The timeout doubles as the cancellation latency for threads blocked in a
/// read, so keep it well below one scheduler period.
pub fn open_8n1(path: &str, baud: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
    info!("Opening serial port {path} at {baud} bps");
    serialport::new(path, baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(timeout)
        .open()
        .with_context(|| format!("Failed to open serial port {path}"))
}

/// Discard everything queued in the input buffer.
pub fn flush_input(port: &mut dyn SerialPort) -> Result<()> {
    port.clear(ClearBuffer::Input)
        .context("Failed to flush serial input buffer")
}
