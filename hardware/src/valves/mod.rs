//! RCS valve controller driver.
//!
//! A slave microcontroller generates the four hardware PWM signals driving
//! the proportional solenoid valves; this module speaks its half-duplex UART
//! protocol:
//!
//! - `@s!` arms the controller (it plays an audible warning, then accepts
//!   PWM frames); `@e!` stops PWM output and resets it.
//! - A PWM frame is 6 bytes: a `#` marker followed by four 10-bit PWM
//!   values packed MSB-first into 40 bits.
//! - The controller acknowledges **every** received byte with `!`; the host
//!   blocks on that acknowledgement before sending the next byte.
//! - Watchdog: if no valid PWM frame arrives within 150 ms the controller
//!   forces all four PWM outputs to zero. During active control the host
//!   must therefore keep framing at least every 150 ms, and it sends a
//!   final all-zeros frame when the control window closes.

mod mock;

pub use mock::MockValveController;

use std::io::{Read, Write};
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// PWM frame length on the wire.
pub const FRAME_LEN: usize = 6;

/// First byte of every PWM frame.
pub const FRAME_MARKER: u8 = b'#';

/// Per-byte acknowledgement sent by the controller.
pub const ACK: u8 = b'!';

/// Arm handshake.
pub const ARM_COMMAND: &[u8; 3] = b"@s!";

/// Stop-and-reset handshake.
pub const RESET_COMMAND: &[u8; 3] = b"@e!";

/// Largest representable PWM value (10 bits).
pub const PWM_MAX: u16 = 0x3ff;

/// Controller-side watchdog deadline.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_millis(150);

/// Driver error
#[derive(Debug, Error)]
pub enum ValveError {
    #[error("I/O failure on valve controller link: {0}")]
    Io(#[from] std::io::Error),
    #[error("PWM value {0} exceeds the 10-bit range")]
    PwmOutOfRange(u16),
}

/// Pack four 10-bit PWM values into a 6-byte frame.
///
/// Layout after the `#` marker, MSB-first:
/// B1 = PWM1[9:2], B2 = PWM1[1:0]·64 | PWM2[9:4], B3 = PWM2[3:0]·16 |
/// PWM3[9:6], B4 = PWM3[5:0]·4 | PWM4[9:8], B5 = PWM4[7:0].
pub fn pack_pwm_frame(pwm: [u16; 4]) -> [u8; FRAME_LEN] {
    debug_assert!(pwm.iter().all(|&p| p <= PWM_MAX));
    [
        FRAME_MARKER,
        (pwm[0] >> 2) as u8,
        (((pwm[0] & 0b11) << 6) | (pwm[1] >> 4)) as u8,
        (((pwm[1] & 0b1111) << 4) | (pwm[2] >> 6)) as u8,
        (((pwm[2] & 0b11_1111) << 2) | (pwm[3] >> 8)) as u8,
        (pwm[3] & 0xff) as u8,
    ]
}

/// Recover the four PWM values from the 5 payload bytes of a frame.
pub fn unpack_pwm_payload(payload: &[u8; FRAME_LEN - 1]) -> [u16; 4] {
    [
        (u16::from(payload[0]) << 2) | (u16::from(payload[1] & 0b1100_0000) >> 6),
        (u16::from(payload[1] & 0b0011_1111) << 4) | (u16::from(payload[2] & 0b1111_0000) >> 4),
        (u16::from(payload[2] & 0b0000_1111) << 6) | (u16::from(payload[3] & 0b1111_1100) >> 2),
        (u16::from(payload[3] & 0b0000_0011) << 8) | u16::from(payload[4]),
    ]
}

/// Host-side driver for the valve controller.
///
/// Generic over the port so tests can run against [`MockValveController`].
pub struct ValveController<P> {
    port: P,
}

impl<P: Read + Write> ValveController<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Arm the controller for PWM generation.
    pub fn arm(&mut self) -> Result<(), ValveError> {
        self.write_acked(ARM_COMMAND)
    }

    /// Stop PWM output and software-reset the controller.
    pub fn reset(&mut self) -> Result<(), ValveError> {
        self.write_acked(RESET_COMMAND)
    }

    /// Transmit one PWM frame.
    pub fn send_pwm(&mut self, pwm: [u16; 4]) -> Result<(), ValveError> {
        if let Some(&bad) = pwm.iter().find(|&&p| p > PWM_MAX) {
            return Err(ValveError::PwmOutOfRange(bad));
        }
        let frame = pack_pwm_frame(pwm);
        self.write_acked(&frame)
    }

    /// Command all four valves shut.
    pub fn close_valves(&mut self) -> Result<(), ValveError> {
        self.send_pwm([0; 4])
    }

    /// Give back the underlying port.
    pub fn into_inner(self) -> P {
        self.port
    }

    /// Write byte-by-byte, blocking on the controller's acknowledgement
    /// after each byte.
    fn write_acked(&mut self, bytes: &[u8]) -> Result<(), ValveError> {
        for &byte in bytes {
            self.port.write_all(std::slice::from_ref(&byte))?;
            let mut ack = [0u8; 1];
            self.port.read_exact(&mut ack)?;
            if ack[0] != ACK {
                // The link is half-duplex point-to-point; a corrupted ack is
                // logged but the transfer carries on.
                warn!("valve controller acked {:#04x} instead of '!'", ack[0]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_layout() {
        // 0b10_0101_1000 = 600, 0, 0b01_1001_0000 = 400, 0b11_0010_0000 = 800
        let frame = pack_pwm_frame([600, 0, 400, 800]);
        assert_eq!(frame[0], b'#');
        assert_eq!(frame[1], 0b1001_0110); // 600 >> 2
        assert_eq!(frame[2], 0b0000_0000); // 600[1:0]=0 << 6 | 0 >> 4
        assert_eq!(frame[3], 0b0000_0110); // 0[3:0] << 4 | 400 >> 6
        assert_eq!(frame[4], 0b0100_0011); // 400[5:0] << 2 | 800 >> 8
        assert_eq!(frame[5], 0b0010_0000); // 800 & 0xff
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let cases = [
            [0u16, 0, 0, 0],
            [1023, 1023, 1023, 1023],
            [600, 0, 400, 800],
            [1, 2, 3, 4],
            [310, 420, 520, 1020],
        ];
        for pwm in cases {
            let frame = pack_pwm_frame(pwm);
            let payload: [u8; 5] = frame[1..].try_into().unwrap();
            assert_eq!(unpack_pwm_payload(&payload), pwm, "roundtrip for {pwm:?}");
        }
    }

    #[test]
    fn test_out_of_range_pwm_rejected() {
        let mock = MockValveController::new();
        let mut controller = ValveController::new(mock);
        assert!(matches!(
            controller.send_pwm([1024, 0, 0, 0]),
            Err(ValveError::PwmOutOfRange(1024))
        ));
    }
}
