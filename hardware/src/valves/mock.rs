//! Software stand-in for the valve controller.
//!
//! Implements the device side of the protocol — byte-wise frame decoding,
//! per-byte acknowledgement and the 150 ms output watchdog — so the driver
//! and the control loop can be exercised without flight hardware.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Instant;

use super::{unpack_pwm_payload, ACK, FRAME_LEN, FRAME_MARKER, WATCHDOG_TIMEOUT};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum RxState {
    #[default]
    Idle,
    Handshake {
        received: usize,
    },
    PwmPayload {
        received: usize,
    },
}

/// Device-side mock, usable as the driver's port.
#[derive(Debug, Default)]
pub struct MockValveController {
    state: RxState,
    handshake: [u8; 3],
    payload: [u8; FRAME_LEN - 1],
    acks: VecDeque<u8>,
    armed: bool,
    pwm: [u16; 4],
    last_frame: Option<Instant>,
    ack_count: u64,
    frames_received: u64,
    reset_count: u64,
}

impl MockValveController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Total `!` bytes the device has queued for the host.
    pub fn ack_count(&self) -> u64 {
        self.ack_count
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn reset_count(&self) -> u64 {
        self.reset_count
    }

    /// The PWM registers as last commanded, ignoring the watchdog.
    pub fn last_commanded_pwm(&self) -> [u16; 4] {
        self.pwm
    }

    /// The PWM outputs an observer would see at time `now`: zero when
    /// disarmed or when the watchdog deadline has passed since the last
    /// valid frame.
    pub fn pwm_at(&self, now: Instant) -> [u16; 4] {
        if !self.armed {
            return [0; 4];
        }
        match self.last_frame {
            Some(at) if now.saturating_duration_since(at) <= WATCHDOG_TIMEOUT => self.pwm,
            _ => [0; 4],
        }
    }

    fn feed(&mut self, byte: u8) {
        match self.state {
            RxState::Idle => {
                if byte == b'@' {
                    self.handshake[0] = byte;
                    self.state = RxState::Handshake { received: 1 };
                } else if byte == FRAME_MARKER {
                    self.state = RxState::PwmPayload { received: 0 };
                }
                // Anything else is noise outside a transfer; ignored.
            }
            RxState::Handshake { received } => {
                self.handshake[received] = byte;
                if received + 1 == self.handshake.len() {
                    self.state = RxState::Idle;
                    match &self.handshake {
                        b"@s!" => self.armed = true,
                        b"@e!" => {
                            self.armed = false;
                            self.pwm = [0; 4];
                            self.last_frame = None;
                            self.reset_count += 1;
                        }
                        _ => {}
                    }
                } else {
                    self.state = RxState::Handshake {
                        received: received + 1,
                    };
                }
            }
            RxState::PwmPayload { received } => {
                self.payload[received] = byte;
                if received + 1 == self.payload.len() {
                    self.state = RxState::Idle;
                    self.frames_received += 1;
                    if self.armed {
                        self.pwm = unpack_pwm_payload(&self.payload);
                        self.last_frame = Some(Instant::now());
                    }
                } else {
                    self.state = RxState::PwmPayload {
                        received: received + 1,
                    };
                }
            }
        }
        // The device acknowledges every byte it receives.
        self.acks.push_back(ACK);
        self.ack_count += 1;
    }
}

impl Write for MockValveController {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            self.feed(byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for MockValveController {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.acks.pop_front() {
            Some(ack) => {
                buf[0] = ack;
                Ok(1)
            }
            None => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "no acknowledgement pending",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::ValveController;
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_arm_handshake() {
        let mut controller = ValveController::new(MockValveController::new());
        controller.arm().unwrap();

        let mock = controller.into_inner();
        assert!(mock.is_armed());
        // Exactly one ack per host byte, all consumed by the driver.
        assert_eq!(mock.ack_count(), 3);
        assert!(mock.acks.is_empty());
    }

    #[test]
    fn test_pwm_frame_decoded() {
        let mut controller = ValveController::new(MockValveController::new());
        controller.arm().unwrap();
        controller.send_pwm([600, 0, 400, 800]).unwrap();

        let mock = controller.into_inner();
        assert_eq!(mock.frames_received(), 1);
        assert_eq!(mock.last_commanded_pwm(), [600, 0, 400, 800]);
        assert_eq!(mock.ack_count(), 3 + 6);
    }

    #[test]
    fn test_frames_ignored_while_disarmed() {
        let mut controller = ValveController::new(MockValveController::new());
        controller.send_pwm([100, 200, 300, 400]).unwrap();

        let mock = controller.into_inner();
        assert_eq!(mock.last_commanded_pwm(), [0; 4]);
        assert_eq!(mock.pwm_at(Instant::now()), [0; 4]);
    }

    #[test]
    fn test_watchdog_zeroes_outputs() {
        let mut controller = ValveController::new(MockValveController::new());
        controller.arm().unwrap();

        let t0 = Instant::now();
        controller.send_pwm([600, 0, 400, 800]).unwrap();

        let mock = controller.into_inner();
        // Within the deadline the commanded values are live.
        assert_eq!(mock.pwm_at(t0 + Duration::from_millis(100)), [600, 0, 400, 800]);
        // 200 ms of silence exceeds the 150 ms watchdog.
        assert_eq!(mock.pwm_at(t0 + Duration::from_millis(200)), [0; 4]);
    }

    #[test]
    fn test_reset_closes_valves() {
        let mut controller = ValveController::new(MockValveController::new());
        controller.arm().unwrap();
        controller.send_pwm([310, 420, 520, 620]).unwrap();
        controller.reset().unwrap();

        let mock = controller.into_inner();
        assert!(!mock.is_armed());
        assert_eq!(mock.reset_count(), 1);
        assert_eq!(mock.pwm_at(Instant::now()), [0; 4]);
    }

    #[test]
    fn test_handshake_replay() {
        // Reset then re-arm: the controller accepts frames again and keeps
        // acking every byte.
        let mut controller = ValveController::new(MockValveController::new());
        controller.reset().unwrap();
        controller.arm().unwrap();
        controller.send_pwm([5, 6, 7, 8]).unwrap();

        let mock = controller.into_inner();
        assert!(mock.is_armed());
        assert_eq!(mock.last_commanded_pwm(), [5, 6, 7, 8]);
        assert_eq!(mock.ack_count(), 3 + 3 + 6);
        assert!(mock.acks.is_empty());
    }

    #[test]
    fn test_noise_outside_transfer_is_acked_and_ignored() {
        let mut mock = MockValveController::new();
        mock.write_all(b"xyz").unwrap();
        assert_eq!(mock.ack_count(), 3);
        assert_eq!(mock.frames_received(), 0);
        assert!(!mock.is_armed());
    }
}
