//! Honeywell HSC pressure/temperature sensor decoding.
//!
//! The nose cone carries two differential HSC TruStability sensors (one
//! radial, one axial) read over SPI. Each reading is a 4-byte frame:
//! 2 status bits, 14 bits of pressure counts and 11 bits of compensated
//! temperature counts. The transfer function maps the calibrated count span
//! onto the sensor's pressure range.
//!
//! Bus access sits behind [`PressureBus`] so the flight binary can read the
//! spidev character device while tests script frames.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Frame length of one sensor reading.
pub const FRAME_LEN: usize = 4;

/// Two-bit status field of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HscStatus {
    Normal,
    CommandMode,
    StaleData,
    DiagnosticFault,
}

impl HscStatus {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Normal,
            1 => Self::CommandMode,
            2 => Self::StaleData,
            _ => Self::DiagnosticFault,
        }
    }

    /// Single-character tag used in the pressure log.
    pub fn tag(self) -> char {
        match self {
            Self::Normal => 'N',
            Self::CommandMode => 'C',
            Self::StaleData => 'S',
            Self::DiagnosticFault => 'F',
        }
    }
}

/// Calibrated transfer function of one sensor model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferFunction {
    /// Counts at minimum pressure
    pub out_min: u16,
    /// Counts at maximum pressure
    pub out_max: u16,
    /// Pressure at minimum counts [mbar]
    pub p_min: f64,
    /// Pressure at maximum counts [mbar]
    pub p_max: f64,
}

impl Default for TransferFunction {
    /// The ±100 mbar differential model flown on the nose cone
    /// (HSC D LN N 100MD S A 5).
    fn default() -> Self {
        Self {
            out_min: 1638,
            out_max: 14745,
            p_min: -100.0,
            p_max: 100.0,
        }
    }
}

/// One decoded sensor reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSample {
    pub status: HscStatus,
    pub pressure_mbar: f64,
    pub temperature_c: f64,
}

/// Decode a 4-byte HSC frame.
pub fn decode_frame(frame: [u8; FRAME_LEN], transfer: TransferFunction) -> PressureSample {
    let status = HscStatus::from_bits(frame[0] >> 6);
    let pressure_counts = (u16::from(frame[0] & 0b0011_1111) << 8) | u16::from(frame[1]);
    let temperature_counts = (u16::from(frame[2]) << 3) | u16::from(frame[3] >> 5);

    let span = f64::from(transfer.out_max) - f64::from(transfer.out_min);
    let pressure_mbar = (f64::from(pressure_counts) - f64::from(transfer.out_min))
        * (transfer.p_max - transfer.p_min)
        / span
        + transfer.p_min;
    let temperature_c = f64::from(temperature_counts) / 2047.0 * 200.0 - 50.0;

    PressureSample {
        status,
        pressure_mbar,
        temperature_c,
    }
}

/// Something that yields raw 4-byte sensor frames.
pub trait PressureBus: Send {
    fn transfer(&mut self) -> io::Result<[u8; FRAME_LEN]>;
}

/// Bus over a spidev character device.
///
/// The HSC is read-only on MISO, so a plain blocking read of four bytes
/// performs the transaction with the device's default mode-0 settings.
pub struct CharDevBus {
    device: File,
}

impl CharDevBus {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            device: File::open(path)?,
        })
    }
}

impl PressureBus for CharDevBus {
    fn transfer(&mut self) -> io::Result<[u8; FRAME_LEN]> {
        let mut frame = [0u8; FRAME_LEN];
        self.device.read_exact(&mut frame)?;
        Ok(frame)
    }
}

/// Scripted bus replaying canned frames, for tests and bench runs.
#[derive(Debug, Default)]
pub struct ScriptedBus {
    frames: Vec<[u8; FRAME_LEN]>,
    next: usize,
}

impl ScriptedBus {
    pub fn new(frames: Vec<[u8; FRAME_LEN]>) -> Self {
        Self { frames, next: 0 }
    }
}

impl PressureBus for ScriptedBus {
    fn transfer(&mut self) -> io::Result<[u8; FRAME_LEN]> {
        match self.frames.get(self.next) {
            Some(frame) => {
                self.next += 1;
                Ok(*frame)
            }
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "scripted bus exhausted",
            )),
        }
    }
}

/// Encode counts into a frame; the inverse of [`decode_frame`]'s bit
/// unpacking, used to build scripted frames.
pub fn encode_counts(status: u8, pressure_counts: u16, temperature_counts: u16) -> [u8; FRAME_LEN] {
    [
        (status << 6) | ((pressure_counts >> 8) as u8 & 0b0011_1111),
        (pressure_counts & 0xff) as u8,
        (temperature_counts >> 3) as u8,
        ((temperature_counts & 0b111) as u8) << 5,
    ]
}
