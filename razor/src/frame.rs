//! Attitude frame parsing.

use bytemuck::{pod_read_unaligned, Pod, Zeroable};
use thiserror::Error;

/// Length in bytes of one streaming attitude frame.
pub const FRAME_LEN: usize = 24;

/// One binary streaming frame: six consecutive little-endian IEEE-754 floats.
///
/// Angles are Tait-Bryan ZYX Euler angles in radians, accelerations in m/s².
/// The wire format is little-endian; the flight target is little-endian, so
/// the frame can be viewed in place.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct AttitudeFrame {
    /// Yaw ψ about the Z axis [rad]
    pub yaw: f32,
    /// Pitch θ about the Y axis [rad]
    pub pitch: f32,
    /// Roll φ about the X (nose) axis [rad]
    pub roll: f32,
    /// X-axis linear acceleration [m/s²]
    pub accel_x: f32,
    /// Y-axis linear acceleration [m/s²]
    pub accel_y: f32,
    /// Z-axis linear acceleration [m/s²]
    pub accel_z: f32,
}

/// Parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("wrong frame length: expected {expected}, got {got}")]
    WrongLength { expected: usize, got: usize },
}

/// Parse a 24-byte streaming frame.
pub fn parse(data: &[u8]) -> Result<AttitudeFrame, FrameError> {
    if data.len() != FRAME_LEN {
        return Err(FrameError::WrongLength {
            expected: FRAME_LEN,
            got: data.len(),
        });
    }
    // Read buffers carry no alignment guarantee.
    Ok(pod_read_unaligned(data))
}
