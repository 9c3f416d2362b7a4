//! Host-side command strings for the Razor AHRS.
//!
//! The sensor ships in human-readable text mode; the flight software switches
//! it to binary continuous streaming during setup. Commands are plain ASCII
//! byte strings written to the UART with no framing or terminator.

/// Switch the output format to binary (24-byte frames).
pub const BINARY_OUTPUT: &[u8] = b"#ob";

/// Enable continuous streaming output.
pub const CONTINUOUS_OUTPUT: &[u8] = b"#o1";

/// Disable in-band error message output.
pub const SILENCE_ERRORS: &[u8] = b"#oe0";

/// Request the two-byte sync token reply (`#S`).
pub const SYNC_REQUEST: &[u8] = b"#s";
