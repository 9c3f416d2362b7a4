//! Razor AHRS binary protocol
//!
//! This crate provides the command constants, sync-token scanning and
//! attitude frame parsing for the Razor AHRS attitude sensor in binary
//! continuous-streaming mode.

mod frame;
mod sync;

pub mod commands;

pub use frame::{parse, AttitudeFrame, FrameError, FRAME_LEN};
pub use sync::{SyncScanner, SYNC_TOKEN};
