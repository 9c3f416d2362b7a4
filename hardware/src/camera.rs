//! Onboard camera recorder.
//!
//! The flight camera records through an external capture process started at
//! boot and stopped on shutdown and on every fatal path (so the footage is
//! flushed even when the flight is aborted).

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Handle to a running camera recording.
pub struct CameraRecorder {
    child: Child,
    output: PathBuf,
}

impl CameraRecorder {
    /// Start recording H.264 video to `output` using the platform capture
    /// binary (`raspivid`). `extra_args` pass recording options through
    /// unchanged.
    pub fn start(output: impl Into<PathBuf>, extra_args: &[String]) -> Result<Self> {
        let output = output.into();
        let child = Command::new("raspivid")
            .arg("-n")
            .arg("-t")
            .arg("0")
            .args(extra_args)
            .arg("-o")
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start camera recording to {}", output.display()))?;
        info!("Camera recording to {}", output.display());
        Ok(Self { child, output })
    }

    /// Stop the recording process.
    pub fn stop(mut self) {
        self.terminate();
    }

    fn terminate(&mut self) {
        match self.child.kill() {
            Ok(()) => {
                let _ = self.child.wait();
                info!("Camera recording stopped ({})", self.output.display());
            }
            Err(e) => warn!("Failed to stop camera process: {e}"),
        }
    }
}

impl Drop for CameraRecorder {
    // Recording must not outlive the flight program.
    fn drop(&mut self) {
        if self.child.try_wait().ok().flatten().is_none() {
            self.terminate();
        }
    }
}
