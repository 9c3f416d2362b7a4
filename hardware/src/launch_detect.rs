//! Launch-detect input.
//!
//! The launchpad umbilical pulls a GPIO line HIGH while connected; the line
//! falling LOW is the launch signal. The sequencer polls this after arming.

use anyhow::{Context, Result};
use gpiod::{Bias, Chip, Input, Lines, Options};

/// GPIO chip of the flight computer.
pub const GPIO_CHIP: &str = "gpiochip0";

/// Line wired to the umbilical sense pin.
pub const LAUNCH_DETECT_LINE: u32 = 12;

pub struct LaunchDetect {
    lines: Lines<Input>,
}

impl LaunchDetect {
    /// Request the umbilical line as a pulled-up input.
    pub fn new(chip_name: &str, line_offset: u32) -> Result<Self> {
        let chip = Chip::new(chip_name)
            .with_context(|| format!("Failed to open GPIO chip '{chip_name}'"))?;

        let options = Options::input([line_offset])
            .bias(Bias::PullUp)
            .consumer("launch-detect");

        let lines = chip
            .request_lines(options)
            .with_context(|| "Failed to request launch-detect line as input")?;

        Ok(Self { lines })
    }

    /// True while the umbilical holds the line HIGH.
    pub fn is_umbilical_connected(&self) -> Result<bool> {
        let values = self
            .lines
            .get_values([false; 1])
            .with_context(|| "Failed to read launch-detect line")?;
        Ok(values[0])
    }
}
