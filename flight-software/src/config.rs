//! Flight configuration.
//!
//! Everything tunable between flights lives in one JSON file: serial device
//! paths, loop periods, mission timers, control gains, Kalman noise and the
//! calibrated valve curve. The file is validated on load; a rejected config
//! is a fatal pre-flight error.

use std::fs;
use std::path::{Path, PathBuf};

use gnc_math::{CurveError, KalmanNoise, ValveCurve};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid valve table: {0}")]
    ValveTable(#[from] CurveError),
    #[error("{0}")]
    Invalid(String),
}

/// Loop periods and mission timers, all in microseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    pub control_period_us: u64,
    pub estimator_period_us: u64,
    pub pressure_period_us: u64,
    pub calibration_us: u64,
    pub engine_burn_us: u64,
    pub active_control_us: u64,
    pub descent_us: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            control_period_us: 20_000,
            estimator_period_us: 20_000,
            pressure_period_us: 20_000,
            calibration_us: 5_000_000,
            engine_burn_us: 1_100_000,
            active_control_us: 20_000_000,
            descent_us: 15_000_000,
        }
    }
}

/// PD gains of one force loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PdGains {
    /// Proportional gain [N/rad]
    pub k: f64,
    /// Derivative gain [N·s/rad]
    pub td: f64,
}

/// Control law gains and geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlConfig {
    /// Per-valve thrust ceiling T_max [N]
    pub max_valve_thrust: f64,
    /// Nozzle offset d from the roll axis [m]
    pub nozzle_offset: f64,
    pub pitch: PdGains,
    pub yaw: PdGains,
    /// Roll-rate proportional gain [N·m·s/rad]
    pub roll_rate_gain: f64,
}

impl ControlConfig {
    /// Derive the proportional gains from the actuator ceiling: maximum
    /// force at 20° attitude error, maximum moment at 100°/s roll rate.
    pub fn derived(max_valve_thrust: f64, nozzle_offset: f64) -> Self {
        let force_range = 20.0_f64.to_radians();
        let rate_range = 100.0_f64.to_radians();
        let k = max_valve_thrust / force_range;
        Self {
            max_valve_thrust,
            nozzle_offset,
            pitch: PdGains { k, td: 0.7 },
            yaw: PdGains { k, td: 0.7 },
            roll_rate_gain: 2.0 * nozzle_offset * max_valve_thrust / rate_range,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self::derived(0.36, 0.005)
    }
}

/// Kalman noise per signal family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NoiseParams {
    pub q_value: f64,
    pub q_rate: f64,
    pub r_meas: f64,
}

impl From<NoiseParams> for KalmanNoise {
    fn from(p: NoiseParams) -> Self {
        Self {
            q_value: p.q_value,
            q_rate: p.q_rate,
            r_meas: p.r_meas,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KalmanConfig {
    pub angle: NoiseParams,
    pub rate: NoiseParams,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        let angle = KalmanNoise::smooth_angle();
        let rate = KalmanNoise::agile_rate();
        Self {
            angle: NoiseParams {
                q_value: angle.q_value,
                q_rate: angle.q_rate,
                r_meas: angle.r_meas,
            },
            rate: NoiseParams {
                q_value: rate.q_value,
                q_rate: rate.q_rate,
                r_meas: rate.r_meas,
            },
        }
    }
}

/// One calibrated point of the valve characteristic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ValvePoint {
    /// Thrust at this PWM [N]
    pub thrust: f64,
    /// 10-bit PWM value
    pub pwm: u16,
}

/// Pressure sensor device paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PressureConfig {
    pub radial_device: String,
    pub axial_device: String,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            radial_device: "/dev/spidev0.0".into(),
            axial_device: "/dev/spidev0.1".into(),
        }
    }
}

/// Complete flight configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlightConfig {
    /// Attitude sensor UART device
    pub imu_port: String,
    /// Valve controller UART device
    pub valve_port: String,
    pub gpio_chip: String,
    pub launch_detect_line: u32,
    pub log_dir: PathBuf,
    pub video_file: PathBuf,
    pub timing: TimingConfig,
    pub control: ControlConfig,
    pub kalman: KalmanConfig,
    pub valve_table: Vec<ValvePoint>,
    /// Minimum raw samples for a valid pad calibration
    pub min_calibration_samples: usize,
    /// Consecutive estimator drops tolerated before the fault is fatal
    pub max_consecutive_faults: u32,
    /// Seconds the armed controller spends on its audible warning
    pub arm_warning_secs: u64,
    pub pressure: PressureConfig,
}

impl Default for FlightConfig {
    fn default() -> Self {
        let curve = ValveCurve::default_flight_curve();
        Self {
            imu_port: "/dev/ttyUSB0".into(),
            valve_port: "/dev/ttyAMA0".into(),
            gpio_chip: hardware::launch_detect::GPIO_CHIP.into(),
            launch_detect_line: hardware::launch_detect::LAUNCH_DETECT_LINE,
            log_dir: "./logs".into(),
            video_file: "flight_recording.h264".into(),
            timing: TimingConfig::default(),
            control: ControlConfig::default(),
            kalman: KalmanConfig::default(),
            valve_table: default_valve_table(),
            min_calibration_samples: 100,
            max_consecutive_faults: 25,
            arm_warning_secs: 10,
            pressure: PressureConfig::default(),
        }
    }
}

fn default_valve_table() -> Vec<ValvePoint> {
    [
        (0.0, 310),
        (0.17, 420),
        (0.25, 520),
        (0.29, 620),
        (0.32, 720),
        (0.34, 820),
        (0.35, 920),
        (0.36, 1020),
    ]
    .into_iter()
    .map(|(thrust, pwm)| ValvePoint { thrust, pwm })
    .collect()
}

impl FlightConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the validated valve curve from the table.
    pub fn valve_curve(&self) -> Result<ValveCurve, CurveError> {
        ValveCurve::new(
            self.valve_table
                .iter()
                .map(|p| (p.thrust, p.pwm))
                .collect(),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timing;
        for (name, value) in [
            ("control_period_us", t.control_period_us),
            ("estimator_period_us", t.estimator_period_us),
            ("pressure_period_us", t.pressure_period_us),
            ("calibration_us", t.calibration_us),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        // The valve controller watchdog fires after 150 ms of silence.
        if t.control_period_us >= 150_000 {
            return Err(ConfigError::Invalid(
                "control period must stay below the 150 ms controller watchdog".into(),
            ));
        }

        let c = &self.control;
        let gains = [
            c.max_valve_thrust,
            c.nozzle_offset,
            c.pitch.k,
            c.pitch.td,
            c.yaw.k,
            c.yaw.td,
            c.roll_rate_gain,
        ];
        if gains.iter().any(|g| !g.is_finite()) {
            return Err(ConfigError::Invalid("non-finite control parameter".into()));
        }
        if c.max_valve_thrust <= 0.0 || c.nozzle_offset <= 0.0 {
            return Err(ConfigError::Invalid(
                "thrust ceiling and nozzle offset must be positive".into(),
            ));
        }

        let k = &self.kalman;
        for noise in [k.angle, k.rate] {
            if noise.q_value < 0.0 || noise.q_rate < 0.0 || noise.r_meas <= 0.0 {
                return Err(ConfigError::Invalid(
                    "Kalman noise must be non-negative with positive measurement noise".into(),
                ));
            }
        }

        let curve = self.valve_curve()?;
        if (curve.max_thrust() - c.max_valve_thrust).abs() > 1e-9 {
            return Err(ConfigError::Invalid(format!(
                "valve table tops out at {} N but max_valve_thrust is {} N",
                curve.max_thrust(),
                c.max_valve_thrust
            )));
        }

        if self.min_calibration_samples == 0 {
            return Err(ConfigError::Invalid(
                "min_calibration_samples must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        FlightConfig::default().validate().unwrap();
    }

    #[test]
    fn test_json_roundtrip() {
        let config = FlightConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = FlightConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"imu_port": "/dev/ttyUSB3"}"#).unwrap();

        let loaded = FlightConfig::load(file.path()).unwrap();
        assert_eq!(loaded.imu_port, "/dev/ttyUSB3");
        assert_eq!(loaded.timing, TimingConfig::default());
    }

    #[test]
    fn test_rejects_zero_period() {
        let mut config = FlightConfig::default();
        config.timing.control_period_us = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_period_beyond_watchdog() {
        let mut config = FlightConfig::default();
        config.timing.control_period_us = 200_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_monotone_valve_table() {
        let mut config = FlightConfig::default();
        config.valve_table[3].thrust = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_mismatched_ceiling() {
        let mut config = FlightConfig::default();
        config.control.max_valve_thrust = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_gains_match_saturation_policy() {
        let control = ControlConfig::derived(0.2, 0.005);
        // 0.2 N at a 20 degree error.
        approx::assert_relative_eq!(
            control.pitch.k,
            0.2 / 20.0_f64.to_radians(),
            epsilon = 1e-12
        );
        approx::assert_relative_eq!(
            control.roll_rate_gain,
            2.0 * 0.005 * 0.2 / 100.0_f64.to_radians(),
            epsilon = 1e-12
        );
    }
}
