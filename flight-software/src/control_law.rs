//! Attitude control law.
//!
//! PD loops on pitch and yaw produce the corrective forces, a pure P loop
//! on the body roll rate produces the corrective moment. References are
//! zero for this mission (hold vertical). Outputs are bounded to what the
//! actuators can deliver before they reach the allocator.

use crate::config::ControlConfig;
use crate::state::{AttitudeSnapshot, ControlDemand};

/// References the loops regulate towards.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlReferences {
    /// Pitch reference θ_ref [rad]
    pub pitch: f64,
    /// Yaw reference ψ_ref [rad]
    pub yaw: f64,
    /// Roll-rate reference ω_x,ref [rad/s]
    pub roll_rate: f64,
}

#[derive(Debug, Clone)]
pub struct ControlLaw {
    config: ControlConfig,
    references: ControlReferences,
}

impl ControlLaw {
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            references: ControlReferences::default(),
        }
    }

    pub fn with_references(config: ControlConfig, references: ControlReferences) -> Self {
        Self { config, references }
    }

    /// Largest commandable roll moment, set by the nozzle pair arm [N·m].
    pub fn moment_limit(&self) -> f64 {
        2.0 * self.config.nozzle_offset * self.config.max_valve_thrust
    }

    /// Compute the demanded efforts from one attitude snapshot.
    pub fn compute(&self, snapshot: &AttitudeSnapshot) -> ControlDemand {
        let c = &self.config;
        let r = &self.references;

        let pitch_force = c.pitch.k * (snapshot.filtered.pitch - r.pitch)
            + c.pitch.td * snapshot.filtered_rates.pitch;
        let yaw_force =
            c.yaw.k * (snapshot.filtered.yaw - r.yaw) + c.yaw.td * snapshot.filtered_rates.yaw;
        let roll_moment = c.roll_rate_gain * (snapshot.body_rates[0] - r.roll_rate);

        let force_limit = c.max_valve_thrust;
        let moment_limit = self.moment_limit();

        ControlDemand {
            elapsed_us: snapshot.elapsed_us,
            pitch_force: pitch_force.clamp(-force_limit, force_limit),
            yaw_force: yaw_force.clamp(-force_limit, force_limit),
            roll_moment: roll_moment.clamp(-moment_limit, moment_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PdGains;
    use approx::assert_relative_eq;

    fn snapshot() -> AttitudeSnapshot {
        AttitudeSnapshot::default()
    }

    fn test_config() -> ControlConfig {
        ControlConfig {
            max_valve_thrust: 0.2,
            nozzle_offset: 0.005,
            pitch: PdGains { k: 5.0, td: 3.0 },
            yaw: PdGains { k: 5.0, td: 3.0 },
            roll_rate_gain: 0.01,
        }
    }

    #[test]
    fn test_pitch_error_saturates_to_ceiling() {
        // A 20 degree pitch error at rest: the raw PD output of 1.75 N is
        // clipped to the 0.2 N valve ceiling; yaw and roll stay quiet.
        let law = ControlLaw::new(test_config());
        let mut snap = snapshot();
        snap.filtered.pitch = 0.3491;

        let demand = law.compute(&snap);
        assert_relative_eq!(demand.pitch_force, 0.2, epsilon = 1e-12);
        assert_relative_eq!(demand.yaw_force, 0.0, epsilon = 1e-12);
        assert_relative_eq!(demand.roll_moment, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_proportional_region() {
        let law = ControlLaw::new(test_config());
        let mut snap = snapshot();
        snap.filtered.pitch = 0.02;
        snap.filtered_rates.pitch = -0.01;

        let demand = law.compute(&snap);
        assert_relative_eq!(demand.pitch_force, 5.0 * 0.02 - 3.0 * 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_saturation() {
        let law = ControlLaw::new(test_config());
        let mut snap = snapshot();
        snap.filtered.yaw = -1.0;

        let demand = law.compute(&snap);
        assert_relative_eq!(demand.yaw_force, -0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_roll_moment_bound() {
        let law = ControlLaw::new(test_config());
        let mut snap = snapshot();
        snap.body_rates[0] = 100.0;

        let demand = law.compute(&snap);
        // 2 d T_max = 0.002 N·m
        assert_relative_eq!(demand.roll_moment, 0.002, epsilon = 1e-12);
    }

    #[test]
    fn test_references_shift_the_error() {
        let references = ControlReferences {
            pitch: 0.1,
            yaw: 0.0,
            roll_rate: 0.0,
        };
        let law = ControlLaw::with_references(test_config(), references);
        let mut snap = snapshot();
        snap.filtered.pitch = 0.1;

        let demand = law.compute(&snap);
        assert_relative_eq!(demand.pitch_force, 0.0, epsilon = 1e-12);
    }
}
