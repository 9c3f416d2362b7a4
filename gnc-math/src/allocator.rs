//! Optimal thrust allocation over the four RCS nozzles.
//!
//! The nozzles exert one-sided (non-negative) thrust along body-frame
//! directions that couple to pitch and yaw through the instantaneous roll
//! angle, and to roll through the nozzle offset `d`. The allocator finds the
//! minimum-total-thrust assignment that exactly reproduces the demanded
//! pitch force, yaw force and roll moment, by solving a linear program with
//! the simplex solver.
//!
//! Because opposing nozzles produce opposite pitch/yaw forces, the optimum
//! never commands an opposing pair together, so at least one nozzle is
//! always off.

use thiserror::Error;

use crate::simplex::{self, SimplexOutcome, NUM_VARS};

/// Demanded body-frame control efforts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThrustDemand {
    /// Pitch force F_θ [N]
    pub pitch_force: f64,
    /// Yaw force F_ψ [N]
    pub yaw_force: f64,
    /// Roll moment M_φ [N·m]
    pub roll_moment: f64,
}

/// The allocated nozzle thrusts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrustAllocation {
    /// Non-negative thrust per nozzle, clipped to the valve ceiling [N]
    pub thrust: [f64; NUM_VARS],
    /// Index of the nozzle driven to zero by the optimum
    pub zero_valve: usize,
}

/// Allocation failure
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum AllocationError {
    /// The demand lies outside what the nozzles can produce within the
    /// valve thrust ceiling. The caller commands zero thrust this cycle.
    #[error("demand outside the feasible thrust polytope")]
    Infeasible,
    /// The program construction is broken; treated as a fatal software
    /// error by the caller.
    #[error("thrust allocation program is unbounded")]
    Unbounded,
}

/// Allocate `demand` onto the four nozzles at roll angle `roll` [rad],
/// nozzle offset `d` [m] and per-valve thrust ceiling `t_max` [N].
pub fn allocate(
    demand: ThrustDemand,
    roll: f64,
    d: f64,
    t_max: f64,
) -> Result<ThrustAllocation, AllocationError> {
    let (sr, cr) = roll.sin_cos();

    let mut constraints = [
        [cr, -sr, -cr, sr],
        [sr, cr, -sr, -cr],
        [d, -d, d, -d],
    ];
    let mut rhs = [demand.pitch_force, demand.yaw_force, demand.roll_moment];

    // The simplex tableau wants non-negative right-hand sides; negating a
    // row together with its demand is the same equality.
    for (row, b) in constraints.iter_mut().zip(rhs.iter_mut()) {
        if *b < 0.0 {
            for coeff in row.iter_mut() {
                *coeff = -*coeff;
            }
            *b = -*b;
        }
    }

    // Minimum total actuation: maximise the negated sum of thrusts.
    let objective = [-1.0; NUM_VARS];

    let mut thrust = match simplex::maximize(&objective, &constraints, &rhs) {
        SimplexOutcome::Optimal(x) => x,
        SimplexOutcome::Infeasible => return Err(AllocationError::Infeasible),
        SimplexOutcome::Unbounded => return Err(AllocationError::Unbounded),
    };

    // A demand the valves cannot meet within their ceiling is reported as
    // infeasible rather than silently saturated; the clip below only trims
    // tolerance-level overshoot.
    let tolerance = allocation_tolerance(t_max);
    if thrust.iter().any(|&r| r > t_max + tolerance) {
        return Err(AllocationError::Infeasible);
    }
    for r in thrust.iter_mut() {
        *r = r.clamp(0.0, t_max);
        // An off nozzle must be exactly off, so its PWM is exactly zero.
        if *r < tolerance {
            *r = 0.0;
        }
    }

    let zero_valve = thrust
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0);

    Ok(ThrustAllocation { thrust, zero_valve })
}

/// Reconstruct the body-frame efforts a thrust assignment produces at roll
/// angle `roll`. Used by the tests to check allocator exactness.
pub fn reconstruct_demand(thrust: &[f64; NUM_VARS], roll: f64, d: f64) -> ThrustDemand {
    let (sr, cr) = roll.sin_cos();
    ThrustDemand {
        pitch_force: cr * thrust[0] - sr * thrust[1] - cr * thrust[2] + sr * thrust[3],
        yaw_force: sr * thrust[0] + cr * thrust[1] - sr * thrust[2] - cr * thrust[3],
        roll_moment: d * (thrust[0] - thrust[1] + thrust[2] - thrust[3]),
    }
}

// Exactness is judged in thrust units; scale the pivot tolerance up for
// large ceilings.
fn allocation_tolerance(t_max: f64) -> f64 {
    (10.0 * simplex::EPS).max(1e-5 * t_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    const D: f64 = 0.005;
    const T_MAX: f64 = 0.2;
    const TOL: f64 = 1e-5;

    #[test]
    fn test_pure_pitch_at_zero_roll() {
        // A saturated pitch demand at zero roll loads nozzle 1, leaves its
        // opposite off, and splits the yaw pair to cancel the roll torque.
        let demand = ThrustDemand {
            pitch_force: 0.2,
            yaw_force: 0.0,
            roll_moment: 0.0,
        };
        let allocation = allocate(demand, 0.0, D, T_MAX).unwrap();
        let [r1, r2, r3, r4] = allocation.thrust;

        assert_relative_eq!(r1, 0.2, epsilon = TOL);
        assert_relative_eq!(r3, 0.0, epsilon = TOL);
        assert_relative_eq!(r2, 0.1, epsilon = TOL);
        assert_relative_eq!(r4, 0.1, epsilon = TOL);
        assert_eq!(allocation.zero_valve, 2);

        let back = reconstruct_demand(&allocation.thrust, 0.0, D);
        assert_relative_eq!(back.pitch_force, 0.2, epsilon = TOL);
        assert_relative_eq!(back.yaw_force, 0.0, epsilon = TOL);
        assert_relative_eq!(back.roll_moment, 0.0, epsilon = TOL);
    }

    #[test]
    fn test_pitch_routes_to_other_pair_at_quarter_roll() {
        // At φ = π/2 the pitch demand is carried by nozzles 2 and 4.
        let demand = ThrustDemand {
            pitch_force: 0.1,
            yaw_force: 0.0,
            roll_moment: 0.0,
        };
        let allocation = allocate(demand, FRAC_PI_2, D, T_MAX).unwrap();
        let [r1, r2, r3, r4] = allocation.thrust;

        assert_relative_eq!(r4, 0.1, epsilon = TOL);
        assert_relative_eq!(r2, 0.0, epsilon = TOL);
        assert_relative_eq!(r1 + r3, 0.1, epsilon = TOL);

        let back = reconstruct_demand(&allocation.thrust, FRAC_PI_2, D);
        assert_relative_eq!(back.pitch_force, 0.1, epsilon = TOL);
        assert_relative_eq!(back.yaw_force, 0.0, epsilon = TOL);
        assert_relative_eq!(back.roll_moment, 0.0, epsilon = TOL);
    }

    #[test]
    fn test_negative_demands_are_sign_normalised() {
        let demand = ThrustDemand {
            pitch_force: -0.1,
            yaw_force: 0.05,
            roll_moment: -2.0e-4,
        };
        let allocation = allocate(demand, 0.3, D, T_MAX).unwrap();
        let back = reconstruct_demand(&allocation.thrust, 0.3, D);
        assert_relative_eq!(back.pitch_force, demand.pitch_force, epsilon = TOL);
        assert_relative_eq!(back.yaw_force, demand.yaw_force, epsilon = TOL);
        assert_relative_eq!(back.roll_moment, demand.roll_moment, epsilon = TOL);
    }

    #[test]
    fn test_exactness_over_roll_sweep() {
        for i in 0..24 {
            let roll = -3.0 + i as f64 * 0.25;
            let demand = ThrustDemand {
                pitch_force: 0.07,
                yaw_force: -0.04,
                roll_moment: 1.5e-4,
            };
            let allocation = allocate(demand, roll, D, T_MAX)
                .unwrap_or_else(|e| panic!("roll {roll}: {e}"));
            let back = reconstruct_demand(&allocation.thrust, roll, D);
            assert_relative_eq!(back.pitch_force, demand.pitch_force, epsilon = TOL);
            assert_relative_eq!(back.yaw_force, demand.yaw_force, epsilon = TOL);
            assert_relative_eq!(back.roll_moment, demand.roll_moment, epsilon = TOL);
        }
    }

    #[test]
    fn test_at_least_one_nozzle_off() {
        for i in 0..16 {
            let roll = i as f64 * 0.4;
            let demand = ThrustDemand {
                pitch_force: 0.05,
                yaw_force: 0.08,
                roll_moment: -1.0e-4,
            };
            let allocation = allocate(demand, roll, D, T_MAX).unwrap();
            let min = allocation
                .thrust
                .iter()
                .cloned()
                .fold(f64::INFINITY, f64::min);
            assert!(min.abs() <= TOL, "no zero nozzle at roll {roll}: {allocation:?}");
            assert!(allocation.thrust[allocation.zero_valve].abs() <= TOL);
        }
    }

    #[test]
    fn test_thrust_bounds() {
        let demand = ThrustDemand {
            pitch_force: 0.2,
            yaw_force: 0.0,
            roll_moment: 0.0,
        };
        let allocation = allocate(demand, 0.0, D, T_MAX).unwrap();
        assert!(allocation
            .thrust
            .iter()
            .all(|&r| (0.0..=T_MAX).contains(&r)));
        // A demand of exactly T_max saturates at least one valve.
        assert!(allocation.thrust.iter().any(|&r| (r - T_MAX).abs() <= TOL));
    }

    #[test]
    fn test_oversized_demand_is_infeasible() {
        let demand = ThrustDemand {
            pitch_force: 10.0,
            yaw_force: 10.0,
            roll_moment: 10.0,
        };
        assert_eq!(
            allocate(demand, 0.0, D, T_MAX),
            Err(AllocationError::Infeasible)
        );
    }

    #[test]
    fn test_zero_demand_is_all_off() {
        let allocation = allocate(ThrustDemand::default(), 0.7, D, T_MAX).unwrap();
        for r in allocation.thrust {
            assert_relative_eq!(r, 0.0, epsilon = TOL);
        }
    }
}
