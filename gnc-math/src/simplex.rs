//! Two-phase tableau simplex for the thrust-allocation linear program.
//!
//! The allocator poses a fixed-shape problem: maximise a linear objective
//! over four non-negative variables subject to three equality constraints
//! with non-negative right-hand sides. The solver works on fixed-size
//! arrays so a solve never allocates, which keeps the control loop
//! deterministic on the flight computer.
//!
//! Phase one introduces one artificial variable per equality constraint and
//! drives their sum to zero; phase two optimises the real objective from the
//! feasible basis. Bland's rule is used for pivot selection, so the
//! iteration terminates.

/// Number of equality constraints (pitch force, yaw force, roll moment).
pub const NUM_CONSTRAINTS: usize = 3;

/// Number of variables (one thrust per nozzle).
pub const NUM_VARS: usize = 4;

/// Absolute pivot/optimality tolerance.
pub const EPS: f64 = 1e-6;

const NUM_ART: usize = NUM_CONSTRAINTS;
const COLS: usize = NUM_VARS + NUM_ART + 1;
const RHS: usize = COLS - 1;
const OBJ: usize = NUM_CONSTRAINTS;

// Far above what a 3x4 program can need; a floating-point safety stop only.
const MAX_PIVOTS: usize = 100;

type Tableau = [[f64; COLS]; NUM_CONSTRAINTS + 1];

/// Solver result
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimplexOutcome {
    /// The optimal assignment of the four variables.
    Optimal([f64; NUM_VARS]),
    /// No assignment satisfies the constraints.
    Infeasible,
    /// The objective can be increased without bound (a software error in
    /// the caller's problem construction).
    Unbounded,
}

/// Maximise `objective · x` subject to `constraints · x = rhs`, `x ≥ 0`.
///
/// Every entry of `rhs` must be non-negative; the caller normalises the
/// constraint signs beforehand.
pub fn maximize(
    objective: &[f64; NUM_VARS],
    constraints: &[[f64; NUM_VARS]; NUM_CONSTRAINTS],
    rhs: &[f64; NUM_CONSTRAINTS],
) -> SimplexOutcome {
    debug_assert!(rhs.iter().all(|&b| b >= 0.0));

    let mut t: Tableau = [[0.0; COLS]; NUM_CONSTRAINTS + 1];
    let mut basis = [0usize; NUM_CONSTRAINTS];

    for i in 0..NUM_CONSTRAINTS {
        t[i][..NUM_VARS].copy_from_slice(&constraints[i]);
        t[i][NUM_VARS + i] = 1.0;
        t[i][RHS] = rhs[i];
        basis[i] = NUM_VARS + i;
    }

    // Phase one: maximise minus the sum of the artificial variables. The
    // objective row starts as +1 on each artificial column and is reduced
    // against the initial (all-artificial) basis.
    for j in NUM_VARS..NUM_VARS + NUM_ART {
        t[OBJ][j] = 1.0;
    }
    for i in 0..NUM_CONSTRAINTS {
        for j in 0..COLS {
            t[OBJ][j] -= t[i][j];
        }
    }

    if !run_to_optimum(&mut t, &mut basis, NUM_VARS + NUM_ART) {
        // The phase-one objective is bounded by construction.
        return SimplexOutcome::Infeasible;
    }
    if t[OBJ][RHS] < -EPS {
        // Artificial variables cannot all reach zero.
        return SimplexOutcome::Infeasible;
    }

    // Any artificial still basic sits at value zero; pivot it out on a real
    // column so phase-two eliminations cannot reintroduce it.
    for i in 0..NUM_CONSTRAINTS {
        if basis[i] >= NUM_VARS {
            if let Some(j) = (0..NUM_VARS).find(|&j| t[i][j].abs() > EPS) {
                pivot(&mut t, &mut basis, i, j);
            }
            // A fully zero row is a redundant constraint and stays inert.
        }
    }

    // Phase two: install the real objective, reduced against the basis.
    t[OBJ] = [0.0; COLS];
    for j in 0..NUM_VARS {
        t[OBJ][j] = -objective[j];
    }
    for i in 0..NUM_CONSTRAINTS {
        let b = basis[i];
        let factor = t[OBJ][b];
        if factor != 0.0 {
            for j in 0..COLS {
                t[OBJ][j] -= factor * t[i][j];
            }
        }
    }

    if !run_to_optimum(&mut t, &mut basis, NUM_VARS) {
        return SimplexOutcome::Unbounded;
    }

    let mut solution = [0.0; NUM_VARS];
    for i in 0..NUM_CONSTRAINTS {
        if basis[i] < NUM_VARS {
            solution[basis[i]] = t[i][RHS];
        }
    }
    SimplexOutcome::Optimal(solution)
}

/// Pivot until no improving column remains among the first `allowed_cols`
/// columns. Returns false if an improving column has no admissible pivot row
/// (unbounded direction).
fn run_to_optimum(t: &mut Tableau, basis: &mut [usize; NUM_CONSTRAINTS], allowed_cols: usize) -> bool {
    for _ in 0..MAX_PIVOTS {
        // Bland's rule: smallest improving column index.
        let Some(entering) = (0..allowed_cols).find(|&j| t[OBJ][j] < -EPS) else {
            return true;
        };

        let mut pivot_row = None;
        let mut best_ratio = f64::INFINITY;
        for i in 0..NUM_CONSTRAINTS {
            if t[i][entering] > EPS {
                let ratio = t[i][RHS] / t[i][entering];
                let take = match pivot_row {
                    None => true,
                    // Degenerate tie: prefer the smaller basic index.
                    Some(r) => {
                        ratio < best_ratio - EPS
                            || (ratio < best_ratio + EPS && basis[i] < basis[r])
                    }
                };
                if take {
                    pivot_row = Some(i);
                    best_ratio = ratio;
                }
            }
        }

        match pivot_row {
            Some(r) => pivot(t, basis, r, entering),
            None => return false,
        }
    }
    true
}

fn pivot(t: &mut Tableau, basis: &mut [usize; NUM_CONSTRAINTS], row: usize, col: usize) {
    let p = t[row][col];
    for j in 0..COLS {
        t[row][j] /= p;
    }
    t[row][col] = 1.0;

    for i in 0..=NUM_CONSTRAINTS {
        if i == row {
            continue;
        }
        let factor = t[i][col];
        if factor == 0.0 {
            continue;
        }
        for j in 0..COLS {
            t[i][j] -= factor * t[row][j];
        }
        t[i][col] = 0.0;
    }

    basis[row] = col;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fixed_point_program() {
        // x1 - x2 = 1, x3 = 2, x4 = 0; minimise the total.
        let objective = [-1.0, -1.0, -1.0, -1.0];
        let constraints = [
            [1.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let rhs = [1.0, 2.0, 0.0];

        match maximize(&objective, &constraints, &rhs) {
            SimplexOutcome::Optimal(x) => {
                assert_relative_eq!(x[0], 1.0, epsilon = EPS);
                assert_relative_eq!(x[1], 0.0, epsilon = EPS);
                assert_relative_eq!(x[2], 2.0, epsilon = EPS);
                assert_relative_eq!(x[3], 0.0, epsilon = EPS);
            }
            other => panic!("expected optimal, got {other:?}"),
        }
    }

    #[test]
    fn test_solution_satisfies_constraints() {
        let objective = [-1.0, -1.0, -1.0, -1.0];
        let constraints = [
            [1.0, 0.0, -1.0, 0.0],
            [0.0, 1.0, 0.0, -1.0],
            [0.5, -0.5, 0.5, -0.5],
        ];
        let rhs = [0.2, 0.1, 0.05];

        match maximize(&objective, &constraints, &rhs) {
            SimplexOutcome::Optimal(x) => {
                for (row, &b) in constraints.iter().zip(rhs.iter()) {
                    let lhs: f64 = row.iter().zip(x.iter()).map(|(a, v)| a * v).sum();
                    assert_relative_eq!(lhs, b, epsilon = 10.0 * EPS);
                }
                assert!(x.iter().all(|&v| v >= -EPS));
            }
            other => panic!("expected optimal, got {other:?}"),
        }
    }

    #[test]
    fn test_infeasible_program() {
        // 0 = 1 can never hold.
        let objective = [-1.0, -1.0, -1.0, -1.0];
        let constraints = [
            [0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let rhs = [1.0, 0.0, 0.0];

        assert_eq!(
            maximize(&objective, &constraints, &rhs),
            SimplexOutcome::Infeasible
        );
    }

    #[test]
    fn test_unbounded_program() {
        // x1 and x2 can grow together without limit while x1 - x2 stays 0.
        let objective = [1.0, 1.0, 0.0, 0.0];
        let constraints = [
            [1.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let rhs = [0.0, 0.0, 0.0];

        assert_eq!(
            maximize(&objective, &constraints, &rhs),
            SimplexOutcome::Unbounded
        );
    }

    #[test]
    fn test_redundant_constraint() {
        // Third row repeats the first; the program stays solvable.
        let objective = [-1.0, -1.0, -1.0, -1.0];
        let constraints = [
            [1.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 1.0],
            [1.0, 1.0, 0.0, 0.0],
        ];
        let rhs = [1.0, 1.0, 1.0];

        match maximize(&objective, &constraints, &rhs) {
            SimplexOutcome::Optimal(x) => {
                assert_relative_eq!(x[0] + x[1], 1.0, epsilon = 10.0 * EPS);
                assert_relative_eq!(x[2] + x[3], 1.0, epsilon = 10.0 * EPS);
            }
            other => panic!("expected optimal, got {other:?}"),
        }
    }
}
