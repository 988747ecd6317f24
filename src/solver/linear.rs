//! Dense LU solve with multiple right-hand sides and singularity diagnostics.

use std::cmp::Ordering;

use crate::constants::SINGULAR_PIVOT_RATIO;
use crate::math::{CMatrix, Scalar};

/// Condition estimate above which a solve is logged as ill-conditioned.
pub const ILL_CONDITIONED: Scalar = 1.0e12;

const ZERO_ROW_NORM: Scalar = 1.0e-14;

/// Diagnostics from solving one assembled system.
#[derive(Debug, Clone, Default)]
pub struct SolveReport {
    /// True if the linear solve succeeded.
    pub success: bool,
    /// Rough condition estimate from the LU diagonal ratio (larger is worse).
    pub cond_estimate: Option<Scalar>,
    /// Rows without any coefficient (an equation that constrains nothing).
    pub floating_rows: Vec<usize>,
    /// Unknown whose pivot fell below the singularity threshold.
    pub weak_pivot: Option<usize>,
    /// Additional human-readable notes.
    pub notes: Vec<String>,
}

/// Dense direct solver with row equilibration.
#[derive(Debug, Clone, Copy)]
pub struct LinearSolver {
    pivot_ratio: Scalar,
}

impl Default for LinearSolver {
    fn default() -> Self {
        Self { pivot_ratio: SINGULAR_PIVOT_RATIO }
    }
}

impl LinearSolver {
    /// Solver declaring the system singular when `min |u_kk| / max |u_kk| < pivot_ratio`.
    #[must_use]
    pub const fn with_pivot_ratio(pivot_ratio: Scalar) -> Self {
        Self { pivot_ratio }
    }

    /// Solves `A X = B` and returns diagnostics; `None` when the system is singular.
    #[must_use]
    pub fn solve_with_report(&self, a: &CMatrix, b: &CMatrix) -> (Option<CMatrix>, SolveReport) {
        let mut report = SolveReport::default();
        let n = a.nrows();
        if n == 0 {
            report.success = true;
            return (Some(CMatrix::zeros(0, b.ncols())), report);
        }

        // Scale every row to unit maximum so that head and discharge equations
        // are compared on the same footing.
        let mut a = a.clone();
        let mut b = b.clone();
        for i in 0..n {
            let scale = a.row(i).iter().map(|v| v.norm()).fold(0.0, Scalar::max);
            if scale <= ZERO_ROW_NORM {
                report.floating_rows.push(i);
                continue;
            }
            a.row_mut(i).iter_mut().for_each(|v| *v /= scale);
            b.row_mut(i).iter_mut().for_each(|v| *v /= scale);
        }
        if !report.floating_rows.is_empty() {
            report.notes.push("rows without coefficients detected".into());
            return (None, report);
        }

        let lu = a.lu();
        let u = lu.u();
        let mut max_d: Scalar = 0.0;
        let mut min_d = Scalar::INFINITY;
        let mut weakest = 0;
        for k in 0..n {
            let d = u[(k, k)].norm();
            max_d = max_d.max(d);
            if d < min_d {
                min_d = d;
                weakest = k;
            }
        }
        if min_d.is_finite() && min_d > 0.0 {
            report.cond_estimate = Some(max_d / min_d);
        }
        if min_d.partial_cmp(&(self.pivot_ratio * max_d)) != Some(Ordering::Greater) {
            report.weak_pivot = Some(weakest);
            report.notes.push(format!("pivot {weakest} is numerically zero"));
            return (None, report);
        }

        let solution = lu.solve(&b);
        report.success = solution.is_some();
        if !report.success {
            report.notes.push("LU solve failed".into());
        }
        (solution, report)
    }

    /// Solves `A X = B`, discarding diagnostics.
    #[must_use]
    pub fn solve(&self, a: &CMatrix, b: &CMatrix) -> Option<CMatrix> {
        self.solve_with_report(a, b).0
    }
}
