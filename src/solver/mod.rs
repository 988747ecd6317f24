//! Frequency-domain solve: element layout, assembly and dense linear solve.
//!
//! Each element that owns a stress schedule gets one forcing column; the
//! system is solved once per frequency sample for all columns at once. The
//! result is a matrix of element parameters (rows) per forcing column.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::aquifer::AquiferSystem;
use crate::elements::Element;
use crate::errors::{AemError, Result};
use crate::math::CMatrix;
use crate::sweep::FrequencySample;

pub mod assembly;
pub mod coefficients;
pub mod linear;

pub use assembly::{AssembledSystem, SystemAssembler};
pub use coefficients::{ForcingColumn, SolvedCoefficients};
pub use linear::{LinearSolver, SolveReport};

/// Cooperative cancellation flag shared between a caller and a running solve or trace.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// True once [`cancel`](Self::cancel) has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` when cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AemError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Position of every element's parameters, unknowns and forcing column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// First global parameter of each element.
    pub offsets: Vec<usize>,
    /// First global unknown of each element.
    pub unknown_offsets: Vec<usize>,
    /// Forcing column of each element, if it owns a schedule.
    pub columns: Vec<Option<usize>>,
    /// Total number of parameters.
    pub parameter_count: usize,
    /// Total number of unknowns.
    pub unknown_count: usize,
    /// Number of forcing columns.
    pub column_count: usize,
}

impl Layout {
    /// Assigns offsets in registry order.
    #[must_use]
    pub fn new(elements: &[Arc<dyn Element>]) -> Self {
        let mut layout = Self {
            offsets: Vec::with_capacity(elements.len()),
            unknown_offsets: Vec::with_capacity(elements.len()),
            columns: Vec::with_capacity(elements.len()),
            parameter_count: 0,
            unknown_count: 0,
            column_count: 0,
        };
        for element in elements {
            layout.offsets.push(layout.parameter_count);
            layout.unknown_offsets.push(layout.unknown_count);
            layout.parameter_count += element.parameter_count();
            layout.unknown_count += element.unknown_count();
            if element.schedule().is_some() {
                layout.columns.push(Some(layout.column_count));
                layout.column_count += 1;
            } else {
                layout.columns.push(None);
            }
        }
        layout
    }

    /// Index of the element owning global unknown `unknown`.
    #[must_use]
    pub fn element_of_unknown(&self, unknown: usize) -> Option<usize> {
        if unknown >= self.unknown_count {
            return None;
        }
        self.unknown_offsets.iter().rposition(|&offset| offset <= unknown)
    }
}

/// Assembles and solves one frequency sample, returning the parameter matrix
/// (`parameter_count × column_count`) and the solve diagnostics.
pub fn solve_frequency(
    system: &AquiferSystem,
    elements: &[Arc<dyn Element>],
    layout: &Layout,
    sample: &FrequencySample,
    print_matrix: bool,
) -> Result<(CMatrix, SolveReport)> {
    let eigen = system.eigen_data(sample.p)?;
    let assembled = SystemAssembler::new(system, elements, layout).assemble(&eigen)?;
    if print_matrix {
        info!("sample {} (p = {}):\n{}", sample.index, sample.p, assembled.matrix);
        info!("right-hand side:\n{}", assembled.rhs);
    }

    let solver = LinearSolver::default();
    let (solution, report) = solver.solve_with_report(&assembled.matrix, &assembled.rhs);
    let Some(unknowns) = solution else {
        let element = report
            .floating_rows
            .first()
            .or(report.weak_pivot.as_ref())
            .and_then(|&row| layout.element_of_unknown(row))
            .map(|index| elements[index].label().to_owned());
        return Err(AemError::SingularSystem {
            sample: sample.index,
            frequency: sample.p,
            element,
        });
    };
    if let Some(cond) = report.cond_estimate.filter(|&c| c > linear::ILL_CONDITIONED) {
        warn!("sample {} is ill-conditioned (cond ≈ {cond:.2e})", sample.index);
    }
    Ok((assembled.parameters(&unknowns), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aquifer::{Layer, TopBoundary};
    use crate::elements::{HeadWell, LeakyLineDoublet, StressSchedule, Well};
    use crate::math::R2;

    fn system() -> AquiferSystem {
        AquiferSystem::build(
            vec![
                Layer::aquifer(0.0, -10.0, 10.0, 1.0e-4),
                Layer::leaky(-10.0, -12.0, 100.0, 0.0),
                Layer::aquifer(-12.0, -22.0, 10.0, 1.0e-4),
            ],
            TopBoundary::Confined,
        )
        .unwrap()
    }

    #[test]
    fn layout_assigns_offsets_in_registry_order() {
        let system = system();
        let mut a = Well::new("a", 0.0, 0.0, 0.1, vec![0], StressSchedule::constant(1.0)).unwrap();
        let mut b =
            HeadWell::new("b", 5.0, 0.0, 0.1, vec![0, 1], StressSchedule::constant(1.0)).unwrap();
        let mut c =
            LeakyLineDoublet::segment("c", R2::new(1.0, 1.0), R2::new(1.0, 5.0), vec![1], None)
                .unwrap();
        a.initialize(&system).unwrap();
        b.initialize(&system).unwrap();
        c.initialize(&system).unwrap();
        let elements: Vec<Arc<dyn Element>> = vec![Arc::new(a), Arc::new(b), Arc::new(c)];
        let layout = Layout::new(&elements);
        assert_eq!(layout.offsets, vec![0, 1, 3]);
        assert_eq!(layout.unknown_offsets, vec![0, 0, 2]);
        assert_eq!(layout.columns, vec![Some(0), Some(1), None]);
        assert_eq!((layout.parameter_count, layout.unknown_count, layout.column_count), (4, 3, 2));
        assert_eq!(layout.element_of_unknown(0), Some(1));
        assert_eq!(layout.element_of_unknown(2), Some(2));
        assert_eq!(layout.element_of_unknown(3), None);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(matches!(token.check(), Err(AemError::Cancelled)));
    }
}
