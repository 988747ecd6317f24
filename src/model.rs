//! Mutable model builder: aquifer system, element registry and the solve driver.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::aquifer::AquiferSystem;
use crate::constants::{DEFAULT_MAX_TIME, DEFAULT_MIN_TIME, DEFAULT_SAMPLES_PER_DECADE};
use crate::elements::{Element, ElementId};
use crate::errors::{AemError, Result};
use crate::math::{CMatrix, Scalar, R2, R3};
use crate::solution::SolvedModel;
use crate::solver::{
    solve_frequency, CancelToken, ForcingColumn, Layout, SolveReport, SolvedCoefficients,
};
use crate::sweep::{FrequencyGrid, FrequencySample};

/// Options for [`Model::solve`].
#[derive(Debug, Clone)]
pub struct SolveConfig {
    /// Earliest time that will be queried.
    pub min_time: Scalar,
    /// Latest time that will be queried.
    pub max_time: Scalar,
    /// Laplace abscissas per time decade (odd, at least five).
    pub samples_per_decade: usize,
    /// Suppress progress logging.
    pub silent: bool,
    /// Log every assembled system.
    pub print_matrix: bool,
    /// Optional cooperative cancellation, checked between frequency samples.
    pub cancel: Option<CancelToken>,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            min_time: DEFAULT_MIN_TIME,
            max_time: DEFAULT_MAX_TIME,
            samples_per_decade: DEFAULT_SAMPLES_PER_DECADE,
            silent: false,
            print_matrix: false,
            cancel: None,
        }
    }
}

impl SolveConfig {
    /// Configuration covering `[min_time, max_time]` with default accuracy.
    #[must_use]
    pub fn new(min_time: Scalar, max_time: Scalar) -> Self {
        Self { min_time, max_time, ..Self::default() }
    }

    /// Sets the number of abscissas per decade.
    #[must_use]
    pub const fn with_samples_per_decade(mut self, samples: usize) -> Self {
        self.samples_per_decade = samples;
        self
    }

    /// Suppresses progress logging.
    #[must_use]
    pub const fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Logs each assembled system.
    #[must_use]
    pub const fn print_matrix(mut self) -> Self {
        self.print_matrix = true;
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Aquifer system plus an ordered element registry; produces [`SolvedModel`]s.
#[derive(Debug)]
pub struct Model {
    system: Arc<AquiferSystem>,
    elements: Vec<Arc<dyn Element>>,
    solution: Option<Arc<SolvedModel>>,
}

impl Model {
    /// Empty model over `system`.
    #[must_use]
    pub fn new(system: AquiferSystem) -> Self {
        Self { system: Arc::new(system), elements: Vec::new(), solution: None }
    }

    /// The aquifer system.
    #[must_use]
    pub fn system(&self) -> &AquiferSystem {
        &self.system
    }

    /// Registers an element, binding it to the aquifer system. Any previous
    /// solution is dropped.
    pub fn add_element<E: Element + 'static>(&mut self, mut element: E) -> Result<ElementId> {
        element.initialize(&self.system)?;
        if self.elements.iter().any(|e| e.label() == element.label()) {
            return Err(AemError::config(format!(
                "an element labelled '{}' is already registered",
                element.label()
            )));
        }
        self.elements.push(Arc::new(element));
        if self.solution.take().is_some() {
            debug!("element registered after solve; solution dropped");
        }
        Ok(ElementId(self.elements.len() - 1))
    }

    /// Registered element by id.
    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<&dyn Element> {
        self.elements.get(id.0).map(AsRef::as_ref)
    }

    /// Registered elements in order.
    #[must_use]
    pub fn elements(&self) -> &[Arc<dyn Element>] {
        &self.elements
    }

    /// Solves every frequency sample of the grid described by `config`.
    ///
    /// On success the new solution replaces the previous one in a single
    /// assignment; a failed solve leaves no solution behind.
    pub fn solve(&mut self, config: &SolveConfig) -> Result<Arc<SolvedModel>> {
        self.solution = None;
        let grid =
            FrequencyGrid::new(config.min_time, config.max_time, config.samples_per_decade)?;
        let layout = Layout::new(&self.elements);
        if layout.column_count == 0 {
            return Err(AemError::config("no element carries a stress schedule"));
        }
        let started = Instant::now();
        if !config.silent {
            info!(
                "solving {} unknowns for {} forcing columns at {} frequencies",
                layout.unknown_count,
                layout.column_count,
                grid.len()
            );
        }

        let solve_one = |sample: &FrequencySample| -> Result<(CMatrix, SolveReport)> {
            if let Some(cancel) = &config.cancel {
                cancel.check()?;
            }
            let solved = solve_frequency(
                &self.system,
                &self.elements,
                &layout,
                sample,
                config.print_matrix,
            )?;
            debug!("sample {} solved", sample.index);
            Ok(solved)
        };
        #[cfg(feature = "parallel")]
        let results: Vec<Result<(CMatrix, SolveReport)>> =
            grid.samples().par_iter().map(solve_one).collect();
        #[cfg(not(feature = "parallel"))]
        let results: Vec<Result<(CMatrix, SolveReport)>> =
            grid.samples().iter().map(solve_one).collect();

        let (strengths, reports): (Vec<CMatrix>, Vec<SolveReport>) =
            results.into_iter().collect::<Result<Vec<_>>>()?.into_iter().unzip();

        let columns = self.forcing_columns(&layout);
        let coefficients = SolvedCoefficients::new(grid, layout, columns, strengths)?;
        let solution = Arc::new(SolvedModel::new(
            Arc::clone(&self.system),
            self.elements.clone(),
            coefficients,
            reports,
        ));
        if !config.silent {
            info!("solve complete in {:.3} s", started.elapsed().as_secs_f64());
        }
        self.solution = Some(Arc::clone(&solution));
        Ok(solution)
    }

    fn forcing_columns(&self, layout: &Layout) -> Vec<ForcingColumn> {
        self.elements
            .iter()
            .enumerate()
            .filter_map(|(element, e)| {
                let column = layout.columns[element]?;
                let schedule = e.schedule()?;
                Some(ForcingColumn { column, element, increments: schedule.increments().collect() })
            })
            .collect()
    }

    /// Current solution, or `NotSolved`.
    pub fn solution(&self) -> Result<Arc<SolvedModel>> {
        self.solution.clone().ok_or(AemError::NotSolved)
    }

    /// True when a solution is available.
    #[must_use]
    pub const fn is_solved(&self) -> bool {
        self.solution.is_some()
    }

    /// See [`SolvedModel::head`].
    pub fn head(&self, x: Scalar, y: Scalar, t: Scalar) -> Result<Vec<Scalar>> {
        self.solved()?.head(x, y, t)
    }

    /// See [`SolvedModel::head_in_layer`].
    pub fn head_in_layer(&self, x: Scalar, y: Scalar, t: Scalar, aquifer: usize) -> Result<Scalar> {
        self.solved()?.head_in_layer(x, y, t, aquifer)
    }

    /// See [`SolvedModel::head_series`].
    pub fn head_series(
        &self,
        x: Scalar,
        y: Scalar,
        times: &[Scalar],
        aquifer: usize,
    ) -> Result<Vec<Scalar>> {
        self.solved()?.head_series(x, y, times, aquifer)
    }

    /// See [`SolvedModel::head_along_line`].
    pub fn head_along_line(
        &self,
        start: R2,
        end: R2,
        n: usize,
        t: Scalar,
        aquifer: usize,
    ) -> Result<Vec<Scalar>> {
        self.solved()?.head_along_line(start, end, n, t, aquifer)
    }

    /// See [`SolvedModel::head_grid`].
    pub fn head_grid(
        &self,
        xs: &[Scalar],
        ys: &[Scalar],
        t: Scalar,
        aquifer: usize,
    ) -> Result<Vec<Vec<Scalar>>> {
        self.solved()?.head_grid(xs, ys, t, aquifer)
    }

    /// See [`SolvedModel::discharge`].
    pub fn discharge(&self, x: Scalar, y: Scalar, t: Scalar) -> Result<(Vec<Scalar>, Vec<Scalar>)> {
        self.solved()?.discharge(x, y, t)
    }

    /// See [`SolvedModel::velocity`].
    pub fn velocity(&self, position: &R3, t: Scalar) -> Result<R3> {
        self.solved()?.velocity(position, t)
    }

    /// See [`SolvedModel::element_discharge`].
    pub fn element_discharge(&self, element: ElementId, t: Scalar) -> Result<Vec<Scalar>> {
        self.solved()?.element_discharge(element, t)
    }

    /// See [`SolvedModel::head_inside`].
    pub fn head_inside(&self, element: ElementId, t: Scalar) -> Result<Vec<Scalar>> {
        self.solved()?.head_inside(element, t)
    }

    /// See [`SolvedModel::strength`].
    pub fn strength(&self, element: ElementId, t: Scalar) -> Result<Vec<Scalar>> {
        self.solved()?.strength(element, t)
    }

    fn solved(&self) -> Result<&SolvedModel> {
        self.solution.as_deref().ok_or(AemError::NotSolved)
    }
}
