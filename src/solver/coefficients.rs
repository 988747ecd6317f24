//! Solved element strengths per frequency sample, and their conversion to real time.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::Layout;
use crate::errors::{AemError, Result};
use crate::inversion::LaplaceInverter;
use crate::math::{CMatrix, CScalar, Scalar};
use crate::sweep::{FrequencyGrid, FrequencySample};

/// One forcing column: the unit-step response of an element's stress schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ForcingColumn {
    /// Column index in the strength matrices.
    pub column: usize,
    /// Registry index of the element owning the schedule.
    pub element: usize,
    /// `(t_start, change)` pairs superposed in time.
    pub increments: Vec<(Scalar, Scalar)>,
}

/// Strength matrices (`parameter_count × column_count`) for every sample of a grid.
#[derive(Debug, Clone)]
pub struct SolvedCoefficients {
    grid: FrequencyGrid,
    layout: Layout,
    columns: Vec<ForcingColumn>,
    strengths: Vec<CMatrix>,
}

impl SolvedCoefficients {
    /// Bundles per-sample strengths; `strengths[k]` belongs to sample `k` of `grid`.
    pub fn new(
        grid: FrequencyGrid,
        layout: Layout,
        columns: Vec<ForcingColumn>,
        strengths: Vec<CMatrix>,
    ) -> Result<Self> {
        if strengths.len() != grid.len() {
            return Err(AemError::config(format!(
                "{} strength matrices for {} frequency samples",
                strengths.len(),
                grid.len()
            )));
        }
        let shape = (layout.parameter_count, layout.column_count);
        if strengths.iter().any(|s| s.shape() != shape) {
            return Err(AemError::config("strength matrices do not match the element layout"));
        }
        Ok(Self { grid, layout, columns, strengths })
    }

    /// The frequency grid the strengths were solved on.
    #[must_use]
    pub const fn grid(&self) -> &FrequencyGrid {
        &self.grid
    }

    /// Element layout the strengths refer to.
    #[must_use]
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Forcing columns in column order.
    #[must_use]
    pub fn columns(&self) -> &[ForcingColumn] {
        &self.columns
    }

    /// Strength matrix of sample `sample`.
    #[must_use]
    pub fn strengths(&self, sample: usize) -> &CMatrix {
        &self.strengths[sample]
    }

    /// Laplace-domain value of global parameter `parameter` for forcing `column`.
    #[must_use]
    pub fn parameter(&self, sample: usize, parameter: usize, column: usize) -> CScalar {
        self.strengths[sample][(parameter, column)]
    }

    /// Inverts `rows` linear functionals of the element parameters at time `t`.
    ///
    /// `influence` maps a sample to the `rows × parameter_count` matrix of the
    /// quantity per unit parameter. Every forcing increment contributes its
    /// unit-step response delayed by its start time; increments that have not
    /// started yet contribute nothing.
    pub fn invert_rows<F>(&self, t: Scalar, rows: usize, mut influence: F) -> Result<Vec<Scalar>>
    where
        F: FnMut(&FrequencySample) -> Result<CMatrix>,
    {
        if !self.grid.contains(t) {
            return Err(AemError::OutOfRange {
                time: t,
                min_time: self.grid.min_time(),
                max_time: self.grid.max_time(),
            });
        }
        let mut out = vec![0.0; rows];
        let mut responses: HashMap<usize, Vec<CMatrix>> = HashMap::new();
        for forcing in &self.columns {
            for &(start, change) in &forcing.increments {
                let tau = t - start;
                if tau <= 0.0 || change == 0.0 {
                    continue;
                }
                let decade = self.grid.decade_for(tau)?;
                let per_sample = match responses.entry(decade.index) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let mut list = Vec::with_capacity(self.grid.samples_per_decade());
                        for sample in self.grid.decade_samples(decade) {
                            let block = influence(sample)?;
                            list.push(block * &self.strengths[sample.index]);
                        }
                        entry.insert(list)
                    }
                };
                let series: Vec<Vec<CScalar>> = (0..rows)
                    .map(|r| per_sample.iter().map(|m| m[(r, forcing.column)]).collect())
                    .collect();
                for (value, inverted) in
                    out.iter_mut().zip(LaplaceInverter::invert_all(decade, tau, &series))
                {
                    *value += change * inverted;
                }
            }
        }
        Ok(out)
    }
}
