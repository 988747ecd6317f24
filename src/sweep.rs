//! Laplace-frequency sampling of the solved time range, plus series helpers.

use crate::constants::{abscissa_shift, MIN_SAMPLES_PER_DECADE};
use crate::errors::{AemError, Result};
use crate::math::{CScalar, Scalar};

const DECADE_SLACK: Scalar = 1.0e-12;

/// One logarithmic time decade `[lower, upper]` and its inversion parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Decade {
    /// Position of the decade in the grid.
    pub index: usize,
    /// Lower bound of the decade.
    pub lower: Scalar,
    /// Upper bound of the decade.
    pub upper: Scalar,
    /// Half-period of the Fourier series used by the inversion (`2 * upper`).
    pub period: Scalar,
    /// Real shift γ of the abscissas.
    pub shift: Scalar,
    /// Global index of the first sample belonging to this decade.
    pub first_sample: usize,
}

/// A complex Laplace abscissa at which the system is solved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencySample {
    /// Global index of the sample.
    pub index: usize,
    /// Index of the owning decade.
    pub decade: usize,
    /// Laplace variable.
    pub p: CScalar,
}

/// Deterministic set of Laplace abscissas covering `[min_time, max_time]`.
#[derive(Debug, Clone)]
pub struct FrequencyGrid {
    min_time: Scalar,
    max_time: Scalar,
    samples_per_decade: usize,
    decades: Vec<Decade>,
    samples: Vec<FrequencySample>,
}

impl FrequencyGrid {
    /// Builds the grid. `samples_per_decade` must be odd and at least five.
    pub fn new(min_time: Scalar, max_time: Scalar, samples_per_decade: usize) -> Result<Self> {
        if !(min_time.is_finite() && max_time.is_finite()) || min_time <= 0.0 {
            return Err(AemError::config(format!(
                "time range [{min_time}, {max_time}] must be finite and positive"
            )));
        }
        if max_time < min_time {
            return Err(AemError::config(format!(
                "max_time {max_time} is smaller than min_time {min_time}"
            )));
        }
        if samples_per_decade < MIN_SAMPLES_PER_DECADE || samples_per_decade % 2 == 0 {
            return Err(AemError::config(format!(
                "samples_per_decade must be odd and >= {MIN_SAMPLES_PER_DECADE}, \
                 got {samples_per_decade}"
            )));
        }

        let lo = (min_time.log10() + DECADE_SLACK).floor() as i32;
        let mut hi = (max_time.log10() - DECADE_SLACK).ceil() as i32;
        if hi <= lo {
            hi = lo + 1;
        }

        let mut decades = Vec::with_capacity((hi - lo) as usize);
        let mut samples = Vec::with_capacity((hi - lo) as usize * samples_per_decade);
        for (index, k) in (lo..hi).enumerate() {
            let lower = 10f64.powi(k);
            let upper = 10f64.powi(k + 1);
            let period = 2.0 * upper;
            let shift = abscissa_shift(period);
            let first_sample = samples.len();
            for n in 0..samples_per_decade {
                samples.push(FrequencySample {
                    index: samples.len(),
                    decade: index,
                    p: CScalar::new(shift, std::f64::consts::PI * n as Scalar / period),
                });
            }
            decades.push(Decade { index, lower, upper, period, shift, first_sample });
        }

        Ok(Self { min_time, max_time, samples_per_decade, decades, samples })
    }

    /// Earliest time the grid supports.
    #[must_use]
    pub const fn min_time(&self) -> Scalar {
        self.min_time
    }

    /// Latest time the grid supports.
    #[must_use]
    pub const fn max_time(&self) -> Scalar {
        self.max_time
    }

    /// Number of abscissas per decade.
    #[must_use]
    pub const fn samples_per_decade(&self) -> usize {
        self.samples_per_decade
    }

    /// All decades, earliest first.
    #[must_use]
    pub fn decades(&self) -> &[Decade] {
        &self.decades
    }

    /// All samples, grouped by decade.
    #[must_use]
    pub fn samples(&self) -> &[FrequencySample] {
        &self.samples
    }

    /// Total number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the grid holds no samples (never the case for a valid grid).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples belonging to `decade`.
    #[must_use]
    pub fn decade_samples(&self, decade: &Decade) -> &[FrequencySample] {
        &self.samples[decade.first_sample..decade.first_sample + self.samples_per_decade]
    }

    /// True when `t` lies in `[min_time, max_time]`.
    #[must_use]
    pub fn contains(&self, t: Scalar) -> bool {
        t >= self.min_time && t <= self.max_time
    }

    /// Decade used to invert at time `t`.
    pub fn decade_for(&self, t: Scalar) -> Result<&Decade> {
        if !self.contains(t) {
            return Err(self.out_of_range(t));
        }
        self.decades
            .iter()
            .find(|d| t <= d.upper * (1.0 + DECADE_SLACK))
            .ok_or_else(|| self.out_of_range(t))
    }

    fn out_of_range(&self, t: Scalar) -> AemError {
        AemError::OutOfRange { time: t, min_time: self.min_time, max_time: self.max_time }
    }
}

/// Generates `n` linearly spaced samples in [start, stop].
#[must_use]
pub fn linspace(start: Scalar, stop: Scalar, n: usize) -> Vec<Scalar> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n as Scalar - 1.0);
            (0..n).map(|i| start + step * i as Scalar).collect()
        }
    }
}

/// Generates `n` logarithmically spaced samples between `start` and `stop`.
/// Requires start > 0 and stop > 0.
#[must_use]
pub fn logspace(start: Scalar, stop: Scalar, n: usize) -> Vec<Scalar> {
    assert!(start > 0.0 && stop > 0.0);
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let log_start = start.log10();
            let step = (stop.log10() - log_start) / (n as Scalar - 1.0);
            let mut values: Vec<Scalar> =
                (0..n).map(|i| 10f64.powf(log_start + step * i as Scalar)).collect();
            // pin the ends so the series stays inside a solved range
            values[0] = start;
            values[n - 1] = stop;
            values
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn linspace_basic() {
        let v = linspace(0.0, 1.0, 5);
        assert_eq!(v, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn logspace_hits_both_ends() {
        let v = logspace(1.0, 100.0, 3);
        assert_eq!(v[0], 1.0);
        assert_relative_eq!(v[1], 10.0, max_relative = 1.0e-12);
        assert_eq!(v[2], 100.0);
    }

    #[test]
    fn grid_covers_range_with_whole_decades() {
        let grid = FrequencyGrid::new(0.5, 200.0, 21).unwrap();
        let bounds: Vec<_> = grid.decades().iter().map(|d| (d.lower, d.upper)).collect();
        assert_eq!(bounds.len(), 4);
        assert_relative_eq!(bounds[0].0, 0.1);
        assert_relative_eq!(bounds[3].1, 1000.0);
        assert_eq!(grid.len(), 4 * 21);
        let d = &grid.decades()[1];
        let samples = grid.decade_samples(d);
        assert_eq!(samples[0].index, d.first_sample);
        assert!(samples.iter().all(|s| s.decade == 1));
        assert_relative_eq!(samples[3].p.im, std::f64::consts::PI * 3.0 / 20.0);
        assert_relative_eq!(samples[3].p.re, d.shift);
    }

    #[test]
    fn single_decade_for_exact_powers_of_ten() {
        let grid = FrequencyGrid::new(1.0, 10.0, 21).unwrap();
        assert_eq!(grid.decades().len(), 1);
        assert_eq!(grid.decade_for(1.0).unwrap().index, 0);
        assert_eq!(grid.decade_for(10.0).unwrap().index, 0);
    }

    #[test]
    fn times_outside_range_are_rejected() {
        let grid = FrequencyGrid::new(1.0, 100.0, 21).unwrap();
        assert!(matches!(grid.decade_for(0.999), Err(AemError::OutOfRange { .. })));
        assert!(matches!(grid.decade_for(100.0001), Err(AemError::OutOfRange { .. })));
        assert_eq!(grid.decade_for(10.0).unwrap().index, 0);
        assert_eq!(grid.decade_for(10.5).unwrap().index, 1);
    }

    #[test]
    fn invalid_sample_counts_fail() {
        assert!(FrequencyGrid::new(1.0, 10.0, 20).is_err());
        assert!(FrequencyGrid::new(1.0, 10.0, 3).is_err());
        assert!(FrequencyGrid::new(0.0, 10.0, 21).is_err());
        assert!(FrequencyGrid::new(10.0, 1.0, 21).is_err());
    }
}
