//! Piecewise-constant stress schedules.

use crate::errors::{AemError, Result};
use crate::math::Scalar;

/// Ordered `(t_start, value)` pairs; each value holds from its start time until
/// the next one. Before the first start time the stress is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct StressSchedule {
    steps: Vec<(Scalar, Scalar)>,
}

impl StressSchedule {
    /// Builds a schedule; start times must be finite, non-negative and increasing.
    pub fn new(steps: Vec<(Scalar, Scalar)>) -> Result<Self> {
        if steps.is_empty() {
            return Err(AemError::config("stress schedule needs at least one step"));
        }
        for (i, &(t, v)) in steps.iter().enumerate() {
            if !t.is_finite() || t < 0.0 || !v.is_finite() {
                return Err(AemError::config(format!("invalid stress step ({t}, {v})")));
            }
            if i > 0 && t <= steps[i - 1].0 {
                return Err(AemError::config(format!(
                    "stress start times must increase ({} then {t})",
                    steps[i - 1].0
                )));
            }
        }
        Ok(Self { steps })
    }

    /// Constant stress switched on at `t = 0`.
    #[must_use]
    pub fn constant(value: Scalar) -> Self {
        Self { steps: vec![(0.0, value)] }
    }

    /// The `(t_start, value)` pairs.
    #[must_use]
    pub fn steps(&self) -> &[(Scalar, Scalar)] {
        &self.steps
    }

    /// `(t_start, change)` pairs: the superposed unit-step amplitudes.
    pub fn increments(&self) -> impl Iterator<Item = (Scalar, Scalar)> + '_ {
        self.steps.iter().scan(0.0, |previous, &(t, v)| {
            let change = v - *previous;
            *previous = v;
            Some((t, change))
        })
    }

    /// Stress value in effect at time `t`.
    #[must_use]
    pub fn value_at(&self, t: Scalar) -> Scalar {
        self.steps.iter().take_while(|(start, _)| *start <= t).last().map_or(0.0, |&(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_telescope_to_values() {
        let s = StressSchedule::new(vec![(0.0, 100.0), (5.0, 40.0), (8.0, 0.0)]).unwrap();
        let inc: Vec<_> = s.increments().collect();
        assert_eq!(inc, vec![(0.0, 100.0), (5.0, -60.0), (8.0, -40.0)]);
        assert_eq!(s.value_at(6.0), 40.0);
        assert_eq!(s.value_at(-1.0), 0.0);
    }

    #[test]
    fn rejects_unsorted_steps() {
        assert!(StressSchedule::new(vec![(2.0, 1.0), (1.0, 2.0)]).is_err());
        assert!(StressSchedule::new(vec![]).is_err());
        assert!(StressSchedule::new(vec![(-1.0, 1.0)]).is_err());
    }
}
