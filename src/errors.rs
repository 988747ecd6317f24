//! Shared error types used across submodules.

use thiserror::Error;

use crate::math::{CScalar, Scalar};
use crate::trace::TraceFailure;

/// Top-level error type for the crate.
#[derive(Debug, Error)]
pub enum AemError {
    /// Invalid geometry or parameters, detected before any assembly.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The linear system is numerically singular at one frequency sample.
    #[error("singular system at sample {sample} (p = {frequency}){}", element_suffix(.element))]
    SingularSystem {
        /// Global index of the offending frequency sample.
        sample: usize,
        /// Laplace abscissa of the sample.
        frequency: CScalar,
        /// Label of the element owning a degenerate row, when one can be identified.
        element: Option<String>,
    },
    /// A query time falls outside the solved time range.
    #[error("time {time} is outside the solved range [{min_time}, {max_time}]")]
    OutOfRange {
        /// Requested (or step-delayed) time.
        time: Scalar,
        /// Earliest solved time.
        min_time: Scalar,
        /// Latest solved time.
        max_time: Scalar,
    },
    /// A query was issued before a successful solve.
    #[error("model has not been solved")]
    NotSolved,
    /// A pathline could not be completed; the partial trajectory is kept.
    #[error(transparent)]
    TraceFailed(#[from] Box<TraceFailure>),
    /// A solve was cancelled between frequency samples.
    #[error("operation cancelled")]
    Cancelled,
}

fn element_suffix(element: &Option<String>) -> String {
    element
        .as_ref()
        .map(|label| format!(" caused by element '{label}'"))
        .unwrap_or_default()
}

impl AemError {
    /// Convenience constructor for configuration errors.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<TraceFailure> for AemError {
    fn from(failure: TraceFailure) -> Self {
        Self::TraceFailed(Box::new(failure))
    }
}

/// Convenience alias for results carrying [`AemError`].
pub type Result<T> = std::result::Result<T, AemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singular_message_names_element() {
        let e = AemError::SingularSystem {
            sample: 3,
            frequency: CScalar::new(1.0, 2.0),
            element: Some("hw1".into()),
        };
        let text = e.to_string();
        assert!(text.contains("sample 3"));
        assert!(text.contains("'hw1'"));
    }

    #[test]
    fn out_of_range_reports_bounds() {
        let e = AemError::OutOfRange { time: 0.5, min_time: 1.0, max_time: 10.0 };
        assert_eq!(e.to_string(), "time 0.5 is outside the solved range [1, 10]");
    }
}
