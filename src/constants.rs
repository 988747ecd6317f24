//! Numerical constants and solver defaults.
//!
//! ## References
//!
//! - de Hoog, F. R., Knight, J. H., & Stokes, A. N. (1982). An improved method for
//!   numerical inversion of Laplace transforms. SIAM J. Sci. Stat. Comput., 3(3), 357-366.
//! - Abramowitz, M., & Stegun, I. A. (1972). Handbook of Mathematical Functions, §9.6.

/// Euler–Mascheroni constant γ.
pub const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Default number of Laplace abscissas per time decade (2M + 1 with M = 10).
pub const DEFAULT_SAMPLES_PER_DECADE: usize = 21;

/// Smallest accepted number of abscissas per decade.
pub const MIN_SAMPLES_PER_DECADE: usize = 5;

/// Target relative error of the inversion; sets the real shift of the abscissas.
pub const INVERSION_TOLERANCE: f64 = 1.0e-9;

/// Default earliest time (days) for which a model is solved.
pub const DEFAULT_MIN_TIME: f64 = 1.0;

/// Default latest time (days) for which a model is solved.
pub const DEFAULT_MAX_TIME: f64 = 10.0;

/// Pivot ratio (min |u_kk| / max |u_kk|) below which an LU factorisation is treated as singular.
pub const SINGULAR_PIVOT_RATIO: f64 = 1.0e-13;

/// Relative tolerance used when checking that layers stack without gaps.
pub const ELEVATION_TOLERANCE: f64 = 1.0e-9;

/// Returns the Laplace abscissa shift γ for a decade inverted over period `period`.
#[inline]
#[must_use]
pub fn abscissa_shift(period: f64) -> f64 {
    -INVERSION_TOLERANCE.ln() / (2.0 * period)
}
