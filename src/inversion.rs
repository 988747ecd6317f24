//! Numerical inversion of Laplace-domain samples back to real time.
//!
//! Implements the quotient-difference scheme of de Hoog, Knight & Stokes (1982):
//! the Fourier series of `e^{-γt} f(t)` on `[0, 2T]` is summed through its
//! continued-fraction representation, and the tail of the fraction is replaced
//! by the accelerated remainder. Each decade of the [`FrequencyGrid`] carries its
//! own period and shift, so the same routine inverts any quantity sampled on
//! that decade (head, discharge, vertical flux, velocity).
//!
//! [`FrequencyGrid`]: crate::sweep::FrequencyGrid

use crate::math::{CScalar, Scalar};
use crate::sweep::Decade;

/// Stateless de Hoog inverter.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplaceInverter;

impl LaplaceInverter {
    /// Inverts `values` (one per abscissa of `decade`, in sample order) at time `t`.
    ///
    /// `values.len()` must be odd; a series that is identically zero inverts to zero.
    #[must_use]
    pub fn invert(decade: &Decade, t: Scalar, values: &[CScalar]) -> Scalar {
        let n = values.len();
        debug_assert!(n % 2 == 1 && n >= 3);
        if values.iter().all(|v| v.norm() == 0.0) {
            return 0.0;
        }
        let d = continued_fraction(values);
        let z = CScalar::new(0.0, std::f64::consts::PI * t / decade.period).exp();
        let ratio = evaluate(&d, z);
        (decade.shift * t).exp() / decade.period * ratio.re
    }

    /// Inverts several quantities sharing the same decade; `series[k]` holds the
    /// samples of quantity `k`.
    #[must_use]
    pub fn invert_all(decade: &Decade, t: Scalar, series: &[Vec<CScalar>]) -> Vec<Scalar> {
        series.iter().map(|values| Self::invert(decade, t, values)).collect()
    }
}

// Coefficients d_0 .. d_2M of the continued fraction from the qd table.
fn continued_fraction(values: &[CScalar]) -> Vec<CScalar> {
    let zero = CScalar::new(0.0, 0.0);
    let n = values.len();
    let m = (n - 1) / 2;
    let mut a = values.to_vec();
    a[0] *= 0.5;

    let mut e = vec![vec![zero; m + 1]; n];
    let mut q = vec![vec![zero; m + 1]; n];
    for i in 0..n - 1 {
        q[i][1] = safe_div(a[i + 1], a[i]);
    }
    for r in 1..=m {
        for i in 0..=2 * (m - r) {
            e[i][r] = q[i + 1][r] - q[i][r] + e[i + 1][r - 1];
        }
        if r < m {
            for i in 0..2 * (m - r) {
                q[i][r + 1] = safe_div(q[i + 1][r] * e[i + 1][r], e[i][r]);
            }
        }
    }

    let mut d = vec![zero; 2 * m + 1];
    d[0] = a[0];
    for r in 1..=m {
        d[2 * r - 1] = -q[0][r];
        d[2 * r] = -e[0][r];
    }
    d
}

// A/B of the continued fraction at z, with the accelerated remainder for the last term.
fn evaluate(d: &[CScalar], z: CScalar) -> CScalar {
    let one = CScalar::new(1.0, 0.0);
    let last = d.len() - 1;
    let mut a = vec![CScalar::new(0.0, 0.0); last + 2];
    let mut b = vec![one; last + 2];
    a[1] = d[0];
    for k in 2..=last + 1 {
        a[k] = a[k - 1] + d[k - 1] * z * a[k - 2];
        b[k] = b[k - 1] + d[k - 1] * z * b[k - 2];
    }

    let h = 0.5 * (one + (d[last - 1] - d[last]) * z);
    if h.norm() > 0.0 {
        let remainder = -h * (one - (one + d[last] * z / (h * h)).sqrt());
        a[last + 1] = a[last] + remainder * a[last - 1];
        b[last + 1] = b[last] + remainder * b[last - 1];
    }
    a[last + 1] / b[last + 1]
}

fn safe_div(num: CScalar, den: CScalar) -> CScalar {
    if den.norm() == 0.0 {
        CScalar::new(0.0, 0.0)
    } else {
        num / den
    }
}
