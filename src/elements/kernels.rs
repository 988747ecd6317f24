//! Modal influence functions.
//!
//! Each function solves `∇²ψ = μ² ψ` (plus a source term) for one mode with
//! decay constant `μ`, for a unit strength of the element. Discharge-type
//! kernels are normalised so that a unit strength extracts unit discharge;
//! doublet kernels carry a unit jump of ψ across the element.

use std::f64::consts::{FRAC_1_PI, PI};

use crate::math::{CScalar, Scalar, R2};
use crate::quadrature;
use crate::special::{i0_i1_scaled, k0_k1, k0_k1_scaled};

const TWO_PI: Scalar = 2.0 * PI;

/// Potential of a well of radius `rw` extracting unit discharge, at distance `r`.
///
/// Inside the well the radius is clamped to `rw`.
#[must_use]
pub fn well_potential(r: Scalar, rw: Scalar, mu: CScalar) -> CScalar {
    let r = r.max(rw);
    let (k0r, _) = k0_k1_scaled(mu * r);
    let (_, k1w) = k0_k1_scaled(mu * rw);
    -k0r * (-(mu * (r - rw))).exp() / (TWO_PI * rw * mu * k1w)
}

/// Gradient `(∂ψ/∂x, ∂ψ/∂y)` of [`well_potential`] at offset `(dx, dy)` from the well.
///
/// Zero inside the well.
#[must_use]
pub fn well_gradient(dx: Scalar, dy: Scalar, rw: Scalar, mu: CScalar) -> (CScalar, CScalar) {
    let r = dx.hypot(dy);
    if r < rw {
        let zero = CScalar::new(0.0, 0.0);
        return (zero, zero);
    }
    let (_, k1r) = k0_k1_scaled(mu * r);
    let (_, k1w) = k0_k1_scaled(mu * rw);
    let radial = k1r * (-(mu * (r - rw))).exp() / (TWO_PI * rw * k1w);
    (radial * (dx / r), radial * (dy / r))
}

/// Local frame of a straight segment: `X` along the segment from its start, `Y`
/// along the left normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentFrame {
    /// Start vertex.
    pub start: R2,
    /// End vertex.
    pub end: R2,
    /// Segment length.
    pub length: Scalar,
    /// Unit tangent.
    pub tangent: R2,
    /// Unit left normal.
    pub normal: R2,
}

impl SegmentFrame {
    /// Frame of the segment `start`–`end` (length must be positive).
    #[must_use]
    pub fn new(start: R2, end: R2) -> Self {
        let d = end - start;
        let length = d.norm();
        let tangent = d / length;
        Self { start, end, length, tangent, normal: R2::new(-tangent.y, tangent.x) }
    }

    /// Segment midpoint.
    #[must_use]
    pub fn center(&self) -> R2 {
        (self.start + self.end) * 0.5
    }

    /// Local coordinates of `point`; `Y = -0` is folded onto the positive side.
    #[must_use]
    pub fn local(&self, point: &R2) -> (Scalar, Scalar) {
        let d = point - self.start;
        let y = d.dot(&self.normal);
        (d.dot(&self.tangent), if y == 0.0 { 0.0 } else { y })
    }

    /// Rotates a local gradient `(∂/∂X, ∂/∂Y)` back to global `(∂/∂x, ∂/∂y)`.
    #[must_use]
    pub fn to_global(&self, gx: CScalar, gy: CScalar) -> (CScalar, CScalar) {
        (
            gx * self.tangent.x + gy * self.normal.x,
            gx * self.tangent.y + gy * self.normal.y,
        )
    }
}

/// Modal line-sink and line-doublet values at one point for one mode.
#[derive(Debug, Clone, Copy)]
pub struct LineKernel {
    /// `∫ K0(μρ) dξ` over the segment.
    pub p_integral: CScalar,
    /// Line-sink potential per unit total discharge.
    pub sink: CScalar,
    /// Local gradient of the line-sink potential.
    pub sink_gradient: (CScalar, CScalar),
    /// Line-doublet potential per unit jump.
    pub doublet: CScalar,
    /// Local gradient of the line-doublet potential.
    pub doublet_gradient: (CScalar, CScalar),
}

/// Evaluates line-sink and line-doublet kernels at local coordinates `(x, y)`
/// of a segment of length `length`.
#[must_use]
pub fn line_kernel(x: Scalar, y: Scalar, length: Scalar, mu: CScalar) -> LineKernel {
    let ln_mu = mu.ln();
    let first = 0.5 * y.abs().min(1.0 / mu.norm()).max(1.0e-6 * length);
    let [regular, doublet_tail] = quadrature::graded(0.0, length, x, first, |xi| {
        let rho = (xi - x).hypot(y);
        let (k0, k1) = k0_k1(mu * rho);
        let smooth = k0 + ln_mu + rho.ln();
        let tail = if y == 0.0 {
            CScalar::new(0.0, 0.0)
        } else {
            (mu * rho * k1 - 1.0) * (y / (rho * rho))
        };
        [smooth, tail]
    });
    let log_integral = log_distance_integral(length - x, y) - log_distance_integral(-x, y);
    let p_integral = regular - (ln_mu * length + log_integral);

    let angle = y.atan2(x - length) - y.atan2(x);
    let doublet = (doublet_tail + angle) / TWO_PI;

    let floor = 1.0e-10 * length;
    let rho_a = x.hypot(y).max(floor);
    let rho_b = (x - length).hypot(y).max(floor);
    let (k0a, k1a) = k0_k1(mu * rho_a);
    let (k0b, k1b) = k0_k1(mu * rho_b);

    let sink = -p_integral / (TWO_PI * length);
    let sink_gradient = (-(k0a - k0b) / (TWO_PI * length), doublet / length);

    let g = |k1: CScalar, rho: Scalar| mu * k1 * (y / (TWO_PI * rho));
    let p_xx = -mu * k1a * (x / rho_a) + mu * k1b * ((x - length) / rho_b);
    let doublet_gradient = (
        g(k1a, rho_a) - g(k1b, rho_b),
        -(mu * mu * p_integral - p_xx) * (0.5 * FRAC_1_PI),
    );

    LineKernel { p_integral, sink, sink_gradient, doublet, doublet_gradient }
}

// ∫ ln √(u² + y²) du, antiderivative evaluated at u.
fn log_distance_integral(u: Scalar, y: Scalar) -> Scalar {
    let r = u.hypot(y);
    let log_term = if u == 0.0 { 0.0 } else { u * r.ln() };
    let angle_term = if y == 0.0 { 0.0 } else { y * (u / y).atan() };
    log_term - u + angle_term
}

/// Potential and radial derivative of a circular area sink of radius `radius`
/// with unit infiltration, at distance `r` from its centre.
#[must_use]
pub fn area_sink(r: Scalar, radius: Scalar, mu: CScalar) -> (CScalar, CScalar) {
    let mu2 = mu * mu;
    let zr = mu * r;
    let zrad = mu * radius;
    if r < radius {
        let (_, k1_big) = k0_k1_scaled(zrad);
        let (i0_small, i1_small) = i0_i1_scaled(zr);
        let decay = (mu * (r - radius)).exp();
        let psi = (1.0 - zrad * k1_big * i0_small * decay) / mu2;
        let dpsi = -k1_big * i1_small * decay * radius;
        (psi, dpsi)
    } else {
        let (_, i1_big) = i0_i1_scaled(zrad);
        let (k0_small, k1_small) = k0_k1_scaled(zr);
        let decay = (mu * (radius - r)).exp();
        let psi = zrad * i1_big * k0_small * decay / mu2;
        let dpsi = -i1_big * k1_small * decay * radius;
        (psi, dpsi)
    }
}
