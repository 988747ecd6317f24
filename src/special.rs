//! Modified Bessel functions of complex argument and leaky-layer helpers.
//!
//! Arguments of the Laplace-domain kernels are `μ r` with `Re μ > 0`, so only the
//! right half plane is supported. `K0`/`K1` use the ascending series for
//! `|z| ≤ 2` and Steed's continued fraction (Temme's CF2) beyond; `I0`/`I1` use
//! the ascending series up to `|z| = 20` and the Hankel expansion beyond. The
//! `_scaled` variants carry the exponential factor out so products such as
//! `K1(Rμ) I0(rμ)` stay finite for large arguments.

use crate::constants::EULER_GAMMA;
use crate::math::{CScalar, Scalar};

const SERIES_RADIUS: Scalar = 2.0;
const I_SERIES_RADIUS: Scalar = 20.0;
const EPS: Scalar = 1.0e-16;
const MAX_TERMS: usize = 500;
const MAX_CF_ITERATIONS: usize = 20_000;

/// `(K0(z), K1(z))` for `Re z > 0`.
#[must_use]
pub fn k0_k1(z: CScalar) -> (CScalar, CScalar) {
    let (k0, k1) = k0_k1_scaled(z);
    let damp = (-z).exp();
    (k0 * damp, k1 * damp)
}

/// Modified Bessel function of the second kind, order zero.
#[must_use]
pub fn k0(z: CScalar) -> CScalar {
    k0_k1(z).0
}

/// Modified Bessel function of the second kind, order one.
#[must_use]
pub fn k1(z: CScalar) -> CScalar {
    k0_k1(z).1
}

/// `(K0(z) e^z, K1(z) e^z)`.
#[must_use]
pub fn k0_k1_scaled(z: CScalar) -> (CScalar, CScalar) {
    if z.norm() <= SERIES_RADIUS {
        let (k0, k1) = k_series(z);
        let grow = z.exp();
        (k0 * grow, k1 * grow)
    } else {
        k_continued_fraction(z)
    }
}

/// `(I0(z) e^-z, I1(z) e^-z)`.
#[must_use]
pub fn i0_i1_scaled(z: CScalar) -> (CScalar, CScalar) {
    if z.norm() <= I_SERIES_RADIUS {
        let (i0, i1) = i_series(z);
        let damp = (-z).exp();
        (i0 * damp, i1 * damp)
    } else {
        (i_asymptotic(z, 0.0), i_asymptotic(z, 1.0))
    }
}

fn k_series(z: CScalar) -> (CScalar, CScalar) {
    let y = z * z * 0.25;
    let log_half = (z * 0.5).ln();
    let mut term0 = CScalar::new(1.0, 0.0);
    let mut term1 = CScalar::new(1.0, 0.0);
    let mut harmonic = 0.0;
    let mut i0 = CScalar::new(0.0, 0.0);
    let mut s0 = CScalar::new(0.0, 0.0);
    let mut i1_sum = CScalar::new(0.0, 0.0);
    let mut s1 = CScalar::new(0.0, 0.0);
    for k in 0..MAX_TERMS {
        if k > 0 {
            let kf = k as Scalar;
            term0 *= y / (kf * kf);
            term1 *= y / (kf * (kf + 1.0));
            harmonic += 1.0 / kf;
        }
        let harmonic_next = harmonic + 1.0 / (k as Scalar + 1.0);
        i0 += term0;
        s0 += term0 * harmonic;
        i1_sum += term1;
        s1 += term1 * (harmonic + harmonic_next - 2.0 * EULER_GAMMA);
        if term0.norm() <= EPS * i0.norm() && term1.norm() <= EPS * i1_sum.norm() {
            break;
        }
    }
    let i1 = z * 0.5 * i1_sum;
    let k0 = -(log_half + EULER_GAMMA) * i0 + s0;
    let k1 = z.inv() + log_half * i1 - z * 0.25 * s1;
    (k0, k1)
}

// Steed's algorithm for K_ν with ν = 0 (Numerical Recipes `bessik`, CF2 branch),
// carried over to complex arguments.
fn k_continued_fraction(z: CScalar) -> (CScalar, CScalar) {
    let one = CScalar::new(1.0, 0.0);
    let a1 = 0.25;
    let mut b = (one + z) * 2.0;
    let mut d = b.inv();
    let mut delh = d;
    let mut h = d;
    let mut q1 = CScalar::new(0.0, 0.0);
    let mut q2 = one;
    let mut q = CScalar::new(a1, 0.0);
    let mut c = CScalar::new(a1, 0.0);
    let mut a = -a1;
    let mut s = one + q * delh;
    for i in 2..MAX_CF_ITERATIONS {
        let fi = i as Scalar;
        a -= 2.0 * (fi - 1.0);
        c = -c * a / fi;
        let qnew = (q1 - b * q2) / a;
        q1 = q2;
        q2 = qnew;
        q += c * qnew;
        b += 2.0;
        d = (b + d * a).inv();
        delh = (b * d - one) * delh;
        h += delh;
        let dels = q * delh;
        s += dels;
        if dels.norm() < EPS * s.norm() {
            break;
        }
    }
    let h = h * a1;
    let k0 = (CScalar::new(std::f64::consts::FRAC_PI_2, 0.0) / z).sqrt() / s;
    let k1 = k0 * (z + 0.5 - h) / z;
    (k0, k1)
}

fn i_series(z: CScalar) -> (CScalar, CScalar) {
    let y = z * z * 0.25;
    let mut term0 = CScalar::new(1.0, 0.0);
    let mut term1 = CScalar::new(1.0, 0.0);
    let mut i0 = term0;
    let mut i1 = term1;
    for k in 1..MAX_TERMS {
        let kf = k as Scalar;
        term0 *= y / (kf * kf);
        term1 *= y / (kf * (kf + 1.0));
        i0 += term0;
        i1 += term1;
        if term0.norm() <= EPS * i0.norm() && term1.norm() <= EPS * i1.norm() {
            break;
        }
    }
    (i0, z * 0.5 * i1)
}

fn i_asymptotic(z: CScalar, order: Scalar) -> CScalar {
    let nu4 = 4.0 * order * order;
    let mut term = CScalar::new(1.0, 0.0);
    let mut sum = term;
    let mut previous = Scalar::INFINITY;
    for k in 1..60 {
        let kf = k as Scalar;
        let odd = 2.0 * kf - 1.0;
        term *= (odd * odd - nu4) / (8.0 * kf) / z;
        let size = term.norm();
        if size > previous {
            break;
        }
        sum += term;
        previous = size;
        if size < EPS * sum.norm() {
            break;
        }
    }
    sum / (z * 2.0 * std::f64::consts::PI).sqrt()
}

/// `b coth b`, equal to 1 at `b = 0`.
#[must_use]
pub fn b_coth_b(b: CScalar) -> CScalar {
    if b.norm() < 1.0e-4 {
        return 1.0 + b * b / 3.0;
    }
    let e = (-2.0 * b).exp();
    b * (1.0 + e) / (1.0 - e)
}

/// `b csch b`, equal to 1 at `b = 0`.
#[must_use]
pub fn b_csch_b(b: CScalar) -> CScalar {
    if b.norm() < 1.0e-4 {
        return 1.0 - b * b / 6.0;
    }
    let e = (-2.0 * b).exp();
    b * 2.0 * (-b).exp() / (1.0 - e)
}

/// Exponential integral `E1(x)` for real `x > 0`; the Theis well function.
#[must_use]
pub fn exp_integral_e1(x: Scalar) -> Scalar {
    if x <= 1.0 {
        let mut sum = 0.0;
        let mut term = 1.0;
        for k in 1..MAX_TERMS {
            let kf = k as Scalar;
            term *= -x / kf;
            let add = -term / kf;
            sum += add;
            if add.abs() < EPS * sum.abs().max(1.0e-300) {
                break;
            }
        }
        -EULER_GAMMA - x.ln() + sum
    } else {
        // Lentz continued fraction.
        let tiny = 1.0e-300;
        let mut b = x + 1.0;
        let mut c = 1.0 / tiny;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..MAX_TERMS {
            let an = -((i * i) as Scalar);
            b += 2.0;
            d = 1.0 / (an * d + b);
            c = b + an / c;
            let del = c * d;
            h *= del;
            if (del - 1.0).abs() < EPS {
                break;
            }
        }
        h * (-x).exp()
    }
}
