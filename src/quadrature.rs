//! Graded Gauss–Legendre quadrature for line-element integrals.
//!
//! Line kernels are smooth along the segment except near the foot of the
//! perpendicular from the evaluation point, where the integrand varies on the
//! scale of the distance to the line. Each side of the foot is split into
//! sub-intervals whose lengths grow geometrically away from it, and every
//! sub-interval gets an 8-point rule.

use crate::math::{CScalar, Scalar};

const GL8_NODES: [Scalar; 4] = [
    0.183_434_642_495_649_8,
    0.525_532_409_916_329_0,
    0.796_666_477_413_626_7,
    0.960_289_856_497_536_3,
];
const GL8_WEIGHTS: [Scalar; 4] = [
    0.362_683_783_378_362_0,
    0.313_706_645_877_887_3,
    0.222_381_034_453_374_5,
    0.101_228_536_290_376_3,
];
const GROWTH: Scalar = 3.0;

/// 8-point Gauss–Legendre rule on `[a, b]` for `N` integrands evaluated together.
pub fn gauss_legendre<const N: usize, F>(a: Scalar, b: Scalar, f: &mut F) -> [CScalar; N]
where
    F: FnMut(Scalar) -> [CScalar; N],
{
    let half = 0.5 * (b - a);
    let mid = 0.5 * (a + b);
    let mut acc = [CScalar::new(0.0, 0.0); N];
    for (node, weight) in GL8_NODES.iter().zip(GL8_WEIGHTS.iter()) {
        for x in [mid - half * node, mid + half * node] {
            let values = f(x);
            for (sum, v) in acc.iter_mut().zip(values.iter()) {
                *sum += v * (weight * half);
            }
        }
    }
    acc
}

/// Integrates over `[a, b]` with sub-intervals graded around `focus`.
///
/// The first sub-interval on each side of `focus` has length `first`; the following
/// ones grow by a factor of three until the end of the range is reached.
pub fn graded<const N: usize, F>(
    a: Scalar,
    b: Scalar,
    focus: Scalar,
    first: Scalar,
    mut f: F,
) -> [CScalar; N]
where
    F: FnMut(Scalar) -> [CScalar; N],
{
    let focus = focus.clamp(a, b);
    let mut total = [CScalar::new(0.0, 0.0); N];
    for (start, end) in [(focus, a), (focus, b)] {
        let length = (end - start).abs();
        if length <= 0.0 {
            continue;
        }
        let direction = (end - start).signum();
        let mut near = 0.0;
        let mut step = first.max(length * 1.0e-12);
        while near < length {
            let far = (near + step).min(length);
            let (lo, hi) = if direction > 0.0 {
                (start + near, start + far)
            } else {
                (start - far, start - near)
            };
            let part = gauss_legendre(lo, hi, &mut f);
            for (sum, v) in total.iter_mut().zip(part.iter()) {
                *sum += v;
            }
            near = far;
            step *= GROWTH;
        }
    }
    total
}
