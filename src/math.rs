//! Shared numerical primitives anchored on `nalgebra`.

use nalgebra::{DMatrix, DVector, Vector2, Vector3};

/// Primary scalar type used across the crate.
pub type Scalar = f64;
/// Complex scalar used for Laplace-domain quantities.
pub type CScalar = num_complex::Complex<Scalar>;
/// Horizontal position or direction.
pub type R2 = Vector2<Scalar>;
/// Position or velocity in three dimensions (z is elevation).
pub type R3 = Vector3<Scalar>;
/// Dense complex matrix.
pub type CMatrix = DMatrix<CScalar>;
/// Dense complex column vector.
pub type CVector = DVector<CScalar>;

/// Lifts a real value into the complex plane.
#[inline]
#[must_use]
pub fn real(value: Scalar) -> CScalar {
    CScalar::new(value, 0.0)
}

/// Shortest distance from `point` to the segment `a`–`b`.
#[must_use]
pub fn distance_to_segment(point: &R2, a: &R2, b: &R2) -> Scalar {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 == 0.0 {
        return (point - a).norm();
    }
    let t = ((point - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (point - (a + ab * t)).norm()
}

/// True when the closed segments `p1`–`p2` and `q1`–`q2` share a point.
#[must_use]
pub fn segments_intersect(p1: &R2, p2: &R2, q1: &R2, q2: &R2) -> bool {
    fn cross(o: &R2, a: &R2, b: &R2) -> Scalar {
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    }
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);
    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    (d1 == 0.0 && distance_to_segment(p1, q1, q2) == 0.0)
        || (d2 == 0.0 && distance_to_segment(p2, q1, q2) == 0.0)
        || (d3 == 0.0 && distance_to_segment(q1, p1, p2) == 0.0)
        || (d4 == 0.0 && distance_to_segment(q2, p1, p2) == 0.0)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn distance_to_segment_handles_interior_and_ends() {
        let a = R2::new(0.0, 0.0);
        let b = R2::new(10.0, 0.0);
        assert_relative_eq!(distance_to_segment(&R2::new(5.0, 3.0), &a, &b), 3.0);
        assert_relative_eq!(distance_to_segment(&R2::new(13.0, 4.0), &a, &b), 5.0);
    }

    #[test]
    fn crossing_segments_intersect() {
        let hit = segments_intersect(
            &R2::new(0.0, -1.0),
            &R2::new(0.0, 1.0),
            &R2::new(-1.0, 0.0),
            &R2::new(1.0, 0.0),
        );
        assert!(hit);
        let miss = segments_intersect(
            &R2::new(2.0, -1.0),
            &R2::new(2.0, 1.0),
            &R2::new(-1.0, 0.0),
            &R2::new(1.0, 0.0),
        );
        assert!(!miss);
    }
}
