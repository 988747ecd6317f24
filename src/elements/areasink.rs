//! Circular area of uniform infiltration on top of the system.

use super::kernels::area_sink;
use super::{modal_discharge, modal_heads, Element, Member, SourceKind, StressSchedule};
use crate::aquifer::{AquiferSystem, EigenData};
use crate::errors::{AemError, Result};
use crate::math::{real, CMatrix, CScalar, CVector, Scalar, R2};

/// Uniform infiltration rate `N` (positive adds water) over a disc, applied to
/// the top aquifer.
#[derive(Debug, Clone)]
pub struct CircAreaSink {
    label: String,
    center: R2,
    radius: Scalar,
    schedule: StressSchedule,
    members: Vec<Member>,
}

impl CircAreaSink {
    /// Area sink centred at `(x, y)` with radius `radius`.
    pub fn new(
        label: impl Into<String>,
        x: Scalar,
        y: Scalar,
        radius: Scalar,
        schedule: StressSchedule,
    ) -> Result<Self> {
        let label = label.into();
        if radius <= 0.0 || !radius.is_finite() {
            return Err(AemError::config(format!("area sink '{label}' needs a positive radius")));
        }
        if !(x.is_finite() && y.is_finite()) {
            return Err(AemError::config(format!("area sink '{label}' has a non-finite centre")));
        }
        Ok(Self { label, center: R2::new(x, y), radius, schedule, members: Vec::new() })
    }

    /// Radius of the disc.
    #[must_use]
    pub const fn radius(&self) -> Scalar {
        self.radius
    }

    fn inside(&self, point: &R2) -> bool {
        (point - self.center).norm() < self.radius
    }
}

impl Element for CircAreaSink {
    fn label(&self) -> &str {
        &self.label
    }

    fn initialize(&mut self, _system: &AquiferSystem) -> Result<()> {
        self.members =
            vec![Member { aquifer: 0, segment: 0, control: self.center, entry_resistance: 0.0 }];
        Ok(())
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    fn unknown_count(&self) -> usize {
        0
    }

    fn schedule(&self) -> Option<&StressSchedule> {
        Some(&self.schedule)
    }

    fn potential_influence(&self, point: &R2, eigen: &EigenData) -> CMatrix {
        let r = (point - self.center).norm();
        let modal: Vec<CScalar> =
            eigen.mu.iter().map(|&mu| area_sink(r, self.radius, mu).0).collect();
        CMatrix::from_columns(&[modal_heads(eigen, SourceKind::Flux, 0, &modal)])
    }

    fn discharge_influence(&self, point: &R2, eigen: &EigenData) -> (CMatrix, CMatrix) {
        let d = point - self.center;
        let r = d.norm();
        let zero = CScalar::new(0.0, 0.0);
        let (gx, gy): (Vec<CScalar>, Vec<CScalar>) = eigen
            .mu
            .iter()
            .map(|&mu| {
                if r == 0.0 {
                    return (zero, zero);
                }
                let (_, radial) = area_sink(r, self.radius, mu);
                (radial * (d.x / r), radial * (d.y / r))
            })
            .unzip();
        let (qx, qy) = modal_discharge(eigen, SourceKind::Flux, 0, &gx, &gy);
        (CMatrix::from_columns(&[qx]), CMatrix::from_columns(&[qy]))
    }

    fn given_parameters(&self, p: CScalar) -> CVector {
        CVector::from_element(1, p.inv())
    }

    fn discharge(&self, strengths: &CVector, aquifer_count: usize) -> CVector {
        let area = std::f64::consts::PI * self.radius * self.radius;
        let mut out = CVector::zeros(aquifer_count);
        out[0] = -strengths[0] * area;
        out
    }

    fn recharge_influence(&self, point: &R2) -> CVector {
        CVector::from_element(1, real(if self.inside(point) { 1.0 } else { 0.0 }))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn extraction_is_negative_infiltration_over_the_disc() {
        let sink = CircAreaSink::new("rch", 0.0, 0.0, 10.0, StressSchedule::constant(0.001))
            .unwrap();
        let q = sink.discharge(&CVector::from_element(1, real(0.002)), 2);
        assert_relative_eq!(q[0].re, -0.002 * std::f64::consts::PI * 100.0, max_relative = 1.0e-14);
        assert_eq!(q[1], real(0.0));
        assert_eq!(sink.recharge_influence(&R2::new(3.0, 4.0))[0], real(1.0));
        assert_eq!(sink.recharge_influence(&R2::new(30.0, 4.0))[0], real(0.0));
    }

    #[test]
    fn radius_must_be_positive() {
        assert!(CircAreaSink::new("rch", 0.0, 0.0, 0.0, StressSchedule::constant(1.0)).is_err());
    }
}
