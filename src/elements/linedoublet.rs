//! Leaky and impermeable walls represented by line-doublets.
//!
//! The strength of a line-doublet is the head jump `h⁺ − h⁻` across the wall,
//! with `+` on the side of the left normal. A leaky wall with resistance `c`
//! passes `Qn = −(H / c)(h⁺ − h⁻)` in the direction of the normal; an
//! impermeable wall passes nothing.

use super::kernels::{line_kernel, SegmentFrame};
use super::linesink::polyline;
use super::{
    check_layers, modal_discharge, modal_heads, Element, EquationContext, EquationRow, Member,
    SourceKind, StressSchedule,
};
use crate::aquifer::{AquiferSystem, EigenData};
use crate::errors::{AemError, Result};
use crate::math::{real, CMatrix, CScalar, CVector, Scalar, R2};

/// String of line-doublets forming a wall.
#[derive(Debug, Clone)]
pub struct LeakyLineDoubletString {
    label: String,
    segments: Vec<SegmentFrame>,
    aquifers: Vec<usize>,
    resistance: Option<Scalar>,
    members: Vec<Member>,
    conductance: Vec<Scalar>,
}

/// A single leaky wall segment is a string of one segment.
pub type LeakyLineDoublet = LeakyLineDoubletString;

impl LeakyLineDoubletString {
    /// Wall through `vertices` in `aquifers`; `resistance = None` makes it impermeable.
    pub fn new(
        label: impl Into<String>,
        vertices: &[R2],
        aquifers: Vec<usize>,
        resistance: Option<Scalar>,
    ) -> Result<Self> {
        let label = label.into();
        if let Some(res) = resistance {
            if res <= 0.0 || !res.is_finite() {
                return Err(AemError::config(format!(
                    "wall '{label}' needs a positive finite resistance"
                )));
            }
        }
        let segments = polyline(&label, vertices)?;
        Ok(Self {
            label,
            segments,
            aquifers,
            resistance,
            members: Vec::new(),
            conductance: Vec::new(),
        })
    }

    /// Single wall segment from `start` to `end`.
    pub fn segment(
        label: impl Into<String>,
        start: R2,
        end: R2,
        aquifers: Vec<usize>,
        resistance: Option<Scalar>,
    ) -> Result<Self> {
        Self::new(label, &[start, end], aquifers, resistance)
    }

    /// True when the wall passes no water.
    #[must_use]
    pub const fn is_impermeable(&self) -> bool {
        self.resistance.is_none()
    }
}

impl Element for LeakyLineDoubletString {
    fn label(&self) -> &str {
        &self.label
    }

    fn initialize(&mut self, system: &AquiferSystem) -> Result<()> {
        check_layers(&self.label, &self.aquifers, system)?;
        self.members.clear();
        self.conductance.clear();
        for (segment, frame) in self.segments.iter().enumerate() {
            for &aquifer in &self.aquifers {
                self.members.push(Member {
                    aquifer,
                    segment,
                    control: frame.center(),
                    entry_resistance: 0.0,
                });
                self.conductance
                    .push(self.resistance.map_or(0.0, |res| system.thickness(aquifer) / res));
            }
        }
        Ok(())
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    fn unknown_count(&self) -> usize {
        self.members.len()
    }

    fn schedule(&self) -> Option<&StressSchedule> {
        None
    }

    fn potential_influence(&self, point: &R2, eigen: &EigenData) -> CMatrix {
        let mut out = CMatrix::zeros(eigen.aquifer_count(), self.members.len());
        let per_segment = self.aquifers.len();
        for (s, frame) in self.segments.iter().enumerate() {
            let (x, y) = frame.local(point);
            let modal: Vec<CScalar> =
                eigen.mu.iter().map(|&mu| line_kernel(x, y, frame.length, mu).doublet).collect();
            for (j, &aquifer) in self.aquifers.iter().enumerate() {
                out.set_column(
                    s * per_segment + j,
                    &modal_heads(eigen, SourceKind::Jump, aquifer, &modal),
                );
            }
        }
        out
    }

    fn discharge_influence(&self, point: &R2, eigen: &EigenData) -> (CMatrix, CMatrix) {
        let naq = eigen.aquifer_count();
        let mut qx = CMatrix::zeros(naq, self.members.len());
        let mut qy = CMatrix::zeros(naq, self.members.len());
        let per_segment = self.aquifers.len();
        for (s, frame) in self.segments.iter().enumerate() {
            let (x, y) = frame.local(point);
            let (gx, gy): (Vec<CScalar>, Vec<CScalar>) = eigen
                .mu
                .iter()
                .map(|&mu| {
                    let (lx, ly) = line_kernel(x, y, frame.length, mu).doublet_gradient;
                    frame.to_global(lx, ly)
                })
                .unzip();
            for (j, &aquifer) in self.aquifers.iter().enumerate() {
                let (cx, cy) = modal_discharge(eigen, SourceKind::Jump, aquifer, &gx, &gy);
                qx.set_column(s * per_segment + j, &cx);
                qy.set_column(s * per_segment + j, &cy);
            }
        }
        (qx, qy)
    }

    fn boundary_equations(&self, ctx: &EquationContext<'_>) -> Vec<EquationRow> {
        let rhs = CScalar::new(0.0, 0.0);
        let mut rows = Vec::with_capacity(self.members.len());
        let per_segment = self.aquifers.len();
        for (s, frame) in self.segments.iter().enumerate() {
            let normal_rows = ctx.normal_discharge_rows(&frame.center(), &frame.normal);
            for j in 0..per_segment {
                let k = s * per_segment + j;
                let member = &self.members[k];
                let mut coefficients = normal_rows.row(member.aquifer).transpose();
                coefficients[ctx.own(k)] += real(self.conductance[k]);
                rows.push(EquationRow { coefficients, rhs });
            }
        }
        rows
    }

    fn discharge(&self, _strengths: &CVector, aquifer_count: usize) -> CVector {
        CVector::zeros(aquifer_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aquifer::{Layer, TopBoundary};

    #[test]
    fn walls_validate_resistance_and_geometry() {
        let a = R2::new(0.0, -10.0);
        let b = R2::new(0.0, 10.0);
        assert!(LeakyLineDoublet::segment("w", a, b, vec![0], Some(0.0)).is_err());
        assert!(LeakyLineDoublet::segment("w", a, a, vec![0], None).is_err());
        let wall = LeakyLineDoublet::segment("w", a, b, vec![0], None).unwrap();
        assert!(wall.is_impermeable());
    }

    #[test]
    fn conductance_scales_with_thickness() {
        let system = AquiferSystem::build(
            vec![
                Layer::aquifer(0.0, -10.0, 10.0, 1.0e-4),
                Layer::leaky(-10.0, -11.0, 20.0, 0.0),
                Layer::aquifer(-11.0, -31.0, 10.0, 1.0e-4),
            ],
            TopBoundary::Confined,
        )
        .unwrap();
        let vertices = [R2::new(0.0, 0.0), R2::new(0.0, 50.0), R2::new(30.0, 50.0)];
        let mut wall = LeakyLineDoubletString::new("w", &vertices, vec![0, 1], Some(4.0)).unwrap();
        wall.initialize(&system).unwrap();
        assert_eq!(wall.unknown_count(), 4);
        assert_eq!(wall.conductance, vec![2.5, 5.0, 2.5, 5.0]);
        assert!(wall.schedule().is_none());
        assert_eq!(wall.discharge(&CVector::zeros(4), 2), CVector::zeros(2));
    }
}
