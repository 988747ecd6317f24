//! Wells with given discharge or given head.

use std::f64::consts::PI;

use super::kernels::{well_gradient, well_potential};
use super::{
    check_layers, modal_discharge, modal_heads, shared_discharge_equations, shared_head_equations,
    Element, EquationContext, EquationRow, Member, SourceKind, StressSchedule,
};
use crate::aquifer::{AquiferSystem, EigenData};
use crate::errors::{AemError, Result};
use crate::math::{distance_to_segment, CMatrix, CScalar, CVector, Scalar, R2, R3};

/// Geometry shared by the well variants.
#[derive(Debug, Clone, PartialEq)]
struct Borehole {
    center: R2,
    radius: Scalar,
    screens: Vec<usize>,
    resistance: Scalar,
    members: Vec<Member>,
}

impl Borehole {
    fn new(label: &str, x: Scalar, y: Scalar, radius: Scalar, screens: Vec<usize>) -> Result<Self> {
        if radius <= 0.0 || !radius.is_finite() {
            return Err(AemError::config(format!("well '{label}' needs a positive radius")));
        }
        if !(x.is_finite() && y.is_finite()) {
            return Err(AemError::config(format!("well '{label}' has a non-finite position")));
        }
        if screens.is_empty() {
            return Err(AemError::config(format!("well '{label}' is not screened in any aquifer")));
        }
        Ok(Self { center: R2::new(x, y), radius, screens, resistance: 0.0, members: Vec::new() })
    }

    fn initialize(&mut self, label: &str, system: &AquiferSystem) -> Result<()> {
        check_layers(label, &self.screens, system)?;
        if self.resistance < 0.0 || self.resistance.is_nan() {
            return Err(AemError::config(format!("well '{label}' has a negative skin resistance")));
        }
        let control = R2::new(self.center.x + self.radius, self.center.y);
        self.members = self
            .screens
            .iter()
            .map(|&aquifer| Member {
                aquifer,
                segment: 0,
                control,
                entry_resistance: self.resistance
                    / (2.0 * PI * self.radius * system.thickness(aquifer)),
            })
            .collect();
        Ok(())
    }

    fn potential(&self, point: &R2, eigen: &EigenData) -> CMatrix {
        let r = (point - self.center).norm();
        let modal: Vec<CScalar> =
            eigen.mu.iter().map(|&mu| well_potential(r, self.radius, mu)).collect();
        let mut out = CMatrix::zeros(eigen.aquifer_count(), self.members.len());
        for (k, member) in self.members.iter().enumerate() {
            out.set_column(k, &modal_heads(eigen, SourceKind::Flux, member.aquifer, &modal));
        }
        out
    }

    fn discharge(&self, point: &R2, eigen: &EigenData) -> (CMatrix, CMatrix) {
        let d = point - self.center;
        let (gx, gy): (Vec<CScalar>, Vec<CScalar>) =
            eigen.mu.iter().map(|&mu| well_gradient(d.x, d.y, self.radius, mu)).unzip();
        let naq = eigen.aquifer_count();
        let mut qx = CMatrix::zeros(naq, self.members.len());
        let mut qy = CMatrix::zeros(naq, self.members.len());
        for (k, member) in self.members.iter().enumerate() {
            let (cx, cy) = modal_discharge(eigen, SourceKind::Flux, member.aquifer, &gx, &gy);
            qx.set_column(k, &cx);
            qy.set_column(k, &cy);
        }
        (qx, qy)
    }

    fn intercepts(&self, from: &R3, to: &R3, aquifer: usize) -> bool {
        self.screens.contains(&aquifer)
            && distance_to_segment(&self.center, &from.xy(), &to.xy()) <= self.radius
    }
}

/// Well with a specified discharge schedule (positive extracts water).
///
/// Screened in one aquifer and without casing storage the discharge is known;
/// otherwise the discharge is split between the screened aquifers by requiring
/// the same head inside the well in each of them.
#[derive(Debug, Clone)]
pub struct Well {
    label: String,
    bore: Borehole,
    casing_radius: Scalar,
    schedule: StressSchedule,
}

impl Well {
    /// Well at `(x, y)` with radius `radius`, screened in `screens`.
    pub fn new(
        label: impl Into<String>,
        x: Scalar,
        y: Scalar,
        radius: Scalar,
        screens: Vec<usize>,
        schedule: StressSchedule,
    ) -> Result<Self> {
        let label = label.into();
        let bore = Borehole::new(&label, x, y, radius, screens)?;
        Ok(Self { label, bore, casing_radius: 0.0, schedule })
    }

    /// Sets the skin resistance of the well screen.
    #[must_use]
    pub fn with_resistance(mut self, resistance: Scalar) -> Self {
        self.bore.resistance = resistance;
        self
    }

    /// Sets the casing radius; wellbore storage is `π rc²`.
    #[must_use]
    pub fn with_casing_radius(mut self, casing_radius: Scalar) -> Self {
        self.casing_radius = casing_radius;
        self
    }

    /// Well position.
    #[must_use]
    pub fn center(&self) -> R2 {
        self.bore.center
    }

    fn storage(&self) -> Scalar {
        PI * self.casing_radius * self.casing_radius
    }

    fn has_unknowns(&self) -> bool {
        self.bore.members.len() > 1 || self.storage() > 0.0
    }
}

impl Element for Well {
    fn label(&self) -> &str {
        &self.label
    }

    fn initialize(&mut self, system: &AquiferSystem) -> Result<()> {
        if self.casing_radius < 0.0 || self.casing_radius.is_nan() {
            return Err(AemError::config(format!(
                "well '{}' has a negative casing radius",
                self.label
            )));
        }
        self.bore.initialize(&self.label, system)
    }

    fn members(&self) -> &[Member] {
        &self.bore.members
    }

    fn unknown_count(&self) -> usize {
        if self.has_unknowns() {
            self.bore.members.len()
        } else {
            0
        }
    }

    fn schedule(&self) -> Option<&StressSchedule> {
        Some(&self.schedule)
    }

    fn potential_influence(&self, point: &R2, eigen: &EigenData) -> CMatrix {
        self.bore.potential(point, eigen)
    }

    fn discharge_influence(&self, point: &R2, eigen: &EigenData) -> (CMatrix, CMatrix) {
        self.bore.discharge(point, eigen)
    }

    fn given_parameters(&self, p: CScalar) -> CVector {
        if self.has_unknowns() {
            CVector::zeros(self.bore.members.len())
        } else {
            CVector::from_element(1, p.inv())
        }
    }

    fn boundary_equations(&self, ctx: &EquationContext<'_>) -> Vec<EquationRow> {
        if self.has_unknowns() {
            shared_discharge_equations(ctx, &self.bore.members, self.storage())
        } else {
            Vec::new()
        }
    }

    fn intercepts(&self, from: &R3, to: &R3, aquifer: usize) -> bool {
        self.bore.intercepts(from, to, aquifer)
    }
}

/// Well with a specified head schedule inside the well.
#[derive(Debug, Clone)]
pub struct HeadWell {
    label: String,
    bore: Borehole,
    schedule: StressSchedule,
}

impl HeadWell {
    /// Head-specified well at `(x, y)` screened in `screens`.
    pub fn new(
        label: impl Into<String>,
        x: Scalar,
        y: Scalar,
        radius: Scalar,
        screens: Vec<usize>,
        schedule: StressSchedule,
    ) -> Result<Self> {
        let label = label.into();
        let bore = Borehole::new(&label, x, y, radius, screens)?;
        Ok(Self { label, bore, schedule })
    }

    /// Sets the skin resistance of the well screen.
    #[must_use]
    pub fn with_resistance(mut self, resistance: Scalar) -> Self {
        self.bore.resistance = resistance;
        self
    }
}

impl Element for HeadWell {
    fn label(&self) -> &str {
        &self.label
    }

    fn initialize(&mut self, system: &AquiferSystem) -> Result<()> {
        self.bore.initialize(&self.label, system)
    }

    fn members(&self) -> &[Member] {
        &self.bore.members
    }

    fn unknown_count(&self) -> usize {
        self.bore.members.len()
    }

    fn schedule(&self) -> Option<&StressSchedule> {
        Some(&self.schedule)
    }

    fn potential_influence(&self, point: &R2, eigen: &EigenData) -> CMatrix {
        self.bore.potential(point, eigen)
    }

    fn discharge_influence(&self, point: &R2, eigen: &EigenData) -> (CMatrix, CMatrix) {
        self.bore.discharge(point, eigen)
    }

    fn boundary_equations(&self, ctx: &EquationContext<'_>) -> Vec<EquationRow> {
        shared_head_equations(ctx, &self.bore.members)
    }

    fn intercepts(&self, from: &R3, to: &R3, aquifer: usize) -> bool {
        self.bore.intercepts(from, to, aquifer)
    }
}
