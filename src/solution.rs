//! Immutable result of a solve and its real-time query surface.
//!
//! Every query builds the Laplace-domain influence of the requested quantity
//! per unit element parameter, multiplies by the solved strengths and inverts
//! each forcing increment with its own delay.

use std::sync::Arc;

use crate::aquifer::{AquiferSystem, EigenData, Layer, TopBoundary};
use crate::elements::{superpose_discharge, superpose_heads, Element, ElementId};
use crate::errors::{AemError, Result};
use crate::math::{CMatrix, CScalar, CVector, Scalar, R2, R3};
use crate::solver::{SolveReport, SolvedCoefficients};
use crate::sweep::linspace;
use crate::trace::VelocityField;

/// A solved model: the aquifer system, the element registry it was solved
/// with, and the per-frequency strengths.
#[derive(Debug)]
pub struct SolvedModel {
    system: Arc<AquiferSystem>,
    elements: Vec<Arc<dyn Element>>,
    coefficients: SolvedCoefficients,
    reports: Vec<SolveReport>,
}

impl SolvedModel {
    pub(crate) fn new(
        system: Arc<AquiferSystem>,
        elements: Vec<Arc<dyn Element>>,
        coefficients: SolvedCoefficients,
        reports: Vec<SolveReport>,
    ) -> Self {
        Self { system, elements, coefficients, reports }
    }

    /// The aquifer system.
    #[must_use]
    pub fn system(&self) -> &AquiferSystem {
        &self.system
    }

    /// Elements in registry order.
    #[must_use]
    pub fn elements(&self) -> &[Arc<dyn Element>] {
        &self.elements
    }

    /// Solved strengths per frequency sample.
    #[must_use]
    pub const fn coefficients(&self) -> &SolvedCoefficients {
        &self.coefficients
    }

    /// Solve diagnostics, one per frequency sample.
    #[must_use]
    pub fn reports(&self) -> &[SolveReport] {
        &self.reports
    }

    /// Largest condition estimate over all samples.
    #[must_use]
    pub fn worst_condition(&self) -> Option<Scalar> {
        self.reports.iter().filter_map(|r| r.cond_estimate).reduce(Scalar::max)
    }

    /// Heads in every aquifer at `(x, y)` and time `t`.
    pub fn head(&self, x: Scalar, y: Scalar, t: Scalar) -> Result<Vec<Scalar>> {
        let point = R2::new(x, y);
        let naq = self.system.aquifer_count();
        self.invert(t, naq, |eigen| Ok(self.head_rows(&point, eigen)))
    }

    /// Head in aquifer `aquifer` at `(x, y)` and time `t`.
    pub fn head_in_layer(&self, x: Scalar, y: Scalar, t: Scalar, aquifer: usize) -> Result<Scalar> {
        self.check_aquifer(aquifer)?;
        let point = R2::new(x, y);
        let values = self.invert(t, 1, |eigen| {
            Ok(self.head_rows(&point, eigen).rows(aquifer, 1).into_owned())
        })?;
        Ok(values[0])
    }

    /// Head in `aquifer` at `(x, y)` for each time in `times`.
    pub fn head_series(
        &self,
        x: Scalar,
        y: Scalar,
        times: &[Scalar],
        aquifer: usize,
    ) -> Result<Vec<Scalar>> {
        times.iter().map(|&t| self.head_in_layer(x, y, t, aquifer)).collect()
    }

    /// Head in `aquifer` at `n` evenly spaced points from `start` to `end`.
    pub fn head_along_line(
        &self,
        start: R2,
        end: R2,
        n: usize,
        t: Scalar,
        aquifer: usize,
    ) -> Result<Vec<Scalar>> {
        linspace(0.0, 1.0, n)
            .into_iter()
            .map(|s| {
                let p = start + (end - start) * s;
                self.head_in_layer(p.x, p.y, t, aquifer)
            })
            .collect()
    }

    /// Head in `aquifer` on the grid `xs × ys`; `grid[j][i]` belongs to `(xs[i], ys[j])`.
    pub fn head_grid(
        &self,
        xs: &[Scalar],
        ys: &[Scalar],
        t: Scalar,
        aquifer: usize,
    ) -> Result<Vec<Vec<Scalar>>> {
        ys.iter()
            .map(|&y| xs.iter().map(|&x| self.head_in_layer(x, y, t, aquifer)).collect())
            .collect()
    }

    /// `(Qx, Qy)` per aquifer at `(x, y)` and time `t`.
    pub fn discharge(&self, x: Scalar, y: Scalar, t: Scalar) -> Result<(Vec<Scalar>, Vec<Scalar>)> {
        let point = R2::new(x, y);
        let naq = self.system.aquifer_count();
        let values = self.invert(t, 2 * naq, |eigen| {
            let (qx, qy) = self.discharge_rows(&point, eigen);
            let mut rows = CMatrix::zeros(2 * naq, qx.ncols());
            rows.rows_mut(0, naq).copy_from(&qx);
            rows.rows_mut(naq, naq).copy_from(&qy);
            Ok(rows)
        })?;
        Ok((values[..naq].to_vec(), values[naq..].to_vec()))
    }

    /// Vertical specific discharge (positive upward) at the `(bottom, top)` of layer `layer`.
    pub fn vertical_flux(
        &self,
        x: Scalar,
        y: Scalar,
        t: Scalar,
        layer: usize,
    ) -> Result<(Scalar, Scalar)> {
        self.check_layer(layer)?;
        let point = R2::new(x, y);
        let values = self.invert(t, 2, |eigen| Ok(self.vertical_rows(&point, eigen, layer)))?;
        Ok((values[0], values[1]))
    }

    /// Pore velocity at `position` and time `t` in the layer containing it.
    pub fn velocity(&self, position: &R3, t: Scalar) -> Result<R3> {
        let layer = self.system.layer_at(position.z).ok_or_else(|| {
            AemError::config(format!("elevation {} is outside the layer stack", position.z))
        })?;
        self.velocity_in_layer(position, layer, t)
    }

    /// Pore velocity at `position` and time `t`, evaluated in `layer`.
    ///
    /// Horizontal velocity is the aquifer discharge over `H n`; the vertical
    /// velocity interpolates linearly between the fluxes at the layer bottom
    /// and top. Leaky layers carry vertical flow only.
    pub fn velocity_in_layer(&self, position: &R3, layer: usize, t: Scalar) -> Result<R3> {
        let info = self.check_layer(layer)?;
        let point = position.xy();
        let aquifer = self.system.aquifer_of_layer(layer);
        let rows = if aquifer.is_some() { 4 } else { 2 };
        let values = self.invert(t, rows, |eigen| {
            let vertical = self.vertical_rows(&point, eigen, layer);
            let Some(aq) = aquifer else {
                return Ok(vertical);
            };
            let (qx, qy) = self.discharge_rows(&point, eigen);
            let mut out = CMatrix::zeros(4, vertical.ncols());
            out.row_mut(0).copy_from(&qx.row(aq));
            out.row_mut(1).copy_from(&qy.row(aq));
            out.rows_mut(2, 2).copy_from(&vertical);
            Ok(out)
        })?;
        let (bottom_flux, top_flux) = (values[rows - 2], values[rows - 1]);
        let thickness = info.thickness();
        let fraction = (position.z - info.bottom) / thickness;
        let vz = (bottom_flux + fraction * (top_flux - bottom_flux)) / info.porosity;
        if aquifer.is_some() {
            let scale = 1.0 / (thickness * info.porosity);
            Ok(R3::new(values[0] * scale, values[1] * scale, vz))
        } else {
            Ok(R3::new(0.0, 0.0, vz))
        }
    }

    /// Discharge extracted by `element` from each aquifer at time `t`.
    pub fn element_discharge(&self, element: ElementId, t: Scalar) -> Result<Vec<Scalar>> {
        let (index, item) = self.element(element)?;
        let naq = self.system.aquifer_count();
        let offset = self.coefficients.layout().offsets[index];
        let count = item.parameter_count();
        let mut rows = CMatrix::zeros(naq, self.coefficients.layout().parameter_count);
        for k in 0..count {
            let mut unit = CVector::zeros(count);
            unit[k] = CScalar::new(1.0, 0.0);
            rows.column_mut(offset + k).copy_from(&item.discharge(&unit, naq));
        }
        self.invert(t, naq, |_| Ok(rows.clone()))
    }

    /// Head inside every member of `element` (aquifer head at the control point
    /// minus the entry loss) at time `t`.
    pub fn head_inside(&self, element: ElementId, t: Scalar) -> Result<Vec<Scalar>> {
        let (index, item) = self.element(element)?;
        let offset = self.coefficients.layout().offsets[index];
        let members = item.members();
        self.invert(t, members.len(), |eigen| {
            let mut out = CMatrix::zeros(members.len(), self.coefficients.layout().parameter_count);
            for (k, member) in members.iter().enumerate() {
                let heads = self.head_rows(&member.control, eigen);
                out.row_mut(k).copy_from(&heads.row(member.aquifer));
                out[(k, offset + k)] -= CScalar::new(member.entry_resistance, 0.0);
            }
            Ok(out)
        })
    }

    /// Parameters (discharges, head jumps or infiltration rates) of `element` at time `t`.
    pub fn strength(&self, element: ElementId, t: Scalar) -> Result<Vec<Scalar>> {
        let (index, item) = self.element(element)?;
        let offset = self.coefficients.layout().offsets[index];
        let count = item.parameter_count();
        let mut rows = CMatrix::zeros(count, self.coefficients.layout().parameter_count);
        for k in 0..count {
            rows[(k, offset + k)] = CScalar::new(1.0, 0.0);
        }
        self.invert(t, count, |_| Ok(rows.clone()))
    }

    fn invert<F>(&self, t: Scalar, rows: usize, mut influence: F) -> Result<Vec<Scalar>>
    where
        F: FnMut(&EigenData) -> Result<CMatrix>,
    {
        self.coefficients.invert_rows(t, rows, |sample| {
            let eigen = self.system.eigen_data(sample.p)?;
            influence(eigen.as_ref())
        })
    }

    fn head_rows(&self, point: &R2, eigen: &EigenData) -> CMatrix {
        let layout = self.coefficients.layout();
        superpose_heads(&self.elements, &layout.offsets, layout.parameter_count, point, eigen)
    }

    fn discharge_rows(&self, point: &R2, eigen: &EigenData) -> (CMatrix, CMatrix) {
        let layout = self.coefficients.layout();
        superpose_discharge(&self.elements, &layout.offsets, layout.parameter_count, point, eigen)
    }

    fn recharge_row(&self, point: &R2) -> CMatrix {
        let layout = self.coefficients.layout();
        let mut row = CMatrix::zeros(1, layout.parameter_count);
        for (element, &offset) in self.elements.iter().zip(&layout.offsets) {
            let values = element.recharge_influence(point);
            for (k, v) in values.iter().enumerate() {
                row[(0, offset + k)] = *v;
            }
        }
        row
    }

    // Laplace-domain vertical flux (positive upward) at the bottom and top of
    // `layer`, per unit parameter.
    fn vertical_rows(&self, point: &R2, eigen: &EigenData, layer: usize) -> CMatrix {
        let heads = self.head_rows(point, eigen);
        let h = |aq: usize| heads.rows(aq, 1).into_owned();
        let zero = CMatrix::zeros(1, heads.ncols());
        let naq = eigen.aquifer_count();

        let (bottom, top) = if let Some(aq) = self.system.aquifer_of_layer(layer) {
            let bottom = if aq + 1 < naq {
                let (diag, off) = eigen.coupling_factors[aq];
                -(h(aq) * diag - h(aq + 1) * off)
            } else {
                zero.clone()
            };
            let top = if aq > 0 {
                let (diag, off) = eigen.coupling_factors[aq - 1];
                h(aq) * diag - h(aq - 1) * off
            } else {
                let surface = match self.system.top_boundary() {
                    TopBoundary::SemiConfined => {
                        eigen.top_factors.map_or(zero.clone(), |(diag, _)| h(0) * diag)
                    }
                    TopBoundary::Phreatic { .. } => h(0) * eigen.top_storage,
                    TopBoundary::Confined => zero.clone(),
                };
                surface - self.recharge_row(point)
            };
            (bottom, top)
        } else if let Some(i) =
            self.system.couplings().iter().position(|c| c.layer == Some(layer))
        {
            // leaky layer between aquifers i (above) and i + 1 (below)
            let (diag, off) = eigen.coupling_factors[i];
            (h(i + 1) * diag - h(i) * off, h(i + 1) * off - h(i) * diag)
        } else {
            // leaky layer above a semi-confined top
            let (diag, off) = eigen.top_factors.unwrap_or_default();
            (h(0) * diag, h(0) * off)
        };

        let mut out = CMatrix::zeros(2, heads.ncols());
        out.row_mut(0).copy_from(&bottom);
        out.row_mut(1).copy_from(&top);
        out
    }

    fn element(&self, id: ElementId) -> Result<(usize, &Arc<dyn Element>)> {
        self.elements
            .get(id.0)
            .map(|e| (id.0, e))
            .ok_or_else(|| AemError::config(format!("no element with id {}", id.0)))
    }

    fn check_aquifer(&self, aquifer: usize) -> Result<()> {
        let naq = self.system.aquifer_count();
        if aquifer < naq {
            Ok(())
        } else {
            Err(AemError::config(format!("aquifer {aquifer} does not exist ({naq} aquifers)")))
        }
    }

    fn check_layer(&self, layer: usize) -> Result<&Layer> {
        self.system
            .layer(layer)
            .ok_or_else(|| AemError::config(format!("layer {layer} does not exist")))
    }
}

impl VelocityField for SolvedModel {
    fn velocity(&self, position: &R3, layer: usize, t: Scalar) -> Result<R3> {
        self.velocity_in_layer(position, layer, t)
    }

    fn layer_count(&self) -> usize {
        self.system.layers().len()
    }

    fn layer_bounds(&self, layer: usize) -> (Scalar, Scalar) {
        self.system.layer(layer).map_or((0.0, 0.0), |l| (l.bottom, l.top))
    }

    fn layer_at(&self, z: Scalar) -> Option<usize> {
        self.system.layer_at(z)
    }

    fn captured_by(&self, from: &R3, to: &R3, layer: usize) -> Option<String> {
        let aquifer = self.system.aquifer_of_layer(layer)?;
        self.elements
            .iter()
            .find(|e| e.intercepts(from, to, aquifer))
            .map(|e| e.label().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aquifer::LayerKind;

    #[test]
    fn leaky_layers_are_never_aquifers() {
        let system = AquiferSystem::build(
            vec![
                Layer::leaky(0.0, -1.0, 100.0, 0.0),
                Layer::aquifer(-1.0, -11.0, 10.0, 1.0e-4),
            ],
            TopBoundary::SemiConfined,
        )
        .unwrap();
        assert_eq!(system.layer(0).map(|l| l.kind), Some(LayerKind::Leaky));
        assert_eq!(system.aquifer_of_layer(0), None);
        assert_eq!(system.aquifer_of_layer(1), Some(0));
    }
}
