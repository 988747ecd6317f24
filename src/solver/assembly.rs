//! Fills the dense system for one frequency sample from element boundary equations.

use std::sync::Arc;

use super::Layout;
use crate::aquifer::{AquiferSystem, EigenData};
use crate::elements::{Element, EquationContext};
use crate::errors::{AemError, Result};
use crate::math::CMatrix;

/// Dense system `A X = B` over the unknowns of one frequency sample, with the
/// known parameters of fully specified elements already moved to `B`.
#[derive(Debug, Clone)]
pub struct AssembledSystem {
    /// `A`, unknowns × unknowns.
    pub matrix: CMatrix,
    /// `B`, unknowns × forcing columns.
    pub rhs: CMatrix,
    given: CMatrix,
    unknown_parameters: Vec<usize>,
}

impl AssembledSystem {
    /// Full parameter matrix (`parameter_count × column_count`) for solved unknowns.
    #[must_use]
    pub fn parameters(&self, unknowns: &CMatrix) -> CMatrix {
        let mut out = self.given.clone();
        for (u, &parameter) in self.unknown_parameters.iter().enumerate() {
            out.row_mut(parameter).copy_from(&unknowns.row(u));
        }
        out
    }

    /// Number of unknowns.
    #[must_use]
    pub fn unknown_count(&self) -> usize {
        self.unknown_parameters.len()
    }
}

/// Builds [`AssembledSystem`]s for a fixed element registry.
#[derive(Debug, Clone, Copy)]
pub struct SystemAssembler<'a> {
    system: &'a AquiferSystem,
    elements: &'a [Arc<dyn Element>],
    layout: &'a Layout,
}

impl<'a> SystemAssembler<'a> {
    /// Assembler over `elements` laid out by `layout`.
    #[must_use]
    pub const fn new(
        system: &'a AquiferSystem,
        elements: &'a [Arc<dyn Element>],
        layout: &'a Layout,
    ) -> Self {
        Self { system, elements, layout }
    }

    /// Assembles the system at the frequency of `eigen`.
    pub fn assemble(&self, eigen: &EigenData) -> Result<AssembledSystem> {
        let layout = self.layout;
        let n = layout.unknown_count;
        let m = layout.column_count;

        let mut given = CMatrix::zeros(layout.parameter_count, m);
        let mut unknown_parameters = Vec::with_capacity(n);
        for (index, element) in self.elements.iter().enumerate() {
            let unknowns = element.unknown_count();
            let parameters = element.parameter_count();
            let offset = layout.offsets[index];
            if unknowns == 0 {
                if let Some(column) = layout.columns[index] {
                    let values = element.given_parameters(eigen.p);
                    given.view_mut((offset, column), (parameters, 1)).copy_from(&values);
                }
            } else if unknowns == parameters {
                unknown_parameters.extend(offset..offset + parameters);
            } else {
                return Err(AemError::config(format!(
                    "element '{}' has {unknowns} unknowns but {parameters} parameters",
                    element.label()
                )));
            }
        }

        let mut matrix = CMatrix::zeros(n, n);
        let mut rhs = CMatrix::zeros(n, m);
        for (index, element) in self.elements.iter().enumerate() {
            let unknowns = element.unknown_count();
            if unknowns == 0 {
                continue;
            }
            let ctx = EquationContext::new(
                eigen,
                self.system,
                self.elements,
                &layout.offsets,
                layout.parameter_count,
                layout.offsets[index],
            );
            let rows = element.boundary_equations(&ctx);
            if rows.len() != unknowns {
                return Err(AemError::config(format!(
                    "element '{}' contributes {} equations for {unknowns} unknowns",
                    element.label(),
                    rows.len()
                )));
            }
            let first = layout.unknown_offsets[index];
            for (i, row) in rows.iter().enumerate() {
                let r = first + i;
                for (u, &parameter) in unknown_parameters.iter().enumerate() {
                    matrix[(r, u)] = row.coefficients[parameter];
                }
                let known = row.coefficients.transpose() * &given;
                for c in 0..m {
                    rhs[(r, c)] = -known[(0, c)];
                }
                if let Some(column) = layout.columns[index] {
                    rhs[(r, column)] += row.rhs;
                }
            }
        }

        Ok(AssembledSystem { matrix, rhs, given, unknown_parameters })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::aquifer::{Layer, TopBoundary};
    use crate::elements::{HeadWell, StressSchedule, Well};
    use crate::math::{CScalar, R2};

    #[test]
    fn given_wells_move_to_the_right_hand_side() {
        let system = AquiferSystem::build(
            vec![Layer::aquifer(0.0, -10.0, 10.0, 1.0e-4)],
            TopBoundary::Confined,
        )
        .unwrap();
        let mut well =
            Well::new("w", 0.0, 0.0, 0.1, vec![0], StressSchedule::constant(100.0)).unwrap();
        let mut head =
            HeadWell::new("h", 50.0, 0.0, 0.2, vec![0], StressSchedule::constant(2.0)).unwrap();
        well.initialize(&system).unwrap();
        head.initialize(&system).unwrap();
        let elements: Vec<Arc<dyn Element>> = vec![Arc::new(well), Arc::new(head)];
        let layout = Layout::new(&elements);

        let p = CScalar::new(0.3, 0.1);
        let eigen = system.eigen_data(p).unwrap();
        let assembled = SystemAssembler::new(&system, &elements, &layout).assemble(&eigen).unwrap();
        assert_eq!(assembled.matrix.shape(), (1, 1));
        assert_eq!(assembled.rhs.shape(), (1, 2));

        // Column 1 (the head well's own forcing) carries 1/p; column 0 carries
        // minus the well's head at the control point.
        assert_relative_eq!(assembled.rhs[(0, 1)].re, p.inv().re, max_relative = 1.0e-14);
        let control = R2::new(50.2, 0.0);
        let influence = elements[0].potential_influence(&control, &eigen)[(0, 0)];
        let expected = -influence * p.inv();
        assert_relative_eq!(assembled.rhs[(0, 0)].re, expected.re, max_relative = 1.0e-12);
        assert_relative_eq!(assembled.rhs[(0, 0)].im, expected.im, max_relative = 1.0e-12);

        let params = assembled.parameters(&CMatrix::from_element(1, 2, CScalar::new(3.0, 0.0)));
        assert_eq!(params[(0, 0)], p.inv());
        assert_eq!(params[(0, 1)], CScalar::new(0.0, 0.0));
        assert_eq!(params[(1, 0)], CScalar::new(3.0, 0.0));
    }
}
