//! Analytic elements and the contract they satisfy to take part in a solve.
//!
//! Every element owns a list of [`Member`]s, one strength parameter each
//! (a discharge for sinks, a head jump for doublets, an infiltration rate for
//! area sinks). Elements either know their parameters outright (a single-layer
//! well with given discharge) or contribute one unknown per parameter together
//! with as many boundary equations.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::aquifer::{AquiferSystem, EigenData};
use crate::errors::{AemError, Result};
use crate::math::{CMatrix, CScalar, CVector, Scalar, R2, R3};

pub mod areasink;
pub mod kernels;
pub mod linedoublet;
pub mod linesink;
pub mod stress;
pub mod well;

pub use areasink::CircAreaSink;
pub use linedoublet::{LeakyLineDoublet, LeakyLineDoubletString};
pub use linesink::{EntryWidth, HeadLineSink, HeadLineSinkString, LineSink, LineSinkDitchString};
pub use stress::StressSchedule;
pub use well::{HeadWell, Well};

/// Handle of an element in a model's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub usize);

/// One strength parameter of an element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Member {
    /// Aquifer the strength acts in.
    pub aquifer: usize,
    /// Segment (or well) of the element the member belongs to.
    pub segment: usize,
    /// Point where the member's boundary condition is enforced.
    pub control: R2,
    /// Entry resistance factor: head inside equals aquifer head minus this times the strength.
    pub entry_resistance: Scalar,
}

/// How a strength enters the modal equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Discharge-type strength (sinks, infiltration).
    Flux,
    /// Head jump (doublets).
    Jump,
}

/// One row of the global system: coefficients over all element parameters and
/// the right-hand side in the element's own forcing column.
#[derive(Debug, Clone)]
pub struct EquationRow {
    /// Coefficient per global parameter.
    pub coefficients: CVector,
    /// Right-hand side for the element's unit-step forcing.
    pub rhs: CScalar,
}

/// Everything an element needs to write its boundary equations at one frequency.
pub struct EquationContext<'a> {
    /// Eigen data of the frequency being assembled.
    pub eigen: &'a EigenData,
    /// The aquifer system.
    pub system: &'a AquiferSystem,
    elements: &'a [Arc<dyn Element>],
    offsets: &'a [usize],
    parameter_count: usize,
    own_offset: usize,
}

impl<'a> EquationContext<'a> {
    /// Context for the element whose parameters start at `own_offset`.
    #[must_use]
    pub fn new(
        eigen: &'a EigenData,
        system: &'a AquiferSystem,
        elements: &'a [Arc<dyn Element>],
        offsets: &'a [usize],
        parameter_count: usize,
        own_offset: usize,
    ) -> Self {
        Self { eigen, system, elements, offsets, parameter_count, own_offset }
    }

    /// Laplace variable.
    #[must_use]
    pub fn p(&self) -> CScalar {
        self.eigen.p
    }

    /// Total number of element parameters in the model.
    #[must_use]
    pub const fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// Global index of the element's local parameter `local`.
    #[must_use]
    pub const fn own(&self, local: usize) -> usize {
        self.own_offset + local
    }

    /// Head in every aquifer at `point` per unit global parameter (`naq × P`).
    #[must_use]
    pub fn head_rows(&self, point: &R2) -> CMatrix {
        superpose_heads(self.elements, self.offsets, self.parameter_count, point, self.eigen)
    }

    /// Discharge normal to `normal` in every aquifer at `point` per unit global parameter.
    #[must_use]
    pub fn normal_discharge_rows(&self, point: &R2, normal: &R2) -> CMatrix {
        let (qx, qy) = superpose_discharge(
            self.elements,
            self.offsets,
            self.parameter_count,
            point,
            self.eigen,
        );
        qx * CScalar::new(normal.x, 0.0) + qy * CScalar::new(normal.y, 0.0)
    }
}

/// Capability shared by every analytic element.
pub trait Element: fmt::Debug + Send + Sync {
    /// Human-readable identifier used in diagnostics.
    fn label(&self) -> &str;

    /// Binds the element to an aquifer system: checks layer indices and derives
    /// thickness-dependent factors. Called once on registration.
    fn initialize(&mut self, system: &AquiferSystem) -> Result<()>;

    /// Strength parameters, in local order.
    fn members(&self) -> &[Member];

    /// Number of strength parameters.
    fn parameter_count(&self) -> usize {
        self.members().len()
    }

    /// Number of unknowns (and boundary equations) contributed to the system.
    fn unknown_count(&self) -> usize;

    /// Aquifers the element acts in, without repetition.
    fn layers(&self) -> Vec<usize> {
        let mut layers: Vec<usize> = self.members().iter().map(|m| m.aquifer).collect();
        layers.sort_unstable();
        layers.dedup();
        layers
    }

    /// Stress schedule driving the element, if it is forced.
    fn schedule(&self) -> Option<&StressSchedule>;

    /// Head in every aquifer at `point` per unit parameter (`naq × parameter_count`).
    fn potential_influence(&self, point: &R2, eigen: &EigenData) -> CMatrix;

    /// `(Qx, Qy)` in every aquifer at `point` per unit parameter.
    fn discharge_influence(&self, point: &R2, eigen: &EigenData) -> (CMatrix, CMatrix);

    /// Laplace-domain parameters for the element's unit-step forcing when it
    /// has no unknowns.
    fn given_parameters(&self, _p: CScalar) -> CVector {
        CVector::zeros(self.parameter_count())
    }

    /// Boundary equations, one per unknown.
    fn boundary_equations(&self, _ctx: &EquationContext<'_>) -> Vec<EquationRow> {
        Vec::new()
    }

    /// Discharge extracted from each aquifer for the given parameter values.
    fn discharge(&self, strengths: &CVector, aquifer_count: usize) -> CVector {
        let mut out = CVector::zeros(aquifer_count);
        for (member, strength) in self.members().iter().zip(strengths.iter()) {
            out[member.aquifer] += strength;
        }
        out
    }

    /// Infiltration per unit area entering the top aquifer at `point`, per unit parameter.
    fn recharge_influence(&self, _point: &R2) -> CVector {
        CVector::zeros(self.parameter_count())
    }

    /// True when a particle moving from `from` to `to` in `aquifer` is captured.
    fn intercepts(&self, _from: &R3, _to: &R3, _aquifer: usize) -> bool {
        false
    }
}

/// Heads in every aquifer for unit modal values `modal` of a strength in `aquifer`.
#[must_use]
pub fn modal_heads(
    eigen: &EigenData,
    kind: SourceKind,
    aquifer: usize,
    modal: &[CScalar],
) -> CVector {
    let source = match kind {
        SourceKind::Flux => eigen.coef.column(aquifer),
        SourceKind::Jump => eigen.inverse.column(aquifer),
    };
    let weighted =
        CVector::from_iterator(modal.len(), modal.iter().zip(source.iter()).map(|(m, s)| m * s));
    eigen.heads(&weighted)
}

/// `(Qx, Qy)` in every aquifer for modal gradients `(gx, gy)` of a strength in `aquifer`.
#[must_use]
pub fn modal_discharge(
    eigen: &EigenData,
    kind: SourceKind,
    aquifer: usize,
    gx: &[CScalar],
    gy: &[CScalar],
) -> (CVector, CVector) {
    let mut qx = modal_heads(eigen, kind, aquifer, gx);
    let mut qy = modal_heads(eigen, kind, aquifer, gy);
    for (i, t) in eigen.transmissivity.iter().enumerate() {
        qx[i] *= -t;
        qy[i] *= -t;
    }
    (qx, qy)
}

/// Heads in every aquifer at `point` per unit global parameter.
#[must_use]
pub fn superpose_heads(
    elements: &[Arc<dyn Element>],
    offsets: &[usize],
    parameter_count: usize,
    point: &R2,
    eigen: &EigenData,
) -> CMatrix {
    let mut rows = CMatrix::zeros(eigen.aquifer_count(), parameter_count);
    for (element, &offset) in elements.iter().zip(offsets) {
        let block = element.potential_influence(point, eigen);
        rows.columns_mut(offset, block.ncols()).copy_from(&block);
    }
    rows
}

/// `(Qx, Qy)` in every aquifer at `point` per unit global parameter.
#[must_use]
pub fn superpose_discharge(
    elements: &[Arc<dyn Element>],
    offsets: &[usize],
    parameter_count: usize,
    point: &R2,
    eigen: &EigenData,
) -> (CMatrix, CMatrix) {
    let naq = eigen.aquifer_count();
    let mut qx = CMatrix::zeros(naq, parameter_count);
    let mut qy = CMatrix::zeros(naq, parameter_count);
    for (element, &offset) in elements.iter().zip(offsets) {
        let (bx, by) = element.discharge_influence(point, eigen);
        qx.columns_mut(offset, bx.ncols()).copy_from(&bx);
        qy.columns_mut(offset, by.ncols()).copy_from(&by);
    }
    (qx, qy)
}

// Head inside each member (aquifer head at the control point minus the entry loss),
// as rows over the global parameters.
fn inside_head_rows(ctx: &EquationContext<'_>, members: &[Member]) -> Vec<CVector> {
    let mut by_segment: HashMap<usize, CMatrix> = HashMap::new();
    members
        .iter()
        .enumerate()
        .map(|(k, member)| {
            let rows =
                by_segment.entry(member.segment).or_insert_with(|| ctx.head_rows(&member.control));
            let mut row = rows.row(member.aquifer).transpose();
            row[ctx.own(k)] -= member.entry_resistance;
            row
        })
        .collect()
}

/// Equal head inside all members plus one equation fixing the total discharge.
///
/// `storage` is the storage area of the element (well casing, ditch); it
/// releases `p · storage · h_in` from the first member.
#[must_use]
pub fn shared_discharge_equations(
    ctx: &EquationContext<'_>,
    members: &[Member],
    storage: Scalar,
) -> Vec<EquationRow> {
    let inside = inside_head_rows(ctx, members);
    let zero = CScalar::new(0.0, 0.0);
    let mut rows: Vec<EquationRow> = inside
        .windows(2)
        .map(|pair| EquationRow { coefficients: &pair[0] - &pair[1], rhs: zero })
        .collect();
    let mut total = CVector::zeros(ctx.parameter_count());
    for k in 0..members.len() {
        total[ctx.own(k)] += CScalar::new(1.0, 0.0);
    }
    if storage > 0.0 {
        if let Some(first) = inside.first() {
            total -= first * (ctx.p() * storage);
        }
    }
    rows.push(EquationRow { coefficients: total, rhs: ctx.p().inv() });
    rows
}

/// The same specified head inside every member.
#[must_use]
pub fn shared_head_equations(ctx: &EquationContext<'_>, members: &[Member]) -> Vec<EquationRow> {
    let rhs = ctx.p().inv();
    inside_head_rows(ctx, members)
        .into_iter()
        .map(|coefficients| EquationRow { coefficients, rhs })
        .collect()
}

/// Checks that every aquifer index in `layers` exists and that the list is non-empty
/// and free of repeats.
pub fn check_layers(label: &str, layers: &[usize], system: &AquiferSystem) -> Result<()> {
    if layers.is_empty() {
        return Err(AemError::config(format!("element '{label}' has no layers")));
    }
    let naq = system.aquifer_count();
    if let Some(bad) = layers.iter().find(|&&aq| aq >= naq) {
        return Err(AemError::config(format!(
            "element '{label}' refers to aquifer {bad}, but the system has {naq}"
        )));
    }
    let mut sorted = layers.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != layers.len() {
        return Err(AemError::config(format!("element '{label}' lists an aquifer twice")));
    }
    Ok(())
}
