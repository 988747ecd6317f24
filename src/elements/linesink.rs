//! Line-sinks: single segments and strings with given discharge or given head.

use super::kernels::{line_kernel, SegmentFrame};
use super::{
    check_layers, modal_discharge, modal_heads, shared_discharge_equations, shared_head_equations,
    Element, EquationContext, EquationRow, Member, SourceKind, StressSchedule,
};
use crate::aquifer::{AquiferSystem, EigenData};
use crate::errors::{AemError, Result};
use crate::math::{segments_intersect, CMatrix, CScalar, CVector, Scalar, R2, R3};

/// Width over which the entry resistance of a line-sink acts.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EntryWidth {
    /// The aquifer thickness (flow enters through one side).
    #[default]
    Thickness,
    /// Twice the aquifer thickness (flow enters from both sides).
    DoubleThickness,
    /// A fixed wetted perimeter.
    Width(Scalar),
}

impl EntryWidth {
    fn value(self, thickness: Scalar) -> Scalar {
        match self {
            Self::Thickness => thickness,
            Self::DoubleThickness => 2.0 * thickness,
            Self::Width(w) => w,
        }
    }
}

/// Polyline of line-sink segments acting in a set of aquifers.
#[derive(Debug, Clone)]
struct SinkString {
    segments: Vec<SegmentFrame>,
    aquifers: Vec<usize>,
    resistance: Scalar,
    width: EntryWidth,
    members: Vec<Member>,
}

impl SinkString {
    fn new(label: &str, vertices: &[R2], aquifers: Vec<usize>) -> Result<Self> {
        Ok(Self {
            segments: polyline(label, vertices)?,
            aquifers,
            resistance: 0.0,
            width: EntryWidth::default(),
            members: Vec::new(),
        })
    }

    fn initialize(&mut self, label: &str, system: &AquiferSystem) -> Result<()> {
        check_layers(label, &self.aquifers, system)?;
        if self.resistance < 0.0 || self.resistance.is_nan() {
            return Err(AemError::config(format!("line-sink '{label}' has a negative resistance")));
        }
        if let EntryWidth::Width(w) = self.width {
            if w <= 0.0 || w.is_nan() {
                return Err(AemError::config(format!("line-sink '{label}' needs a positive width")));
            }
        }
        let mut members = Vec::with_capacity(self.segments.len() * self.aquifers.len());
        for (segment, frame) in self.segments.iter().enumerate() {
            for &aquifer in &self.aquifers {
                let width = self.width.value(system.thickness(aquifer));
                members.push(Member {
                    aquifer,
                    segment,
                    control: frame.center(),
                    entry_resistance: self.resistance / (width * frame.length),
                });
            }
        }
        self.members = members;
        Ok(())
    }

    fn potential(&self, point: &R2, eigen: &EigenData) -> CMatrix {
        let mut out = CMatrix::zeros(eigen.aquifer_count(), self.members.len());
        let naq_members = self.aquifers.len();
        for (s, frame) in self.segments.iter().enumerate() {
            let (x, y) = frame.local(point);
            let modal: Vec<CScalar> =
                eigen.mu.iter().map(|&mu| line_kernel(x, y, frame.length, mu).sink).collect();
            for (j, &aquifer) in self.aquifers.iter().enumerate() {
                out.set_column(
                    s * naq_members + j,
                    &modal_heads(eigen, SourceKind::Flux, aquifer, &modal),
                );
            }
        }
        out
    }

    fn discharge(&self, point: &R2, eigen: &EigenData) -> (CMatrix, CMatrix) {
        let naq = eigen.aquifer_count();
        let mut qx = CMatrix::zeros(naq, self.members.len());
        let mut qy = CMatrix::zeros(naq, self.members.len());
        let naq_members = self.aquifers.len();
        for (s, frame) in self.segments.iter().enumerate() {
            let (x, y) = frame.local(point);
            let (gx, gy): (Vec<CScalar>, Vec<CScalar>) = eigen
                .mu
                .iter()
                .map(|&mu| {
                    let (gl_x, gl_y) = line_kernel(x, y, frame.length, mu).sink_gradient;
                    frame.to_global(gl_x, gl_y)
                })
                .unzip();
            for (j, &aquifer) in self.aquifers.iter().enumerate() {
                let (cx, cy) = modal_discharge(eigen, SourceKind::Flux, aquifer, &gx, &gy);
                qx.set_column(s * naq_members + j, &cx);
                qy.set_column(s * naq_members + j, &cy);
            }
        }
        (qx, qy)
    }

    fn intercepts(&self, from: &R3, to: &R3, aquifer: usize) -> bool {
        let (a, b) = (from.xy(), to.xy());
        self.aquifers.contains(&aquifer)
            && self.segments.iter().any(|f| segments_intersect(&a, &b, &f.start, &f.end))
    }
}

/// Builds segment frames for a polyline, rejecting degenerate geometry.
pub(crate) fn polyline(label: &str, vertices: &[R2]) -> Result<Vec<SegmentFrame>> {
    if vertices.len() < 2 {
        return Err(AemError::config(format!("element '{label}' needs at least two vertices")));
    }
    if vertices.iter().any(|v| !(v.x.is_finite() && v.y.is_finite())) {
        return Err(AemError::config(format!("element '{label}' has a non-finite vertex")));
    }
    vertices
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            if (pair[1] - pair[0]).norm() <= 0.0 {
                Err(AemError::config(format!("element '{label}' segment {i} has zero length")))
            } else {
                Ok(SegmentFrame::new(pair[0], pair[1]))
            }
        })
        .collect()
}

/// Line-sink segment with a specified total discharge schedule.
#[derive(Debug, Clone)]
pub struct LineSink {
    label: String,
    sinks: SinkString,
    schedule: StressSchedule,
}

impl LineSink {
    /// Line-sink from `start` to `end` in `aquifers`.
    pub fn new(
        label: impl Into<String>,
        start: R2,
        end: R2,
        aquifers: Vec<usize>,
        schedule: StressSchedule,
    ) -> Result<Self> {
        let label = label.into();
        let sinks = SinkString::new(&label, &[start, end], aquifers)?;
        Ok(Self { label, sinks, schedule })
    }

    /// Sets the entry resistance and the width it acts over.
    #[must_use]
    pub fn with_resistance(mut self, resistance: Scalar, width: EntryWidth) -> Self {
        self.sinks.resistance = resistance;
        self.sinks.width = width;
        self
    }

    fn has_unknowns(&self) -> bool {
        self.sinks.members.len() > 1
    }
}

impl Element for LineSink {
    fn label(&self) -> &str {
        &self.label
    }

    fn initialize(&mut self, system: &AquiferSystem) -> Result<()> {
        self.sinks.initialize(&self.label, system)
    }

    fn members(&self) -> &[Member] {
        &self.sinks.members
    }

    fn unknown_count(&self) -> usize {
        if self.has_unknowns() {
            self.sinks.members.len()
        } else {
            0
        }
    }

    fn schedule(&self) -> Option<&StressSchedule> {
        Some(&self.schedule)
    }

    fn potential_influence(&self, point: &R2, eigen: &EigenData) -> CMatrix {
        self.sinks.potential(point, eigen)
    }

    fn discharge_influence(&self, point: &R2, eigen: &EigenData) -> (CMatrix, CMatrix) {
        self.sinks.discharge(point, eigen)
    }

    fn given_parameters(&self, p: CScalar) -> CVector {
        if self.has_unknowns() {
            CVector::zeros(self.sinks.members.len())
        } else {
            CVector::from_element(1, p.inv())
        }
    }

    fn boundary_equations(&self, ctx: &EquationContext<'_>) -> Vec<EquationRow> {
        if self.has_unknowns() {
            shared_discharge_equations(ctx, &self.sinks.members, 0.0)
        } else {
            Vec::new()
        }
    }

    fn intercepts(&self, from: &R3, to: &R3, aquifer: usize) -> bool {
        self.sinks.intercepts(from, to, aquifer)
    }
}

/// String of line-sinks with the same specified head inside every segment.
#[derive(Debug, Clone)]
pub struct HeadLineSinkString {
    label: String,
    sinks: SinkString,
    schedule: StressSchedule,
}

/// A head-specified line-sink is a string of one segment.
pub type HeadLineSink = HeadLineSinkString;

impl HeadLineSinkString {
    /// Head-specified string through `vertices` in `aquifers`.
    pub fn new(
        label: impl Into<String>,
        vertices: &[R2],
        aquifers: Vec<usize>,
        schedule: StressSchedule,
    ) -> Result<Self> {
        let label = label.into();
        let sinks = SinkString::new(&label, vertices, aquifers)?;
        Ok(Self { label, sinks, schedule })
    }

    /// Head-specified single segment from `start` to `end`.
    pub fn segment(
        label: impl Into<String>,
        start: R2,
        end: R2,
        aquifers: Vec<usize>,
        schedule: StressSchedule,
    ) -> Result<Self> {
        Self::new(label, &[start, end], aquifers, schedule)
    }

    /// Sets the entry resistance and the width it acts over.
    #[must_use]
    pub fn with_resistance(mut self, resistance: Scalar, width: EntryWidth) -> Self {
        self.sinks.resistance = resistance;
        self.sinks.width = width;
        self
    }
}

impl Element for HeadLineSinkString {
    fn label(&self) -> &str {
        &self.label
    }

    fn initialize(&mut self, system: &AquiferSystem) -> Result<()> {
        self.sinks.initialize(&self.label, system)
    }

    fn members(&self) -> &[Member] {
        &self.sinks.members
    }

    fn unknown_count(&self) -> usize {
        self.sinks.members.len()
    }

    fn schedule(&self) -> Option<&StressSchedule> {
        Some(&self.schedule)
    }

    fn potential_influence(&self, point: &R2, eigen: &EigenData) -> CMatrix {
        self.sinks.potential(point, eigen)
    }

    fn discharge_influence(&self, point: &R2, eigen: &EigenData) -> (CMatrix, CMatrix) {
        self.sinks.discharge(point, eigen)
    }

    fn boundary_equations(&self, ctx: &EquationContext<'_>) -> Vec<EquationRow> {
        shared_head_equations(ctx, &self.sinks.members)
    }

    fn intercepts(&self, from: &R3, to: &R3, aquifer: usize) -> bool {
        self.sinks.intercepts(from, to, aquifer)
    }
}

/// String of line-sinks sharing one total discharge and one inside head, such
/// as a ditch; an optional storage area releases water as the ditch level drops.
#[derive(Debug, Clone)]
pub struct LineSinkDitchString {
    label: String,
    sinks: SinkString,
    storage_area: Scalar,
    schedule: StressSchedule,
}

impl LineSinkDitchString {
    /// Ditch through `vertices` in `aquifers` with total discharge `schedule`.
    pub fn new(
        label: impl Into<String>,
        vertices: &[R2],
        aquifers: Vec<usize>,
        schedule: StressSchedule,
    ) -> Result<Self> {
        let label = label.into();
        let sinks = SinkString::new(&label, vertices, aquifers)?;
        Ok(Self { label, sinks, storage_area: 0.0, schedule })
    }

    /// Sets the entry resistance and the width it acts over.
    #[must_use]
    pub fn with_resistance(mut self, resistance: Scalar, width: EntryWidth) -> Self {
        self.sinks.resistance = resistance;
        self.sinks.width = width;
        self
    }

    /// Sets the storage area of the ditch.
    #[must_use]
    pub fn with_storage_area(mut self, area: Scalar) -> Self {
        self.storage_area = area;
        self
    }
}

impl Element for LineSinkDitchString {
    fn label(&self) -> &str {
        &self.label
    }

    fn initialize(&mut self, system: &AquiferSystem) -> Result<()> {
        if self.storage_area < 0.0 || self.storage_area.is_nan() {
            return Err(AemError::config(format!(
                "ditch '{}' has a negative storage area",
                self.label
            )));
        }
        self.sinks.initialize(&self.label, system)
    }

    fn members(&self) -> &[Member] {
        &self.sinks.members
    }

    fn unknown_count(&self) -> usize {
        self.sinks.members.len()
    }

    fn schedule(&self) -> Option<&StressSchedule> {
        Some(&self.schedule)
    }

    fn potential_influence(&self, point: &R2, eigen: &EigenData) -> CMatrix {
        self.sinks.potential(point, eigen)
    }

    fn discharge_influence(&self, point: &R2, eigen: &EigenData) -> (CMatrix, CMatrix) {
        self.sinks.discharge(point, eigen)
    }

    fn boundary_equations(&self, ctx: &EquationContext<'_>) -> Vec<EquationRow> {
        shared_discharge_equations(ctx, &self.sinks.members, self.storage_area)
    }

    fn intercepts(&self, from: &R3, to: &R3, aquifer: usize) -> bool {
        self.sinks.intercepts(from, to, aquifer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aquifer::{Layer, TopBoundary};

    #[test]
    fn degenerate_polylines_fail() {
        let h = StressSchedule::constant(1.0);
        let p = R2::new(1.0, 1.0);
        assert!(LineSink::new("ls", p, p, vec![0], h.clone()).is_err());
        assert!(HeadLineSinkString::new("hls", &[p], vec![0], h.clone()).is_err());
        let repeated = [p, R2::new(2.0, 1.0), R2::new(2.0, 1.0)];
        assert!(LineSinkDitchString::new("d", &repeated, vec![0], h).is_err());
    }

    #[test]
    fn members_enumerate_segments_then_aquifers() {
        let system = AquiferSystem::build(
            vec![
                Layer::aquifer(0.0, -10.0, 10.0, 1.0e-4),
                Layer::leaky(-10.0, -11.0, 50.0, 0.0),
                Layer::aquifer(-11.0, -21.0, 5.0, 1.0e-4),
            ],
            TopBoundary::Confined,
        )
        .unwrap();
        let vertices = [R2::new(0.0, 0.0), R2::new(10.0, 0.0), R2::new(10.0, 20.0)];
        let mut ditch =
            LineSinkDitchString::new("d", &vertices, vec![0, 1], StressSchedule::constant(50.0))
                .unwrap()
                .with_resistance(2.0, EntryWidth::Width(4.0));
        ditch.initialize(&system).unwrap();
        let members = ditch.members();
        assert_eq!(members.len(), 4);
        assert_eq!((members[1].segment, members[1].aquifer), (0, 1));
        assert_eq!((members[2].segment, members[2].aquifer), (1, 0));
        assert_eq!(members[2].control, R2::new(10.0, 10.0));
        assert!((members[2].entry_resistance - 2.0 / (4.0 * 20.0)).abs() < 1.0e-15);
        assert_eq!(ditch.unknown_count(), 4);
    }

    #[test]
    fn crossing_path_is_captured() {
        let system = AquiferSystem::build(
            vec![Layer::aquifer(0.0, -10.0, 10.0, 1.0e-4)],
            TopBoundary::Confined,
        )
        .unwrap();
        let mut ls = LineSink::new(
            "ls",
            R2::new(0.0, -5.0),
            R2::new(0.0, 5.0),
            vec![0],
            StressSchedule::constant(10.0),
        )
        .unwrap();
        ls.initialize(&system).unwrap();
        assert!(ls.intercepts(&R3::new(-1.0, 0.0, -5.0), &R3::new(1.0, 0.0, -5.0), 0));
        assert!(!ls.intercepts(&R3::new(1.0, 0.0, -5.0), &R3::new(2.0, 0.0, -5.0), 0));
    }
}
