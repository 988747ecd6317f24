//! Convenience re-exports for building groundwater models.

pub use crate::aquifer::{
    AquiferSystem, Coupling, EigenData, Layer, LayerKind, MaqParameters, ThreeDParameters,
    TopBoundary,
};
pub use crate::constants::*;
pub use crate::elements::{
    CircAreaSink, Element, ElementId, EntryWidth, HeadLineSink, HeadLineSinkString, HeadWell,
    LeakyLineDoublet, LeakyLineDoubletString, LineSink, LineSinkDitchString, StressSchedule, Well,
};
pub use crate::errors::{AemError, Result};
pub use crate::math::{CScalar, Scalar, R2, R3};
pub use crate::model::{Model, SolveConfig};
pub use crate::report::{write_head_series_csv, write_layered_heads_csv, write_trajectory_csv};
pub use crate::solution::SolvedModel;
pub use crate::solver::{CancelToken, SolveReport};
pub use crate::sweep::{linspace, logspace, FrequencyGrid};
pub use crate::trace::{
    PathlineTracer, StopReason, TraceConfig, TracePoint, TraceState, Trajectory, VelocityField,
};
