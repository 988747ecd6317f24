//! Layered aquifer systems and their Laplace-domain eigen data.

pub mod eigen;
pub mod layer;
pub mod system;

pub use eigen::EigenData;
pub use layer::{Layer, LayerKind, TopBoundary};
pub use system::{AquiferSystem, Coupling, MaqParameters, ThreeDParameters};
