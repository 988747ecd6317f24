//! Layer descriptions.

use crate::math::Scalar;

/// Role of a layer in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Horizontal flow layer; carries transmissivity and element strengths.
    Aquifer,
    /// Resistive layer with vertical flow only.
    Leaky,
}

/// Condition at the top of the layer stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TopBoundary {
    /// No flow through the top of the uppermost aquifer.
    Confined,
    /// The first layer is a leaky layer above which the head is fixed.
    SemiConfined,
    /// Water-table aquifer; storage of the top aquifer is the specific yield.
    Phreatic {
        /// Specific yield of the top aquifer.
        specific_yield: Scalar,
    },
}

/// One layer of the system, ordered top (index 0) to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Position in the stack; assigned when the system is built.
    pub index: usize,
    /// Aquifer or leaky layer.
    pub kind: LayerKind,
    /// Top elevation.
    pub top: Scalar,
    /// Bottom elevation.
    pub bottom: Scalar,
    /// Horizontal hydraulic conductivity (aquifers).
    pub kh: Scalar,
    /// Vertical hydraulic conductivity; couples touching aquifers.
    pub kv: Scalar,
    /// Vertical resistance `H / kv` (leaky layers).
    pub resistance: Scalar,
    /// Specific storage.
    pub specific_storage: Scalar,
    /// Effective porosity, for velocities.
    pub porosity: Scalar,
}

impl Layer {
    /// Aquifer with isotropic conductivity `kh` (use [`Layer::with_kv`] for anisotropy).
    #[must_use]
    pub fn aquifer(top: Scalar, bottom: Scalar, kh: Scalar, specific_storage: Scalar) -> Self {
        Self {
            index: 0,
            kind: LayerKind::Aquifer,
            top,
            bottom,
            kh,
            kv: kh,
            resistance: 0.0,
            specific_storage,
            porosity: 0.3,
        }
    }

    /// Leaky layer with vertical resistance `resistance`.
    #[must_use]
    pub fn leaky(
        top: Scalar,
        bottom: Scalar,
        resistance: Scalar,
        specific_storage: Scalar,
    ) -> Self {
        Self {
            index: 0,
            kind: LayerKind::Leaky,
            top,
            bottom,
            kh: 0.0,
            kv: if resistance > 0.0 { (top - bottom) / resistance } else { 0.0 },
            resistance,
            specific_storage,
            porosity: 0.3,
        }
    }

    /// Sets the vertical conductivity.
    #[must_use]
    pub fn with_kv(mut self, kv: Scalar) -> Self {
        self.kv = kv;
        self
    }

    /// Sets the effective porosity.
    #[must_use]
    pub fn with_porosity(mut self, porosity: Scalar) -> Self {
        self.porosity = porosity;
        self
    }

    /// Layer thickness.
    #[must_use]
    pub fn thickness(&self) -> Scalar {
        self.top - self.bottom
    }

    /// True for aquifers.
    #[must_use]
    pub fn is_aquifer(&self) -> bool {
        self.kind == LayerKind::Aquifer
    }

    /// True when `z` lies within the layer (inclusive).
    #[must_use]
    pub fn contains(&self, z: Scalar) -> bool {
        z <= self.top && z >= self.bottom
    }
}
