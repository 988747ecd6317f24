//! Layer stack, derived aquifer properties and the eigen memo table.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;

use super::eigen::{decompose, EigenData};
use super::layer::{Layer, LayerKind, TopBoundary};
use crate::constants::ELEVATION_TOLERANCE;
use crate::errors::{AemError, Result};
use crate::math::{real, CMatrix, CScalar, Scalar};
use crate::special::{b_coth_b, b_csch_b};

/// Vertical coupling between two neighbouring aquifers (or the top aquifer and
/// a fixed head above a semi-confined top).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coupling {
    /// Vertical resistance.
    pub resistance: Scalar,
    /// Storativity of the coupling layer (zero when aquifers touch).
    pub storativity: Scalar,
    /// Leaky layer carrying the coupling, if any.
    pub layer: Option<usize>,
}

impl Coupling {
    /// `(b coth b / c, b csch b / c)` with `b = √(p c S)`.
    #[must_use]
    pub fn factors(&self, p: CScalar) -> (CScalar, CScalar) {
        let b = (p * self.resistance * self.storativity).sqrt();
        (b_coth_b(b) / self.resistance, b_csch_b(b) / self.resistance)
    }
}

/// Parameters of a stack of aquifers separated by leaky layers.
#[derive(Debug, Clone)]
pub struct MaqParameters {
    /// Horizontal conductivity per aquifer.
    pub kaq: Vec<Scalar>,
    /// Layer interfaces top to bottom, starting with the top of the first layer.
    pub z: Vec<Scalar>,
    /// Resistance per leaky layer (including the top leaky layer when semi-confined).
    pub c: Vec<Scalar>,
    /// Specific storage per aquifer.
    pub saq: Vec<Scalar>,
    /// Specific storage per leaky layer; empty means zero.
    pub sll: Vec<Scalar>,
    /// Porosity of aquifers.
    pub aquifer_porosity: Scalar,
    /// Porosity of leaky layers.
    pub leaky_porosity: Scalar,
    /// Condition at the top.
    pub top: TopBoundary,
}

impl MaqParameters {
    /// Confined stack with zero leaky-layer storage.
    #[must_use]
    pub fn new(kaq: Vec<Scalar>, z: Vec<Scalar>, c: Vec<Scalar>, saq: Vec<Scalar>) -> Self {
        Self {
            kaq,
            z,
            c,
            saq,
            sll: Vec::new(),
            aquifer_porosity: 0.3,
            leaky_porosity: 0.3,
            top: TopBoundary::Confined,
        }
    }

    /// Sets the specific storage of the leaky layers.
    #[must_use]
    pub fn with_leaky_storage(mut self, sll: Vec<Scalar>) -> Self {
        self.sll = sll;
        self
    }

    /// Sets the top boundary.
    #[must_use]
    pub fn with_top(mut self, top: TopBoundary) -> Self {
        self.top = top;
        self
    }

    /// Sets aquifer and leaky-layer porosity.
    #[must_use]
    pub fn with_porosity(mut self, aquifer: Scalar, leaky: Scalar) -> Self {
        self.aquifer_porosity = aquifer;
        self.leaky_porosity = leaky;
        self
    }
}

/// Parameters of a stack of touching, possibly anisotropic, aquifers.
#[derive(Debug, Clone)]
pub struct ThreeDParameters {
    /// Horizontal conductivity per layer.
    pub kaq: Vec<Scalar>,
    /// Layer interfaces top to bottom (`kaq.len() + 1` values).
    pub z: Vec<Scalar>,
    /// Vertical anisotropy `kv / kh` per layer.
    pub kz_over_kh: Vec<Scalar>,
    /// Specific storage per layer.
    pub saq: Vec<Scalar>,
    /// Porosity of all layers.
    pub porosity: Scalar,
    /// Condition at the top.
    pub top: TopBoundary,
    /// Resistance and thickness of the leaky layer placed on top when semi-confined.
    pub top_layer: (Scalar, Scalar),
}

impl ThreeDParameters {
    /// Confined isotropic stack.
    #[must_use]
    pub fn new(kaq: Vec<Scalar>, z: Vec<Scalar>, saq: Vec<Scalar>) -> Self {
        let n = kaq.len();
        Self {
            kaq,
            z,
            kz_over_kh: vec![1.0; n],
            saq,
            porosity: 0.3,
            top: TopBoundary::Confined,
            top_layer: (0.0, 0.0),
        }
    }

    /// Sets the vertical anisotropy per layer.
    #[must_use]
    pub fn with_anisotropy(mut self, kz_over_kh: Vec<Scalar>) -> Self {
        self.kz_over_kh = kz_over_kh;
        self
    }

    /// Sets the top boundary; `top_layer` is `(resistance, thickness)` for a semi-confined top.
    #[must_use]
    pub fn with_top(mut self, top: TopBoundary, top_layer: (Scalar, Scalar)) -> Self {
        self.top = top;
        self.top_layer = top_layer;
        self
    }
}

type FrequencyKey = (u64, u64);

fn key(p: CScalar) -> FrequencyKey {
    (p.re.to_bits(), p.im.to_bits())
}

/// Immutable layer stack with a memo table of eigen data per Laplace variable.
#[derive(Debug)]
pub struct AquiferSystem {
    layers: Vec<Layer>,
    top: TopBoundary,
    aquifers: Vec<usize>,
    transmissivity: Vec<Scalar>,
    storativity: Vec<Scalar>,
    couplings: Vec<Coupling>,
    top_coupling: Option<Coupling>,
    cache: RwLock<HashMap<FrequencyKey, Arc<EigenData>>>,
}

impl AquiferSystem {
    /// Validates the stack and derives aquifer properties.
    pub fn build(mut layers: Vec<Layer>, top: TopBoundary) -> Result<Self> {
        if layers.is_empty() {
            return Err(AemError::config("layer stack is empty"));
        }
        for (index, layer) in layers.iter_mut().enumerate() {
            layer.index = index;
        }
        validate(&layers, top)?;

        let aquifers: Vec<usize> =
            layers.iter().filter(|l| l.is_aquifer()).map(|l| l.index).collect();
        let transmissivity =
            aquifers.iter().map(|&i| layers[i].kh * layers[i].thickness()).collect();
        let storativity = aquifers
            .iter()
            .enumerate()
            .map(|(aq, &i)| match top {
                TopBoundary::Phreatic { specific_yield } if aq == 0 => specific_yield,
                _ => layers[i].specific_storage * layers[i].thickness(),
            })
            .collect();

        let couplings = aquifers
            .windows(2)
            .map(|pair| {
                let (upper, lower) = (&layers[pair[0]], &layers[pair[1]]);
                if pair[1] == pair[0] + 1 {
                    Coupling {
                        resistance: upper.thickness() / (2.0 * upper.kv)
                            + lower.thickness() / (2.0 * lower.kv),
                        storativity: 0.0,
                        layer: None,
                    }
                } else {
                    let leaky = &layers[pair[0] + 1];
                    Coupling {
                        resistance: leaky.resistance,
                        storativity: leaky.specific_storage * leaky.thickness(),
                        layer: Some(leaky.index),
                    }
                }
            })
            .collect();

        let top_coupling = match top {
            TopBoundary::SemiConfined => Some(Coupling {
                resistance: layers[0].resistance,
                storativity: layers[0].specific_storage * layers[0].thickness(),
                layer: Some(0),
            }),
            _ => None,
        };

        Ok(Self {
            layers,
            top,
            aquifers,
            transmissivity,
            storativity,
            couplings,
            top_coupling,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Aquifers separated by leaky layers.
    pub fn maq(params: MaqParameters) -> Result<Self> {
        let naq = params.kaq.len();
        let semi = matches!(params.top, TopBoundary::SemiConfined);
        let nll = if semi { naq } else { naq.saturating_sub(1) };
        let expected_z = naq + nll + 1;
        if naq == 0 || params.z.len() != expected_z {
            return Err(AemError::config(format!(
                "maq stack with {naq} aquifers needs {expected_z} elevations, got {}",
                params.z.len()
            )));
        }
        if params.c.len() != nll || params.saq.len() != naq {
            return Err(AemError::config(format!(
                "maq stack needs {nll} resistances and {naq} storage values"
            )));
        }
        if !params.sll.is_empty() && params.sll.len() != nll {
            return Err(AemError::config(format!("maq stack needs {nll} leaky storage values")));
        }
        let sll = |i: usize| params.sll.get(i).copied().unwrap_or(0.0);

        let mut layers = Vec::with_capacity(naq + nll);
        let mut z = params.z.iter().copied();
        let mut upper = z.next().unwrap_or_default();
        let mut leaky_index = 0;
        if semi {
            let bottom = z.next().unwrap_or_default();
            let top_layer = Layer::leaky(upper, bottom, params.c[0], sll(0));
            layers.push(top_layer.with_porosity(params.leaky_porosity));
            upper = bottom;
            leaky_index = 1;
        }
        for aq in 0..naq {
            let bottom = z.next().unwrap_or_default();
            layers.push(
                Layer::aquifer(upper, bottom, params.kaq[aq], params.saq[aq])
                    .with_porosity(params.aquifer_porosity),
            );
            upper = bottom;
            if aq + 1 < naq {
                let bottom = z.next().unwrap_or_default();
                layers.push(
                    Layer::leaky(upper, bottom, params.c[leaky_index], sll(leaky_index))
                        .with_porosity(params.leaky_porosity),
                );
                upper = bottom;
                leaky_index += 1;
            }
        }
        Self::build(layers, params.top)
    }

    /// Touching aquifers with vertical anisotropy.
    pub fn three_d(params: ThreeDParameters) -> Result<Self> {
        let n = params.kaq.len();
        if n == 0
            || params.z.len() != n + 1
            || params.saq.len() != n
            || params.kz_over_kh.len() != n
        {
            return Err(AemError::config(format!(
                "3-D stack with {n} layers needs {} elevations and {n} storage \
                 and anisotropy values",
                n + 1
            )));
        }
        let mut layers = Vec::with_capacity(n + 1);
        if matches!(params.top, TopBoundary::SemiConfined) {
            let (resistance, thickness) = params.top_layer;
            if thickness <= 0.0 {
                return Err(AemError::config("semi-confined top layer needs a positive thickness"));
            }
            layers.push(
                Layer::leaky(params.z[0] + thickness, params.z[0], resistance, 0.0)
                    .with_porosity(params.porosity),
            );
        }
        for i in 0..n {
            layers.push(
                Layer::aquifer(params.z[i], params.z[i + 1], params.kaq[i], params.saq[i])
                    .with_kv(params.kaq[i] * params.kz_over_kh[i])
                    .with_porosity(params.porosity),
            );
        }
        Self::build(layers, params.top)
    }

    /// All layers, top first.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Layer by stack index.
    #[must_use]
    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    /// Condition at the top of the stack.
    #[must_use]
    pub const fn top_boundary(&self) -> TopBoundary {
        self.top
    }

    /// Number of aquifers.
    #[must_use]
    pub fn aquifer_count(&self) -> usize {
        self.aquifers.len()
    }

    /// Layer describing aquifer `aq`.
    #[must_use]
    pub fn aquifer(&self, aq: usize) -> &Layer {
        &self.layers[self.aquifers[aq]]
    }

    /// Aquifer number of the layer at stack index `layer`, if it is an aquifer.
    #[must_use]
    pub fn aquifer_of_layer(&self, layer: usize) -> Option<usize> {
        self.aquifers.iter().position(|&i| i == layer)
    }

    /// Transmissivity of aquifer `aq`.
    #[must_use]
    pub fn transmissivity(&self, aq: usize) -> Scalar {
        self.transmissivity[aq]
    }

    /// Storativity of aquifer `aq` (specific yield for a phreatic top aquifer).
    #[must_use]
    pub fn storativity(&self, aq: usize) -> Scalar {
        self.storativity[aq]
    }

    /// Thickness of aquifer `aq`.
    #[must_use]
    pub fn thickness(&self, aq: usize) -> Scalar {
        self.aquifer(aq).thickness()
    }

    /// Couplings between consecutive aquifers.
    #[must_use]
    pub fn couplings(&self) -> &[Coupling] {
        &self.couplings
    }

    /// Coupling to the fixed head above a semi-confined top.
    #[must_use]
    pub const fn top_coupling(&self) -> Option<Coupling> {
        self.top_coupling
    }

    /// Elevation of the top of the stack.
    #[must_use]
    pub fn top_elevation(&self) -> Scalar {
        self.layers[0].top
    }

    /// Elevation of the bottom of the stack.
    #[must_use]
    pub fn bottom_elevation(&self) -> Scalar {
        self.layers[self.layers.len() - 1].bottom
    }

    /// Layer containing elevation `z`; interfaces belong to the upper layer.
    #[must_use]
    pub fn layer_at(&self, z: Scalar) -> Option<usize> {
        self.layers.iter().position(|l| l.contains(z))
    }

    /// Layer adjacent to `layer` across its top (`upward`) or bottom face.
    #[must_use]
    pub fn neighbour(&self, layer: usize, upward: bool) -> Option<usize> {
        if upward {
            layer.checked_sub(1)
        } else if layer + 1 < self.layers.len() {
            Some(layer + 1)
        } else {
            None
        }
    }

    /// Number of memoized Laplace variables.
    #[must_use]
    pub fn cached_frequencies(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Eigen data for Laplace variable `p`, computed once and memoized.
    pub fn eigen_data(&self, p: CScalar) -> Result<Arc<EigenData>> {
        let k = key(p);
        if let Some(found) = self.cache.read().unwrap_or_else(PoisonError::into_inner).get(&k) {
            return Ok(Arc::clone(found));
        }
        let data = Arc::new(self.compute_eigen(p)?);
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(k).or_insert(data)))
    }

    fn compute_eigen(&self, p: CScalar) -> Result<EigenData> {
        let naq = self.aquifer_count();
        let coupling_factors: Vec<(CScalar, CScalar)> =
            self.couplings.iter().map(|c| c.factors(p)).collect();
        let top_factors = self.top_coupling.map(|c| c.factors(p));

        let mut m = CMatrix::zeros(naq, naq);
        for i in 0..naq {
            m[(i, i)] = p * self.storativity[i];
        }
        for (i, &(diag, off)) in coupling_factors.iter().enumerate() {
            m[(i, i)] += diag;
            m[(i + 1, i + 1)] += diag;
            m[(i, i + 1)] -= off;
            m[(i + 1, i)] -= off;
        }
        if let Some((diag, _)) = top_factors {
            m[(0, 0)] += diag;
        }
        for i in 0..naq {
            let inv_t = 1.0 / self.transmissivity[i];
            for j in 0..naq {
                m[(i, j)] *= inv_t;
            }
        }

        let (eigenvalues, vectors) = decompose(&m)?;
        let inverse = vectors.clone().try_inverse().ok_or_else(|| {
            AemError::config(format!(
                "eigenvector basis of the layer coupling is singular at p = {p}"
            ))
        })?;
        let mut coef = inverse.clone();
        for j in 0..naq {
            let inv_t = real(1.0 / self.transmissivity[j]);
            for k in 0..naq {
                coef[(k, j)] *= inv_t;
            }
        }
        debug!("eigen data computed for p = {p}");

        Ok(EigenData {
            p,
            mu: eigenvalues.into_iter().map(|w| w.sqrt()).collect(),
            vectors,
            inverse,
            coef,
            transmissivity: self.transmissivity.clone(),
            coupling_factors,
            top_factors,
            top_storage: match self.top {
                TopBoundary::Phreatic { specific_yield } => p * specific_yield,
                _ => CScalar::new(0.0, 0.0),
            },
        })
    }
}

fn validate(layers: &[Layer], top: TopBoundary) -> Result<()> {
    if !layers.iter().any(Layer::is_aquifer) {
        return Err(AemError::config("layer stack has no aquifer"));
    }
    let semi = matches!(top, TopBoundary::SemiConfined);
    if semi != (layers[0].kind == LayerKind::Leaky) {
        return Err(AemError::config(
            "the first layer must be leaky exactly when the top is semi-confined",
        ));
    }
    if !layers[layers.len() - 1].is_aquifer() {
        return Err(AemError::config("the bottom layer must be an aquifer"));
    }
    if let TopBoundary::Phreatic { specific_yield } = top {
        if specific_yield <= 0.0 || specific_yield.is_nan() {
            return Err(AemError::config("specific yield must be positive"));
        }
    }
    for (i, layer) in layers.iter().enumerate() {
        if !(layer.top.is_finite() && layer.bottom.is_finite()) || layer.thickness() <= 0.0 {
            return Err(AemError::config(format!(
                "layer {i} has non-positive thickness ({} to {})",
                layer.top, layer.bottom
            )));
        }
        if let Some(next) = layers.get(i + 1) {
            let tol = ELEVATION_TOLERANCE * layer.bottom.abs().max(1.0);
            if (layer.bottom - next.top).abs() > tol {
                return Err(AemError::config(format!(
                    "layer {i} bottom {} does not meet layer {} top {}",
                    layer.bottom,
                    i + 1,
                    next.top
                )));
            }
            if layer.kind == LayerKind::Leaky && next.kind == LayerKind::Leaky {
                return Err(AemError::config(format!("layers {i} and {} are both leaky", i + 1)));
            }
        }
        if layer.porosity <= 0.0 || layer.porosity > 1.0 || layer.porosity.is_nan() {
            return Err(AemError::config(format!("layer {i} porosity must lie in (0, 1]")));
        }
        match layer.kind {
            LayerKind::Aquifer => {
                if !is_positive(layer.kh) || !is_positive(layer.kv) {
                    return Err(AemError::config(format!(
                        "aquifer layer {i} needs positive kh and kv"
                    )));
                }
                let phreatic_top = matches!(top, TopBoundary::Phreatic { .. })
                    && layers[..i].iter().all(|l| !l.is_aquifer());
                if !is_positive(layer.specific_storage) && !phreatic_top {
                    return Err(AemError::config(format!(
                        "aquifer layer {i} needs positive specific storage"
                    )));
                }
            }
            LayerKind::Leaky => {
                if !is_positive(layer.resistance) {
                    return Err(AemError::config(format!(
                        "leaky layer {i} needs positive resistance"
                    )));
                }
                if layer.specific_storage < 0.0 || layer.specific_storage.is_nan() {
                    return Err(AemError::config(format!(
                        "leaky layer {i} needs non-negative specific storage"
                    )));
                }
            }
        }
    }
    Ok(())
}

// False for NaN.
fn is_positive(value: Scalar) -> bool {
    value > 0.0
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn two_aquifers() -> AquiferSystem {
        AquiferSystem::maq(MaqParameters::new(
            vec![10.0, 20.0],
            vec![0.0, -10.0, -12.0, -22.0],
            vec![200.0],
            vec![1.0e-4, 2.0e-4],
        ))
        .unwrap()
    }

    #[test]
    fn maq_builds_alternating_stack() {
        let system = two_aquifers();
        assert_eq!(system.layers().len(), 3);
        assert_eq!(system.aquifer_count(), 2);
        assert_eq!(system.aquifer_of_layer(2), Some(1));
        assert_eq!(system.aquifer_of_layer(1), None);
        assert_relative_eq!(system.transmissivity(1), 200.0);
        assert_relative_eq!(system.storativity(0), 1.0e-3);
        assert_eq!(system.couplings()[0].layer, Some(1));
        assert_eq!(system.layer_at(-10.0), Some(0));
        assert_eq!(system.layer_at(-11.0), Some(1));
        assert_eq!(system.layer_at(5.0), None);
    }

    #[test]
    fn three_d_couples_through_half_thicknesses() {
        let system = AquiferSystem::three_d(
            ThreeDParameters::new(vec![10.0, 10.0], vec![0.0, -5.0, -10.0], vec![1.0e-4, 1.0e-4])
                .with_anisotropy(vec![0.1, 0.1]),
        )
        .unwrap();
        assert_relative_eq!(system.couplings()[0].resistance, 5.0);
        assert_eq!(system.couplings()[0].layer, None);
    }

    #[test]
    fn rejects_gaps_and_bad_parameters() {
        let gap = vec![
            Layer::aquifer(0.0, -10.0, 10.0, 1e-4),
            Layer::aquifer(-11.0, -20.0, 10.0, 1e-4),
        ];
        assert!(AquiferSystem::build(gap, TopBoundary::Confined).is_err());
        let flat = vec![Layer::aquifer(0.0, 0.0, 10.0, 1e-4)];
        assert!(AquiferSystem::build(flat, TopBoundary::Confined).is_err());
        let negative_k = vec![Layer::aquifer(0.0, -10.0, -1.0, 1e-4)];
        assert!(AquiferSystem::build(negative_k, TopBoundary::Confined).is_err());
        let semi_without_leaky = vec![Layer::aquifer(0.0, -10.0, 10.0, 1e-4)];
        assert!(AquiferSystem::build(semi_without_leaky, TopBoundary::SemiConfined).is_err());
        let leaky_bottom =
            vec![Layer::aquifer(0.0, -10.0, 10.0, 1e-4), Layer::leaky(-10.0, -12.0, 100.0, 0.0)];
        assert!(AquiferSystem::build(leaky_bottom, TopBoundary::Confined).is_err());
    }

    #[test]
    fn rejects_nan_parameters() {
        let nan_k = vec![Layer::aquifer(0.0, -10.0, Scalar::NAN, 1e-4)];
        assert!(AquiferSystem::build(nan_k, TopBoundary::Confined).is_err());
        let nan_storage = vec![Layer::aquifer(0.0, -10.0, 10.0, Scalar::NAN)];
        assert!(AquiferSystem::build(nan_storage, TopBoundary::Confined).is_err());
        let nan_resistance = vec![
            Layer::aquifer(0.0, -10.0, 10.0, 1e-4),
            Layer::leaky(-10.0, -12.0, Scalar::NAN, 0.0),
            Layer::aquifer(-12.0, -22.0, 10.0, 1e-4),
        ];
        assert!(AquiferSystem::build(nan_resistance, TopBoundary::Confined).is_err());
    }

    #[test]
    fn eigen_data_is_memoized_and_diagonalises() {
        let system = two_aquifers();
        let p = CScalar::new(0.5, 0.3);
        let first = system.eigen_data(p).unwrap();
        let second = system.eigen_data(p).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(system.cached_frequencies(), 1);

        // V W V⁻¹ must reproduce T⁻¹ (S p + L).
        let c = 200.0;
        let t = [100.0, 400.0];
        let s = [1.0e-3, 4.0e-3];
        let expected = [
            [(p * s[0] + 1.0 / c) / t[0], real(-1.0 / c / t[0])],
            [real(-1.0 / c / t[1]), (p * s[1] + 1.0 / c) / t[1]],
        ];
        let w = CMatrix::from_diagonal(&nalgebra::DVector::from_iterator(
            2,
            first.mu.iter().map(|m| m * m),
        ));
        let rebuilt = &first.vectors * w * &first.inverse;
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(rebuilt[(i, j)].re, expected[i][j].re, epsilon = 1.0e-12);
                assert_relative_eq!(rebuilt[(i, j)].im, expected[i][j].im, epsilon = 1.0e-12);
            }
        }
    }

    #[test]
    fn single_aquifer_mode_is_diffusivity() {
        let system = AquiferSystem::build(
            vec![Layer::aquifer(0.0, -10.0, 10.0, 1.0e-4)],
            TopBoundary::Confined,
        )
        .unwrap();
        let p = CScalar::new(2.0, 1.0);
        let data = system.eigen_data(p).unwrap();
        let expected = (p * 1.0e-3 / 100.0).sqrt();
        assert_relative_eq!(data.mu[0].re, expected.re, max_relative = 1.0e-12);
        assert_relative_eq!(data.coef[(0, 0)].re, 0.01, max_relative = 1.0e-12);
    }
}
