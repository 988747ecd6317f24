//! Laplace-domain eigen-decomposition of the layer coupling.
//!
//! For a Laplace variable `p` the heads satisfy `∇²h = A h` with
//! `A = T⁻¹ (S p + L(p))`. Writing `A = V W V⁻¹` decouples the system into
//! modes `φ = V⁻¹ h` that each obey `∇²φ_k = μ_k² φ_k`, `μ_k = √w_k`.

use nalgebra::DMatrix;

use crate::errors::{AemError, Result};
use crate::math::{CMatrix, CScalar, CVector, Scalar};

const SCHUR_EPS: Scalar = 1.0e-14;
const SCHUR_MAX_ITERATIONS: usize = 10_000;

/// Eigen data for one Laplace variable.
#[derive(Debug, Clone)]
pub struct EigenData {
    /// Laplace variable.
    pub p: CScalar,
    /// Modal decay constants `μ_k = √w_k`, one per aquifer.
    pub mu: Vec<CScalar>,
    /// Eigenvectors `V` (columns), mapping modal values to aquifer heads.
    pub vectors: CMatrix,
    /// `V⁻¹`, mapping a head jump in an aquifer to modal jumps.
    pub inverse: CMatrix,
    /// `V⁻¹ T⁻¹`, mapping a discharge in an aquifer to modal strengths.
    pub coef: CMatrix,
    /// Transmissivity per aquifer.
    pub transmissivity: Vec<Scalar>,
    /// `(b coth b / c, b csch b / c)` for each coupling between aquifers `i` and `i + 1`.
    pub coupling_factors: Vec<(CScalar, CScalar)>,
    /// Same factors for the leaky layer above a semi-confined top aquifer.
    pub top_factors: Option<(CScalar, CScalar)>,
    /// `Sy p` for a phreatic top, zero otherwise.
    pub top_storage: CScalar,
}

impl EigenData {
    /// Number of aquifers.
    #[must_use]
    pub fn aquifer_count(&self) -> usize {
        self.mu.len()
    }

    /// Heads in every aquifer for the modal values `modal`.
    #[must_use]
    pub fn heads(&self, modal: &CVector) -> CVector {
        &self.vectors * modal
    }
}

/// Eigenvalues and right eigenvectors of a small dense complex matrix.
///
/// Uses the complex Schur form `A = Q R Q*` and back-substitution on the
/// triangular factor; eigenvectors are normalised to unit length.
pub fn decompose(matrix: &CMatrix) -> Result<(Vec<CScalar>, CMatrix)> {
    let n = matrix.nrows();
    if n == 1 {
        return Ok((vec![matrix[(0, 0)]], DMatrix::from_element(1, 1, CScalar::new(1.0, 0.0))));
    }
    let schur = matrix
        .clone()
        .try_schur(SCHUR_EPS, SCHUR_MAX_ITERATIONS)
        .ok_or_else(|| {
            AemError::config("Schur decomposition of the layer coupling did not converge")
        })?;
    let (q, r) = schur.unpack();

    let scale = r.iter().map(|v| v.norm()).fold(0.0, Scalar::max).max(Scalar::MIN_POSITIVE);
    let tiny = scale * Scalar::EPSILON;
    let eigenvalues: Vec<CScalar> = (0..n).map(|k| r[(k, k)]).collect();
    let mut vectors = CMatrix::zeros(n, n);
    for k in 0..n {
        let mut y = CVector::zeros(n);
        y[k] = CScalar::new(1.0, 0.0);
        for i in (0..k).rev() {
            let mut sum = CScalar::new(0.0, 0.0);
            for j in i + 1..=k {
                sum += r[(i, j)] * y[j];
            }
            let mut denom = r[(i, i)] - eigenvalues[k];
            if denom.norm() < tiny {
                denom = CScalar::new(tiny, 0.0);
            }
            y[i] = -sum / denom;
        }
        let mut v = &q * y;
        let norm = v.iter().map(|c| c.norm_sqr()).sum::<Scalar>().sqrt();
        v /= CScalar::new(norm, 0.0);
        vectors.set_column(k, &v);
    }
    Ok((eigenvalues, vectors))
}
