//! Uncertainty set calibration.
//!
//! This module provides:
//! - Principal square roots of symmetric positive semidefinite matrices
//! - The zero-net-alpha correction of an uncertainty matrix
//! - [`ConfidenceRegion`], the ellipsoid `{ᾱ + κ Σ^(1/2) u : ‖u‖₂ ≤ 1}`
//!   used by the robust formulations

use nalgebra::{DMatrix, DVector};
use serde::Deserialize;

use crate::error::{FrontierError, Result};

/// Relative tolerance for eigenvalue sign checks and degenerate denominators.
pub const EIGEN_TOL: f64 = 1e-10;

/// Relative tolerance for symmetry checks.
const SYMMETRY_TOL: f64 = 1e-9;

/// Return `(M + Mᵗ) / 2`.
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

/// Check that a matrix is square and return its dimension.
pub(crate) fn check_square(m: &DMatrix<f64>, what: &str) -> Result<usize> {
    if !m.is_square() {
        return Err(FrontierError::shape(
            format!("square {what}"),
            format!("{}x{}", m.nrows(), m.ncols()),
        ));
    }
    Ok(m.nrows())
}

/// Check symmetry up to a tolerance scaled by the largest entry.
pub(crate) fn is_symmetric(m: &DMatrix<f64>) -> bool {
    if !m.is_square() {
        return false;
    }
    let tol = SYMMETRY_TOL * m.amax().max(1.0);
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            if (m[(i, j)] - m[(j, i)]).abs() > tol {
                return false;
            }
        }
    }
    true
}

/// Smallest eigenvalue of a symmetric matrix.
pub fn min_eigenvalue(m: &DMatrix<f64>) -> f64 {
    symmetrize(m).symmetric_eigen().eigenvalues.min()
}

/// Principal square root `M^(1/2)` of a symmetric PSD matrix.
///
/// Computed from the symmetric eigendecomposition `M = V Λ Vᵗ` as
/// `V Λ^(1/2) Vᵗ`. Eigenvalues that are negative by no more than
/// `EIGEN_TOL` times the spectral radius are treated as zero, so singular
/// matrices such as a zero-net-alpha adjusted matrix have a root.
///
/// # Errors
///
/// Returns [`FrontierError::Numerical`] if `m` is not square, has a
/// non-finite entry, is not symmetric, or has an eigenvalue that is
/// negative beyond tolerance.
pub fn sqrtm(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if !m.is_square() || m.nrows() == 0 {
        return Err(FrontierError::Numerical(format!(
            "square root requires a non-empty square matrix, got {}x{}",
            m.nrows(),
            m.ncols()
        )));
    }
    if m.iter().any(|v| !v.is_finite()) {
        return Err(FrontierError::Numerical(
            "square root requires a finite matrix".into(),
        ));
    }
    if !is_symmetric(m) {
        return Err(FrontierError::Numerical(
            "square root requires a symmetric matrix".into(),
        ));
    }

    let eigen = symmetrize(m).symmetric_eigen();
    let tol = EIGEN_TOL * eigen.eigenvalues.amax();
    let lambda_min = eigen.eigenvalues.min();
    if lambda_min < -tol {
        return Err(FrontierError::Numerical(format!(
            "matrix is not positive semidefinite (smallest eigenvalue {lambda_min:.3e})"
        )));
    }

    let roots = eigen.eigenvalues.map(|l| l.max(0.0).sqrt());
    let v = &eigen.eigenvectors;
    let root = v * DMatrix::from_diagonal(&roots) * v.transpose();
    Ok(symmetrize(&root))
}

/// Zero-net-alpha adjustment of an uncertainty matrix.
///
/// ```text
/// Σ_adj = Σ − (1 / (eᵗDΣDᵗe)) · Σ Dᵗ e eᵗ D Σ
/// ```
///
/// The result satisfies `eᵗ D Σ_adj = 0`, so the worst-case alpha shift it
/// induces has zero net weight under `D`.
///
/// # Errors
///
/// Returns [`FrontierError::Numerical`] if `eᵗDΣDᵗe` is within tolerance
/// of zero, and a shape error if `d` does not match `sigma`.
pub fn zero_net_alpha_adjust(sigma: &DMatrix<f64>, d: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let n = check_square(sigma, "uncertainty matrix")?;
    if d.shape() != (n, n) {
        return Err(FrontierError::shape(
            format!("{n}x{n} calibration matrix"),
            format!("{}x{}", d.nrows(), d.ncols()),
        ));
    }

    let e = DVector::from_element(n, 1.0);
    let u = d.transpose() * &e;
    let su = sigma * &u;
    let denom = u.dot(&su);

    let scale = sigma.amax() * u.norm_squared();
    if denom.abs() <= EIGEN_TOL * scale || denom.abs() < f64::MIN_POSITIVE {
        return Err(FrontierError::Numerical(format!(
            "degenerate zero-net-alpha calibration (eᵗDΣDᵗe = {denom:.3e})"
        )));
    }

    // eᵗDΣ = (ΣDᵗe)ᵗ for symmetric Σ.
    let adjusted = sigma - (&su * su.transpose()) / denom;
    Ok(symmetrize(&adjusted))
}

/// Square root of the zero-net-alpha adjusted matrix.
pub fn zero_net_alpha_sqrt(sigma: &DMatrix<f64>, d: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    sqrtm(&zero_net_alpha_adjust(sigma, d)?)
}

/// Choice of the calibration matrix `D` for the zero-net-alpha correction.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Calibration {
    /// `D = I`: the shift sums to zero across assets.
    #[default]
    Identity,
    /// `D = Σ⁻¹`.
    InverseCovariance,
    /// An explicit row-major `n x n` matrix.
    Matrix { rows: Vec<Vec<f64>> },
}

impl Calibration {
    /// Build `D` for the given uncertainty matrix.
    pub fn resolve(&self, sigma: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let n = check_square(sigma, "uncertainty matrix")?;
        match self {
            Calibration::Identity => Ok(DMatrix::identity(n, n)),
            Calibration::InverseCovariance => symmetrize(sigma)
                .cholesky()
                .map(|c| c.inverse())
                .ok_or_else(|| {
                    FrontierError::Numerical(
                        "uncertainty matrix is not positive definite and cannot be inverted"
                            .into(),
                    )
                }),
            Calibration::Matrix { rows } => {
                if rows.len() != n || rows.iter().any(|r| r.len() != n) {
                    return Err(FrontierError::shape(
                        format!("{n}x{n} calibration matrix"),
                        format!("{} rows", rows.len()),
                    ));
                }
                Ok(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
            }
        }
    }
}

/// Ellipsoidal confidence region around an estimated return vector.
///
/// Only the radius `kappa` and the matrix square root are stored; the
/// center is the estimated return supplied with each formulation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceRegion {
    /// Radius of the ellipsoid.
    pub kappa: f64,
    /// Square root of the uncertainty matrix (symmetric).
    pub sqrt: DMatrix<f64>,
}

impl ConfidenceRegion {
    /// Create from a radius and an already computed square root.
    pub fn new(kappa: f64, sqrt: DMatrix<f64>) -> Self {
        ConfidenceRegion { kappa, sqrt }
    }

    /// Create from an uncertainty matrix `Σ`.
    pub fn from_uncertainty(kappa: f64, sigma: &DMatrix<f64>) -> Result<Self> {
        Ok(ConfidenceRegion::new(kappa, sqrtm(sigma)?))
    }

    /// Create the zero-net-alpha region from `Σ` and a calibration matrix `D`.
    pub fn zero_net_alpha(kappa: f64, sigma: &DMatrix<f64>, d: &DMatrix<f64>) -> Result<Self> {
        Ok(ConfidenceRegion::new(kappa, zero_net_alpha_sqrt(sigma, d)?))
    }

    /// Number of assets.
    pub fn dim(&self) -> usize {
        self.sqrt.nrows()
    }

    /// Worst-case reduction of estimated return: `κ ‖Σ^(1/2) w‖₂`.
    pub fn penalty(&self, w: &DVector<f64>) -> f64 {
        self.kappa * (&self.sqrt * w).norm()
    }

    /// Worst-case shift of the return vector for portfolio `w`.
    ///
    /// The minimizer of `(ᾱ + δ)ᵗ w` over the region is
    /// `δ = −κ Σ w / ‖Σ^(1/2) w‖₂`. Zero when the norm vanishes.
    pub fn worst_case_shift(&self, w: &DVector<f64>) -> DVector<f64> {
        let sw = &self.sqrt * w;
        let norm = sw.norm();
        if norm <= f64::EPSILON {
            return DVector::zeros(w.len());
        }
        (&self.sqrt * sw) * (-self.kappa / norm)
    }
}
