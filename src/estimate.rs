//! Distribution estimation.
//!
//! A [`TrueDistribution`] holds the ground-truth mean and covariance of
//! asset returns. Sampling it yields an [`Estimate`]: the sample mean and
//! covariance that an investor would observe, together with the matrix
//! bounding the estimation error of the mean.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::Deserialize;

use crate::calibrate::{is_symmetric, min_eigenvalue, sqrtm, symmetrize, EIGEN_TOL};
use crate::error::{FrontierError, Result};

/// Which matrix an [`Estimate`] reports as its uncertainty matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyModel {
    /// Covariance of the sample mean: `S / k`.
    #[default]
    StandardError,
    /// The sample covariance `S` itself.
    SampleCovariance,
}

/// Sample statistics from one draw of the true distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    /// Estimated expected returns.
    pub mean: DVector<f64>,
    /// Estimated covariance (unbiased sample covariance).
    pub covariance: DMatrix<f64>,
    /// Estimation-error matrix for the mean.
    pub uncertainty: DMatrix<f64>,
    /// Number of samples drawn.
    pub samples: usize,
}

/// Ground-truth multivariate normal return distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct TrueDistribution {
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
    factor: DMatrix<f64>,
}

/// Malformed distribution parameters are bad input, not a shape error.
fn malformed(expected: impl std::fmt::Display, got: impl std::fmt::Display) -> FrontierError {
    FrontierError::InvalidInput(format!("expected {expected}, got {got}"))
}

impl TrueDistribution {
    /// Create from a mean vector and covariance matrix.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::InvalidInput`] if the covariance is not a
    /// symmetric PSD matrix matching the mean's length.
    pub fn new(mean: DVector<f64>, covariance: DMatrix<f64>) -> Result<Self> {
        let n = mean.len();
        if covariance.shape() != (n, n) {
            return Err(malformed(
                format!("{n}x{n} covariance"),
                format!("{}x{}", covariance.nrows(), covariance.ncols()),
            ));
        }
        if n == 0 {
            return Err(FrontierError::InvalidInput("no assets".into()));
        }
        if mean.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
            return Err(FrontierError::InvalidInput(
                "mean and covariance must be finite".into(),
            ));
        }
        if !is_symmetric(&covariance) {
            return Err(FrontierError::InvalidInput(
                "covariance matrix is not symmetric".into(),
            ));
        }
        let factor = sqrtm(&covariance).map_err(|_| {
            FrontierError::InvalidInput(format!(
                "covariance matrix is not positive semidefinite (smallest eigenvalue {:.3e})",
                min_eigenvalue(&covariance)
            ))
        })?;

        Ok(TrueDistribution {
            mean,
            covariance: symmetrize(&covariance),
            factor,
        })
    }

    /// Create from expected returns, standard deviations and a correlation matrix.
    ///
    /// The covariance is `diag(s) C diag(s)`.
    pub fn from_std_corr(
        mean: DVector<f64>,
        std_dev: &DVector<f64>,
        correlation: &DMatrix<f64>,
    ) -> Result<Self> {
        let n = mean.len();
        if correlation.shape() != (n, n) {
            return Err(malformed(
                format!("{n}x{n} correlation"),
                format!("{}x{}", correlation.nrows(), correlation.ncols()),
            ));
        }
        if std_dev.len() != n {
            return Err(malformed(format!("{n} standard deviations"), std_dev.len()));
        }
        if std_dev.iter().any(|s| *s < 0.0 || !s.is_finite()) {
            return Err(FrontierError::InvalidInput(
                "standard deviations must be finite and non-negative".into(),
            ));
        }
        for i in 0..n {
            if (correlation[(i, i)] - 1.0).abs() > EIGEN_TOL.sqrt() {
                return Err(FrontierError::InvalidInput(format!(
                    "correlation diagonal entry {i} is {}, expected 1",
                    correlation[(i, i)]
                )));
            }
        }
        if correlation.iter().any(|c| c.abs() > 1.0 + EIGEN_TOL.sqrt()) {
            return Err(FrontierError::InvalidInput(
                "correlation entries must lie in [-1, 1]".into(),
            ));
        }

        let covariance = DMatrix::from_fn(n, n, |i, j| std_dev[i] * correlation[(i, j)] * std_dev[j]);
        TrueDistribution::new(mean, covariance)
    }

    /// Derive the true distribution from a return series.
    ///
    /// Rows are observations, columns are assets.
    pub fn from_returns(returns: &DMatrix<f64>) -> Result<Self> {
        if returns.nrows() < 2 {
            return Err(FrontierError::InvalidInput(format!(
                "at least 2 observations are required, got {}",
                returns.nrows()
            )));
        }
        TrueDistribution::new(sample_mean(returns), sample_covariance(returns))
    }

    /// Number of assets.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// True expected returns.
    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    /// True covariance.
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// Draw `k` observations from `N(μ, Q)`.
    ///
    /// Rows of the returned matrix are observations.
    pub fn draw<R: Rng>(&self, k: usize, rng: &mut R) -> DMatrix<f64> {
        let n = self.dim();
        let mut out = DMatrix::zeros(k, n);
        for row in 0..k {
            let z = DVector::from_fn(n, |_, _| rng.sample::<f64, _>(StandardNormal));
            let x = &self.mean + &self.factor * z;
            out.set_row(row, &x.transpose());
        }
        out
    }

    /// Draw `k` samples and return the estimated statistics.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::InvalidInput`] if `k < n + 1`, since the
    /// sample covariance would be rank deficient.
    pub fn sample<R: Rng>(
        &self,
        k: usize,
        model: UncertaintyModel,
        rng: &mut R,
    ) -> Result<Estimate> {
        let n = self.dim();
        if k < n + 1 {
            return Err(FrontierError::InvalidInput(format!(
                "{k} samples cannot estimate a {n}-asset covariance (need at least {})",
                n + 1
            )));
        }

        let draws = self.draw(k, rng);
        let mean = sample_mean(&draws);
        let covariance = sample_covariance(&draws);
        let uncertainty = match model {
            UncertaintyModel::StandardError => &covariance / k as f64,
            UncertaintyModel::SampleCovariance => covariance.clone(),
        };

        Ok(Estimate {
            mean,
            covariance,
            uncertainty,
            samples: k,
        })
    }
}

/// Column means of an observation matrix.
pub fn sample_mean(observations: &DMatrix<f64>) -> DVector<f64> {
    observations.row_mean().transpose()
}

/// Unbiased sample covariance of an observation matrix (divisor `k - 1`).
pub fn sample_covariance(observations: &DMatrix<f64>) -> DMatrix<f64> {
    let (k, n) = observations.shape();
    let mean = observations.row_mean();
    let centered = DMatrix::from_fn(k, n, |i, j| observations[(i, j)] - mean[j]);
    let cov = centered.transpose() * &centered / (k.saturating_sub(1).max(1)) as f64;
    symmetrize(&cov)
}
