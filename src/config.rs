//! Sweep configuration.
//!
//! [`SweepConfig`] can be built in code or parsed from TOML:
//!
//! ```toml
//! risk_budgets = [0.01, 0.02, 0.03]
//! trials = 50
//! samples = 120
//! kappa = 1.0
//! seed = 7
//!
//! [variant]
//! kind = "zero_net_alpha"
//! calibration = "inverse_covariance"
//!
//! [solver]
//! max_iter = 300
//! ```

use serde::Deserialize;

use crate::calibrate::Calibration;
use crate::error::{FrontierError, Result};
use crate::estimate::UncertaintyModel;
use crate::solver::Settings;

/// Robust formulation solved at each grid point alongside the classical one.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SweepVariant {
    /// Robust max-return.
    #[default]
    MaxReturn,
    /// Robust zero-net-alpha max-return.
    ZeroNetAlpha {
        #[serde(default)]
        calibration: Calibration,
    },
    /// Robust max-active-return against a benchmark.
    MaxActiveReturn { benchmark: Vec<f64> },
}

/// What to do when sampling or calibration fails for a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialFailurePolicy {
    /// Abort the whole sweep with the trial's error.
    #[default]
    Abort,
    /// Record the failure and continue with the remaining trials.
    Skip,
}

/// Parameters of a Monte Carlo frontier sweep.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    /// Risk budgets `ν`, strictly increasing.
    pub risk_budgets: Vec<f64>,
    /// Number of Monte Carlo trials.
    pub trials: usize,
    /// Observations drawn per trial.
    pub samples: usize,
    /// Confidence region radius `κ`.
    pub kappa: f64,
    /// Master seed; trial `t` uses stream `t` of this seed.
    pub seed: u64,
    /// Run trials on the rayon thread pool.
    pub parallel: bool,
    pub variant: SweepVariant,
    pub uncertainty: UncertaintyModel,
    pub on_trial_error: TrialFailurePolicy,
    pub solver: Settings,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            risk_budgets: SweepConfig::linear_grid(0.005, 0.05, 10),
            trials: 100,
            samples: 120,
            kappa: 1.0,
            seed: 0,
            parallel: true,
            variant: SweepVariant::default(),
            uncertainty: UncertaintyModel::default(),
            on_trial_error: TrialFailurePolicy::default(),
            solver: Settings::default(),
        }
    }
}

impl SweepConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SweepConfig =
            toml::from_str(s).map_err(|e| FrontierError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// `m` evenly spaced values from `lo` to `hi` inclusive.
    pub fn linear_grid(lo: f64, hi: f64, m: usize) -> Vec<f64> {
        match m {
            0 => Vec::new(),
            1 => vec![lo],
            _ => {
                let step = (hi - lo) / (m - 1) as f64;
                (0..m).map(|i| lo + step * i as f64).collect()
            }
        }
    }

    /// Check the grid and counts.
    pub fn validate(&self) -> Result<()> {
        if self.risk_budgets.is_empty() {
            return Err(FrontierError::InvalidInput("risk budget grid is empty".into()));
        }
        if self
            .risk_budgets
            .iter()
            .any(|nu| !nu.is_finite() || *nu < 0.0)
        {
            return Err(FrontierError::InvalidInput(
                "risk budgets must be finite and non-negative".into(),
            ));
        }
        if self.risk_budgets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(FrontierError::InvalidInput(
                "risk budgets must be strictly increasing".into(),
            ));
        }
        if self.trials == 0 {
            return Err(FrontierError::InvalidInput("at least one trial is required".into()));
        }
        if !self.kappa.is_finite() || self.kappa < 0.0 {
            return Err(FrontierError::InvalidInput(format!(
                "kappa must be finite and non-negative, got {}",
                self.kappa
            )));
        }
        if self.solver.max_iter == 0 {
            return Err(FrontierError::Config("solver.max_iter must be positive".into()));
        }
        Ok(())
    }
}
