//! # robust-frontier
//!
//! Classical and robust mean-variance efficient frontiers for long-only,
//! fully invested portfolios, compared under Monte Carlo resampling of the
//! expected returns.
//!
//! ## Quick Start
//!
//! ```ignore
//! use robust_frontier::prelude::*;
//!
//! let truth = TrueDistribution::from_std_corr(mean, &std_dev, &correlation)?;
//! let config = SweepConfig {
//!     risk_budgets: SweepConfig::linear_grid(0.01, 0.08, 15),
//!     trials: 200,
//!     ..SweepConfig::default()
//! };
//! let report = FrontierSweep::new(truth, config)?.run()?;
//!
//! for (est, act) in report.estimated.points.iter().zip(&report.realized.points) {
//!     println!("{:.3}: estimated {:.4}, realized {:.4}", est.risk_budget, est.optimal_return, act.optimal_return);
//! }
//! ```
//!
//! ## Formulations
//!
//! Six programs over weights `w` with `w >= 0`, `sum(w) = 1`, see
//! [`problem::ProblemSpec`]. Robust variants subtract the worst case of
//! `α'w` over the ellipsoid `{α + κ Σ^(1/2) u : ‖u‖₂ <= 1}`, which is
//! `κ ‖Σ^(1/2) w‖₂`.
//!
//! ## Architecture
//!
//! - **Estimation** draws samples from the true normal distribution
//! - **Calibration** takes matrix square roots and applies the
//!   zero-net-alpha correction
//! - **Formulation** writes each variant as a second-order cone program
//! - **Clarabel solver** solves the cone program
//! - **Frontier sweep** repeats this per grid point and trial and averages

pub mod calibrate;
pub mod config;
pub mod error;
pub mod estimate;
pub mod frontier;
pub mod problem;
pub mod solver;
pub mod sparse;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use robust_frontier::prelude::*;
/// ```
pub mod prelude {
    // Estimation and calibration
    pub use crate::calibrate::{
        sqrtm, zero_net_alpha_adjust, zero_net_alpha_sqrt, Calibration, ConfidenceRegion,
    };
    pub use crate::estimate::{Estimate, TrueDistribution, UncertaintyModel};

    // Problems
    pub use crate::problem::{Objective, OptimalPortfolio, ProblemSpec, RiskModel};

    // Sweep
    pub use crate::config::{SweepConfig, SweepVariant, TrialFailurePolicy};
    pub use crate::frontier::{
        trace_frontier, AveragedFrontiers, Frontier, FrontierAccumulator, FrontierPoint, FrontierSweep,
        SweepReport,
    };

    // Solver
    pub use crate::solver::{Settings, SolveStatus};

    // Errors
    pub use crate::error::{FrontierError, Result};
}

// Re-export main types at crate root
pub use error::{FrontierError, Result};
pub use frontier::{FrontierSweep, SweepReport};
pub use problem::ProblemSpec;
