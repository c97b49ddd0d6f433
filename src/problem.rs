//! Portfolio problem formulation and solving.
//!
//! A [`ProblemSpec`] is one of six mean-variance programs over a weight
//! vector `w`. Every variant is long-only (`w >= 0`) and fully invested
//! (`sum(w) = 1`):
//!
//! | Variant | Objective | Extra constraint |
//! |---|---|---|
//! | `ClassicalMaxReturn` | max `α'w` | `w'Qw <= ν` |
//! | `RobustMaxReturn` | max `α'w - κ‖Σ^½ w‖` | `w'Qw <= ν` |
//! | `RobustMaxUtility` | max `α'w - κ‖Σ^½ w‖ - (p/2) w'Qw` | |
//! | `RobustMinRisk` | min `w'Qw` | `α'w - κ‖Σ^½ w‖ >= r` |
//! | `RobustMaxActiveReturn` | max `α'(w-b) - κ‖Σ^½ (w-b)‖` | `(w-b)'Q(w-b) <= ν` |
//! | `RobustZeroNetAlpha` | max `α'w - κ‖Σ_adj^½ w‖` | `w'Qw <= ν` |
//!
//! ```ignore
//! let spec = ProblemSpec::ClassicalMaxReturn { alpha, risk, risk_budget: 0.02 };
//! let portfolio = spec.solve(&Settings::default())?;
//! ```

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::calibrate::{sqrtm, ConfidenceRegion};
use crate::error::{FrontierError, Result};
use crate::solver::{solve, stuff_problem, ConeBlock, ConeKind, QuadObjective, Settings, StuffedProblem};

/// Tolerance on the benchmark's budget.
const BUDGET_TOL: f64 = 1e-6;

/// Optimization direction of a formulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Minimize,
    Maximize,
}

/// Covariance used to measure and constrain portfolio risk.
///
/// Holds `Q` together with its square root, which the variance constraint
/// needs in second-order cone form.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskModel {
    covariance: DMatrix<f64>,
    root: DMatrix<f64>,
}

impl RiskModel {
    pub fn new(covariance: DMatrix<f64>) -> Result<Self> {
        let root = sqrtm(&covariance)?;
        Ok(RiskModel { covariance, root })
    }

    pub fn dim(&self) -> usize {
        self.covariance.nrows()
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// `Q^(1/2)`.
    pub fn root(&self) -> &DMatrix<f64> {
        &self.root
    }

    /// Portfolio variance `w'Qw`.
    pub fn variance(&self, w: &DVector<f64>) -> f64 {
        w.dot(&(&self.covariance * w))
    }
}

/// One of the six portfolio formulations, with the data it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProblemSpec {
    /// maximize `α'w` s.t. `w'Qw <= ν`.
    ClassicalMaxReturn {
        alpha: DVector<f64>,
        risk: RiskModel,
        risk_budget: f64,
    },
    /// maximize `α'w - κ‖Σ^½ w‖` s.t. `w'Qw <= ν`.
    RobustMaxReturn {
        alpha: DVector<f64>,
        risk: RiskModel,
        region: ConfidenceRegion,
        risk_budget: f64,
    },
    /// maximize `α'w - κ‖Σ^½ w‖ - (p/2) w'Qw`.
    RobustMaxUtility {
        alpha: DVector<f64>,
        risk: RiskModel,
        region: ConfidenceRegion,
        risk_aversion: f64,
    },
    /// minimize `w'Qw` s.t. `α'w - κ‖Σ^½ w‖ >= r`.
    RobustMinRisk {
        alpha: DVector<f64>,
        risk: RiskModel,
        region: ConfidenceRegion,
        min_return: f64,
    },
    /// maximize `α'(w-b) - κ‖Σ^½ (w-b)‖` s.t. `(w-b)'Q(w-b) <= ν`.
    RobustMaxActiveReturn {
        alpha: DVector<f64>,
        risk: RiskModel,
        region: ConfidenceRegion,
        benchmark: DVector<f64>,
        risk_budget: f64,
    },
    /// maximize `α'w - κ‖Σ_adj^½ w‖` s.t. `w'Qw <= ν`.
    ///
    /// `region` must carry the zero-net-alpha adjusted square root, see
    /// [`ConfidenceRegion::zero_net_alpha`].
    RobustZeroNetAlpha {
        alpha: DVector<f64>,
        risk: RiskModel,
        region: ConfidenceRegion,
        risk_budget: f64,
    },
}

/// Optimal portfolio returned by the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimalPortfolio {
    /// Portfolio weights.
    pub weights: DVector<f64>,
    /// Attained objective value, in the variant's own direction.
    pub objective: f64,
    /// Solver iterations.
    pub iterations: u32,
    /// Solve time in seconds.
    pub solve_time: f64,
}

impl OptimalPortfolio {
    /// Expected return of the weights under `mu`.
    pub fn expected_return(&self, mu: &DVector<f64>) -> f64 {
        self.weights.dot(mu)
    }
}

impl ProblemSpec {
    /// Short name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            ProblemSpec::ClassicalMaxReturn { .. } => "classical max-return",
            ProblemSpec::RobustMaxReturn { .. } => "robust max-return",
            ProblemSpec::RobustMaxUtility { .. } => "robust max-utility",
            ProblemSpec::RobustMinRisk { .. } => "robust min-risk",
            ProblemSpec::RobustMaxActiveReturn { .. } => "robust max-active-return",
            ProblemSpec::RobustZeroNetAlpha { .. } => "robust zero-net-alpha",
        }
    }

    /// Direction of the objective.
    pub fn objective(&self) -> Objective {
        match self {
            ProblemSpec::RobustMinRisk { .. } => Objective::Minimize,
            _ => Objective::Maximize,
        }
    }

    /// Estimated returns.
    pub fn alpha(&self) -> &DVector<f64> {
        match self {
            ProblemSpec::ClassicalMaxReturn { alpha, .. }
            | ProblemSpec::RobustMaxReturn { alpha, .. }
            | ProblemSpec::RobustMaxUtility { alpha, .. }
            | ProblemSpec::RobustMinRisk { alpha, .. }
            | ProblemSpec::RobustMaxActiveReturn { alpha, .. }
            | ProblemSpec::RobustZeroNetAlpha { alpha, .. } => alpha,
        }
    }

    /// Risk model.
    pub fn risk(&self) -> &RiskModel {
        match self {
            ProblemSpec::ClassicalMaxReturn { risk, .. }
            | ProblemSpec::RobustMaxReturn { risk, .. }
            | ProblemSpec::RobustMaxUtility { risk, .. }
            | ProblemSpec::RobustMinRisk { risk, .. }
            | ProblemSpec::RobustMaxActiveReturn { risk, .. }
            | ProblemSpec::RobustZeroNetAlpha { risk, .. } => risk,
        }
    }

    /// Confidence region, absent for the classical variant.
    pub fn region(&self) -> Option<&ConfidenceRegion> {
        match self {
            ProblemSpec::ClassicalMaxReturn { .. } => None,
            ProblemSpec::RobustMaxReturn { region, .. }
            | ProblemSpec::RobustMaxUtility { region, .. }
            | ProblemSpec::RobustMinRisk { region, .. }
            | ProblemSpec::RobustMaxActiveReturn { region, .. }
            | ProblemSpec::RobustZeroNetAlpha { region, .. } => Some(region),
        }
    }

    /// Number of assets.
    pub fn dim(&self) -> usize {
        self.alpha().len()
    }

    /// Check dimensions and scalar parameters.
    pub fn validate(&self) -> Result<()> {
        let n = self.dim();
        if n == 0 {
            return Err(FrontierError::InvalidInput("no assets".into()));
        }
        if self.alpha().iter().any(|a| !a.is_finite()) {
            return Err(FrontierError::InvalidInput(
                "estimated returns must be finite".into(),
            ));
        }
        if self.risk().dim() != n {
            return Err(FrontierError::shape(
                format!("{n}x{n} covariance"),
                format!("{0}x{0}", self.risk().dim()),
            ));
        }
        if let Some(region) = self.region() {
            if region.sqrt.shape() != (n, n) {
                return Err(FrontierError::shape(
                    format!("{n}x{n} uncertainty root"),
                    format!("{}x{}", region.sqrt.nrows(), region.sqrt.ncols()),
                ));
            }
            if region.sqrt.iter().any(|v| !v.is_finite()) {
                return Err(FrontierError::Numerical(
                    "uncertainty root must be finite".into(),
                ));
            }
            non_negative("kappa", region.kappa)?;
        }

        match self {
            ProblemSpec::ClassicalMaxReturn { risk_budget, .. }
            | ProblemSpec::RobustMaxReturn { risk_budget, .. }
            | ProblemSpec::RobustZeroNetAlpha { risk_budget, .. } => {
                non_negative("risk budget", *risk_budget)
            }
            ProblemSpec::RobustMaxUtility { risk_aversion, .. } => {
                non_negative("risk aversion", *risk_aversion)
            }
            ProblemSpec::RobustMinRisk { min_return, .. } => {
                if min_return.is_finite() {
                    Ok(())
                } else {
                    Err(FrontierError::InvalidInput(
                        "minimum return must be finite".into(),
                    ))
                }
            }
            ProblemSpec::RobustMaxActiveReturn {
                benchmark,
                risk_budget,
                ..
            } => {
                if benchmark.len() != n {
                    return Err(FrontierError::shape(
                        format!("{n} benchmark weights"),
                        benchmark.len(),
                    ));
                }
                if benchmark.iter().any(|b| !b.is_finite() || *b < 0.0)
                    || (benchmark.sum() - 1.0).abs() > BUDGET_TOL
                {
                    return Err(FrontierError::InvalidInput(
                        "benchmark weights must be nonnegative and sum to 1".into(),
                    ));
                }
                non_negative("risk budget", *risk_budget)
            }
        }
    }

    /// Build the conic program for this variant.
    ///
    /// Variables are `x = [w; t]`, where `t` bounds the norm penalty and is
    /// present only when the variant has a region with `κ > 0`.
    pub fn formulate(&self) -> Result<StuffedProblem> {
        self.validate()?;

        let n = self.dim();
        let alpha = self.alpha();
        let risk = self.risk();
        let penalty = self.region().filter(|r| r.kappa > 0.0);
        let num_vars = n + usize::from(penalty.is_some());
        let zero_center = DVector::zeros(n);
        let center = match self {
            ProblemSpec::RobustMaxActiveReturn { benchmark, .. } => benchmark,
            _ => &zero_center,
        };

        let mut blocks = vec![budget_block(n, num_vars), long_only_block(n, num_vars)];
        if let Some(region) = penalty {
            blocks.push(norm_block(&region.sqrt, center, num_vars));
        }

        // minimize -α'w + κ t (+ α'b for active return)
        let mut q = DVector::zeros(num_vars);
        q.rows_mut(0, n).copy_from(&(-alpha));
        if let Some(region) = penalty {
            q[n] = region.kappa;
        }
        let mut objective = QuadObjective {
            p: DMatrix::zeros(num_vars, num_vars),
            q,
            constant: 0.0,
        };

        match self {
            ProblemSpec::ClassicalMaxReturn { risk_budget, .. }
            | ProblemSpec::RobustMaxReturn { risk_budget, .. }
            | ProblemSpec::RobustZeroNetAlpha { risk_budget, .. } => {
                blocks.push(risk_block(risk.root(), center, *risk_budget, num_vars));
            }
            ProblemSpec::RobustMaxActiveReturn {
                benchmark,
                risk_budget,
                ..
            } => {
                blocks.push(risk_block(risk.root(), center, *risk_budget, num_vars));
                objective.constant = alpha.dot(benchmark);
            }
            ProblemSpec::RobustMaxUtility { risk_aversion, .. } => {
                objective
                    .p
                    .view_mut((0, 0), (n, n))
                    .copy_from(&(risk.covariance() * *risk_aversion));
            }
            ProblemSpec::RobustMinRisk { min_return, .. } => {
                objective.q.fill(0.0);
                objective
                    .p
                    .view_mut((0, 0), (n, n))
                    .copy_from(&(risk.covariance() * 2.0));
                // α'w - κ t - r >= 0
                let mut g = DMatrix::zeros(1, num_vars);
                g.view_mut((0, 0), (1, n)).copy_from(&alpha.transpose());
                if let Some(region) = penalty {
                    g[(0, n)] = -region.kappa;
                }
                blocks.push(ConeBlock::new(
                    ConeKind::NonNeg,
                    g,
                    DVector::from_element(1, -min_return),
                ));
            }
        }

        stuff_problem(&objective, &blocks)
    }

    /// Formulate, solve, and extract the optimal weights.
    ///
    /// # Errors
    ///
    /// Formulation errors, or [`FrontierError::Infeasible`],
    /// [`FrontierError::Unbounded`], [`FrontierError::SolverNumericalFailure`]
    /// when the solver does not reach an optimum.
    pub fn solve(&self, settings: &Settings) -> Result<OptimalPortfolio> {
        let stuffed = self.formulate()?;
        let solution = solve(&stuffed, settings)?;
        debug!(
            variant = self.name(),
            status = ?solution.status,
            iterations = solution.iterations,
            "solved portfolio program"
        );
        solution.check()?;

        let (x, value) = match (solution.primal, solution.value) {
            (Some(x), Some(value)) => (x, value),
            _ => {
                return Err(FrontierError::SolverNumericalFailure(
                    "solver reported optimal without a primal solution".into(),
                ))
            }
        };
        let n = self.dim();
        let weights = DVector::from_column_slice(&x[..n]);
        let objective = match self.objective() {
            Objective::Minimize => value,
            Objective::Maximize => -value,
        };

        Ok(OptimalPortfolio {
            weights,
            objective,
            iterations: solution.iterations,
            solve_time: solution.solve_time,
        })
    }

    /// Evaluate this variant's objective at `w`, without checking feasibility.
    pub fn evaluate(&self, w: &DVector<f64>) -> f64 {
        let alpha = self.alpha();
        let penalty = |d: &DVector<f64>| self.region().map_or(0.0, |r| r.penalty(d));
        match self {
            ProblemSpec::ClassicalMaxReturn { .. } => alpha.dot(w),
            ProblemSpec::RobustMaxReturn { .. } | ProblemSpec::RobustZeroNetAlpha { .. } => {
                alpha.dot(w) - penalty(w)
            }
            ProblemSpec::RobustMaxUtility { risk_aversion, .. } => {
                alpha.dot(w) - penalty(w) - 0.5 * risk_aversion * self.risk().variance(w)
            }
            ProblemSpec::RobustMinRisk { .. } => self.risk().variance(w),
            ProblemSpec::RobustMaxActiveReturn { benchmark, .. } => {
                let active = w - benchmark;
                alpha.dot(&active) - penalty(&active)
            }
        }
    }
}

fn non_negative(what: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(FrontierError::InvalidInput(format!(
            "{what} must be finite and non-negative, got {value}"
        )))
    }
}

/// `sum(w) - 1 = 0`.
fn budget_block(n: usize, num_vars: usize) -> ConeBlock {
    let mut g = DMatrix::zeros(1, num_vars);
    g.view_mut((0, 0), (1, n)).fill(1.0);
    ConeBlock::new(ConeKind::Zero, g, DVector::from_element(1, -1.0))
}

/// `w >= 0`.
fn long_only_block(n: usize, num_vars: usize) -> ConeBlock {
    let mut g = DMatrix::zeros(n, num_vars);
    g.view_mut((0, 0), (n, n)).fill_with_identity();
    ConeBlock::new(ConeKind::NonNeg, g, DVector::zeros(n))
}

/// `‖R (w - c)‖ <= sqrt(ν)`, i.e. `(w - c)' Q (w - c) <= ν` with `R = Q^(1/2)`.
fn risk_block(root: &DMatrix<f64>, center: &DVector<f64>, budget: f64, num_vars: usize) -> ConeBlock {
    let n = root.nrows();
    let mut g = DMatrix::zeros(n + 1, num_vars);
    g.view_mut((1, 0), (n, n)).copy_from(root);
    let mut h = DVector::zeros(n + 1);
    h[0] = budget.sqrt();
    h.rows_mut(1, n).copy_from(&(-(root * center)));
    ConeBlock::new(ConeKind::SecondOrder, g, h)
}

/// `‖S (w - c)‖ <= t`, with `t` the last variable.
fn norm_block(sqrt: &DMatrix<f64>, center: &DVector<f64>, num_vars: usize) -> ConeBlock {
    let n = sqrt.nrows();
    let mut g = DMatrix::zeros(n + 1, num_vars);
    g[(0, num_vars - 1)] = 1.0;
    g.view_mut((1, 0), (n, n)).copy_from(sqrt);
    let mut h = DVector::zeros(n + 1);
    h.rows_mut(1, n).copy_from(&(-(sqrt * center)));
    ConeBlock::new(ConeKind::SecondOrder, g, h)
}
