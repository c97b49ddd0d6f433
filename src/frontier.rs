//! Monte Carlo frontier sweep.
//!
//! For a grid of risk budgets the sweep computes:
//!
//! - the **true** frontier, from the true mean and covariance;
//! - per trial, the classical portfolio built from a fresh estimate, scored
//!   against the estimated mean (**estimated**) and the true mean
//!   (**realized**);
//! - per trial, the robust portfolio, scored the same way (**robust
//!   estimated**, **robust realized**), together with the optimal value of
//!   the robust program itself (**robust objective**), the worst-case return
//!   over the confidence region.
//!
//! Trial series are averaged grid point by grid point. A grid point where
//! the solver failed in some trial is averaged over the remaining trials;
//! a grid point that failed in every trial is left out of the series.

use nalgebra::DVector;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::calibrate::ConfidenceRegion;
use crate::config::{SweepConfig, SweepVariant, TrialFailurePolicy};
use crate::error::{FrontierError, Result};
use crate::estimate::{Estimate, TrueDistribution};
use crate::problem::{OptimalPortfolio, ProblemSpec, RiskModel};
use crate::solver::Settings;

/// One point of a frontier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrontierPoint {
    pub risk_budget: f64,
    pub optimal_return: f64,
    pub weights: Vec<f64>,
}

impl FrontierPoint {
    fn new(risk_budget: f64, optimal_return: f64, weights: &DVector<f64>) -> Self {
        FrontierPoint {
            risk_budget,
            optimal_return,
            weights: weights.iter().copied().collect(),
        }
    }
}

/// Points ordered by increasing risk budget.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frontier {
    pub points: Vec<FrontierPoint>,
}

impl Frontier {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn risk_budgets(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.risk_budget).collect()
    }

    pub fn returns(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.optimal_return).collect()
    }

    /// The point at exactly this risk budget, if present.
    pub fn at(&self, risk_budget: f64) -> Option<&FrontierPoint> {
        self.points.iter().find(|p| p.risk_budget == risk_budget)
    }
}

/// Which program a recorded failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Program {
    True,
    Classical,
    Robust,
}

/// A solver failure at one grid point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointFailure {
    /// `None` for the true frontier.
    pub trial: Option<usize>,
    pub program: Program,
    pub risk_budget: f64,
    #[serde(serialize_with = "display")]
    pub error: FrontierError,
}

/// A trial abandoned because sampling or calibration failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialFailure {
    pub trial: usize,
    #[serde(serialize_with = "display")]
    pub error: FrontierError,
}

fn display<S: Serializer>(error: &FrontierError, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(error)
}

/// Per-grid-point results of one trial. `None` marks a solver failure.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialFrontiers {
    pub trial: usize,
    pub estimated: Vec<Option<FrontierPoint>>,
    pub realized: Vec<Option<FrontierPoint>>,
    pub robust_estimated: Vec<Option<FrontierPoint>>,
    pub robust_realized: Vec<Option<FrontierPoint>>,
    pub robust_objective: Vec<Option<FrontierPoint>>,
    pub failures: Vec<PointFailure>,
}

/// Running sums for one grid point.
#[derive(Debug, Clone, Default, PartialEq)]
struct PointSum {
    returns: f64,
    weights: Vec<f64>,
    count: usize,
}

impl PointSum {
    fn add(&mut self, point: &FrontierPoint) {
        if self.weights.is_empty() {
            self.weights = vec![0.0; point.weights.len()];
        }
        self.returns += point.optimal_return;
        for (acc, w) in self.weights.iter_mut().zip(&point.weights) {
            *acc += w;
        }
        self.count += 1;
    }

    fn merge(&mut self, other: &PointSum) {
        if other.count == 0 {
            return;
        }
        if self.weights.is_empty() {
            self.weights = vec![0.0; other.weights.len()];
        }
        self.returns += other.returns;
        for (acc, w) in self.weights.iter_mut().zip(&other.weights) {
            *acc += w;
        }
        self.count += other.count;
    }
}

/// Sums of one series across trials.
#[derive(Debug, Clone, PartialEq)]
struct SeriesSums(Vec<PointSum>);

impl SeriesSums {
    fn new(len: usize) -> Self {
        SeriesSums(vec![PointSum::default(); len])
    }

    fn add(&mut self, points: &[Option<FrontierPoint>]) {
        for (sum, point) in self.0.iter_mut().zip(points) {
            if let Some(point) = point {
                sum.add(point);
            }
        }
    }

    fn merge(&mut self, other: &SeriesSums) {
        for (sum, o) in self.0.iter_mut().zip(&other.0) {
            sum.merge(o);
        }
    }

    fn average(&self, grid: &[f64]) -> Frontier {
        let points = self
            .0
            .iter()
            .zip(grid)
            .filter(|(sum, _)| sum.count > 0)
            .map(|(sum, &risk_budget)| {
                let n = sum.count as f64;
                FrontierPoint {
                    risk_budget,
                    optimal_return: sum.returns / n,
                    weights: sum.weights.iter().map(|w| w / n).collect(),
                }
            })
            .collect();
        Frontier { points }
    }
}

/// Averaged trial series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AveragedFrontiers {
    pub estimated: Frontier,
    pub realized: Frontier,
    pub robust_estimated: Frontier,
    pub robust_realized: Frontier,
    pub robust_objective: Frontier,
}

/// Grid-point-wise averages of the trial series.
///
/// Accumulators combine with [`merge`](Self::merge), which is associative,
/// so trial results can be reduced in any grouping. The sweep reduces them
/// in trial order to keep floating-point sums reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierAccumulator {
    estimated: SeriesSums,
    realized: SeriesSums,
    robust_estimated: SeriesSums,
    robust_realized: SeriesSums,
    robust_objective: SeriesSums,
    trials: usize,
}

impl FrontierAccumulator {
    /// An empty accumulator for a grid of `len` points.
    pub fn new(len: usize) -> Self {
        FrontierAccumulator {
            estimated: SeriesSums::new(len),
            realized: SeriesSums::new(len),
            robust_estimated: SeriesSums::new(len),
            robust_realized: SeriesSums::new(len),
            robust_objective: SeriesSums::new(len),
            trials: 0,
        }
    }

    /// An accumulator holding a single trial.
    pub fn from_trial(len: usize, trial: &TrialFrontiers) -> Self {
        let mut acc = FrontierAccumulator::new(len);
        acc.estimated.add(&trial.estimated);
        acc.realized.add(&trial.realized);
        acc.robust_estimated.add(&trial.robust_estimated);
        acc.robust_realized.add(&trial.robust_realized);
        acc.robust_objective.add(&trial.robust_objective);
        acc.trials = 1;
        acc
    }

    pub fn merge(mut self, other: FrontierAccumulator) -> Self {
        self.estimated.merge(&other.estimated);
        self.realized.merge(&other.realized);
        self.robust_estimated.merge(&other.robust_estimated);
        self.robust_realized.merge(&other.robust_realized);
        self.robust_objective.merge(&other.robust_objective);
        self.trials += other.trials;
        self
    }

    /// Number of trials accumulated.
    pub fn trials(&self) -> usize {
        self.trials
    }

    pub fn average(&self, grid: &[f64]) -> AveragedFrontiers {
        AveragedFrontiers {
            estimated: self.estimated.average(grid),
            realized: self.realized.average(grid),
            robust_estimated: self.robust_estimated.average(grid),
            robust_realized: self.robust_realized.average(grid),
            robust_objective: self.robust_objective.average(grid),
        }
    }
}

/// Output of a sweep, ready for an external plotting tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub risk_budgets: Vec<f64>,
    pub true_frontier: Frontier,
    pub estimated: Frontier,
    pub realized: Frontier,
    pub robust_estimated: Frontier,
    pub robust_realized: Frontier,
    /// Averaged optimal value of the robust program.
    pub robust_objective: Frontier,
    pub trials_completed: usize,
    pub point_failures: Vec<PointFailure>,
    pub trial_failures: Vec<TrialFailure>,
}

/// Trace one deterministic frontier.
///
/// `spec` builds the program for a risk budget. Solver failures are
/// returned alongside the frontier and their grid points are skipped;
/// any other error aborts the trace.
pub fn trace_frontier<F>(
    grid: &[f64],
    settings: &Settings,
    spec: F,
) -> Result<(Frontier, Vec<(f64, FrontierError)>)>
where
    F: Fn(f64) -> ProblemSpec,
{
    let mut points = Vec::with_capacity(grid.len());
    let mut failures = Vec::new();
    for &nu in grid {
        match spec(nu).solve(settings) {
            Ok(portfolio) => points.push(FrontierPoint::new(nu, portfolio.objective, &portfolio.weights)),
            Err(e) if e.is_solver_failure() => failures.push((nu, e)),
            Err(e) => return Err(e),
        }
    }
    Ok((Frontier { points }, failures))
}

/// Monte Carlo comparison of classical and robust frontiers.
#[derive(Debug, Clone)]
pub struct FrontierSweep {
    truth: TrueDistribution,
    risk: RiskModel,
    config: SweepConfig,
}

impl FrontierSweep {
    /// Validate the configuration against the true distribution.
    pub fn new(truth: TrueDistribution, config: SweepConfig) -> Result<Self> {
        config.validate()?;
        if let SweepVariant::MaxActiveReturn { benchmark } = &config.variant {
            if benchmark.len() != truth.dim() {
                return Err(FrontierError::shape(
                    format!("{} benchmark weights", truth.dim()),
                    benchmark.len(),
                ));
            }
        }
        let risk = RiskModel::new(truth.covariance().clone())?;
        Ok(FrontierSweep {
            truth,
            risk,
            config,
        })
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run the true frontier and all trials.
    pub fn run(&self) -> Result<SweepReport> {
        let grid = &self.config.risk_budgets;
        info!(
            assets = self.truth.dim(),
            grid_points = grid.len(),
            trials = self.config.trials,
            samples = self.config.samples,
            parallel = self.config.parallel,
            "starting frontier sweep"
        );

        let (true_frontier, mut point_failures) = self.true_frontier()?;

        let results: Vec<Result<TrialFrontiers>> = if self.config.parallel {
            (0..self.config.trials)
                .into_par_iter()
                .map(|t| self.run_trial(t))
                .collect()
        } else {
            (0..self.config.trials).map(|t| self.run_trial(t)).collect()
        };

        let mut trial_failures = Vec::new();
        let mut acc = FrontierAccumulator::new(grid.len());
        for (trial, result) in results.into_iter().enumerate() {
            match result {
                Ok(frontiers) => {
                    acc = acc.merge(FrontierAccumulator::from_trial(grid.len(), &frontiers));
                    point_failures.extend(frontiers.failures);
                }
                Err(error) => match self.config.on_trial_error {
                    TrialFailurePolicy::Abort => return Err(error),
                    TrialFailurePolicy::Skip => {
                        warn!(trial, %error, "skipping trial");
                        trial_failures.push(TrialFailure { trial, error });
                    }
                },
            }
        }

        let averaged = acc.average(grid);
        info!(
            trials_completed = acc.trials(),
            point_failures = point_failures.len(),
            trial_failures = trial_failures.len(),
            "frontier sweep finished"
        );

        Ok(SweepReport {
            risk_budgets: grid.clone(),
            true_frontier,
            estimated: averaged.estimated,
            realized: averaged.realized,
            robust_estimated: averaged.robust_estimated,
            robust_realized: averaged.robust_realized,
            robust_objective: averaged.robust_objective,
            trials_completed: acc.trials(),
            point_failures,
            trial_failures,
        })
    }

    /// Classical frontier of the true distribution.
    pub fn true_frontier(&self) -> Result<(Frontier, Vec<PointFailure>)> {
        let (frontier, failures) =
            trace_frontier(&self.config.risk_budgets, &self.config.solver, |nu| {
                ProblemSpec::ClassicalMaxReturn {
                    alpha: self.truth.mean().clone(),
                    risk: self.risk.clone(),
                    risk_budget: nu,
                }
            })?;
        let failures = failures
            .into_iter()
            .map(|(risk_budget, error)| {
                warn!(risk_budget, %error, "true frontier point failed");
                PointFailure {
                    trial: None,
                    program: Program::True,
                    risk_budget,
                    error,
                }
            })
            .collect();
        Ok((frontier, failures))
    }

    /// Run one trial: sample, calibrate, and solve both programs at each grid point.
    pub fn run_trial(&self, trial: usize) -> Result<TrialFrontiers> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        rng.set_stream(trial as u64);

        let estimate = self
            .truth
            .sample(self.config.samples, self.config.uncertainty, &mut rng)?;
        let region = self.robust_region(&estimate)?;
        debug!(trial, samples = estimate.samples, "sampled estimate");

        let grid = &self.config.risk_budgets;
        let mu = self.truth.mean();
        let alpha = &estimate.mean;
        let mut frontiers = TrialFrontiers {
            trial,
            estimated: vec![None; grid.len()],
            realized: vec![None; grid.len()],
            robust_estimated: vec![None; grid.len()],
            robust_realized: vec![None; grid.len()],
            robust_objective: vec![None; grid.len()],
            failures: Vec::new(),
        };

        for (i, &nu) in grid.iter().enumerate() {
            let classical = ProblemSpec::ClassicalMaxReturn {
                alpha: alpha.clone(),
                risk: self.risk.clone(),
                risk_budget: nu,
            };
            if let Some(p) = self.solve_point(&classical, trial, Program::Classical, nu, &mut frontiers.failures)? {
                frontiers.estimated[i] = Some(FrontierPoint::new(nu, p.expected_return(alpha), &p.weights));
                frontiers.realized[i] = Some(FrontierPoint::new(nu, p.expected_return(mu), &p.weights));
            }

            let robust = self.robust_spec(alpha, &region, nu);
            if let Some(p) = self.solve_point(&robust, trial, Program::Robust, nu, &mut frontiers.failures)? {
                frontiers.robust_estimated[i] =
                    Some(FrontierPoint::new(nu, p.expected_return(alpha), &p.weights));
                frontiers.robust_realized[i] =
                    Some(FrontierPoint::new(nu, p.expected_return(mu), &p.weights));
                frontiers.robust_objective[i] = Some(FrontierPoint::new(nu, p.objective, &p.weights));
            }
        }

        Ok(frontiers)
    }

    fn robust_region(&self, estimate: &Estimate) -> Result<ConfidenceRegion> {
        let kappa = self.config.kappa;
        match &self.config.variant {
            SweepVariant::MaxReturn | SweepVariant::MaxActiveReturn { .. } => {
                ConfidenceRegion::from_uncertainty(kappa, &estimate.uncertainty)
            }
            SweepVariant::ZeroNetAlpha { calibration } => {
                let d = calibration.resolve(&estimate.uncertainty)?;
                ConfidenceRegion::zero_net_alpha(kappa, &estimate.uncertainty, &d)
            }
        }
    }

    fn robust_spec(&self, alpha: &DVector<f64>, region: &ConfidenceRegion, nu: f64) -> ProblemSpec {
        let alpha = alpha.clone();
        let risk = self.risk.clone();
        let region = region.clone();
        match &self.config.variant {
            SweepVariant::MaxReturn => ProblemSpec::RobustMaxReturn {
                alpha,
                risk,
                region,
                risk_budget: nu,
            },
            SweepVariant::ZeroNetAlpha { .. } => ProblemSpec::RobustZeroNetAlpha {
                alpha,
                risk,
                region,
                risk_budget: nu,
            },
            SweepVariant::MaxActiveReturn { benchmark } => ProblemSpec::RobustMaxActiveReturn {
                alpha,
                risk,
                region,
                benchmark: DVector::from_column_slice(benchmark),
                risk_budget: nu,
            },
        }
    }

    /// Solve one program; record solver failures instead of propagating them.
    fn solve_point(
        &self,
        spec: &ProblemSpec,
        trial: usize,
        program: Program,
        risk_budget: f64,
        failures: &mut Vec<PointFailure>,
    ) -> Result<Option<OptimalPortfolio>> {
        match spec.solve(&self.config.solver) {
            Ok(portfolio) => Ok(Some(portfolio)),
            Err(error) if error.is_solver_failure() => {
                warn!(trial, ?program, risk_budget, %error, "grid point failed");
                failures.push(PointFailure {
                    trial: Some(trial),
                    program,
                    risk_budget,
                    error,
                });
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(nu: f64, r: f64, w: &[f64]) -> Option<FrontierPoint> {
        Some(FrontierPoint {
            risk_budget: nu,
            optimal_return: r,
            weights: w.to_vec(),
        })
    }

    fn trial(t: usize, a: Option<FrontierPoint>, b: Option<FrontierPoint>) -> TrialFrontiers {
        TrialFrontiers {
            trial: t,
            estimated: vec![a.clone(), b.clone()],
            realized: vec![a.clone(), b.clone()],
            robust_estimated: vec![a.clone(), b.clone()],
            robust_realized: vec![a.clone(), b.clone()],
            robust_objective: vec![a, b],
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_average_is_pointwise() {
        let t0 = trial(0, point(0.1, 1.0, &[1.0, 0.0]), point(0.2, 3.0, &[0.0, 1.0]));
        let t1 = trial(1, point(0.1, 2.0, &[0.0, 1.0]), point(0.2, 5.0, &[0.0, 1.0]));
        let acc = FrontierAccumulator::from_trial(2, &t0).merge(FrontierAccumulator::from_trial(2, &t1));
        let estimated = acc.average(&[0.1, 0.2]).estimated;
        assert_eq!(estimated.returns(), vec![1.5, 4.0]);
        assert_eq!(estimated.points[0].weights, vec![0.5, 0.5]);
        assert_eq!(acc.trials(), 2);
    }

    #[test]
    fn test_missing_points_are_excluded() {
        let t0 = trial(0, None, point(0.2, 3.0, &[1.0]));
        let t1 = trial(1, None, point(0.2, 5.0, &[1.0]));
        let t2 = trial(2, point(0.1, 9.0, &[1.0]), None);
        let acc = [t0, t1, t2]
            .iter()
            .fold(FrontierAccumulator::new(2), |acc, t| {
                acc.merge(FrontierAccumulator::from_trial(2, t))
            });
        let estimated = acc.average(&[0.1, 0.2]).estimated;
        // each point averages only the trials that produced it
        assert_eq!(estimated.returns(), vec![9.0, 4.0]);

        let all_missing = FrontierAccumulator::from_trial(2, &trial(0, None, point(0.2, 1.0, &[1.0])));
        let estimated = all_missing.average(&[0.1, 0.2]).estimated;
        assert_eq!(estimated.len(), 1);
        assert_eq!(estimated.risk_budgets(), vec![0.2]);
    }

    #[test]
    fn test_merge_is_associative() {
        let ts: Vec<_> = (0..3)
            .map(|t| trial(t, point(0.1, t as f64, &[1.0]), point(0.2, 2.0 * t as f64, &[1.0])))
            .collect();
        let single = |t: &TrialFrontiers| FrontierAccumulator::from_trial(2, t);
        let left = single(&ts[0]).merge(single(&ts[1])).merge(single(&ts[2]));
        let right = single(&ts[0]).merge(single(&ts[1]).merge(single(&ts[2])));
        assert_eq!(left.average(&[0.1, 0.2]), right.average(&[0.1, 0.2]));
    }

    #[test]
    fn test_frontier_accessors() {
        let frontier = Frontier {
            points: vec![
                FrontierPoint::new(0.01, 0.05, &DVector::from_vec(vec![1.0])),
                FrontierPoint::new(0.02, 0.07, &DVector::from_vec(vec![1.0])),
            ],
        };
        assert_eq!(frontier.risk_budgets(), vec![0.01, 0.02]);
        assert_eq!(frontier.at(0.02).map(|p| p.optimal_return), Some(0.07));
        assert!(frontier.at(0.03).is_none());
    }
}
