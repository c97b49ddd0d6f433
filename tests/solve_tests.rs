//! Solve tests for the six portfolio formulations.
//!
//! Test cases are defined as data and run programmatically.

use nalgebra::{DMatrix, DVector};
use robust_frontier::calibrate::zero_net_alpha_adjust;
use robust_frontier::prelude::*;

/// Tolerance for comparing floating point results
const TOL: f64 = 1e-5;

fn mu3() -> DVector<f64> {
    DVector::from_vec(vec![0.08, 0.12, 0.15])
}

#[rustfmt::skip]
fn q3() -> DMatrix<f64> {
    DMatrix::from_row_slice(3, 3, &[
        0.0100, 0.0030, 0.0015,
        0.0030, 0.0400, 0.0120,
        0.0015, 0.0120, 0.0900,
    ])
}

fn risk3() -> RiskModel {
    RiskModel::new(q3()).unwrap()
}

fn sigma3() -> DMatrix<f64> {
    q3() / 20.0
}

fn region3(kappa: f64) -> ConfidenceRegion {
    ConfidenceRegion::from_uncertainty(kappa, &sigma3()).unwrap()
}

/// A test case definition
struct TestCase {
    name: &'static str,
    build: fn() -> ProblemSpec,
}

fn six_variants() -> Vec<TestCase> {
    vec![
        TestCase {
            name: "classical_max_return",
            build: || ProblemSpec::ClassicalMaxReturn {
                alpha: mu3(),
                risk: risk3(),
                risk_budget: 0.03,
            },
        },
        TestCase {
            name: "robust_max_return",
            build: || ProblemSpec::RobustMaxReturn {
                alpha: mu3(),
                risk: risk3(),
                region: region3(1.0),
                risk_budget: 0.03,
            },
        },
        TestCase {
            name: "robust_max_utility",
            build: || ProblemSpec::RobustMaxUtility {
                alpha: mu3(),
                risk: risk3(),
                region: region3(1.0),
                risk_aversion: 5.0,
            },
        },
        TestCase {
            name: "robust_min_risk",
            build: || ProblemSpec::RobustMinRisk {
                alpha: mu3(),
                risk: risk3(),
                region: region3(1.0),
                min_return: 0.08,
            },
        },
        TestCase {
            name: "robust_max_active_return",
            build: || ProblemSpec::RobustMaxActiveReturn {
                alpha: mu3(),
                risk: risk3(),
                region: region3(1.0),
                benchmark: DVector::from_element(3, 1.0 / 3.0),
                risk_budget: 0.01,
            },
        },
        TestCase {
            name: "robust_zero_net_alpha",
            build: || ProblemSpec::RobustZeroNetAlpha {
                alpha: mu3(),
                risk: risk3(),
                region: ConfidenceRegion::zero_net_alpha(1.0, &sigma3(), &DMatrix::identity(3, 3))
                    .unwrap(),
                risk_budget: 0.03,
            },
        },
    ]
}

#[test]
fn test_constraint_satisfaction() {
    let settings = Settings::default();
    for case in six_variants() {
        let spec = (case.build)();
        let portfolio = spec
            .solve(&settings)
            .unwrap_or_else(|e| panic!("{}: solve failed: {e}", case.name));
        let w = &portfolio.weights;

        assert_eq!(w.len(), 3, "{}: weight length", case.name);
        assert!(
            (w.sum() - 1.0).abs() < TOL,
            "{}: weights sum to {}",
            case.name,
            w.sum()
        );
        assert!(w.min() >= -TOL, "{}: negative weight {}", case.name, w.min());
        assert!(
            (spec.evaluate(w) - portfolio.objective).abs() < TOL,
            "{}: objective {} vs evaluated {}",
            case.name,
            portfolio.objective,
            spec.evaluate(w)
        );

        match &spec {
            ProblemSpec::ClassicalMaxReturn { risk_budget, .. }
            | ProblemSpec::RobustMaxReturn { risk_budget, .. }
            | ProblemSpec::RobustZeroNetAlpha { risk_budget, .. } => {
                assert!(spec.risk().variance(w) <= risk_budget + TOL, "{}", case.name);
            }
            ProblemSpec::RobustMaxActiveReturn {
                benchmark,
                risk_budget,
                ..
            } => {
                let active = w - benchmark;
                assert!(spec.risk().variance(&active) <= risk_budget + TOL, "{}", case.name);
            }
            ProblemSpec::RobustMinRisk { min_return, .. } => {
                let region = spec.region().unwrap();
                let worst = spec.alpha().dot(w) - region.penalty(w);
                assert!(worst >= min_return - TOL, "{}: worst-case return {worst}", case.name);
            }
            ProblemSpec::RobustMaxUtility { .. } => {}
        }
    }
}

#[test]
fn test_two_asset_closed_form_kappa_zero() {
    // max 0.10 w + 0.05 (1 - w) s.t. 0.04 w² + 0.01 (1 - w)² <= 0.02
    // the return is increasing in w, so the variance cap binds:
    // 0.05 w² - 0.02 w - 0.01 = 0  =>  w = (0.02 + sqrt(0.0024)) / 0.1
    let alpha = DVector::from_vec(vec![0.10, 0.05]);
    let risk = RiskModel::new(DMatrix::from_diagonal(&DVector::from_vec(vec![0.04, 0.01]))).unwrap();
    let region = ConfidenceRegion::from_uncertainty(0.0, &DMatrix::identity(2, 2)).unwrap();

    let classical = ProblemSpec::ClassicalMaxReturn {
        alpha: alpha.clone(),
        risk: risk.clone(),
        risk_budget: 0.02,
    }
    .solve(&Settings::default())
    .unwrap();
    let robust = ProblemSpec::RobustMaxReturn {
        alpha,
        risk,
        region,
        risk_budget: 0.02,
    }
    .solve(&Settings::default())
    .unwrap();

    let w1 = (0.02 + 0.0024_f64.sqrt()) / 0.1;
    for portfolio in [&classical, &robust] {
        assert!((portfolio.weights[0] - w1).abs() < TOL);
        assert!((portfolio.weights[1] - (1.0 - w1)).abs() < TOL);
        assert!((portfolio.objective - (0.05 + 0.05 * w1)).abs() < TOL);
    }
}

#[test]
fn test_infeasible_risk_budget() {
    // minimum long-only variance of diag(0.04, 0.01) is 0.008
    let spec = ProblemSpec::ClassicalMaxReturn {
        alpha: DVector::from_vec(vec![0.10, 0.05]),
        risk: RiskModel::new(DMatrix::from_diagonal(&DVector::from_vec(vec![0.04, 0.01]))).unwrap(),
        risk_budget: 0.004,
    };
    assert_eq!(spec.solve(&Settings::default()), Err(FrontierError::Infeasible));
}

#[test]
fn test_infeasible_min_return() {
    // no long-only portfolio earns more than the best asset
    let spec = ProblemSpec::RobustMinRisk {
        alpha: mu3(),
        risk: risk3(),
        region: region3(1.0),
        min_return: 0.2,
    };
    assert_eq!(spec.solve(&Settings::default()), Err(FrontierError::Infeasible));
}

#[test]
fn test_classical_frontier_is_monotone() {
    let grid = SweepConfig::linear_grid(0.009, 0.09, 10);
    let (frontier, failures) = trace_frontier(&grid, &Settings::default(), |nu| {
        ProblemSpec::ClassicalMaxReturn {
            alpha: mu3(),
            risk: risk3(),
            risk_budget: nu,
        }
    })
    .unwrap();

    assert!(failures.is_empty());
    assert_eq!(frontier.len(), grid.len());
    for pair in frontier.returns().windows(2) {
        assert!(pair[1] >= pair[0] - 1e-7, "frontier decreased: {pair:?}");
    }
    // at the largest budget everything goes into the best asset
    let last = frontier.points.last().unwrap();
    assert!((last.optimal_return - 0.15).abs() < 1e-4);
}

#[test]
fn test_robust_below_classical() {
    let settings = Settings::default();
    for nu in [0.01, 0.02, 0.04, 0.08] {
        let classical = ProblemSpec::ClassicalMaxReturn {
            alpha: mu3(),
            risk: risk3(),
            risk_budget: nu,
        }
        .solve(&settings)
        .unwrap();
        let robust = ProblemSpec::RobustMaxReturn {
            alpha: mu3(),
            risk: risk3(),
            region: region3(1.0),
            risk_budget: nu,
        }
        .solve(&settings)
        .unwrap();

        assert!(
            robust.objective < classical.objective,
            "nu = {nu}: robust {} vs classical {}",
            robust.objective,
            classical.objective
        );
    }
}

#[test]
fn test_zero_sigma_matches_classical() {
    let settings = Settings::default();
    let classical = ProblemSpec::ClassicalMaxReturn {
        alpha: mu3(),
        risk: risk3(),
        risk_budget: 0.03,
    }
    .solve(&settings)
    .unwrap();
    let robust = ProblemSpec::RobustMaxReturn {
        alpha: mu3(),
        risk: risk3(),
        region: ConfidenceRegion::from_uncertainty(1.0, &DMatrix::zeros(3, 3)).unwrap(),
        risk_budget: 0.03,
    }
    .solve(&settings)
    .unwrap();
    assert!((robust.objective - classical.objective).abs() < TOL);
}

#[test]
fn test_zero_net_alpha_shift_at_optimum() {
    let sigma = sigma3();
    let d = Calibration::InverseCovariance.resolve(&sigma).unwrap();

    // reference: Σ - Σ Dᵗ e eᵗ D Σ / (eᵗ D Σ Dᵗ e), written out with the ones matrix
    let ones = DMatrix::from_element(3, 3, 1.0);
    let e = DVector::from_element(3, 1.0);
    let denom = (e.transpose() * &d * &sigma * d.transpose() * &e)[(0, 0)];
    let reference = &sigma - &sigma * d.transpose() * &ones * &d * &sigma / denom;
    let adjusted = zero_net_alpha_adjust(&sigma, &d).unwrap();
    assert!((&adjusted - &reference).amax() < 1e-12);

    let region = ConfidenceRegion::zero_net_alpha(1.0, &sigma, &d).unwrap();
    let spec = ProblemSpec::RobustZeroNetAlpha {
        alpha: mu3(),
        risk: risk3(),
        region: region.clone(),
        risk_budget: 0.03,
    };
    let portfolio = spec.solve(&Settings::default()).unwrap();
    let shift = region.worst_case_shift(&portfolio.weights);
    let net = (e.transpose() * &d * &shift)[(0, 0)];
    assert!(net.abs() < 1e-6, "net alpha shift {net}");
    assert!(shift.amax() > 0.0);
}

#[test]
fn test_zero_net_alpha_less_pessimistic() {
    let settings = Settings::default();
    let robust = ProblemSpec::RobustMaxReturn {
        alpha: mu3(),
        risk: risk3(),
        region: region3(1.0),
        risk_budget: 0.03,
    }
    .solve(&settings)
    .unwrap();
    let zero_net = ProblemSpec::RobustZeroNetAlpha {
        alpha: mu3(),
        risk: risk3(),
        region: ConfidenceRegion::zero_net_alpha(1.0, &sigma3(), &DMatrix::identity(3, 3)).unwrap(),
        risk_budget: 0.03,
    }
    .solve(&settings)
    .unwrap();
    assert!(zero_net.objective >= robust.objective - TOL);
}

#[test]
fn test_active_return_at_benchmark() {
    // with a zero tracking budget the only feasible portfolio is the benchmark
    let benchmark = DVector::from_vec(vec![0.5, 0.3, 0.2]);
    let spec = ProblemSpec::RobustMaxActiveReturn {
        alpha: mu3(),
        risk: risk3(),
        region: region3(1.0),
        benchmark: benchmark.clone(),
        risk_budget: 1e-6,
    };
    let portfolio = spec.solve(&Settings::default()).unwrap();
    assert!((&portfolio.weights - &benchmark).amax() < 2e-2);
    assert!(portfolio.objective.abs() < 1e-2);
}

#[test]
fn test_utility_risk_aversion_reduces_variance() {
    let settings = Settings::default();
    let variance = |p: f64| {
        let spec = ProblemSpec::RobustMaxUtility {
            alpha: mu3(),
            risk: risk3(),
            region: region3(1.0),
            risk_aversion: p,
        };
        let portfolio = spec.solve(&settings).unwrap();
        spec.risk().variance(&portfolio.weights)
    };
    assert!(variance(20.0) <= variance(1.0) + TOL);
}
