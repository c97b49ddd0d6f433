//! Property tests.
//!
//! Uses proptest to verify:
//! 1. Square roots round-trip: sqrtm(M)² = M for symmetric PD M
//! 2. The zero-net-alpha adjustment annihilates eᵗD
//! 3. Returned weights are long-only and fully invested

use nalgebra::{DMatrix, DVector};
use proptest::prelude::*;
use robust_frontier::calibrate::{sqrtm, zero_net_alpha_adjust};
use robust_frontier::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

/// Symmetric positive definite `n x n` matrix `A Aᵗ + εI`, scaled like a covariance.
fn arb_spd(n: usize) -> impl Strategy<Value = DMatrix<f64>> {
    prop::collection::vec(-1.0..1.0_f64, n * n).prop_map(move |data| {
        let a = DMatrix::from_vec(n, n, data);
        (&a * a.transpose() + DMatrix::identity(n, n) * 0.05) * 0.02
    })
}

fn arb_returns(n: usize) -> impl Strategy<Value = DVector<f64>> {
    prop::collection::vec(0.01..0.2_f64, n).prop_map(DVector::from_vec)
}

// ── 1. Square root round-trip ────────────────────────────────────────

proptest! {
    #[test]
    fn sqrtm_round_trip(m in arb_spd(4)) {
        let root = sqrtm(&m).unwrap();
        let back = &root * &root;
        prop_assert!((back - &m).amax() < 1e-10 * m.amax().max(1.0));
        prop_assert!((&root - root.transpose()).amax() < 1e-12);
    }

    #[test]
    fn zero_net_alpha_annihilates(m in arb_spd(4), d in arb_spd(4)) {
        let adjusted = zero_net_alpha_adjust(&m, &d).unwrap();
        let e = DVector::from_element(4, 1.0);
        let row = (d.transpose() * &e).transpose() * &adjusted;
        prop_assert!(row.amax() < 1e-9 * (d.amax() * m.amax()).max(1.0));
        // subtracting a PSD rank-one term never increases any direction's variance
        let diff = &m - &adjusted;
        prop_assert!(robust_frontier::calibrate::min_eigenvalue(&diff) > -1e-12);
    }
}

// ── 2. Constraint satisfaction ───────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn weights_are_portfolios(
        q in arb_spd(3),
        alpha in arb_returns(3),
        kappa in 0.0..2.0_f64,
        scale in 1.0..4.0_f64,
    ) {
        // any single asset is feasible once ν reaches its variance
        let nu = q.diagonal().max() * scale;
        let risk = RiskModel::new(q.clone()).unwrap();
        let region = ConfidenceRegion::from_uncertainty(kappa, &(&q / 30.0)).unwrap();

        let specs = [
            ProblemSpec::ClassicalMaxReturn {
                alpha: alpha.clone(),
                risk: risk.clone(),
                risk_budget: nu,
            },
            ProblemSpec::RobustMaxReturn {
                alpha: alpha.clone(),
                risk: risk.clone(),
                region: region.clone(),
                risk_budget: nu,
            },
            ProblemSpec::RobustMaxUtility {
                alpha: alpha.clone(),
                risk: risk.clone(),
                region: region.clone(),
                risk_aversion: 3.0,
            },
        ];

        for spec in &specs {
            let portfolio = spec.solve(&Settings::default()).unwrap();
            let w = &portfolio.weights;
            prop_assert!((w.sum() - 1.0).abs() < 1e-6, "{}: sum {}", spec.name(), w.sum());
            prop_assert!(w.min() >= -1e-6, "{}: min {}", spec.name(), w.min());
        }
    }
}
