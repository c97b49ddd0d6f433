//! Matrix stuffing: converts cone blocks into solver format.
//!
//! This module builds the matrices (P, q, A, b) and cone specifications
//! required by Clarabel:
//!
//! ```text
//! minimize    (1/2) x' P x + q' x
//! subject to  A x + s = b,  s in K
//! ```
//!
//! Each [`ConeBlock`] states that an affine expression `G x + h` lies in a
//! cone. Stuffing sets `A = -G` and `b = h`, so that `s = G x + h`.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;

use crate::error::{FrontierError, Result};
use crate::sparse::{dense_to_csc, upper_triangle_to_csc};

/// Cone dimensions for Clarabel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConeDims {
    /// Number of zero cone (equality) constraints.
    pub zero: usize,
    /// Number of nonnegative cone constraints.
    pub nonneg: usize,
    /// Second-order cone dimensions (each entry is the cone dimension).
    pub soc: Vec<usize>,
}

impl ConeDims {
    /// Total number of constraint rows.
    pub fn total(&self) -> usize {
        self.zero + self.nonneg + self.soc.iter().sum::<usize>()
    }
}

/// The cone an affine block is constrained to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConeKind {
    /// `G x + h = 0`.
    Zero,
    /// `G x + h >= 0` elementwise.
    NonNeg,
    /// `(G x + h)[0] >= ||(G x + h)[1..]||_2`.
    SecondOrder,
}

/// An affine expression `G x + h` constrained to a cone.
#[derive(Debug, Clone)]
pub struct ConeBlock {
    pub kind: ConeKind,
    /// Coefficients, one row per cone entry, one column per variable.
    pub g: DMatrix<f64>,
    /// Constant term.
    pub h: DVector<f64>,
}

impl ConeBlock {
    pub fn new(kind: ConeKind, g: DMatrix<f64>, h: DVector<f64>) -> Self {
        ConeBlock { kind, g, h }
    }

    /// Number of rows.
    pub fn size(&self) -> usize {
        self.h.len()
    }
}

/// Quadratic objective `x' P x / 2 + q' x + constant`, always minimized.
#[derive(Debug, Clone)]
pub struct QuadObjective {
    /// Full symmetric quadratic cost (both triangles).
    pub p: DMatrix<f64>,
    pub q: DVector<f64>,
    pub constant: f64,
}

impl QuadObjective {
    /// A purely linear objective.
    pub fn linear(q: DVector<f64>) -> Self {
        let n = q.len();
        QuadObjective {
            p: DMatrix::zeros(n, n),
            q,
            constant: 0.0,
        }
    }
}

/// Stuffed problem ready for Clarabel.
#[derive(Debug, Clone)]
pub struct StuffedProblem {
    /// Quadratic cost matrix P (n x n, upper triangle).
    pub p: CscMatrix<f64>,
    /// Linear cost vector q (n).
    pub q: Vec<f64>,
    /// Constraint matrix A (m x n).
    pub a: CscMatrix<f64>,
    /// Constraint vector b (m).
    pub b: Vec<f64>,
    /// Cone dimensions.
    pub cone_dims: ConeDims,
    /// Total number of optimization variables.
    pub num_vars: usize,
    /// Constant offset in objective.
    pub objective_offset: f64,
}

/// Build the stuffed problem from an objective and cone blocks.
///
/// Blocks are reordered by cone kind (zero, nonnegative, second-order) as
/// Clarabel expects; the relative order within a kind is kept.
pub fn stuff_problem(objective: &QuadObjective, blocks: &[ConeBlock]) -> Result<StuffedProblem> {
    let n = objective.q.len();
    if objective.p.shape() != (n, n) {
        return Err(FrontierError::shape(
            format!("{n}x{n} quadratic cost"),
            format!("{}x{}", objective.p.nrows(), objective.p.ncols()),
        ));
    }
    for block in blocks {
        if block.g.ncols() != n || block.g.nrows() != block.h.len() {
            return Err(FrontierError::shape(
                format!("{}x{n} cone block", block.h.len()),
                format!("{}x{}", block.g.nrows(), block.g.ncols()),
            ));
        }
    }

    let zeros: Vec<&ConeBlock> = blocks.iter().filter(|b| b.kind == ConeKind::Zero).collect();
    let nonnegs: Vec<&ConeBlock> = blocks.iter().filter(|b| b.kind == ConeKind::NonNeg).collect();
    let socs: Vec<&ConeBlock> = blocks
        .iter()
        .filter(|b| b.kind == ConeKind::SecondOrder)
        .collect();

    let cone_dims = ConeDims {
        zero: zeros.iter().map(|b| b.size()).sum(),
        nonneg: nonnegs.iter().map(|b| b.size()).sum(),
        soc: socs.iter().map(|b| b.size()).collect(),
    };

    let total_rows = cone_dims.total();
    let mut a = DMatrix::zeros(total_rows, n);
    let mut b = vec![0.0; total_rows];

    let mut row_offset = 0;
    for block in zeros.into_iter().chain(nonnegs).chain(socs) {
        let rows = block.size();
        a.view_mut((row_offset, 0), (rows, n)).copy_from(&(-&block.g));
        b[row_offset..row_offset + rows].copy_from_slice(block.h.as_slice());
        row_offset += rows;
    }

    let a = dense_to_csc(&a);
    let p = upper_triangle_to_csc(&objective.p);

    Ok(StuffedProblem {
        p,
        q: objective.q.iter().copied().collect(),
        a,
        b,
        cone_dims,
        num_vars: n,
        objective_offset: objective.constant,
    })
}
