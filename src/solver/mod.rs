//! Solver interface.
//!
//! This module provides:
//! - Matrix stuffing to convert cone blocks to solver format
//! - Clarabel solver integration

pub mod clarabel;
pub mod stuffing;

pub use self::clarabel::{solve, Settings, Solution, SolveStatus};
pub use stuffing::{stuff_problem, ConeBlock, ConeDims, ConeKind, QuadObjective, StuffedProblem};
