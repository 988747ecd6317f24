#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(clippy::all, clippy::cargo, clippy::nursery, missing_docs)]
#![doc = include_str!("../README.md")]

/// Numerical constants and solver defaults.
pub mod constants;
/// Shared scalar, vector and complex matrix aliases plus planar geometry.
pub mod math;
/// Modified Bessel functions and leaky-layer factors of complex argument.
pub mod special;
/// Graded Gauss–Legendre quadrature for line elements.
pub mod quadrature;
/// Layer stacks, couplings and per-frequency eigen decompositions.
pub mod aquifer;
/// Wells, line sinks, leaky walls, area sinks and the element contract.
pub mod elements;
/// Laplace-frequency grids and series helpers.
pub mod sweep;
/// Inversion of Laplace-domain samples to real time.
pub mod inversion;
/// Per-frequency assembly and dense linear solve.
pub mod solver;
/// Model builder and solve driver.
pub mod model;
/// Solved models and their real-time queries.
pub mod solution;
/// Adaptive pathline tracing.
pub mod trace;
/// CSV export of heads and pathlines.
pub mod report;
/// Error types shared between modules.
pub mod errors;

/// Common exports for downstream crates.
pub mod prelude;
