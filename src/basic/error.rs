use thiserror::Error;

use super::system::BusType;

/// Contract violations in the input bundle or in the bus index sets.
///
/// These are programming or data errors, not runtime conditions; they are
/// returned before any iteration starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("bus {bus} is out of range for an island with {n} buses")]
    OutOfRange { bus: usize, n: usize },
    #[error("bus {bus} appears in both the {first:?} and the {second:?} set")]
    Overlap {
        bus: usize,
        first: BusType,
        second: BusType,
    },
    #[error("bus {bus} is not covered by any index set")]
    Uncovered { bus: usize },
    #[error("{n_p} P buses cannot be paired with {n_pqv} PQV buses")]
    UnpairedRemoteControl { n_p: usize, n_pqv: usize },
    #[error("{what} has length {found}, expected {expected}")]
    Dimension {
        what: &'static str,
        found: usize,
        expected: usize,
    },
    #[error("branch {branch} references bus {bus}, but the network has {n} buses")]
    BranchTerminal { branch: usize, bus: usize, n: usize },
}

/// Errors reported by a sparse linear solver backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("matrix is not square ({nrows}x{ncols})")]
    NotSquare { nrows: usize, ncols: usize },
    #[error("right-hand side has length {found}, expected {expected}")]
    Rhs { found: usize, expected: usize },
    #[error("symbolic analysis failed: {0}")]
    Symbolic(String),
    #[error("numeric factorization failed: {0}")]
    Factorization(String),
    #[error("solution contains non-finite entries")]
    NonFinite,
}

/// Top-level error of a power-flow run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PowerFlowError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("global {kind} index {index} written by more than one island")]
    IndexAliasing { kind: &'static str, index: usize },
}
