use nalgebra_sparse::CscMatrix;

use super::error::SolverError;

#[cfg(feature = "faer")]
mod faer;
#[cfg(feature = "faer")]
pub use faer::*;

#[cfg(feature = "rsparse")]
mod rsparse;
#[cfg(feature = "rsparse")]
pub use rsparse::*;

#[cfg(feature = "faer")]
pub type DefaultSolver = FaerSolver;

#[cfg(all(not(feature = "faer"), feature = "rsparse"))]
pub type DefaultSolver = RSparseSolver;

#[cfg(not(any(feature = "faer", feature = "rsparse")))]
compile_error!("enable at least one sparse LU backend: `rsparse` or `faer`");

/// Sparse LU capability used by the Newton-type solvers.
///
/// A backend splits the work into `factorize` and `solve` so that one
/// factorization can serve several right-hand sides. Backends may cache the
/// symbolic analysis between calls as long as the sparsity pattern does not
/// change; `reset` drops that cache.
pub trait SparseSolver {
    type Factorization;

    /// Factorizes the square matrix `a`.
    fn factorize(&mut self, a: &CscMatrix<f64>) -> Result<Self::Factorization, SolverError>;

    /// Overwrites `b` with the solution of `A x = b`.
    fn solve(&self, factor: &Self::Factorization, b: &mut [f64]) -> Result<(), SolverError>;

    /// Forgets any cached symbolic analysis.
    fn reset(&mut self);

    fn factorize_and_solve(&mut self, a: &CscMatrix<f64>, b: &mut [f64]) -> Result<(), SolverError> {
        let factor = self.factorize(a)?;
        self.solve(&factor, b)
    }
}

pub(crate) fn check_square(a: &CscMatrix<f64>) -> Result<usize, SolverError> {
    if a.nrows() != a.ncols() {
        return Err(SolverError::NotSquare {
            nrows: a.nrows(),
            ncols: a.ncols(),
        });
    }
    Ok(a.nrows())
}

pub(crate) fn check_rhs(b: &[f64], n: usize) -> Result<(), SolverError> {
    if b.len() != n {
        return Err(SolverError::Rhs {
            found: b.len(),
            expected: n,
        });
    }
    Ok(())
}

pub(crate) fn check_finite(x: &[f64]) -> Result<(), SolverError> {
    if x.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SolverError::NonFinite)
    }
}
