use faer::{
    MatMut,
    linalg::solvers::Solve,
    sparse::{
        SparseColMatRef, SymbolicSparseColMatRef,
        linalg::solvers::{Lu, SymbolicLu},
    },
};
use nalgebra_sparse::{CscMatrix, pattern::SparsityPattern};

use super::{SparseSolver, check_finite, check_rhs, check_square};
use crate::basic::error::SolverError;

/// LU backend built on `faer`'s supernodal sparse LU.
#[derive(Default)]
pub struct FaerSolver {
    symbolic: Option<SymbolicLu<usize>>,
    pattern: Option<SparsityPattern>,
}

/// Numeric LU factors produced by [`FaerSolver`].
pub struct FaerLu {
    lu: Lu<usize, f64>,
    n: usize,
}

impl SparseSolver for FaerSolver {
    type Factorization = FaerLu;

    fn factorize(&mut self, a: &CscMatrix<f64>) -> Result<FaerLu, SolverError> {
        let n = check_square(a)?;
        // nalgebra-sparse keeps row indices sorted and unique within each column
        let s = unsafe {
            SymbolicSparseColMatRef::new_unchecked(n, n, a.col_offsets(), None, a.row_indices())
        };
        let mat = SparseColMatRef::new(s, a.values());
        if self.pattern.as_ref() != Some(a.pattern()) || self.symbolic.is_none() {
            let symbolic =
                SymbolicLu::try_new(s).map_err(|_| SolverError::Symbolic("faer symbolic LU".into()))?;
            self.symbolic = Some(symbolic);
            self.pattern = Some(a.pattern().clone());
        }
        let symbolic = self
            .symbolic
            .clone()
            .ok_or_else(|| SolverError::Symbolic("missing symbolic analysis".into()))?;
        let lu = Lu::try_new_with_symbolic(symbolic, mat)
            .map_err(|_| SolverError::Factorization("faer numeric LU".into()))?;
        Ok(FaerLu { lu, n })
    }

    fn solve(&self, factor: &FaerLu, b: &mut [f64]) -> Result<(), SolverError> {
        let n = factor.n;
        check_rhs(b, n)?;
        factor
            .lu
            .solve_in_place(MatMut::from_column_major_slice_mut(b, n, 1));
        check_finite(b)
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.pattern = None;
    }
}
