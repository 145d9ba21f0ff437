use nalgebra_sparse::{CscMatrix, pattern::SparsityPattern};
use rsparse::{
    data::{Numeric, Sprs, Symb},
    lsolve, lu, sqr, usolve,
};

use super::{SparseSolver, check_finite, check_rhs, check_square};
use crate::basic::error::SolverError;

/// LU backend built on the pure-Rust `rsparse` crate.
///
/// The fill-reducing ordering (`sqr`) is recomputed only when the sparsity
/// pattern of the matrix changes, which in a power flow happens when the bus
/// types change between outer passes.
#[derive(Default)]
pub struct RSparseSolver {
    symbolic: Option<Symb>,
    pattern: Option<SparsityPattern>,
}

/// Numeric factors `P A Q = L U` produced by [`RSparseSolver`].
pub struct RSparseLu {
    l: Sprs<f64>,
    u: Sprs<f64>,
    pinv: Option<Vec<isize>>,
    q: Option<Vec<isize>>,
    n: usize,
}

impl SparseSolver for RSparseSolver {
    type Factorization = RSparseLu;

    fn factorize(&mut self, a: &CscMatrix<f64>) -> Result<RSparseLu, SolverError> {
        let n = check_square(a)?;
        let mat = Sprs {
            m: n,
            n,
            p: a.col_offsets().iter().map(|&v| v as isize).collect(),
            i: a.row_indices().to_vec(),
            x: a.values().to_vec(),
            nzmax: a.nnz(),
        };
        if self.pattern.as_ref() != Some(a.pattern()) {
            self.symbolic = Some(sqr(&mat, 1, false));
            self.pattern = Some(a.pattern().clone());
        }
        let symbolic = self
            .symbolic
            .as_mut()
            .ok_or_else(|| SolverError::Symbolic("missing symbolic analysis".into()))?;
        let num = lu(&mat, symbolic, 1e-6)
            .map_err(|_| SolverError::Factorization("rsparse LU".into()))?;
        Ok(RSparseLu {
            l: num.l,
            u: num.u,
            pinv: num.pinv,
            q: symbolic.q.clone(),
            n,
        })
    }

    fn solve(&self, factor: &RSparseLu, b: &mut [f64]) -> Result<(), SolverError> {
        check_rhs(b, factor.n)?;
        let mut x = vec![0.0; factor.n];
        ipvec(&factor.pinv, b, &mut x); // x = P*b
        lsolve(&factor.l, &mut x); // x = L\x
        usolve(&factor.u, &mut x); // x = U\x
        ipvec(&factor.q, &x, b); // b = Q*x
        check_finite(b)
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.pattern = None;
    }
}

/// `x[p[k]] = b[k]` for `k < b.len()`; the AMD column permutation carries
/// one trailing entry past `n`.
fn ipvec<T: Numeric<T>>(p: &Option<Vec<isize>>, b: &[T], x: &mut [T]) {
    match p {
        Some(perm) => {
            for (k, &pk) in perm.iter().take(b.len()).enumerate() {
                x[pk as usize] = b[k];
            }
        }
        None => x.copy_from_slice(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;
    use nalgebra_sparse::CooMatrix;

    /// Bus 0 coupled to every other bus, like a substation feeding radial lines.
    fn star(n: usize) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            coo.push(i, i, 10.0 + i as f64);
            if i > 0 {
                coo.push(0, i, -1.0);
                coo.push(i, 0, -2.0);
            }
        }
        CscMatrix::from(&coo)
    }

    #[test]
    fn test_solve_with_fill_reducing_order() {
        let n = 7;
        let a = star(n);
        let x_ref = DVector::from_fn(n, |i, _| 1.0 - 0.25 * i as f64);
        let b = &a * &x_ref;

        let mut solver = RSparseSolver::default();
        let factor = solver.factorize(&a).unwrap();
        let q = factor.q.as_ref().unwrap();
        println!("column order {:?}", q);
        // the hub is eliminated last, so the order is not the identity
        assert!((0..n).any(|k| q[k] != k as isize));

        let mut x = b.as_slice().to_vec();
        solver.solve(&factor, &mut x).unwrap();
        for i in 0..n {
            assert!((x[i] - x_ref[i]).abs() < 1e-12, "Mismatch at {} {}!={}", i, x[i], x_ref[i]);
        }
        // a second factorization reuses the cached ordering
        let factor = solver.factorize(&a).unwrap();
        let mut x = b.as_slice().to_vec();
        solver.solve(&factor, &mut x).unwrap();
        assert!((x[0] - x_ref[0]).abs() < 1e-12);
    }
}
