use nalgebra::{DVector, Scalar};
use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_traits::Zero;
use std::ops::{Add, AddAssign};

/// Extracts the submatrix `mat[rows, cols]`.
///
/// Output row `k` is input row `rows[k]` (same for columns), so the index
/// lists fix the layout of the result and need not be sorted. Rows or columns
/// listed twice are duplicated.
pub fn select_csc<T: Scalar + Zero + Add<Output = T> + AddAssign>(
    mat: &CscMatrix<T>,
    rows: &[usize],
    cols: &[usize],
) -> CscMatrix<T> {
    let mut row_map: Vec<Vec<usize>> = vec![Vec::new(); mat.nrows()];
    for (new_r, &r) in rows.iter().enumerate() {
        row_map[r].push(new_r);
    }

    let mut coo = CooMatrix::new(rows.len(), cols.len());
    for (new_c, &c) in cols.iter().enumerate() {
        let col = mat.col(c);
        for (r, v) in col.row_indices().iter().zip(col.values()) {
            for &new_r in &row_map[*r] {
                coo.push(new_r, new_c, v.clone());
            }
        }
    }
    CscMatrix::from(&coo)
}

/// Index selection on the matrices this crate slices.
pub(crate) trait Select {
    type Mat;
    fn select(&self, rows: &[usize], cols: &[usize]) -> Self::Mat;
}

impl<T: Scalar + Zero + Add<Output = T> + AddAssign> Select for CscMatrix<T> {
    type Mat = CscMatrix<T>;
    #[inline(always)]
    fn select(&self, rows: &[usize], cols: &[usize]) -> Self::Mat {
        select_csc(self, rows, cols)
    }
}

/// `v[idx]` as a new vector.
#[inline]
pub fn gather<T: Scalar>(v: &DVector<T>, idx: &[usize]) -> DVector<T> {
    DVector::from_iterator(idx.len(), idx.iter().map(|&i| v[i].clone()))
}

/// `out[idx[k]] = v[k]` for every k.
#[inline]
pub fn scatter<T: Scalar>(v: &DVector<T>, idx: &[usize], out: &mut DVector<T>) {
    for (k, &i) in idx.iter().enumerate() {
        out[i] = v[k].clone();
    }
}
