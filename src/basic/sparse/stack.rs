use nalgebra_sparse::{CscMatrix, pattern::SparsityPattern};

/// Concatenates CSC matrices with equal row counts side by side.
///
/// Columns are the major dimension, so this is a plain append of each
/// operand's column segments with shifted offsets. Operands with different
/// row counts are a caller bug, caught in debug builds.
pub fn csc_hstack<T: Clone>(matrices: &[&CscMatrix<T>]) -> CscMatrix<T> {
    let nrows = matrices.first().map_or(0, |m| m.nrows());
    let ncols: usize = matrices.iter().map(|m| m.ncols()).sum();
    let nnz: usize = matrices.iter().map(|m| m.nnz()).sum();

    let mut offsets = Vec::with_capacity(ncols + 1);
    let mut indices = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    for mat in matrices {
        debug_assert_eq!(mat.nrows(), nrows, "hstack operands must share the row count");
        let base = indices.len();
        let col_offsets = mat.col_offsets();
        offsets.extend(col_offsets[..mat.ncols()].iter().map(|o| o + base));
        indices.extend_from_slice(mat.row_indices());
        values.extend_from_slice(mat.values());
    }
    offsets.push(indices.len());
    unsafe {
        let pattern = SparsityPattern::from_offset_and_indices_unchecked(ncols, nrows, offsets, indices);
        CscMatrix::try_from_pattern_and_values(pattern, values).unwrap_unchecked()
    }
}

/// Stacks CSC matrices with equal column counts on top of each other.
///
/// Column `j` of the result is column `j` of every operand in order, with row
/// indices shifted by the heights of the operands above it; rows stay sorted.
/// Operands must share the column count.
pub fn csc_vstack<T: Clone>(matrices: &[&CscMatrix<T>]) -> CscMatrix<T> {
    let ncols = matrices.first().map_or(0, |m| m.ncols());
    let nrows: usize = matrices.iter().map(|m| m.nrows()).sum();
    let nnz: usize = matrices.iter().map(|m| m.nnz()).sum();
    for mat in matrices {
        debug_assert_eq!(mat.ncols(), ncols, "vstack operands must share the column count");
    }

    let mut offsets = Vec::with_capacity(ncols + 1);
    let mut indices = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    offsets.push(0);
    for j in 0..ncols {
        let mut row_base = 0;
        for mat in matrices {
            let col = mat.col(j);
            indices.extend(col.row_indices().iter().map(|r| r + row_base));
            values.extend_from_slice(col.values());
            row_base += mat.nrows();
        }
        offsets.push(indices.len());
    }
    unsafe {
        let pattern = SparsityPattern::from_offset_and_indices_unchecked(ncols, nrows, offsets, indices);
        CscMatrix::try_from_pattern_and_values(pattern, values).unwrap_unchecked()
    }
}
