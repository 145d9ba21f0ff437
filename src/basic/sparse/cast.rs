use nalgebra::Complex;
use nalgebra_sparse::CscMatrix;

/// Lifts a real sparse matrix into another scalar field without touching its pattern.
pub(crate) trait Cast<T> {
    type Mat;

    fn cast(&self) -> Self::Mat;
}

impl Cast<Complex<f64>> for CscMatrix<f64> {
    type Mat = CscMatrix<Complex<f64>>;

    fn cast(&self) -> Self::Mat {
        let values = self.values().iter().map(|x| Complex::new(*x, 0.0)).collect();
        unsafe {
            CscMatrix::try_from_pattern_and_values(self.pattern().clone(), values)
                .unwrap_unchecked()
        }
    }
}
