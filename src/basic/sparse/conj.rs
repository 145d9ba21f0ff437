use nalgebra::Complex;
use nalgebra_sparse::CscMatrix;

/// Trait for computing the conjugate of a matrix.
pub(crate) trait Conjugate {
    type Mat;

    /// Returns the conjugate of the matrix.
    fn conjugate(&self) -> Self::Mat;
}

impl Conjugate for CscMatrix<Complex<f64>> {
    type Mat = CscMatrix<Complex<f64>>;

    fn conjugate(&self) -> Self::Mat {
        let values = self.values().iter().map(|e| e.conj()).collect();
        // same pattern, same number of values
        unsafe {
            CscMatrix::try_from_pattern_and_values(self.pattern().clone(), values)
                .unwrap_unchecked()
        }
    }
}

/// Real and imaginary parts of a complex matrix, keeping its sparsity pattern.
pub(crate) trait RealImage {
    type Mat;

    /// Returns the real part of the matrix.
    fn real(&self) -> Self::Mat;

    /// Returns the imaginary part of the matrix.
    fn imag(&self) -> Self::Mat;
}

impl RealImage for CscMatrix<Complex<f64>> {
    type Mat = CscMatrix<f64>;

    fn real(&self) -> Self::Mat {
        let values = self.values().iter().map(|e| e.re).collect();
        unsafe {
            CscMatrix::try_from_pattern_and_values(self.pattern().clone(), values)
                .unwrap_unchecked()
        }
    }

    fn imag(&self) -> Self::Mat {
        let values = self.values().iter().map(|e| e.im).collect();
        unsafe {
            CscMatrix::try_from_pattern_and_values(self.pattern().clone(), values)
                .unwrap_unchecked()
        }
    }
}
