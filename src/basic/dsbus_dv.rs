use crate::basic::sparse::conj::Conjugate;
use nalgebra::*;
use nalgebra_sparse::CscMatrix;

/// Builds a sparse diagonal matrix holding `d`.
pub(crate) fn diag_csc(d: &[Complex<f64>]) -> CscMatrix<Complex<f64>> {
    let mut m = CscMatrix::identity(d.len());
    m.values_mut().copy_from_slice(d);
    m
}

/// Partial derivatives of the bus power injections `S = V ⊙ conj(Ybus V)`
/// with respect to voltage magnitudes and angles.
///
/// # Arguments
///
/// * `ybus` - Nodal admittance matrix (CSC).
/// * `v` - Complex bus voltages.
///
/// # Returns
///
/// `(dS_dVm, dS_dVa)`, both N×N complex matrices over all buses; callers
/// select the rows and columns of the active unknowns.
///
/// # Notes
///
/// * Buses with `|V| = 0` get a zero unit phasor instead of NaN. This keeps
///   the matrix finite when it is evaluated at a voltage increment, where
///   the slack and PV entries are exactly zero.
/// * Formulae from R. D. Zimmerman, "AC Power Flows, Generalized OPF Costs and
///   their Derivatives using Complex Matrix Notation", MATPOWER Technical
///   Note 2, February 2010.
#[allow(non_snake_case)]
pub fn dSbus_dV(
    ybus: &CscMatrix<Complex<f64>>,
    v: &DVector<Complex<f64>>,
) -> (CscMatrix<Complex<f64>>, CscMatrix<Complex<f64>>) {
    let ibus = ybus * v;
    let vnorm: Vec<Complex<f64>> = v
        .iter()
        .map(|e| {
            let m = e.norm();
            if m > 0.0 { e / m } else { Complex::new(0.0, 0.0) }
        })
        .collect();
    let diagV = diag_csc(v.as_slice());
    let diagVnorm = diag_csc(&vnorm);
    let diagIbus = diag_csc(ibus.as_slice());

    let dS_dVm = &diagV * (ybus * &diagVnorm).conjugate() + diagIbus.conjugate() * &diagVnorm;
    let dS_dVa = &diagV * (diagIbus - ybus * &diagV).conjugate() * Complex::<f64>::i();
    (dS_dVm, dS_dVa)
}
