use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

use super::{
    dsbus_dv::{dSbus_dV, diag_csc},
    mismatch::PowerFlowProblem,
    sparse::{
        conj::RealImage,
        slice::Select,
        stack::{csc_hstack, csc_vstack},
    },
    system::BusIndex,
};

/// Arranges `dS/dVa` and `dS/dVm` into the real Newton matrix
///
/// ```text
///        θ[idx_dp]      |V|[idx_dvm]
/// ΔP[idx_dp]  Re dS/dVa   Re dS/dVm
/// ΔQ[idx_dq]  Im dS/dVa   Im dS/dVm
/// ```
#[allow(non_snake_case)]
fn assemble(
    dS_dVm: &CscMatrix<Complex64>,
    dS_dVa: &CscMatrix<Complex64>,
    index: &BusIndex,
) -> CscMatrix<f64> {
    let (dp, dq, dvm) = (index.idx_dp(), index.idx_dq(), index.idx_dvm());
    let J11 = dS_dVa.select(dp, dp).real();
    let J12 = dS_dVm.select(dp, dvm).real();
    let J21 = dS_dVa.select(dq, dp).imag();
    let J22 = dS_dVm.select(dq, dvm).imag();
    csc_vstack(&[&csc_hstack(&[&J11, &J12]), &csc_hstack(&[&J21, &J22])])
}

/// Jacobian of the mismatch `F(V)` including the voltage dependence of the
/// ZIP injection on the magnitude columns.
#[allow(non_snake_case)]
pub fn jacobian(pf: &PowerFlowProblem, v: &DVector<Complex64>, index: &BusIndex) -> CscMatrix<f64> {
    let (dS_dVm, dS_dVa) = dSbus_dV(pf.y_bus, v);
    let vm = v.map(|e| e.norm());
    let dSspec_dVm = diag_csc(pf.specified_power_dvm(&vm).as_slice());
    assemble(&(dS_dVm - dSspec_dVm), &dS_dVa, index)
}

/// Jacobian of the network injections alone, `Scalc(V)`.
///
/// Evaluated at a voltage increment this gives the second-order term used by
/// the Iwamoto step-size computation.
#[allow(non_snake_case)]
pub fn network_jacobian(y_bus: &CscMatrix<Complex64>, v: &DVector<Complex64>, index: &BusIndex) -> CscMatrix<f64> {
    let (dS_dVm, dS_dVa) = dSbus_dV(y_bus, v);
    assemble(&dS_dVm, &dS_dVa, index)
}
