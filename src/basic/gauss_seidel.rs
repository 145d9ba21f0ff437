use std::time::Instant;

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use num_complex::Complex64;

use super::{
    mismatch::{ConvergenceState, PowerFlowProblem},
    system::{BusIndex, BusType},
};

/// Gauss-Seidel power flow.
///
/// One sweep updates the Q-specified buses (PQ, PQV) and then the Q-free
/// buses (PV, P), each in ascending order:
///
/// `V[i] += (conj(S[i] / V[i]) − Ybus[i,:]·V) / Ybus[i,i]`
///
/// A Q-free bus first replaces the reactive part of `S[i]` by its current
/// calculated value. A PV bus is rescaled to `|V0[i]|` after the update, a P
/// bus keeps its magnitude. PQV buses float like PQ buses during the sweep;
/// at its end every pair (k-th P, k-th PQV) is scaled by `|V0[pqv]| / |V[pqv]|`,
/// which moves the P bus towards the remote setpoint and puts the PQV bus
/// back on it. Convergence is tested on the same mismatch vector as the
/// Newton-type solvers. On a numerical failure the voltage of the last
/// complete sweep is returned.
pub fn gauss_seidel_pf(
    pf: &PowerFlowProblem,
    v0: &DVector<Complex64>,
    index: &BusIndex,
    tol: f64,
    max_it: usize,
) -> ConvergenceState {
    let start = Instant::now();
    let mut v = v0.clone();
    let vset = v0.map(|e| e.norm());
    let mut m = pf.mismatch(&v, index);
    let mut iterations = 0;

    let y = CsrMatrix::from(pf.y_bus);
    let sweep: Vec<usize> = index
        .idx_dq()
        .iter()
        .chain(index.idx_dp().iter().filter(|&&i| !index.bus_type(i).specifies_q()))
        .copied()
        .collect();

    let failure = 'outer: loop {
        if m.norm_f < tol || iterations >= max_it {
            break None;
        }
        iterations += 1;

        let previous = v.clone();
        let sspec = pf.specified_power(&v.map(|e| e.norm()));
        for &i in &sweep {
            let row = y.row(i);
            let mut yv = Complex64::new(0.0, 0.0);
            let mut yii = Complex64::new(0.0, 0.0);
            for (&j, &yij) in row.col_indices().iter().zip(row.values()) {
                yv += yij * v[j];
                if j == i {
                    yii += yij;
                }
            }
            if yii.norm() == 0.0 {
                v = previous;
                break 'outer Some(format!("bus {i} has no self admittance"));
            }
            let vi = v[i];
            let bus_type = index.bus_type(i);
            let s = if bus_type.specifies_q() {
                sspec[i]
            } else {
                Complex64::new(sspec[i].re, (vi * yv.conj()).im)
            };
            let mut vn = vi + ((s / vi).conj() - yv) / yii;
            match bus_type {
                BusType::PV => vn *= vset[i] / vn.norm(),
                BusType::P => vn *= vi.norm() / vn.norm(),
                _ => {}
            }
            v[i] = vn;
        }
        for (&p, &q) in index.p().iter().zip(index.pqv()) {
            let ratio = vset[q] / v[q].norm();
            v[p] *= ratio;
            v[q] *= ratio;
        }

        let m_new = pf.mismatch(&v, index);
        if !m_new.norm_f.is_finite() {
            v = previous;
            break Some("mismatch became non-finite".to_string());
        }
        m = m_new;
        log::debug!("GS sweep {iterations}: |F|inf = {:.3e}", m.norm_f);
    };

    let mut result = ConvergenceState::new(v, m, iterations, tol);
    if let Some(reason) = failure {
        log::warn!("Gauss-Seidel stopped after {iterations} sweeps: {reason}");
        result = result.fail(reason);
    }
    result.elapsed = start.elapsed();
    result
}
