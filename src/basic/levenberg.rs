use std::time::Instant;

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

use super::{
    jacobian::jacobian,
    mismatch::{ConvergenceState, PowerFlowProblem},
    newtonpf::PolarState,
    solver::SparseSolver,
    system::BusIndex,
};

/// Levenberg-Marquardt power flow.
///
/// Solves `(HᵀH + λI)·dx = Hᵀ·F` with the Newton Jacobian `H`. A step whose
/// gain ratio ρ is negative is rejected: λ grows by ν, ν doubles, the state
/// and the Jacobian are kept. An accepted step shrinks λ by
/// `max(1/3, 1 − (2ρ − 1)³)` and forces a Jacobian rebuild.
pub fn levenberg_marquardt_pf<S: SparseSolver>(
    pf: &PowerFlowProblem,
    v0: &DVector<Complex64>,
    index: &BusIndex,
    tol: f64,
    max_it: usize,
    solver: &mut S,
) -> ConvergenceState {
    let start = Instant::now();
    let mut state = PolarState::new(v0);
    let mut v = state.voltage();
    let mut m = pf.mismatch(&v, index);
    let mut iterations = 0;

    let mut lambda = 0.0;
    let mut nu = 2.0;
    let mut f_prev = 1e9;
    let mut update_jacobian = true;
    let mut normal: Option<(CscMatrix<f64>, CscMatrix<f64>)> = None; // (Hᵀ, HᵀH)

    let failure = loop {
        if m.norm_f < tol || iterations >= max_it {
            break None;
        }
        iterations += 1;

        if update_jacobian || normal.is_none() {
            let h = jacobian(pf, &v, index);
            let ht = h.transpose();
            let h2 = &ht * &h;
            if iterations == 1 {
                let diag_max = h2
                    .triplet_iter()
                    .filter(|(r, c, _)| r == c)
                    .fold(0.0_f64, |acc, (_, _, x)| acc.max(*x));
                lambda = 1e-3 * diag_max;
            }
            normal = Some((ht, h2));
        }
        let Some((ht, h2)) = normal.as_ref() else {
            break Some("normal equations unavailable".to_string());
        };

        let dz = &m.f;
        let rhs = ht * dz;
        let mut damping = CscMatrix::identity(h2.nrows());
        damping.values_mut().iter_mut().for_each(|x| *x = lambda);
        let system = h2 + &damping;

        let mut dx = rhs.as_slice().to_vec();
        if let Err(e) = solver.factorize_and_solve(&system, &mut dx) {
            break Some(format!("damped normal equations failed: {e}"));
        }
        let dx = DVector::from_vec(dx);

        let f = 0.5 * dz.dot(dz);
        let val = dx.dot(&(&dx * lambda + &rhs));
        let rho = if val > 0.0 { (f_prev - f) / (0.5 * val) } else { -1.0 };
        f_prev = f;

        if rho >= 0.0 {
            update_jacobian = true;
            lambda *= (1.0_f64 / 3.0).max(1.0 - (2.0 * rho - 1.0).powi(3));
            nu = 2.0;
            let previous = (state.vm.clone(), state.va.clone());
            state.apply(dx.as_slice(), 1.0, index);
            let v_new = state.voltage();
            let m_new = pf.mismatch(&v_new, index);
            if !m_new.norm_f.is_finite() {
                (state.vm, state.va) = previous;
                break Some("mismatch became non-finite".to_string());
            }
            v = v_new;
            m = m_new;
        } else {
            update_jacobian = false;
            lambda *= nu;
            nu *= 2.0;
        }
        log::debug!(
            "LM iteration {iterations}: |F|inf = {:.3e}, lambda = {lambda:.3e}, rho = {rho:.3}",
            m.norm_f
        );
    };

    let mut result = ConvergenceState::new(v, m, iterations, tol);
    if let Some(reason) = failure {
        log::warn!("Levenberg-Marquardt stopped after {iterations} iterations: {reason}");
        result = result.fail(reason);
    }
    result.elapsed = start.elapsed();
    result
}
