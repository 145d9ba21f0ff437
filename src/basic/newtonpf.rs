use std::time::Instant;

use nalgebra::{DVector, Matrix3};
use num_complex::Complex64;

use super::{
    jacobian::{jacobian, network_jacobian},
    mismatch::{ConvergenceState, Mismatch, PowerFlowProblem},
    solver::SparseSolver,
    system::BusIndex,
};

/// Polar state `(|V|, θ)` with the increment layout of the Newton system.
pub(crate) struct PolarState {
    pub vm: DVector<f64>,
    pub va: DVector<f64>,
}

impl PolarState {
    pub fn new(v: &DVector<Complex64>) -> Self {
        Self {
            vm: v.map(|e| e.norm()),
            va: v.map(|e| e.arg()),
        }
    }

    pub fn voltage(&self) -> DVector<Complex64> {
        DVector::from_fn(self.vm.len(), |i, _| Complex64::from_polar(self.vm[i], self.va[i]))
    }

    /// `θ[idx_dp] −= μ·dx[..n_dp]`, `|V|[idx_dvm] −= μ·dx[n_dp..]`
    pub fn apply(&mut self, dx: &[f64], mu: f64, index: &BusIndex) {
        let n_dp = index.idx_dp().len();
        for (k, &bus) in index.idx_dp().iter().enumerate() {
            self.va[bus] -= mu * dx[k];
        }
        for (k, &bus) in index.idx_dvm().iter().enumerate() {
            self.vm[bus] -= mu * dx[n_dp + k];
        }
    }

    /// The increment as a full-length complex vector `dVm·e^{j·dVa}`.
    fn increment(dx: &[f64], index: &BusIndex) -> DVector<Complex64> {
        let n = index.n_bus();
        let n_dp = index.idx_dp().len();
        let mut dva = DVector::zeros(n);
        let mut dvm = DVector::zeros(n);
        for (k, &bus) in index.idx_dp().iter().enumerate() {
            dva[bus] = dx[k];
        }
        for (k, &bus) in index.idx_dvm().iter().enumerate() {
            dvm[bus] = dx[n_dp + k];
        }
        DVector::from_fn(n, |i, _| Complex64::from_polar(dvm[i], dva[i]))
    }
}

/// Step length rule of [`newton_pf`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NewtonStep {
    /// plain Newton step, `μ = 1`
    Full,
    /// optimal multiplier of Iwamoto and Tamura
    Iwamoto,
    /// start from `μ = 1` and multiply by the factor while ‖F‖∞ does not
    /// decrease; factors outside `(0, 1)` disable the search
    Backtracking(f64),
}

const MAX_BACKTRACKS: usize = 10;
const MIN_STEP: f64 = 0.01;

/// Newton-Raphson power flow in polar coordinates.
///
/// `step` selects how far to move along each Newton direction.
/// Factorization failures and non-finite steps end the iteration with
/// `NumericalFailure` and the last good voltage.
pub fn newton_pf<S: SparseSolver>(
    pf: &PowerFlowProblem,
    v0: &DVector<Complex64>,
    index: &BusIndex,
    tol: f64,
    max_it: usize,
    step: NewtonStep,
    solver: &mut S,
) -> ConvergenceState {
    let start = Instant::now();
    let mut state = PolarState::new(v0);
    let mut v = state.voltage();
    let mut m = pf.mismatch(&v, index);
    let mut iterations = 0;

    let failure = loop {
        if m.norm_f < tol || iterations >= max_it {
            break None;
        }
        iterations += 1;

        let j = jacobian(pf, &v, index);
        let factor = match solver.factorize(&j) {
            Ok(f) => f,
            Err(e) => break Some(format!("Jacobian factorization failed: {e}")),
        };
        let mut dx = m.f.as_slice().to_vec();
        if let Err(e) = solver.solve(&factor, &mut dx) {
            break Some(format!("Newton step failed: {e}"));
        }

        let previous = (state.vm.clone(), state.va.clone());
        let (mu, m_new) = match step {
            NewtonStep::Full => (1.0, step_to(pf, &mut state, &dx, 1.0, index)),
            NewtonStep::Iwamoto => {
                let mu = iwamoto_multiplier(pf, &j, &m.f, &dx, index);
                (mu, step_to(pf, &mut state, &dx, mu, index))
            }
            NewtonStep::Backtracking(shrink) => backtrack(pf, &mut state, &dx, m.norm_f, shrink, index),
        };
        if !m_new.norm_f.is_finite() {
            (state.vm, state.va) = previous;
            break Some("mismatch became non-finite".to_string());
        }
        v = state.voltage();
        m = m_new;
        log::debug!("NR iteration {iterations}: |F|inf = {:.3e}, mu = {mu:.4}", m.norm_f);
    };

    let mut result = ConvergenceState::new(v, m, iterations, tol);
    if let Some(reason) = failure {
        log::warn!("Newton-Raphson stopped after {iterations} iterations: {reason}");
        result = result.fail(reason);
    }
    result.elapsed = start.elapsed();
    result
}

/// Moves `state` by `−μ·dx` and evaluates the mismatch there.
fn step_to(pf: &PowerFlowProblem, state: &mut PolarState, dx: &[f64], mu: f64, index: &BusIndex) -> Mismatch {
    state.apply(dx, mu, index);
    pf.mismatch(&state.voltage(), index)
}

/// Shortens the Newton step until the mismatch norm drops below `norm_f`.
///
/// Gives up after [`MAX_BACKTRACKS`] reductions or once `μ` falls below
/// [`MIN_STEP`] and keeps the last trial point. Returns the accepted `μ` and
/// the mismatch at the new `state`.
pub(crate) fn backtrack(
    pf: &PowerFlowProblem,
    state: &mut PolarState,
    dx: &[f64],
    norm_f: f64,
    shrink: f64,
    index: &BusIndex,
) -> (f64, Mismatch) {
    let origin = (state.vm.clone(), state.va.clone());
    let mut mu = 1.0;
    let mut m = step_to(pf, state, dx, mu, index);
    if !(shrink > 0.0 && shrink < 1.0) {
        return (mu, m);
    }
    let mut tries = 0;
    while !(m.norm_f < norm_f) && tries < MAX_BACKTRACKS && mu * shrink >= MIN_STEP {
        mu *= shrink;
        (state.vm, state.va) = origin.clone();
        m = step_to(pf, state, dx, mu, index);
        tries += 1;
    }
    if tries > 0 {
        log::debug!("backtracked {tries} times to mu = {mu:.4}, |F|inf = {:.3e}", m.norm_f);
    }
    (mu, m)
}

/// Optimal step length along the Newton direction.
///
/// With `a = F`, `b = J·dx` and `c = ½·J(dV)·dx` the mismatch along the
/// direction is `a − μb + μ²c`; minimising its squared norm leads to the cubic
/// `g3μ³ + g2μ² + g1μ + g0 = 0`. Falls back to 1 when the cubic has no finite
/// positive real root.
pub(crate) fn iwamoto_multiplier(
    pf: &PowerFlowProblem,
    j: &nalgebra_sparse::CscMatrix<f64>,
    f: &DVector<f64>,
    dx: &[f64],
    index: &BusIndex,
) -> f64 {
    let dv = PolarState::increment(dx, index);
    let j2 = network_jacobian(pf.y_bus, &dv, index);
    let dx = DVector::from_column_slice(dx);
    let a = f;
    let b = j * &dx;
    let c = (&j2 * &dx) * 0.5;

    let g0 = -a.dot(&b);
    let g1 = b.dot(&b) + 2.0 * a.dot(&c);
    let g2 = -3.0 * b.dot(&c);
    let g3 = 2.0 * c.dot(&c);
    real_cubic_root(g3, g2, g1, g0).unwrap_or(1.0)
}

/// Real root of `g3x³ + g2x² + g1x + g0` closest to 1, found from the
/// eigenvalues of the companion matrix. A root counts as real when its
/// imaginary part is negligible relative to its size.
pub(crate) fn real_cubic_root(g3: f64, g2: f64, g1: f64, g0: f64) -> Option<f64> {
    let scale = g3.abs().max(g2.abs()).max(g1.abs()).max(g0.abs());
    if !(scale.is_finite() && scale > 0.0) {
        return None;
    }
    if g3.abs() <= 1e-14 * scale {
        // direction is linear to working precision
        let mu = -g0 / g1;
        return (mu.is_finite() && mu > 0.0).then_some(mu);
    }
    let companion = Matrix3::new(
        -g2 / g3, -g1 / g3, -g0 / g3, //
        1.0, 0.0, 0.0, //
        0.0, 1.0, 0.0,
    );
    companion
        .complex_eigenvalues()
        .iter()
        .filter(|r| r.im.abs() <= 1e-8 * r.re.abs().max(1.0))
        .map(|r| r.re)
        .filter(|mu| mu.is_finite() && *mu > 0.0)
        .min_by(|x, y| (x - 1.0).abs().total_cmp(&(y - 1.0).abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{mismatch::Termination, solver::DefaultSolver};
    use crate::testcases::{ScenarioData, remote_control, three_bus};

    #[test]
    fn test_real_root_selected_by_imaginary_part() {
        // (x − 0.8)(x² + 1): one real root, complex pair ±i
        let r = real_cubic_root(1.0, -0.8, 1.0, -0.8).unwrap();
        println!("root={}", r);
        assert!((r - 0.8).abs() < 1e-10);
        // (x − 0.5)(x − 1.2)(x − 3): three real roots, pick the one nearest 1
        let r = real_cubic_root(1.0, -4.7, 5.7, -1.8).unwrap();
        assert!((r - 1.2).abs() < 1e-10);
        // degenerate cubic falls back to the linear root
        let r = real_cubic_root(0.0, 0.0, 2.0, -1.9).unwrap();
        assert!((r - 0.95).abs() < 1e-14);
        assert_eq!(real_cubic_root(0.0, 0.0, 0.0, 0.0), None);
    }

    #[test]
    fn test_three_bus_nr() {
        let data = ScenarioData::from(&three_bus());
        let mut solver = DefaultSolver::default();
        let res = newton_pf(&data.problem(), &data.v0, &data.index, 1e-9, 20, NewtonStep::Full, &mut solver);
        println!("V={} iterations={}", res.v, res.iterations);
        assert!(res.converged);
        assert_eq!(res.termination, Termination::Converged);
        assert!(res.iterations < 10);
        let vm3 = res.v[2].norm();
        assert!((0.9..=1.0).contains(&vm3), "|V3|={}", vm3);
        // PV magnitude untouched
        assert!((res.v[1].norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_iwamoto_agrees_with_nr() {
        let data = ScenarioData::from(&three_bus());
        let mut solver = DefaultSolver::default();
        let nr = newton_pf(&data.problem(), &data.v0, &data.index, 1e-9, 20, NewtonStep::Full, &mut solver);
        let iw = newton_pf(&data.problem(), &data.v0, &data.index, 1e-9, 20, NewtonStep::Iwamoto, &mut solver);
        println!("NR {} it, Iwamoto {} it", nr.iterations, iw.iterations);
        assert!(iw.converged);
        for i in 0..3 {
            assert!((nr.v[i] - iw.v[i]).norm() < 1e-7, "Mismatch at {}", i);
        }
    }

    #[test]
    fn test_idempotent_restart() {
        let data = ScenarioData::from(&three_bus());
        let mut solver = DefaultSolver::default();
        let first = newton_pf(&data.problem(), &data.v0, &data.index, 1e-9, 20, NewtonStep::Full, &mut solver);
        let again = newton_pf(&data.problem(), &first.v, &data.index, 1e-9, 20, NewtonStep::Full, &mut solver);
        assert!(again.converged);
        assert!(again.iterations <= 1, "restart took {} iterations", again.iterations);
    }

    #[test]
    fn test_max_iterations_is_not_an_error() {
        let data = ScenarioData::from(&three_bus());
        let mut solver = DefaultSolver::default();
        let res = newton_pf(&data.problem(), &data.v0, &data.index, 1e-14, 1, NewtonStep::Full, &mut solver);
        assert!(!res.converged);
        assert_eq!(res.termination, Termination::MaxIterations);
        assert_eq!(res.iterations, 1);
    }

    #[test]
    fn test_backtracking_shortens_an_overshooting_step() {
        let data = ScenarioData::from(&three_bus());
        let pf = data.problem();
        let m0 = pf.mismatch(&data.v0, &data.index);
        let j = jacobian(&pf, &data.v0, &data.index);
        let mut dx = m0.f.as_slice().to_vec();
        DefaultSolver::default().factorize_and_solve(&j, &mut dx).unwrap();
        // ten Newton steps in one go
        let dx: Vec<f64> = dx.iter().map(|d| 10.0 * d).collect();

        let mut full = PolarState::new(&data.v0);
        let overshoot = step_to(&pf, &mut full, &dx, 1.0, &data.index);
        println!("|F0|={:e} overshoot |F|={:e}", m0.norm_f, overshoot.norm_f);
        assert!(overshoot.norm_f > m0.norm_f);

        let mut state = PolarState::new(&data.v0);
        let (mu, m) = backtrack(&pf, &mut state, &dx, m0.norm_f, 0.5, &data.index);
        println!("mu={} |F|={:e}", mu, m.norm_f);
        assert!(mu < 1.0);
        assert!(m.norm_f < m0.norm_f);
        assert_eq!(pf.mismatch(&state.voltage(), &data.index).norm_f, m.norm_f);

        // a factor outside (0, 1) takes the step as is
        let mut state = PolarState::new(&data.v0);
        let (mu, m) = backtrack(&pf, &mut state, &dx, m0.norm_f, 1.0, &data.index);
        assert_eq!(mu, 1.0);
        assert_eq!(m.norm_f, overshoot.norm_f);
    }

    #[test]
    fn test_step_rules_agree() {
        let mut solver = DefaultSolver::default();
        for data in [ScenarioData::from(&three_bus()), ScenarioData::from(&remote_control())] {
            let n = data.v0.len();
            let nr = newton_pf(&data.problem(), &data.v0, &data.index, 1e-9, 20, NewtonStep::Full, &mut solver);
            assert!(nr.converged);
            for step in [NewtonStep::Iwamoto, NewtonStep::Backtracking(0.5)] {
                let res = newton_pf(&data.problem(), &data.v0, &data.index, 1e-9, 20, step, &mut solver);
                println!("{:?}: {} iterations", step, res.iterations);
                assert!(res.converged, "{:?} did not converge", step);
                for i in 0..n {
                    assert!((nr.v[i] - res.v[i]).norm() < 1e-7, "{:?} differs at bus {}", step, i);
                }
            }
        }
    }

    #[test]
    fn test_remote_control_holds_setpoint() {
        let data = ScenarioData::from(&remote_control());
        let mut solver = DefaultSolver::default();
        let res = newton_pf(&data.problem(), &data.v0, &data.index, 1e-10, 20, NewtonStep::Full, &mut solver);
        println!("|V|={}", res.v.map(|e| e.norm()));
        assert!(res.converged);
        // PQV magnitude is not a state variable, the P bus magnitude is
        assert!((res.v[2].norm() - data.v0[2].norm()).abs() < 1e-12);
        assert!(res.v[1].norm() > 1.001);
        // the P bus injects exactly its active setpoint
        assert!((res.scalc[1].re - 0.3).abs() < 1e-9);
    }
}
