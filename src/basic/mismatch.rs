use std::time::Duration;

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::system::BusIndex;

/// Network and injections of one power-flow problem, borrowed from an island.
///
/// The specified injection follows the ZIP model
/// `Sspec = S0 + I0·|V| + Y0·|V|²`; every solver variant evaluates it here.
#[derive(Debug, Clone, Copy)]
pub struct PowerFlowProblem<'a> {
    pub y_bus: &'a CscMatrix<Complex64>,
    pub s0: &'a DVector<Complex64>,
    pub i0: &'a DVector<Complex64>,
    pub y0: &'a DVector<Complex64>,
}

/// Calculated injections, mismatch vector and its infinity norm at one point.
#[derive(Debug, Clone)]
pub struct Mismatch {
    pub scalc: DVector<Complex64>,
    pub f: DVector<f64>,
    pub norm_f: f64,
}

impl<'a> PowerFlowProblem<'a> {
    /// `S0 + I0·|V| + Y0·|V|²`
    pub fn specified_power(&self, vm: &DVector<f64>) -> DVector<Complex64> {
        DVector::from_fn(vm.len(), |i, _| {
            self.s0[i] + self.i0[i] * vm[i] + self.y0[i] * (vm[i] * vm[i])
        })
    }

    /// `d Sspec / d|V| = I0 + 2·Y0·|V|`
    pub fn specified_power_dvm(&self, vm: &DVector<f64>) -> DVector<Complex64> {
        DVector::from_fn(vm.len(), |i, _| self.i0[i] + self.y0[i] * (2.0 * vm[i]))
    }

    /// `V ⊙ conj(Ybus·V)`
    pub fn calculated_power(&self, v: &DVector<Complex64>) -> DVector<Complex64> {
        v.component_mul(&(self.y_bus * v).conjugate())
    }

    /// Evaluates `F = [Re ΔS[idx_dp]; Im ΔS[idx_dq]]` with `ΔS = Scalc − Sspec`.
    pub fn mismatch(&self, v: &DVector<Complex64>, index: &BusIndex) -> Mismatch {
        let vm = v.map(|e| e.norm());
        let scalc = self.calculated_power(v);
        let ds = &scalc - self.specified_power(&vm);
        let f = assemble_f(&ds, index);
        let norm_f = norm_inf(&f);
        Mismatch { scalc, f, norm_f }
    }
}

pub(crate) fn assemble_f(ds: &DVector<Complex64>, index: &BusIndex) -> DVector<f64> {
    let (dp, dq) = (index.idx_dp(), index.idx_dq());
    DVector::from_iterator(
        dp.len() + dq.len(),
        dp.iter().map(|&i| ds[i].re).chain(dq.iter().map(|&i| ds[i].im)),
    )
}

/// Largest absolute entry; zero for an empty vector, NaN if any entry is NaN.
pub fn norm_inf(f: &DVector<f64>) -> f64 {
    f.iter().fold(0.0_f64, |acc, x| {
        if x.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(x.abs()) }
    })
}

/// Why an inner solve stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Termination {
    Converged,
    MaxIterations,
    /// factorization failed or the step was not finite
    NumericalFailure(String),
}

/// State returned by every solver variant.
///
/// Non-convergence is a value here, never an error: `v` holds the best
/// voltage reached and `termination` says why the iteration stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceState {
    pub v: DVector<Complex64>,
    pub scalc: DVector<Complex64>,
    pub f: DVector<f64>,
    pub norm_f: f64,
    pub iterations: usize,
    pub converged: bool,
    pub termination: Termination,
    pub elapsed: Duration,
}

impl ConvergenceState {
    pub(crate) fn new(v: DVector<Complex64>, m: Mismatch, iterations: usize, tol: f64) -> Self {
        let converged = m.norm_f < tol;
        Self {
            v,
            scalc: m.scalc,
            f: m.f,
            norm_f: m.norm_f,
            iterations,
            converged,
            termination: if converged {
                Termination::Converged
            } else {
                Termination::MaxIterations
            },
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn fail(mut self, reason: impl Into<String>) -> Self {
        self.converged = false;
        self.termination = Termination::NumericalFailure(reason.into());
        self
    }
}
