use std::time::Duration;

use derive_more::Display;
use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basic::{
    gauss_seidel::gauss_seidel_pf,
    levenberg::levenberg_marquardt_pf,
    mismatch::{ConvergenceState, PowerFlowProblem, Termination},
    newtonpf::{NewtonStep, newton_pf},
    solver::SparseSolver,
    system::BusIndex,
};

/// Iterative method used for the inner solve of an island.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum SolverType {
    #[default]
    #[display("Newton-Raphson")]
    NR,
    #[display("Newton-Raphson (Iwamoto)")]
    IWAMOTO,
    #[display("Newton-Raphson (line search)")]
    NRLS,
    #[display("Levenberg-Marquardt")]
    LM,
    #[display("Gauss-Seidel")]
    GS,
}

impl SolverType {
    pub const ALL: [SolverType; 5] = [
        SolverType::NR,
        SolverType::LM,
        SolverType::IWAMOTO,
        SolverType::NRLS,
        SolverType::GS,
    ];

    /// Methods tried after this one failed, in order.
    pub fn fallbacks(self) -> impl Iterator<Item = SolverType> {
        Self::ALL.into_iter().filter(move |s| *s != self)
    }

    /// Runs this method on one fixed bus classification with the
    /// tolerance, iteration limit and step options of `config`.
    pub fn solve<S: SparseSolver>(
        self,
        pf: &PowerFlowProblem,
        v0: &DVector<Complex64>,
        index: &BusIndex,
        config: &PowerFlowConfig,
        solver: &mut S,
    ) -> ConvergenceState {
        let (tol, max_it) = (config.tolerance, config.max_iterations);
        match self {
            SolverType::NR => newton_pf(pf, v0, index, tol, max_it, NewtonStep::Full, solver),
            SolverType::IWAMOTO => newton_pf(pf, v0, index, tol, max_it, NewtonStep::Iwamoto, solver),
            SolverType::NRLS => {
                let step = NewtonStep::Backtracking(config.backtracking_parameter);
                newton_pf(pf, v0, index, tol, max_it, step, solver)
            }
            SolverType::LM => levenberg_marquardt_pf(pf, v0, index, tol, max_it, solver),
            SolverType::GS => gauss_seidel_pf(pf, v0, index, tol, max_it),
        }
    }
}

/// Options of a power-flow run.
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// use acflow::prelude::*;
/// let cfg = PowerFlowConfig::from_json(r#"{"solver_type": "LM", "control_q": true}"#).unwrap();
/// assert_eq!(cfg.solver_type, SolverType::LM);
/// assert_eq!(cfg.max_iterations, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerFlowConfig {
    pub solver_type: SolverType,
    /// convergence threshold on ‖F‖∞, p.u.
    pub tolerance: f64,
    /// per inner solve
    pub max_iterations: usize,
    /// enforce reactive limits of PV and P buses
    pub control_q: bool,
    /// share the slack mismatch among buses with installed power
    pub distribute_slack: bool,
    pub verbose: bool,
    pub max_outer_loops: usize,
    /// discrete controls only act once ‖F‖∞ is below this
    pub control_tolerance: f64,
    /// on failure, run the island again with the other methods
    pub retry_with_other_methods: bool,
    /// step reduction factor of the NRLS line search, in (0, 1)
    pub backtracking_parameter: f64,
}

impl Default for PowerFlowConfig {
    fn default() -> Self {
        Self {
            solver_type: SolverType::NR,
            tolerance: 1e-8,
            max_iterations: 20,
            control_q: false,
            distribute_slack: false,
            verbose: false,
            max_outer_loops: 10,
            control_tolerance: 1e-2,
            retry_with_other_methods: false,
            backtracking_parameter: 0.5,
        }
    }
}

impl PowerFlowConfig {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Outcome of one inner solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub method: SolverType,
    pub converged: bool,
    pub norm_f: f64,
    pub iterations: usize,
    pub termination: Termination,
    pub elapsed: Duration,
}

impl ConvergenceReport {
    pub fn new(method: SolverType, state: &ConvergenceState) -> Self {
        Self {
            method,
            converged: state.converged,
            norm_f: state.norm_f,
            iterations: state.iterations,
            termination: state.termination.clone(),
            elapsed: state.elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::solver::DefaultSolver;
    use crate::testcases::{ScenarioData, remote_control, three_bus};

    #[test]
    fn test_partial_json() {
        let cfg = PowerFlowConfig::from_json(r#"{"tolerance": 1e-6, "solver_type": "GS"}"#).unwrap();
        assert_eq!(cfg.solver_type, SolverType::GS);
        assert_eq!(cfg.tolerance, 1e-6);
        assert_eq!(cfg.max_outer_loops, 10);
        assert!(!cfg.control_q);
        assert_eq!(cfg.backtracking_parameter, 0.5);
        let back = PowerFlowConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(back, cfg);
        assert!(PowerFlowConfig::from_json(r#"{"solver_type": "FOO"}"#).is_err());
    }

    #[test]
    fn test_fallback_order() {
        let order: Vec<_> = SolverType::NR.fallbacks().collect();
        assert_eq!(
            order,
            vec![SolverType::LM, SolverType::IWAMOTO, SolverType::NRLS, SolverType::GS]
        );
        assert_eq!(SolverType::GS.fallbacks().count(), 4);
        assert_eq!(SolverType::NRLS.to_string(), "Newton-Raphson (line search)");
    }

    fn check_methods_agree(data: &ScenarioData) {
        let mut solver = DefaultSolver::default();
        let config = PowerFlowConfig {
            tolerance: 1e-9,
            ..Default::default()
        };
        let reference = SolverType::NR.solve(&data.problem(), &data.v0, &data.index, &config, &mut solver);
        assert!(reference.converged);
        for method in SolverType::ALL {
            let config = PowerFlowConfig {
                max_iterations: if method == SolverType::GS { 5000 } else { 100 },
                ..config.clone()
            };
            let res = method.solve(&data.problem(), &data.v0, &data.index, &config, &mut solver);
            let report = ConvergenceReport::new(method, &res);
            println!("{}: {:?}", method, report);
            assert!(report.converged, "{} did not converge", method);
            for i in 0..data.v0.len() {
                assert!((reference.v[i] - res.v[i]).norm() < 1e-6, "{} differs at bus {}", method, i);
            }
        }
    }

    #[test]
    fn test_all_methods_agree() {
        check_methods_agree(&ScenarioData::from(&three_bus()));
    }

    #[test]
    fn test_all_methods_agree_on_remote_control() {
        check_methods_agree(&ScenarioData::from(&remote_control()));
    }
}
