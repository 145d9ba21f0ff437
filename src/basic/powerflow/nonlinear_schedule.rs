use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::DVector;
use num_complex::Complex64;

use super::{
    config::{ConvergenceReport, PowerFlowConfig, SolverType},
    qlim::{QLimitEvent, ReactiveLimitTracker},
    slack::distribute_slack,
};
use crate::basic::{
    error::ConfigurationError,
    mismatch::{ConvergenceState, PowerFlowProblem},
    solver::SparseSolver,
    system::{BusIndex, NumericalIsland},
};

/// Result of the outer control loop on one island.
#[derive(Debug, Clone)]
pub struct ControlledSolution {
    /// last inner solve; `None` if cancelled before the first one
    pub state: Option<ConvergenceState>,
    /// final classification
    pub index: BusIndex,
    /// injections after Q-limit pinning and slack distribution
    pub s0: DVector<Complex64>,
    pub reports: Vec<ConvergenceReport>,
    pub q_events: Vec<QLimitEvent>,
    pub outer_passes: usize,
    pub cancelled: bool,
}

impl ControlledSolution {
    pub fn converged(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.converged)
    }
}

/// Solves one island with `method`, interleaving inner solves with the
/// discrete controls enabled in `config`.
///
/// Controls act only once the inner solve is below the control tolerance.
/// Each pass that changes the injections or the bus types continues from
/// the current voltage; the loop ends when a pass changes nothing, after
/// `max_outer_loops` passes, or when `cancel` is raised.
pub fn solve_island<S: SparseSolver>(
    island: &NumericalIsland,
    method: SolverType,
    config: &PowerFlowConfig,
    solver: &mut S,
    cancel: Option<&AtomicBool>,
) -> Result<ControlledSolution, ConfigurationError> {
    let mut index = island.bus_index()?;
    let mut s0 = island.s0.clone();
    let mut v = island.v0.clone();
    let mut tracker = ReactiveLimitTracker::new(&island.q_min, &island.q_max);
    let mut reports = Vec::new();
    let mut state = None;
    let mut cancelled = false;
    let mut outer_passes = 0;

    let max_passes = config.max_outer_loops.max(1);
    while outer_passes < max_passes {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            cancelled = true;
            break;
        }
        outer_passes += 1;
        solver.reset();

        let pf = PowerFlowProblem {
            y_bus: &island.y_bus,
            s0: &s0,
            i0: &island.i0,
            y0: &island.y0,
        };
        let res = method.solve(&pf, &v, &index, config, solver);
        let report = ConvergenceReport::new(method, &res);
        if config.verbose {
            log::info!(
                "{} pass {}: converged={} |F|inf={:.3e} iterations={}",
                method,
                outer_passes,
                report.converged,
                report.norm_f,
                report.iterations
            );
        }
        reports.push(report);
        v = res.v.clone();

        let controls_active = config.control_q || config.distribute_slack;
        if !controls_active || !(res.norm_f < config.control_tolerance) {
            state = Some(res);
            break;
        }
        if outer_passes == max_passes {
            log::warn!("control loop stopped after {max_passes} passes, controls not re-checked");
            state = Some(res);
            break;
        }

        let mut next_s0 = s0.clone();
        let mut changed = false;
        if config.control_q {
            if let Some(next) = tracker.check(&pf, &res.v, &res.scalc, &index, &mut next_s0, &island.original_bus_idx)? {
                index = next;
                changed = true;
            }
        }
        if config.distribute_slack
            && distribute_slack(
                &pf,
                &res.v,
                &res.scalc,
                &index,
                &island.installed_power,
                &mut next_s0,
                config.tolerance,
            )
            .is_some()
        {
            changed = true;
        }
        state = Some(res);
        s0 = next_s0;
        if !changed {
            break;
        }
    }

    Ok(ControlledSolution {
        state,
        index,
        s0,
        reports,
        q_events: tracker.into_events(),
        outer_passes,
        cancelled,
    })
}
