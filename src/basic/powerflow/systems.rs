use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{
    config::{ConvergenceReport, PowerFlowConfig, SolverType},
    nonlinear_schedule::{ControlledSolution, solve_island},
    post_processing::branch_flows,
    result_extract::{IslandReport, IslandSolution, IslandStatus, PowerFlowResults, ResultsAggregator},
};
use crate::basic::{
    error::{ConfigurationError, PowerFlowError},
    solver::{DefaultSolver, SparseSolver},
    system::{AdmittanceModel, NumericalCircuit, NumericalIsland, TopologyWarning},
};

/// Runs a power flow with the default sparse backend.
pub fn run_power_flow(circuit: &NumericalCircuit, config: &PowerFlowConfig) -> Result<PowerFlowResults, PowerFlowError> {
    run_power_flow_with::<DefaultSolver>(circuit, config, None)
}

/// Like [`run_power_flow`], but stops starting new work once `cancel` is set.
pub fn run_power_flow_cancellable(
    circuit: &NumericalCircuit,
    config: &PowerFlowConfig,
    cancel: &AtomicBool,
) -> Result<PowerFlowResults, PowerFlowError> {
    run_power_flow_with::<DefaultSolver>(circuit, config, Some(cancel))
}

/// Splits the circuit into islands, solves each one with its own `S` and
/// assembles the full-system results.
///
/// Islands without exactly one slack bus are reported and skipped. With the
/// `parallel` feature the islands are solved concurrently.
pub fn run_power_flow_with<S: SparseSolver + Default>(
    circuit: &NumericalCircuit,
    config: &PowerFlowConfig,
    cancel: Option<&AtomicBool>,
) -> Result<PowerFlowResults, PowerFlowError> {
    let start = Instant::now();
    circuit.validate()?;
    let islands = circuit.split_into_islands();
    log::debug!("{} buses split into {} islands", circuit.n_bus(), islands.len());

    #[cfg(feature = "parallel")]
    let solutions: Vec<Result<IslandSolution, ConfigurationError>> = islands
        .par_iter()
        .map(|island| run_island::<S>(island, config, cancel))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let solutions: Vec<Result<IslandSolution, ConfigurationError>> = islands
        .iter()
        .map(|island| run_island::<S>(island, config, cancel))
        .collect();

    let mut agg = ResultsAggregator::new(&circuit.bus_types, circuit.branch_terminals());
    for (island, solution) in islands.iter().zip(solutions) {
        agg.add(island, solution?)?;
    }
    let results = agg.finish(start.elapsed());
    log::info!(
        "power flow finished: converged={} islands={} |F|inf={:.3e} in {:?}",
        results.converged,
        results.n_islands(),
        results.norm_f,
        results.elapsed
    );
    Ok(results)
}

fn run_island<S: SparseSolver + Default>(
    island: &NumericalIsland,
    config: &PowerFlowConfig,
    cancel: Option<&AtomicBool>,
) -> Result<IslandSolution, ConfigurationError> {
    let warning = island.topology_warning();
    if let Some(w) = &warning {
        log::warn!("island with buses {:?} skipped: {}", island.original_bus_idx, w);
        return Ok(unsolved(island, IslandStatus::Skipped, warning));
    }
    if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
        return Ok(unsolved(island, IslandStatus::Cancelled, None));
    }

    let mut solver = S::default();
    let mut sol = solve_island(island, config.solver_type, config, &mut solver, cancel)?;
    let mut reports = std::mem::take(&mut sol.reports);
    let mut outer_passes = sol.outer_passes;
    if !sol.converged() && !sol.cancelled && config.retry_with_other_methods {
        for method in config.solver_type.fallbacks() {
            log::info!("retrying island {:?} with {}", island.original_bus_idx, method);
            let mut retry = solve_island(island, method, config, &mut S::default(), cancel)?;
            reports.append(&mut retry.reports);
            outer_passes += retry.outer_passes;
            sol = retry;
            if sol.converged() || sol.cancelled {
                break;
            }
        }
    }

    let status = if sol.converged() {
        IslandStatus::Converged
    } else if sol.cancelled {
        IslandStatus::Cancelled
    } else {
        IslandStatus::NotConverged
    };
    log::info!(
        "island {:?}: {} after {} inner solves",
        island.original_bus_idx,
        status,
        reports.len()
    );
    Ok(solved(island, sol, status, reports, outer_passes))
}

fn unsolved(island: &NumericalIsland, status: IslandStatus, warning: Option<TopologyWarning>) -> IslandSolution {
    IslandSolution {
        report: IslandReport {
            buses: island.original_bus_idx.clone(),
            status,
            warning,
            reports: Vec::new(),
            outer_passes: 0,
        },
        v: island.v0.clone(),
        flows: None,
        bus_types: island.bus_types.clone(),
        q_events: Vec::new(),
    }
}

fn solved(
    island: &NumericalIsland,
    sol: ControlledSolution,
    status: IslandStatus,
    reports: Vec<ConvergenceReport>,
    outer_passes: usize,
) -> IslandSolution {
    let (v, flows) = match sol.state {
        Some(state) => {
            let flows = branch_flows(island, &state.v, island.sbase, &island.rates);
            (state.v, Some(flows))
        }
        None => (island.v0.clone(), None),
    };
    IslandSolution {
        report: IslandReport {
            buses: island.original_bus_idx.clone(),
            status,
            warning: None,
            reports,
            outer_passes,
        },
        v,
        flows,
        bus_types: sol.index.types().to_vec(),
        q_events: sol.q_events,
    }
}
