use std::time::Duration;

use derive_more::Display;
use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tabled::{Table, settings::Style};

use super::{
    config::ConvergenceReport,
    post_processing::{
        BranchFlowResult,
        res_display::{BusResTable, FloatWrapper, LineResTable},
    },
    qlim::QLimitEvent,
};
use crate::basic::{
    error::PowerFlowError,
    sparse::slice::scatter,
    system::{BusType, NumericalIsland, TopologyWarning},
};

/// What happened to an island.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IslandStatus {
    #[display("converged")]
    Converged,
    #[display("not converged")]
    NotConverged,
    /// not handed to a solver because of a topology warning
    #[display("skipped")]
    Skipped,
    #[display("cancelled")]
    Cancelled,
}

/// Per-island summary attached to [`PowerFlowResults`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IslandReport {
    /// global buses of the island, ascending
    pub buses: Vec<usize>,
    pub status: IslandStatus,
    pub warning: Option<TopologyWarning>,
    /// one entry per inner solve, retries included
    pub reports: Vec<ConvergenceReport>,
    pub outer_passes: usize,
}

impl IslandReport {
    pub fn converged(&self) -> bool {
        self.status == IslandStatus::Converged
    }

    pub fn norm_f(&self) -> f64 {
        self.reports.last().map_or(f64::INFINITY, |r| r.norm_f)
    }

    pub fn iterations(&self) -> usize {
        self.reports.iter().map(|r| r.iterations).sum()
    }
}

/// Everything one island contributes to the system-wide results.
#[derive(Debug, Clone)]
pub struct IslandSolution {
    pub report: IslandReport,
    /// final voltage in local numbering
    pub v: DVector<Complex64>,
    /// `None` for islands that were never solved
    pub flows: Option<BranchFlowResult>,
    pub bus_types: Vec<BusType>,
    pub q_events: Vec<QLimitEvent>,
}

/// Full-system power-flow results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerFlowResults {
    pub v: DVector<Complex64>,
    /// MVA
    pub s_bus: DVector<Complex64>,
    /// MVA
    pub sf: DVector<Complex64>,
    /// MVA
    pub st: DVector<Complex64>,
    pub i_f: DVector<Complex64>,
    pub i_t: DVector<Complex64>,
    pub v_branch: DVector<Complex64>,
    pub loading: DVector<f64>,
    /// MVA
    pub losses: DVector<Complex64>,
    /// every island converged
    pub converged: bool,
    /// worst island
    pub norm_f: f64,
    /// worst island
    pub iterations: usize,
    pub elapsed: Duration,
    pub islands: Vec<IslandReport>,
    pub q_limit_events: Vec<QLimitEvent>,
    /// bus types after the controls
    pub bus_types: Vec<BusType>,
    /// `(from, to)` per branch
    pub terminals: Vec<Option<(usize, usize)>>,
}

/// Scatters island results into the global arrays.
///
/// A global bus or branch written by two islands is rejected, since the
/// island split is supposed to be a partition.
pub struct ResultsAggregator {
    results: PowerFlowResults,
    bus_written: Vec<bool>,
    branch_written: Vec<bool>,
}

impl ResultsAggregator {
    /// `bus_types` are the input types; inactive buses keep them and `V = 0`.
    pub fn new(bus_types: &[BusType], terminals: Vec<Option<(usize, usize)>>) -> Self {
        let n = bus_types.len();
        let m = terminals.len();
        Self {
            results: PowerFlowResults {
                v: DVector::zeros(n),
                s_bus: DVector::zeros(n),
                sf: DVector::zeros(m),
                st: DVector::zeros(m),
                i_f: DVector::zeros(m),
                i_t: DVector::zeros(m),
                v_branch: DVector::zeros(m),
                loading: DVector::zeros(m),
                losses: DVector::zeros(m),
                converged: true,
                norm_f: 0.0,
                iterations: 0,
                elapsed: Duration::ZERO,
                islands: Vec::new(),
                q_limit_events: Vec::new(),
                bus_types: bus_types.to_vec(),
                terminals,
            },
            bus_written: vec![false; n],
            branch_written: vec![false; m],
        }
    }

    pub fn add(&mut self, island: &NumericalIsland, solution: IslandSolution) -> Result<(), PowerFlowError> {
        for &g in &island.original_bus_idx {
            if std::mem::replace(&mut self.bus_written[g], true) {
                return Err(PowerFlowError::IndexAliasing { kind: "bus", index: g });
            }
        }
        for &g in &island.original_branch_idx {
            if std::mem::replace(&mut self.branch_written[g], true) {
                return Err(PowerFlowError::IndexAliasing { kind: "branch", index: g });
            }
        }

        let r = &mut self.results;
        let (buses, branches) = (&island.original_bus_idx, &island.original_branch_idx);
        scatter(&solution.v, buses, &mut r.v);
        for (local, &g) in buses.iter().enumerate() {
            r.bus_types[g] = solution.bus_types[local];
        }
        if let Some(flows) = &solution.flows {
            scatter(&flows.s_bus, buses, &mut r.s_bus);
            scatter(&flows.sf, branches, &mut r.sf);
            scatter(&flows.st, branches, &mut r.st);
            scatter(&flows.i_f, branches, &mut r.i_f);
            scatter(&flows.i_t, branches, &mut r.i_t);
            scatter(&flows.v_branch, branches, &mut r.v_branch);
            scatter(&flows.loading, branches, &mut r.loading);
            scatter(&flows.losses, branches, &mut r.losses);
        }

        let report = solution.report;
        r.converged &= report.converged();
        r.norm_f = r.norm_f.max(report.norm_f());
        r.iterations = r.iterations.max(report.iterations());
        r.q_limit_events.extend(solution.q_events);
        r.islands.push(report);
        Ok(())
    }

    pub fn finish(mut self, elapsed: Duration) -> PowerFlowResults {
        self.results.elapsed = elapsed;
        self.results
    }
}

impl PowerFlowResults {
    pub fn n_islands(&self) -> usize {
        self.islands.len()
    }

    /// Markdown table of the bus voltages and injections.
    pub fn bus_table(&self) -> String {
        let rows = (0..self.v.len()).map(|i| BusResTable {
            Bus: i,
            Type: self.bus_types[i].to_string(),
            Vm: FloatWrapper::new(self.v[i].norm(), 4),
            Va: FloatWrapper::new(self.v[i].arg().to_degrees(), 3),
            P_mw: FloatWrapper::new(self.s_bus[i].re, 3),
            Q_mvar: FloatWrapper::new(self.s_bus[i].im, 3),
        });
        Table::new(rows).with(Style::markdown()).to_string()
    }

    /// Markdown table of the branch flows.
    pub fn branch_table(&self) -> String {
        let terminal = |b: Option<usize>| b.map_or_else(|| "-".to_string(), |b| b.to_string());
        let rows = (0..self.sf.len()).map(|k| LineResTable {
            branch: k,
            from: terminal(self.terminals[k].map(|t| t.0)),
            to: terminal(self.terminals[k].map(|t| t.1)),
            p_from_mw: FloatWrapper::new(self.sf[k].re, 3),
            q_from_mvar: FloatWrapper::new(self.sf[k].im, 3),
            p_to_mw: FloatWrapper::new(self.st[k].re, 3),
            q_to_mvar: FloatWrapper::new(self.st[k].im, 3),
            pl_mw: FloatWrapper::new(self.losses[k].re, 4),
            ql_mvar: FloatWrapper::new(self.losses[k].im, 4),
            i_from_pu: FloatWrapper::new(self.i_f[k].norm(), 4),
            i_to_pu: FloatWrapper::new(self.i_t[k].norm(), 4),
            loading_percent: FloatWrapper::new(self.loading[k] * 100.0, 1),
        });
        Table::new(rows).with(Style::markdown()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcases::two_islands;

    fn skipped(island: &NumericalIsland) -> IslandSolution {
        IslandSolution {
            report: IslandReport {
                buses: island.original_bus_idx.clone(),
                status: IslandStatus::Skipped,
                warning: island.topology_warning(),
                reports: Vec::new(),
                outer_passes: 0,
            },
            v: island.v0.clone(),
            flows: None,
            bus_types: island.bus_types.clone(),
            q_events: Vec::new(),
        }
    }

    #[test]
    fn test_scatter_and_alias_check() {
        let nc = two_islands();
        let islands = nc.split_into_islands();
        let mut agg = ResultsAggregator::new(&nc.bus_types, vec![None; 4]);
        let mut first = skipped(&islands[0]);
        first.v = DVector::from_element(3, Complex64::new(0.5, 0.0));
        agg.add(&islands[0], first).unwrap();
        agg.add(&islands[1], skipped(&islands[1])).unwrap();
        // adding an island twice writes its buses twice
        let err = agg.add(&islands[1], skipped(&islands[1])).unwrap_err();
        assert_eq!(err, PowerFlowError::IndexAliasing { kind: "bus", index: 3 });

        let res = agg.finish(Duration::from_millis(1));
        assert_eq!(res.v[2], Complex64::new(0.5, 0.0));
        assert_eq!(res.v[4], nc.v0[4]);
        assert!(!res.converged);
        assert_eq!(res.norm_f, f64::INFINITY);
        assert_eq!(res.n_islands(), 2);
        println!("{}", res.bus_table());
        println!("{}", res.branch_table());
    }
}
