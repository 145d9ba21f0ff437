use derive_more::Display;
use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{
    admittance::AdmittanceModel,
    bus_types::{BusIndex, BusType},
    circuit::NumericalCircuit,
};
use crate::basic::{
    error::ConfigurationError,
    sparse::slice::{Select, gather},
};

/// Union-find over bus indices with path compression and union by rank.
#[derive(Default, Debug, Clone)]
pub(crate) struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u32>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = node;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Groups active buses into connected components over active branches.
///
/// Islands come out ordered by their lowest bus index and each island lists
/// its buses ascending, so the result does not depend on branch order.
/// Active buses without active branches form singleton islands; inactive
/// buses belong to no island.
pub fn find_islands(
    terminals: &[Option<(usize, usize)>],
    bus_active: &[bool],
    branch_active: &[bool],
) -> Vec<Vec<usize>> {
    let n = bus_active.len();
    let mut dsu = DisjointSet::new(n);
    for (k, t) in terminals.iter().enumerate() {
        if let Some((f, to)) = *t {
            let active = branch_active.get(k).copied().unwrap_or(true);
            if active && bus_active[f] && bus_active[to] {
                dsu.union(f, to);
            }
        }
    }

    let mut island_of_root: Vec<Option<usize>> = vec![None; n];
    let mut islands: Vec<Vec<usize>> = Vec::new();
    for bus in (0..n).filter(|&b| bus_active[b]) {
        let root = dsu.find(bus);
        let id = *island_of_root[root].get_or_insert_with(|| {
            islands.push(Vec::new());
            islands.len() - 1
        });
        islands[id].push(bus);
    }
    islands
}

/// Reason an island is not handed to the iterative solver.
#[derive(Debug, Display, Clone, PartialEq, Serialize, Deserialize)]
pub enum TopologyWarning {
    #[display("island has no slack bus")]
    NoSlack,
    #[display("island has {} slack buses {:?}", _0.len(), _0)]
    MultipleSlack(Vec<usize>),
}

/// One connected subnetwork in local numbering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericalIsland {
    pub sbase: f64,
    pub y_bus: CscMatrix<Complex64>,
    pub y_f: CscMatrix<Complex64>,
    pub y_t: CscMatrix<Complex64>,
    pub c_f: CscMatrix<f64>,
    pub c_t: CscMatrix<f64>,
    pub s0: DVector<Complex64>,
    pub i0: DVector<Complex64>,
    pub y0: DVector<Complex64>,
    pub v0: DVector<Complex64>,
    pub bus_types: Vec<BusType>,
    pub q_min: DVector<f64>,
    pub q_max: DVector<f64>,
    pub installed_power: DVector<f64>,
    pub rates: DVector<f64>,
    /// local bus → global bus
    pub original_bus_idx: Vec<usize>,
    /// local branch → global branch
    pub original_branch_idx: Vec<usize>,
}

impl NumericalIsland {
    pub fn n_bus(&self) -> usize {
        self.original_bus_idx.len()
    }

    /// Validated bus classification of this island.
    pub fn bus_index(&self) -> Result<BusIndex, ConfigurationError> {
        BusIndex::from_types(&self.bus_types)
    }

    /// `None` when the island has exactly one slack bus.
    pub fn topology_warning(&self) -> Option<TopologyWarning> {
        let slack: Vec<usize> = self
            .bus_types
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == BusType::Slack)
            .map(|(i, _)| self.original_bus_idx[i])
            .collect();
        match slack.len() {
            0 => Some(TopologyWarning::NoSlack),
            1 => None,
            _ => Some(TopologyWarning::MultipleSlack(slack)),
        }
    }
}

impl AdmittanceModel for NumericalIsland {
    fn y_bus(&self) -> &CscMatrix<Complex64> {
        &self.y_bus
    }
    fn y_f(&self) -> &CscMatrix<Complex64> {
        &self.y_f
    }
    fn y_t(&self) -> &CscMatrix<Complex64> {
        &self.y_t
    }
    fn c_f(&self) -> &CscMatrix<f64> {
        &self.c_f
    }
    fn c_t(&self) -> &CscMatrix<f64> {
        &self.c_t
    }
}

impl NumericalCircuit {
    /// Splits the circuit into independently solvable islands.
    pub fn split_into_islands(&self) -> Vec<NumericalIsland> {
        let terminals = self.branch_terminals();
        let islands = find_islands(&terminals, &self.bus_active, &self.branch_active);
        let mut island_of_bus: Vec<Option<usize>> = vec![None; self.n_bus()];
        for (id, buses) in islands.iter().enumerate() {
            for &b in buses {
                island_of_bus[b] = Some(id);
            }
        }
        let mut branches: Vec<Vec<usize>> = vec![Vec::new(); islands.len()];
        for (k, t) in terminals.iter().enumerate() {
            if !self.branch_active[k] {
                continue;
            }
            if let Some((f, to)) = *t {
                match (island_of_bus[f], island_of_bus[to]) {
                    (Some(a), Some(b)) if a == b => branches[a].push(k),
                    _ => {}
                }
            }
        }

        islands
            .into_iter()
            .zip(branches)
            .map(|(buses, brs)| self.island(buses, brs))
            .collect()
    }

    fn island(&self, buses: Vec<usize>, branches: Vec<usize>) -> NumericalIsland {
        NumericalIsland {
            sbase: self.sbase,
            y_bus: self.y_bus.select(&buses, &buses),
            y_f: self.y_f.select(&branches, &buses),
            y_t: self.y_t.select(&branches, &buses),
            c_f: self.c_f.select(&branches, &buses),
            c_t: self.c_t.select(&branches, &buses),
            s0: gather(&self.s0, &buses),
            i0: gather(&self.i0, &buses),
            y0: gather(&self.y0, &buses),
            v0: gather(&self.v0, &buses),
            bus_types: buses.iter().map(|&b| self.bus_types[b]).collect(),
            q_min: gather(&self.q_min, &buses),
            q_max: gather(&self.q_max, &buses),
            installed_power: gather(&self.installed_power, &buses),
            rates: gather(&self.rates, &branches),
            original_bus_idx: buses,
            original_branch_idx: branches,
        }
    }
}
