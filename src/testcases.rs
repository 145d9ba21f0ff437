//! Small networks shared by the unit tests.

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

use crate::basic::{
    mismatch::PowerFlowProblem,
    system::{BranchData, BusData, BusIndex, BusType, NumericalCircuit, PiBranch},
};

pub fn line(from: usize, to: usize) -> BranchData {
    BranchData {
        model: PiBranch {
            from,
            to,
            r: 0.01,
            x: 0.05,
            ..Default::default()
        },
        rate_mva: 100.0,
        active: true,
    }
}

/// Triangle: slack at bus 0, a 40 MW PV generator at bus 1 and a
/// 25 MW / 10 MVAr load at bus 2, Sbase 100 MVA.
pub fn three_bus_records() -> (Vec<BusData>, Vec<BranchData>) {
    let buses = vec![
        BusData {
            bus_type: BusType::Slack,
            installed_p_mw: 200.0,
            ..Default::default()
        },
        BusData {
            bus_type: BusType::PV,
            p_mw: 40.0,
            installed_p_mw: 100.0,
            ..Default::default()
        },
        BusData {
            p_mw: -25.0,
            q_mvar: -10.0,
            ..Default::default()
        },
    ];
    (buses, vec![line(0, 1), line(1, 2), line(0, 2)])
}

pub fn three_bus() -> NumericalCircuit {
    let (buses, branches) = three_bus_records();
    NumericalCircuit::compile(100.0, &buses, &branches).expect("valid three bus network")
}

/// Buses 0-1-2 (triangle with slack at 0, branches 0..3) and buses 3-4
/// (branch 3) without a slack.
pub fn two_islands() -> NumericalCircuit {
    let mut buses = vec![
        BusData {
            bus_type: BusType::Slack,
            ..Default::default()
        },
        BusData {
            p_mw: -20.0,
            q_mvar: -5.0,
            ..Default::default()
        },
        BusData {
            p_mw: -10.0,
            ..Default::default()
        },
    ];
    buses.extend([
        BusData {
            p_mw: 5.0,
            ..Default::default()
        },
        BusData {
            p_mw: -5.0,
            ..Default::default()
        },
    ]);
    let branches = vec![line(0, 1), line(1, 2), line(0, 2), line(3, 4)];
    NumericalCircuit::compile(100.0, &buses, &branches).expect("valid two island network")
}

/// Slack at bus 0, a 30 MW generator at bus 1 regulating the voltage of the
/// load bus 2 to 1.0 p.u., and a PQ load at bus 3. Ring 0-1-2-3-0.
pub fn remote_control() -> NumericalCircuit {
    let buses = vec![
        BusData {
            bus_type: BusType::Slack,
            installed_p_mw: 200.0,
            ..Default::default()
        },
        BusData {
            bus_type: BusType::P,
            p_mw: 30.0,
            installed_p_mw: 60.0,
            ..Default::default()
        },
        BusData {
            bus_type: BusType::PQV,
            p_mw: -40.0,
            q_mvar: -15.0,
            ..Default::default()
        },
        BusData {
            p_mw: -20.0,
            q_mvar: -5.0,
            ..Default::default()
        },
    ];
    let branches = vec![line(0, 1), line(1, 2), line(2, 3), line(0, 3)];
    NumericalCircuit::compile(100.0, &buses, &branches).expect("valid remote control network")
}

/// A single slack bus and nothing else.
pub fn slack_only() -> NumericalCircuit {
    let bus = BusData {
        bus_type: BusType::Slack,
        vm: 1.01,
        ..Default::default()
    };
    NumericalCircuit::compile(100.0, &[bus], &[]).expect("valid single bus network")
}

/// Owned solver inputs of a single-island circuit.
pub struct ScenarioData {
    pub y_bus: CscMatrix<Complex64>,
    pub s0: DVector<Complex64>,
    pub i0: DVector<Complex64>,
    pub y0: DVector<Complex64>,
    pub v0: DVector<Complex64>,
    pub index: BusIndex,
}

impl ScenarioData {
    pub fn problem(&self) -> PowerFlowProblem<'_> {
        PowerFlowProblem {
            y_bus: &self.y_bus,
            s0: &self.s0,
            i0: &self.i0,
            y0: &self.y0,
        }
    }
}

impl From<&NumericalCircuit> for ScenarioData {
    fn from(nc: &NumericalCircuit) -> Self {
        Self {
            y_bus: nc.y_bus.clone(),
            s0: nc.s0.clone(),
            i0: nc.i0.clone(),
            y0: nc.y0.clone(),
            v0: nc.v0.clone(),
            index: BusIndex::from_types(&nc.bus_types).expect("valid bus types"),
        }
    }
}
