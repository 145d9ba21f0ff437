pub mod admittance;
pub mod bus_types;
pub mod circuit;
pub mod topology;

pub use admittance::{AdmittanceMatrices, AdmittanceModel, BranchAdmittance, PiBranch, build_admittances};
pub use bus_types::{BusIndex, BusType};
pub use circuit::{BranchData, BusData, NumericalCircuit};
pub use topology::{NumericalIsland, TopologyWarning, find_islands};
