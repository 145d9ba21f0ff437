pub mod config;
pub mod nonlinear_schedule;
pub mod post_processing;
pub mod qlim;
pub mod result_extract;
pub mod slack;
pub mod systems;

pub mod prelude {
    pub use super::config::{ConvergenceReport, PowerFlowConfig, SolverType};
    pub use super::post_processing::BranchFlowResult;
    pub use super::qlim::{QLimitEvent, QLimitSide, ReactiveLimitTracker};
    pub use super::result_extract::{IslandReport, IslandStatus, PowerFlowResults};
    pub use super::systems::*;
}
