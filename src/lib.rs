mod basic;
#[cfg(test)]
pub(crate) mod testcases;
pub mod prelude {
    use crate::basic;
    pub use basic::*;

    pub use basic::error::{ConfigurationError, PowerFlowError, SolverError};
    pub use basic::mismatch::{ConvergenceState, PowerFlowProblem, Termination};
    pub use basic::powerflow::prelude::*;
    pub use basic::system::*;
}
