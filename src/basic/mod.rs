pub(crate) mod dsbus_dv;
pub mod error;
pub mod gauss_seidel;
pub mod jacobian;
pub mod levenberg;
pub mod mismatch;
pub(crate) mod newtonpf;
pub mod powerflow;
pub mod solver;
pub(crate) mod sparse;
pub mod system;

pub use gauss_seidel::gauss_seidel_pf;
pub use levenberg::levenberg_marquardt_pf;
pub use newtonpf::{NewtonStep, newton_pf};
