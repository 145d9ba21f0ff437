use nalgebra::{Complex, DVector};
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{
    admittance::{AdmittanceModel, PiBranch, build_admittances},
    bus_types::BusType,
};
use crate::basic::error::ConfigurationError;

/// Bus record used by [`NumericalCircuit::compile`].
///
/// Powers are injections in MW/MVAr (generation positive, load negative);
/// the ZIP current and impedance parts are given at 1 p.u. voltage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusData {
    pub bus_type: BusType,
    pub active: bool,
    /// voltage magnitude setpoint or initial guess, p.u.
    pub vm: f64,
    /// initial angle, radians
    pub va: f64,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub ip_mw: f64,
    pub iq_mvar: f64,
    pub yp_mw: f64,
    pub yq_mvar: f64,
    pub q_min_mvar: f64,
    pub q_max_mvar: f64,
    /// share key for distributed slack
    pub installed_p_mw: f64,
}

impl Default for BusData {
    fn default() -> Self {
        Self {
            bus_type: BusType::PQ,
            active: true,
            vm: 1.0,
            va: 0.0,
            p_mw: 0.0,
            q_mvar: 0.0,
            ip_mw: 0.0,
            iq_mvar: 0.0,
            yp_mw: 0.0,
            yq_mvar: 0.0,
            q_min_mvar: f64::NEG_INFINITY,
            q_max_mvar: f64::INFINITY,
            installed_p_mw: 0.0,
        }
    }
}

/// Branch record used by [`NumericalCircuit::compile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchData {
    pub model: PiBranch,
    /// thermal rating, MVA
    pub rate_mva: f64,
    pub active: bool,
}

/// Complete per-unit description of a network, ready to be split into
/// islands and solved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericalCircuit {
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
    pub bus_active: Vec<bool>,
    pub branch_active: Vec<bool>,
    /// reactive limits, p.u.
    pub q_min: DVector<f64>,
    pub q_max: DVector<f64>,
    /// p.u.
    pub installed_power: DVector<f64>,
    /// MVA
    pub rates: DVector<f64>,
}

impl NumericalCircuit {
    /// Converts bus and branch records into per-unit vectors and sparse
    /// admittance matrices.
    pub fn compile(
        sbase: f64,
        buses: &[BusData],
        branches: &[BranchData],
    ) -> Result<Self, ConfigurationError> {
        let n = buses.len();
        for (k, br) in branches.iter().enumerate() {
            for bus in [br.model.from, br.model.to] {
                if bus >= n {
                    return Err(ConfigurationError::BranchTerminal { branch: k, bus, n });
                }
            }
        }
        let pu = |mw: f64, mvar: f64| Complex::new(mw / sbase, mvar / sbase);
        let models: Vec<PiBranch> = branches.iter().map(|b| b.model.clone()).collect();
        let bus_active: Vec<bool> = buses.iter().map(|b| b.active).collect();
        // a branch is only in service when both of its terminals are
        let branch_active: Vec<bool> = branches
            .iter()
            .map(|b| b.active && bus_active[b.model.from] && bus_active[b.model.to])
            .collect();
        let adm = build_admittances(n, &models, &branch_active, &DVector::zeros(n));

        Ok(Self {
            sbase,
            y_bus: adm.y_bus,
            y_f: adm.y_f,
            y_t: adm.y_t,
            c_f: adm.c_f,
            c_t: adm.c_t,
            s0: DVector::from_iterator(n, buses.iter().map(|b| pu(b.p_mw, b.q_mvar))),
            i0: DVector::from_iterator(n, buses.iter().map(|b| pu(b.ip_mw, b.iq_mvar))),
            y0: DVector::from_iterator(n, buses.iter().map(|b| pu(b.yp_mw, b.yq_mvar))),
            v0: DVector::from_iterator(n, buses.iter().map(|b| Complex::from_polar(b.vm, b.va))),
            bus_types: buses.iter().map(|b| b.bus_type).collect(),
            bus_active,
            branch_active,
            q_min: DVector::from_iterator(n, buses.iter().map(|b| b.q_min_mvar / sbase)),
            q_max: DVector::from_iterator(n, buses.iter().map(|b| b.q_max_mvar / sbase)),
            installed_power: DVector::from_iterator(n, buses.iter().map(|b| b.installed_p_mw / sbase)),
            rates: DVector::from_iterator(branches.len(), branches.iter().map(|b| b.rate_mva)),
        })
    }

    /// Checks that every per-bus and per-branch array matches the matrices.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let n = self.y_bus.nrows();
        let m = self.c_f.nrows();
        let check = |what: &'static str, found: usize, expected: usize| {
            if found == expected {
                Ok(())
            } else {
                Err(ConfigurationError::Dimension {
                    what,
                    found,
                    expected,
                })
            }
        };
        check("Ybus columns", self.y_bus.ncols(), n)?;
        for (what, mat_rows, mat_cols) in [
            ("Yf", self.y_f.nrows(), self.y_f.ncols()),
            ("Yt", self.y_t.nrows(), self.y_t.ncols()),
            ("Ct", self.c_t.nrows(), self.c_t.ncols()),
        ] {
            check(what, mat_rows, m)?;
            check(what, mat_cols, n)?;
        }
        check("Cf columns", self.c_f.ncols(), n)?;
        check("S0", self.s0.len(), n)?;
        check("I0", self.i0.len(), n)?;
        check("Y0", self.y0.len(), n)?;
        check("V0", self.v0.len(), n)?;
        check("bus types", self.bus_types.len(), n)?;
        check("bus active flags", self.bus_active.len(), n)?;
        check("Qmin", self.q_min.len(), n)?;
        check("Qmax", self.q_max.len(), n)?;
        check("installed power", self.installed_power.len(), n)?;
        check("branch active flags", self.branch_active.len(), m)?;
        check("rates", self.rates.len(), m)?;
        Ok(())
    }
}

impl AdmittanceModel for NumericalCircuit {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_per_unit() {
        let buses = vec![
            BusData {
                bus_type: BusType::Slack,
                vm: 1.02,
                ..Default::default()
            },
            BusData {
                p_mw: -50.0,
                q_mvar: -20.0,
                q_max_mvar: 30.0,
                ..Default::default()
            },
        ];
        let branches = vec![BranchData {
            model: PiBranch {
                from: 0,
                to: 1,
                r: 0.01,
                x: 0.1,
                ..Default::default()
            },
            rate_mva: 80.0,
            active: true,
        }];
        let nc = NumericalCircuit::compile(100.0, &buses, &branches).unwrap();
        nc.validate().unwrap();
        assert_eq!(nc.s0[1], Complex::new(-0.5, -0.2));
        assert_eq!(nc.q_max[1], 0.3);
        assert!((nc.v0[0].norm() - 1.02).abs() < 1e-15);
        assert_eq!(nc.n_branch(), 1);
    }

    #[test]
    fn test_compile_rejects_bad_terminal() {
        let branches = vec![BranchData {
            model: PiBranch {
                from: 0,
                to: 7,
                x: 0.1,
                ..Default::default()
            },
            rate_mva: 0.0,
            active: true,
        }];
        let err = NumericalCircuit::compile(100.0, &[BusData::default()], &branches).unwrap_err();
        println!("{}", err);
        assert_eq!(err, ConfigurationError::BranchTerminal { branch: 0, bus: 7, n: 1 });
    }

    #[test]
    fn test_validate_dimensions() {
        let mut nc = NumericalCircuit::compile(100.0, &vec![BusData::default(); 2], &[]).unwrap();
        nc.q_min = DVector::zeros(1);
        assert!(matches!(
            nc.validate(),
            Err(ConfigurationError::Dimension { what: "Qmin", .. })
        ));
    }

    #[test]
    fn test_branch_to_inactive_bus_is_out_of_service() {
        let (mut buses, mut branches) = crate::testcases::three_bus_records();
        let reference = NumericalCircuit::compile(100.0, &buses, &branches).unwrap();
        buses.push(BusData {
            active: false,
            ..Default::default()
        });
        branches.push(crate::testcases::line(2, 3));
        let nc = NumericalCircuit::compile(100.0, &buses, &branches).unwrap();
        assert!(branches[3].active);
        assert_eq!(nc.branch_active, vec![true, true, true, false]);
        let y22 = |nc: &NumericalCircuit| nc.y_bus.get_entry(2, 2).unwrap().into_value();
        assert_eq!(y22(&nc), y22(&reference), "dead line left in the diagonal");
        assert_eq!(nc.y_bus.get_entry(3, 3).unwrap().into_value(), Complex::new(0.0, 0.0));
    }
}
