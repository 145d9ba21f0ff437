use nalgebra::{Complex, DVector};
use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basic::{dsbus_dv::diag_csc, sparse::cast::Cast};

/// Read access to the sparse admittance description of a network.
///
/// `Cf`/`Ct` are the branch→bus incidence matrices of the "from" and "to"
/// terminals (M×N, one unit entry per row), `Yf`/`Yt` give the terminal
/// currents `If = Yf·V`, `It = Yt·V` and `Ybus` the nodal injections.
pub trait AdmittanceModel {
    fn y_bus(&self) -> &CscMatrix<Complex64>;
    fn y_f(&self) -> &CscMatrix<Complex64>;
    fn y_t(&self) -> &CscMatrix<Complex64>;
    fn c_f(&self) -> &CscMatrix<f64>;
    fn c_t(&self) -> &CscMatrix<f64>;

    fn n_bus(&self) -> usize {
        self.y_bus().nrows()
    }

    fn n_branch(&self) -> usize {
        self.c_f().nrows()
    }

    /// `(from, to)` bus of every branch, read off the incidence matrices.
    /// Branches with no terminal entry (inactive in the incidence) get `None`.
    fn branch_terminals(&self) -> Vec<Option<(usize, usize)>> {
        let mut from = vec![None; self.n_branch()];
        let mut to = vec![None; self.n_branch()];
        for (br, bus, _) in self.c_f().triplet_iter() {
            from[br] = Some(bus);
        }
        for (br, bus, _) in self.c_t().triplet_iter() {
            to[br] = Some(bus);
        }
        from.into_iter()
            .zip(to)
            .map(|(f, t)| f.zip(t))
            .collect()
    }
}

/// π-model branch with an off-nominal tap on the "from" side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiBranch {
    pub from: usize,
    pub to: usize,
    /// series resistance, p.u.
    pub r: f64,
    /// series reactance, p.u.
    pub x: f64,
    /// total shunt susceptance, p.u.
    pub b: f64,
    pub tap_module: f64,
    /// phase shift, radians
    pub tap_angle: f64,
}

impl Default for PiBranch {
    fn default() -> Self {
        Self {
            from: 0,
            to: 0,
            r: 0.0,
            x: 0.0,
            b: 0.0,
            tap_module: 1.0,
            tap_angle: 0.0,
        }
    }
}

/// Terminal admittances `[[yff, yft], [ytf, ytt]]` of one branch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchAdmittance {
    pub yff: Complex64,
    pub yft: Complex64,
    pub ytf: Complex64,
    pub ytt: Complex64,
}

impl From<&PiBranch> for BranchAdmittance {
    fn from(br: &PiBranch) -> Self {
        // 1e-20 keeps ideal (zero-impedance) data finite
        let ys = Complex64::new(1.0, 0.0) / Complex64::new(br.r, br.x + 1e-20);
        let bc2 = Complex64::new(0.0, br.b / 2.0);
        let m = br.tap_module;
        Self {
            yff: (ys + bc2) / (m * m),
            yft: -ys / (Complex::from_polar(m, -br.tap_angle)),
            ytf: -ys / (Complex::from_polar(m, br.tap_angle)),
            ytt: ys + bc2,
        }
    }
}

/// Admittance matrices assembled from branch data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmittanceMatrices {
    pub y_bus: CscMatrix<Complex64>,
    pub y_f: CscMatrix<Complex64>,
    pub y_t: CscMatrix<Complex64>,
    pub c_f: CscMatrix<f64>,
    pub c_t: CscMatrix<f64>,
}

impl AdmittanceModel for AdmittanceMatrices {
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

/// Assembles `Cf`, `Ct`, `Yf`, `Yt` and `Ybus` for `n_bus` buses.
///
/// Inactive branches keep their row in `Cf`/`Ct`/`Yf`/`Yt` but the row is
/// empty, so they carry no flow and do not enter `Ybus`.
///
/// `Yf = diag(yff)·Cf + diag(yft)·Ct`, `Yt = diag(ytf)·Cf + diag(ytt)·Ct`,
/// `Ybus = Cfᵀ·Yf + Ctᵀ·Yt + diag(y_shunt)`.
pub fn build_admittances(
    n_bus: usize,
    branches: &[PiBranch],
    branch_active: &[bool],
    y_shunt: &DVector<Complex64>,
) -> AdmittanceMatrices {
    let m = branches.len();
    let mut cf = CooMatrix::new(m, n_bus);
    let mut ct = CooMatrix::new(m, n_bus);
    let mut yff = Vec::with_capacity(m);
    let mut yft = Vec::with_capacity(m);
    let mut ytf = Vec::with_capacity(m);
    let mut ytt = Vec::with_capacity(m);
    for (k, br) in branches.iter().enumerate() {
        let active = branch_active.get(k).copied().unwrap_or(true);
        if active {
            cf.push(k, br.from, 1.0);
            ct.push(k, br.to, 1.0);
        }
        let y = BranchAdmittance::from(br);
        yff.push(y.yff);
        yft.push(y.yft);
        ytf.push(y.ytf);
        ytt.push(y.ytt);
    }
    let c_f = CscMatrix::from(&cf);
    let c_t = CscMatrix::from(&ct);
    let (cfc, ctc) = (c_f.cast(), c_t.cast());

    let y_f = &diag_csc(&yff) * &cfc + &diag_csc(&yft) * &ctc;
    let y_t = &diag_csc(&ytf) * &cfc + &diag_csc(&ytt) * &ctc;
    let y_bus = &cfc.transpose() * &y_f + &ctc.transpose() * &y_t + diag_csc(y_shunt.as_slice());
    AdmittanceMatrices {
        y_bus,
        y_f,
        y_t,
        c_f,
        c_t,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn test_two_bus_line() {
        let br = PiBranch {
            from: 0,
            to: 1,
            r: 0.01,
            x: 0.05,
            b: 0.02,
            ..Default::default()
        };
        let adm = build_admittances(2, &[br], &[true], &DVector::zeros(2));
        let ybus = DMatrix::from(&adm.y_bus);
        println!("Ybus={}", ybus);
        let ys = Complex64::new(1.0, 0.0) / Complex64::new(0.01, 0.05);
        assert!((ybus[(0, 1)] + ys).norm() < 1e-9);
        assert!((ybus[(0, 0)] - ys - Complex64::new(0.0, 0.01)).norm() < 1e-9);
        assert_eq!(adm.branch_terminals(), vec![Some((0, 1))]);
    }

    #[test]
    fn test_inactive_branch_dropped() {
        let br = |f, t| PiBranch {
            from: f,
            to: t,
            r: 0.0,
            x: 0.1,
            ..Default::default()
        };
        let adm = build_admittances(3, &[br(0, 1), br(1, 2)], &[true, false], &DVector::zeros(3));
        let ybus = DMatrix::from(&adm.y_bus);
        assert_eq!(ybus[(2, 2)], Complex64::new(0.0, 0.0));
        assert_eq!(adm.y_f.nrows(), 2);
        assert_eq!(adm.branch_terminals(), vec![Some((0, 1)), None]);
    }

    #[test]
    fn test_phase_shifter_is_not_symmetric() {
        let br = PiBranch {
            from: 0,
            to: 1,
            x: 0.1,
            tap_module: 1.05,
            tap_angle: 0.1,
            ..Default::default()
        };
        let y = BranchAdmittance::from(&br);
        assert!((y.yft - y.ytf).norm() > 1e-3);
        assert!((y.yff * 1.05 * 1.05 - y.ytt).norm() < 1e-9);
    }
}
