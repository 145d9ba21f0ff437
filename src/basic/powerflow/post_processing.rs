use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

pub(crate) mod res_display;

use crate::basic::{sparse::cast::Cast, system::AdmittanceModel};

/// Branch quantities of one island at a given voltage.
///
/// Powers are in MVA, currents in p.u. and loading is a fraction of the
/// branch rating.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchFlowResult {
    /// `V ⊙ conj(Ybus·V)`, MVA
    pub s_bus: DVector<Complex64>,
    pub sf: DVector<Complex64>,
    pub st: DVector<Complex64>,
    pub i_f: DVector<Complex64>,
    pub i_t: DVector<Complex64>,
    /// `Vf − Vt`, p.u.
    pub v_branch: DVector<Complex64>,
    pub loading: DVector<f64>,
    /// `Sf + St`, MVA
    pub losses: DVector<Complex64>,
}

/// Computes the branch flows of `model` at `v`.
pub fn branch_flows<M: AdmittanceModel + ?Sized>(
    model: &M,
    v: &DVector<Complex64>,
    sbase: f64,
    rates: &DVector<f64>,
) -> BranchFlowResult {
    let vf = &model.c_f().cast() * v;
    let vt = &model.c_t().cast() * v;
    let i_f = model.y_f() * v;
    let i_t = model.y_t() * v;
    let sf = vf.component_mul(&i_f.conjugate()) * Complex64::new(sbase, 0.0);
    let st = vt.component_mul(&i_t.conjugate()) * Complex64::new(sbase, 0.0);
    let losses = &sf + &st;
    let loading = DVector::from_fn(sf.len(), |k, _| sf[k].norm() / (rates[k] + 1e-20));
    let s_bus = v.component_mul(&(model.y_bus() * v).conjugate()) * Complex64::new(sbase, 0.0);

    for (k, l) in losses.iter().enumerate() {
        if l.re < -1e-9 {
            log::warn!("branch {k} has negative active losses ({:.6} MW)", l.re);
        }
    }

    BranchFlowResult {
        s_bus,
        sf,
        st,
        i_f,
        i_t,
        v_branch: vf - vt,
        loading,
        losses,
    }
}
