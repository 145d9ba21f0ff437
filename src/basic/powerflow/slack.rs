use nalgebra::DVector;
use num_complex::Complex64;

use crate::basic::{mismatch::PowerFlowProblem, system::BusIndex};

/// Active-power excess of the slack buses, `Σ Re(Scalc − Sspec)` over the
/// slack set.
pub fn slack_excess(pf: &PowerFlowProblem, v: &DVector<Complex64>, scalc: &DVector<Complex64>, index: &BusIndex) -> f64 {
    let vm = v.map(|e| e.norm());
    let sspec = pf.specified_power(&vm);
    index.vd().iter().map(|&i| scalc[i].re - sspec[i].re).sum()
}

/// Moves the slack excess onto the non-slack buses in proportion to their
/// installed power.
///
/// Returns the amount distributed, or `None` when the excess is within `tol`
/// or no non-slack bus has installed power.
pub fn distribute_slack(
    pf: &PowerFlowProblem,
    v: &DVector<Complex64>,
    scalc: &DVector<Complex64>,
    index: &BusIndex,
    installed_power: &DVector<f64>,
    s0: &mut DVector<Complex64>,
    tol: f64,
) -> Option<f64> {
    let excess = slack_excess(pf, v, scalc, index);
    if excess.abs() <= tol {
        return None;
    }
    let participants = index.idx_dp();
    let total: f64 = participants.iter().map(|&i| installed_power[i].max(0.0)).sum();
    if total <= 0.0 {
        log::debug!("slack excess {excess:.3e} p.u. kept at the slack, no installed power to share it");
        return None;
    }
    for &i in participants {
        s0[i].re += excess * installed_power[i].max(0.0) / total;
    }
    log::debug!("distributed {excess:.3e} p.u. over {} buses", participants.len());
    Some(excess)
}
