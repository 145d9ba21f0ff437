use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basic::{
    error::ConfigurationError,
    mismatch::PowerFlowProblem,
    system::{BusIndex, BusType},
};

/// Side of the reactive range that was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QLimitSide {
    Lower,
    Upper,
}

/// One PV/P → PQ reclassification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QLimitEvent {
    /// global bus index
    pub bus: usize,
    pub previous: BusType,
    pub side: QLimitSide,
    /// constant-power reactive injection before clamping, p.u.
    pub q: f64,
    /// value written into S0, p.u.
    pub bound: f64,
    /// global index of the PQV bus that lost its regulating P bus and became
    /// PQ along with it
    pub partner: Option<usize>,
}

/// Enforces generator reactive limits on the buses whose Q is free.
///
/// The limits apply to the constant-power part of the injection, i.e.
/// `Im(Scalc) − Im(I0·|V| + Y0·|V|²)`. A violating bus gets its S0 reactive
/// part pinned to the bound and becomes PQ; a P bus takes its paired PQV bus
/// with it. Buses are never promoted back, so the event list only grows
/// during a run.
#[derive(Debug, Clone)]
pub struct ReactiveLimitTracker {
    q_min: DVector<f64>,
    q_max: DVector<f64>,
    events: Vec<QLimitEvent>,
}

impl ReactiveLimitTracker {
    pub fn new(q_min: &DVector<f64>, q_max: &DVector<f64>) -> Self {
        Self {
            q_min: q_min.clone(),
            q_max: q_max.clone(),
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[QLimitEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<QLimitEvent> {
        self.events
    }

    /// Checks every PV and P bus at the voltage `v`, writes the bounds into
    /// `s0` and returns the reclassified snapshot, or `None` if all buses are
    /// within limits.
    pub fn check(
        &mut self,
        pf: &PowerFlowProblem,
        v: &DVector<Complex64>,
        scalc: &DVector<Complex64>,
        index: &BusIndex,
        s0: &mut DVector<Complex64>,
        original_bus_idx: &[usize],
    ) -> Result<Option<BusIndex>, ConfigurationError> {
        let mut demoted = Vec::new();
        for bus in (0..index.n_bus()).filter(|&b| index.bus_type(b).is_q_controlled()) {
            let vm = v[bus].norm();
            let q = scalc[bus].im - (pf.i0[bus].im * vm + pf.y0[bus].im * vm * vm);
            let side = if q > self.q_max[bus] {
                QLimitSide::Upper
            } else if q < self.q_min[bus] {
                QLimitSide::Lower
            } else {
                continue;
            };
            let bound = match side {
                QLimitSide::Upper => self.q_max[bus],
                QLimitSide::Lower => self.q_min[bus],
            };
            s0[bus].im = bound;
            let previous = index.bus_type(bus);
            let partner = match previous {
                BusType::P => index.p().iter().position(|&b| b == bus).map(|k| index.pqv()[k]),
                _ => None,
            };
            let event = QLimitEvent {
                bus: original_bus_idx[bus],
                previous,
                side,
                q,
                bound,
                partner: partner.map(|b| original_bus_idx[b]),
            };
            log::warn!(
                "bus {} ({}) reactive injection {:.4} p.u. beyond {:?} limit {:.4}, switching to PQ",
                event.bus,
                event.previous,
                q,
                side,
                bound
            );
            if let Some(b) = event.partner {
                log::warn!("bus {b} (PQV) loses its voltage setpoint with bus {}, switching to PQ", event.bus);
            }
            self.events.push(event);
            demoted.push(bus);
        }
        if demoted.is_empty() {
            return Ok(None);
        }
        index.demote_to_pq(&demoted).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{
        newtonpf::{NewtonStep, newton_pf},
        solver::DefaultSolver,
    };
    use crate::testcases::{ScenarioData, remote_control, three_bus};

    #[test]
    fn test_pv_bus_pinned_at_bound() {
        let mut data = ScenarioData::from(&three_bus());
        let mut solver = DefaultSolver::default();
        let res = newton_pf(&data.problem(), &data.v0, &data.index, 1e-9, 20, NewtonStep::Full, &mut solver);
        let q_free = res.scalc[1].im;
        println!("unconstrained Q at PV bus: {}", q_free);

        // a limit just below the unconstrained output must bind
        let limit = q_free - 0.05;
        let q_min = DVector::from_element(3, f64::NEG_INFINITY);
        let q_max = DVector::from_vec(vec![f64::INFINITY, limit, f64::INFINITY]);
        let mut tracker = ReactiveLimitTracker::new(&q_min, &q_max);
        let mut s0 = data.s0.clone();
        let next = tracker
            .check(&data.problem(), &res.v, &res.scalc, &data.index, &mut s0, &[0, 1, 2])
            .unwrap()
            .unwrap();
        assert_eq!(next.bus_type(1), BusType::PQ);
        assert_eq!(s0[1].im, limit);
        assert_eq!(tracker.events().len(), 1);
        assert_eq!(tracker.events()[0].side, QLimitSide::Upper);
        assert_eq!(tracker.events()[0].partner, None);

        data.s0 = s0;
        let res = newton_pf(&data.problem(), &res.v, &next, 1e-9, 20, NewtonStep::Full, &mut solver);
        assert!(res.converged);
        assert!((res.scalc[1].im - limit).abs() < 1e-8, "Q not pinned: {}", res.scalc[1].im);
        // magnitude is released once the bus is PQ
        assert!(res.v[1].norm() < 1.0);

        // nothing left to switch
        let mut s0 = data.s0.clone();
        assert!(
            tracker
                .check(&data.problem(), &res.v, &res.scalc, &next, &mut s0, &[0, 1, 2])
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_lower_limit_raises_q() {
        let data = ScenarioData::from(&three_bus());
        let mut solver = DefaultSolver::default();
        let res = newton_pf(&data.problem(), &data.v0, &data.index, 1e-9, 20, NewtonStep::Full, &mut solver);
        let limit = res.scalc[1].im + 0.05;
        let q_min = DVector::from_vec(vec![f64::NEG_INFINITY, limit, f64::NEG_INFINITY]);
        let q_max = DVector::from_element(3, f64::INFINITY);
        let mut tracker = ReactiveLimitTracker::new(&q_min, &q_max);
        let mut s0 = data.s0.clone();
        let next = tracker
            .check(&data.problem(), &res.v, &res.scalc, &data.index, &mut s0, &[0, 1, 2])
            .unwrap()
            .unwrap();
        assert_eq!(next.bus_type(1), BusType::PQ);
        assert_eq!(s0[1].im, limit);
        let event = &tracker.events()[0];
        assert_eq!(event.side, QLimitSide::Lower);
        assert!(event.q < event.bound);
    }

    #[test]
    fn test_p_bus_takes_its_partner_along() {
        let data = ScenarioData::from(&remote_control());
        let mut solver = DefaultSolver::default();
        let res = newton_pf(&data.problem(), &data.v0, &data.index, 1e-9, 20, NewtonStep::Full, &mut solver);
        assert!(res.converged);
        let limit = res.scalc[1].im - 0.05;
        let q_min = DVector::from_element(4, f64::NEG_INFINITY);
        let mut q_max = DVector::from_element(4, f64::INFINITY);
        q_max[1] = limit;
        let mut tracker = ReactiveLimitTracker::new(&q_min, &q_max);
        let mut s0 = data.s0.clone();
        // local numbering shifted to check the global partner index
        let global = [10, 11, 12, 13];
        let next = tracker
            .check(&data.problem(), &res.v, &res.scalc, &data.index, &mut s0, &global)
            .unwrap()
            .unwrap();
        println!("{:?}", tracker.events());
        assert_eq!(next.bus_type(1), BusType::PQ);
        assert_eq!(next.bus_type(2), BusType::PQ);
        assert!(next.p().is_empty() && next.pqv().is_empty());
        assert_eq!(next.n_equations(), next.n_unknowns());
        let event = &tracker.events()[0];
        assert_eq!(event.previous, BusType::P);
        assert_eq!(event.bus, 11);
        assert_eq!(event.partner, Some(12));
    }
}
