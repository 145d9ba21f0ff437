use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::basic::error::ConfigurationError;

/// Control category of a bus.
///
/// | type  | P fixed | Q fixed | \|V\| fixed |
/// |-------|---------|---------|-------------|
/// | Slack | no      | no      | yes (and θ) |
/// | PV    | yes     | no      | yes         |
/// | PQ    | yes     | yes     | no          |
/// | PQV   | yes     | yes     | yes         |
/// | P     | yes     | no      | no          |
///
/// Every solver variant reads this table through [`BusType::specifies_q`]
/// and [`BusType::specifies_vm`] instead of matching on the variants.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BusType {
    #[display("Slack")]
    Slack,
    #[display("PV")]
    PV,
    #[default]
    #[display("PQ")]
    PQ,
    #[display("PQV")]
    PQV,
    #[display("P")]
    P,
}

impl BusType {
    /// Reactive power is an input of the problem at this bus.
    pub fn specifies_q(self) -> bool {
        matches!(self, BusType::PQ | BusType::PQV)
    }

    /// Voltage magnitude is held at its setpoint at this bus.
    pub fn specifies_vm(self) -> bool {
        matches!(self, BusType::Slack | BusType::PV | BusType::PQV)
    }

    /// Buses whose reactive output is free and therefore subject to Q limits.
    pub fn is_q_controlled(self) -> bool {
        matches!(self, BusType::PV | BusType::P)
    }
}

/// Immutable, validated partition of an island's buses into the five control
/// sets, together with the row/column orderings of the mismatch system.
///
/// All lists are ascending. A fresh snapshot is built whenever bus types
/// change; solvers never mutate one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusIndex {
    types: Vec<BusType>,
    vd: Vec<usize>,
    pv: Vec<usize>,
    pq: Vec<usize>,
    pqv: Vec<usize>,
    p: Vec<usize>,
    idx_dp: Vec<usize>,
    idx_dq: Vec<usize>,
    idx_dvm: Vec<usize>,
}

impl BusIndex {
    /// Classifies buses from their per-bus type tags.
    pub fn from_types(types: &[BusType]) -> Result<Self, ConfigurationError> {
        let pick = |t: BusType| -> Vec<usize> {
            types
                .iter()
                .enumerate()
                .filter_map(|(i, &bt)| (bt == t).then_some(i))
                .collect()
        };
        let (vd, pv, pq, pqv, p) = (
            pick(BusType::Slack),
            pick(BusType::PV),
            pick(BusType::PQ),
            pick(BusType::PQV),
            pick(BusType::P),
        );
        if p.len() != pqv.len() {
            return Err(ConfigurationError::UnpairedRemoteControl {
                n_p: p.len(),
                n_pqv: pqv.len(),
            });
        }
        let idx_dp = (0..types.len()).filter(|&i| types[i] != BusType::Slack).collect();
        let idx_dq = (0..types.len()).filter(|&i| types[i].specifies_q()).collect();
        let idx_dvm = (0..types.len())
            .filter(|&i| matches!(types[i], BusType::PQ | BusType::P))
            .collect();
        Ok(Self {
            types: types.to_vec(),
            vd,
            pv,
            pq,
            pqv,
            p,
            idx_dp,
            idx_dq,
            idx_dvm,
        })
    }

    /// Validates explicit index sets and classifies from them.
    ///
    /// The sets must be in range, pairwise disjoint and cover `0..n`.
    pub fn from_sets(
        n: usize,
        vd: &[usize],
        pv: &[usize],
        pq: &[usize],
        pqv: &[usize],
        p: &[usize],
    ) -> Result<Self, ConfigurationError> {
        let mut types: Vec<Option<BusType>> = vec![None; n];
        let sets = [
            (BusType::Slack, vd),
            (BusType::PV, pv),
            (BusType::PQ, pq),
            (BusType::PQV, pqv),
            (BusType::P, p),
        ];
        for (t, set) in sets {
            for &bus in set {
                let slot = types
                    .get_mut(bus)
                    .ok_or(ConfigurationError::OutOfRange { bus, n })?;
                if let Some(first) = *slot {
                    return Err(ConfigurationError::Overlap {
                        bus,
                        first,
                        second: t,
                    });
                }
                *slot = Some(t);
            }
        }
        let types = types
            .into_iter()
            .enumerate()
            .map(|(bus, t)| t.ok_or(ConfigurationError::Uncovered { bus }))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_types(&types)
    }

    pub fn n_bus(&self) -> usize {
        self.types.len()
    }

    pub fn types(&self) -> &[BusType] {
        &self.types
    }

    pub fn bus_type(&self, bus: usize) -> BusType {
        self.types[bus]
    }

    pub fn vd(&self) -> &[usize] {
        &self.vd
    }

    pub fn pv(&self) -> &[usize] {
        &self.pv
    }

    pub fn pq(&self) -> &[usize] {
        &self.pq
    }

    pub fn pqv(&self) -> &[usize] {
        &self.pqv
    }

    pub fn p(&self) -> &[usize] {
        &self.p
    }

    /// `pv ∪ pq`, ascending.
    pub fn pvpq(&self) -> Vec<usize> {
        merge_sorted(&self.pv, &self.pq)
    }

    /// ΔP rows and voltage-angle unknowns: `pv ∪ p ∪ pq ∪ pqv`.
    pub fn idx_dp(&self) -> &[usize] {
        &self.idx_dp
    }

    /// ΔQ rows: `pq ∪ pqv`.
    pub fn idx_dq(&self) -> &[usize] {
        &self.idx_dq
    }

    /// Voltage-magnitude unknowns: `pq ∪ p`.
    pub fn idx_dvm(&self) -> &[usize] {
        &self.idx_dvm
    }

    /// Length of the mismatch vector.
    pub fn n_equations(&self) -> usize {
        self.idx_dp.len() + self.idx_dq.len()
    }

    /// Length of the state increment.
    pub fn n_unknowns(&self) -> usize {
        self.idx_dp.len() + self.idx_dvm.len()
    }

    /// No bus other than the slack carries an equation.
    pub fn is_trivial(&self) -> bool {
        self.idx_dp.is_empty()
    }

    /// Returns a new snapshot with the given buses turned into PQ buses.
    ///
    /// A P bus leaving the P set takes its paired PQV bus (k-th P with k-th
    /// PQV, ascending) with it, so the Newton system stays square.
    pub fn demote_to_pq(&self, buses: &[usize]) -> Result<Self, ConfigurationError> {
        let mut types = self.types.clone();
        for &bus in buses {
            match types.get(bus) {
                Some(BusType::P) => {
                    if let Some(k) = self.p.iter().position(|&b| b == bus) {
                        types[self.pqv[k]] = BusType::PQ;
                    }
                    types[bus] = BusType::PQ;
                }
                Some(BusType::PV) => types[bus] = BusType::PQ,
                Some(_) => {}
                None => {
                    return Err(ConfigurationError::OutOfRange {
                        bus,
                        n: types.len(),
                    });
                }
            }
        }
        Self::from_types(&types)
    }
}

fn merge_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out.sort_unstable();
    out
}
