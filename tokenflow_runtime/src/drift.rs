//! Drift detection — what changed between two compiled snapshots.
//!
//! Places are matched by id, not offset, so a reordered declaration does
//! not show up as a delta change.

use std::collections::BTreeSet;

use tokenflow_kernel::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceDrift {
    pub place: String,
    pub initial: (u64, u64),
    pub capacity: (u64, u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaDrift {
    pub transition: String,
    pub place: String,
    pub before: i64,
    pub after: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDrift {
    pub transition: String,
    pub before: String,
    pub after: String,
}

/// Structured drift report. Lists are sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    pub added_places: Vec<String>,
    pub removed_places: Vec<String>,
    pub added_transitions: Vec<String>,
    pub removed_transitions: Vec<String>,
    pub places: Vec<PlaceDrift>,
    pub deltas: Vec<DeltaDrift>,
    pub roles: Vec<RoleDrift>,
}

impl DriftReport {
    pub fn is_empty(&self) -> bool {
        *self == DriftReport::default()
    }
}

/// Compare snapshot `a` (before) with `b` (after).
pub fn compare_snapshots(a: &Snapshot, b: &Snapshot) -> DriftReport {
    let places_a: BTreeSet<&str> = a.places.keys().map(|s| s.as_str()).collect();
    let places_b: BTreeSet<&str> = b.places.keys().map(|s| s.as_str()).collect();
    let tx_a: BTreeSet<&str> = a.transitions.keys().map(|s| s.as_str()).collect();
    let tx_b: BTreeSet<&str> = b.transitions.keys().map(|s| s.as_str()).collect();

    let mut report = DriftReport {
        added_places: places_b.difference(&places_a).map(|s| s.to_string()).collect(),
        removed_places: places_a.difference(&places_b).map(|s| s.to_string()).collect(),
        added_transitions: tx_b.difference(&tx_a).map(|s| s.to_string()).collect(),
        removed_transitions: tx_a.difference(&tx_b).map(|s| s.to_string()).collect(),
        ..Default::default()
    };

    let common_places: Vec<&str> = places_a.intersection(&places_b).copied().collect();

    for pid in &common_places {
        let pa = &a.places[*pid];
        let pb = &b.places[*pid];
        if pa.initial != pb.initial || pa.capacity != pb.capacity {
            report.places.push(PlaceDrift {
                place: pid.to_string(),
                initial: (pa.initial, pb.initial),
                capacity: (pa.capacity, pb.capacity),
            });
        }
    }

    for tid in tx_a.intersection(&tx_b) {
        let ta = &a.transitions[*tid];
        let tb = &b.transitions[*tid];

        if ta.role != tb.role {
            report.roles.push(RoleDrift {
                transition: tid.to_string(),
                before: ta.role.clone(),
                after: tb.role.clone(),
            });
        }

        for pid in &common_places {
            let before = ta.delta.get(a.places[*pid].offset).copied().unwrap_or(0);
            let after = tb.delta.get(b.places[*pid].offset).copied().unwrap_or(0);
            if before != after {
                report.deltas.push(DeltaDrift {
                    transition: tid.to_string(),
                    place: pid.to_string(),
                    before,
                    after,
                });
            }
        }
    }

    report
}
