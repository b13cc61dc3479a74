//! Proto ↔ Snapshot conversion bridge.
//!
//! Decoded snapshots go through the same shape validation as JSON ones.

use prost::Message;

use tokenflow_kernel::{Coords, ModelError, PlaceState, Snapshot, TransitionState, FORMAT_VERSION};

use crate::proto_types::*;
use crate::snapshot_codec::{Result, SnapshotError};

/// Convert a snapshot to its protobuf form.
pub fn snapshot_to_proto(snapshot: &Snapshot) -> ProtoSnapshot {
    ProtoSnapshot {
        format_version: FORMAT_VERSION,
        schema: snapshot.schema.clone(),
        places: snapshot
            .places
            .iter()
            .map(|(id, p)| {
                (
                    id.clone(),
                    ProtoPlace {
                        initial: p.initial,
                        capacity: p.capacity,
                        offset: p.offset as u64,
                        coords: p.coords.map(|c| ProtoCoords { x: c.x, y: c.y }),
                    },
                )
            })
            .collect(),
        transitions: snapshot
            .transitions
            .iter()
            .map(|(id, t)| {
                (
                    id.clone(),
                    ProtoTransition {
                        delta: t.delta.clone(),
                        role: t.role.clone(),
                        guards: t.guards.clone(),
                    },
                )
            })
            .collect(),
    }
}

/// Convert a protobuf snapshot back, rejecting other format versions and
/// invalid shapes.
pub fn proto_to_snapshot(proto: &ProtoSnapshot) -> Result<Snapshot> {
    if proto.format_version != FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            found: proto.format_version,
            expected: FORMAT_VERSION,
        });
    }

    let mut places = std::collections::BTreeMap::new();
    for (id, p) in &proto.places {
        let offset = usize::try_from(p.offset).map_err(|_| {
            ModelError::InvalidSnapshot(format!("place {:?} offset {} out of range", id, p.offset))
        })?;
        places.insert(
            id.clone(),
            PlaceState {
                initial: p.initial,
                capacity: p.capacity,
                offset,
                coords: p.coords.as_ref().map(|c| Coords { x: c.x, y: c.y }),
            },
        );
    }

    let transitions = proto
        .transitions
        .iter()
        .map(|(id, t)| {
            (
                id.clone(),
                TransitionState {
                    delta: t.delta.clone(),
                    role: t.role.clone(),
                    guards: t.guards.clone(),
                },
            )
        })
        .collect();

    let snapshot = Snapshot {
        schema: proto.schema.clone(),
        places,
        transitions,
    };
    snapshot.validate()?;
    Ok(snapshot)
}

/// Encode a snapshot as protobuf bytes.
pub fn encode_proto(snapshot: &Snapshot) -> Vec<u8> {
    snapshot_to_proto(snapshot).encode_to_vec()
}

/// Decode protobuf bytes into a validated snapshot.
pub fn decode_proto(bytes: &[u8]) -> Result<Snapshot> {
    let proto = ProtoSnapshot::decode(bytes)?;
    proto_to_snapshot(&proto)
}
