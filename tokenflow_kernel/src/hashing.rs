/// tokenflow kernel — Canonical Hashing
///
/// Deterministic canonical serialization + SHA-256 hashing of snapshots.
///
/// Rules:
///   - format_version first
///   - Places listed by offset, transitions by id (UTF-8 byte order)
///   - Fixed field order inside every entry
///   - Layout coordinates excluded; they do not change behaviour
///   - UTF-8 JSON, no whitespace

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::snapshot::Snapshot;
use crate::FORMAT_VERSION;

/// Canonical serialization of a snapshot to UTF-8 JSON bytes.
pub fn canonical_serialize(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let obj = build_canonical_value(snapshot);
    Ok(serde_json::to_vec(&obj)?)
}

/// SHA-256 of canonical serialization. Lowercase hex string.
pub fn canonical_hash(snapshot: &Snapshot) -> Result<String> {
    let bytes = canonical_serialize(snapshot)?;
    Ok(hex_digest(&bytes))
}

pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn build_canonical_value(snapshot: &Snapshot) -> Value {
    // -- places (by offset) ---
    let mut places: Vec<(&String, _)> = snapshot.places.iter().collect();
    places.sort_by_key(|(_, p)| p.offset);

    let places_list: Vec<Value> = places
        .into_iter()
        .map(|(id, p)| {
            let mut m = Map::new();
            m.insert("id".to_string(), Value::String(id.clone()));
            m.insert("offset".to_string(), Value::Number((p.offset as u64).into()));
            m.insert("initial".to_string(), Value::Number(p.initial.into()));
            m.insert("capacity".to_string(), Value::Number(p.capacity.into()));
            Value::Object(m)
        })
        .collect();

    // -- transitions (BTreeMap is already sorted by id) ---
    let transitions_list: Vec<Value> = snapshot
        .transitions
        .iter()
        .map(|(id, t)| {
            let mut m = Map::new();
            m.insert("id".to_string(), Value::String(id.clone()));
            m.insert("role".to_string(), Value::String(t.role.clone()));
            m.insert(
                "delta".to_string(),
                Value::Array(t.delta.iter().map(|&d| Value::Number(d.into())).collect()),
            );
            let mut guards = Map::new();
            for (place, &weight) in &t.guards {
                guards.insert(place.clone(), Value::Number(weight.into()));
            }
            m.insert("guards".to_string(), Value::Object(guards));
            Value::Object(m)
        })
        .collect();

    let mut root = Map::new();
    root.insert(
        "format_version".to_string(),
        Value::Number(FORMAT_VERSION.into()),
    );
    root.insert("schema".to_string(), Value::String(snapshot.schema.clone()));
    root.insert("places".to_string(), Value::Array(places_list));
    root.insert("transitions".to_string(), Value::Array(transitions_list));
    Value::Object(root)
}
