//! Snapshot Codec — deterministic snapshot encoder/decoder.
//!
//! Pure codec layer. No timestamps, no envelope.
//!
//! - `encode_snapshot`:  Snapshot → JSON string
//! - `decode_snapshot`:  JSON string → Snapshot (strict, no defaults)
//! - `restore_snapshot`: decode + shape validation
//! - `restore_model`:    decode + validation → frozen, imported Model
//! - `export_snapshot_to_file` / `import_snapshot_from_file`: file I/O
//! - `snapshot_hash`:    SHA-256 of the JSON encoding (lowercase hex)

use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use tokenflow_kernel::{Model, ModelError, Snapshot};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// All possible snapshot codec failures.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// JSON encoding or decoding failed (malformed, missing or unknown fields).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protobuf frame could not be decoded.
    #[error("protobuf decode error: {0}")]
    ProtoDecode(#[from] prost::DecodeError),

    #[error("unsupported snapshot format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// Decoded snapshot violates the shape rules, or the model refused it.
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Schema name cannot be used as a file name inside a catalog directory.
    #[error("schema {0:?} is not a plain file name")]
    UnsafeSchemaName(String),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Encode a snapshot to a JSON string.
///
/// BTreeMap keys keep places and transitions sorted. No whitespace.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<String> {
    Ok(serde_json::to_string(snapshot)?)
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Decode a JSON string into a snapshot.
///
/// Strict: unknown fields are rejected, missing required fields fail.
/// No shape validation; use `restore_snapshot` for that.
pub fn decode_snapshot(json: &str) -> Result<Snapshot> {
    Ok(serde_json::from_str::<Snapshot>(json)?)
}

// ---------------------------------------------------------------------------
// Restore (decode + validate)
// ---------------------------------------------------------------------------

/// Decode and validate offsets, delta widths and guards.
pub fn restore_snapshot(json: &str) -> Result<Snapshot> {
    let snapshot = decode_snapshot(json)?;
    snapshot.validate()?;
    Ok(snapshot)
}

/// Decode into a model. The model is frozen and cannot be overlaid.
pub fn restore_model(json: &str) -> Result<Model> {
    Ok(Model::from_snapshot(restore_snapshot(json)?)?)
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

/// Write a snapshot to a file as JSON, creating parent directories.
pub fn export_snapshot_to_file(snapshot: &Snapshot, path: &Path) -> Result<()> {
    let json = encode_snapshot(snapshot)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, json.as_bytes())?;
    debug!(schema = %snapshot.schema, path = %path.display(), "snapshot exported");
    Ok(())
}

/// Read, decode and validate a snapshot file.
pub fn import_snapshot_from_file(path: &Path) -> Result<Snapshot> {
    let content = fs::read_to_string(path)?;
    let snapshot = restore_snapshot(&content)?;
    debug!(schema = %snapshot.schema, path = %path.display(), "snapshot imported");
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Hash
// ---------------------------------------------------------------------------

/// SHA-256 of the JSON encoding. Lowercase hex string.
///
/// NOTE: this hashes the serde-derived JSON, not the canonical form from
/// `tokenflow_kernel::hashing` (which adds the format version and drops
/// layout coordinates). It is for file integrity checks.
pub fn snapshot_hash(snapshot: &Snapshot) -> Result<String> {
    let json = encode_snapshot(snapshot)?;
    let digest = Sha256::digest(json.as_bytes());
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokenflow_kernel::{PlaceSpec, TransitionSpec};

    fn make_test_snapshot() -> Snapshot {
        let mut model = Model::declare("codec", |m| {
            let role = m.declare_role("clerk")?;
            let take = m.declare_transition("take", TransitionSpec { role: role.clone() })?;
            let give = m.declare_transition("give", TransitionSpec { role })?;
            let stock = m.declare_place("stock", PlaceSpec { initial: 3, capacity: 10, coords: None })?;
            let sold = m.declare_place("sold", PlaceSpec::default())?;
            m.arc(stock, 1, take)?;
            m.arc(take, 1, sold)?;
            m.arc(give, 1, stock)?;
            Ok(())
        })
        .unwrap();
        model.compile().unwrap()
    }

    #[test]
    fn roundtrip_produces_identical_json() {
        let snap = make_test_snapshot();
        let json1 = encode_snapshot(&snap).unwrap();
        let decoded = decode_snapshot(&json1).unwrap();
        let json2 = encode_snapshot(&decoded).unwrap();
        assert_eq!(json1, json2, "Roundtrip must produce identical JSON");
    }

    #[test]
    fn short_delta_returns_invalid_snapshot() {
        let mut snap = make_test_snapshot();
        snap.transitions.get_mut("take").unwrap().delta.pop();
        let json = encode_snapshot(&snap).unwrap();
        match restore_snapshot(&json) {
            Err(SnapshotError::Model(ModelError::InvalidSnapshot(msg))) => {
                assert!(msg.contains("delta length"), "got: {}", msg);
            }
            other => panic!("Expected InvalidSnapshot, got: {:?}", other),
        }
    }

    #[test]
    fn restored_model_is_frozen() {
        let snap = make_test_snapshot();
        let json = encode_snapshot(&snap).unwrap();
        let model = restore_model(&json).unwrap();
        assert!(model.is_frozen());
        assert!(model.is_imported());
        assert_eq!(model.export().unwrap(), snap);
    }

    #[test]
    fn file_roundtrip_matches() {
        let snap = make_test_snapshot();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("codec.json");

        export_snapshot_to_file(&snap, &path).unwrap();
        let imported = import_snapshot_from_file(&path).unwrap();
        assert_eq!(snap, imported);

        let file_content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(encode_snapshot(&snap).unwrap(), file_content);
    }

    #[test]
    fn corrupted_file_returns_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{ not valid json !!!}").unwrap();

        match import_snapshot_from_file(&path) {
            Err(SnapshotError::Json(_)) => {}
            other => panic!("Expected Json error, got: {:?}", other),
        }
    }

    #[test]
    fn missing_file_returns_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = import_snapshot_from_file(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(SnapshotError::Io(_))));
    }

    #[test]
    fn missing_field_returns_json_error() {
        let json = r#"{"schema":"s","places":{}}"#;
        assert!(matches!(decode_snapshot(json), Err(SnapshotError::Json(_))));
    }

    #[test]
    fn hash_is_deterministic_and_matches_file() {
        let snap = make_test_snapshot();
        let h1 = snapshot_hash(&snap).unwrap();
        let h2 = snapshot_hash(&make_test_snapshot()).unwrap();
        assert_eq!(h1, h2, "Same snapshot must produce same hash");
        assert_eq!(h1.len(), 64);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hash.json");
        export_snapshot_to_file(&snap, &path).unwrap();
        let file_digest = Sha256::digest(std::fs::read(&path).unwrap());
        let file_hash: String = file_digest.iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(h1, file_hash);
    }
}
