//! Catalog — compiled snapshots published by schema for read-only sharing.
//!
//! Snapshots are handed out as `Arc<Snapshot>`; nothing in the catalog
//! mutates a published snapshot. Republishing a schema replaces the entry
//! and bumps its revision unless the canonical hash is unchanged.
//!
//! Directory layout for persistence:
//!   <dir>/<schema>.json

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use tokenflow_kernel::hashing::canonical_hash;
use tokenflow_kernel::Snapshot;

use crate::snapshot_codec::{export_snapshot_to_file, import_snapshot_from_file, Result, SnapshotError};

/// `<schema>.json`, provided the schema is a single normal path component.
fn snapshot_file_name(schema: &str) -> Result<String> {
    let mut parts = Path::new(schema).components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(_)), None) if !schema.contains(['/', '\\']) => {
            Ok(format!("{}.json", schema))
        }
        _ => Err(SnapshotError::UnsafeSchemaName(schema.to_string())),
    }
}

/// One published snapshot.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub snapshot: Arc<Snapshot>,
    /// Canonical hash of the snapshot.
    pub hash: String,
    /// Starts at 1; increases each time the content changes.
    pub revision: u64,
}

#[derive(Debug, Default)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a snapshot under its schema name.
    pub fn publish(&mut self, snapshot: Snapshot) -> Result<&CatalogEntry> {
        let hash = canonical_hash(&snapshot)?;

        let entry = match self.entries.entry(snapshot.schema.clone()) {
            Entry::Occupied(slot) => {
                let entry = slot.into_mut();
                if entry.hash == hash {
                    debug!(schema = %snapshot.schema, revision = entry.revision, "snapshot unchanged");
                } else {
                    entry.revision += 1;
                    entry.hash = hash;
                    entry.snapshot = Arc::new(snapshot);
                    info!(schema = %entry.snapshot.schema, revision = entry.revision, "snapshot published");
                }
                entry
            }
            Entry::Vacant(slot) => {
                info!(schema = %snapshot.schema, revision = 1, "snapshot published");
                slot.insert(CatalogEntry {
                    snapshot: Arc::new(snapshot),
                    hash,
                    revision: 1,
                })
            }
        };
        Ok(entry)
    }

    pub fn get(&self, schema: &str) -> Option<Arc<Snapshot>> {
        self.entries.get(schema).map(|e| Arc::clone(&e.snapshot))
    }

    pub fn entry(&self, schema: &str) -> Option<&CatalogEntry> {
        self.entries.get(schema)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    pub fn remove(&mut self, schema: &str) -> Option<CatalogEntry> {
        self.entries.remove(schema)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every snapshot to `<dir>/<schema>.json`. Every schema name is
    /// checked before anything is written.
    pub fn save_to_dir(&self, dir: &Path) -> Result<()> {
        let files = self
            .entries
            .iter()
            .map(|(schema, entry)| Ok((snapshot_file_name(schema)?, entry)))
            .collect::<Result<Vec<_>>>()?;

        fs::create_dir_all(dir)?;
        for (name, entry) in files {
            export_snapshot_to_file(&entry.snapshot, &dir.join(name))?;
        }
        Ok(())
    }

    /// Load every `*.json` snapshot in `dir`. A missing directory yields
    /// an empty catalog.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut catalog = Catalog::new();
        if !dir.exists() {
            return Ok(catalog);
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            catalog.publish(import_snapshot_from_file(&path)?)?;
        }
        Ok(catalog)
    }
}

/// Thread-safe catalog handle. Readers share the lock; publishing takes
/// it exclusively.
#[derive(Debug, Default)]
pub struct SharedCatalog {
    inner: RwLock<Catalog>,
}

impl SharedCatalog {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            inner: RwLock::new(catalog),
        }
    }

    /// Publish under the write lock. Returns the new revision.
    pub fn publish(&self, snapshot: Snapshot) -> Result<u64> {
        let mut catalog = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        catalog.publish(snapshot).map(|e| e.revision)
    }

    pub fn get(&self, schema: &str) -> Option<Arc<Snapshot>> {
        let catalog = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        catalog.get(schema)
    }

    pub fn hash(&self, schema: &str) -> Option<String> {
        let catalog = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        catalog.entry(schema).map(|e| e.hash.clone())
    }

    pub fn revision(&self, schema: &str) -> Option<u64> {
        let catalog = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        catalog.entry(schema).map(|e| e.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenflow_kernel::{Model, PlaceSpec, TransitionSpec};

    fn compiled(schema: &str, capacity: u64) -> Snapshot {
        let mut m = Model::declare(schema, |m| {
            let role = m.declare_role("default")?;
            let t = m.declare_transition("t", TransitionSpec { role })?;
            let p = m.declare_place("p", PlaceSpec::default())?;
            m.arc(t, 1, p)?;
            Ok(())
        })
        .unwrap();
        m.freeze().unwrap();
        m.new_var().unwrap().capacity("p").bind(move || capacity);
        m.compile().unwrap()
    }

    #[test]
    fn revisions_track_content_changes() {
        let mut catalog = Catalog::new();
        assert_eq!(catalog.publish(compiled("a", 1)).unwrap().revision, 1);
        assert_eq!(catalog.publish(compiled("a", 1)).unwrap().revision, 1);
        assert_eq!(catalog.publish(compiled("a", 2)).unwrap().revision, 2);
        assert_eq!(catalog.get("a").unwrap().places["p"].capacity, 2);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn published_snapshot_outlives_replacement() {
        let mut catalog = Catalog::new();
        catalog.publish(compiled("a", 1)).unwrap();
        let held = catalog.get("a").unwrap();
        catalog.publish(compiled("a", 7)).unwrap();
        assert_eq!(held.places["p"].capacity, 1);
        assert_eq!(catalog.get("a").unwrap().places["p"].capacity, 7);
    }

    #[test]
    fn directory_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::new();
        catalog.publish(compiled("alpha", 3)).unwrap();
        catalog.publish(compiled("beta", 4)).unwrap();
        catalog.save_to_dir(dir.path()).unwrap();

        let loaded = Catalog::load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded.schemas().collect::<Vec<_>>(), vec!["alpha", "beta"]);
        assert_eq!(loaded.entry("alpha").unwrap().hash, catalog.entry("alpha").unwrap().hash);
    }

    #[test]
    fn schema_names_cannot_leave_the_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("catalog");

        for schema in ["../escaped", "nested/name", "..", ".", ""] {
            let mut catalog = Catalog::new();
            catalog.publish(compiled("fine", 1)).unwrap();
            catalog.publish(compiled(schema, 1)).unwrap();
            match catalog.save_to_dir(&dir) {
                Err(SnapshotError::UnsafeSchemaName(name)) => assert_eq!(name, schema),
                other => panic!("expected UnsafeSchemaName for {:?}, got {:?}", schema, other),
            }
        }
        assert!(!root.path().join("escaped.json").exists());
        assert!(!dir.exists());
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Catalog::load_from_dir(&dir.path().join("absent")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn shared_catalog_serves_concurrent_readers() {
        let shared = Arc::new(SharedCatalog::default());
        assert_eq!(shared.publish(compiled("shared", 5)).unwrap(), 1);

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || shared.get("shared").unwrap().places["p"].capacity)
            })
            .collect();
        for r in readers {
            assert_eq!(r.join().unwrap(), 5);
        }
        assert_eq!(shared.revision("shared"), Some(1));
        assert_eq!(shared.hash("shared").unwrap().len(), 64);
    }
}
