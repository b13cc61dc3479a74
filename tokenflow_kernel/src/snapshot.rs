/// tokenflow kernel — Snapshot Export / Import
///
/// The snapshot is the plain, value-typed projection of a frozen and
/// overlaid model. It is what evaluators consume. Maps are `BTreeMap`, so
/// the serialized form is deterministic and round trips byte-for-byte.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::arithmetic::count_to_slot;
use crate::domain::{Coords, Place, PlaceId, RoleId, Transition, TransitionId};
use crate::error::{ModelError, Result};
use crate::model::Model;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaceState {
    pub initial: u64,
    pub capacity: u64,
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<Coords>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionState {
    pub delta: Vec<i64>,
    pub role: String,
    /// Inhibitor guards: place id → weight.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub guards: BTreeMap<String, u64>,
}

/// Compiled model handed to evaluators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    pub schema: String,
    pub places: BTreeMap<String, PlaceState>,
    pub transitions: BTreeMap<String, TransitionState>,
}

impl Snapshot {
    pub fn place_count(&self) -> usize {
        self.places.len()
    }

    /// Initial token counts laid out by offset.
    pub fn initial_vector(&self) -> Result<Vec<i64>> {
        let mut out = vec![0; self.places.len()];
        for place in self.places.values() {
            let slot = out.get_mut(place.offset).ok_or_else(|| {
                ModelError::InvalidSnapshot(format!("offset {} out of range", place.offset))
            })?;
            *slot = count_to_slot(place.initial)?;
        }
        Ok(out)
    }

    /// Capacities laid out by offset. Zero means unbounded.
    pub fn capacity_vector(&self) -> Vec<u64> {
        let mut out = vec![0; self.places.len()];
        for place in self.places.values() {
            if let Some(slot) = out.get_mut(place.offset) {
                *slot = place.capacity;
            }
        }
        out
    }

    /// Check the shape evaluators rely on: offsets unique, zero-based and
    /// contiguous; every delta as long as the place count; guards naming
    /// known places.
    pub fn validate(&self) -> Result<()> {
        let width = self.places.len();
        let mut seen = BTreeSet::new();
        for (id, place) in &self.places {
            if place.offset >= width {
                return Err(ModelError::InvalidSnapshot(format!(
                    "place {:?} has offset {} but only {} places exist",
                    id, place.offset, width
                )));
            }
            if !seen.insert(place.offset) {
                return Err(ModelError::InvalidSnapshot(format!(
                    "offset {} is used by more than one place",
                    place.offset
                )));
            }
        }
        for (id, transition) in &self.transitions {
            if transition.delta.len() != width {
                return Err(ModelError::InvalidSnapshot(format!(
                    "transition {:?} has delta length {}, expected {}",
                    id,
                    transition.delta.len(),
                    width
                )));
            }
            if let Some(missing) = transition.guards.keys().find(|p| !self.places.contains_key(*p)) {
                return Err(ModelError::InvalidSnapshot(format!(
                    "transition {:?} guards unknown place {:?}",
                    id, missing
                )));
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and validate.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

impl Model {
    /// Project the frozen model into a snapshot.
    pub fn export(&self) -> Result<Snapshot> {
        self.assert_frozen()?;
        self.assert_overlay_intact()?;
        if !self.vars.is_empty() {
            warn!(
                schema = %self.schema,
                pending = self.vars.len(),
                "exporting with variables not yet applied"
            );
        }

        let places = self
            .places
            .iter()
            .map(|p| {
                (
                    p.id.to_string(),
                    PlaceState {
                        initial: p.initial,
                        capacity: p.capacity,
                        offset: p.offset,
                        coords: p.coords,
                    },
                )
            })
            .collect();

        let mut transitions = BTreeMap::new();
        for t in &self.transitions {
            let delta = t.delta.clone().ok_or_else(|| {
                ModelError::InvalidSnapshot(format!("transition {:?} has no delta", t.id.as_str()))
            })?;
            let guards = t
                .guards
                .iter()
                .map(|(&offset, &weight)| (self.places[offset].id.to_string(), weight))
                .collect();
            transitions.insert(
                t.id.to_string(),
                TransitionState {
                    delta,
                    role: t.role.to_string(),
                    guards,
                },
            );
        }

        debug!(schema = %self.schema, places = self.places.len(), "model exported");
        Ok(Snapshot {
            schema: self.schema.clone(),
            places,
            transitions,
        })
    }

    /// Serialize schema, places and transitions. Ledger, pending vars and
    /// the frozen flag are never written.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.export()?.to_bytes()
    }

    /// Rebuild a model from a snapshot. The result is frozen for good and
    /// carries no pending arcs or variables.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        snapshot.validate()?;

        let mut model = Model::new(snapshot.schema);
        model.frozen = true;
        model.imported = true;

        let mut ordered: Vec<(String, PlaceState)> = snapshot.places.into_iter().collect();
        ordered.sort_by_key(|(_, p)| p.offset);
        for (index, (id, state)) in ordered.into_iter().enumerate() {
            let id = PlaceId::from(id);
            model.place_index.insert(id.clone(), index);
            model.places.push(Place {
                id,
                offset: index,
                initial: state.initial,
                capacity: state.capacity,
                coords: state.coords,
            });
        }

        for (id, state) in snapshot.transitions {
            let id = TransitionId::from(id);
            let role = RoleId::from(state.role);
            let mut guards = BTreeMap::new();
            for (place, weight) in state.guards {
                if let Some(&offset) = model.place_index.get(&PlaceId::from(place)) {
                    guards.insert(offset, weight);
                }
            }
            model.roles.insert(role.clone());
            model.transition_index.insert(id.clone(), model.transitions.len());
            model.transitions.push(Transition {
                id,
                role,
                delta: Some(state.delta),
                guards,
            });
        }

        Ok(model)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_snapshot(Snapshot::from_bytes(bytes)?)
    }

    /// Freeze, apply every pending variable, and export.
    pub fn compile(&mut self) -> Result<Snapshot> {
        self.freeze()?;
        if !self.imported {
            self.apply_overlay()?;
        }
        self.export()
    }
}
