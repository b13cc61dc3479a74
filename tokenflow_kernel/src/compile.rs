/// tokenflow kernel — Freeze / Compile
///
/// Folds the arc ledger into one signed delta vector per transition and
/// locks the model's shape. Work happens on scratch vectors; the model is
/// only touched once every arc has resolved.

use std::collections::BTreeMap;

use tracing::debug;

use crate::arithmetic::{consumed, produced};
use crate::domain::{ArcDecl, ArcKind, NodeHandle};
use crate::error::{ModelError, Result};
use crate::model::Model;

impl Model {
    /// Resolve arcs into deltas and mark the model frozen.
    ///
    /// Idempotent: on an already-frozen model this is a no-op.
    pub fn freeze(&mut self) -> Result<&mut Self> {
        if self.frozen {
            return Ok(self);
        }

        let width = self.places.len();
        let mut deltas: Vec<Vec<i64>> = vec![vec![0; width]; self.transitions.len()];
        let mut guards: Vec<BTreeMap<usize, u64>> = vec![BTreeMap::new(); self.transitions.len()];

        for arc in &self.arcs {
            match (arc.source, arc.target, arc.kind) {
                (NodeHandle::Place(p), NodeHandle::Transition(t), ArcKind::Normal) => {
                    // Overwrite, not accumulate: the last arc on a pair wins.
                    deltas[t.index][p.index] = consumed(arc.weight)?;
                }
                (NodeHandle::Transition(t), NodeHandle::Place(p), ArcKind::Normal) => {
                    deltas[t.index][p.index] = produced(arc.weight)?;
                }
                (NodeHandle::Place(p), NodeHandle::Transition(t), ArcKind::Inhibitor) => {
                    // Guard only; the delta slot is left alone.
                    guards[t.index].insert(p.index, arc.weight);
                }
                _ => return Err(self.malformed(arc)),
            }
        }

        for ((transition, delta), guard) in self.transitions.iter_mut().zip(deltas).zip(guards) {
            transition.delta = Some(delta);
            transition.guards = guard;
        }
        self.frozen = true;

        debug!(
            schema = %self.schema,
            places = width,
            transitions = self.transitions.len(),
            arcs = self.arcs.len(),
            "model frozen"
        );
        Ok(self)
    }

    fn malformed(&self, arc: &ArcDecl) -> ModelError {
        let reason = match (arc.source, arc.target) {
            (NodeHandle::Place(_), NodeHandle::Place(_)) => "place to place",
            (NodeHandle::Transition(_), NodeHandle::Transition(_)) => "transition to transition",
            _ => "inhibitor arcs must run from a place to a transition",
        };
        ModelError::MalformedArc {
            source_node: self.node_name(&arc.source),
            target_node: self.node_name(&arc.target),
            reason,
        }
    }
}
