/// tokenflow kernel — Model (Node Registry + Arc Ledger)
///
/// Declaration surface. Places get a permanent offset on first
/// declaration; transitions get their delta vector at freeze. Arcs are
/// recorded as tagged handles and are not checked for orientation here,
/// except inhibitors which must read place → transition.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::trace;

use crate::domain::{
    ArcDecl, ArcKind, ModelId, NodeHandle, Place, PlaceHandle, PlaceId, PlaceSpec, RoleHandle,
    RoleId, Transition, TransitionHandle, TransitionId, TransitionSpec,
};
use crate::error::{ModelError, Result};
use crate::overlay::VarBinding;

/// Scaffolding for a token-flow model. Mutable until `freeze`.
pub struct Model {
    pub(crate) id: ModelId,
    pub(crate) schema: String,
    pub(crate) places: Vec<Place>,
    pub(crate) place_index: BTreeMap<PlaceId, usize>,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) transition_index: BTreeMap<TransitionId, usize>,
    pub(crate) roles: BTreeSet<RoleId>,
    pub(crate) arcs: Vec<ArcDecl>,
    pub(crate) vars: Vec<VarBinding>,
    pub(crate) frozen: bool,
    pub(crate) imported: bool,
    /// Set when an overlay consumed bindings and then failed.
    pub(crate) overlay_failed: bool,
}

impl Model {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            id: ModelId::next(),
            schema: schema.into(),
            places: Vec::new(),
            place_index: BTreeMap::new(),
            transitions: Vec::new(),
            transition_index: BTreeMap::new(),
            roles: BTreeSet::new(),
            arcs: Vec::new(),
            vars: Vec::new(),
            frozen: false,
            imported: false,
            overlay_failed: false,
        }
    }

    /// Build a model by running a declaration function against a fresh
    /// instance. The result is not yet frozen.
    pub fn declare<F>(schema: impl Into<String>, declaration: F) -> Result<Self>
    where
        F: FnOnce(&mut Model) -> Result<()>,
    {
        let mut model = Model::new(schema);
        declaration(&mut model)?;
        Ok(model)
    }

    // ── Queries ────────────────────────────────────────────────────

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// True for models rebuilt from a snapshot.
    pub fn is_imported(&self) -> bool {
        self.imported
    }

    /// Number of distinct places; also the length of every delta vector.
    pub fn place_count(&self) -> usize {
        self.places.len()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn roles(&self) -> impl Iterator<Item = &RoleId> {
        self.roles.iter()
    }

    /// Places in offset order.
    pub fn places(&self) -> &[Place] {
        &self.places
    }

    /// Transitions in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn place(&self, id: &str) -> Option<&Place> {
        self.place_index
            .get(&PlaceId::from(id))
            .map(|&i| &self.places[i])
    }

    pub fn transition(&self, id: &str) -> Option<&Transition> {
        self.transition_index
            .get(&TransitionId::from(id))
            .map(|&i| &self.transitions[i])
    }

    /// Pending arc declarations. Empty once the model is imported.
    pub fn arcs(&self) -> &[ArcDecl] {
        &self.arcs
    }

    /// Number of variable bindings not yet applied.
    pub fn pending_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn assert_not_frozen(&self) -> Result<()> {
        if self.frozen {
            return Err(ModelError::AlreadyFrozen {
                schema: self.schema.clone(),
            });
        }
        Ok(())
    }

    pub fn assert_frozen(&self) -> Result<()> {
        if !self.frozen {
            return Err(ModelError::NotFrozen {
                schema: self.schema.clone(),
            });
        }
        Ok(())
    }

    // ── Declarations ───────────────────────────────────────────────

    pub fn declare_role(&mut self, name: impl Into<RoleId>) -> Result<RoleHandle> {
        self.assert_not_frozen()?;
        let role = name.into();
        trace!(schema = %self.schema, role = %role, "declare role");
        self.roles.insert(role.clone());
        Ok(RoleHandle(role))
    }

    /// Declare a place. A repeated identifier overwrites the earlier
    /// declaration's values and keeps its offset.
    pub fn declare_place(&mut self, name: impl Into<PlaceId>, spec: PlaceSpec) -> Result<PlaceHandle> {
        self.assert_not_frozen()?;
        let id = name.into();

        let index = match self.place_index.get(&id) {
            Some(&index) => {
                let place = &mut self.places[index];
                place.initial = spec.initial;
                place.capacity = spec.capacity;
                place.coords = spec.coords;
                index
            }
            None => {
                let index = self.places.len();
                self.places.push(Place {
                    id: id.clone(),
                    offset: index,
                    initial: spec.initial,
                    capacity: spec.capacity,
                    coords: spec.coords,
                });
                self.place_index.insert(id.clone(), index);
                index
            }
        };

        trace!(schema = %self.schema, place = %id, offset = index, "declare place");
        Ok(PlaceHandle {
            model: self.id,
            index,
        })
    }

    /// Declare a transition. A repeated identifier replaces the role.
    pub fn declare_transition(
        &mut self,
        name: impl Into<TransitionId>,
        spec: TransitionSpec,
    ) -> Result<TransitionHandle> {
        self.assert_not_frozen()?;
        let id = name.into();
        let role = spec.role.0;

        let index = match self.transition_index.get(&id) {
            Some(&index) => {
                self.transitions[index].role = role;
                index
            }
            None => {
                let index = self.transitions.len();
                self.transitions.push(Transition {
                    id: id.clone(),
                    role,
                    delta: None,
                    guards: BTreeMap::new(),
                });
                self.transition_index.insert(id.clone(), index);
                index
            }
        };

        trace!(schema = %self.schema, transition = %id, "declare transition");
        Ok(TransitionHandle {
            model: self.id,
            index,
        })
    }

    /// Append an arc to the ledger. Orientation is checked at freeze.
    pub fn add_arc(
        &mut self,
        source: impl Into<NodeHandle>,
        target: impl Into<NodeHandle>,
        weight: u64,
        kind: ArcKind,
    ) -> Result<()> {
        self.assert_not_frozen()?;
        let source = source.into();
        let target = target.into();
        self.check_handle(&source)?;
        self.check_handle(&target)?;

        trace!(
            schema = %self.schema,
            source = %self.node_name(&source),
            target = %self.node_name(&target),
            weight,
            ?kind,
            "declare arc"
        );
        self.arcs.push(ArcDecl {
            source,
            target,
            weight,
            kind,
        });
        Ok(())
    }

    /// Chainable arc declaration. Direction is inferred from the
    /// endpoint kinds at freeze, not from argument order.
    pub fn arc<N>(&mut self, node: N, weight: u64, other: impl Into<NodeHandle>) -> Result<N>
    where
        N: Into<NodeHandle> + Copy,
    {
        self.add_arc(node, other, weight, ArcKind::Normal)?;
        Ok(node)
    }

    /// Declare an inhibitor. Only place → transition is accepted.
    pub fn inhibitor<N>(&mut self, node: N, weight: u64, other: impl Into<NodeHandle>) -> Result<N>
    where
        N: Into<NodeHandle> + Copy,
    {
        self.assert_not_frozen()?;
        let source: NodeHandle = node.into();
        let target: NodeHandle = other.into();
        if !(source.is_place() && target.is_transition()) {
            self.check_handle(&source)?;
            self.check_handle(&target)?;
            return Err(ModelError::MalformedArc {
                source_node: self.node_name(&source),
                target_node: self.node_name(&target),
                reason: "inhibitor arcs must run from a place to a transition",
            });
        }
        self.add_arc(source, target, weight, ArcKind::Inhibitor)?;
        Ok(node)
    }

    /// Place → transition arc with the direction fixed by the types.
    pub fn consume(&mut self, place: PlaceHandle, transition: TransitionHandle, weight: u64) -> Result<()> {
        self.add_arc(place, transition, weight, ArcKind::Normal)
    }

    /// Transition → place arc with the direction fixed by the types.
    pub fn produce(&mut self, transition: TransitionHandle, place: PlaceHandle, weight: u64) -> Result<()> {
        self.add_arc(transition, place, weight, ArcKind::Normal)
    }

    // ── Internals ──────────────────────────────────────────────────

    fn check_handle(&self, handle: &NodeHandle) -> Result<()> {
        let in_range = match handle {
            NodeHandle::Place(p) => p.index < self.places.len(),
            NodeHandle::Transition(t) => t.index < self.transitions.len(),
        };
        if handle.model() != self.id || !in_range {
            return Err(ModelError::UnresolvedReference {
                kind: "handle",
                name: format!("{:?}", handle),
            });
        }
        Ok(())
    }

    pub(crate) fn node_name(&self, handle: &NodeHandle) -> String {
        match handle {
            NodeHandle::Place(p) => self
                .places
                .get(p.index)
                .map(|p| p.id.to_string())
                .unwrap_or_default(),
            NodeHandle::Transition(t) => self
                .transitions
                .get(t.index)
                .map(|t| t.id.to_string())
                .unwrap_or_default(),
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("schema", &self.schema)
            .field("places", &self.places)
            .field("transitions", &self.transitions)
            .field("arcs", &self.arcs.len())
            .field("vars", &self.vars.len())
            .field("frozen", &self.frozen)
            .field("imported", &self.imported)
            .field("overlay_failed", &self.overlay_failed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(model: &mut Model) -> RoleHandle {
        model.declare_role("default").unwrap()
    }

    #[test]
    fn offsets_follow_declaration_order() {
        let mut m = Model::new("offsets");
        let a = m.declare_place("a", PlaceSpec::default()).unwrap();
        let b = m.declare_place("b", PlaceSpec::default()).unwrap();
        let c = m.declare_place("c", PlaceSpec::default()).unwrap();
        assert_eq!((a.offset(), b.offset(), c.offset()), (0, 1, 2));
        assert_eq!(m.place_count(), 3);
        assert_eq!(m.place("b").unwrap().offset, 1);
    }

    #[test]
    fn redeclared_place_overwrites_and_keeps_offset() {
        let mut m = Model::new("redeclare");
        m.declare_place("a", PlaceSpec { initial: 1, ..Default::default() }).unwrap();
        m.declare_place("b", PlaceSpec::default()).unwrap();
        let again = m
            .declare_place("a", PlaceSpec { initial: 4, capacity: 9, coords: None })
            .unwrap();

        assert_eq!(again.offset(), 0);
        assert_eq!(m.place_count(), 2);
        let a = m.place("a").unwrap();
        assert_eq!((a.initial, a.capacity), (4, 9));
    }

    #[test]
    fn redeclared_transition_replaces_role() {
        let mut m = Model::new("redeclare_tx");
        let r1 = m.declare_role("first").unwrap();
        let r2 = m.declare_role("second").unwrap();
        let t1 = m.declare_transition("t", TransitionSpec { role: r1 }).unwrap();
        let t2 = m.declare_transition("t", TransitionSpec { role: r2 }).unwrap();
        assert_eq!(t1, t2);
        assert_eq!(m.transition_count(), 1);
        assert_eq!(m.transition("t").unwrap().role.as_str(), "second");
    }

    #[test]
    fn arcs_are_recorded_without_orientation_check() {
        let mut m = Model::new("ledger");
        let a = m.declare_place("a", PlaceSpec::default()).unwrap();
        let b = m.declare_place("b", PlaceSpec::default()).unwrap();
        m.add_arc(a, b, 1, ArcKind::Normal).unwrap();
        assert_eq!(m.arcs().len(), 1);
    }

    #[test]
    fn arc_is_chainable() {
        let mut m = Model::new("chain");
        let role = user(&mut m);
        let t = m.declare_transition("t", TransitionSpec { role }).unwrap();
        let p = m.declare_place("p", PlaceSpec::default()).unwrap();
        let q = m.declare_place("q", PlaceSpec::default()).unwrap();
        let back = m.arc(t, 1, p).and_then(|t| m.arc(t, 2, q)).unwrap();
        assert_eq!(back, t);
        assert_eq!(m.arcs().len(), 2);
    }

    #[test]
    fn inhibitor_orientation_checked_at_declaration() {
        let mut m = Model::new("inhibit");
        let role = user(&mut m);
        let t = m.declare_transition("t", TransitionSpec { role }).unwrap();
        let p = m.declare_place("p", PlaceSpec::default()).unwrap();

        assert!(m.inhibitor(p, 1, t).is_ok());
        match m.inhibitor(t, 1, p) {
            Err(ModelError::MalformedArc { source_node, target_node, .. }) => {
                assert_eq!(source_node, "t");
                assert_eq!(target_node, "p");
            }
            other => panic!("expected MalformedArc, got {:?}", other),
        }
        assert_eq!(m.arcs().len(), 1);
    }

    #[test]
    fn inhibitor_on_frozen_model_reports_frozen() {
        let mut m = Model::new("inhibit_frozen");
        let role = user(&mut m);
        let t = m.declare_transition("t", TransitionSpec { role }).unwrap();
        let p = m.declare_place("p", PlaceSpec::default()).unwrap();
        m.freeze().unwrap();

        assert!(matches!(m.inhibitor(t, 1, p), Err(ModelError::AlreadyFrozen { .. })));
        assert!(matches!(m.inhibitor(p, 1, t), Err(ModelError::AlreadyFrozen { .. })));
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let mut other = Model::new("other");
        let foreign = other.declare_place("x", PlaceSpec::default()).unwrap();

        let mut m = Model::new("mine");
        let role = user(&mut m);
        let t = m.declare_transition("t", TransitionSpec { role }).unwrap();
        match m.add_arc(foreign, t, 1, ArcKind::Normal) {
            Err(ModelError::UnresolvedReference { kind, .. }) => assert_eq!(kind, "handle"),
            other => panic!("expected UnresolvedReference, got {:?}", other),
        }
    }

    #[test]
    fn declare_runs_the_declaration_function() {
        let m = Model::declare("declared", |m| {
            let role = m.declare_role("default")?;
            let t = m.declare_transition("t", TransitionSpec { role })?;
            let p = m.declare_place("p", PlaceSpec::default())?;
            m.consume(p, t, 1)
        })
        .unwrap();
        assert_eq!(m.schema(), "declared");
        assert_eq!(m.arcs().len(), 1);
        assert!(!m.is_frozen());
    }
}
