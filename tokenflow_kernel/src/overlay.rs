/// tokenflow kernel — Variable Overlay
///
/// Deferred patches applied on top of a frozen model. A binding is
/// declared unresolved, given a value function, and resolved exactly once
/// by `apply_overlay`. Patches change field values, never the shape.

use std::fmt;
use std::mem;

use tracing::{debug, trace, warn};

use crate::arithmetic::{consumed, produced};
use crate::domain::{PlaceId, TransitionId};
use crate::error::{ModelError, Result};
use crate::model::Model;

type Binding = Box<dyn FnOnce() -> u64 + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Initial,
    Capacity,
    Weight,
}

/// What a binding patches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarTarget {
    Capacity { place: PlaceId },
    Initial { place: PlaceId },
    /// Direction inferred at resolution: whichever endpoint names a
    /// transition decides it, `source` probed first.
    Weight { source: String, target: String },
    /// place → transition, written as `-value`.
    Consume { place: PlaceId, transition: TransitionId },
    /// transition → place, written as `+value`.
    Produce { transition: TransitionId, place: PlaceId },
}

impl VarTarget {
    pub fn kind(&self) -> VarKind {
        match self {
            VarTarget::Capacity { .. } => VarKind::Capacity,
            VarTarget::Initial { .. } => VarKind::Initial,
            VarTarget::Weight { .. } | VarTarget::Consume { .. } | VarTarget::Produce { .. } => {
                VarKind::Weight
            }
        }
    }
}

/// A pending variable. Obtained from `Model::new_var` and configured in
/// place with the chaining setters.
pub struct VarBinding {
    index: usize,
    target: Option<VarTarget>,
    label: Option<String>,
    description: Option<String>,
    binding: Option<Binding>,
}

impl VarBinding {
    fn new(index: usize) -> Self {
        Self {
            index,
            target: None,
            label: None,
            description: None,
            binding: None,
        }
    }

    /// Patch the capacity of a place.
    pub fn capacity(&mut self, place: impl Into<PlaceId>) -> &mut Self {
        self.target = Some(VarTarget::Capacity { place: place.into() });
        self
    }

    /// Patch the initial token count of a place.
    pub fn initial(&mut self, place: impl Into<PlaceId>) -> &mut Self {
        self.target = Some(VarTarget::Initial { place: place.into() });
        self
    }

    /// Patch the weight of the arc between two named nodes.
    pub fn weight(&mut self, source: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.target = Some(VarTarget::Weight {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    pub fn consume(&mut self, place: impl Into<PlaceId>, transition: impl Into<TransitionId>) -> &mut Self {
        self.target = Some(VarTarget::Consume {
            place: place.into(),
            transition: transition.into(),
        });
        self
    }

    pub fn produce(&mut self, transition: impl Into<TransitionId>, place: impl Into<PlaceId>) -> &mut Self {
        self.target = Some(VarTarget::Produce {
            transition: transition.into(),
            place: place.into(),
        });
        self
    }

    pub fn label(&mut self, label: impl Into<String>) -> &mut Self {
        self.label = Some(label.into());
        self
    }

    pub fn describe(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    /// Bind the value-producing function. Binding again replaces it.
    pub fn bind<F>(&mut self, value: F) -> &mut Self
    where
        F: FnOnce() -> u64 + Send + 'static,
    {
        self.binding = Some(Box::new(value));
        self
    }

    pub fn target(&self) -> Option<&VarTarget> {
        self.target.as_ref()
    }

    pub fn kind(&self) -> Option<VarKind> {
        self.target.as_ref().map(VarTarget::kind)
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn resolve(self) -> Result<(VarTarget, u64, Option<String>)> {
        let target = self
            .target
            .ok_or(ModelError::UntargetedVariable { index: self.index })?;
        let binding = self.binding.ok_or(ModelError::UnboundVariable {
            index: self.index,
            label: self.label.clone(),
        })?;
        Ok((target, binding(), self.label))
    }
}

impl fmt::Debug for VarBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarBinding")
            .field("index", &self.index)
            .field("target", &self.target)
            .field("label", &self.label)
            .field("description", &self.description)
            .field("bound", &self.binding.is_some())
            .finish()
    }
}

/// Resolved write position of one binding.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Initial(usize),
    Capacity(usize),
    Produce { transition: usize, place: usize },
    Consume { transition: usize, place: usize },
}

/// Values being patched, committed only once every binding resolved.
struct Staged {
    initial: Vec<u64>,
    capacity: Vec<u64>,
    deltas: Vec<Vec<i64>>,
}

impl Staged {
    fn write(&mut self, slot: Slot, value: u64) -> Result<()> {
        match slot {
            Slot::Initial(p) => self.initial[p] = value,
            Slot::Capacity(p) => self.capacity[p] = value,
            Slot::Produce { transition, place } => self.deltas[transition][place] = produced(value)?,
            Slot::Consume { transition, place } => self.deltas[transition][place] = consumed(value)?,
        }
        Ok(())
    }
}

impl Model {
    /// Register a new pending variable.
    pub fn new_var(&mut self) -> Result<&mut VarBinding> {
        if self.imported {
            return Err(ModelError::OverlayUnavailable {
                schema: self.schema.clone(),
            });
        }
        let index = self.vars.len();
        self.vars.push(VarBinding::new(index));
        Ok(&mut self.vars[index])
    }

    pub fn vars(&self) -> &[VarBinding] {
        &self.vars
    }

    /// Resolve and apply every pending variable in declaration order.
    ///
    /// Requires a frozen model. Targets and bindings are checked first; if
    /// any is missing or names an unknown node, nothing is consumed and the
    /// bindings stay pending. Otherwise the bindings are consumed, and a
    /// value that cannot be written marks the model as failed so that later
    /// exports refuse. No patch is committed unless all succeed. Returns
    /// the number of bindings applied.
    pub fn apply_overlay(&mut self) -> Result<usize> {
        self.assert_frozen()?;
        self.assert_overlay_intact()?;

        let slots = self
            .vars
            .iter()
            .map(|var| self.locate_var(var))
            .collect::<Result<Vec<_>>>()?;

        let vars = mem::take(&mut self.vars);
        let count = vars.len();

        let mut staged = Staged {
            initial: self.places.iter().map(|p| p.initial).collect(),
            capacity: self.places.iter().map(|p| p.capacity).collect(),
            deltas: self
                .transitions
                .iter()
                .map(|t| t.delta.clone().unwrap_or_else(|| vec![0; self.places.len()]))
                .collect(),
        };

        if let Err(err) = self.fill(&mut staged, vars, slots) {
            self.overlay_failed = true;
            warn!(schema = %self.schema, error = %err, "overlay failed after bindings were consumed");
            return Err(err);
        }

        for (place, (initial, capacity)) in self
            .places
            .iter_mut()
            .zip(staged.initial.into_iter().zip(staged.capacity))
        {
            place.initial = initial;
            place.capacity = capacity;
        }
        for (transition, delta) in self.transitions.iter_mut().zip(staged.deltas) {
            transition.delta = Some(delta);
        }

        debug!(schema = %self.schema, applied = count, "overlay applied");
        Ok(count)
    }

    pub(crate) fn assert_overlay_intact(&self) -> Result<()> {
        if self.overlay_failed {
            return Err(ModelError::OverlayFailed {
                schema: self.schema.clone(),
            });
        }
        Ok(())
    }

    fn fill(&self, staged: &mut Staged, vars: Vec<VarBinding>, slots: Vec<Slot>) -> Result<()> {
        for (var, slot) in vars.into_iter().zip(slots) {
            let (target, value, label) = var.resolve()?;
            trace!(schema = %self.schema, ?target, value, label = ?label, "resolve var");
            staged.write(slot, value)?;
        }
        Ok(())
    }

    /// Check a binding without consuming it.
    fn locate_var(&self, var: &VarBinding) -> Result<Slot> {
        let target = var
            .target
            .as_ref()
            .ok_or(ModelError::UntargetedVariable { index: var.index })?;
        if var.binding.is_none() {
            return Err(ModelError::UnboundVariable {
                index: var.index,
                label: var.label.clone(),
            });
        }
        self.locate(target)
    }

    fn locate(&self, target: &VarTarget) -> Result<Slot> {
        let slot = match target {
            VarTarget::Capacity { place } => Slot::Capacity(self.place_offset(place)?),
            VarTarget::Initial { place } => Slot::Initial(self.place_offset(place)?),
            VarTarget::Weight { source, target } => {
                if let Some(&t) = self.transition_index.get(&TransitionId::from(source.as_str())) {
                    Slot::Produce {
                        transition: t,
                        place: self.place_offset(&PlaceId::from(target.as_str()))?,
                    }
                } else if let Some(&t) = self.transition_index.get(&TransitionId::from(target.as_str())) {
                    Slot::Consume {
                        transition: t,
                        place: self.place_offset(&PlaceId::from(source.as_str()))?,
                    }
                } else {
                    return Err(ModelError::UnresolvedReference {
                        kind: "transition",
                        name: format!("{} / {}", source, target),
                    });
                }
            }
            VarTarget::Consume { place, transition } => Slot::Consume {
                transition: self.transition_position(transition)?,
                place: self.place_offset(place)?,
            },
            VarTarget::Produce { transition, place } => Slot::Produce {
                transition: self.transition_position(transition)?,
                place: self.place_offset(place)?,
            },
        };
        Ok(slot)
    }

    fn place_offset(&self, id: &PlaceId) -> Result<usize> {
        self.place_index
            .get(id)
            .copied()
            .ok_or_else(|| ModelError::UnresolvedReference {
                kind: "place",
                name: id.to_string(),
            })
    }

    fn transition_position(&self, id: &TransitionId) -> Result<usize> {
        self.transition_index
            .get(id)
            .copied()
            .ok_or_else(|| ModelError::UnresolvedReference {
                kind: "transition",
                name: id.to_string(),
            })
    }
}
