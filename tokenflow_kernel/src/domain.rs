/// tokenflow kernel — Core Domain Types
///
/// Pure data. Storage is arena-and-index: places and transitions live in
/// dense vectors owned by the model, and everything else refers to them by
/// tagged index.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ── Identifiers ────────────────────────────────────────────────────

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a place (a "cell" in the state vector).
    PlaceId
);
string_id!(
    /// Identifier of a transition; also the action name evaluators fire.
    TransitionId
);
string_id!(
    /// Authorization tag attached to transitions. Opaque to the kernel.
    RoleId
);

/// Identity of one model instance. Handles carry it so an arc cannot
/// silently join nodes of two different models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(u64);

impl ModelId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

// ── Handles ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaceHandle {
    pub(crate) model: ModelId,
    pub(crate) index: usize,
}

impl PlaceHandle {
    /// Offset of the place in the state vector.
    pub fn offset(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionHandle {
    pub(crate) model: ModelId,
    pub(crate) index: usize,
}

/// Tagged node reference used by the arc ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeHandle {
    Place(PlaceHandle),
    Transition(TransitionHandle),
}

impl NodeHandle {
    pub fn is_place(&self) -> bool {
        matches!(self, NodeHandle::Place(_))
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, NodeHandle::Transition(_))
    }

    pub(crate) fn model(&self) -> ModelId {
        match self {
            NodeHandle::Place(p) => p.model,
            NodeHandle::Transition(t) => t.model,
        }
    }
}

impl From<PlaceHandle> for NodeHandle {
    fn from(h: PlaceHandle) -> Self {
        NodeHandle::Place(h)
    }
}

impl From<TransitionHandle> for NodeHandle {
    fn from(h: TransitionHandle) -> Self {
        NodeHandle::Transition(h)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleHandle(pub(crate) RoleId);

impl RoleHandle {
    pub fn id(&self) -> &RoleId {
        &self.0
    }
}

// ── Declarations ───────────────────────────────────────────────────

/// Position on the x/y grid for visualization. Never read by the compiler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Coords {
    pub x: i64,
    pub y: i64,
}

/// Arguments to `declare_place`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaceSpec {
    pub initial: u64,
    /// Zero means unbounded.
    pub capacity: u64,
    pub coords: Option<Coords>,
}

/// Arguments to `declare_transition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionSpec {
    pub role: RoleHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcKind {
    Normal,
    Inhibitor,
}

/// One ledger entry. Orientation is not checked until freeze.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArcDecl {
    pub source: NodeHandle,
    pub target: NodeHandle,
    pub weight: u64,
    pub kind: ArcKind,
}

// ── Stored nodes ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub id: PlaceId,
    /// Equal to the place's index in the arena.
    pub offset: usize,
    pub initial: u64,
    pub capacity: u64,
    pub coords: Option<Coords>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub id: TransitionId,
    pub role: RoleId,
    /// `None` until freeze.
    pub delta: Option<Vec<i64>>,
    /// Inhibitor guards by place offset. Populated at freeze.
    pub guards: BTreeMap<usize, u64>,
}
