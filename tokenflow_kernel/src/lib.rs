#![forbid(unsafe_code)]

//! tokenflow kernel: declare a bounded token-flow model, freeze it into
//! per-transition delta vectors, patch it with variables, and export a
//! snapshot for an external evaluator.

/// Snapshot format v1. Part of every canonical hash.
pub const FORMAT_VERSION: u32 = 1;

pub mod arithmetic;
pub mod compile;
pub mod domain;
pub mod error;
pub mod evaluator;
pub mod hashing;
pub mod model;
pub mod overlay;
pub mod snapshot;

pub use domain::{
    ArcKind, Coords, NodeHandle, PlaceHandle, PlaceId, PlaceSpec, RoleHandle, RoleId,
    TransitionHandle, TransitionId, TransitionSpec,
};
pub use error::{ModelError, Result};
pub use evaluator::Evaluator;
pub use model::Model;
pub use overlay::{VarBinding, VarKind, VarTarget};
pub use snapshot::{PlaceState, Snapshot, TransitionState};
