/// tokenflow kernel — Evaluator Interface
///
/// The firing engine lives outside this crate. This trait is the shape it
/// is expected to have; the kernel only guarantees that a `Snapshot`
/// carries what an implementation needs (offset-ordered places, deltas as
/// wide as the place count, roles).

use std::sync::Arc;

use crate::snapshot::Snapshot;

pub trait Evaluator: Sized {
    type Error: std::error::Error;

    /// Build an evaluator over a shared, read-only snapshot.
    fn load(snapshot: Arc<Snapshot>) -> Result<Self, Self::Error>;

    /// State vector before any firing, laid out by place offset.
    fn initial_state(&self) -> Vec<i64>;

    /// Fire `action` `multiplier` times against `state`.
    ///
    /// Returns the resulting vector (even when it violates a bound), the
    /// role the action requires, and the violation if there was one.
    fn transform(
        &self,
        state: &[i64],
        action: &str,
        multiplier: u64,
    ) -> (Vec<i64>, String, Option<Self::Error>);
}
