/// tokenflow kernel — Error Types
///
/// Every failure in the kernel is a configuration or compile-time defect.
/// Nothing here is transient and nothing is retried.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    /// Arc endpoints are not place→transition or transition→place,
    /// or an inhibitor was declared with the wrong orientation.
    #[error("malformed arc: {source_node} -> {target_node} ({reason})")]
    MalformedArc {
        source_node: String,
        target_node: String,
        reason: &'static str,
    },

    /// A variable or handle names a node this model does not know.
    #[error("unresolved reference: {kind} {name:?}")]
    UnresolvedReference { kind: &'static str, name: String },

    #[error("unbound variable #{index}{}", label_suffix(.label))]
    UnboundVariable { index: usize, label: Option<String> },

    #[error("variable #{index} was never given a capacity, initial or weight target")]
    UntargetedVariable { index: usize },

    #[error("model {schema:?} is frozen and cannot be altered")]
    AlreadyFrozen { schema: String },

    #[error("model {schema:?} must be frozen first")]
    NotFrozen { schema: String },

    #[error("model {schema:?} was imported from a snapshot; overlay is unavailable")]
    OverlayUnavailable { schema: String },

    #[error("weight {weight} does not fit a signed delta slot")]
    WeightOverflow { weight: u64 },

    #[error("token count {count} does not fit a signed state slot")]
    CountOverflow { count: u64 },

    /// A binding failed after others had already been consumed. The model
    /// can no longer produce a patched snapshot.
    #[error("overlay for model {schema:?} failed part-way; the model cannot be exported")]
    OverlayFailed { schema: String },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("snapshot codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

fn label_suffix(label: &Option<String>) -> String {
    match label {
        Some(l) => format!(" ({})", l),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
