//! Declaration files — models described as TOML or JSON documents.
//!
//! A declaration lists roles, places, transitions, arcs and variables by
//! name. Loading one replays it through the kernel's declaration API, so
//! every kernel rule (offsets, inhibitor orientation, freeze, overlay)
//! applies unchanged. Variable values are literals, bound at load time.
//!
//! ```toml
//! schema = "Counter"
//! roles = ["default"]
//!
//! [[places]]
//! id = "00"
//! initial = 0
//!
//! [[transitions]]
//! id = "INC0"
//! role = "default"
//!
//! [[arcs]]
//! source = "INC0"
//! target = "00"
//! weight = 1
//!
//! [[vars]]
//! kind = "capacity"
//! target = "00"
//! value = 5
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use tokenflow_kernel::{
    ArcKind, Coords, Model, ModelError, NodeHandle, PlaceSpec, Snapshot, TransitionSpec,
};

#[derive(Error, Debug)]
pub enum DeclarationError {
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported declaration file extension: {0:?}")]
    UnsupportedFormat(String),

    #[error("arc endpoint {0:?} names no declared place or transition")]
    UnknownNode(String),

    #[error("arc endpoint {0:?} names both a place and a transition")]
    AmbiguousNode(String),

    #[error("weight variable on {target:?} needs a source")]
    MissingSource { target: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, DeclarationError>;

fn default_weight() -> u64 {
    1
}

fn default_kind() -> ArcKind {
    ArcKind::Normal
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaceDecl {
    pub id: String,
    #[serde(default)]
    pub initial: u64,
    #[serde(default)]
    pub capacity: u64,
    #[serde(default)]
    pub coords: Option<Coords>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionDecl {
    pub id: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArcDeclEntry {
    pub source: String,
    pub target: String,
    #[serde(default = "default_weight")]
    pub weight: u64,
    #[serde(default = "default_kind")]
    pub kind: ArcKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKindDecl {
    Capacity,
    Initial,
    Weight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VarDecl {
    pub kind: VarKindDecl,
    /// Only read for weight variables.
    #[serde(default)]
    pub source: Option<String>,
    pub target: String,
    pub value: u64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A complete model declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Declaration {
    pub schema: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub places: Vec<PlaceDecl>,
    #[serde(default)]
    pub transitions: Vec<TransitionDecl>,
    #[serde(default)]
    pub arcs: Vec<ArcDeclEntry>,
    #[serde(default)]
    pub vars: Vec<VarDecl>,
}

impl Declaration {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a `.toml` or `.json` declaration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let decl = match ext.as_str() {
            "toml" => Self::from_toml_str(&text)?,
            "json" => Self::from_json_str(&text)?,
            other => return Err(DeclarationError::UnsupportedFormat(other.to_string())),
        };
        info!(schema = %decl.schema, path = %path.display(), "declaration loaded");
        Ok(decl)
    }

    /// Replay the declaration into a fresh, unfrozen model with every
    /// variable registered and bound.
    pub fn to_model(&self) -> Result<Model> {
        let mut model = Model::new(self.schema.clone());

        for role in &self.roles {
            model.declare_role(role.as_str())?;
        }

        let mut places = BTreeMap::new();
        for p in &self.places {
            let spec = PlaceSpec {
                initial: p.initial,
                capacity: p.capacity,
                coords: p.coords,
            };
            places.insert(p.id.as_str(), model.declare_place(p.id.as_str(), spec)?);
        }

        let mut transitions = BTreeMap::new();
        for t in &self.transitions {
            let role = model.declare_role(t.role.as_str())?;
            transitions.insert(
                t.id.as_str(),
                model.declare_transition(t.id.as_str(), TransitionSpec { role })?,
            );
        }

        let resolve = |name: &str| -> Result<NodeHandle> {
            match (places.get(name), transitions.get(name)) {
                (Some(p), None) => Ok(NodeHandle::from(*p)),
                (None, Some(t)) => Ok(NodeHandle::from(*t)),
                (Some(_), Some(_)) => Err(DeclarationError::AmbiguousNode(name.to_string())),
                (None, None) => Err(DeclarationError::UnknownNode(name.to_string())),
            }
        };

        for arc in &self.arcs {
            let source = resolve(&arc.source)?;
            let target = resolve(&arc.target)?;
            match arc.kind {
                ArcKind::Normal => model.arc(source, arc.weight, target).map(|_| ())?,
                ArcKind::Inhibitor => model.inhibitor(source, arc.weight, target).map(|_| ())?,
            }
        }

        for v in &self.vars {
            let value = v.value;
            let var = model.new_var()?;
            match v.kind {
                VarKindDecl::Capacity => var.capacity(v.target.as_str()),
                VarKindDecl::Initial => var.initial(v.target.as_str()),
                VarKindDecl::Weight => {
                    let source = v.source.as_deref().ok_or_else(|| DeclarationError::MissingSource {
                        target: v.target.clone(),
                    })?;
                    var.weight(source, v.target.as_str())
                }
            };
            if let Some(label) = &v.label {
                var.label(label.as_str());
            }
            if let Some(description) = &v.description {
                var.describe(description.as_str());
            }
            var.bind(move || value);
        }

        debug!(
            schema = %self.schema,
            places = self.places.len(),
            transitions = self.transitions.len(),
            arcs = self.arcs.len(),
            vars = self.vars.len(),
            "declaration replayed"
        );
        Ok(model)
    }

    /// Declare, freeze, overlay and export in one step.
    pub fn compile(&self) -> Result<Snapshot> {
        Ok(self.to_model()?.compile()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTER: &str = r#"
schema = "Counter"
roles = ["default"]

[[places]]
id = "00"

[[places]]
id = "01"
initial = 1

[[transitions]]
id = "INC0"
role = "default"

[[transitions]]
id = "DEC0"
role = "default"

[[arcs]]
source = "INC0"
target = "00"

[[arcs]]
source = "00"
target = "DEC0"

[[vars]]
kind = "capacity"
target = "00"
value = 5

[[vars]]
kind = "weight"
source = "INC0"
target = "00"
value = 2
label = "step"
"#;

    #[test]
    fn toml_declaration_compiles() {
        let snap = Declaration::from_toml_str(COUNTER).unwrap().compile().unwrap();
        assert_eq!(snap.schema, "Counter");
        assert_eq!(snap.places["00"].capacity, 5);
        assert_eq!(snap.places["01"].initial, 1);
        assert_eq!(snap.transitions["INC0"].delta, vec![2, 0]);
        assert_eq!(snap.transitions["DEC0"].delta, vec![-1, 0]);
    }

    #[test]
    fn json_and_toml_agree() {
        let decl = Declaration::from_toml_str(COUNTER).unwrap();
        let json = serde_json::to_string(&decl).unwrap();
        let again = Declaration::from_json_str(&json).unwrap();
        assert_eq!(decl, again);
        assert_eq!(decl.compile().unwrap(), again.compile().unwrap());
    }

    #[test]
    fn unknown_arc_endpoint_is_reported() {
        let text = r#"
schema = "s"
[[places]]
id = "p"
[[arcs]]
source = "p"
target = "ghost"
"#;
        let err = Declaration::from_toml_str(text).unwrap().to_model().unwrap_err();
        assert!(matches!(err, DeclarationError::UnknownNode(name) if name == "ghost"));
    }

    #[test]
    fn name_used_for_place_and_transition_is_ambiguous() {
        let text = r#"
schema = "s"
[[places]]
id = "x"
[[transitions]]
id = "x"
role = "r"
[[arcs]]
source = "x"
target = "x"
"#;
        let err = Declaration::from_toml_str(text).unwrap().to_model().unwrap_err();
        assert!(matches!(err, DeclarationError::AmbiguousNode(_)));
    }

    #[test]
    fn reversed_inhibitor_is_rejected_at_load() {
        let text = r#"
schema = "s"
[[places]]
id = "p"
[[transitions]]
id = "t"
role = "r"
[[arcs]]
source = "t"
target = "p"
kind = "inhibitor"
"#;
        let err = Declaration::from_toml_str(text).unwrap().to_model().unwrap_err();
        assert!(matches!(err, DeclarationError::Model(ModelError::MalformedArc { .. })));
    }

    #[test]
    fn weight_var_without_source_is_rejected() {
        let text = r#"
schema = "s"
[[places]]
id = "p"
[[vars]]
kind = "weight"
target = "p"
value = 1
"#;
        let err = Declaration::from_toml_str(text).unwrap().to_model().unwrap_err();
        assert!(matches!(err, DeclarationError::MissingSource { .. }));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let text = "schema = \"s\"\nfrozen = true\n";
        assert!(matches!(
            Declaration::from_toml_str(text),
            Err(DeclarationError::Toml(_))
        ));
    }

    #[test]
    fn file_extension_selects_format() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("counter.toml");
        std::fs::write(&toml_path, COUNTER).unwrap();
        let decl = Declaration::from_file(&toml_path).unwrap();
        assert_eq!(decl.schema, "Counter");

        let yaml_path = dir.path().join("counter.yaml");
        std::fs::write(&yaml_path, COUNTER).unwrap();
        assert!(matches!(
            Declaration::from_file(&yaml_path),
            Err(DeclarationError::UnsupportedFormat(ext)) if ext == "yaml"
        ));
    }
}
