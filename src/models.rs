// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Identity of a single tree node. Assigned once at creation and stable for
/// the node's lifetime; a copy of a node always receives a fresh id.
pub type NodeId = Uuid;

/// Tri-state checked flag. Containers summarize mixed children as `Mixed`;
/// only leaf parameters are ever set to a concrete state by direct user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckState {
    #[default]
    Unchecked,
    Checked,
    Mixed,
}

impl CheckState {
    /// The persisted form: `Some(true)` / `Some(false)` / `None` for `Mixed`.
    pub fn as_flag(self) -> Option<bool> {
        match self {
            Self::Checked => Some(true),
            Self::Unchecked => Some(false),
            Self::Mixed => None,
        }
    }

    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::Checked,
            Some(false) => Self::Unchecked,
            None => Self::Mixed,
        }
    }

    pub fn is_checked(self) -> bool {
        self == Self::Checked
    }
}

/// What a leaf parameter's `value` means to the aggregator.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// Plain command-line argument text; all checked instances are concatenated.
    CmdArg,
    /// `Name=Value` text merged into the environment map, last checked wins.
    EnvVar,
    /// Working directory path, last checked wins.
    WorkDir,
    /// Launch-application override, last checked wins.
    LaunchApp,
}

// --- PERSISTED RECORD SHAPES ---
// The in-memory contract with the serialization layer. Two flag
// representations must round-trip: booleans embedded per item, or
// explicit id-sets on the enclosing project record.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GroupRecord {
    pub id: NodeId,
    pub name: String,
    /// Advisory only: the load path re-derives container state from leaves.
    #[serde(default)]
    pub checked: Option<bool>,
    #[serde(default)]
    pub expanded: Option<bool>,
    #[serde(default)]
    pub selected: Option<bool>,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub postfix: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParameterRecord {
    pub id: NodeId,
    pub value: String,
    pub kind: ParameterKind,
    #[serde(default)]
    pub checked: Option<bool>,
    #[serde(default)]
    pub selected: Option<bool>,
}

/// One node of a persisted tree: container or leaf, externally tagged so the
/// JSON stays human-mergeable under source control.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ItemRecord {
    Group(GroupRecord),
    Parameter(ParameterRecord),
}

/// The full persisted state of one project's argument tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    /// External project identity, correlating with the host project system.
    /// Distinct from the root node's own id.
    pub project: Uuid,
    pub name: String,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub postfix: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    /// The root container's own expansion flag. The root node's id is not
    /// persisted, so this flag cannot travel in the id-set below; absent
    /// means expanded.
    #[serde(default)]
    pub root_expanded: Option<bool>,
    /// Id-set representation of selection. `None` when the embedded
    /// per-item booleans are used instead.
    #[serde(default)]
    pub selected: Option<HashSet<NodeId>>,
    /// Id-set representation of expansion, same convention as `selected`.
    #[serde(default)]
    pub expanded: Option<HashSet<NodeId>>,
}

/// Solution-private state: every project tree plus which projects are
/// startup/launch targets. Stored in the compact binary snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SolutionSnapshot {
    pub format_version: u32,
    pub projects: Vec<ProjectRecord>,
    #[serde(default)]
    pub startup: HashSet<Uuid>,
}

// --- PROJECT CONTEXT (macro evaluation input) ---

/// The slice of host project configuration that macro evaluation may read.
/// Built by the caller from the external project system; the core never
/// inspects build configuration itself.
#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    pub project: Uuid,
    pub name: String,
    pub properties: HashMap<String, String>,
}

impl ProjectContext {
    pub fn new(project: Uuid, name: impl Into<String>) -> Self {
        Self {
            project,
            name: name.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}
