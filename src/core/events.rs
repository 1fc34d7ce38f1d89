// src/core/events.rs

use crate::models::{CheckState, NodeId};
use uuid::Uuid;

/// How an edit-mode transition happened, so a view can decide whether to
/// select-all (`BeganEdit`) or place the caret at the end
/// (`BeganEditAndReset`, edit triggered by the user typing a first character).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    BeganEdit,
    BeganEditAndReset,
    CanceledEdit,
    CommittedEdit,
}

/// A single structural change to a container's child list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemsChange {
    Inserted { index: usize, id: NodeId },
    Removed { index: usize, id: NodeId },
    Moved { from: usize, to: usize, id: NodeId },
    /// The whole child list was replaced (bulk load, filter change).
    Reset,
}

/// The closed set of notifications a tree mutation can produce. Events carry
/// enough information for an observer to react without re-querying the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    ParentChanged {
        node: NodeId,
        old_parent: Option<NodeId>,
        new_parent: Option<NodeId>,
    },
    ValueChanged {
        node: NodeId,
        old: String,
        new: String,
    },
    CheckStateChanged {
        node: NodeId,
        old: CheckState,
        new: CheckState,
    },
    SelectionChanged {
        node: NodeId,
        is_selected: bool,
    },
    ExpansionChanged {
        node: NodeId,
        is_expanded: bool,
    },
    ItemsChanged {
        parent: NodeId,
        change: ItemsChange,
    },
    EditModeChanged {
        node: NodeId,
        mode: EditMode,
    },
}

/// A tree event stamped with the external identity of the project it came
/// from. This is the only shape the project-level listener ever sees:
/// arbitrarily deep mutations surface here without any parent-pointer walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEvent {
    pub project: Uuid,
    pub event: TreeEvent,
}
