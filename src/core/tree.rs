// src/core/tree.rs

use crate::constants::DEFAULT_DELIMITER;
use crate::core::events::{EditMode, ItemsChange, TreeEvent};
use crate::models::{CheckState, NodeId, ParameterKind};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors for operations that reach the tree with the wrong node variant.
/// These are caller bugs by contract: the UI layer guards against them.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TreeError {
    #[error("Node '{0}' not found in the tree.")]
    NodeNotFound(NodeId),
    #[error("Node '{0}' is not editable (project roots never enter edit mode).")]
    NotEditable(NodeId),
    #[error("Node '{0}' cannot be copied (project roots are not copyable).")]
    NotCopyable(NodeId),
    #[error("Node '{0}' is not a container and cannot hold children.")]
    NotAContainer(NodeId),
}

pub type TreeResult<T> = Result<T, TreeError>;

/// Composition rules for the command-line channel of one container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositionStyle {
    pub delimiter: Option<String>,
    pub prefix: Option<String>,
    pub postfix: Option<String>,
}

impl CompositionStyle {
    pub fn effective_delimiter(&self) -> &str {
        self.delimiter.as_deref().unwrap_or(DEFAULT_DELIMITER)
    }
}

/// State owned by container variants: the ordered child list plus the
/// container-only flags. Child membership is mutated exclusively by the
/// tree's structural operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerData {
    pub children: Vec<NodeId>,
    pub is_expanded: bool,
    pub exclusive_mode: bool,
    pub style: CompositionStyle,
}

impl Default for ContainerData {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            is_expanded: true,
            exclusive_mode: false,
            style: CompositionStyle::default(),
        }
    }
}

/// The closed set of node variants. Every consumption site (aggregation,
/// serialization, copy, display) matches exhaustively on this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The tree root. Never editable, never copyable, never has a parent.
    Project(ContainerData),
    /// User-defined folder-like group; editable and deep-copyable.
    Group(ContainerData),
    /// Leaf parameter; the kind decides how the aggregator reads `value`.
    Parameter(ParameterKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EditBackup {
    backup: String,
}

/// One tree node. Read access goes through `&Node`; all mutation goes
/// through [`ArgTree`] methods so that events and aggregate state stay
/// consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub value: String,
    pub checked: CheckState,
    pub is_selected: bool,
    /// Transient UI focus marker, never persisted.
    pub is_focused: bool,
    pub kind: NodeKind,
    edit: Option<EditBackup>,
}

impl Node {
    pub(crate) fn new(value: String, kind: NodeKind) -> Self {
        Self {
            value,
            checked: CheckState::Unchecked,
            is_selected: false,
            is_focused: false,
            kind,
            edit: None,
        }
    }

    pub fn container(&self) -> Option<&ContainerData> {
        match &self.kind {
            NodeKind::Project(c) | NodeKind::Group(c) => Some(c),
            NodeKind::Parameter(_) => None,
        }
    }

    fn container_mut(&mut self) -> Option<&mut ContainerData> {
        match &mut self.kind {
            NodeKind::Project(c) | NodeKind::Group(c) => Some(c),
            NodeKind::Parameter(_) => None,
        }
    }

    pub fn parameter_kind(&self) -> Option<ParameterKind> {
        match self.kind {
            NodeKind::Parameter(k) => Some(k),
            NodeKind::Project(_) | NodeKind::Group(_) => None,
        }
    }

    pub fn is_container(&self) -> bool {
        self.container().is_some()
    }

    pub fn is_in_edit_mode(&self) -> bool {
        self.edit.is_some()
    }

    fn is_editable(&self) -> bool {
        !matches!(self.kind, NodeKind::Project(_))
    }
}

/// Substring filter inherited by every container's visible projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub pattern: String,
    pub case_sensitive: bool,
}

impl Filter {
    pub fn new(pattern: impl Into<String>, case_sensitive: bool) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive,
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        if self.case_sensitive {
            value.contains(&self.pattern)
        } else {
            value
                .to_lowercase()
                .contains(&self.pattern.to_lowercase())
        }
    }
}

/// Direction for batch reorder of a multi-selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// A detached deep copy of a subtree, every node carrying a fresh id.
/// Produced by [`ArgTree::copy_subtree`] and consumed by [`ArgTree::paste`];
/// this pair is the whole drag-and-drop / clipboard contract of the core.
#[derive(Debug, Clone)]
pub struct Subtree {
    root: NodeId,
    nodes: HashMap<NodeId, Node>,
    parents: HashMap<NodeId, NodeId>,
}

impl Subtree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// One project's argument tree: an arena of nodes keyed by id, a reverse
/// parent lookup maintained only by the structural operations, and the
/// pending event queue the owning view-model drains.
///
/// Single-threaded by design; no operation yields control mid-mutation, so
/// observers never see a partially updated tree.
#[derive(Debug)]
pub struct ArgTree {
    project: Uuid,
    root: NodeId,
    nodes: HashMap<NodeId, Node>,
    parents: HashMap<NodeId, NodeId>,
    filter: Option<Filter>,
    events: Vec<TreeEvent>,
}

impl ArgTree {
    /// Creates the tree for one project. `project` is the external project
    /// identity (host project system), distinct from the root node's id.
    pub fn new(project: Uuid, name: impl Into<String>) -> Self {
        let root = Uuid::new_v4();
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node::new(name.into(), NodeKind::Project(ContainerData::default())),
        );
        Self {
            project,
            root,
            nodes,
            parents: HashMap::new(),
            filter: None,
            events: Vec::new(),
        }
    }

    pub fn project_id(&self) -> Uuid {
        self.project
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth of a node below the root (root itself is 0).
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.parents.get(&current) {
            depth += 1;
            current = *parent;
        }
        depth
    }

    /// Drains and returns the pending events, in emission order.
    pub fn drain_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: TreeEvent) {
        self.events.push(event);
    }

    // --- STRUCTURAL OPERATIONS ---

    /// Inserts a new leaf parameter under `parent` at `index` (clamped).
    pub fn insert_parameter(
        &mut self,
        parent: NodeId,
        index: usize,
        kind: ParameterKind,
        value: impl Into<String>,
    ) -> TreeResult<NodeId> {
        self.attach(parent, index, Node::new(value.into(), NodeKind::Parameter(kind)))
    }

    /// Inserts a new, empty group under `parent` at `index` (clamped).
    pub fn insert_group(
        &mut self,
        parent: NodeId,
        index: usize,
        name: impl Into<String>,
    ) -> TreeResult<NodeId> {
        self.attach(
            parent,
            index,
            Node::new(name.into(), NodeKind::Group(ContainerData::default())),
        )
    }

    fn attach(&mut self, parent: NodeId, index: usize, node: Node) -> TreeResult<NodeId> {
        let container = self
            .nodes
            .get_mut(&parent)
            .ok_or(TreeError::NodeNotFound(parent))?
            .container_mut()
            .ok_or(TreeError::NotAContainer(parent))?;
        let id = Uuid::new_v4();
        let index = index.min(container.children.len());
        container.children.insert(index, id);
        self.nodes.insert(id, node);
        self.parents.insert(id, parent);
        self.emit(TreeEvent::ParentChanged {
            node: id,
            old_parent: None,
            new_parent: Some(parent),
        });
        self.emit(TreeEvent::ItemsChanged {
            parent,
            change: ItemsChange::Inserted { index, id },
        });
        self.update_checked_state(parent);
        Ok(id)
    }

    /// Removes a node and its whole subtree. Removing an unknown id or the
    /// root is a silent no-op.
    pub fn remove(&mut self, id: NodeId) {
        if id == self.root {
            log::warn!("Ignoring attempt to remove the project root node.");
            return;
        }
        let Some(&parent) = self.parents.get(&id) else {
            log::debug!("remove: node '{id}' not found, nothing to do.");
            return;
        };
        let Some(index) = self.detach_from_parent(id, parent) else {
            return;
        };
        self.emit(TreeEvent::ParentChanged {
            node: id,
            old_parent: Some(parent),
            new_parent: None,
        });
        self.emit(TreeEvent::ItemsChanged {
            parent,
            change: ItemsChange::Removed { index, id },
        });
        for dropped in self.subtree_ids(id) {
            self.nodes.remove(&dropped);
            self.parents.remove(&dropped);
        }
        self.update_checked_state(parent);
    }

    fn detach_from_parent(&mut self, id: NodeId, parent: NodeId) -> Option<usize> {
        let container = self.nodes.get_mut(&parent)?.container_mut()?;
        let index = container.children.iter().position(|c| *c == id)?;
        container.children.remove(index);
        Some(index)
    }

    /// Reparents `id` under `new_parent` at `index`. Illegal moves (unknown
    /// ids, non-container target, the root, or a move into the node's own
    /// subtree) are rejected before any mutation and reported as `false`.
    pub fn move_node(&mut self, id: NodeId, new_parent: NodeId, index: usize) -> bool {
        if id == self.root || !self.nodes.contains_key(&id) {
            return false;
        }
        let Some(target) = self.nodes.get(&new_parent) else {
            return false;
        };
        if !target.is_container() {
            return false;
        }
        if self.subtree_ids(id).contains(&new_parent) {
            log::warn!("Rejected move of '{id}': target '{new_parent}' is inside its own subtree.");
            return false;
        }
        let Some(&old_parent) = self.parents.get(&id) else {
            return false;
        };

        if old_parent == new_parent {
            return self.reorder_within(old_parent, id, index);
        }

        let Some(old_index) = self.detach_from_parent(id, old_parent) else {
            return false;
        };
        self.emit(TreeEvent::ItemsChanged {
            parent: old_parent,
            change: ItemsChange::Removed {
                index: old_index,
                id,
            },
        });
        // attach under the new parent, same id
        if let Some(container) = self
            .nodes
            .get_mut(&new_parent)
            .and_then(Node::container_mut)
        {
            let index = index.min(container.children.len());
            container.children.insert(index, id);
            self.parents.insert(id, new_parent);
            self.emit(TreeEvent::ParentChanged {
                node: id,
                old_parent: Some(old_parent),
                new_parent: Some(new_parent),
            });
            self.emit(TreeEvent::ItemsChanged {
                parent: new_parent,
                change: ItemsChange::Inserted { index, id },
            });
        }
        self.update_checked_state(old_parent);
        self.update_checked_state(new_parent);
        true
    }

    /// Pure reordering: cannot change any aggregate state, so no recompute.
    fn reorder_within(&mut self, parent: NodeId, id: NodeId, index: usize) -> bool {
        let Some(container) = self.nodes.get_mut(&parent).and_then(Node::container_mut) else {
            return false;
        };
        let Some(from) = container.children.iter().position(|c| *c == id) else {
            return false;
        };
        let mut to = index.min(container.children.len().saturating_sub(1));
        if to > from {
            // interpret the index relative to the list without the moved item
            to = to.min(container.children.len() - 1);
        }
        if from == to {
            return false;
        }
        container.children.remove(from);
        container.children.insert(to, id);
        self.emit(TreeEvent::ItemsChanged {
            parent,
            change: ItemsChange::Moved { from, to, id },
        });
        true
    }

    /// Moves every selected child of `parent` one slot up or down, keeping
    /// the selection's relative order. All-or-nothing: if the batch touches
    /// the boundary, the whole move is a silent no-op.
    pub fn move_selected(&mut self, parent: NodeId, direction: MoveDirection) -> bool {
        let Some(container) = self.nodes.get(&parent).and_then(Node::container) else {
            return false;
        };
        let selected: Vec<usize> = container
            .children
            .iter()
            .enumerate()
            .filter(|(_, id)| self.nodes.get(id).is_some_and(|n| n.is_selected))
            .map(|(i, _)| i)
            .collect();
        if selected.is_empty() {
            return false;
        }
        let len = container.children.len();
        let mut moves: Vec<(usize, usize, NodeId)> = Vec::with_capacity(selected.len());
        {
            let Some(container) = self.nodes.get_mut(&parent).and_then(Node::container_mut) else {
                return false;
            };
            match direction {
                MoveDirection::Up => {
                    if selected.first() == Some(&0) {
                        return false;
                    }
                    for &i in &selected {
                        let Some(&id) = container.children.get(i) else {
                            continue;
                        };
                        container.children.swap(i - 1, i);
                        moves.push((i, i - 1, id));
                    }
                }
                MoveDirection::Down => {
                    if selected.last() == Some(&(len - 1)) {
                        return false;
                    }
                    for &i in selected.iter().rev() {
                        let Some(&id) = container.children.get(i) else {
                            continue;
                        };
                        container.children.swap(i, i + 1);
                        moves.push((i, i + 1, id));
                    }
                }
            }
        }
        for (from, to, id) in moves {
            self.emit(TreeEvent::ItemsChanged {
                parent,
                change: ItemsChange::Moved { from, to, id },
            });
        }
        true
    }

    // --- VALUE & CHECKED STATE ---

    /// Replaces a node's value, emitting `ValueChanged` when it differs.
    pub fn set_value(&mut self, id: NodeId, value: impl Into<String>) {
        let value = value.into();
        let Some(node) = self.nodes.get_mut(&id) else {
            log::warn!("set_value: node '{id}' not found.");
            return;
        };
        if node.value == value {
            return;
        }
        let old = std::mem::replace(&mut node.value, value.clone());
        self.emit(TreeEvent::ValueChanged {
            node: id,
            old,
            new: value,
        });
    }

    /// Sets the tri-state checked flag.
    ///
    /// With `notify_parent` the enclosing container recomputes its own
    /// aggregate (the bottom-up path). Containers push a concrete state down
    /// to every child with `notify_parent = false`, so the push never echoes
    /// back up.
    pub fn set_checked(&mut self, id: NodeId, state: CheckState, notify_parent: bool) {
        let Some(node) = self.nodes.get(&id) else {
            log::warn!("set_checked: node '{id}' not found.");
            return;
        };
        if node.checked == state {
            return;
        }
        self.apply_checked(id, state);
        if state != CheckState::Mixed {
            let children: Vec<NodeId> = self
                .nodes
                .get(&id)
                .and_then(Node::container)
                .map(|c| c.children.clone())
                .unwrap_or_default();
            for child in children {
                self.set_checked(child, state, false);
            }
        }
        if notify_parent {
            if let Some(&parent) = self.parents.get(&id) {
                self.on_child_check_changed(parent, state);
            }
        }
    }

    /// true <-> false; `Mixed` is treated as false before toggling, so a
    /// mixed node toggles to unchecked first.
    pub fn toggle_checked(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            log::warn!("toggle_checked: node '{id}' not found.");
            return;
        };
        let next = match node.checked {
            CheckState::Unchecked => CheckState::Checked,
            CheckState::Checked | CheckState::Mixed => CheckState::Unchecked,
        };
        self.set_checked(id, next, true);
    }

    /// The exclusive-check gesture: checking one child forces every sibling
    /// unchecked; exclusively re-checking the sole checked child toggles it
    /// off. Distinct from ordinary toggling and invoked explicitly by the
    /// caller (modifier gesture, or any check inside an exclusive container).
    pub fn exclusive_check(&mut self, id: NodeId) {
        let Some(&parent) = self.parents.get(&id) else {
            log::warn!("exclusive_check: node '{id}' has no parent.");
            return;
        };
        let siblings: Vec<NodeId> = self
            .nodes
            .get(&parent)
            .and_then(Node::container)
            .map(|c| c.children.iter().copied().filter(|c| *c != id).collect())
            .unwrap_or_default();
        let others_checked = siblings
            .iter()
            .any(|s| self.nodes.get(s).is_some_and(|n| n.checked != CheckState::Unchecked));
        let self_checked = self
            .nodes
            .get(&id)
            .is_some_and(|n| n.checked == CheckState::Checked);

        if self_checked && !others_checked {
            // re-check of the sole enabled item: toggle off
            self.set_checked(id, CheckState::Unchecked, true);
            return;
        }
        for sibling in siblings {
            self.set_checked(sibling, CheckState::Unchecked, false);
        }
        self.set_checked(id, CheckState::Checked, false);
        self.update_checked_state(parent);
    }

    /// Full bottom-up recomputation of the tri-state invariant for `id` and,
    /// when its state changed, for every ancestor above it.
    pub fn update_checked_state(&mut self, id: NodeId) {
        let mut current = id;
        loop {
            let Some(aggregate) = self.compute_aggregate(current) else {
                // parameters have nothing to derive; start at their parent
                match self.parents.get(&current) {
                    Some(&parent) => {
                        current = parent;
                        continue;
                    }
                    None => return,
                }
            };
            if !self.apply_checked(current, aggregate) {
                return;
            }
            match self.parents.get(&current) {
                Some(&parent) => current = parent,
                None => return,
            }
        }
    }

    /// The tri-state invariant for one container, from its direct children.
    /// `None` for leaves.
    fn compute_aggregate(&self, id: NodeId) -> Option<CheckState> {
        let container = self.nodes.get(&id)?.container()?;
        if container.children.is_empty() {
            return Some(CheckState::Unchecked);
        }
        let mut all_checked = true;
        let mut all_unchecked = true;
        for child in &container.children {
            match self.nodes.get(child).map(|n| n.checked) {
                Some(CheckState::Checked) => all_unchecked = false,
                Some(CheckState::Unchecked) => all_checked = false,
                Some(CheckState::Mixed) | None => {
                    all_checked = false;
                    all_unchecked = false;
                }
            }
        }
        Some(if all_checked {
            CheckState::Checked
        } else if all_unchecked {
            CheckState::Unchecked
        } else {
            CheckState::Mixed
        })
    }

    /// Incremental short-circuit for a single child delta. Must always agree
    /// with [`Self::compute_aggregate`]; an optimization, not a policy.
    fn on_child_check_changed(&mut self, id: NodeId, child_state: CheckState) {
        let Some(container) = self.nodes.get(&id).and_then(Node::container) else {
            return;
        };
        let aggregate = match child_state {
            CheckState::Checked => {
                if container
                    .children
                    .iter()
                    .all(|c| self.nodes.get(c).is_some_and(|n| n.checked == CheckState::Checked))
                {
                    CheckState::Checked
                } else {
                    CheckState::Mixed
                }
            }
            CheckState::Unchecked => {
                if container.children.iter().all(|c| {
                    self.nodes
                        .get(c)
                        .is_some_and(|n| n.checked == CheckState::Unchecked)
                }) {
                    CheckState::Unchecked
                } else {
                    CheckState::Mixed
                }
            }
            CheckState::Mixed => CheckState::Mixed,
        };
        if self.apply_checked(id, aggregate) {
            if let Some(&parent) = self.parents.get(&id) {
                self.on_child_check_changed(parent, aggregate);
            }
        }
    }

    /// Field update plus event, no downward push, no upward notification.
    /// Returns whether the value actually changed.
    fn apply_checked(&mut self, id: NodeId, state: CheckState) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        if node.checked == state {
            return false;
        }
        let old = std::mem::replace(&mut node.checked, state);
        self.emit(TreeEvent::CheckStateChanged {
            node: id,
            old,
            new: state,
        });
        true
    }

    /// Recomputes every container's checked state from the leaves, silently.
    /// Used after bulk population, where persisted container flags are
    /// advisory and must not be trusted.
    pub fn recompute_checked_from_leaves(&mut self) {
        let mut order = self.subtree_ids(self.root);
        order.reverse(); // children before parents
        for id in order {
            if let Some(aggregate) = self.compute_aggregate(id) {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.checked = aggregate;
                }
            }
        }
    }

    // --- SELECTION, EXPANSION, FOCUS ---

    pub fn set_selected(&mut self, id: NodeId, is_selected: bool) {
        let Some(node) = self.nodes.get_mut(&id) else {
            log::warn!("set_selected: node '{id}' not found.");
            return;
        };
        if node.is_selected == is_selected {
            return;
        }
        node.is_selected = is_selected;
        self.emit(TreeEvent::SelectionChanged { node: id, is_selected });
    }

    pub fn set_expanded(&mut self, id: NodeId, is_expanded: bool) {
        let Some(container) = self.nodes.get_mut(&id).and_then(Node::container_mut) else {
            log::warn!("set_expanded: node '{id}' is not a container.");
            return;
        };
        if container.is_expanded == is_expanded {
            return;
        }
        container.is_expanded = is_expanded;
        self.emit(TreeEvent::ExpansionChanged { node: id, is_expanded });
    }

    /// Transient focus marker; carries no event and is never persisted.
    pub fn set_focused(&mut self, id: NodeId, is_focused: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.is_focused = is_focused;
        }
    }

    pub fn set_exclusive_mode(&mut self, id: NodeId, exclusive: bool) {
        if let Some(container) = self.nodes.get_mut(&id).and_then(Node::container_mut) {
            container.exclusive_mode = exclusive;
        }
    }

    pub fn set_style(&mut self, id: NodeId, style: CompositionStyle) {
        if let Some(container) = self.nodes.get_mut(&id).and_then(Node::container_mut) {
            container.style = style;
        }
    }

    // --- EDIT MODE ---

    /// Enters edit mode, capturing the current value for rollback. With an
    /// `initial` value the text is replaced immediately (edit started by
    /// typing) and the emitted mode is `BeganEditAndReset`. Idempotent when
    /// already editing.
    pub fn begin_edit(&mut self, id: NodeId, initial: Option<&str>) -> TreeResult<()> {
        let node = self.editable(id)?;
        if node.edit.is_some() {
            return Ok(());
        }
        let backup = node.value.clone();
        let mode = match initial {
            Some(text) => {
                self.set_value(id, text);
                EditMode::BeganEditAndReset
            }
            None => EditMode::BeganEdit,
        };
        if let Some(node) = self.nodes.get_mut(&id) {
            node.edit = Some(EditBackup { backup });
        }
        self.emit(TreeEvent::EditModeChanged { node: id, mode });
        Ok(())
    }

    /// Leaves edit mode restoring the value captured at edit start. No-op
    /// when not editing.
    pub fn cancel_edit(&mut self, id: NodeId) -> TreeResult<()> {
        let node = self.editable(id)?;
        let Some(EditBackup { backup }) = node.edit.clone() else {
            return Ok(());
        };
        if let Some(node) = self.nodes.get_mut(&id) {
            node.edit = None;
        }
        self.set_value(id, backup);
        self.emit(TreeEvent::EditModeChanged {
            node: id,
            mode: EditMode::CanceledEdit,
        });
        Ok(())
    }

    /// Leaves edit mode keeping the current value. No-op when not editing.
    pub fn commit_edit(&mut self, id: NodeId) -> TreeResult<()> {
        let node = self.editable(id)?;
        if node.edit.is_none() {
            return Ok(());
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.edit = None;
        }
        self.emit(TreeEvent::EditModeChanged {
            node: id,
            mode: EditMode::CommittedEdit,
        });
        Ok(())
    }

    fn editable(&self, id: NodeId) -> TreeResult<&Node> {
        let node = self.nodes.get(&id).ok_or(TreeError::NodeNotFound(id))?;
        if !node.is_editable() {
            return Err(TreeError::NotEditable(id));
        }
        Ok(node)
    }

    // --- COPY & PASTE ---

    /// Detached deep copy: groups clone themselves and all descendants,
    /// parameters clone value and checked state. Every node in the copy
    /// receives a fresh id; transient state (selection, focus, edit) resets.
    pub fn copy_subtree(&self, id: NodeId) -> TreeResult<Subtree> {
        let node = self.nodes.get(&id).ok_or(TreeError::NodeNotFound(id))?;
        if matches!(node.kind, NodeKind::Project(_)) {
            return Err(TreeError::NotCopyable(id));
        }
        let mut subtree = Subtree {
            root: Uuid::nil(),
            nodes: HashMap::new(),
            parents: HashMap::new(),
        };
        subtree.root = self.clone_into(id, &mut subtree);
        Ok(subtree)
    }

    fn clone_into(&self, source: NodeId, subtree: &mut Subtree) -> NodeId {
        let fresh = Uuid::new_v4();
        let Some(original) = self.nodes.get(&source) else {
            return fresh;
        };
        let kind = match &original.kind {
            NodeKind::Parameter(k) => NodeKind::Parameter(*k),
            NodeKind::Group(data) | NodeKind::Project(data) => {
                let mut copy = data.clone();
                copy.children = data
                    .children
                    .iter()
                    .map(|child| {
                        let child_copy = self.clone_into(*child, subtree);
                        subtree.parents.insert(child_copy, fresh);
                        child_copy
                    })
                    .collect();
                // a copied project subtree cannot exist; groups only
                NodeKind::Group(copy)
            }
        };
        let mut node = Node::new(original.value.clone(), kind);
        node.checked = original.checked;
        subtree.nodes.insert(fresh, node);
        fresh
    }

    /// Splices a detached subtree under `parent` at `index` (clamped).
    /// Returns the id of the spliced root.
    pub fn paste(&mut self, subtree: Subtree, parent: NodeId, index: usize) -> TreeResult<NodeId> {
        let container = self
            .nodes
            .get_mut(&parent)
            .ok_or(TreeError::NodeNotFound(parent))?
            .container_mut()
            .ok_or(TreeError::NotAContainer(parent))?;
        let Subtree {
            root,
            nodes,
            parents,
        } = subtree;
        let index = index.min(container.children.len());
        container.children.insert(index, root);
        self.nodes.extend(nodes);
        self.parents.extend(parents);
        self.parents.insert(root, parent);
        self.emit(TreeEvent::ParentChanged {
            node: root,
            old_parent: None,
            new_parent: Some(parent),
        });
        self.emit(TreeEvent::ItemsChanged {
            parent,
            change: ItemsChange::Inserted { index, id: root },
        });
        self.update_checked_state(parent);
        Ok(root)
    }

    // --- BULK POPULATION (persistence load path) ---

    /// Attaches `node` under `parent` with a caller-supplied id, appended at
    /// the end of the child list, without emitting events. A duplicate id in
    /// the persisted data gets a fresh one with a warning; order, values and
    /// flags are otherwise preserved exactly.
    pub(crate) fn restore_node(&mut self, parent: NodeId, id: NodeId, node: Node) -> Option<NodeId> {
        let id = if self.nodes.contains_key(&id) {
            let fresh = Uuid::new_v4();
            log::warn!("Duplicate persisted id '{id}'; assigning fresh id '{fresh}'.");
            fresh
        } else {
            id
        };
        let container = self.nodes.get_mut(&parent)?.container_mut()?;
        container.children.push(id);
        self.nodes.insert(id, node);
        self.parents.insert(id, parent);
        Some(id)
    }

    /// Restores the root container's persisted settings, silently.
    pub(crate) fn configure_root(
        &mut self,
        exclusive: bool,
        style: CompositionStyle,
        is_expanded: bool,
    ) {
        let root = self.root;
        if let Some(container) = self.nodes.get_mut(&root).and_then(Node::container_mut) {
            container.exclusive_mode = exclusive;
            container.style = style;
            container.is_expanded = is_expanded;
        }
    }

    /// Mutable node access for the load path only; all other callers go
    /// through the event-emitting operations.
    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    // --- TRAVERSAL VIEWS ---
    // Lazy recomputed walks, never cached fields.

    /// Pre-order ids of the subtree rooted at `id`, `id` included.
    pub fn subtree_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            result.push(current);
            if let Some(container) = node.container() {
                stack.extend(container.children.iter().rev());
            }
        }
        result
    }

    /// Pre-order descendants of the root, root excluded.
    pub fn descendants(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.subtree_ids(self.root).into_iter().skip(1)
    }

    pub fn all_parameters(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.descendants()
            .filter(move |id| self.nodes.get(id).is_some_and(|n| !n.is_container()))
    }

    pub fn all_containers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.descendants()
            .filter(move |id| self.nodes.get(id).is_some_and(Node::is_container))
    }

    pub fn checked_parameters(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.all_parameters()
            .filter(move |id| self.nodes.get(id).is_some_and(|n| n.checked.is_checked()))
    }

    pub fn selected_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.subtree_ids(self.root)
            .into_iter()
            .filter(move |id| self.nodes.get(id).is_some_and(|n| n.is_selected))
    }

    /// Containers currently expanded, the root included.
    pub fn expanded_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.subtree_ids(self.root).into_iter().filter(move |id| {
            self.nodes
                .get(id)
                .and_then(Node::container)
                .is_some_and(|c| c.is_expanded)
        })
    }

    // --- FILTERING ---

    /// Installs (or clears) the substring filter inherited by every
    /// container's visible projection, and triggers a view refresh.
    pub fn set_filter(&mut self, filter: Option<Filter>) {
        if self.filter == filter {
            return;
        }
        self.filter = filter;
        self.emit(TreeEvent::ItemsChanged {
            parent: self.root,
            change: ItemsChange::Reset,
        });
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// Whether a node survives the active filter: its own value matches, or
    /// any descendant's does (so a matching leaf keeps its ancestors visible).
    pub fn is_visible(&self, id: NodeId) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        self.subtree_ids(id)
            .iter()
            .any(|n| self.nodes.get(n).is_some_and(|node| filter.matches(&node.value)))
    }

    /// The filtered projection of a container's children, in order.
    pub fn visible_children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .and_then(Node::container)
            .map(|c| {
                c.children
                    .iter()
                    .copied()
                    .filter(|child| self.is_visible(*child))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn tree() -> ArgTree {
        ArgTree::new(Uuid::new_v4(), "demo")
    }

    fn arg(t: &mut ArgTree, parent: NodeId, value: &str) -> NodeId {
        let index = t.node(parent).unwrap().container().unwrap().children.len();
        t.insert_parameter(parent, index, ParameterKind::CmdArg, value)
            .unwrap()
    }

    #[test]
    fn test_empty_container_is_unchecked() {
        let mut t = tree();
        let group = t.insert_group(t.root(), 0, "grp").unwrap();
        assert_eq!(t.node(group).unwrap().checked, CheckState::Unchecked);
        assert_eq!(t.node(t.root()).unwrap().checked, CheckState::Unchecked);
    }

    #[test]
    fn test_tri_state_aggregation_bottom_up() {
        let mut t = tree();
        let group = t.insert_group(t.root(), 0, "grp").unwrap();
        let a = arg(&mut t, group, "-a");
        let b = arg(&mut t, group, "-b");

        t.set_checked(a, CheckState::Checked, true);
        assert_eq!(t.node(group).unwrap().checked, CheckState::Mixed);
        assert_eq!(t.node(t.root()).unwrap().checked, CheckState::Mixed);

        t.set_checked(b, CheckState::Checked, true);
        assert_eq!(t.node(group).unwrap().checked, CheckState::Checked);
        assert_eq!(t.node(t.root()).unwrap().checked, CheckState::Checked);

        t.set_checked(a, CheckState::Unchecked, true);
        t.set_checked(b, CheckState::Unchecked, true);
        assert_eq!(t.node(group).unwrap().checked, CheckState::Unchecked);
        assert_eq!(t.node(t.root()).unwrap().checked, CheckState::Unchecked);
    }

    #[test]
    fn test_top_down_push_reaches_every_leaf_without_echo() {
        let mut t = tree();
        let outer = t.insert_group(t.root(), 0, "outer").unwrap();
        let inner = t.insert_group(outer, 0, "inner").unwrap();
        let a = arg(&mut t, outer, "-a");
        let b = arg(&mut t, inner, "-b");
        let c = arg(&mut t, inner, "-c");
        t.set_checked(b, CheckState::Checked, true);

        t.set_checked(outer, CheckState::Checked, true);
        for id in [outer, inner, a, b, c] {
            assert_eq!(t.node(id).unwrap().checked, CheckState::Checked);
        }
        // the push must not leave the container re-derived to anything else
        t.drain_events();
        t.update_checked_state(inner);
        t.update_checked_state(outer);
        assert!(t.drain_events().is_empty(), "push result was not stable");
    }

    #[test]
    fn test_incremental_agrees_with_full_rescan() {
        // random mutation sequences on a depth-4 tree; after every step the
        // cached aggregate must equal a fresh full recomputation
        let mut t = tree();
        let root = t.root();
        let g1 = t.insert_group(root, 0, "g1").unwrap();
        let g2 = t.insert_group(g1, 0, "g2").unwrap();
        let mut leaves = vec![
            arg(&mut t, root, "-r"),
            arg(&mut t, g1, "-a"),
            arg(&mut t, g1, "-b"),
            arg(&mut t, g2, "-c"),
            arg(&mut t, g2, "-d"),
        ];
        leaves.push(arg(&mut t, g2, "-e"));

        let mut rng = StdRng::seed_from_u64(0xA57);
        for _ in 0..500 {
            let leaf = leaves[rng.gen_range(0..leaves.len())];
            if rng.gen_bool(0.5) {
                t.toggle_checked(leaf);
            } else {
                let state = if rng.gen_bool(0.5) {
                    CheckState::Checked
                } else {
                    CheckState::Unchecked
                };
                t.set_checked(leaf, state, true);
            }
            for container in [root, g1, g2] {
                assert_eq!(
                    Some(t.node(container).unwrap().checked),
                    t.compute_aggregate(container),
                    "incremental and full recompute diverged"
                );
            }
        }
    }

    #[test]
    fn test_toggle_treats_mixed_as_false() {
        let mut t = tree();
        let group = t.insert_group(t.root(), 0, "grp").unwrap();
        let a = arg(&mut t, group, "-a");
        arg(&mut t, group, "-b");
        t.set_checked(a, CheckState::Checked, true);
        assert_eq!(t.node(group).unwrap().checked, CheckState::Mixed);

        // mixed -> unchecked, then unchecked -> checked
        t.toggle_checked(group);
        assert_eq!(t.node(group).unwrap().checked, CheckState::Unchecked);
        assert_eq!(t.node(a).unwrap().checked, CheckState::Unchecked);
        t.toggle_checked(group);
        assert_eq!(t.node(group).unwrap().checked, CheckState::Checked);
    }

    #[test]
    fn test_exclusive_check_forces_single_selection() {
        let mut t = tree();
        let group = t.insert_group(t.root(), 0, "grp").unwrap();
        t.set_exclusive_mode(group, true);
        let a = arg(&mut t, group, "-a");
        let b = arg(&mut t, group, "-b");
        let c = arg(&mut t, group, "-c");

        t.exclusive_check(b);
        assert_eq!(t.node(a).unwrap().checked, CheckState::Unchecked);
        assert_eq!(t.node(b).unwrap().checked, CheckState::Checked);
        assert_eq!(t.node(c).unwrap().checked, CheckState::Unchecked);
        assert_eq!(t.node(group).unwrap().checked, CheckState::Mixed);

        // re-checking the sole checked item toggles it off
        t.exclusive_check(b);
        for id in [a, b, c] {
            assert_eq!(t.node(id).unwrap().checked, CheckState::Unchecked);
        }
        assert_eq!(t.node(group).unwrap().checked, CheckState::Unchecked);
    }

    #[test]
    fn test_exclusive_check_with_many_enabled_forces_single() {
        let mut t = tree();
        let group = t.insert_group(t.root(), 0, "grp").unwrap();
        t.set_exclusive_mode(group, true);
        let a = arg(&mut t, group, "-a");
        let b = arg(&mut t, group, "-b");
        t.set_checked(a, CheckState::Checked, true);
        t.set_checked(b, CheckState::Checked, true);

        t.exclusive_check(b);
        assert_eq!(t.node(a).unwrap().checked, CheckState::Unchecked);
        assert_eq!(t.node(b).unwrap().checked, CheckState::Checked);
    }

    #[test]
    fn test_copy_assigns_fresh_ids_and_keeps_content() {
        let mut t = tree();
        let group = t.insert_group(t.root(), 0, "grp").unwrap();
        let a = arg(&mut t, group, "-a");
        t.set_checked(a, CheckState::Checked, true);

        let copy = t.copy_subtree(group).unwrap();
        assert_ne!(copy.root(), group);
        assert_eq!(copy.len(), 2);
        let copy_root = copy.node(copy.root()).unwrap();
        assert_eq!(copy_root.value, "grp");
        assert_eq!(copy_root.checked, CheckState::Checked);
        let child = copy_root.container().unwrap().children[0];
        assert_ne!(child, a);
        assert_eq!(copy.node(child).unwrap().value, "-a");
        assert_eq!(copy.node(child).unwrap().checked, CheckState::Checked);
    }

    #[test]
    fn test_copy_project_root_is_rejected() {
        let t = tree();
        assert_eq!(
            t.copy_subtree(t.root()).unwrap_err(),
            TreeError::NotCopyable(t.root())
        );
    }

    #[test]
    fn test_paste_recomputes_target_aggregate() {
        let mut t = tree();
        let group = t.insert_group(t.root(), 0, "grp").unwrap();
        let a = arg(&mut t, group, "-a");
        t.set_checked(a, CheckState::Checked, true);
        assert_eq!(t.node(t.root()).unwrap().checked, CheckState::Checked);

        let copy = t.copy_subtree(a).unwrap();
        let mut other = tree();
        let pasted = other.paste(copy, other.root(), 0).unwrap();
        assert_eq!(other.node(pasted).unwrap().checked, CheckState::Checked);
        assert_eq!(other.node(other.root()).unwrap().checked, CheckState::Checked);
        assert_eq!(other.parent(pasted), Some(other.root()));
    }

    #[test]
    fn test_move_into_own_descendant_is_rejected() {
        let mut t = tree();
        let outer = t.insert_group(t.root(), 0, "outer").unwrap();
        let inner = t.insert_group(outer, 0, "inner").unwrap();
        assert!(!t.move_node(outer, inner, 0));
        assert_eq!(t.parent(outer), Some(t.root()));
        assert_eq!(t.parent(inner), Some(outer));
    }

    #[test]
    fn test_move_across_containers_updates_both_aggregates() {
        let mut t = tree();
        let g1 = t.insert_group(t.root(), 0, "g1").unwrap();
        let g2 = t.insert_group(t.root(), 1, "g2").unwrap();
        let a = arg(&mut t, g1, "-a");
        let b = arg(&mut t, g2, "-b");
        t.set_checked(a, CheckState::Checked, true);
        assert_eq!(t.node(g1).unwrap().checked, CheckState::Checked);

        assert!(t.move_node(a, g2, 0));
        assert_eq!(t.parent(a), Some(g2));
        assert_eq!(t.node(g1).unwrap().checked, CheckState::Unchecked);
        assert_eq!(t.node(g2).unwrap().checked, CheckState::Mixed);
        let children = &t.node(g2).unwrap().container().unwrap().children;
        assert_eq!(children, &vec![a, b]);
    }

    #[test]
    fn test_batch_move_preserves_relative_order() {
        let mut t = tree();
        let root = t.root();
        let items: Vec<NodeId> = (0..5).map(|i| arg(&mut t, root, &format!("-{i}"))).collect();
        t.set_selected(items[1], true);
        t.set_selected(items[3], true);

        assert!(t.move_selected(root, MoveDirection::Up));
        let children = t.node(root).unwrap().container().unwrap().children.clone();
        assert_eq!(children.iter().position(|c| *c == items[1]), Some(0));
        assert_eq!(children.iter().position(|c| *c == items[3]), Some(2));

        // topmost selected item is now first: the whole batch is a no-op
        assert!(!t.move_selected(root, MoveDirection::Up));
        let after = t.node(root).unwrap().container().unwrap().children.clone();
        assert_eq!(children, after);
    }

    #[test]
    fn test_batch_move_down_boundary_is_all_or_nothing() {
        let mut t = tree();
        let root = t.root();
        let items: Vec<NodeId> = (0..3).map(|i| arg(&mut t, root, &format!("-{i}"))).collect();
        t.set_selected(items[0], true);
        t.set_selected(items[2], true);
        assert!(!t.move_selected(root, MoveDirection::Down));
        let children = t.node(root).unwrap().container().unwrap().children.clone();
        assert_eq!(children, items);
    }

    #[test]
    fn test_edit_mode_rollback_and_commit() {
        let mut t = tree();
        let root = t.root();
        let a = arg(&mut t, root, "-a");

        t.begin_edit(a, None).unwrap();
        assert!(t.node(a).unwrap().is_in_edit_mode());
        // idempotent second begin keeps the original backup
        t.begin_edit(a, None).unwrap();
        t.set_value(a, "-changed");
        t.cancel_edit(a).unwrap();
        assert_eq!(t.node(a).unwrap().value, "-a");
        assert!(!t.node(a).unwrap().is_in_edit_mode());

        t.begin_edit(a, Some("x")).unwrap();
        assert_eq!(t.node(a).unwrap().value, "x");
        t.commit_edit(a).unwrap();
        assert_eq!(t.node(a).unwrap().value, "x");
        assert!(!t.node(a).unwrap().is_in_edit_mode());
    }

    #[test]
    fn test_edit_mode_on_project_root_fails() {
        let mut t = tree();
        let root = t.root();
        assert_eq!(t.begin_edit(root, None), Err(TreeError::NotEditable(root)));
        assert_eq!(t.cancel_edit(root), Err(TreeError::NotEditable(root)));
        assert_eq!(t.commit_edit(root), Err(TreeError::NotEditable(root)));
    }

    #[test]
    fn test_edit_events_distinguish_clean_and_reset_begin() {
        let mut t = tree();
        let root = t.root();
        let a = arg(&mut t, root, "-a");
        t.drain_events();

        t.begin_edit(a, None).unwrap();
        t.commit_edit(a).unwrap();
        t.begin_edit(a, Some("y")).unwrap();
        let modes: Vec<EditMode> = t
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                TreeEvent::EditModeChanged { mode, .. } => Some(mode),
                _ => None,
            })
            .collect();
        assert_eq!(
            modes,
            vec![
                EditMode::BeganEdit,
                EditMode::CommittedEdit,
                EditMode::BeganEditAndReset
            ]
        );
    }

    #[test]
    fn test_remove_cascades_and_updates_aggregate() {
        let mut t = tree();
        let root = t.root();
        let group = t.insert_group(root, 0, "grp").unwrap();
        let a = arg(&mut t, group, "-a");
        let b = arg(&mut t, root, "-b");
        t.set_checked(a, CheckState::Checked, true);
        t.set_checked(b, CheckState::Checked, true);
        assert_eq!(t.node(t.root()).unwrap().checked, CheckState::Checked);

        t.remove(group);
        assert!(t.node(group).is_none());
        assert!(t.node(a).is_none());
        assert_eq!(t.len(), 2);
        assert_eq!(t.node(t.root()).unwrap().checked, CheckState::Checked);

        // removing an unknown id is a silent no-op
        t.remove(group);
    }

    #[test]
    fn test_filter_keeps_ancestors_of_matches_visible() {
        let mut t = tree();
        let root = t.root();
        let group = t.insert_group(root, 0, "tools").unwrap();
        let a = arg(&mut t, group, "--verbose");
        arg(&mut t, group, "--quiet");
        let b = arg(&mut t, root, "--help");

        t.set_filter(Some(Filter::new("VERB", false)));
        assert!(t.is_visible(group));
        assert!(t.is_visible(a));
        assert!(!t.is_visible(b));
        assert_eq!(t.visible_children(t.root()), vec![group]);
        assert_eq!(t.visible_children(group), vec![a]);

        t.set_filter(Some(Filter::new("VERB", true)));
        assert!(!t.is_visible(a));
        t.set_filter(None);
        assert_eq!(t.visible_children(group).len(), 2);
    }

    #[test]
    fn test_events_carry_old_and_new_values() {
        let mut t = tree();
        let root = t.root();
        let a = arg(&mut t, root, "-a");
        t.drain_events();

        t.set_value(a, "-b");
        t.set_checked(a, CheckState::Checked, true);
        let events = t.drain_events();
        assert!(events.contains(&TreeEvent::ValueChanged {
            node: a,
            old: "-a".into(),
            new: "-b".into(),
        }));
        assert!(events.contains(&TreeEvent::CheckStateChanged {
            node: a,
            old: CheckState::Unchecked,
            new: CheckState::Checked,
        }));
        // the parent recompute is also observable
        assert!(events.contains(&TreeEvent::CheckStateChanged {
            node: t.root(),
            old: CheckState::Unchecked,
            new: CheckState::Checked,
        }));
    }

    #[test]
    fn test_random_mutations_keep_invariant_at_depth_four() {
        let mut rng = StdRng::seed_from_u64(0x7EE5);
        for _ in 0..20 {
            let mut t = tree();
            let mut containers = vec![t.root()];
            let mut leaves = Vec::new();
            // random tree of depth <= 4
            for i in 0..rng.gen_range(4..12) {
                let parent = containers[rng.gen_range(0..containers.len())];
                if rng.gen_bool(0.4) && t.depth(parent) < 3 {
                    containers.push(t.insert_group(parent, 0, format!("g{i}")).unwrap());
                } else {
                    leaves.push(arg(&mut t, parent, &format!("-{i}")));
                }
            }
            for _ in 0..200 {
                if leaves.is_empty() {
                    break;
                }
                let leaf = leaves[rng.gen_range(0..leaves.len())];
                t.toggle_checked(leaf);
                for &container in &containers {
                    assert_eq!(
                        Some(t.node(container).unwrap().checked),
                        t.compute_aggregate(container)
                    );
                }
            }
        }
    }
}
