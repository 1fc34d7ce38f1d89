// src/core/storage.rs

use crate::constants::SNAPSHOT_FORMAT_VERSION;
use crate::core::tree::{ArgTree, CompositionStyle, ContainerData, Node, NodeKind};
use crate::core::view_model::TreeViewModel;
use crate::models::{
    CheckState, GroupRecord, ItemRecord, NodeId, ParameterRecord, ProjectRecord, SolutionSnapshot,
};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to read or write JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to decode from binary format: {0}")]
    BincodeDecode(#[from] bincode::error::DecodeError),
    #[error("Failed to encode to binary format: {0}")]
    BincodeEncode(#[from] bincode::error::EncodeError),
}

type StorageResult<T> = Result<T, StorageError>;

/// Which shape the selection/expansion flags take in a saved record. Both
/// must round-trip; the JSON-next-to-the-project format embeds booleans per
/// item, the solution snapshot keeps explicit id-sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagForm {
    Embedded,
    IdSets,
}

// --- TREE -> RECORD ---

/// Serializes one project tree into its record shape, preserving order,
/// ids and all flags.
pub fn tree_to_record(tree: &ArgTree, form: FlagForm) -> ProjectRecord {
    let root = tree
        .node(tree.root())
        .expect("a tree always has its root node");
    let container = root
        .container()
        .expect("the root node is always a container");
    let items = container
        .children
        .iter()
        .filter_map(|child| item_to_record(tree, *child, form))
        .collect();
    let (selected, expanded) = match form {
        FlagForm::Embedded => (None, None),
        FlagForm::IdSets => (
            Some(tree.selected_ids().collect::<HashSet<NodeId>>()),
            // the root's flag travels on the record itself; its id is
            // regenerated on load and would never match the set
            Some(
                tree.expanded_ids()
                    .filter(|id| *id != tree.root())
                    .collect::<HashSet<NodeId>>(),
            ),
        ),
    };
    ProjectRecord {
        project: tree.project_id(),
        name: root.value.clone(),
        exclusive: container.exclusive_mode,
        delimiter: container.style.delimiter.clone(),
        prefix: container.style.prefix.clone(),
        postfix: container.style.postfix.clone(),
        items,
        root_expanded: Some(container.is_expanded),
        selected,
        expanded,
    }
}

fn item_to_record(tree: &ArgTree, id: NodeId, form: FlagForm) -> Option<ItemRecord> {
    let node = tree.node(id)?;
    let embedded = form == FlagForm::Embedded;
    Some(match &node.kind {
        NodeKind::Project(_) => {
            // a project never appears below the root
            log::warn!("Skipping nested project node '{id}' during serialization.");
            return None;
        }
        NodeKind::Group(container) => ItemRecord::Group(GroupRecord {
            id,
            name: node.value.clone(),
            checked: node.checked.as_flag(),
            expanded: embedded.then_some(container.is_expanded),
            selected: embedded.then_some(node.is_selected),
            exclusive: container.exclusive_mode,
            delimiter: container.style.delimiter.clone(),
            prefix: container.style.prefix.clone(),
            postfix: container.style.postfix.clone(),
            items: container
                .children
                .iter()
                .filter_map(|child| item_to_record(tree, *child, form))
                .collect(),
        }),
        NodeKind::Parameter(kind) => ItemRecord::Parameter(ParameterRecord {
            id,
            value: node.value.clone(),
            kind: *kind,
            checked: node.checked.as_flag(),
            selected: embedded.then_some(node.is_selected),
        }),
    })
}

// --- RECORD -> TREE ---

/// Reconstructs a project tree from its record, preserving order, ids and
/// flags. Container checked flags in the record are advisory and ignored:
/// every container's state is re-derived from the leaves afterwards, so a
/// stale or corrupted persisted aggregate can never survive a load.
pub fn tree_from_record(record: &ProjectRecord) -> ArgTree {
    let mut tree = ArgTree::new(record.project, &record.name);
    tree.configure_root(
        record.exclusive,
        CompositionStyle {
            delimiter: record.delimiter.clone(),
            prefix: record.prefix.clone(),
            postfix: record.postfix.clone(),
        },
        record.root_expanded.unwrap_or(true),
    );
    let root = tree.root();
    for item in &record.items {
        restore_item(&mut tree, root, item);
    }
    apply_id_sets(&mut tree, record);
    tree.recompute_checked_from_leaves();
    tree.drain_events();
    tree
}

fn restore_item(tree: &mut ArgTree, parent: NodeId, item: &ItemRecord) {
    match item {
        ItemRecord::Group(group) => {
            let data = ContainerData {
                children: Vec::new(),
                is_expanded: group.expanded.unwrap_or(true),
                exclusive_mode: group.exclusive,
                style: CompositionStyle {
                    delimiter: group.delimiter.clone(),
                    prefix: group.prefix.clone(),
                    postfix: group.postfix.clone(),
                },
            };
            let mut node = Node::new(group.name.clone(), NodeKind::Group(data));
            node.is_selected = group.selected.unwrap_or(false);
            let Some(id) = tree.restore_node(parent, group.id, node) else {
                log::warn!("Could not restore group '{}' under '{parent}'.", group.id);
                return;
            };
            for child in &group.items {
                restore_item(tree, id, child);
            }
        }
        ItemRecord::Parameter(param) => {
            let mut node = Node::new(param.value.clone(), NodeKind::Parameter(param.kind));
            // leaves are always concrete; a persisted null means unchecked
            node.checked = CheckState::from_flag(Some(param.checked.unwrap_or(false)));
            node.is_selected = param.selected.unwrap_or(false);
            if tree.restore_node(parent, param.id, node).is_none() {
                log::warn!("Could not restore parameter '{}' under '{parent}'.", param.id);
            }
        }
    }
}

/// Applies the id-set representation of selection and expansion, when
/// present. Ids that no longer exist in the tree are ignored.
fn apply_id_sets(tree: &mut ArgTree, record: &ProjectRecord) {
    let all: Vec<NodeId> = tree.subtree_ids(tree.root());
    if let Some(selected) = &record.selected {
        for id in &all {
            if let Some(node) = tree.node_mut(*id) {
                node.is_selected = selected.contains(id);
            }
        }
    }
    if let Some(expanded) = &record.expanded {
        let root = tree.root();
        for id in all {
            // the root's expansion comes from the record, not the set
            if id == root {
                continue;
            }
            let is_expanded = expanded.contains(&id);
            if let Some(node) = tree.node_mut(id) {
                if let NodeKind::Project(container) | NodeKind::Group(container) = &mut node.kind {
                    container.is_expanded = is_expanded;
                }
            }
        }
    }
}

// --- SOLUTION SNAPSHOT ---

/// Captures the whole view-model (every project plus the startup set) as
/// the solution-private snapshot.
pub fn solution_to_snapshot(view_model: &TreeViewModel) -> SolutionSnapshot {
    SolutionSnapshot {
        format_version: SNAPSHOT_FORMAT_VERSION,
        projects: view_model
            .projects()
            .map(|tree| tree_to_record(tree, FlagForm::IdSets))
            .collect(),
        startup: view_model.startup_ids().clone(),
    }
}

/// Rebuilds a view-model from a snapshot. A newer-than-known format version
/// is loaded best-effort with a warning.
pub fn solution_from_snapshot(snapshot: &SolutionSnapshot) -> TreeViewModel {
    if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
        log::warn!(
            "Snapshot format version {} is newer than supported {}; loading best-effort.",
            snapshot.format_version,
            SNAPSHOT_FORMAT_VERSION
        );
    }
    let mut view_model = TreeViewModel::new();
    for record in &snapshot.projects {
        view_model.add_project(tree_from_record(record));
    }
    view_model.restore_startup_ids(snapshot.startup.clone());
    view_model
}

// --- FILE HELPERS ---
// The source-control-shareable JSON next to the project file, and the
// compact binary snapshot for solution-private state.

pub fn save_project_json(path: &Path, record: &ProjectRecord) -> StorageResult<()> {
    let json = serde_json::to_string_pretty(record)?;
    fs::write(path, json)?;
    log::debug!("Saved project record to '{}'.", path.display());
    Ok(())
}

pub fn load_project_json(path: &Path) -> StorageResult<ProjectRecord> {
    let bytes = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&bytes)?)
}

pub fn save_snapshot(path: &Path, snapshot: &SolutionSnapshot) -> StorageResult<()> {
    let bytes = bincode::serde::encode_to_vec(snapshot, bincode::config::standard())?;
    fs::write(path, bytes)?;
    log::debug!("Saved solution snapshot to '{}'.", path.display());
    Ok(())
}

pub fn load_snapshot(path: &Path) -> StorageResult<SolutionSnapshot> {
    let bytes = fs::read(path)?;
    let (snapshot, _): (SolutionSnapshot, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
    Ok(snapshot)
}
