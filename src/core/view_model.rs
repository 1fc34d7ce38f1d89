// src/core/view_model.rs

use crate::core::events::ProjectEvent;
use crate::core::tree::{ArgTree, Filter, Node};
use crate::models::NodeId;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// One line of the flattened display list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRow {
    pub project: Uuid,
    pub node: NodeId,
    pub depth: usize,
}

/// Owns every project's tree, keyed by external project identity, and is
/// the single place where bubbled tree events become observable. Also tracks
/// which projects are startup/launch targets as opposed to merely visible.
#[derive(Debug, Default)]
pub struct TreeViewModel {
    projects: HashMap<Uuid, ArgTree>,
    /// Display order of projects; insertion order of the solution.
    order: Vec<Uuid>,
    startup: HashSet<Uuid>,
    filter: Option<Filter>,
}

impl TreeViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a project tree (solution load / project add). A tree for
    /// the same project identity is replaced in place, keeping its display
    /// position. The active filter is applied to the incoming tree.
    pub fn add_project(&mut self, mut tree: ArgTree) {
        let id = tree.project_id();
        tree.set_filter(self.filter.clone());
        if self.projects.insert(id, tree).is_some() {
            log::warn!("Replacing already-registered project '{id}'.");
        } else {
            self.order.push(id);
        }
    }

    /// Project unload / solution close. Unknown ids are a silent no-op.
    pub fn remove_project(&mut self, id: Uuid) -> Option<ArgTree> {
        let tree = self.projects.remove(&id)?;
        self.order.retain(|p| *p != id);
        self.startup.remove(&id);
        Some(tree)
    }

    pub fn project(&self, id: Uuid) -> Option<&ArgTree> {
        self.projects.get(&id)
    }

    pub fn project_mut(&mut self, id: Uuid) -> Option<&mut ArgTree> {
        self.projects.get_mut(&id)
    }

    /// Project trees in display order.
    pub fn projects(&self) -> impl Iterator<Item = &ArgTree> {
        self.order.iter().filter_map(|id| self.projects.get(id))
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    // --- STARTUP TRACKING ---

    pub fn set_startup(&mut self, id: Uuid, is_startup: bool) {
        if !self.projects.contains_key(&id) {
            log::warn!("set_startup: unknown project '{id}'.");
            return;
        }
        if is_startup {
            self.startup.insert(id);
        } else {
            self.startup.remove(&id);
        }
    }

    pub fn is_startup(&self, id: Uuid) -> bool {
        self.startup.contains(&id)
    }

    pub fn startup_projects(&self) -> impl Iterator<Item = &ArgTree> {
        self.projects().filter(|t| self.startup.contains(&t.project_id()))
    }

    pub(crate) fn startup_ids(&self) -> &HashSet<Uuid> {
        &self.startup
    }

    pub(crate) fn restore_startup_ids(&mut self, ids: HashSet<Uuid>) {
        self.startup = ids
            .into_iter()
            .filter(|id| self.projects.contains_key(id))
            .collect();
    }

    // --- EVENTS ---

    /// Drains every project's pending events, stamped with the project they
    /// came from. This is the terminus of event bubbling: observers never
    /// see anything below this level.
    pub fn drain_events(&mut self) -> Vec<ProjectEvent> {
        let mut result = Vec::new();
        for id in &self.order {
            if let Some(tree) = self.projects.get_mut(id) {
                let project = tree.project_id();
                result.extend(
                    tree.drain_events()
                        .into_iter()
                        .map(|event| ProjectEvent { project, event }),
                );
            }
        }
        result
    }

    // --- FILTER & DISPLAY ---

    /// Installs the substring filter on every project tree recursively.
    pub fn set_filter(&mut self, filter: Option<Filter>) {
        self.filter = filter.clone();
        for tree in self.projects.values_mut() {
            tree.set_filter(filter.clone());
        }
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// The flattened display list: each project root followed by its
    /// visible descendants, honoring expansion and the active filter.
    pub fn display_rows(&self) -> Vec<DisplayRow> {
        let mut rows = Vec::new();
        for tree in self.projects() {
            let project = tree.project_id();
            rows.push(DisplayRow {
                project,
                node: tree.root(),
                depth: 0,
            });
            Self::collect_rows(tree, tree.root(), 1, project, &mut rows);
        }
        rows
    }

    fn collect_rows(
        tree: &ArgTree,
        id: NodeId,
        depth: usize,
        project: Uuid,
        rows: &mut Vec<DisplayRow>,
    ) {
        let expanded = tree
            .node(id)
            .and_then(Node::container)
            .is_some_and(|c| c.is_expanded);
        if !expanded {
            return;
        }
        for child in tree.visible_children(id) {
            rows.push(DisplayRow {
                project,
                node: child,
                depth,
            });
            Self::collect_rows(tree, child, depth + 1, project, rows);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::TreeEvent;
    use crate::models::{CheckState, ParameterKind};

    fn project(name: &str) -> ArgTree {
        ArgTree::new(Uuid::new_v4(), name)
    }

    #[test]
    fn test_events_are_stamped_with_their_project() {
        let mut vm = TreeViewModel::new();
        let tree = project("one");
        let one = tree.project_id();
        vm.add_project(tree);
        vm.add_project(project("two"));

        let root = vm.project(one).unwrap().root();
        let leaf = vm
            .project_mut(one)
            .unwrap()
            .insert_parameter(root, 0, ParameterKind::CmdArg, "-a")
            .unwrap();
        vm.drain_events();
        vm.project_mut(one).unwrap().toggle_checked(leaf);

        let events = vm.drain_events();
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.project == one));
        assert!(events.iter().any(|e| matches!(
            e.event,
            TreeEvent::CheckStateChanged {
                node,
                new: CheckState::Checked,
                ..
            } if node == leaf
        )));
        assert!(vm.drain_events().is_empty());
    }

    #[test]
    fn test_startup_tracking_is_orthogonal_to_membership() {
        let mut vm = TreeViewModel::new();
        let tree = project("one");
        let id = tree.project_id();
        vm.add_project(tree);
        vm.add_project(project("two"));

        vm.set_startup(id, true);
        assert!(vm.is_startup(id));
        assert_eq!(vm.startup_projects().count(), 1);

        vm.set_startup(id, false);
        assert_eq!(vm.startup_projects().count(), 0);

        vm.set_startup(id, true);
        vm.remove_project(id);
        assert!(!vm.is_startup(id));
        assert_eq!(vm.len(), 1);
    }

    #[test]
    fn test_display_rows_honor_expansion_and_filter() {
        let mut vm = TreeViewModel::new();
        let mut tree = project("one");
        let root = tree.root();
        let group = tree.insert_group(root, 0, "tools").unwrap();
        tree.insert_parameter(group, 0, ParameterKind::CmdArg, "--verbose")
            .unwrap();
        tree.insert_parameter(root, 1, ParameterKind::CmdArg, "--help")
            .unwrap();
        let id = tree.project_id();
        vm.add_project(tree);

        assert_eq!(vm.display_rows().len(), 4);
        let depths: Vec<usize> = vm.display_rows().iter().map(|r| r.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 1]);

        vm.project_mut(id).unwrap().set_expanded(group, false);
        assert_eq!(vm.display_rows().len(), 3);
        vm.project_mut(id).unwrap().set_expanded(group, true);

        vm.set_filter(Some(Filter::new("verbose", false)));
        let rows = vm.display_rows();
        // root, the group, and the matching leaf survive
        assert_eq!(rows.len(), 3);
        assert!(vm.project(id).unwrap().filter().is_some());

        vm.set_filter(None);
        assert_eq!(vm.display_rows().len(), 4);
    }

    #[test]
    fn test_filter_applies_to_later_added_projects() {
        let mut vm = TreeViewModel::new();
        vm.set_filter(Some(Filter::new("x", false)));
        let tree = project("late");
        let id = tree.project_id();
        vm.add_project(tree);
        assert!(vm.project(id).unwrap().filter().is_some());
    }
}
