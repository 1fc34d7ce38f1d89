// src/core/tree_display.rs

use crate::core::tree::{ArgTree, Node, NodeKind};
use crate::models::{CheckState, NodeId, ParameterKind};
use colored::Colorize;

/// Renders a project tree as ASCII, with tri-state check markers and a kind
/// tag for non-argument parameters. Collapsed containers still render fully
/// here; this is an inspection view, not the IDE tool window.
pub fn render_tree(tree: &ArgTree) -> String {
    let mut out = String::new();
    let root = tree.root();
    if let Some(node) = tree.node(root) {
        out.push_str(&format!("{}\n", node.value.bold()));
        let children = tree.visible_children(root);
        for (i, child) in children.iter().enumerate() {
            render_node(tree, *child, "", i == children.len() - 1, &mut out);
        }
    }
    out
}

fn render_node(tree: &ArgTree, id: NodeId, prefix: &str, is_last: bool, out: &mut String) {
    let Some(node) = tree.node(id) else {
        return;
    };
    let connector = if is_last { "└─" } else { "├─" };
    out.push_str(&format!(
        "{}{} {} {}\n",
        prefix,
        connector,
        check_marker(node.checked),
        describe(node)
    ));

    let child_prefix = format!("{}{}", prefix, if is_last { "   " } else { "│  " });
    let children = tree.visible_children(id);
    for (i, child) in children.iter().enumerate() {
        render_node(tree, *child, &child_prefix, i == children.len() - 1, out);
    }
}

fn check_marker(state: CheckState) -> String {
    match state {
        CheckState::Checked => "[x]".green().to_string(),
        CheckState::Unchecked => "[ ]".to_string(),
        CheckState::Mixed => "[-]".yellow().to_string(),
    }
}

fn describe(node: &Node) -> String {
    match &node.kind {
        NodeKind::Project(_) => node.value.bold().to_string(),
        NodeKind::Group(container) => {
            let name = node.value.cyan().to_string();
            if container.exclusive_mode {
                format!("{name} {}", "(exclusive)".dimmed())
            } else {
                name
            }
        }
        NodeKind::Parameter(kind) => match kind {
            ParameterKind::CmdArg => node.value.clone(),
            ParameterKind::EnvVar => format!("{} {}", "env:".dimmed(), node.value),
            ParameterKind::WorkDir => format!("{} {}", "cwd:".dimmed(), node.value),
            ParameterKind::LaunchApp => format!("{} {}", "app:".dimmed(), node.value),
        },
    }
}
