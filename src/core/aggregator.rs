// src/core/aggregator.rs

use crate::models::{CheckState, NodeId, ParameterKind, ProjectContext};
use crate::core::tree::{ArgTree, Node, NodeKind};
use std::collections::HashMap;

/// The four hand-off values pushed into the debug configuration before a
/// session starts. The core only produces them; writing them into the host
/// project system is the caller's job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchConfig {
    pub command_line: String,
    pub environment: HashMap<String, String>,
    pub working_directory: Option<String>,
    pub launch_application: Option<String>,
}

/// Rewrites `$(Property)`-style tokens in a parameter value against the
/// owning project's build configuration. Treated as pure by the core;
/// failures are the implementor's concern, never surfaced here.
pub trait MacroEvaluator {
    fn evaluate(&self, value: &str, project: &ProjectContext) -> String;
}

/// Pass-through evaluator for when macro evaluation is disabled by settings.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvaluator;

impl MacroEvaluator for NoopEvaluator {
    fn evaluate(&self, value: &str, _project: &ProjectContext) -> String {
        value.to_string()
    }
}

/// Flattens the checked subset of a whole project tree into its launch
/// configuration.
pub fn aggregate(
    tree: &ArgTree,
    context: &ProjectContext,
    evaluator: &dyn MacroEvaluator,
) -> LaunchConfig {
    aggregate_subtree(tree, tree.root(), context, evaluator)
}

/// Same as [`aggregate`], starting at an explicit node.
///
/// Depth-first, pre-order over the checked subset. The command-line channel
/// is composed per container (`prefix + join(delimiter, ...) + postfix`,
/// recursively); environment variables, working directory and launch
/// override are flat last-checked-wins collections across the whole subtree,
/// untouched by composition rules. Filtering is on each leaf's own checked
/// flag, never on ancestor aggregate state, so a transiently inconsistent
/// tree still aggregates deterministically.
pub fn aggregate_subtree(
    tree: &ArgTree,
    start: NodeId,
    context: &ProjectContext,
    evaluator: &dyn MacroEvaluator,
) -> LaunchConfig {
    let mut config = LaunchConfig::default();
    let Some(node) = tree.node(start) else {
        return config;
    };
    config.command_line = match &node.kind {
        NodeKind::Project(_) | NodeKind::Group(_) => {
            container_contribution(tree, node, context, evaluator, &mut config).unwrap_or_default()
        }
        NodeKind::Parameter(_) => {
            leaf_contribution(node, context, evaluator, &mut config).unwrap_or_default()
        }
    };
    config
}

/// A container's command-line contribution, or `None` when no checked
/// descendant contributed anything (so empty groups never emit a bare
/// `prefix + postfix`). Side channels are collected into `config` on the way.
fn container_contribution(
    tree: &ArgTree,
    node: &Node,
    context: &ProjectContext,
    evaluator: &dyn MacroEvaluator,
    config: &mut LaunchConfig,
) -> Option<String> {
    let container = node.container()?;
    let mut parts: Vec<String> = Vec::new();
    for child_id in &container.children {
        let Some(child) = tree.node(*child_id) else {
            continue;
        };
        let contribution = match &child.kind {
            NodeKind::Project(_) | NodeKind::Group(_) => {
                container_contribution(tree, child, context, evaluator, config)
            }
            NodeKind::Parameter(_) => leaf_contribution(child, context, evaluator, config),
        };
        if let Some(part) = contribution {
            parts.push(part);
        }
    }
    if parts.is_empty() {
        return None;
    }
    let style = &container.style;
    Some(format!(
        "{}{}{}",
        style.prefix.as_deref().unwrap_or_default(),
        parts.join(style.effective_delimiter()),
        style.postfix.as_deref().unwrap_or_default(),
    ))
}

/// A checked leaf's contribution: command-line arguments flow back to the
/// enclosing container, the other kinds land directly in their channel.
fn leaf_contribution(
    node: &Node,
    context: &ProjectContext,
    evaluator: &dyn MacroEvaluator,
    config: &mut LaunchConfig,
) -> Option<String> {
    if node.checked != CheckState::Checked {
        return None;
    }
    let kind = node.parameter_kind()?;
    let value = evaluator.evaluate(&node.value, context);
    match kind {
        ParameterKind::CmdArg => return Some(value),
        ParameterKind::EnvVar => match value.split_once('=') {
            Some((name, val)) => {
                config.environment.insert(name.to_string(), val.to_string());
            }
            None => {
                log::warn!("Environment parameter '{value}' has no '='; using an empty value.");
                config.environment.insert(value, String::new());
            }
        },
        ParameterKind::WorkDir => config.working_directory = Some(value),
        ParameterKind::LaunchApp => config.launch_application = Some(value),
    }
    None
}
