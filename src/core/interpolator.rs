// src/core/interpolator.rs

use crate::core::aggregator::MacroEvaluator;
use crate::models::ProjectContext;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

const MAX_RECURSION_DEPTH: u32 = 32;

lazy_static! {
    static ref MACRO_RE: Regex =
        Regex::new(r"\$\(([A-Za-z_][A-Za-z0-9_.]*)\)").expect("macro token regex is valid");
}

/// Default macro evaluator: expands `$(PropertyName)` tokens against the
/// project context's property map, recursively (a property value may itself
/// contain tokens). Unknown properties are left verbatim so the launch
/// configuration still shows what could not be resolved; cycles and runaway
/// recursion degrade the same way instead of failing the aggregation.
#[derive(Debug, Default, Clone, Copy)]
pub struct Interpolator;

impl Interpolator {
    pub fn new() -> Self {
        Self
    }

    fn expand(
        &self,
        input: &str,
        context: &ProjectContext,
        stack: &mut Vec<String>,
        depth: u32,
    ) -> String {
        if depth >= MAX_RECURSION_DEPTH {
            log::warn!("Maximum macro recursion depth ({MAX_RECURSION_DEPTH}) exceeded; leaving tokens unexpanded.");
            return input.to_string();
        }
        MACRO_RE
            .replace_all(input, |caps: &Captures<'_>| {
                let (Some(token), Some(name)) =
                    (caps.get(0).map(|m| m.as_str()), caps.get(1).map(|m| m.as_str()))
                else {
                    return String::new();
                };
                if stack.iter().any(|seen| seen == name) {
                    log::warn!("Cyclical macro reference detected at '$({name})'.");
                    return token.to_string();
                }
                let Some(value) = self.lookup(name, context) else {
                    log::debug!("Macro '$({name})' not defined for project '{}'.", context.name);
                    return token.to_string();
                };
                stack.push(name.to_string());
                let expanded = self.expand(&value, context, stack, depth + 1);
                stack.pop();
                expanded
            })
            .into_owned()
    }

    /// Reserved names first, then the property map.
    fn lookup(&self, name: &str, context: &ProjectContext) -> Option<String> {
        match name {
            "ProjectName" => Some(context.name.clone()),
            "ProjectGuid" => Some(context.project.to_string()),
            _ => context.properties.get(name).cloned(),
        }
    }
}

impl MacroEvaluator for Interpolator {
    fn evaluate(&self, value: &str, project: &ProjectContext) -> String {
        let mut stack = Vec::new();
        self.expand(value, project, &mut stack, 0)
    }
}
