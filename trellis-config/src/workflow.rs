//! Workflow rule evaluation

use serde_yaml::Value;

use trellis_core::variables::Variables;

use crate::rules::{evaluate_rules, Rule, RuleError, When};

/// Whether the pipeline runs at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowDecision {
    Run,
    Filtered,
}

/// Evaluates the top-level `workflow: rules:` clause.
///
/// No workflow clause means the pipeline always runs. With rules present,
/// first-match-wins applies: a `never` match or no match at all filters the
/// whole pipeline.
pub fn evaluate(config: &Value, vars: &Variables) -> Result<WorkflowDecision, RuleError> {
    let Some(rules_value) = config.get("workflow").and_then(|w| w.get("rules")) else {
        return Ok(WorkflowDecision::Run);
    };

    let rules = Rule::parse_list(rules_value)?;

    match evaluate_rules(&rules, vars)? {
        Some(matched) if matched.when != When::Never => Ok(WorkflowDecision::Run),
        _ => Ok(WorkflowDecision::Filtered),
    }
}
