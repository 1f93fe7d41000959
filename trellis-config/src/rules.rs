//! Rule clause evaluation
//!
//! Rules gate workflow runs and individual jobs. A rule list is evaluated
//! first-match-wins against the effective variable set; the matched rule's
//! `when` decides whether and how the subject runs.

use regex::Regex;
use serde_yaml::Value;
use thiserror::Error;

use trellis_core::variables::Variables;

/// When a job (or workflow) runs once its rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum When {
    #[default]
    OnSuccess,
    Always,
    Never,
    Manual,
    Delayed,
}

impl When {
    pub fn parse(s: &str) -> Result<Self, RuleError> {
        match s {
            "on_success" => Ok(Self::OnSuccess),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            "manual" => Ok(Self::Manual),
            "delayed" => Ok(Self::Delayed),
            other => Err(RuleError::InvalidWhen(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnSuccess => "on_success",
            Self::Always => "always",
            Self::Never => "never",
            Self::Manual => "manual",
            Self::Delayed => "delayed",
        }
    }
}

/// Errors raised while parsing or evaluating rule clauses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("invalid rule expression `{0}`")]
    InvalidExpression(String),

    #[error("invalid pattern `{0}`")]
    InvalidPattern(String),

    #[error("invalid `when` value `{0}`")]
    InvalidWhen(String),

    #[error("rules must be a sequence of mappings")]
    InvalidStructure,
}

/// One rule clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub if_clause: Option<String>,
    pub when: When,
    pub allow_failure: Option<bool>,
}

impl Rule {
    pub fn from_yaml(value: &Value) -> Result<Self, RuleError> {
        let map = value.as_mapping().ok_or(RuleError::InvalidStructure)?;

        let if_clause = map
            .get("if")
            .and_then(Value::as_str)
            .map(str::to_string);

        let when = match map.get("when").and_then(Value::as_str) {
            Some(s) => When::parse(s)?,
            None => When::OnSuccess,
        };

        let allow_failure = map.get("allow_failure").and_then(Value::as_bool);

        Ok(Self {
            if_clause,
            when,
            allow_failure,
        })
    }

    pub fn parse_list(value: &Value) -> Result<Vec<Self>, RuleError> {
        let entries = value.as_sequence().ok_or(RuleError::InvalidStructure)?;
        entries.iter().map(Self::from_yaml).collect()
    }

    /// Whether this rule matches the variable set. A rule without an `if`
    /// clause always matches.
    pub fn matches(&self, vars: &Variables) -> Result<bool, RuleError> {
        match &self.if_clause {
            Some(expr) => evaluate_expression(expr, vars),
            None => Ok(true),
        }
    }
}

/// Outcome of a matched rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    pub when: When,
    pub allow_failure: Option<bool>,
}

/// Evaluates a rule list first-match-wins. `None` means no rule matched and
/// the subject is filtered out.
pub fn evaluate_rules(rules: &[Rule], vars: &Variables) -> Result<Option<RuleMatch>, RuleError> {
    for rule in rules {
        if rule.matches(vars)? {
            return Ok(Some(RuleMatch {
                when: rule.when,
                allow_failure: rule.allow_failure,
            }));
        }
    }

    Ok(None)
}

/// Evaluates a rule expression against the variable set.
///
/// Supported grammar: `$VAR`, `$VAR == "literal"`, `$VAR != "literal"`,
/// `$VAR == null`, `$VAR =~ /pattern/`, `$VAR !~ /pattern/`, joined with
/// `&&` and `||` (no parentheses; `&&` binds tighter).
pub fn evaluate_expression(expr: &str, vars: &Variables) -> Result<bool, RuleError> {
    for group in expr.split("||") {
        let mut group_matches = true;

        for term in group.split("&&") {
            if !evaluate_term(term.trim(), vars)? {
                group_matches = false;
                break;
            }
        }

        if group_matches {
            return Ok(true);
        }
    }

    Ok(false)
}

fn evaluate_term(term: &str, vars: &Variables) -> Result<bool, RuleError> {
    let invalid = || RuleError::InvalidExpression(term.to_string());

    let rest = term.strip_prefix('$').ok_or_else(invalid)?;
    let name_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(rest.len());
    let (name, tail) = rest.split_at(name_len);
    if name.is_empty() {
        return Err(invalid());
    }

    let value = vars.get(name);
    let tail = tail.trim();

    if tail.is_empty() {
        // Bare $VAR: defined and non-empty.
        return Ok(value.is_some_and(|v| !v.is_empty()));
    }

    if let Some(operand) = tail.strip_prefix("==") {
        return Ok(match parse_operand(term, operand.trim())? {
            Operand::Null => value.is_none(),
            Operand::Literal(lit) => value == Some(lit.as_str()),
        });
    }

    if let Some(operand) = tail.strip_prefix("!=") {
        return Ok(match parse_operand(term, operand.trim())? {
            Operand::Null => value.is_some(),
            Operand::Literal(lit) => value != Some(lit.as_str()),
        });
    }

    if let Some(pattern) = tail.strip_prefix("=~") {
        let re = parse_pattern(pattern.trim())?;
        return Ok(value.is_some_and(|v| re.is_match(v)));
    }

    if let Some(pattern) = tail.strip_prefix("!~") {
        let re = parse_pattern(pattern.trim())?;
        return Ok(!value.is_some_and(|v| re.is_match(v)));
    }

    Err(invalid())
}

enum Operand {
    Null,
    Literal(String),
}

fn parse_operand(term: &str, operand: &str) -> Result<Operand, RuleError> {
    if operand == "null" {
        return Ok(Operand::Null);
    }

    let stripped = operand
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| operand.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));

    match stripped {
        Some(lit) => Ok(Operand::Literal(lit.to_string())),
        None => Err(RuleError::InvalidExpression(term.to_string())),
    }
}

fn parse_pattern(pattern: &str) -> Result<Regex, RuleError> {
    let inner = pattern
        .strip_prefix('/')
        .and_then(|s| s.strip_suffix('/'))
        .ok_or_else(|| RuleError::InvalidPattern(pattern.to_string()))?;

    Regex::new(inner).map_err(|_| RuleError::InvalidPattern(pattern.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::variables::Variable;

    fn vars() -> Variables {
        [
            Variable::new("CI_COMMIT_BRANCH", "main"),
            Variable::new("CI_PIPELINE_SOURCE", "push"),
            Variable::new("EMPTY", ""),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_equality() {
        assert!(evaluate_expression("$CI_COMMIT_BRANCH == \"main\"", &vars()).unwrap());
        assert!(!evaluate_expression("$CI_COMMIT_BRANCH == \"dev\"", &vars()).unwrap());
        assert!(evaluate_expression("$CI_COMMIT_BRANCH != 'dev'", &vars()).unwrap());
    }

    #[test]
    fn test_null_comparison() {
        assert!(evaluate_expression("$UNDEFINED == null", &vars()).unwrap());
        assert!(evaluate_expression("$CI_COMMIT_BRANCH != null", &vars()).unwrap());
    }

    #[test]
    fn test_bare_variable_requires_non_empty() {
        assert!(evaluate_expression("$CI_COMMIT_BRANCH", &vars()).unwrap());
        assert!(!evaluate_expression("$EMPTY", &vars()).unwrap());
        assert!(!evaluate_expression("$UNDEFINED", &vars()).unwrap());
    }

    #[test]
    fn test_pattern_match() {
        assert!(evaluate_expression("$CI_COMMIT_BRANCH =~ /^ma/", &vars()).unwrap());
        assert!(evaluate_expression("$CI_COMMIT_BRANCH !~ /^dev/", &vars()).unwrap());
        assert!(evaluate_expression("$UNDEFINED !~ /x/", &vars()).unwrap());
    }

    #[test]
    fn test_conjunction_binds_tighter_than_disjunction() {
        // Parsed as ($UNDEFINED && $EMPTY) || $CI_COMMIT_BRANCH.
        let expr = "$UNDEFINED && $EMPTY || $CI_COMMIT_BRANCH";
        assert!(evaluate_expression(expr, &vars()).unwrap());

        let expr = "$CI_COMMIT_BRANCH && $UNDEFINED || $EMPTY";
        assert!(!evaluate_expression(expr, &vars()).unwrap());
    }

    #[test]
    fn test_invalid_expression() {
        assert!(evaluate_expression("branch == \"main\"", &vars()).is_err());
        assert!(evaluate_expression("$VAR ~= /x/", &vars()).is_err());
    }

    #[test]
    fn test_first_match_wins() {
        let rules = vec![
            Rule {
                if_clause: Some("$CI_PIPELINE_SOURCE == \"schedule\"".to_string()),
                when: When::Never,
                allow_failure: None,
            },
            Rule {
                if_clause: Some("$CI_COMMIT_BRANCH == \"main\"".to_string()),
                when: When::Always,
                allow_failure: Some(true),
            },
        ];

        let matched = evaluate_rules(&rules, &vars()).unwrap().unwrap();
        assert_eq!(matched.when, When::Always);
        assert_eq!(matched.allow_failure, Some(true));
    }

    #[test]
    fn test_no_match_filters_out() {
        let rules = vec![Rule {
            if_clause: Some("$CI_COMMIT_BRANCH == \"dev\"".to_string()),
            when: When::Always,
            allow_failure: None,
        }];

        assert_eq!(evaluate_rules(&rules, &vars()).unwrap(), None);
    }

    #[test]
    fn test_rule_list_parsing() {
        let value: Value = serde_yaml::from_str(
            r#"
            - if: $CI_COMMIT_BRANCH == "main"
              when: manual
              allow_failure: true
            - when: on_success
            "#,
        )
        .unwrap();

        let rules = Rule::parse_list(&value).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].when, When::Manual);
        assert_eq!(rules[1].if_clause, None);
    }
}
