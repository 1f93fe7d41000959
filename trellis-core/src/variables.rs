//! CI variables and secret masking

use serde::{Deserialize, Serialize};

/// Placeholder substituted for every occurrence of a masked value.
pub const MASK_PLACEHOLDER: &str = "[MASKED]";

/// A single CI variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub masked: bool,
}

impl Variable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            masked: false,
        }
    }

    pub fn masked(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            masked: true,
        }
    }
}

/// Ordered collection of CI variables.
///
/// Lookup is last-write-wins, so merging precedence falls out of insertion
/// order: later sources simply append.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variables(Vec<Variable>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, variable: Variable) {
        self.0.push(variable);
    }

    /// The effective value of `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|v| v.key == key)
            .map(|v| v.value.as_str())
    }

    /// Appends all of `other`, giving it precedence over existing entries.
    pub fn merge(&mut self, other: &Variables) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replaces every occurrence of each masked variable's value in `text`
    /// with [`MASK_PLACEHOLDER`].
    ///
    /// Purely textual substring replacement; no defense against encoding
    /// tricks. Must run before resolved configuration text reaches any
    /// externally observable surface.
    pub fn mask(&self, text: &str) -> String {
        self.0
            .iter()
            .filter(|v| v.masked && !v.value.is_empty())
            .fold(text.to_string(), |acc, v| {
                acc.replace(&v.value, MASK_PLACEHOLDER)
            })
    }
}

impl FromIterator<Variable> for Variables {
    fn from_iter<T: IntoIterator<Item = Variable>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let mut vars = Variables::new();
        vars.push(Variable::new("ENV", "staging"));
        vars.push(Variable::new("ENV", "production"));
        assert_eq!(vars.get("ENV"), Some("production"));
    }

    #[test]
    fn test_merge_gives_other_precedence() {
        let mut base = Variables::new();
        base.push(Variable::new("ENV", "staging"));
        let mut overlay = Variables::new();
        overlay.push(Variable::new("ENV", "production"));

        base.merge(&overlay);
        assert_eq!(base.get("ENV"), Some("production"));
    }

    #[test]
    fn test_mask_replaces_every_occurrence() {
        let mut vars = Variables::new();
        vars.push(Variable::masked("TOKEN", "s3cr3tvalue"));

        let masked = vars.mask("token=s3cr3tvalue retry with s3cr3tvalue");
        assert_eq!(masked, "token=[MASKED] retry with [MASKED]");
    }

    #[test]
    fn test_mask_ignores_unmasked_and_empty_values() {
        let mut vars = Variables::new();
        vars.push(Variable::new("PUBLIC", "visible"));
        vars.push(Variable::masked("EMPTY", ""));

        assert_eq!(vars.mask("visible stays"), "visible stays");
    }
}
