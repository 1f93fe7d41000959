//! Git reference handling

use serde::{Deserialize, Serialize};

/// SHA used when a pipeline has no predecessor commit.
pub const BLANK_SHA: &str = "0000000000000000000000000000000000000000";

const BRANCH_PREFIX: &str = "refs/heads/";
const TAG_PREFIX: &str = "refs/tags/";

/// A git reference as submitted with a pipeline-creation request.
///
/// May be fully qualified (`refs/heads/main`, `refs/tags/v1.0`) or a short
/// name (`main`). A short name cannot be classified as branch or tag on its
/// own, so both `could_be_branch` and `could_be_tag` report `true` for it
/// and the repository lookup settles the question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef(String);

impl GitRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The reference exactly as submitted.
    pub fn full_name(&self) -> &str {
        &self.0
    }

    /// The reference with any `refs/heads/` or `refs/tags/` prefix stripped.
    pub fn short_name(&self) -> &str {
        self.0
            .strip_prefix(BRANCH_PREFIX)
            .or_else(|| self.0.strip_prefix(TAG_PREFIX))
            .unwrap_or(&self.0)
    }

    /// Whether this reference may name a branch.
    pub fn could_be_branch(&self) -> bool {
        self.is_short() || self.0.starts_with(BRANCH_PREFIX)
    }

    /// Whether this reference may name a tag.
    pub fn could_be_tag(&self) -> bool {
        self.is_short() || self.0.starts_with(TAG_PREFIX)
    }

    fn is_short(&self) -> bool {
        !self.0.starts_with("refs/")
    }
}

impl std::fmt::Display for GitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GitRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_branch_ref() {
        let r = GitRef::new("refs/heads/main");
        assert_eq!(r.short_name(), "main");
        assert!(r.could_be_branch());
        assert!(!r.could_be_tag());
    }

    #[test]
    fn test_qualified_tag_ref() {
        let r = GitRef::new("refs/tags/v1.0");
        assert_eq!(r.short_name(), "v1.0");
        assert!(r.could_be_tag());
        assert!(!r.could_be_branch());
    }

    #[test]
    fn test_short_ref_is_ambiguous_by_itself() {
        let r = GitRef::new("main");
        assert_eq!(r.short_name(), "main");
        assert!(r.could_be_branch());
        assert!(r.could_be_tag());
    }
}
