//! Project domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::refs::GitRef;

/// Snapshot of the owning project taken at the start of a request.
///
/// The engine never reaches back into the host application mid-run; every
/// decision is made against this snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub path: String,
    pub default_branch: String,
    pub archived: bool,
    pub pending_delete: bool,
    /// Whether job artifacts and traces are visible to non-members.
    pub public_builds: bool,
    /// Wildcard patterns of protected branch names.
    pub protected_branches: Vec<String>,
    /// Wildcard patterns of protected tag names.
    pub protected_tags: Vec<String>,
    /// Branches on which fork collaboration is allowed.
    pub collaboration_branches: Vec<String>,
}

impl Project {
    /// Whether the given reference is protected in this project.
    ///
    /// Branch patterns are checked for references that may be branches,
    /// tag patterns for references that may be tags; a short reference is
    /// checked against both.
    pub fn protected_for(&self, r: &GitRef) -> bool {
        let name = r.short_name();

        (r.could_be_branch() && matches_any(&self.protected_branches, name))
            || (r.could_be_tag() && matches_any(&self.protected_tags, name))
    }

    pub fn branch_allows_collaboration(&self, r: &GitRef) -> bool {
        matches_any(&self.collaboration_branches, r.short_name())
    }
}

fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns.iter().any(|p| wildcard_match(p, name))
}

/// Matches `name` against `pattern`, where a trailing `*` matches any
/// suffix (`release/*` matches `release/1.2`).
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        Project {
            id: Uuid::new_v4(),
            path: "group/app".to_string(),
            default_branch: "main".to_string(),
            archived: false,
            pending_delete: false,
            public_builds: true,
            protected_branches: vec!["main".to_string(), "release/*".to_string()],
            protected_tags: vec!["v*".to_string()],
            collaboration_branches: vec![],
        }
    }

    #[test]
    fn test_protected_branch_exact_and_wildcard() {
        let p = project();
        assert!(p.protected_for(&GitRef::new("refs/heads/main")));
        assert!(p.protected_for(&GitRef::new("refs/heads/release/1.2")));
        assert!(!p.protected_for(&GitRef::new("refs/heads/feature/x")));
    }

    #[test]
    fn test_protected_tag_pattern() {
        let p = project();
        assert!(p.protected_for(&GitRef::new("refs/tags/v1.0")));
        assert!(!p.protected_for(&GitRef::new("refs/tags/nightly")));
    }

    #[test]
    fn test_short_ref_checks_both_pattern_sets() {
        let p = project();
        assert!(p.protected_for(&GitRef::new("v2.0")));
        assert!(p.protected_for(&GitRef::new("main")));
    }
}
