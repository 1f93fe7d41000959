//! Resolution context and expand-set accounting

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use trellis_core::variables::Variables;

use crate::error::ResolveError;
use crate::source::IncludeId;

/// Include ceiling when duplicates are deduplicated.
pub const MAX_INCLUDES: usize = 100;
/// Include ceiling when every occurrence counts, duplicates included.
pub const MAX_INCLUDES_COUNTING_DUPLICATES: usize = 150;

/// How the expand-set accounts for includes, fixed once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpandPolicy {
    /// Each include identifier may appear once; a repeat is a circular
    /// include error.
    #[default]
    Dedup,
    /// Occurrences are counted; cycles terminate against the higher
    /// ceiling instead of a membership check.
    CountDuplicates,
}

impl ExpandPolicy {
    pub fn max_includes(self) -> usize {
        match self {
            Self::Dedup => MAX_INCLUDES,
            Self::CountDuplicates => MAX_INCLUDES_COUNTING_DUPLICATES,
        }
    }
}

/// Why an include was refused admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitError {
    CeilingReached(usize),
    Duplicate,
}

/// Record of includes already resolved in one run.
#[derive(Debug)]
struct ExpandSet {
    policy: ExpandPolicy,
    seen: HashSet<IncludeId>,
    count: usize,
}

impl ExpandSet {
    fn new(policy: ExpandPolicy) -> Self {
        Self {
            policy,
            seen: HashSet::new(),
            count: 0,
        }
    }

    fn admit(&mut self, id: &IncludeId) -> Result<(), AdmitError> {
        let max = self.policy.max_includes();

        match self.policy {
            ExpandPolicy::Dedup => {
                if self.seen.contains(id) {
                    return Err(AdmitError::Duplicate);
                }
                if self.seen.len() >= max {
                    return Err(AdmitError::CeilingReached(max));
                }
                self.seen.insert(id.clone());
            }
            ExpandPolicy::CountDuplicates => {
                if self.count >= max {
                    return Err(AdmitError::CeilingReached(max));
                }
                self.count += 1;
            }
        }

        Ok(())
    }

    fn len(&self) -> usize {
        match self.policy {
            ExpandPolicy::Dedup => self.seen.len(),
            ExpandPolicy::CountDuplicates => self.count,
        }
    }
}

/// Resolution-time state for one run.
///
/// Identity fields (project, sha, parent pipeline, variables) are fixed for
/// this context; a nested include gets a derived copy via [`derive`] while
/// the expand-set and deadline stay shared across the whole run.
///
/// [`derive`]: ResolveContext::derive
#[derive(Debug, Clone)]
pub struct ResolveContext {
    pub project: String,
    pub sha: String,
    pub actor_id: Option<Uuid>,
    pub parent_pipeline: Option<Uuid>,
    pub variables: Variables,
    expandset: Arc<Mutex<ExpandSet>>,
    deadline: Option<Instant>,
}

impl ResolveContext {
    pub fn new(
        project: impl Into<String>,
        sha: impl Into<String>,
        variables: Variables,
        policy: ExpandPolicy,
    ) -> Self {
        Self {
            project: project.into(),
            sha: sha.into(),
            actor_id: None,
            parent_pipeline: None,
            variables,
            expandset: Arc::new(Mutex::new(ExpandSet::new(policy))),
            deadline: None,
        }
    }

    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_parent_pipeline(mut self, pipeline_id: Uuid) -> Self {
        self.parent_pipeline = Some(pipeline_id);
        self
    }

    /// Sets the wall-clock deadline for the whole run. Called once at the
    /// top of a resolution; derived contexts inherit it.
    pub fn set_deadline(&mut self, timeout: Duration) {
        self.deadline = Some(Instant::now() + timeout);
    }

    /// Fails fast once the deadline has passed. Checked before every fetch
    /// so resolution time is bounded regardless of include fan-out.
    pub fn check_execution_time(&self) -> Result<(), ResolveError> {
        match self.deadline {
            Some(deadline) if Instant::now() > deadline => Err(ResolveError::Timeout),
            _ => Ok(()),
        }
    }

    /// Registers an include with the shared expand-set.
    pub fn admit(&self, id: &IncludeId, location: &str) -> Result<(), ResolveError> {
        let mut set = self.expandset.lock().expect("expandset lock poisoned");

        set.admit(id).map_err(|e| match e {
            AdmitError::Duplicate => ResolveError::CircularInclude {
                location: self.mask(location),
            },
            AdmitError::CeilingReached(max) => ResolveError::TooManyIncludes {
                location: self.mask(location),
                max,
            },
        })
    }

    /// Number of includes resolved so far in this run.
    pub fn includes_resolved(&self) -> usize {
        self.expandset.lock().expect("expandset lock poisoned").len()
    }

    /// Child context for resolving a nested include: fresh identity, shared
    /// expand-set and deadline.
    pub fn derive(&self, project: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            sha: sha.into(),
            actor_id: self.actor_id,
            parent_pipeline: self.parent_pipeline,
            variables: self.variables.clone(),
            expandset: Arc::clone(&self.expandset),
            deadline: self.deadline,
        }
    }

    /// Masks declared secret values out of text bound for an external
    /// surface.
    pub fn mask(&self, text: &str) -> String {
        self.variables.mask(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn include_id(n: usize) -> IncludeId {
        IncludeId::new(format!("local:proj:sha:file-{n}.yml"))
    }

    fn context(policy: ExpandPolicy) -> ResolveContext {
        ResolveContext::new("group/app", "deadbeef", Variables::new(), policy)
    }

    #[test]
    fn test_dedup_rejects_duplicate_as_circular() {
        let ctx = context(ExpandPolicy::Dedup);
        ctx.admit(&include_id(1), "file-1.yml").unwrap();

        let err = ctx.admit(&include_id(1), "file-1.yml").unwrap_err();
        assert!(matches!(err, ResolveError::CircularInclude { .. }));
    }

    #[test]
    fn test_dedup_ceiling() {
        let ctx = context(ExpandPolicy::Dedup);
        for n in 0..MAX_INCLUDES {
            ctx.admit(&include_id(n), "f").unwrap();
        }

        let err = ctx.admit(&include_id(MAX_INCLUDES), "f").unwrap_err();
        assert_eq!(
            err,
            ResolveError::TooManyIncludes {
                location: "f".to_string(),
                max: MAX_INCLUDES
            }
        );
    }

    #[test]
    fn test_counting_policy_allows_duplicates_until_ceiling() {
        let ctx = context(ExpandPolicy::CountDuplicates);
        for _ in 0..MAX_INCLUDES_COUNTING_DUPLICATES {
            ctx.admit(&include_id(1), "f").unwrap();
        }

        let err = ctx.admit(&include_id(1), "f").unwrap_err();
        assert!(matches!(err, ResolveError::TooManyIncludes { .. }));
    }

    #[test]
    fn test_derived_context_shares_expandset() {
        let ctx = context(ExpandPolicy::Dedup);
        ctx.admit(&include_id(1), "f").unwrap();

        let child = ctx.derive("other/proj", "cafebabe");
        assert_eq!(child.includes_resolved(), 1);
        assert!(child.admit(&include_id(1), "f").is_err());
    }

    #[test]
    fn test_deadline_expiry() {
        let mut ctx = context(ExpandPolicy::Dedup);
        assert!(ctx.check_execution_time().is_ok());

        ctx.set_deadline(Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(ctx.check_execution_time(), Err(ResolveError::Timeout));
    }
}
