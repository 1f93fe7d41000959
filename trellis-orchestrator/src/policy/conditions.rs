//! Policy conditions
//!
//! Each condition is computed once per evaluation from the subject job,
//! the acting user, and the owning project snapshot.

use trellis_core::domain::actor::{Actor, Capability};
use trellis_core::domain::job::Job;
use trellis_core::domain::project::Project;
use trellis_core::domain::refs::GitRef;

/// The named boolean conditions the rule table is written against.
#[derive(Debug, Clone, Copy)]
pub struct Conditions {
    pub protected_ref: bool,
    pub unprotected_ref: bool,
    pub outdated_deployment: bool,
    pub owner_of_job: bool,
    pub archived: bool,
    pub debug_mode: bool,
    pub artifacts_public: bool,
    pub branch_allows_collaboration: bool,
    pub can_read_project_build: bool,
    pub project_update_build: bool,
    pub project_developer: bool,
    pub admin_build: bool,
    pub public_access: bool,
    pub jailbreak: bool,
}

impl Conditions {
    pub fn compute(actor: &Actor, job: &Job, project: &Project) -> Self {
        let job_ref = qualified_ref(job);
        let protected_ref = project.protected_for(&job_ref);

        Self {
            protected_ref,
            unprotected_ref: !protected_ref,
            outdated_deployment: job.outdated_deployment,
            owner_of_job: job.triggered_by(actor.id),
            archived: project.archived,
            debug_mode: job.debug_mode,
            artifacts_public: job.artifacts_public,
            branch_allows_collaboration: project.branch_allows_collaboration(&job_ref),
            can_read_project_build: actor.can(Capability::ReadBuild),
            project_update_build: actor.can(Capability::UpdateBuild),
            project_developer: actor.can(Capability::DeveloperAccess),
            admin_build: actor.can(Capability::AdminBuild),
            public_access: actor.can(Capability::PublicAccess),
            jailbreak: actor.can(Capability::Jailbreak),
        }
    }
}

/// A job records its short ref name plus whether it ran for a tag; rebuild
/// the qualified form so protection patterns match the right kind.
fn qualified_ref(job: &Job) -> GitRef {
    if job.tag {
        GitRef::new(format!("refs/tags/{}", job.ref_name))
    } else {
        GitRef::new(format!("refs/heads/{}", job.ref_name))
    }
}
