//! Job authorization policy
//!
//! A declarative rule evaluator over named boolean conditions. Every rule
//! either enables or prevents abilities; all applicable rules are
//! evaluated and prevents are applied last, so a single matching prevent
//! denies the ability no matter how many enables matched
//! (deny-overrides-allow).
//!
//! Evaluation is a pure function of the (actor, job, project) snapshots at
//! call time. Denials are ordinary outcomes, never errors, and nothing here
//! has side effects; results must not be cached beyond a single request.

pub mod conditions;
pub mod rules;

use trellis_core::domain::actor::Actor;
use trellis_core::domain::job::Job;
use trellis_core::domain::project::Project;

pub use conditions::Conditions;
use rules::{rule_table, Effect};

/// Abilities a caller can hold on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    ReadBuildTrace,
    UpdateBuild,
    UpdateCommitStatus,
    EraseBuild,
    PlayJob,
    ReadJobArtifacts,
}

/// Whether `actor` may perform `ability` on `job` within `project`.
pub fn allowed(actor: &Actor, job: &Job, project: &Project, ability: Ability) -> bool {
    let conditions = Conditions::compute(actor, job, project);

    let mut enabled = false;

    for rule in rule_table() {
        if !rule.abilities.contains(&ability) {
            continue;
        }
        if !(rule.applies)(&conditions) {
            continue;
        }

        match rule.effect {
            Effect::Enable => enabled = true,
            // Deny overrides allow: one matching prevent is final.
            Effect::Prevent => return false,
        }
    }

    enabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::domain::actor::Capability;
    use trellis_core::domain::job::JobStatus;
    use uuid::Uuid;

    fn project() -> Project {
        Project {
            id: Uuid::new_v4(),
            path: "group/app".to_string(),
            default_branch: "main".to_string(),
            archived: false,
            pending_delete: false,
            public_builds: true,
            protected_branches: vec!["main".to_string()],
            protected_tags: vec![],
            collaboration_branches: vec![],
        }
    }

    fn actor(caps: &[Capability]) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            username: "dev".to_string(),
            verified: true,
            capabilities: caps.iter().copied().collect(),
        }
    }

    fn job(ref_name: &str, owner: Option<Uuid>) -> Job {
        Job {
            id: Uuid::new_v4(),
            pipeline_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "build".to_string(),
            stage: "build".to_string(),
            status: JobStatus::Success,
            ref_name: ref_name.to_string(),
            tag: false,
            tags: vec![],
            needs: vec![],
            allow_failure: false,
            owner_id: owner,
            outdated_deployment: false,
            debug_mode: false,
            has_artifacts: true,
            artifacts_public: true,
            erased_at: None,
        }
    }

    #[test]
    fn test_update_allowed_on_unprotected_ref() {
        let a = actor(&[Capability::UpdateBuild]);
        assert!(allowed(&a, &job("feature/x", None), &project(), Ability::UpdateBuild));
    }

    #[test]
    fn test_protected_ref_prevents_update_despite_grant() {
        let a = actor(&[Capability::UpdateBuild]);
        assert!(!allowed(&a, &job("main", None), &project(), Ability::UpdateBuild));
    }

    #[test]
    fn test_jailbreak_bypasses_protected_ref_prevent() {
        let a = actor(&[Capability::UpdateBuild, Capability::Jailbreak]);
        assert!(allowed(&a, &job("main", None), &project(), Ability::UpdateBuild));
    }

    #[test]
    fn test_archived_prevents_update_even_for_owner() {
        let a = actor(&[Capability::UpdateBuild]);
        let mut p = project();
        p.archived = true;
        let j = job("feature/x", Some(a.id));

        assert!(!allowed(&a, &j, &p, Ability::UpdateBuild));
    }

    #[test]
    fn test_outdated_deployment_prevents_update() {
        let a = actor(&[Capability::UpdateBuild]);
        let mut j = job("feature/x", None);
        j.outdated_deployment = true;

        assert!(!allowed(&a, &j, &project(), Ability::UpdateBuild));
        // Other abilities are unaffected by this prevent.
        assert!(allowed(&a, &j, &project(), Ability::PlayJob));
    }

    #[test]
    fn test_erase_requires_ownership_on_unprotected_ref() {
        let owner = actor(&[Capability::UpdateBuild]);
        let stranger = actor(&[Capability::UpdateBuild]);
        let j = job("feature/x", Some(owner.id));

        assert!(allowed(&owner, &j, &project(), Ability::EraseBuild));
        assert!(!allowed(&stranger, &j, &project(), Ability::EraseBuild));
    }

    #[test]
    fn test_admin_build_can_erase_without_ownership() {
        let a = actor(&[Capability::AdminBuild]);
        assert!(allowed(&a, &job("feature/x", None), &project(), Ability::EraseBuild));
    }

    #[test]
    fn test_trace_read_prevented_in_debug_mode_without_update_rights() {
        let reader = actor(&[Capability::ReadBuild]);
        let mut j = job("feature/x", None);
        assert!(allowed(&reader, &j, &project(), Ability::ReadBuildTrace));

        j.debug_mode = true;
        assert!(!allowed(&reader, &j, &project(), Ability::ReadBuildTrace));

        let updater = actor(&[Capability::ReadBuild, Capability::UpdateBuild]);
        assert!(allowed(&updater, &j, &project(), Ability::ReadBuildTrace));
    }

    #[test]
    fn test_private_artifacts_require_developer_access() {
        let reader = actor(&[Capability::ReadBuild]);
        let mut j = job("feature/x", None);
        j.artifacts_public = false;

        assert!(!allowed(&reader, &j, &project(), Ability::ReadJobArtifacts));

        let developer = actor(&[Capability::ReadBuild, Capability::DeveloperAccess]);
        assert!(allowed(&developer, &j, &project(), Ability::ReadJobArtifacts));
    }

    #[test]
    fn test_collaboration_branch_enables_update_for_public_access() {
        let a = actor(&[Capability::PublicAccess]);
        let mut p = project();
        p.collaboration_branches = vec!["feature/*".to_string()];

        assert!(allowed(&a, &job("feature/x", None), &p, Ability::UpdateBuild));
        assert!(!allowed(&a, &job("other", None), &p, Ability::UpdateBuild));
    }

    #[test]
    fn test_no_matching_rule_denies() {
        let a = actor(&[]);
        assert!(!allowed(&a, &job("feature/x", None), &project(), Ability::ReadBuildTrace));
    }
}
