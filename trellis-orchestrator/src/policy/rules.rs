//! The policy rule table

use super::conditions::Conditions;
use super::Ability;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Enable,
    Prevent,
}

/// One declarative rule: when `applies` holds, `effect` is applied to every
/// ability listed.
pub struct RuleSpec {
    pub name: &'static str,
    pub effect: Effect,
    pub abilities: &'static [Ability],
    pub applies: fn(&Conditions) -> bool,
}

/// The fixed rule table, evaluated in full for every decision.
///
/// Order within the table does not matter for the outcome: the engine
/// collects enables first and lets any matching prevent win.
pub fn rule_table() -> &'static [RuleSpec] {
    const RULES: &[RuleSpec] = &[
        RuleSpec {
            name: "read_trace_with_build_access",
            effect: Effect::Enable,
            abilities: &[Ability::ReadBuildTrace],
            applies: |c| c.can_read_project_build,
        },
        RuleSpec {
            name: "debug_trace_needs_update_rights",
            effect: Effect::Prevent,
            abilities: &[Ability::ReadBuildTrace],
            applies: |c| c.debug_mode && !c.project_update_build,
        },
        // There is a "jailbreak" capability to exceptionally bypass the
        // protected-entity block. It must never be the default path.
        RuleSpec {
            name: "protected_entities_block_mutation",
            effect: Effect::Prevent,
            abilities: &[
                Ability::UpdateBuild,
                Ability::UpdateCommitStatus,
                Ability::EraseBuild,
            ],
            applies: |c| !c.jailbreak && (c.archived || c.protected_ref),
        },
        RuleSpec {
            name: "outdated_deployment_blocks_update",
            effect: Effect::Prevent,
            abilities: &[Ability::UpdateBuild],
            applies: |c| c.outdated_deployment,
        },
        RuleSpec {
            name: "update_build_grant",
            effect: Effect::Enable,
            abilities: &[Ability::UpdateBuild, Ability::UpdateCommitStatus],
            applies: |c| c.project_update_build,
        },
        RuleSpec {
            name: "erase_own_build_on_unprotected_ref",
            effect: Effect::Enable,
            abilities: &[Ability::EraseBuild],
            applies: |c| {
                c.admin_build || (c.project_update_build && c.owner_of_job && c.unprotected_ref)
            },
        },
        RuleSpec {
            name: "collaboration_branch_update",
            effect: Effect::Enable,
            abilities: &[Ability::UpdateBuild, Ability::UpdateCommitStatus],
            applies: |c| c.public_access && c.branch_allows_collaboration,
        },
        RuleSpec {
            name: "play_job_with_update_rights",
            effect: Effect::Enable,
            abilities: &[Ability::PlayJob],
            applies: |c| c.project_update_build,
        },
        RuleSpec {
            name: "read_artifacts_with_build_access",
            effect: Effect::Enable,
            abilities: &[Ability::ReadJobArtifacts],
            applies: |c| c.can_read_project_build,
        },
        RuleSpec {
            name: "private_artifacts_need_developer",
            effect: Effect::Prevent,
            abilities: &[Ability::ReadJobArtifacts],
            applies: |c| !c.artifacts_public && !c.project_developer,
        },
    ];

    RULES
}
