//! Acting user domain types

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A capability granted to an actor within the project container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Admin,
    /// Exceptional bypass of protected-ref restrictions. Never granted by
    /// default; exists for break-glass tooling only.
    Jailbreak,
    ReadBuild,
    UpdateBuild,
    AdminBuild,
    EraseBuild,
    DeveloperAccess,
    PublicAccess,
    CreatePipeline,
}

/// The user (or trigger identity) on whose behalf a request runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub username: String,
    /// Unverified accounts may not create pipelines.
    pub verified: bool,
    pub capabilities: HashSet<Capability>,
}

impl Actor {
    /// Whether the actor holds the given capability.
    ///
    /// `Admin` implies every capability except `Jailbreak`, which must
    /// always be granted explicitly.
    pub fn can(&self, capability: Capability) -> bool {
        if self.capabilities.contains(&capability) {
            return true;
        }

        capability != Capability::Jailbreak && self.capabilities.contains(&Capability::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(caps: &[Capability]) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            username: "dev".to_string(),
            verified: true,
            capabilities: caps.iter().copied().collect(),
        }
    }

    #[test]
    fn test_admin_implies_ordinary_capabilities() {
        let a = actor(&[Capability::Admin]);
        assert!(a.can(Capability::UpdateBuild));
        assert!(a.can(Capability::EraseBuild));
    }

    #[test]
    fn test_admin_does_not_imply_jailbreak() {
        let a = actor(&[Capability::Admin]);
        assert!(!a.can(Capability::Jailbreak));
    }

    #[test]
    fn test_explicit_jailbreak_grant() {
        let a = actor(&[Capability::Jailbreak]);
        assert!(a.can(Capability::Jailbreak));
        assert!(!a.can(Capability::UpdateBuild));
    }
}
