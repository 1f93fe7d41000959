//! Chain steps in their declared order

pub mod enforce_limits;
pub mod evaluate_workflow;
pub mod expand_seed;
pub mod external_validation;
pub mod persist;
pub mod resolve_config;
pub mod validate_access;
pub mod validate_ref;
