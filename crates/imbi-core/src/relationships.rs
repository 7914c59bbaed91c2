//! Relationship type names used across the Imbi graph.

/// Team → Organization.
pub const MANAGED_BY: &str = "MANAGED_BY";
/// Project → Team.
pub const OWNED_BY: &str = "OWNED_BY";
/// Project → ProjectType.
pub const TYPE: &str = "TYPE";
/// User → Team.
pub const MEMBER_OF: &str = "MEMBER_OF";
/// User → Role.
pub const HAS_ROLE: &str = "HAS_ROLE";
/// Session → User.
pub const SESSION_OF: &str = "SESSION_OF";
/// Category (e.g. ProjectType) → Blueprint, carrying a `BlueprintAssignment`.
pub const HAS_BLUEPRINT: &str = "HAS_BLUEPRINT";
