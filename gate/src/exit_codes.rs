//! Stable exit codes for gate CLI commands.

/// All sync passes and hooks succeeded.
pub const OK: i32 = 0;
/// Invalid configuration or any other unclassified error.
pub const INVALID: i32 = 1;
/// The merge queue promised a ref for the project under test that does not exist.
pub const REF_NOT_FOUND: i32 = 2;
/// A remote could not be reached after exhausting the retry budget.
pub const REMOTE_UNREACHABLE: i32 = 3;
/// Workspace preparation succeeded but a hook failed.
pub const HOOK_FAILED: i32 = 4;
