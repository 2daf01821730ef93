//! Scope and tag filters shared by expiry and eviction.

use std::collections::HashSet;

use crate::directory::Rule;

use super::policy::AutoDeletePolicy;

/// Why a candidate was kept out of a deletion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// The owning rule's mode is outside the policy scope.
    OutOfScope,
    /// Tag checking is on and the live item shares no tag with the rule.
    TagMismatch,
}

/// Decide whether an item owned by `rule` may be deleted.
///
/// Items without an owning rule pass both filters.
pub fn check(
    policy: &AutoDeletePolicy,
    rule: Option<&Rule>,
    live_tags: &[String],
) -> Result<(), Exclusion> {
    let Some(rule) = rule else {
        return Ok(());
    };
    if !policy.scope.includes(rule.mode) {
        return Err(Exclusion::OutOfScope);
    }
    if policy.check_tags && !rule.tags.is_empty() {
        let live: HashSet<&str> = live_tags.iter().map(String::as_str).collect();
        if !rule.tags.iter().any(|t| live.contains(t.as_str())) {
            return Err(Exclusion::TagMismatch);
        }
    }
    Ok(())
}
