use crate::authz::types::{Action, Decision, DenyReason, Resource};
use crate::session::Identity;

/// Decide whether `identity` may perform `action` on `resource`.
///
/// Rules are evaluated in order and the first match wins; anything not
/// explicitly allowed is forbidden.
pub fn authorize(identity: Option<&Identity>, action: Action, resource: Resource<'_>) -> Decision {
    // 1. Public lookups need no identity
    if action == Action::PublicSearch {
        return Decision::Allow;
    }

    // 2. Everything else requires a resolved caller
    let Some(identity) = identity else {
        return Decision::Deny(DenyReason::Unauthorized);
    };

    match action {
        // 3. Filing is a citizen capability
        Action::CreateReport if !identity.is_police() => Decision::Allow,

        // 4. Owner-scoped reads and profile access
        Action::ReadOwnReports
        | Action::ReadOwnReport
        | Action::ReadProfile
        | Action::UpdateProfile => {
            if resource.owner() == Some(identity.user_id.as_str()) {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::Forbidden)
            }
        }

        // 5. Police-wide capabilities
        a if a.is_police_only() && identity.is_police() => Decision::Allow,

        _ => Decision::Deny(DenyReason::Forbidden),
    }
}
