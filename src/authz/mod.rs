//! Access control guard: a pure decision function over the resolved caller,
//! the requested action and the ownership of the target resource.

pub mod engine;
pub mod types;

pub use engine::authorize;
pub use types::{Action, Decision, DenyReason, Resource};

use crate::errors::FirError;

impl Decision {
    /// Convert a deny into the matching error so callers can use `?`.
    pub fn into_result(self, action: Action) -> Result<(), FirError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::Unauthorized) => {
                Err(FirError::Unauthorized("authentication required".to_string()))
            }
            Decision::Deny(DenyReason::Forbidden) => {
                tracing::debug!(%action, "access denied");
                Err(FirError::Forbidden(format!("not permitted to {action}")))
            }
        }
    }
}

/// Authorize and convert in one step.
pub fn require(
    identity: Option<&crate::session::Identity>,
    action: Action,
    resource: Resource<'_>,
) -> Result<(), FirError> {
    authorize(identity, action, resource).into_result(action)
}
