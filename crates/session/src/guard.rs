//! Navigation decisions for protected screens.

use crate::context::IdentitySnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Show a loading indicator; the identity is not settled yet.
    Loading,
    RedirectToLogin,
    Allow,
    /// Signed in, but lacking the required role.
    Forbidden,
}

pub fn guard(snapshot: &IdentitySnapshot) -> RouteDecision {
    if snapshot.loading() {
        RouteDecision::Loading
    } else if !snapshot.is_authenticated() {
        RouteDecision::RedirectToLogin
    } else {
        RouteDecision::Allow
    }
}

/// Like [`guard`], but also requires the role `name` (exact match).
pub fn require_role(snapshot: &IdentitySnapshot, name: &str) -> RouteDecision {
    match guard(snapshot) {
        RouteDecision::Allow if !snapshot.has_role(name) => RouteDecision::Forbidden,
        decision => decision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::IdentityState;
    use dojo_auth::{IdentityRecord, Role, RoleSet};

    fn signed_in(roles: Vec<Role>) -> IdentitySnapshot {
        IdentitySnapshot {
            state: IdentityState::Authenticated,
            identity: Some(IdentityRecord {
                roles: RoleSet::new(roles),
                ..Default::default()
            }),
            error: None,
        }
    }

    #[test]
    fn loading_states_wait() {
        let mut snapshot = IdentitySnapshot::default();
        assert_eq!(guard(&snapshot), RouteDecision::Loading);

        snapshot.state = IdentityState::Transitioning;
        assert_eq!(require_role(&snapshot, "Admin"), RouteDecision::Loading);
    }

    #[test]
    fn anonymous_is_redirected() {
        let snapshot = IdentitySnapshot {
            state: IdentityState::Anonymous,
            ..Default::default()
        };
        assert_eq!(guard(&snapshot), RouteDecision::RedirectToLogin);
        assert_eq!(require_role(&snapshot, "Aluno"), RouteDecision::RedirectToLogin);
    }

    #[test]
    fn role_gate() {
        let snapshot = signed_in(vec![Role::new("Aluno", 1)]);
        assert_eq!(guard(&snapshot), RouteDecision::Allow);
        assert_eq!(require_role(&snapshot, "Aluno"), RouteDecision::Allow);
        assert_eq!(require_role(&snapshot, "Admin"), RouteDecision::Forbidden);
    }
}
