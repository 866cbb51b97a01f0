// Authorization: which actors may perform administrative actions in a scope.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::models::{ScopeId, UserId};

/// Administrative actions checked at the top of orchestrator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateCompetition,
    /// Complete a competition that has reached its end time.
    CompleteCompetition,
    /// Complete a competition before its end time.
    CompleteEarly,
    CancelCompetition,
    ManageUsers,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateCompetition => "create_competition",
            Self::CompleteCompetition => "complete_competition",
            Self::CompleteEarly => "complete_early",
            Self::CancelCompetition => "cancel_competition",
            Self::ManageUsers => "manage_users",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    async fn is_authorized(&self, actor: UserId, action: Action, scope: ScopeId) -> bool;
}

/// Role resolution from the configured admin list.
///
/// Every [`Action`] is administrative: only configured admins may create,
/// complete or cancel competitions and manage members. The system actor
/// (expiry sweeper) is always allowed. In local mode every actor is an admin.
#[derive(Debug, Clone, Default)]
pub struct ConfigAuthorization {
    admins: HashSet<UserId>,
    local_mode: bool,
}

impl ConfigAuthorization {
    pub fn new(admins: impl IntoIterator<Item = UserId>, local_mode: bool) -> Self {
        Self {
            admins: admins.into_iter().collect(),
            local_mode,
        }
    }

    pub fn is_admin(&self, actor: UserId) -> bool {
        self.local_mode || actor.is_system() || self.admins.contains(&actor)
    }
}

#[async_trait]
impl AuthorizationProvider for ConfigAuthorization {
    async fn is_authorized(&self, actor: UserId, _action: Action, _scope: ScopeId) -> bool {
        self.is_admin(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admin_actions_require_admin() {
        let authz = ConfigAuthorization::new([UserId(10)], false);
        let scope = ScopeId(1);

        assert!(authz.is_authorized(UserId(10), Action::CancelCompetition, scope).await);
        assert!(!authz.is_authorized(UserId(11), Action::CancelCompetition, scope).await);
        assert!(!authz.is_authorized(UserId(11), Action::CompleteEarly, scope).await);
        assert!(!authz.is_authorized(UserId(11), Action::CreateCompetition, scope).await);
        assert!(authz.is_authorized(UserId(10), Action::CreateCompetition, scope).await);
    }

    #[tokio::test]
    async fn test_system_actor_and_local_mode() {
        let authz = ConfigAuthorization::new(Vec::new(), false);
        assert!(authz.is_authorized(UserId::SYSTEM, Action::CompleteCompetition, ScopeId(1)).await);

        let local = ConfigAuthorization::new(Vec::new(), true);
        assert!(local.is_authorized(UserId(99), Action::ManageUsers, ScopeId(1)).await);
    }
}
