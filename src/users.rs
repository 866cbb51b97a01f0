// Member accounts: linking platform identities to in-game accounts.

use serde::Serialize;
use std::sync::Arc;

use crate::auth::{Action, AuthorizationProvider};
use crate::clock::Clock;
use crate::error::BotError;
use crate::leaderboard::LeaderboardAggregator;
use crate::models::user::validate_account_name;
use crate::models::{LeaderboardEntry, ScopeId, User, UserId};
use crate::rate_limit::{RateLimitType, RateLimiter};
use crate::store::{Commit, Repository, Store};

/// A member with their leaderboard standing in one scope.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: User,
    pub entries: Vec<LeaderboardEntry>,
}

pub struct AccountService {
    users: Arc<Store<User>>,
    aggregator: Arc<LeaderboardAggregator>,
    authz: Arc<dyn AuthorizationProvider>,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(
        users: Arc<Store<User>>,
        aggregator: Arc<LeaderboardAggregator>,
        authz: Arc<dyn AuthorizationProvider>,
        limiter: RateLimiter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            aggregator,
            authz,
            limiter,
            clock,
        }
    }

    /// Link (or re-link) the actor's in-game account, creating the member on
    /// first use. An account name belongs to at most one active member.
    pub async fn link_account(
        &self,
        actor: UserId,
        account: &str,
        display_name: Option<String>,
    ) -> Result<User, BotError> {
        let account = validate_account_name(account)?;
        self.limiter.check_limit(actor.0, RateLimitType::AccountLinks)?;
        let now = self.clock.now();

        let result = {
            let account = account.clone();
            self.users
                .mutate(move |records| {
                    if records
                        .iter()
                        .any(|u| u.id != actor && u.active && u.owns_account(&account))
                    {
                        return Err(BotError::Conflict(format!(
                            "{account} is already linked to another member"
                        )));
                    }
                    let index = match records.iter().position(|u| u.id == actor) {
                        Some(index) => index,
                        None => {
                            records.push(User::new(actor, None, now));
                            records.len() - 1
                        }
                    };
                    let user = &mut records[index];
                    if !user.active {
                        return Err(BotError::Rejected(
                            "your account has been deactivated".into(),
                        ));
                    }
                    if !user.owns_account(&account) {
                        user.stats = None;
                    }
                    user.game_account = Some(account);
                    if display_name.is_some() {
                        user.display_name = display_name;
                    }
                    user.last_activity = now;
                    Ok(Commit::Write(user.clone()))
                })
                .await
        };
        let linked = match result {
            Ok(user) => user,
            Err(e) => {
                // Only successful links count against the limit.
                self.limiter.release(actor.0, RateLimitType::AccountLinks);
                return Err(e);
            }
        };

        tracing::info!(user = %actor, account = %account, "account linked");
        Ok(linked)
    }

    pub async fn unlink_account(&self, actor: UserId) -> Result<User, BotError> {
        let now = self.clock.now();
        let user = self
            .users
            .update(&actor.to_string(), move |u| {
                if u.game_account.is_none() {
                    return Err(BotError::Rejected("you have no linked account".into()));
                }
                u.game_account = None;
                u.stats = None;
                u.last_activity = now;
                Ok(u.clone())
            })
            .await?
            .ok_or_else(|| BotError::not_found("user", actor))?;
        tracing::info!(user = %actor, "account unlinked");
        Ok(user)
    }

    /// Mark a member inactive and release their account name. Records are never deleted.
    pub async fn deactivate(
        &self,
        actor: UserId,
        target: UserId,
        scope: ScopeId,
    ) -> Result<User, BotError> {
        if !self.authz.is_authorized(actor, Action::ManageUsers, scope).await {
            return Err(BotError::Unauthorized);
        }
        let now = self.clock.now();
        let user = self
            .users
            .update(&target.to_string(), move |u| {
                u.active = false;
                u.game_account = None;
                u.last_activity = now;
                Ok::<_, BotError>(u.clone())
            })
            .await?
            .ok_or_else(|| BotError::not_found("user", target))?;
        tracing::info!(user = %target, actor = %actor, "member deactivated");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<Option<User>, BotError> {
        Ok(self.users.get(&user_id.to_string()).await?)
    }

    pub async fn profile(&self, scope: ScopeId, user_id: UserId) -> Result<Profile, BotError> {
        let user = self
            .get_user(user_id)
            .await?
            .ok_or_else(|| BotError::not_found("user", user_id))?;
        let entries = self.aggregator.entries_for_user(scope, user_id).await?;
        Ok(Profile { user, entries })
    }
}
