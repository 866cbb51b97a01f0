// Member record: platform identity linked to at most one in-game account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;
use crate::error::BotError;
use crate::stats::StatsSnapshot;
use crate::store::Entity;

pub const ACCOUNT_NAME_MAX_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Linked in-game account name, unique across active members.
    #[serde(default)]
    pub game_account: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Most recent verified stats, captured while recording progress.
    #[serde(default)]
    pub stats: Option<StatsSnapshot>,
}

fn default_active() -> bool {
    true
}

impl User {
    pub fn new(id: UserId, display_name: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name,
            game_account: None,
            joined_at: now,
            last_activity: now,
            active: true,
            stats: None,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.game_account.is_some()
    }

    /// Case-insensitive comparison against the linked account name.
    pub fn owns_account(&self, name: &str) -> bool {
        self.game_account
            .as_deref()
            .is_some_and(|linked| linked.eq_ignore_ascii_case(name))
    }
}

/// Normalize and validate an in-game account name: 1-12 characters of
/// letters, digits, spaces, hyphens and underscores.
pub fn validate_account_name(name: &str) -> Result<String, BotError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > ACCOUNT_NAME_MAX_LEN {
        return Err(BotError::Validation(format!(
            "account name must be 1-{ACCOUNT_NAME_MAX_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
    {
        return Err(BotError::Validation(
            "account name may only contain letters, numbers, spaces, hyphens and underscores"
                .into(),
        ));
    }
    Ok(name.to_string())
}

impl Entity for User {
    const COLLECTION: &'static str = "users";

    fn key(&self) -> String {
        self.id.to_string()
    }
}
