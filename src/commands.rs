// Transport-agnostic command dispatch: one invocation in, one JSON response out.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::BotError;
use crate::leaderboard::LeaderboardAggregator;
use crate::lifecycle::Orchestrator;
use crate::models::{
    month_key, Category, CompetitionStatus, NewCompetition, ScopeId, UserId, OVERALL_CATEGORY,
};
use crate::rate_limit::{RateLimitType, RateLimiter};
use crate::store::StorageError;
use crate::users::AccountService;

pub const DEFAULT_LEADERBOARD_LIMIT: u64 = 10;
pub const MAX_LEADERBOARD_LIMIT: u64 = 50;

/// Arguments consumed by `create_competition` itself; everything else is a
/// type-specific parameter.
const CREATE_ARGS: [&str; 6] = [
    "type",
    "title",
    "description",
    "duration_hours",
    "max_participants",
    "parameters",
];

#[derive(Debug, Clone, Deserialize)]
pub struct CommandInvocation {
    pub command: String,
    pub actor: UserId,
    pub scope: ScopeId,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn failure(err: &BotError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(err.kind().to_string()),
            message: Some(err.user_message()),
        }
    }
}

pub struct CommandHandler {
    orchestrator: Arc<Orchestrator>,
    accounts: Arc<AccountService>,
    aggregator: Arc<LeaderboardAggregator>,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
}

impl CommandHandler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        accounts: Arc<AccountService>,
        aggregator: Arc<LeaderboardAggregator>,
        limiter: RateLimiter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orchestrator,
            accounts,
            aggregator,
            limiter,
            clock,
        }
    }

    /// Run one command. Errors are returned so the transport can pick a status.
    pub async fn dispatch(&self, invocation: CommandInvocation) -> Result<Value, BotError> {
        let command = invocation.command.clone();
        let actor = invocation.actor;
        let result = self.run(invocation).await;
        if let Err(e) = &result {
            match e {
                BotError::Storage(inner) => tracing::error!(
                    command = %command,
                    actor = %actor,
                    error = %inner,
                    "command failed"
                ),
                other => tracing::debug!(
                    command = %command,
                    actor = %actor,
                    kind = other.kind(),
                    retryable = other.is_retryable(),
                    "command rejected: {other}"
                ),
            }
        }
        result
    }

    async fn run(&self, invocation: CommandInvocation) -> Result<Value, BotError> {
        let CommandInvocation {
            command,
            actor,
            scope,
            args,
        } = invocation;
        if actor.is_system() {
            return Err(BotError::Validation("invalid actor id".into()));
        }
        if let Some(limit_type) = command_limit(&command, &args) {
            self.limiter.check_limit(actor.0, limit_type)?;
        }

        match command.as_str() {
            "link_account" => {
                let account = required_str(&args, "account")?;
                let display_name = optional_str(&args, "display_name")?.map(str::to_string);
                data(
                    self.accounts
                        .link_account(actor, account, display_name)
                        .await?,
                )
            }
            "unlink_account" => data(self.accounts.unlink_account(actor).await?),
            "create_competition" => {
                let request = new_competition(&args)?;
                data(
                    self.orchestrator
                        .create_competition(scope, actor, request)
                        .await?,
                )
            }
            "join_competition" => {
                let id = self.competition_in_scope(&args, scope).await?;
                data(self.orchestrator.join(&id, actor).await?)
            }
            "leave_competition" => {
                let id = self.competition_in_scope(&args, scope).await?;
                data(self.orchestrator.leave(&id, actor).await?)
            }
            "record_progress" => {
                let id = self.competition_in_scope(&args, scope).await?;
                let payload = match args.get("progress") {
                    Some(Value::Object(progress)) => Value::Object(progress.clone()),
                    Some(_) => {
                        return Err(BotError::Validation("progress must be an object".into()))
                    }
                    None => Value::Object(without(&args, &["competition_id"])),
                };
                data(
                    self.orchestrator
                        .record_progress(&id, actor, payload)
                        .await?,
                )
            }
            "complete_competition" => {
                let id = self.competition_in_scope(&args, scope).await?;
                let early = optional_bool(&args, "early")?.unwrap_or(false);
                data(self.orchestrator.complete(&id, actor, early).await?)
            }
            "cancel_competition" => {
                let id = self.competition_in_scope(&args, scope).await?;
                let reason = optional_str(&args, "reason")?.map(str::to_string);
                data(self.orchestrator.cancel(&id, actor, reason).await?)
            }
            "competition_info" => {
                let id = self.competition_in_scope(&args, scope).await?;
                data(self.orchestrator.get_competition(&id).await?)
            }
            "competitions" => {
                if optional_bool(&args, "mine")?.unwrap_or(false) {
                    return data(
                        self.orchestrator
                            .user_competitions(actor, Some(scope))
                            .await?,
                    );
                }
                let status = match optional_str(&args, "status")? {
                    Some(s) => Some(CompetitionStatus::from_str_name(s).ok_or_else(|| {
                        BotError::Validation(format!("unknown status '{s}'"))
                    })?),
                    None => None,
                };
                data(self.orchestrator.list_competitions(scope, status).await?)
            }
            "standings" => {
                let id = self.competition_in_scope(&args, scope).await?;
                data(self.orchestrator.standings(&id).await?)
            }
            "leaderboard" => {
                let kind = optional_str(&args, "category")?
                    .unwrap_or(OVERALL_CATEGORY)
                    .trim()
                    .to_ascii_lowercase();
                let limit = optional_u64(&args, "limit")?.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
                if !(1..=MAX_LEADERBOARD_LIMIT).contains(&limit) {
                    return Err(BotError::Validation(format!(
                        "limit must be between 1 and {MAX_LEADERBOARD_LIMIT}"
                    )));
                }
                let category = match kind.as_str() {
                    "monthly_wins" | "monthly_participation" => {
                        let month = match optional_str(&args, "month")? {
                            Some(month) => parse_month(month)?,
                            None => month_key(self.clock.now()),
                        };
                        if kind == "monthly_wins" {
                            Category::monthly_wins(scope, &month)
                        } else {
                            Category::monthly_participation(scope, &month)
                        }
                    }
                    _ => Category::new(scope, kind),
                };
                data(self.aggregator.top(&category, limit as usize).await?)
            }
            "my_profile" => data(self.accounts.profile(scope, actor).await?),
            "deactivate_user" => {
                let target = UserId(required_u64(&args, "user_id")?);
                data(self.accounts.deactivate(actor, target, scope).await?)
            }
            other => Err(BotError::Validation(format!("unknown command '{other}'"))),
        }
    }

    /// Resolve `competition_id` and hide competitions owned by other scopes.
    async fn competition_in_scope(
        &self,
        args: &Map<String, Value>,
        scope: ScopeId,
    ) -> Result<String, BotError> {
        let id = required_str(args, "competition_id")?.trim();
        let competition = self.orchestrator.get_competition(id).await?;
        if competition.scope != scope {
            return Err(BotError::not_found("competition", id));
        }
        Ok(competition.id)
    }
}

/// Per-member limit guarding a command. `link_account` is limited by the
/// account service, which gives the slot back when the link fails.
fn command_limit(command: &str, args: &Map<String, Value>) -> Option<RateLimitType> {
    match command {
        "unlink_account" => Some(RateLimitType::AccountUnlinks),
        "join_competition" => Some(RateLimitType::CompetitionJoins),
        "leave_competition" => Some(RateLimitType::CompetitionLeaves),
        "my_profile" => Some(RateLimitType::ProfileViews),
        "leaderboard" => Some(RateLimitType::LeaderboardViews),
        "competitions" if args.get("mine") == Some(&Value::Bool(true)) => {
            Some(RateLimitType::MyCompetitions)
        }
        "competitions" | "competition_info" => Some(RateLimitType::CompetitionViews),
        _ => None,
    }
}

/// Normalize a `YYYY-MM` month argument.
fn parse_month(month: &str) -> Result<String, BotError> {
    NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m").to_string())
        .map_err(|_| BotError::Validation(format!("month must look like 2026-03, got '{month}'")))
}

fn new_competition(args: &Map<String, Value>) -> Result<NewCompetition, BotError> {
    let parameters = match args.get("parameters") {
        Some(Value::Object(params)) => Value::Object(params.clone()),
        Some(Value::Null) | None => Value::Object(without(args, &CREATE_ARGS)),
        Some(_) => return Err(BotError::Validation("parameters must be an object".into())),
    };
    Ok(NewCompetition {
        kind: required_str(args, "type")?.to_string(),
        title: required_str(args, "title")?.to_string(),
        description: optional_str(args, "description")?
            .unwrap_or_default()
            .to_string(),
        duration_hours: optional_i64(args, "duration_hours")?,
        max_participants: optional_u64(args, "max_participants")?.map(|n| n as usize),
        parameters,
    })
}

fn data<T: Serialize>(value: T) -> Result<Value, BotError> {
    serde_json::to_value(value)
        .map_err(|source| {
            BotError::Storage(StorageError::Encode {
                collection: "response",
                source,
            })
        })
}

fn without(args: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    args.iter()
        .filter(|(k, _)| !keys.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

// ── Argument helpers ─────────────────────────────────────────────────

fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, BotError> {
    optional_str(args, key)?.ok_or_else(|| BotError::Validation(format!("missing argument '{key}'")))
}

fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<Option<&'a str>, BotError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(BotError::Validation(format!("'{key}' must be a string"))),
    }
}

fn optional_bool(args: &Map<String, Value>, key: &str) -> Result<Option<bool>, BotError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(BotError::Validation(format!("'{key}' must be true or false"))),
    }
}

fn optional_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, BotError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| BotError::Validation(format!("'{key}' must be a positive integer"))),
    }
}

fn optional_i64(args: &Map<String, Value>, key: &str) -> Result<Option<i64>, BotError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| BotError::Validation(format!("'{key}' must be an integer"))),
    }
}

fn required_u64(args: &Map<String, Value>, key: &str) -> Result<u64, BotError> {
    optional_u64(args, key)?.ok_or_else(|| BotError::Validation(format!("missing argument '{key}'")))
}
