// Competition managers: one strategy per competition type, all behind the
// same four-operation contract, resolved by tag through the factory.

pub mod boss;
mod counter;
pub mod factory;
pub mod race;
pub mod skill;
pub mod speedrun;
pub mod trivia;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::error::BotError;
use crate::models::{
    Competition, CompetitionResults, Reduction, Standing, TriviaQuestion, User, UserId,
};
use crate::stats::{StatsProvider, StatsSnapshot};
use crate::store::{Repository, StorageError, Store};

pub use factory::ManagerFactory;

/// External facts fetched before the competition lock is taken, so that
/// `record_progress` itself stays synchronous and I/O-free.
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub snapshot: Option<StatsSnapshot>,
    pub question: Option<TriviaQuestion>,
}

/// Read access to the trivia question bank.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn question(&self, id: &str) -> Result<Option<TriviaQuestion>, StorageError>;
}

#[async_trait]
impl QuestionSource for Store<TriviaQuestion> {
    async fn question(&self, id: &str) -> Result<Option<TriviaQuestion>, StorageError> {
        self.get(id).await
    }
}

/// Collaborators handed to managers when the factory builds them.
#[derive(Clone)]
pub struct ManagerDeps {
    pub stats: Arc<dyn StatsProvider>,
    pub questions: Arc<dyn QuestionSource>,
    pub stats_timeout: Duration,
}

#[async_trait]
pub trait CompetitionManager: Send + Sync {
    /// Type tag stored on the competition.
    fn kind(&self) -> &'static str;

    /// How this type's standings fold into its leaderboard category.
    fn reduction(&self) -> Reduction;

    /// Whether normal completion waits for the end time.
    fn is_time_bounded(&self) -> bool {
        true
    }

    /// Check creation parameters and return them normalized. Runs before
    /// anything is persisted.
    async fn validate_parameters(&self, params: &Value) -> Result<Value, BotError>;

    /// Decide whether `user_id` may join. `user` is the member record, if any.
    fn validate_join(
        &self,
        competition: &Competition,
        user_id: UserId,
        user: Option<&User>,
    ) -> Result<(), BotError> {
        default_join_checks(competition, user_id, user)
    }

    /// Fetch whatever external facts `record_progress` needs.
    async fn gather_evidence(
        &self,
        _competition: &Competition,
        _user: Option<&User>,
        _payload: &Value,
    ) -> Result<Evidence, BotError> {
        Ok(Evidence::default())
    }

    /// Apply one progress report, returning the updated competition.
    fn record_progress(
        &self,
        competition: &Competition,
        actor: UserId,
        payload: &Value,
        evidence: &Evidence,
        now: DateTime<Utc>,
    ) -> Result<Competition, BotError>;

    /// Final standings from recorded progress alone.
    fn finalize(&self, competition: &Competition) -> CompetitionResults;
}

/// Joins are refused for inactive members, existing participants and full competitions.
pub fn default_join_checks(
    competition: &Competition,
    user_id: UserId,
    user: Option<&User>,
) -> Result<(), BotError> {
    if user.is_some_and(|u| !u.active) {
        return Err(BotError::Rejected("your account has been deactivated".into()));
    }
    if competition.is_participant(user_id) {
        return Err(BotError::Rejected(
            "you are already participating in this competition".into(),
        ));
    }
    if competition.is_full() {
        return Err(BotError::Rejected(format!(
            "competition is full ({} participants)",
            competition.max_participants
        )));
    }
    Ok(())
}

pub fn require_linked_account(user: Option<&User>) -> Result<&str, BotError> {
    user.and_then(|u| u.game_account.as_deref()).ok_or_else(|| {
        BotError::Rejected("link your in-game account first with link_account".into())
    })
}

// ── Parameter and progress helpers ───────────────────────────────────

pub(crate) fn parse_params<P: DeserializeOwned>(params: &Value) -> Result<P, BotError> {
    let empty = Value::Object(Default::default());
    let params = if params.is_null() { &empty } else { params };
    P::deserialize(params).map_err(|e| BotError::Validation(format!("invalid parameters: {e}")))
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Typed progress of one participant; null or foreign shapes read as default.
pub(crate) fn read_progress<P: DeserializeOwned + Default>(progress: &Value) -> P {
    P::deserialize(progress).unwrap_or_default()
}

pub(crate) fn parse_payload<P: DeserializeOwned>(payload: &Value) -> Result<P, BotError> {
    P::deserialize(payload).map_err(|e| BotError::Validation(format!("invalid progress: {e}")))
}

/// Copy the competition and hand out the actor's participant slot.
pub(crate) fn with_participant<F>(
    competition: &Competition,
    actor: UserId,
    f: F,
) -> Result<Competition, BotError>
where
    F: FnOnce(&mut crate::models::Participant) -> Result<(), BotError>,
{
    let mut updated = competition.clone();
    let participant = updated
        .participant_mut(actor)
        .ok_or_else(|| BotError::Rejected("you are not participating in this competition".into()))?;
    f(participant)?;
    Ok(updated)
}

// ── Ranking ──────────────────────────────────────────────────────────

/// Order standings with `cmp`, then assign competition ranks: entries that
/// compare equal share a rank and the next rank skips (1, 1, 3).
pub(crate) fn rank_standings<F>(mut standings: Vec<Standing>, cmp: F) -> CompetitionResults
where
    F: Fn(&Standing, &Standing) -> Ordering,
{
    // Stable: equal entries keep join order.
    standings.sort_by(&cmp);
    for i in 0..standings.len() {
        standings[i].rank = if i > 0 && cmp(&standings[i - 1], &standings[i]) == Ordering::Equal {
            standings[i - 1].rank
        } else {
            i as u32 + 1
        };
    }
    CompetitionResults { standings }
}

/// Earlier timestamps first; missing timestamps last.
pub(crate) fn earliest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Finished before unfinished, higher score first, then earliest.
pub(crate) fn by_score_desc(a: &Standing, b: &Standing) -> Ordering {
    b.finished
        .cmp(&a.finished)
        .then(b.score.cmp(&a.score))
        .then(earliest_first(a.achieved_at, b.achieved_at))
}

/// Finished before unfinished, lower score first, then earliest.
pub(crate) fn by_score_asc(a: &Standing, b: &Standing) -> Ordering {
    b.finished
        .cmp(&a.finished)
        .then(a.score.cmp(&b.score))
        .then(earliest_first(a.achieved_at, b.achieved_at))
}
