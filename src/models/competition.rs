// Competition record: lifecycle status, ordered participants, opaque
// type-specific parameters and progress, and final results.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ScopeId, UserId};
use crate::error::BotError;
use crate::store::Entity;

pub const TITLE_MIN_LEN: usize = 3;
pub const TITLE_MAX_LEN: usize = 100;
pub const DESCRIPTION_MAX_LEN: usize = 1000;
pub const MIN_DURATION_HOURS: i64 = 1;
pub const MAX_DURATION_HOURS: i64 = 168;
pub const MIN_PARTICIPANTS: usize = 2;
pub const MAX_PARTICIPANTS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionStatus {
    Draft,
    Active,
    Completed,
    Cancelled,
}

impl CompetitionStatus {
    /// The only legal edges are Draft→Active, Draft→Cancelled,
    /// Active→Completed and Active→Cancelled.
    pub fn can_transition_to(self, next: CompetitionStatus) -> bool {
        use CompetitionStatus::*;
        matches!(
            (self, next),
            (Draft, Active) | (Draft, Cancelled) | (Active, Completed) | (Active, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for CompetitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    /// Type-specific progress, interpreted only by the competition's manager.
    #[serde(default)]
    pub progress: Value,
    #[serde(default)]
    pub last_progress_at: Option<DateTime<Utc>>,
}

/// One line of a final (or live) ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub user_id: UserId,
    pub rank: u32,
    pub score: i64,
    /// False when the participant never reached the goal (race not finished).
    pub finished: bool,
    #[serde(default)]
    pub achieved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompetitionResults {
    pub standings: Vec<Standing>,
}

impl CompetitionResults {
    pub fn winner(&self) -> Option<UserId> {
        self.standings
            .iter()
            .find(|s| s.rank == 1 && s.finished)
            .map(|s| s.user_id)
    }
}

/// Engine-level creation request. Type-specific settings live in `parameters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCompetition {
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration_hours: Option<i64>,
    #[serde(default)]
    pub max_participants: Option<usize>,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub id: String,
    /// Type tag resolved by the manager factory (`skill`, `boss`, ...).
    pub kind: String,
    pub scope: ScopeId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: CompetitionStatus,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_participants: usize,
    /// Join order; membership is unique.
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub results: Option<CompetitionResults>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

impl Competition {
    /// Build a Draft from a creation request. Validates the engine-level fields.
    #[allow(clippy::too_many_arguments)]
    pub fn draft(
        id: String,
        scope: ScopeId,
        created_by: UserId,
        request: NewCompetition,
        kind: &str,
        default_duration_hours: i64,
        default_max_participants: usize,
        now: DateTime<Utc>,
    ) -> Result<Self, BotError> {
        let duration_hours = request.duration_hours.unwrap_or(default_duration_hours);
        if !(MIN_DURATION_HOURS..=MAX_DURATION_HOURS).contains(&duration_hours) {
            return Err(BotError::Validation(format!(
                "duration must be between {MIN_DURATION_HOURS} and {MAX_DURATION_HOURS} hours"
            )));
        }

        let competition = Competition {
            id,
            kind: kind.to_string(),
            scope,
            title: request.title.trim().to_string(),
            description: request.description.trim().to_string(),
            status: CompetitionStatus::Draft,
            created_by,
            created_at: now,
            start_time: now,
            end_time: now + Duration::hours(duration_hours),
            max_participants: request
                .max_participants
                .unwrap_or(default_max_participants),
            participants: Vec::new(),
            parameters: request.parameters,
            results: None,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
        };
        competition.validate()?;
        Ok(competition)
    }

    pub fn validate(&self) -> Result<(), BotError> {
        if self.id.trim().is_empty() {
            return Err(BotError::Validation("competition id cannot be empty".into()));
        }
        let title_len = self.title.chars().count();
        if !(TITLE_MIN_LEN..=TITLE_MAX_LEN).contains(&title_len) {
            return Err(BotError::Validation(format!(
                "title must be {TITLE_MIN_LEN}-{TITLE_MAX_LEN} characters"
            )));
        }
        if self.description.chars().count() > DESCRIPTION_MAX_LEN {
            return Err(BotError::Validation(format!(
                "description cannot exceed {DESCRIPTION_MAX_LEN} characters"
            )));
        }
        if self.end_time < self.start_time {
            return Err(BotError::Validation(
                "end time must not be before start time".into(),
            ));
        }
        if !(MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&self.max_participants) {
            return Err(BotError::Validation(format!(
                "max participants must be between {MIN_PARTICIPANTS} and {MAX_PARTICIPANTS}"
            )));
        }
        if self.results.is_some() && self.status != CompetitionStatus::Completed {
            return Err(BotError::Validation(
                "results are only present on completed competitions".into(),
            ));
        }
        Ok(())
    }

    /// Apply a status change, stamping completion/cancellation times.
    pub fn transition(
        &mut self,
        next: CompetitionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), BotError> {
        if !self.status.can_transition_to(next) {
            return Err(self.invalid_state(format!("cannot move to {next}")));
        }
        match next {
            CompetitionStatus::Completed => self.completed_at = Some(now),
            CompetitionStatus::Cancelled => self.cancelled_at = Some(now),
            CompetitionStatus::Active | CompetitionStatus::Draft => {}
        }
        self.status = next;
        Ok(())
    }

    pub fn invalid_state(&self, reason: impl Into<String>) -> BotError {
        BotError::InvalidState {
            id: self.id.clone(),
            status: self.status,
            reason: reason.into(),
        }
    }

    pub fn ensure_active(&self) -> Result<(), BotError> {
        if self.status != CompetitionStatus::Active {
            return Err(self.invalid_state("competition is not active"));
        }
        Ok(())
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.max_participants
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }

    pub fn participant(&self, user_id: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: UserId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    /// Returns false if the user was already a participant.
    pub fn add_participant(&mut self, user_id: UserId, now: DateTime<Utc>) -> bool {
        if self.is_participant(user_id) {
            return false;
        }
        self.participants.push(Participant {
            user_id,
            joined_at: now,
            progress: Value::Null,
            last_progress_at: None,
        });
        true
    }

    /// Returns false if the user was not a participant.
    pub fn remove_participant(&mut self, user_id: UserId) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.user_id != user_id);
        self.participants.len() != before
    }
}

impl Entity for Competition {
    const COLLECTION: &'static str = "competitions";

    fn key(&self) -> String {
        self.id.clone()
    }
}
