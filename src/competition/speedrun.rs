// Speedrun competitions: fastest single attempt at an activity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    by_score_asc, parse_params, parse_payload, rank_standings, read_progress, to_value,
    with_participant, CompetitionManager, Evidence,
};
use crate::error::BotError;
use crate::models::{Competition, CompetitionResults, Reduction, Standing, UserId};

pub const MAX_ATTEMPTS: u32 = 100;
/// Longest accepted run: one week.
pub const MAX_ELAPSED_MS: i64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpeedrunParams {
    activity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_attempts: Option<u32>,
}

#[derive(Deserialize)]
struct RunReport {
    elapsed_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SpeedrunProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    best_ms: Option<i64>,
    #[serde(default)]
    attempts: u32,
}

#[derive(Default)]
pub struct SpeedrunManager;

#[async_trait]
impl CompetitionManager for SpeedrunManager {
    fn kind(&self) -> &'static str {
        "speedrun"
    }

    fn reduction(&self) -> Reduction {
        Reduction::BestTime
    }

    async fn validate_parameters(&self, params: &Value) -> Result<Value, BotError> {
        let mut params: SpeedrunParams = parse_params(params)?;
        params.activity = params.activity.trim().to_string();
        let len = params.activity.chars().count();
        if !(2..=50).contains(&len) {
            return Err(BotError::Validation(
                "activity must be 2-50 characters".into(),
            ));
        }
        if let Some(max) = params.max_attempts {
            if !(1..=MAX_ATTEMPTS).contains(&max) {
                return Err(BotError::Validation(format!(
                    "max attempts must be between 1 and {MAX_ATTEMPTS}"
                )));
            }
        }
        Ok(to_value(&params))
    }

    fn record_progress(
        &self,
        competition: &Competition,
        actor: UserId,
        payload: &Value,
        _evidence: &Evidence,
        now: DateTime<Utc>,
    ) -> Result<Competition, BotError> {
        let params: SpeedrunParams = parse_params(&competition.parameters)?;
        let report: RunReport = parse_payload(payload)?;
        if !(1..=MAX_ELAPSED_MS).contains(&report.elapsed_ms) {
            return Err(BotError::Validation(format!(
                "elapsed time must be between 1 and {MAX_ELAPSED_MS} ms"
            )));
        }

        with_participant(competition, actor, |participant| {
            let mut progress: SpeedrunProgress = read_progress(&participant.progress);
            if params.max_attempts.is_some_and(|max| progress.attempts >= max) {
                return Err(BotError::Rejected(format!(
                    "you have used all {} attempts",
                    progress.attempts
                )));
            }
            progress.attempts += 1;
            if progress.best_ms.map_or(true, |best| report.elapsed_ms < best) {
                progress.best_ms = Some(report.elapsed_ms);
                participant.last_progress_at = Some(now);
            }
            participant.progress = to_value(&progress);
            Ok(())
        })
    }

    fn finalize(&self, competition: &Competition) -> CompetitionResults {
        let standings = competition
            .participants
            .iter()
            .map(|p| {
                let progress: SpeedrunProgress = read_progress(&p.progress);
                Standing {
                    user_id: p.user_id,
                    rank: 0,
                    score: progress.best_ms.unwrap_or(0),
                    finished: progress.best_ms.is_some(),
                    achieved_at: progress.best_ms.and(p.last_progress_at),
                }
            })
            .collect();
        rank_standings(standings, by_score_asc)
    }
}
